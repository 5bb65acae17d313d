//! Per-model spend pricing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-1k-token USD pricing for one model.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPricing {
    /// USD per 1,000 input tokens.
    pub input_per_1k_usd: Decimal,
    /// USD per 1,000 output tokens.
    pub output_per_1k_usd: Decimal,
}

/// A lookup table from `provider/model` key to its pricing. Unknown
/// models cost nothing — the caller still gets token counts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable(HashMap<String, ModelPricing>);

impl PricingTable {
    /// Build a table from a `provider/model` -> pricing map.
    pub fn new(table: HashMap<String, ModelPricing>) -> Self {
        Self(table)
    }

    /// Compute the USD cost of a call, rounded to 8 decimal places.
    pub fn cost(&self, candidate_key: &str, tokens_in: u64, tokens_out: u64) -> Decimal {
        let Some(pricing) = self.0.get(candidate_key) else {
            return Decimal::ZERO;
        };
        let input_cost = pricing.input_per_1k_usd * Decimal::from(tokens_in) / Decimal::from(1000);
        let output_cost = pricing.output_per_1k_usd * Decimal::from(tokens_out) / Decimal::from(1000);
        (input_cost + output_cost).round_dp(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_model_costs_nothing() {
        let table = PricingTable::default();
        assert_eq!(table.cost("openai/gpt-4", 1000, 1000), Decimal::ZERO);
    }

    #[test]
    fn cost_rounds_to_eight_decimals() {
        let mut map = HashMap::new();
        map.insert(
            "openai/gpt-4".to_string(),
            ModelPricing {
                input_per_1k_usd: Decimal::new(3, 2),
                output_per_1k_usd: Decimal::new(6, 2),
            },
        );
        let table = PricingTable::new(map);
        let cost = table.cost("openai/gpt-4", 1000, 500);
        assert_eq!(cost, Decimal::new(6, 2));
    }
}
