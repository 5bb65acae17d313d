//! The spend summary writer: an
//! always-current JSON snapshot plus an append-only monthly log,
//! driven off [`Rollups`]' dirty tracking.

use crate::config::SpendSurfaceConfig;
use arbiter_observability::Rollups;
use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Default, Serialize)]
struct Totals {
    calls: u64,
    tokens_in: u64,
    tokens_out: u64,
    cost_usd: Decimal,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpendSummary {
    updated_at: i64,
    totals: Totals,
    by_model: HashMap<String, arbiter_observability::ModelRollup>,
    by_agent: HashMap<String, arbiter_observability::AgentRollup>,
}

async fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;
    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("spend"),
        std::process::id()
    ));
    tokio::fs::write(&tmp_path, bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

/// Write the always-current summary file and append this call's
/// contribution to the monthly `YYYY-MM.jsonl` log.
pub async fn write_spend_summary(config: &SpendSurfaceConfig, rollups: &Rollups, now_ms: i64) -> std::io::Result<()> {
    let by_model = rollups.by_model_snapshot();
    let by_agent = rollups.by_agent_snapshot();

    let mut totals = Totals::default();
    for rollup in by_model.values() {
        totals.calls += rollup.calls;
        totals.tokens_in += rollup.tokens_in;
        totals.tokens_out += rollup.tokens_out;
        totals.cost_usd += rollup.cost_usd;
    }

    let by_model_keyed: HashMap<String, arbiter_observability::ModelRollup> = by_model
        .into_iter()
        .map(|((provider, model_ref), rollup)| (format!("{provider}/{model_ref}"), rollup))
        .collect();

    let summary = SpendSummary {
        updated_at: now_ms,
        totals,
        by_model: by_model_keyed,
        by_agent,
    };

    if let Some(summary_path) = &config.summary_path {
        let json = serde_json::to_vec_pretty(&summary)?;
        atomic_write(summary_path, &json).await?;
    }

    if let Some(dir) = &config.dir {
        tokio::fs::create_dir_all(dir).await?;
        let month = Utc
            .timestamp_millis_opt(now_ms)
            .single()
            .unwrap_or_else(Utc::now)
            .format("%Y-%m");
        let path = dir.join(format!("{month}.jsonl"));
        let mut line = serde_json::to_string(&summary)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(line.as_bytes()).await?;
    }

    Ok(())
}
