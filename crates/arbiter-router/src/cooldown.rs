//! Auth-profile cooldown tracking and probe throttling.
//!
//! A provider can have several auth profiles (API keys, accounts); when
//! every profile for a provider is in cooldown (e.g. from a prior rate
//! limit), the router skips candidates on that provider unless the
//! candidate is the primary and a throttled probe attempt is due.

use std::collections::HashMap;
use std::sync::Mutex;

/// Minimum interval between probe attempts for the same (scope, provider).
pub const PROBE_MIN_INTERVAL_MS: i64 = 30_000;
/// A probe is only allowed within this margin of the soonest cooldown expiry.
pub const PROBE_MARGIN_MS: i64 = 120_000;
/// Probe-throttle entries untouched for this long are pruned.
pub const PROBE_ENTRY_TTL_MS: i64 = 24 * 60 * 60 * 1000;

struct ProfileCooldowns {
    /// profile id -> cooldown expiry, ms since epoch.
    until: HashMap<String, i64>,
}

/// Tracks per-(provider, auth profile) cooldown expiry and the
/// per-(scope, provider) probe throttle.
#[derive(Default)]
pub struct CooldownTracker {
    by_provider: Mutex<HashMap<String, ProfileCooldowns>>,
    probe_throttle: Mutex<HashMap<(String, String), i64>>,
}

impl CooldownTracker {
    /// Construct an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Put an auth profile into cooldown until `until_ms`.
    pub fn set_cooldown(&self, provider: &str, profile_id: &str, until_ms: i64) {
        let mut guard = self.by_provider.lock().expect("cooldown mutex poisoned");
        guard
            .entry(provider.to_string())
            .or_insert_with(|| ProfileCooldowns { until: HashMap::new() })
            .until
            .insert(profile_id.to_string(), until_ms);
    }

    /// Clear a profile's cooldown (e.g. after a successful call).
    pub fn clear_cooldown(&self, provider: &str, profile_id: &str) {
        let mut guard = self.by_provider.lock().expect("cooldown mutex poisoned");
        if let Some(profiles) = guard.get_mut(provider) {
            profiles.until.remove(profile_id);
        }
    }

    /// Whether every known auth profile for `provider` is currently in
    /// cooldown. Returns the earliest expiry timestamp if so. A
    /// provider with no registered profiles is never considered
    /// cooling (nothing to wait on).
    pub fn all_in_cooldown(&self, provider: &str, now: i64) -> Option<i64> {
        let guard = self.by_provider.lock().expect("cooldown mutex poisoned");
        let profiles = guard.get(provider)?;
        if profiles.until.is_empty() {
            return None;
        }
        if profiles.until.values().all(|&until| until > now) {
            profiles.until.values().copied().min()
        } else {
            None
        }
    }

    /// Whether a probe attempt against `provider` under `scope` is due:
    /// at least [`PROBE_MIN_INTERVAL_MS`] since the last probe, and
    /// within [`PROBE_MARGIN_MS`] of `earliest_expiry`. Recording a
    /// granted probe updates the throttle so the next call is blocked
    /// until the interval elapses again.
    pub fn probe_allowed(&self, scope: &str, provider: &str, now: i64, earliest_expiry: i64) -> bool {
        if earliest_expiry - now > PROBE_MARGIN_MS {
            return false;
        }
        let key = (scope.to_string(), provider.to_string());
        let mut guard = self.probe_throttle.lock().expect("probe throttle mutex poisoned");
        if let Some(&last) = guard.get(&key) {
            if now - last < PROBE_MIN_INTERVAL_MS {
                return false;
            }
        }
        guard.insert(key, now);
        true
    }

    /// Drop probe-throttle entries untouched for longer than
    /// [`PROBE_ENTRY_TTL_MS`].
    pub fn prune_stale_probes(&self, now: i64) {
        let mut guard = self.probe_throttle.lock().expect("probe throttle mutex poisoned");
        guard.retain(|_, &mut last_touch| now - last_touch <= PROBE_ENTRY_TTL_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_with_no_profiles_is_never_cooling() {
        let tracker = CooldownTracker::new();
        assert_eq!(tracker.all_in_cooldown("openai", 0), None);
    }

    #[test]
    fn all_in_cooldown_requires_every_profile_cooling() {
        let tracker = CooldownTracker::new();
        tracker.set_cooldown("openai", "key-a", 1000);
        tracker.set_cooldown("openai", "key-b", 500);
        assert_eq!(tracker.all_in_cooldown("openai", 0), Some(500));
        tracker.clear_cooldown("openai", "key-b");
        assert_eq!(tracker.all_in_cooldown("openai", 0), Some(1000));
    }

    #[test]
    fn not_all_cooling_when_one_profile_has_expired() {
        let tracker = CooldownTracker::new();
        tracker.set_cooldown("openai", "key-a", 1000);
        tracker.set_cooldown("openai", "key-b", 500);
        assert_eq!(tracker.all_in_cooldown("openai", 600), None);
    }

    #[test]
    fn probe_rejected_outside_margin() {
        let tracker = CooldownTracker::new();
        assert!(!tracker.probe_allowed("default", "openai", 0, 500_000));
    }

    #[test]
    fn probe_allowed_within_margin_then_throttled() {
        let tracker = CooldownTracker::new();
        assert!(tracker.probe_allowed("default", "openai", 0, 60_000));
        assert!(!tracker.probe_allowed("default", "openai", 1_000, 60_000));
        assert!(tracker.probe_allowed("default", "openai", 31_000, 60_000));
    }

    #[test]
    fn prune_drops_entries_past_ttl() {
        let tracker = CooldownTracker::new();
        tracker.probe_allowed("default", "openai", 0, 60_000);
        tracker.prune_stale_probes(PROBE_ENTRY_TTL_MS + 1);
        assert!(tracker.probe_allowed("default", "openai", PROBE_ENTRY_TTL_MS + 1, PROBE_ENTRY_TTL_MS + 60_000));
    }
}
