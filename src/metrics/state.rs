//! Derivation state store.
//!
//! Holds the previous cumulative observation of every series the
//! utilization pass has seen. Reads and writes for one key happen under
//! that key's shard lock, so concurrent batches never lose an update.
//!
//! Expiry runs on the local monotonic clock rather than on data timestamps,
//! so one agent with a skewed clock cannot expire another agent's series.

use crate::metrics::series::SeriesKey;
use crate::metrics::types::Attributes;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};

const NANOS_PER_SECOND: f64 = 1_000_000_000.0;

/// Previous cumulative value of one series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivationStateEntry {
    pub value: f64,
    pub time_unix_nano: u64,
}

/// Outcome of recording one observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Observation {
    /// First sighting of the series; state seeded, nothing to emit.
    First,
    /// Counter went backwards; state resynced to the new baseline.
    Reset,
    /// Observation not newer than the stored one; state untouched.
    Stale,
    /// Value is NaN or infinite; state untouched.
    Invalid,
    /// A rate can be emitted.
    Rate {
        delta_value: f64,
        elapsed_seconds: f64,
        previous_time_unix_nano: u64,
    },
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    entry: DerivationStateEntry,
    written_at: Instant,
}

impl Slot {
    fn new(entry: DerivationStateEntry) -> Self {
        Self {
            entry,
            written_at: Instant::now(),
        }
    }
}

/// Per-processor store of previous observations
#[derive(Debug)]
pub struct DerivationState {
    entries: DashMap<SeriesKey, Slot, ahash::RandomState>,
    ttl: Option<Duration>,
}

impl DerivationState {
    /// Create an empty store. Entries not written for `ttl` are dropped by
    /// [`evict_stale`](Self::evict_stale).
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            entries: DashMap::with_hasher(ahash::RandomState::new()),
            ttl,
        }
    }

    /// Record `value` at `time_unix_nano` for `key` and report what the
    /// caller may emit.
    pub fn observe(&self, key: SeriesKey, value: f64, time_unix_nano: u64) -> Observation {
        if !value.is_finite() {
            return Observation::Invalid;
        }

        let current = DerivationStateEntry {
            value,
            time_unix_nano,
        };

        match self.entries.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Slot::new(current));
                Observation::First
            },
            Entry::Occupied(mut slot) => {
                let previous = slot.get().entry;
                if time_unix_nano <= previous.time_unix_nano {
                    return Observation::Stale;
                }

                slot.insert(Slot::new(current));

                let delta_value = value - previous.value;
                if delta_value < 0.0 {
                    return Observation::Reset;
                }

                #[allow(clippy::cast_precision_loss)]
                let elapsed_seconds =
                    (time_unix_nano - previous.time_unix_nano) as f64 / NANOS_PER_SECOND;

                Observation::Rate {
                    delta_value,
                    elapsed_seconds,
                    previous_time_unix_nano: previous.time_unix_nano,
                }
            },
        }
    }

    pub fn get(&self, key: &SeriesKey) -> Option<DerivationStateEntry> {
        self.entries.get(key).map(|slot| slot.entry)
    }

    /// Seed or overwrite one entry.
    pub fn insert(&self, key: SeriesKey, entry: DerivationStateEntry) {
        self.entries.insert(key, Slot::new(entry));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries not written within the TTL. Returns how many went.
    pub fn evict_stale(&self) -> usize {
        self.evict_stale_at(Instant::now())
    }

    /// [`evict_stale`](Self::evict_stale) as seen from `now`.
    pub fn evict_stale_at(&self, now: Instant) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };

        let before = self.entries.len();
        self.entries
            .retain(|_, slot| now.saturating_duration_since(slot.written_at) <= ttl);
        let evicted = before.saturating_sub(self.entries.len());

        if evicted > 0 {
            tracing::debug!(evicted, ?ttl, "Evicted stale derivation state");
        }
        evicted
    }

    /// Drop every series of a resource that is gone.
    pub fn forget_resource(&self, resource: &Attributes) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.belongs_to(resource));
        before.saturating_sub(self.entries.len())
    }
}

impl Default for DerivationState {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::types::{labels, Labels};

    const SECOND: u64 = 1_000_000_000;

    fn key(cpu: &str) -> SeriesKey {
        SeriesKey::new(&Attributes::new(), "system.cpu.time", &labels([("cpu", cpu)]))
    }

    #[test]
    fn test_first_observation_seeds_state() {
        let state = DerivationState::default();
        assert_eq!(state.observe(key("0"), 10.0, 0), Observation::First);
        assert_eq!(
            state.get(&key("0")),
            Some(DerivationStateEntry {
                value: 10.0,
                time_unix_nano: 0
            })
        );
    }

    #[test]
    fn test_rate_between_observations() {
        let state = DerivationState::default();
        state.observe(key("0"), 10.0, 0);

        match state.observe(key("0"), 16.0, 2 * SECOND) {
            Observation::Rate {
                delta_value,
                elapsed_seconds,
                previous_time_unix_nano,
            } => {
                assert_eq!(delta_value, 6.0);
                assert_eq!(elapsed_seconds, 2.0);
                assert_eq!(previous_time_unix_nano, 0);
            },
            other => panic!("expected rate, got {:?}", other),
        }
        assert_eq!(state.get(&key("0")).unwrap().value, 16.0);
    }

    #[test]
    fn test_reset_resyncs_baseline() {
        let state = DerivationState::default();
        state.observe(key("0"), 16.0, SECOND);

        assert_eq!(state.observe(key("0"), 4.0, 2 * SECOND), Observation::Reset);
        assert_eq!(state.get(&key("0")).unwrap().value, 4.0);

        assert!(matches!(
            state.observe(key("0"), 6.0, 3 * SECOND),
            Observation::Rate { delta_value, .. } if delta_value == 2.0
        ));
    }

    #[test]
    fn test_stale_observation_leaves_state() {
        let state = DerivationState::default();
        state.observe(key("0"), 10.0, 5 * SECOND);

        assert_eq!(state.observe(key("0"), 12.0, 5 * SECOND), Observation::Stale);
        assert_eq!(state.observe(key("0"), 1.0, 4 * SECOND), Observation::Stale);
        assert_eq!(
            state.get(&key("0")),
            Some(DerivationStateEntry {
                value: 10.0,
                time_unix_nano: 5 * SECOND
            })
        );
    }

    #[test]
    fn test_evict_stale_after_ttl() {
        let ttl = Duration::from_secs(60);
        let state = DerivationState::new(Some(ttl));
        state.observe(key("0"), 1.0, 0);

        assert_eq!(state.evict_stale(), 0);
        assert_eq!(state.evict_stale_at(Instant::now() + ttl + Duration::from_secs(1)), 1);
        assert!(state.is_empty());
    }

    #[test]
    fn test_skewed_clock_does_not_evict_other_series() {
        let state = DerivationState::new(Some(Duration::from_secs(600)));
        let mut ahead = Attributes::new();
        ahead.insert("host.name".into(), "b".into());
        let ahead_key = SeriesKey::new(&ahead, "system.cpu.time", &Labels::new());

        state.observe(key("0"), 10.0, 100 * SECOND);
        state.observe(ahead_key, 1.0, 3_700 * SECOND);
        assert_eq!(state.evict_stale(), 0);

        assert!(matches!(
            state.observe(key("0"), 12.0, 102 * SECOND),
            Observation::Rate { delta_value, .. } if delta_value == 2.0
        ));
    }

    #[test]
    fn test_non_finite_values_are_not_stored() {
        let state = DerivationState::default();
        assert_eq!(state.observe(key("0"), f64::NAN, SECOND), Observation::Invalid);
        assert!(state.is_empty());

        state.observe(key("0"), 10.0, 2 * SECOND);
        assert_eq!(state.observe(key("0"), f64::INFINITY, 3 * SECOND), Observation::Invalid);
        assert!(matches!(
            state.observe(key("0"), 11.0, 4 * SECOND),
            Observation::Rate { delta_value, .. } if delta_value == 1.0
        ));
    }

    #[test]
    fn test_no_ttl_never_evicts() {
        let state = DerivationState::new(None);
        state.observe(key("0"), 1.0, 0);
        state.observe(key("1"), 1.0, u64::MAX / 2);
        assert_eq!(state.evict_stale(), 0);
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_forget_resource() {
        let state = DerivationState::default();
        let mut gone = Attributes::new();
        gone.insert("process.pid".into(), "42".into());

        state.observe(SeriesKey::new(&gone, "process.cpu.time", &Labels::new()), 1.0, 0);
        state.observe(key("0"), 1.0, 0);

        assert_eq!(state.forget_resource(&gone), 1);
        assert_eq!(state.len(), 1);
        assert!(!state.is_empty());
    }
}
