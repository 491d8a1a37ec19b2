use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Suppression windows keyed by student and dedupe key.
///
/// Owned by the caller and passed into the gate explicitly; a concurrent host needs a single
/// writer around it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnoozeStore {
    entries: HashMap<String, HashMap<String, DateTime<Utc>>>,
}

impl SnoozeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suppresses `(student_id, dedupe_key)` for `hours` from `now` and returns the expiry.
    /// Non-positive or non-finite durations record nothing. An expiry past the last
    /// representable instant saturates to it. A later snooze replaces an earlier one for the
    /// same pair.
    pub fn snooze(
        &mut self,
        student_id: &str,
        dedupe_key: &str,
        hours: f64,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if !hours.is_finite() || hours <= 0.0 {
            return None;
        }
        let until = TimeDelta::try_milliseconds((hours * 3_600_000.0).round() as i64)
            .and_then(|span| now.checked_add_signed(span))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.entries
            .entry(student_id.to_string())
            .or_default()
            .insert(dedupe_key.to_string(), until);
        debug!(student_id, dedupe_key, %until, "snoozed");
        Some(until)
    }

    pub fn unsnooze(&mut self, student_id: &str, dedupe_key: &str) -> bool {
        let Some(keys) = self.entries.get_mut(student_id) else {
            return false;
        };
        let removed = keys.remove(dedupe_key).is_some();
        if keys.is_empty() {
            self.entries.remove(student_id);
        }
        removed
    }

    pub fn snoozed_until(&self, student_id: &str, dedupe_key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(student_id)?.get(dedupe_key).copied()
    }

    pub fn is_snoozed(&self, student_id: &str, dedupe_key: &str, at: DateTime<Utc>) -> bool {
        self.snoozed_until(student_id, dedupe_key)
            .map(|until| at < until)
            .unwrap_or(false)
    }

    /// Drops elapsed windows and returns how many were removed.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, keys| {
            let before = keys.len();
            keys.retain(|_, until| *until > now);
            removed += before - keys.len();
            !keys.is_empty()
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn snooze_expires_after_window() {
        let mut store = SnoozeStore::new();
        let until = store.snooze("stu-1", "k", 2.0, now()).unwrap();
        assert_eq!(until, now() + TimeDelta::hours(2));
        assert!(store.is_snoozed("stu-1", "k", now() + TimeDelta::minutes(119)));
        assert!(!store.is_snoozed("stu-1", "k", now() + TimeDelta::hours(2)));
        assert!(!store.is_snoozed("stu-2", "k", now()));
        assert!(!store.is_snoozed("stu-1", "other", now()));
    }

    #[test]
    fn invalid_durations_record_nothing() {
        let mut store = SnoozeStore::new();
        assert!(store.snooze("stu-1", "k", 0.0, now()).is_none());
        assert!(store.snooze("stu-1", "k", f64::NAN, now()).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn huge_durations_saturate_instead_of_overflowing() {
        let mut store = SnoozeStore::new();
        let until = store.snooze("stu-1", "k", 1e10, now()).unwrap();
        assert_eq!(until, DateTime::<Utc>::MAX_UTC);
        assert!(store.is_snoozed("stu-1", "k", now() + TimeDelta::days(365 * 1000)));

        let until = store.snooze("stu-1", "k", f64::MAX, now()).unwrap();
        assert_eq!(until, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn prune_and_unsnooze() {
        let mut store = SnoozeStore::new();
        store.snooze("stu-1", "a", 1.0, now());
        store.snooze("stu-1", "b", 5.0, now());
        store.snooze("stu-2", "a", 1.0, now());
        assert_eq!(store.len(), 3);

        assert_eq!(store.prune_expired(now() + TimeDelta::hours(2)), 2);
        assert_eq!(store.len(), 1);
        assert!(store.unsnooze("stu-1", "b"));
        assert!(!store.unsnooze("stu-1", "b"));
        assert!(store.is_empty());
    }
}
