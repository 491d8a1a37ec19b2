//! Alert governance: whether a candidate is raised, at what severity, and how near-duplicates
//! collapse. Every check is a function of (candidate, settings, history, snoozes); the only
//! mutable state is what [`PolicyContext`] owns.

pub mod dedupe;
pub mod gate;
pub mod settings;
pub mod snooze;

pub use dedupe::deduplicate_alerts;
pub use gate::{apply_severity_caps, can_create_alert, GateDecision, SuppressionReason};
pub use settings::{AlertCaps, AlertSettings, QuietHours};
pub use snooze::SnoozeStore;

use chrono::{DateTime, Duration, FixedOffset, Utc};
use tracing::{debug, info};

use crate::models::AlertEvent;

use self::dedupe::absorb;

#[derive(Debug, Clone, Default)]
pub struct PolicyOutcome {
    pub emitted: Vec<AlertEvent>,
    pub suppressed: Vec<(AlertEvent, SuppressionReason)>,
}

/// Settings plus the governance state a session accumulates.
///
/// `history` holds the alerts raised so far, one representative per collapsed group.
#[derive(Debug, Clone, Default)]
pub struct PolicyContext {
    pub settings: AlertSettings,
    pub snoozes: SnoozeStore,
    pub history: Vec<AlertEvent>,
}

impl PolicyContext {
    pub fn new(settings: AlertSettings) -> Self {
        Self {
            settings,
            snoozes: SnoozeStore::new(),
            history: Vec::new(),
        }
    }

    /// Caps severities, then walks the candidates in time order. Each one is gated against
    /// the raised history and then either folded into a raised alert with the same dedupe key
    /// inside the dedupe window, or raised itself. Folded candidates never count against the
    /// daily caps. A candidate folded into an alert from an earlier pass is reported as a
    /// [`SuppressionReason::Duplicate`]; one folded into this pass's output only bumps its
    /// representative's counters, as [`deduplicate_alerts`] does.
    pub fn process(&mut self, candidates: &[AlertEvent]) -> PolicyOutcome {
        let mut ordered: Vec<AlertEvent> = candidates
            .iter()
            .map(|candidate| apply_severity_caps(candidate, &self.settings))
            .collect();
        ordered.sort_by_key(|candidate| candidate.created_at);
        if let Some(earliest) = ordered.first() {
            self.prune_history(earliest.created_at);
        }

        let window = Duration::milliseconds(self.settings.dedupe_window_ms.max(0));
        let batch_start = self.history.len();
        let mut outcome = PolicyOutcome::default();
        for candidate in ordered {
            let decision = can_create_alert(&candidate, &self.settings, &self.history, &self.snoozes);
            if let Some(reason) = decision.reason.filter(|_| !decision.allowed) {
                outcome.suppressed.push((candidate, reason));
                continue;
            }

            let key = candidate.effective_dedupe_key();
            let live = self
                .history
                .iter()
                .rposition(|event| event.effective_dedupe_key() == key)
                .filter(|&index| {
                    let elapsed = candidate.created_at - self.history[index].created_at;
                    elapsed >= Duration::zero() && elapsed <= window
                });
            match live {
                Some(index) => {
                    absorb(&mut self.history[index], &candidate);
                    if index < batch_start {
                        outcome
                            .suppressed
                            .push((candidate, SuppressionReason::Duplicate));
                    }
                }
                None => self.history.push(candidate),
            }
        }

        outcome.emitted = self.history[batch_start..].to_vec();
        info!(
            candidates = candidates.len(),
            emitted = outcome.emitted.len(),
            suppressed = outcome.suppressed.len(),
            history = self.history.len(),
            "policy pass complete"
        );
        outcome
    }

    /// Drops raised alerts that can no longer cap or absorb a candidate created at or after
    /// `from`: anything older than the longer of the dedupe window and a day.
    pub fn prune_history(&mut self, from: DateTime<FixedOffset>) -> usize {
        let window = Duration::milliseconds(self.settings.dedupe_window_ms.max(0));
        let Some(cutoff) = from.checked_sub_signed(window.max(Duration::hours(24))) else {
            return 0;
        };
        let before = self.history.len();
        self.history.retain(|event| event.created_at >= cutoff);
        let removed = before - self.history.len();
        if removed > 0 {
            debug!(removed, %cutoff, "pruned alert history");
        }
        removed
    }

    /// Snoozes the alert's dedupe key for `hours`, or the configured default.
    pub fn snooze(
        &mut self,
        event: &AlertEvent,
        hours: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        let hours = hours.unwrap_or(self.settings.default_snooze_hours);
        self.snoozes
            .snooze(&event.student_id, &event.effective_dedupe_key(), hours, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, AlertSeverity, AlertStatus};
    use chrono::{DateTime, FixedOffset};

    fn alert(id: &str, created_at: &str) -> AlertEvent {
        AlertEvent {
            id: id.to_string(),
            student_id: "stu-1".to_string(),
            kind: AlertKind::BehaviorSpike,
            severity: AlertSeverity::Moderate,
            status: AlertStatus::New,
            confidence: 0.9,
            created_at: DateTime::<FixedOffset>::parse_from_rfc3339(created_at).unwrap(),
            dedupe_key: None,
            sources: vec![],
            metadata: None,
            actions: vec![],
        }
    }

    #[test]
    fn collapsed_duplicates_leave_cap_room() {
        let mut settings = AlertSettings::default();
        settings
            .caps
            .max_per_day_by_kind
            .insert(AlertKind::BehaviorSpike, 2);
        let mut context = PolicyContext::new(settings);

        let outcome = context.process(&[
            alert("a", "2026-03-04T09:00:00Z"),
            alert("b", "2026-03-04T09:05:00Z"),
            alert("c", "2026-03-04T12:00:00Z"),
            alert("d", "2026-03-04T13:30:00Z"),
        ]);
        let emitted: Vec<&str> = outcome.emitted.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(emitted, vec!["a", "c"]);
        assert_eq!(outcome.emitted[0].governance().unwrap().suppressed_count, 1);
        assert_eq!(outcome.suppressed.len(), 1);
        assert_eq!(outcome.suppressed[0].0.id, "d");
        assert_eq!(outcome.suppressed[0].1, SuppressionReason::KindCapReached);
        assert_eq!(context.history.len(), 2);
    }

    #[test]
    fn later_pass_folds_into_raised_alert() {
        let mut context = PolicyContext::default();
        let first = context.process(&[alert("a", "2026-03-04T09:00:00Z")]);
        assert_eq!(first.emitted.len(), 1);

        let second = context.process(&[alert("b", "2026-03-04T09:05:00Z")]);
        assert!(second.emitted.is_empty());
        assert_eq!(second.suppressed[0].0.id, "b");
        assert_eq!(second.suppressed[0].1, SuppressionReason::Duplicate);
        assert_eq!(context.history.len(), 1);
        let governance = context.history[0].governance().unwrap();
        assert_eq!(governance.suppressed_count, 1);
        assert_eq!(
            governance.last_seen_at,
            Some(DateTime::parse_from_rfc3339("2026-03-04T09:05:00Z").unwrap())
        );

        let third = context.process(&[alert("c", "2026-03-04T10:30:00Z")]);
        assert_eq!(third.emitted.len(), 1);
        assert_eq!(third.emitted[0].id, "c");
    }

    #[test]
    fn history_is_pruned_past_the_cap_period() {
        let mut context = PolicyContext::default();
        context.process(&[alert("a", "2026-03-02T12:00:00Z")]);
        context.process(&[alert("b", "2026-03-03T10:00:00Z")]);
        assert_eq!(context.history.len(), 2);

        context.process(&[alert("c", "2026-03-04T09:00:00Z")]);
        let kept: Vec<&str> = context.history.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(kept, vec!["b", "c"]);
    }

    #[test]
    fn snooze_uses_default_hours() {
        let mut context = PolicyContext::default();
        let event = alert("a", "2026-03-04T09:00:00Z");
        let now = event.created_at.with_timezone(&Utc);
        let until = context.snooze(&event, None, now).unwrap();
        assert_eq!(until - now, chrono::Duration::hours(24));

        let outcome = context.process(&[alert("b", "2026-03-04T10:00:00Z")]);
        assert!(outcome.emitted.is_empty());
        assert_eq!(outcome.suppressed[0].1, SuppressionReason::Snoozed);
    }
}
