use chrono::{DateTime, FixedOffset};

use crate::error::LifecycleError;
use crate::models::{AlertEvent, AlertStatus};

impl AlertStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Dismissed)
    }

    pub fn can_transition_to(&self, next: AlertStatus) -> bool {
        use AlertStatus::*;
        matches!(
            (self, next),
            (New, Acknowledged | Snoozed | Dismissed)
                | (Acknowledged, InProgress | Resolved | Snoozed | Dismissed)
                | (InProgress, Resolved | Snoozed | Dismissed)
                | (Snoozed, New | Acknowledged | Dismissed)
        )
    }
}

/// Returns a copy of `event` moved to `to`; the original is left untouched.
pub fn transition(event: &AlertEvent, to: AlertStatus) -> Result<AlertEvent, LifecycleError> {
    if !event.status.can_transition_to(to) {
        return Err(LifecycleError::InvalidTransition {
            from: event.status,
            to,
        });
    }
    let mut next = event.clone();
    next.status = to;
    if to != AlertStatus::Snoozed {
        if let Some(metadata) = next.metadata.as_mut() {
            if let Some(governance) = metadata.governance.as_mut() {
                governance.snoozed_until = None;
            }
        }
    }
    Ok(next)
}

pub fn snooze_until(
    event: &AlertEvent,
    until: DateTime<FixedOffset>,
) -> Result<AlertEvent, LifecycleError> {
    let mut next = transition(event, AlertStatus::Snoozed)?;
    next.governance_mut().snoozed_until = Some(until);
    Ok(next)
}

/// Whether the alert still belongs in active views at `now`.
///
/// Resolved and dismissed alerts are retired. A snoozed alert comes back once its window has
/// elapsed; one snoozed without a recorded window stays hidden.
pub fn is_active(event: &AlertEvent, now: DateTime<FixedOffset>) -> bool {
    match event.status {
        AlertStatus::Resolved | AlertStatus::Dismissed => false,
        AlertStatus::Snoozed => event
            .governance()
            .and_then(|governance| governance.snoozed_until)
            .map(|until| now >= until)
            .unwrap_or(false),
        _ => true,
    }
}

pub fn active_alerts(events: &[AlertEvent], now: DateTime<FixedOffset>) -> Vec<&AlertEvent> {
    events.iter().filter(|event| is_active(event, now)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, AlertSeverity};
    use chrono::Duration;

    fn at(ts: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(ts).unwrap()
    }

    fn alert(status: AlertStatus) -> AlertEvent {
        AlertEvent {
            id: "a-1".to_string(),
            student_id: "stu-1".to_string(),
            kind: AlertKind::BehaviorSpike,
            severity: AlertSeverity::Moderate,
            status,
            confidence: 0.9,
            created_at: at("2026-03-02T09:00:00Z"),
            dedupe_key: None,
            sources: vec![],
            metadata: None,
            actions: vec![],
        }
    }

    #[test]
    fn happy_path_to_resolution() {
        let new = alert(AlertStatus::New);
        let acknowledged = transition(&new, AlertStatus::Acknowledged).unwrap();
        let working = transition(&acknowledged, AlertStatus::InProgress).unwrap();
        let resolved = transition(&working, AlertStatus::Resolved).unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(new.status, AlertStatus::New);
    }

    #[test]
    fn terminal_states_reject_changes() {
        let resolved = alert(AlertStatus::Resolved);
        assert_eq!(
            transition(&resolved, AlertStatus::New),
            Err(LifecycleError::InvalidTransition {
                from: AlertStatus::Resolved,
                to: AlertStatus::New,
            })
        );
        assert!(AlertStatus::Dismissed.is_terminal());
        assert!(!AlertStatus::Dismissed.can_transition_to(AlertStatus::Acknowledged));
    }

    #[test]
    fn cannot_skip_acknowledgement() {
        assert!(transition(&alert(AlertStatus::New), AlertStatus::InProgress).is_err());
    }

    #[test]
    fn snoozed_alert_returns_after_window() {
        let now = at("2026-03-02T10:00:00Z");
        let snoozed = snooze_until(&alert(AlertStatus::New), now + Duration::hours(4)).unwrap();
        assert!(!is_active(&snoozed, now));
        assert!(!is_active(&snoozed, now + Duration::hours(3)));
        assert!(is_active(&snoozed, now + Duration::hours(4)));

        let woken = transition(&snoozed, AlertStatus::New).unwrap();
        assert_eq!(woken.governance().and_then(|g| g.snoozed_until), None);
    }

    #[test]
    fn active_view_filters_retired_alerts() {
        let now = at("2026-03-02T10:00:00Z");
        let events = vec![
            alert(AlertStatus::New),
            alert(AlertStatus::Resolved),
            alert(AlertStatus::Dismissed),
            alert(AlertStatus::InProgress),
            alert(AlertStatus::Snoozed),
        ];
        let active = active_alerts(&events, now);
        assert_eq!(active.len(), 2);
    }
}
