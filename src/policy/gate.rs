use chrono::{Duration, Utc};
use serde::Serialize;
use tracing::debug;

use crate::models::AlertEvent;
use crate::policy::settings::AlertSettings;
use crate::policy::snooze::SnoozeStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    Snoozed,
    QuietHours,
    KindCapReached,
    SeverityCapReached,
    /// Folded into an alert raised by an earlier pass.
    Duplicate,
}

impl std::fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuppressionReason::Snoozed => write!(f, "snoozed"),
            SuppressionReason::QuietHours => write!(f, "quiet hours"),
            SuppressionReason::KindCapReached => write!(f, "daily cap for kind reached"),
            SuppressionReason::SeverityCapReached => write!(f, "daily cap for severity reached"),
            SuppressionReason::Duplicate => write!(f, "duplicate of an earlier alert"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateDecision {
    pub allowed: bool,
    pub reason: Option<SuppressionReason>,
}

impl GateDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    fn deny(reason: SuppressionReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Decides whether `candidate` may be raised, given alerts already raised for the cohort and
/// the active snoozes. All time comparisons use the candidate's own `created_at`.
pub fn can_create_alert(
    candidate: &AlertEvent,
    settings: &AlertSettings,
    history: &[AlertEvent],
    snoozes: &SnoozeStore,
) -> GateDecision {
    let decision = evaluate(candidate, settings, history, snoozes);
    if let Some(reason) = decision.reason {
        debug!(
            student_id = %candidate.student_id,
            kind = %candidate.kind,
            severity = %candidate.severity,
            %reason,
            "alert gated"
        );
    }
    decision
}

fn evaluate(
    candidate: &AlertEvent,
    settings: &AlertSettings,
    history: &[AlertEvent],
    snoozes: &SnoozeStore,
) -> GateDecision {
    let key = candidate.effective_dedupe_key();
    if snoozes.is_snoozed(
        &candidate.student_id,
        &key,
        candidate.created_at.with_timezone(&Utc),
    ) {
        return GateDecision::deny(SuppressionReason::Snoozed);
    }

    let quiet = &settings.quiet_hours;
    if candidate.severity < quiet.override_severity && quiet.is_active_at(&candidate.created_at)
    {
        return GateDecision::deny(SuppressionReason::QuietHours);
    }

    let since = candidate.created_at - Duration::hours(24);
    let recent: Vec<&AlertEvent> = history
        .iter()
        .filter(|event| {
            event.id != candidate.id
                && event.student_id == candidate.student_id
                && event.created_at > since
                && event.created_at <= candidate.created_at
        })
        .collect();

    if let Some(&limit) = settings.caps.max_per_day_by_kind.get(&candidate.kind) {
        let count = recent.iter().filter(|e| e.kind == candidate.kind).count();
        if count >= limit as usize {
            return GateDecision::deny(SuppressionReason::KindCapReached);
        }
    }
    if let Some(&limit) = settings.caps.max_per_day_by_severity.get(&candidate.severity) {
        let count = recent
            .iter()
            .filter(|e| e.severity == candidate.severity)
            .count();
        if count >= limit as usize {
            return GateDecision::deny(SuppressionReason::SeverityCapReached);
        }
    }

    GateDecision::allow()
}

/// Copy of `event` with its severity lowered to the configured cap, if any.
pub fn apply_severity_caps(event: &AlertEvent, settings: &AlertSettings) -> AlertEvent {
    let mut capped = event.clone();
    if let Some(cap) = settings.severity_cap_for(event.kind) {
        capped.severity = capped.severity.min(cap);
    }
    capped
}
