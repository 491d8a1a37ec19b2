use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

use crate::models::{
    derive_dedupe_key, ActionKind, AlertAction, AlertEvent, AlertKind, AlertMetadata,
    AlertSeverity, AlertStatus, DetectorResult,
};

/// What the alert-creation layer knows about a detector hit besides the result itself.
#[derive(Debug, Clone)]
pub struct AlertDraft<'a> {
    pub student_id: &'a str,
    pub kind: AlertKind,
    pub label: &'a str,
    pub context_key: Option<&'a str>,
    pub created_at: DateTime<FixedOffset>,
    pub sparkline: Option<Vec<f64>>,
}

pub fn severity_for(result: &DetectorResult) -> AlertSeverity {
    if result.confidence >= 0.95 && result.score >= 0.6 {
        AlertSeverity::Important
    } else if result.confidence >= 0.85 {
        AlertSeverity::Moderate
    } else {
        AlertSeverity::Low
    }
}

pub fn default_actions(kind: AlertKind) -> Vec<AlertAction> {
    let mut actions = vec![AlertAction {
        id: "acknowledge".to_string(),
        label: "Acknowledge".to_string(),
        kind: ActionKind::Acknowledge,
    }];
    if matches!(
        kind,
        AlertKind::Safety | AlertKind::BehaviorSpike | AlertKind::InterventionDue
    ) {
        actions.push(AlertAction {
            id: "start-intervention".to_string(),
            label: "Start intervention".to_string(),
            kind: ActionKind::StartIntervention,
        });
    }
    actions.push(AlertAction {
        id: "snooze".to_string(),
        label: "Snooze".to_string(),
        kind: ActionKind::Snooze,
    });
    actions.push(AlertAction {
        id: "dismiss".to_string(),
        label: "Dismiss".to_string(),
        kind: ActionKind::Dismiss,
    });
    actions
}

/// Turns a detector result into a new, unacknowledged alert.
pub fn build_alert(draft: AlertDraft<'_>, result: &DetectorResult) -> AlertEvent {
    let summary = result
        .impact_hint
        .clone()
        .unwrap_or_else(|| format!("{} flagged by {}", draft.label, draft.kind));

    AlertEvent {
        id: Uuid::new_v4().to_string(),
        student_id: draft.student_id.to_string(),
        kind: draft.kind,
        severity: severity_for(result),
        status: AlertStatus::New,
        confidence: result.confidence,
        created_at: draft.created_at,
        dedupe_key: Some(derive_dedupe_key(
            draft.student_id,
            draft.kind,
            draft.context_key,
        )),
        sources: result.sources.clone(),
        metadata: Some(AlertMetadata {
            label: Some(draft.label.to_string()),
            summary: Some(summary),
            sparkline: draft.sparkline,
            context_key: draft.context_key.map(str::to_string),
            ..AlertMetadata::default()
        }),
        actions: default_actions(draft.kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validate::validate_alert_event;

    fn result(score: f64, confidence: f64) -> DetectorResult {
        DetectorResult::try_new(score, confidence, vec![]).unwrap()
    }

    #[test]
    fn severity_tiers() {
        assert_eq!(severity_for(&result(0.8, 0.97)), AlertSeverity::Important);
        assert_eq!(severity_for(&result(0.3, 0.97)), AlertSeverity::Moderate);
        assert_eq!(severity_for(&result(0.9, 0.75)), AlertSeverity::Low);
    }

    #[test]
    fn built_alert_is_valid_and_keyed() {
        let created_at = DateTime::parse_from_rfc3339("2026-03-02T09:00:00-05:00").unwrap();
        let alert = build_alert(
            AlertDraft {
                student_id: "stu-3",
                kind: AlertKind::ContextAssociation,
                label: "noise -> overwhelmed",
                context_key: Some("noise"),
                created_at,
                sparkline: Some(vec![1.0, 2.0]),
            },
            &result(0.9, 0.99).with_impact_hint("overwhelmed is more likely"),
        );
        assert!(validate_alert_event(&alert).is_ok());
        assert_eq!(alert.status, AlertStatus::New);
        assert_eq!(
            alert.dedupe_key.as_deref(),
            Some("stu-3:context_association:noise")
        );
        assert_eq!(alert.effective_dedupe_key(), "stu-3:context_association:noise");
        let metadata = alert.metadata.unwrap();
        assert_eq!(metadata.summary.as_deref(), Some("overwhelmed is more likely"));
        assert_eq!(metadata.context_key.as_deref(), Some("noise"));
    }

    #[test]
    fn spikes_offer_intervention_action() {
        let kinds: Vec<ActionKind> = default_actions(AlertKind::BehaviorSpike)
            .into_iter()
            .map(|a| a.kind)
            .collect();
        assert!(kinds.contains(&ActionKind::StartIntervention));
        let kinds: Vec<ActionKind> = default_actions(AlertKind::DataQuality)
            .into_iter()
            .map(|a| a.kind)
            .collect();
        assert!(!kinds.contains(&ActionKind::StartIntervention));
    }
}
