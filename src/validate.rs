//! Runtime checks applied to alerts and detector output before policy code sees them.
//!
//! Records arriving from storage or other services are loosely typed
//! ([`AlertEventRecord`]); converting one into an [`AlertEvent`] is the only way in, and the
//! conversion refuses out-of-range confidences, unknown enum literals and unparsable
//! timestamps instead of coercing them.

use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::models::{
    AlertAction, AlertEvent, AlertKind, AlertMetadata, AlertSeverity, AlertStatus,
    DetectorResult, SourceRef, SourceType,
};

pub trait InvariantCheck {
    fn validate(&self) -> Result<(), ValidationError>;
}

impl InvariantCheck for SourceRef {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_source_ref(self)
    }
}

impl InvariantCheck for DetectorResult {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_detector_result(self)
    }
}

impl InvariantCheck for AlertEvent {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_alert_event(self)
    }
}

pub fn is_valid_confidence(value: f64) -> bool {
    value.is_finite() && (0.0..=1.0).contains(&value)
}

pub fn validate_source_ref(source: &SourceRef) -> Result<(), ValidationError> {
    match source.confidence {
        Some(value) if !is_valid_confidence(value) => Err(ValidationError::ConfidenceOutOfRange {
            field: "sources.confidence",
            value,
        }),
        _ => Ok(()),
    }
}

pub fn validate_detector_result(result: &DetectorResult) -> Result<(), ValidationError> {
    if !is_valid_confidence(result.score) {
        return Err(ValidationError::ScoreOutOfRange(result.score));
    }
    if !is_valid_confidence(result.confidence) {
        return Err(ValidationError::ConfidenceOutOfRange {
            field: "confidence",
            value: result.confidence,
        });
    }
    result.sources.iter().try_for_each(validate_source_ref)
}

pub fn validate_alert_event(event: &AlertEvent) -> Result<(), ValidationError> {
    if event.id.trim().is_empty() {
        return Err(ValidationError::MissingField("id"));
    }
    if event.student_id.trim().is_empty() {
        return Err(ValidationError::MissingField("student_id"));
    }
    if !is_valid_confidence(event.confidence) {
        return Err(ValidationError::ConfidenceOutOfRange {
            field: "confidence",
            value: event.confidence,
        });
    }
    event.sources.iter().try_for_each(validate_source_ref)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRefRecord {
    #[serde(rename = "type")]
    pub source_type: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl TryFrom<SourceRefRecord> for SourceRef {
    type Error = ValidationError;

    fn try_from(record: SourceRefRecord) -> Result<Self, Self::Error> {
        let source_type = SourceType::parse(&record.source_type)
            .ok_or_else(|| ValidationError::UnknownSourceType(record.source_type.clone()))?;
        let source = SourceRef {
            source_type,
            label: record.label,
            confidence: record.confidence,
            evidence: record.evidence,
            parameters: record.parameters,
        };
        validate_source_ref(&source)?;
        Ok(source)
    }
}

/// Loosely typed alert as persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEventRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
    pub kind: String,
    pub severity: String,
    pub status: String,
    pub confidence: f64,
    pub created_at: String,
    #[serde(default)]
    pub dedupe_key: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceRefRecord>,
    #[serde(default)]
    pub metadata: Option<AlertMetadata>,
    #[serde(default)]
    pub actions: Vec<AlertAction>,
}

impl TryFrom<AlertEventRecord> for AlertEvent {
    type Error = ValidationError;

    fn try_from(record: AlertEventRecord) -> Result<Self, Self::Error> {
        let id = record
            .id
            .filter(|value| !value.trim().is_empty())
            .ok_or(ValidationError::MissingField("id"))?;
        let student_id = record
            .student_id
            .filter(|value| !value.trim().is_empty())
            .ok_or(ValidationError::MissingField("student_id"))?;
        let kind =
            AlertKind::parse(&record.kind).ok_or(ValidationError::UnknownKind(record.kind))?;
        let severity = AlertSeverity::parse(&record.severity)
            .ok_or(ValidationError::UnknownSeverity(record.severity))?;
        let status = AlertStatus::parse(&record.status)
            .ok_or(ValidationError::UnknownStatus(record.status))?;
        let created_at = DateTime::parse_from_rfc3339(&record.created_at)
            .map_err(|_| ValidationError::InvalidTimestamp(record.created_at.clone()))?;
        let sources = record
            .sources
            .into_iter()
            .map(SourceRef::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let event = AlertEvent {
            id,
            student_id,
            kind,
            severity,
            status,
            confidence: record.confidence,
            created_at,
            dedupe_key: record.dedupe_key,
            sources,
            metadata: record.metadata,
            actions: record.actions,
        };
        validate_alert_event(&event)?;
        Ok(event)
    }
}

/// Boolean form of the record conversion, for callers that only need to filter.
pub fn is_valid_alert_record(record: &AlertEventRecord) -> bool {
    AlertEvent::try_from(record.clone()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AlertEventRecord {
        AlertEventRecord {
            id: Some("alert-1".to_string()),
            student_id: Some("stu-1".to_string()),
            kind: "behavior_spike".to_string(),
            severity: "moderate".to_string(),
            status: "new".to_string(),
            confidence: 0.8,
            created_at: "2026-03-02T10:15:00+01:00".to_string(),
            dedupe_key: None,
            sources: vec![],
            metadata: None,
            actions: vec![],
        }
    }

    #[test]
    fn accepts_well_formed_record() {
        let event = AlertEvent::try_from(record()).unwrap();
        assert_eq!(event.kind, AlertKind::BehaviorSpike);
        assert_eq!(event.severity, AlertSeverity::Moderate);
        assert_eq!(event.created_at.offset().local_minus_utc(), 3600);
    }

    #[test]
    fn rejects_out_of_range_confidence() {
        let mut bad = record();
        bad.confidence = 1.2;
        assert!(matches!(
            AlertEvent::try_from(bad),
            Err(ValidationError::ConfidenceOutOfRange { .. })
        ));
        let mut nan = record();
        nan.confidence = f64::NAN;
        assert!(!is_valid_alert_record(&nan));
    }

    #[test]
    fn rejects_unparsable_timestamp() {
        let mut bad = record();
        bad.created_at = "yesterday".to_string();
        assert_eq!(
            AlertEvent::try_from(bad),
            Err(ValidationError::InvalidTimestamp("yesterday".to_string()))
        );
    }

    #[test]
    fn rejects_unknown_enum_literals_instead_of_defaulting() {
        let mut kind = record();
        kind.kind = "mood".to_string();
        assert_eq!(
            AlertEvent::try_from(kind),
            Err(ValidationError::UnknownKind("mood".to_string()))
        );

        let mut status = record();
        status.status = "closed".to_string();
        assert!(matches!(
            AlertEvent::try_from(status),
            Err(ValidationError::UnknownStatus(_))
        ));

        let mut severity = record();
        severity.severity = "urgent".to_string();
        assert!(matches!(
            AlertEvent::try_from(severity),
            Err(ValidationError::UnknownSeverity(_))
        ));
    }

    #[test]
    fn rejects_missing_student() {
        let mut bad = record();
        bad.student_id = Some("  ".to_string());
        assert_eq!(
            AlertEvent::try_from(bad),
            Err(ValidationError::MissingField("student_id"))
        );
    }

    #[test]
    fn unset_source_confidence_is_valid() {
        let mut with_source = record();
        with_source.sources.push(SourceRefRecord {
            source_type: "teacher_action".to_string(),
            label: Some("note".to_string()),
            confidence: None,
            evidence: None,
            parameters: serde_json::Map::new(),
        });
        let event = AlertEvent::try_from(with_source).unwrap();
        assert_eq!(event.sources[0].confidence, None);
    }

    #[test]
    fn source_confidence_out_of_range_is_refused() {
        let mut source = SourceRef::new(SourceType::Sensory);
        source.confidence = Some(-0.1);
        assert!(source.validate().is_err());
    }
}
