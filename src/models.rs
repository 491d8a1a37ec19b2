use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Declares a closed, string-backed enumeration whose wire form is the snake_case literal.
macro_rules! literal_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident { $($variant:ident => $literal:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $literal)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $literal,)+
                }
            }

            pub fn parse(value: &str) -> Option<Self> {
                match value {
                    $($literal => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

literal_enum! {
    /// Category of evidence behind a detector result or alert.
    pub enum SourceType {
        Emotion => "emotion",
        Sensory => "sensory",
        Environmental => "environmental",
        PatternEngine => "pattern_engine",
        TeacherAction => "teacher_action",
        Goal => "goal",
    }
}

literal_enum! {
    pub enum AlertKind {
        Safety => "safety",
        BehaviorSpike => "behavior_spike",
        ContextAssociation => "context_association",
        InterventionDue => "intervention_due",
        DataQuality => "data_quality",
        ImprovementNoted => "improvement_noted",
        PatternDetected => "pattern_detected",
    }
}

literal_enum! {
    /// Ordered from least to most urgent so `Ord` ranks severities.
    pub enum AlertSeverity {
        Low => "low",
        Moderate => "moderate",
        Important => "important",
        Critical => "critical",
    }
}

literal_enum! {
    pub enum AlertStatus {
        New => "new",
        Acknowledged => "acknowledged",
        InProgress => "in_progress",
        Resolved => "resolved",
        Snoozed => "snoozed",
        Dismissed => "dismissed",
    }
}

literal_enum! {
    pub enum ActionKind {
        Acknowledge => "acknowledge",
        StartIntervention => "start_intervention",
        Resolve => "resolve",
        Snooze => "snooze",
        Dismiss => "dismiss",
        ViewDetails => "view_details",
    }
}

literal_enum! {
    /// Who is looking at the alert feed; severity caps can differ per role.
    pub enum ViewerRole {
        Teacher => "teacher",
        Counselor => "counselor",
        Administrator => "administrator",
        Parent => "parent",
    }
}

literal_enum! {
    /// Named bundle of per-kind severity caps.
    pub enum SchoolPreset {
        Elementary => "elementary",
        Middle => "middle",
        High => "high",
    }
}

/// Evidence contributing to a detector result or alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// `None` means unset, which is not the same as zero.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub parameters: serde_json::Map<String, serde_json::Value>,
}

impl SourceRef {
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            label: None,
            confidence: None,
            evidence: None,
            parameters: serde_json::Map::new(),
        }
    }
}

/// Output of a statistical detector. Only built through [`DetectorResult::try_new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorResult {
    pub score: f64,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact_hint: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceRef>,
}

impl DetectorResult {
    /// Clamps score and confidence into [0, 1] and returns `None` if the result would still
    /// fail validation (non-finite values, out-of-range source confidence).
    pub fn try_new(score: f64, confidence: f64, sources: Vec<SourceRef>) -> Option<Self> {
        if !score.is_finite() || !confidence.is_finite() {
            return None;
        }
        let result = Self {
            score: score.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            impact_hint: None,
            sources,
        };
        crate::validate::validate_detector_result(&result)
            .ok()
            .map(|_| result)
    }

    pub fn with_impact_hint(mut self, hint: impl Into<String>) -> Self {
        self.impact_hint = Some(hint.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertAction {
    pub id: String,
    pub label: String,
    pub kind: ActionKind,
}

/// Bookkeeping written by dedupe and snooze handling.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GovernanceMetadata {
    #[serde(default)]
    pub suppressed_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snoozed_until: Option<DateTime<FixedOffset>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sparkline: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_key: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub threshold_overrides: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub governance: Option<GovernanceMetadata>,
}

/// A candidate or confirmed alert. Values of this type have already passed validation:
/// deserializing one goes through [`AlertEventRecord`](crate::validate::AlertEventRecord)
/// and its checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "crate::validate::AlertEventRecord")]
pub struct AlertEvent {
    pub id: String,
    pub student_id: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub confidence: f64,
    pub created_at: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedupe_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AlertMetadata>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<AlertAction>,
}

impl AlertEvent {
    pub fn context_key(&self) -> Option<&str> {
        self.metadata.as_ref()?.context_key.as_deref()
    }

    /// Explicit dedupe key, or one derived from student, kind and context.
    pub fn effective_dedupe_key(&self) -> String {
        match &self.dedupe_key {
            Some(key) if !key.is_empty() => key.clone(),
            _ => derive_dedupe_key(&self.student_id, self.kind, self.context_key()),
        }
    }

    pub fn governance(&self) -> Option<&GovernanceMetadata> {
        self.metadata.as_ref()?.governance.as_ref()
    }

    pub fn governance_mut(&mut self) -> &mut GovernanceMetadata {
        self.metadata
            .get_or_insert_with(AlertMetadata::default)
            .governance
            .get_or_insert_with(GovernanceMetadata::default)
    }
}

pub fn derive_dedupe_key(student_id: &str, kind: AlertKind, context_key: Option<&str>) -> String {
    format!("{}:{}:{}", student_id, kind, context_key.unwrap_or("default"))
}

/// One emotion observation as exported by the tracking front end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub student_id: String,
    pub recorded_at: DateTime<FixedOffset>,
    pub emotion: String,
    pub intensity: f64,
    #[serde(default)]
    pub context: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContingencyTable {
    /// exposure present, outcome present
    pub a: u64,
    /// exposure present, outcome absent
    pub b: u64,
    /// exposure absent, outcome present
    pub c: u64,
    /// exposure absent, outcome absent
    pub d: u64,
}

impl ContingencyTable {
    pub fn new(a: u64, b: u64, c: u64, d: u64) -> Self {
        Self { a, b, c, d }
    }

    /// Sum of all four cells, saturating at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.a
            .saturating_add(self.b)
            .saturating_add(self.c)
            .saturating_add(self.d)
    }
}
