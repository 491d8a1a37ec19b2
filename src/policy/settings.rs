use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::models::{AlertKind, AlertSeverity, SchoolPreset, ViewerRole};

pub const DEFAULT_DEDUPE_WINDOW_MS: i64 = 60 * 60 * 1000;
pub const DEFAULT_SNOOZE_HOURS: f64 = 24.0;
/// Longest snooze a settings file may ask for by default: one (leap) year.
pub const MAX_SNOOZE_HOURS: f64 = 24.0 * 366.0;

/// Window of the day during which alerts below `override_severity` are held back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuietHours {
    pub enabled: bool,
    /// `HH:MM`, local to the alert's own offset.
    pub start: String,
    pub end: String,
    /// 0 = Sunday .. 6 = Saturday. Empty means every day.
    pub days_of_week: Vec<u8>,
    /// Alerts at or above this severity pass through quiet hours.
    pub override_severity: AlertSeverity,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: "20:00".to_string(),
            end: "07:00".to_string(),
            days_of_week: (0..=6).collect(),
            override_severity: AlertSeverity::Critical,
        }
    }
}

impl QuietHours {
    /// A window whose start is after its end runs overnight; its day-of-week is the day it
    /// started on. Unparsable times disable the window.
    pub fn is_active_at(&self, at: &DateTime<FixedOffset>) -> bool {
        if !self.enabled {
            return false;
        }
        let (start, end) = match (parse_time_of_day(&self.start), parse_time_of_day(&self.end)) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                warn!(start = %self.start, end = %self.end, "ignoring malformed quiet hours");
                return false;
            }
        };
        if start == end {
            return false;
        }

        let time = at.time();
        let weekday = at.weekday();
        let (inside, window_day) = if start < end {
            (time >= start && time < end, weekday)
        } else if time >= start {
            (true, weekday)
        } else if time < end {
            (true, weekday.pred())
        } else {
            (false, weekday)
        };

        inside
            && (self.days_of_week.is_empty()
                || self
                    .days_of_week
                    .contains(&(window_day.num_days_from_sunday() as u8)))
    }
}

fn parse_time_of_day(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}

/// Daily volume limits per student, counted over the 24 hours before a candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertCaps {
    pub max_per_day_by_kind: BTreeMap<AlertKind, u32>,
    pub max_per_day_by_severity: BTreeMap<AlertSeverity, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertSettings {
    pub quiet_hours: QuietHours,
    pub preset: Option<SchoolPreset>,
    /// Per-kind maximum severity; overrides the preset for the kinds it names.
    pub severity_caps: BTreeMap<AlertKind, AlertSeverity>,
    pub role: Option<ViewerRole>,
    pub role_caps: BTreeMap<ViewerRole, AlertSeverity>,
    pub caps: AlertCaps,
    pub dedupe_window_ms: i64,
    pub default_snooze_hours: f64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            quiet_hours: QuietHours::default(),
            preset: None,
            severity_caps: BTreeMap::new(),
            role: None,
            role_caps: BTreeMap::from([(ViewerRole::Parent, AlertSeverity::Moderate)]),
            caps: AlertCaps::default(),
            dedupe_window_ms: DEFAULT_DEDUPE_WINDOW_MS,
            default_snooze_hours: DEFAULT_SNOOZE_HOURS,
        }
    }
}

impl AlertSettings {
    /// Overlays a partial JSON document on these settings. Objects merge key by key, any other
    /// value replaces what it lands on; `self` is not modified.
    pub fn merged_with(&self, partial: &Value) -> Result<Self, serde_json::Error> {
        let mut base = serde_json::to_value(self)?;
        deep_merge(&mut base, partial);
        serde_json::from_value(base)
    }

    /// Highest severity an alert of `kind` may carry for the configured preset and role.
    /// Safety alerts are never capped.
    pub fn severity_cap_for(&self, kind: AlertKind) -> Option<AlertSeverity> {
        if kind == AlertKind::Safety {
            return None;
        }
        let kind_cap = self
            .severity_caps
            .get(&kind)
            .copied()
            .or_else(|| self.preset.and_then(|preset| preset_cap(preset, kind)));
        let role_cap = self.role.and_then(|role| self.role_caps.get(&role).copied());
        match (kind_cap, role_cap) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }
}

pub fn preset_cap(preset: SchoolPreset, kind: AlertKind) -> Option<AlertSeverity> {
    use AlertSeverity::{Critical, Important, Low, Moderate};
    let cap = match (preset, kind) {
        (_, AlertKind::Safety) => return None,
        (SchoolPreset::Elementary, AlertKind::BehaviorSpike) => Moderate,
        (SchoolPreset::Elementary, AlertKind::InterventionDue) => Important,
        (SchoolPreset::Elementary, _) => Low,
        (SchoolPreset::Middle, AlertKind::BehaviorSpike | AlertKind::InterventionDue) => Important,
        (SchoolPreset::Middle, AlertKind::ContextAssociation | AlertKind::PatternDetected) => {
            Moderate
        }
        (SchoolPreset::Middle, _) => Low,
        (SchoolPreset::High, AlertKind::InterventionDue) => Critical,
        (SchoolPreset::High, AlertKind::BehaviorSpike | AlertKind::ContextAssociation) => {
            Important
        }
        (SchoolPreset::High, AlertKind::PatternDetected | AlertKind::DataQuality) => Moderate,
        (SchoolPreset::High, AlertKind::ImprovementNoted) => Low,
    };
    Some(cap)
}

fn deep_merge(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overlay) => *base = overlay.clone(),
    }
}
