use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use serde_json::Value;
use tracing::info;

use crate::policy::settings::MAX_SNOOZE_HOURS;
use crate::policy::AlertSettings;

pub const SETTINGS_ENV: &str = "ALERT_ENGINE_SETTINGS";

/// Settings file from the flag, else from `ALERT_ENGINE_SETTINGS`, else built-in defaults.
pub fn resolve_settings(path: Option<&Path>) -> anyhow::Result<AlertSettings> {
    let from_env = std::env::var_os(SETTINGS_ENV).map(PathBuf::from);
    match path.map(Path::to_path_buf).or(from_env) {
        Some(path) => load_settings(&path),
        None => Ok(AlertSettings::default()),
    }
}

pub fn load_settings(path: &Path) -> anyhow::Result<AlertSettings> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read settings from {}", path.display()))?;
    let settings = parse_settings(&raw)
        .with_context(|| format!("invalid alert settings in {}", path.display()))?;
    info!(path = %path.display(), "alert settings loaded");
    Ok(settings)
}

/// Deep-merges a partial JSON settings document over the defaults. Unknown keys are an error
/// at every level.
pub fn parse_settings(raw: &str) -> anyhow::Result<AlertSettings> {
    let partial: Value = serde_json::from_str(raw).context("settings are not valid JSON")?;
    if !partial.is_object() {
        bail!("settings must be a JSON object");
    }
    let settings = AlertSettings::default()
        .merged_with(&partial)
        .context("settings do not match the expected shape")?;

    if settings.dedupe_window_ms < 0 {
        bail!("dedupe_window_ms must not be negative");
    }
    let hours = settings.default_snooze_hours;
    if !(hours.is_finite() && hours > 0.0 && hours <= MAX_SNOOZE_HOURS) {
        bail!("default_snooze_hours must be between 0 and {MAX_SNOOZE_HOURS} hours, got {hours}");
    }
    if let Some(day) = settings.quiet_hours.days_of_week.iter().find(|day| **day > 6) {
        bail!("quiet_hours.days_of_week holds {day}; days run from 0 (Sunday) to 6 (Saturday)");
    }
    Ok(settings)
}
