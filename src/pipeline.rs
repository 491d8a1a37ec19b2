use serde_json::{json, Map};
use tracing::{debug, info};

use crate::alerts::{build_alert, AlertDraft};
use crate::detectors::{
    detect_association, detect_cusum_shift, detect_ewma_spike, AssociationInput, CusumConfig,
    EwmaConfig, DEFAULT_MIN_SUPPORT,
};
use crate::ingest::{association_candidates, intensity_series};
use crate::models::{AlertEvent, AlertKind, DetectorResult, TrackingEntry};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionOptions {
    pub min_support: u64,
    pub ewma: EwmaConfig,
    pub cusum: CusumConfig,
    /// Feed each series' day coverage into the multiplier adjustment.
    pub use_baseline_quality: bool,
}

impl Default for DetectionOptions {
    fn default() -> Self {
        Self {
            min_support: DEFAULT_MIN_SUPPORT,
            ewma: EwmaConfig::default(),
            cusum: CusumConfig::default(),
            use_baseline_quality: true,
        }
    }
}

fn log_odds_of(result: &DetectorResult) -> Option<f64> {
    result.sources.first()?.parameters.get("log_odds")?.as_f64()
}

/// Runs every detector over the entries and returns ungated alert candidates.
pub fn detect_candidates(entries: &[TrackingEntry], options: &DetectionOptions) -> Vec<AlertEvent> {
    let mut candidates = Vec::new();

    for candidate in association_candidates(entries) {
        let label = format!("{} -> {}", candidate.context, candidate.emotion);
        let mut context = Map::new();
        context.insert("student_id".to_string(), json!(candidate.student_id));
        context.insert("context".to_string(), json!(candidate.context));
        context.insert("emotion".to_string(), json!(candidate.emotion));

        let input = AssociationInput {
            label: &label,
            table: candidate.table,
            series_x: Some(candidate.context_daily.as_slice()),
            series_y: Some(candidate.emotion_daily.as_slice()),
            min_support: Some(options.min_support),
            context,
        };
        let Some(result) = detect_association(&input) else {
            continue;
        };
        // Protective contexts are not alert-worthy.
        if log_odds_of(&result).map_or(true, |value| value <= 0.0) {
            debug!(label = %label, "association is negative, skipping");
            continue;
        }
        candidates.push(build_alert(
            AlertDraft {
                student_id: &candidate.student_id,
                kind: AlertKind::ContextAssociation,
                label: &label,
                context_key: Some(candidate.context.as_str()),
                created_at: candidate.latest_at,
                sparkline: Some(candidate.emotion_daily.clone()),
            },
            &result,
        ));
    }

    for series in intensity_series(entries) {
        let quality = options.use_baseline_quality.then_some(series.coverage);
        let label = format!("{} intensity", series.emotion);
        let draft = |kind: AlertKind| AlertDraft {
            student_id: &series.student_id,
            kind,
            label: &label,
            context_key: Some(series.emotion.as_str()),
            created_at: series.latest_at,
            sparkline: Some(series.values.clone()),
        };

        let ewma = EwmaConfig {
            baseline_quality: quality,
            ..options.ewma
        };
        if let Some(result) = detect_ewma_spike(&label, &series.values, &ewma) {
            candidates.push(build_alert(draft(AlertKind::BehaviorSpike), &result));
        }

        let cusum = CusumConfig {
            baseline_quality: quality,
            ..options.cusum
        };
        if let Some(result) = detect_cusum_shift(&label, &series.values, &cusum) {
            candidates.push(build_alert(draft(AlertKind::PatternDetected), &result));
        }
    }

    info!(entries = entries.len(), candidates = candidates.len(), "detection pass complete");
    candidates
}
