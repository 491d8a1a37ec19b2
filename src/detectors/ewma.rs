use serde_json::{json, Map};
use tracing::debug;

use crate::detectors::split_baseline;
use crate::models::{DetectorResult, SourceRef, SourceType};
use crate::statistics::standard_normal_cdf;
use crate::tuning::{
    adjust_multiplier_by_baseline_quality, clamp, compute_ewma_control_multiplier,
    DEFAULT_TARGET_FALSE_ALERTS_PER_N,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EwmaConfig {
    /// Smoothing weight of the newest observation.
    pub lambda: f64,
    pub evaluation_window: usize,
    pub min_baseline: usize,
    pub target_false_alerts_per_n: f64,
    pub baseline_quality: Option<f64>,
}

impl Default for EwmaConfig {
    fn default() -> Self {
        Self {
            lambda: 0.2,
            evaluation_window: 7,
            min_baseline: 7,
            target_false_alerts_per_n: DEFAULT_TARGET_FALSE_ALERTS_PER_N,
            baseline_quality: None,
        }
    }
}

/// Flags an upward spike when the EWMA of the trailing window breaches its control limit.
pub fn detect_ewma_spike(label: &str, series: &[f64], config: &EwmaConfig) -> Option<DetectorResult> {
    let baseline = split_baseline(series, config.evaluation_window, config.min_baseline)?;
    let lambda = clamp(config.lambda, 0.01, 1.0);
    let multiplier = adjust_multiplier_by_baseline_quality(
        compute_ewma_control_multiplier(config.target_false_alerts_per_n),
        config.baseline_quality,
    );

    let smoothed = baseline
        .recent
        .iter()
        .fold(baseline.mean, |acc, value| lambda * value + (1.0 - lambda) * acc);
    let steps = baseline.recent.len() as i32;
    let variance_factor = lambda / (2.0 - lambda) * (1.0 - (1.0 - lambda).powi(2 * steps));
    let limit_sd = baseline.std_dev * variance_factor.sqrt();
    let z_stat = (smoothed - baseline.mean) / limit_sd;

    if !z_stat.is_finite() || z_stat <= multiplier {
        debug!(label, z_stat, multiplier, "ewma: within control limit");
        return None;
    }

    let score = z_stat / (2.0 * multiplier);
    let confidence = clamp(2.0 * standard_normal_cdf(z_stat) - 1.0, 0.0, 0.99);

    let mut parameters = Map::new();
    parameters.insert("method".to_string(), json!("ewma"));
    parameters.insert("lambda".to_string(), json!(lambda));
    parameters.insert("multiplier".to_string(), json!(multiplier));
    parameters.insert("baseline_mean".to_string(), json!(baseline.mean));
    parameters.insert("baseline_sd".to_string(), json!(baseline.std_dev));
    parameters.insert("ewma".to_string(), json!(smoothed));
    parameters.insert("upper_limit".to_string(), json!(baseline.mean + multiplier * limit_sd));
    parameters.insert("z".to_string(), json!(z_stat));
    parameters.insert("window".to_string(), json!(baseline.recent.len()));

    let mut source = SourceRef::new(SourceType::PatternEngine);
    source.label = Some(label.to_string());
    source.confidence = Some(confidence);
    source.evidence = Some(format!(
        "EWMA {:.2} above control limit {:.2} (baseline {:.2})",
        smoothed,
        baseline.mean + multiplier * limit_sd,
        baseline.mean
    ));
    source.parameters = parameters;

    DetectorResult::try_new(score, confidence, vec![source])
        .map(|result| result.with_impact_hint(format!("{label} rose above its usual range")))
}
