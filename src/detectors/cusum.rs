use serde_json::{json, Map};
use tracing::debug;

use crate::detectors::split_baseline;
use crate::models::{DetectorResult, SourceRef, SourceType};
use crate::tuning::{
    adjust_multiplier_by_baseline_quality, clamp, compute_cusum_decision_interval_multiplier,
    DEFAULT_CUSUM_K_FACTOR, DEFAULT_TARGET_FALSE_ALERTS_PER_N,
};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CusumConfig {
    /// Reference value in sigma units; shifts smaller than this are absorbed.
    pub k_factor: f64,
    pub evaluation_window: usize,
    pub min_baseline: usize,
    pub target_false_alerts_per_n: f64,
    pub baseline_quality: Option<f64>,
}

impl Default for CusumConfig {
    fn default() -> Self {
        Self {
            k_factor: DEFAULT_CUSUM_K_FACTOR,
            evaluation_window: 7,
            min_baseline: 7,
            target_false_alerts_per_n: DEFAULT_TARGET_FALSE_ALERTS_PER_N,
            baseline_quality: None,
        }
    }
}

/// Upper one-sided CUSUM over the trailing window, standardised against the prefix.
pub fn detect_cusum_shift(label: &str, series: &[f64], config: &CusumConfig) -> Option<DetectorResult> {
    let baseline = split_baseline(series, config.evaluation_window, config.min_baseline)?;
    let k = if config.k_factor.is_finite() && config.k_factor > 0.0 {
        config.k_factor
    } else {
        DEFAULT_CUSUM_K_FACTOR
    };
    let h = adjust_multiplier_by_baseline_quality(
        compute_cusum_decision_interval_multiplier(k, config.target_false_alerts_per_n),
        config.baseline_quality,
    );

    let mut statistic: f64 = 0.0;
    let mut peak: f64 = 0.0;
    for value in baseline.recent {
        let z = (value - baseline.mean) / baseline.std_dev;
        statistic = (statistic + z - k).max(0.0);
        peak = peak.max(statistic);
    }

    if !(peak > h) {
        debug!(label, peak, h, "cusum: below decision interval");
        return None;
    }

    let score = peak / (2.0 * h);
    let confidence = clamp(1.0 - h / (2.0 * peak), 0.0, 0.99);

    let mut parameters = Map::new();
    parameters.insert("method".to_string(), json!("cusum"));
    parameters.insert("k".to_string(), json!(k));
    parameters.insert("h".to_string(), json!(h));
    parameters.insert("peak".to_string(), json!(peak));
    parameters.insert("final".to_string(), json!(statistic));
    parameters.insert("baseline_mean".to_string(), json!(baseline.mean));
    parameters.insert("baseline_sd".to_string(), json!(baseline.std_dev));
    parameters.insert("window".to_string(), json!(baseline.recent.len()));

    let mut source = SourceRef::new(SourceType::PatternEngine);
    source.label = Some(label.to_string());
    source.confidence = Some(confidence);
    source.evidence = Some(format!("CUSUM peaked at {peak:.2} against h={h:.2}"));
    source.parameters = parameters;

    DetectorResult::try_new(score, confidence, vec![source])
        .map(|result| result.with_impact_hint(format!("{label} has shifted upward and stayed there")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<f64> {
        vec![4.0, 5.0, 6.0, 5.0, 4.0, 5.0, 6.0, 5.0, 4.0, 6.0]
    }

    #[test]
    fn sustained_shift_crosses_interval() {
        let mut series = history();
        series.extend([7.0, 7.5, 7.0, 8.0, 7.5, 7.0, 7.5]);
        let result = detect_cusum_shift("frustrated", &series, &CusumConfig::default()).unwrap();
        assert!(result.confidence > 0.5);
        let params = &result.sources[0].parameters;
        assert!(params["peak"].as_f64().unwrap() > params["h"].as_f64().unwrap());
    }

    #[test]
    fn single_blip_is_absorbed() {
        let mut series = history();
        series.extend([5.0, 5.0, 8.0, 5.0, 4.0, 5.0, 5.0]);
        assert!(detect_cusum_shift("blip", &series, &CusumConfig::default()).is_none());
    }

    #[test]
    fn invalid_k_falls_back_to_default() {
        let mut series = history();
        series.extend([7.0, 7.5, 7.0, 8.0, 7.5, 7.0, 7.5]);
        let config = CusumConfig {
            k_factor: -1.0,
            ..CusumConfig::default()
        };
        let result = detect_cusum_shift("x", &series, &config).unwrap();
        assert_eq!(result.sources[0].parameters["k"], json!(0.5));
    }
}
