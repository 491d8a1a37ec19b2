//! Control-chart parameters derived from a target false-alert rate.
//!
//! Defaults target one false alert per 336 evaluations: two weeks of hourly checks.

use crate::statistics::inverse_standard_normal_cdf;

pub const DEFAULT_TARGET_FALSE_ALERTS_PER_N: f64 = 336.0;
pub const DEFAULT_CUSUM_K_FACTOR: f64 = 0.5;

const EWMA_FALLBACK_MULTIPLIER: f64 = 3.0;
const EWMA_MIN_MULTIPLIER: f64 = 2.0;
const EWMA_MAX_MULTIPLIER: f64 = 5.0;

const CUSUM_BASE_INTERVAL: f64 = 5.0;
const CUSUM_MIN_INTERVAL: f64 = 4.0;
const CUSUM_MAX_INTERVAL: f64 = 7.5;
/// h shift per unit of ln(N / 336).
const CUSUM_RATE_SLOPE: f64 = 0.15;
const CUSUM_RATE_ADJUSTMENT_LIMIT: f64 = 0.5;
/// h shift per 0.1 of k below 0.5.
const CUSUM_K_SLOPE: f64 = 0.2;
const CUSUM_K_ADJUSTMENT_MIN: f64 = -0.4;
const CUSUM_K_ADJUSTMENT_MAX: f64 = 0.6;

const LOW_QUALITY_THRESHOLD: f64 = 0.6;
const HIGH_QUALITY_THRESHOLD: f64 = 0.9;
const LOW_QUALITY_MAX_INFLATION: f64 = 0.25;
const HIGH_QUALITY_MAX_DEFLATION: f64 = 0.05;

/// Clamps `value` into `[min, max]`, swapping the bounds if they arrive inverted.
/// A non-finite `value` collapses to the lower bound.
pub fn clamp(value: f64, min: f64, max: f64) -> f64 {
    let (lo, hi) = if min > max { (max, min) } else { (min, max) };
    if !value.is_finite() {
        return lo;
    }
    value.max(lo).min(hi)
}

/// Two-sided z multiplier for an EWMA chart expected to false-alarm once per
/// `target_false_alerts_per_n` evaluations: `z = Phi^-1(1 - 1 / (2N))`, clamped to [2, 5].
pub fn compute_ewma_control_multiplier(target_false_alerts_per_n: f64) -> f64 {
    if !target_false_alerts_per_n.is_finite() || target_false_alerts_per_n <= 1.0 {
        return EWMA_FALLBACK_MULTIPLIER;
    }
    let z = inverse_standard_normal_cdf(1.0 - 1.0 / (2.0 * target_false_alerts_per_n));
    if !z.is_finite() || z <= 0.0 {
        return EWMA_FALLBACK_MULTIPLIER;
    }
    clamp(z, EWMA_MIN_MULTIPLIER, EWMA_MAX_MULTIPLIER)
}

/// Decision interval `h` (in sigma units) for an upper CUSUM with reference value `k_factor`.
///
/// This is a tuned heuristic around h = 5 rather than a closed-form average-run-length
/// solution: rarer target false-alert rates push h up logarithmically, smaller reference
/// values push it up linearly. Result is clamped to [4, 7.5].
pub fn compute_cusum_decision_interval_multiplier(
    k_factor: f64,
    target_false_alerts_per_n: f64,
) -> f64 {
    let rate_adjustment =
        if target_false_alerts_per_n.is_finite() && target_false_alerts_per_n > 1.0 {
            clamp(
                CUSUM_RATE_SLOPE * (target_false_alerts_per_n / DEFAULT_TARGET_FALSE_ALERTS_PER_N).ln(),
                -CUSUM_RATE_ADJUSTMENT_LIMIT,
                CUSUM_RATE_ADJUSTMENT_LIMIT,
            )
        } else {
            0.0
        };

    let k = if k_factor.is_finite() && k_factor > 0.0 {
        k_factor
    } else {
        DEFAULT_CUSUM_K_FACTOR
    };
    let k_adjustment = clamp(
        (DEFAULT_CUSUM_K_FACTOR - k) / 0.1 * CUSUM_K_SLOPE,
        CUSUM_K_ADJUSTMENT_MIN,
        CUSUM_K_ADJUSTMENT_MAX,
    );

    clamp(
        CUSUM_BASE_INTERVAL + rate_adjustment + k_adjustment,
        CUSUM_MIN_INTERVAL,
        CUSUM_MAX_INTERVAL,
    )
}

/// Widens control limits for noisy baselines and tightens them slightly for clean ones.
///
/// Quality below 0.6 inflates the multiplier linearly up to +25% at quality 0; quality above
/// 0.9 deflates it up to -5% at quality 1. A missing quality score or an unusable multiplier
/// is passed through untouched.
pub fn adjust_multiplier_by_baseline_quality(multiplier: f64, quality_score: Option<f64>) -> f64 {
    if !multiplier.is_finite() || multiplier <= 0.0 {
        return multiplier;
    }
    let quality = match quality_score {
        Some(q) if q.is_finite() => clamp(q, 0.0, 1.0),
        _ => return multiplier,
    };

    if quality < LOW_QUALITY_THRESHOLD {
        let shortfall = (LOW_QUALITY_THRESHOLD - quality) / LOW_QUALITY_THRESHOLD;
        multiplier * (1.0 + LOW_QUALITY_MAX_INFLATION * shortfall)
    } else if quality > HIGH_QUALITY_THRESHOLD {
        let surplus = (quality - HIGH_QUALITY_THRESHOLD) / (1.0 - HIGH_QUALITY_THRESHOLD);
        multiplier * (1.0 - HIGH_QUALITY_MAX_DEFLATION * surplus)
    } else {
        multiplier
    }
}
