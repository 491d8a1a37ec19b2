//! Statistical detectors. Each returns `Some(DetectorResult)` when it has a signal and `None`
//! when the evidence is insufficient; neither case is an error.

pub mod association;
pub mod cusum;
pub mod ewma;

pub use association::{detect_association, AssociationInput, DEFAULT_MIN_SUPPORT};
pub use cusum::{detect_cusum_shift, CusumConfig};
pub use ewma::{detect_ewma_spike, EwmaConfig};

use crate::statistics::{mean, sample_std_dev};

/// A series split into a reference prefix and the trailing points under evaluation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Baseline<'a> {
    pub mean: f64,
    pub std_dev: f64,
    pub recent: &'a [f64],
}

/// Splits off the last `window` points. `None` when the prefix is shorter than
/// `min_baseline`, the series holds non-finite values, or the prefix has no spread.
pub(crate) fn split_baseline(
    series: &[f64],
    window: usize,
    min_baseline: usize,
) -> Option<Baseline<'_>> {
    let window = window.max(1);
    if series.len() < min_baseline.max(2) + window {
        return None;
    }
    if series.iter().any(|value| !value.is_finite()) {
        return None;
    }
    let (reference, recent) = series.split_at(series.len() - window);
    let std_dev = sample_std_dev(reference);
    if !(std_dev > 0.0) {
        return None;
    }
    Some(Baseline {
        mean: mean(reference),
        std_dev,
        recent,
    })
}
