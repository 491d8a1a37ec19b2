//! Context/outcome association from a 2x2 table plus optional paired daily series.

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::models::{ContingencyTable, DetectorResult, SourceRef, SourceType};
use crate::statistics::{fisher_exact_two_tailed, p_value_for_correlation, pearson_correlation};
use crate::tuning::clamp;

pub const DEFAULT_MIN_SUPPORT: u64 = 5;
const MIN_SERIES_POINTS: usize = 5;
const Z_95: f64 = 1.96;
const CONTINUITY_CORRECTION: f64 = 0.5;
const MIN_CONFIDENCE: f64 = 0.7;
const MAX_CONFIDENCE: f64 = 0.99;

#[derive(Debug, Clone, Default)]
pub struct AssociationInput<'a> {
    pub label: &'a str,
    pub table: ContingencyTable,
    pub series_x: Option<&'a [f64]>,
    pub series_y: Option<&'a [f64]>,
    /// Defaults to [`DEFAULT_MIN_SUPPORT`].
    pub min_support: Option<u64>,
    /// Caller context echoed into the source payload.
    pub context: Map<String, Value>,
}

#[derive(Debug, Clone, Copy)]
struct CorrelationEvidence {
    r: f64,
    p_value: f64,
    n: usize,
}

/// Emits a result only when the Woolf 95% interval on the log odds ratio excludes zero.
pub fn detect_association(input: &AssociationInput<'_>) -> Option<DetectorResult> {
    let table = input.table;
    let support = table.total();
    let min_support = input.min_support.unwrap_or(DEFAULT_MIN_SUPPORT);
    if support < min_support {
        debug!(label = input.label, support, min_support, "association: insufficient support");
        return None;
    }

    let cell = |count: u64| {
        if count == 0 {
            CONTINUITY_CORRECTION
        } else {
            count as f64
        }
    };
    let (a, b, c, d) = (cell(table.a), cell(table.b), cell(table.c), cell(table.d));

    let odds_ratio = (a * d) / (b * c);
    let log_odds = odds_ratio.ln();
    let standard_error = (1.0 / a + 1.0 / b + 1.0 / c + 1.0 / d).sqrt();
    let ci_low = log_odds - Z_95 * standard_error;
    let ci_high = log_odds + Z_95 * standard_error;

    if !log_odds.is_finite() || (ci_low <= 0.0 && ci_high >= 0.0) {
        debug!(
            label = input.label,
            log_odds, ci_low, ci_high, "association: interval straddles zero"
        );
        return None;
    }

    let fisher_p = fisher_exact_two_tailed(table.a, table.b, table.c, table.d);
    let correlation = paired_correlation(input.series_x, input.series_y);

    let mut confidence = (1.0 - fisher_p).max(1.0 - 1.0 / (1.0 + log_odds.abs()));
    if let Some(evidence) = correlation {
        confidence = confidence.max(1.0 - evidence.p_value);
    }
    let confidence = clamp(confidence, MIN_CONFIDENCE, MAX_CONFIDENCE);

    let effect = log_odds.abs() / 2.0;
    let score = match correlation {
        Some(evidence) => evidence.r.abs().min(effect),
        None => effect,
    };
    let score = clamp(score, 0.0, 1.0);

    let mut source = SourceRef::new(SourceType::PatternEngine);
    source.label = Some(input.label.to_string());
    source.confidence = Some(confidence);
    source.evidence = Some(format!(
        "odds ratio {:.2} (95% CI {:.2}-{:.2}), Fisher p={:.4}, n={}",
        odds_ratio,
        ci_low.exp(),
        ci_high.exp(),
        fisher_p,
        support
    ));
    source.parameters = statistical_payload(
        input,
        odds_ratio,
        log_odds,
        (ci_low, ci_high),
        fisher_p,
        correlation,
    );

    let direction = if log_odds > 0.0 {
        "more likely"
    } else {
        "less likely"
    };
    DetectorResult::try_new(score, confidence, vec![source]).map(|result| {
        result.with_impact_hint(format!("{} is {} in this context", input.label, direction))
    })
}

fn paired_correlation(x: Option<&[f64]>, y: Option<&[f64]>) -> Option<CorrelationEvidence> {
    let (x, y) = (x?, y?);
    if x.len() < MIN_SERIES_POINTS || y.len() < MIN_SERIES_POINTS {
        return None;
    }
    let n = x.len().min(y.len());
    let r = pearson_correlation(&x[..n], &y[..n]);
    Some(CorrelationEvidence {
        r,
        p_value: p_value_for_correlation(r, n),
        n,
    })
}

fn statistical_payload(
    input: &AssociationInput<'_>,
    odds_ratio: f64,
    log_odds: f64,
    ci: (f64, f64),
    fisher_p: f64,
    correlation: Option<CorrelationEvidence>,
) -> Map<String, Value> {
    let table = input.table;
    let mut payload = Map::new();
    payload.insert(
        "contingency".to_string(),
        json!({ "a": table.a, "b": table.b, "c": table.c, "d": table.d }),
    );
    payload.insert("odds_ratio".to_string(), json!(odds_ratio));
    payload.insert("log_odds".to_string(), json!(log_odds));
    payload.insert("ci_log_odds".to_string(), json!([ci.0, ci.1]));
    payload.insert("fisher_p".to_string(), json!(fisher_p));
    payload.insert(
        "correlation".to_string(),
        match correlation {
            Some(evidence) => json!({
                "r": evidence.r,
                "p_value": evidence.p_value,
                "n": evidence.n,
            }),
            None => Value::Null,
        },
    );
    payload.insert("support".to_string(), json!(table.total()));
    payload.insert("context".to_string(), Value::Object(input.context.clone()));
    payload
}
