use std::collections::BTreeMap;
use std::fmt::Write;

use crate::models::{AlertEvent, AlertKind};
use crate::policy::{PolicyOutcome, SuppressionReason};

#[derive(Debug, Clone, PartialEq)]
pub struct KindSummary {
    pub kind: AlertKind,
    pub count: usize,
    pub avg_confidence: f64,
}

pub fn summarize_by_kind(alerts: &[AlertEvent]) -> Vec<KindSummary> {
    let mut map: BTreeMap<AlertKind, (usize, f64)> = BTreeMap::new();

    for alert in alerts {
        let entry = map.entry(alert.kind).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += alert.confidence;
    }

    let mut summaries: Vec<KindSummary> = map
        .into_iter()
        .map(|(kind, (count, total_confidence))| KindSummary {
            kind,
            count,
            avg_confidence: if count == 0 {
                0.0
            } else {
                total_confidence / count as f64
            },
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count));
    summaries
}

fn suppressed_total(alert: &AlertEvent) -> u32 {
    alert.governance().map(|g| g.suppressed_count).unwrap_or(0)
}

pub fn build_report(source: &str, outcome: &PolicyOutcome) -> String {
    let summaries = summarize_by_kind(&outcome.emitted);

    let mut output = String::new();
    let _ = writeln!(output, "# Student Alert Report");
    let _ = writeln!(
        output,
        "Generated from {} ({} alerts raised, {} held back by policy)",
        source,
        outcome.emitted.len(),
        outcome.suppressed.len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Alert Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No alerts raised.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} alerts (avg confidence {:.2})",
                summary.kind, summary.count, summary.avg_confidence
            );
        }
    }

    let mut ranked: Vec<&AlertEvent> = outcome.emitted.iter().collect();
    ranked.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then_with(|| b.confidence.total_cmp(&a.confidence))
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Severity Alerts");

    if ranked.is_empty() {
        let _ = writeln!(output, "No alerts raised.");
    } else {
        for alert in ranked.iter().take(10) {
            let summary = alert
                .metadata
                .as_ref()
                .and_then(|m| m.summary.as_deref())
                .unwrap_or("no summary");
            let _ = writeln!(
                output,
                "- [{}] {} ({}) on {}: {} (confidence {:.2}, {} merged)",
                alert.severity,
                alert.student_id,
                alert.kind,
                alert.created_at.format("%Y-%m-%d %H:%M"),
                summary,
                alert.confidence,
                suppressed_total(alert)
            );
        }
    }

    let mut reasons: BTreeMap<String, usize> = BTreeMap::new();
    for (_, reason) in &outcome.suppressed {
        *reasons.entry(reason.to_string()).or_insert(0) += 1;
    }
    let merged: u32 = outcome.emitted.iter().map(suppressed_total).sum();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Suppression Summary");

    if reasons.is_empty() && merged == 0 {
        let _ = writeln!(output, "Nothing suppressed.");
    } else {
        for (reason, count) in &reasons {
            let _ = writeln!(output, "- {}: {} candidates", reason, count);
        }
        if merged > 0 {
            let _ = writeln!(output, "- merged as duplicates: {} candidates", merged);
        }
    }

    output
}

/// Counts of suppressed candidates per reason, for the JSON output.
pub fn suppression_counts(outcome: &PolicyOutcome) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for (_, reason) in &outcome.suppressed {
        *counts.entry(reason_key(*reason).to_string()).or_insert(0) += 1;
    }
    counts
}

fn reason_key(reason: SuppressionReason) -> &'static str {
    match reason {
        SuppressionReason::Snoozed => "snoozed",
        SuppressionReason::QuietHours => "quiet_hours",
        SuppressionReason::KindCapReached => "kind_cap_reached",
        SuppressionReason::SeverityCapReached => "severity_cap_reached",
        SuppressionReason::Duplicate => "duplicate",
    }
}
