use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, FixedOffset, NaiveDate};
use tracing::{info, warn};

use crate::models::{ContingencyTable, TrackingEntry};

#[derive(serde::Deserialize)]
struct CsvRow {
    student_id: String,
    recorded_at: String,
    emotion: String,
    intensity: f64,
    #[serde(default)]
    context: Option<String>,
}

pub fn read_entries(csv_path: &Path) -> anyhow::Result<Vec<TrackingEntry>> {
    let file = std::fs::File::open(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    read_entries_from(file)
}

/// Parses tracking rows. Rows with an unparsable timestamp, a blank student or emotion, or a
/// non-finite intensity are skipped with a warning; malformed CSV is an error.
pub fn read_entries_from<R: Read>(input: R) -> anyhow::Result<Vec<TrackingEntry>> {
    let mut reader = csv::Reader::from_reader(input);
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result.with_context(|| format!("malformed tracking row {}", line + 1))?;
        let recorded_at = match DateTime::parse_from_rfc3339(row.recorded_at.trim()) {
            Ok(value) => value,
            Err(_) => {
                warn!(row = line + 1, recorded_at = %row.recorded_at, "skipping row with bad timestamp");
                skipped += 1;
                continue;
            }
        };
        if row.student_id.trim().is_empty()
            || row.emotion.trim().is_empty()
            || !row.intensity.is_finite()
        {
            warn!(row = line + 1, "skipping incomplete row");
            skipped += 1;
            continue;
        }

        entries.push(TrackingEntry {
            student_id: row.student_id.trim().to_string(),
            recorded_at,
            emotion: row.emotion.trim().to_lowercase(),
            intensity: row.intensity,
            context: row
                .context
                .map(|value| value.trim().to_lowercase())
                .filter(|value| !value.is_empty()),
        });
    }

    info!(loaded = entries.len(), skipped, "tracking entries read");
    Ok(entries)
}

/// Evidence for one (student, context, emotion) pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationCandidate {
    pub student_id: String,
    pub context: String,
    pub emotion: String,
    pub table: ContingencyTable,
    /// Entries tagged with the context, per day.
    pub context_daily: Vec<f64>,
    /// Summed intensity of the emotion, per day.
    pub emotion_daily: Vec<f64>,
    pub latest_at: DateTime<FixedOffset>,
}

/// Daily mean intensity of one emotion for one student, over days with observations.
#[derive(Debug, Clone, PartialEq)]
pub struct IntensitySeries {
    pub student_id: String,
    pub emotion: String,
    pub days: Vec<NaiveDate>,
    pub values: Vec<f64>,
    /// Share of calendar days in the observed span that have data, in [0, 1].
    pub coverage: f64,
    pub latest_at: DateTime<FixedOffset>,
}

fn by_student(entries: &[TrackingEntry]) -> BTreeMap<&str, Vec<&TrackingEntry>> {
    let mut grouped: BTreeMap<&str, Vec<&TrackingEntry>> = BTreeMap::new();
    for entry in entries {
        grouped.entry(entry.student_id.as_str()).or_default().push(entry);
    }
    grouped
}

fn latest(entries: &[&TrackingEntry]) -> Option<DateTime<FixedOffset>> {
    entries.iter().map(|entry| entry.recorded_at).max()
}

fn day_span(entries: &[&TrackingEntry]) -> Vec<NaiveDate> {
    let first = entries.iter().map(|e| e.recorded_at.date_naive()).min();
    let last = entries.iter().map(|e| e.recorded_at.date_naive()).max();
    match (first, last) {
        (Some(first), Some(last)) => first.iter_days().take_while(|day| *day <= last).collect(),
        _ => Vec::new(),
    }
}

pub fn association_candidates(entries: &[TrackingEntry]) -> Vec<AssociationCandidate> {
    let mut candidates = Vec::new();

    for (student_id, rows) in by_student(entries) {
        let Some(latest_at) = latest(&rows) else {
            continue;
        };
        let days = day_span(&rows);
        let day_index: BTreeMap<NaiveDate, usize> =
            days.iter().enumerate().map(|(i, day)| (*day, i)).collect();

        let contexts: BTreeSet<&str> = rows.iter().filter_map(|e| e.context.as_deref()).collect();
        let emotions: BTreeSet<&str> = rows.iter().map(|e| e.emotion.as_str()).collect();

        for context in &contexts {
            for emotion in &emotions {
                let mut table = ContingencyTable::default();
                let mut context_daily = vec![0.0; days.len()];
                let mut emotion_daily = vec![0.0; days.len()];

                for entry in &rows {
                    let exposed = entry.context.as_deref() == Some(*context);
                    let outcome = entry.emotion == *emotion;
                    match (exposed, outcome) {
                        (true, true) => table.a += 1,
                        (true, false) => table.b += 1,
                        (false, true) => table.c += 1,
                        (false, false) => table.d += 1,
                    }
                    if let Some(&i) = day_index.get(&entry.recorded_at.date_naive()) {
                        if exposed {
                            context_daily[i] += 1.0;
                        }
                        if outcome {
                            emotion_daily[i] += entry.intensity;
                        }
                    }
                }

                candidates.push(AssociationCandidate {
                    student_id: student_id.to_string(),
                    context: context.to_string(),
                    emotion: emotion.to_string(),
                    table,
                    context_daily,
                    emotion_daily,
                    latest_at,
                });
            }
        }
    }
    candidates
}

pub fn intensity_series(entries: &[TrackingEntry]) -> Vec<IntensitySeries> {
    let mut series = Vec::new();

    for (student_id, rows) in by_student(entries) {
        let span_days = day_span(&rows).len().max(1);
        let mut per_emotion: BTreeMap<&str, BTreeMap<NaiveDate, (f64, usize)>> = BTreeMap::new();
        for entry in &rows {
            let day = per_emotion
                .entry(entry.emotion.as_str())
                .or_default()
                .entry(entry.recorded_at.date_naive())
                .or_insert((0.0, 0));
            day.0 += entry.intensity;
            day.1 += 1;
        }

        for (emotion, daily) in per_emotion {
            let emotion_rows: Vec<&TrackingEntry> =
                rows.iter().copied().filter(|e| e.emotion == emotion).collect();
            let Some(latest_at) = latest(&emotion_rows) else {
                continue;
            };
            series.push(IntensitySeries {
                student_id: student_id.to_string(),
                emotion: emotion.to_string(),
                days: daily.keys().copied().collect(),
                values: daily
                    .values()
                    .map(|(total, count)| total / *count as f64)
                    .collect(),
                coverage: daily.len() as f64 / span_days as f64,
                latest_at,
            });
        }
    }
    series
}
