use std::collections::HashMap;

use chrono::Duration;

use crate::models::AlertEvent;

/// Collapses alerts that share a dedupe key and fall within `window_ms` of the group's
/// earliest alert.
///
/// Input is expected in time order and is stably sorted by `created_at` to guarantee it.
/// The representative keeps its id and earliest `created_at`; it takes the highest severity
/// and confidence of the group and records how many alerts it absorbed. Applying this to
/// its own output returns the output unchanged.
pub fn deduplicate_alerts(events: &[AlertEvent], window_ms: i64) -> Vec<AlertEvent> {
    let window = Duration::milliseconds(window_ms.max(0));
    let mut ordered: Vec<&AlertEvent> = events.iter().collect();
    ordered.sort_by_key(|event| event.created_at);

    let mut output: Vec<AlertEvent> = Vec::with_capacity(ordered.len());
    let mut latest_by_key: HashMap<String, usize> = HashMap::new();

    for event in ordered {
        let key = event.effective_dedupe_key();
        if let Some(&index) = latest_by_key.get(&key) {
            let representative = &mut output[index];
            if event.created_at - representative.created_at <= window {
                absorb(representative, event);
                continue;
            }
        }
        latest_by_key.insert(key, output.len());
        output.push(event.clone());
    }
    output
}

/// Folds `duplicate` into `representative`: highest severity and confidence win, and the
/// governance counters take on everything the duplicate had already absorbed.
pub(crate) fn absorb(representative: &mut AlertEvent, duplicate: &AlertEvent) {
    representative.severity = representative.severity.max(duplicate.severity);
    representative.confidence = representative.confidence.max(duplicate.confidence);

    let duplicate_seen = duplicate
        .governance()
        .and_then(|governance| governance.last_seen_at)
        .unwrap_or(duplicate.created_at);
    let duplicate_suppressed = duplicate
        .governance()
        .map(|governance| governance.suppressed_count)
        .unwrap_or(0);
    let representative_created = representative.created_at;

    let governance = representative.governance_mut();
    governance.suppressed_count += 1 + duplicate_suppressed;
    let last_seen = governance.last_seen_at.unwrap_or(representative_created);
    governance.last_seen_at = Some(last_seen.max(duplicate_seen));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlertKind, AlertMetadata, AlertSeverity, AlertStatus};
    use chrono::{DateTime, FixedOffset};

    fn at(minutes: i64) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2026-03-02T09:00:00+00:00").unwrap() + Duration::minutes(minutes)
    }

    fn alert(id: &str, student: &str, minutes: i64, context: Option<&str>) -> AlertEvent {
        AlertEvent {
            id: id.to_string(),
            student_id: student.to_string(),
            kind: AlertKind::BehaviorSpike,
            severity: AlertSeverity::Low,
            status: AlertStatus::New,
            confidence: 0.8,
            created_at: at(minutes),
            dedupe_key: None,
            sources: vec![],
            metadata: context.map(|key| AlertMetadata {
                context_key: Some(key.to_string()),
                ..AlertMetadata::default()
            }),
            actions: vec![],
        }
    }

    #[test]
    fn collapses_within_window_and_keeps_earliest() {
        let mut late = alert("b", "stu-1", 20, None);
        late.severity = AlertSeverity::Important;
        late.confidence = 0.95;
        let events = vec![alert("a", "stu-1", 0, None), late, alert("c", "stu-1", 50, None)];

        let deduped = deduplicate_alerts(&events, 60 * 60 * 1000);
        assert_eq!(deduped.len(), 1);
        let kept = &deduped[0];
        assert_eq!(kept.id, "a");
        assert_eq!(kept.created_at, at(0));
        assert_eq!(kept.severity, AlertSeverity::Important);
        assert_eq!(kept.confidence, 0.95);
        let governance = kept.governance().unwrap();
        assert_eq!(governance.suppressed_count, 2);
        assert_eq!(governance.last_seen_at, Some(at(50)));
    }

    #[test]
    fn window_is_anchored_on_the_first_alert() {
        let events = vec![
            alert("a", "stu-1", 0, None),
            alert("b", "stu-1", 40, None),
            alert("c", "stu-1", 70, None),
        ];
        let deduped = deduplicate_alerts(&events, 60 * 60 * 1000);
        let ids: Vec<&str> = deduped.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[test]
    fn different_keys_are_kept_in_first_seen_order() {
        let events = vec![
            alert("a", "stu-1", 0, Some("noise")),
            alert("b", "stu-2", 1, Some("noise")),
            alert("c", "stu-1", 2, Some("transition")),
            alert("d", "stu-1", 3, Some("noise")),
        ];
        let deduped = deduplicate_alerts(&events, 60 * 60 * 1000);
        let ids: Vec<&str> = deduped.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn explicit_key_wins_over_derived() {
        let mut first = alert("a", "stu-1", 0, Some("noise"));
        first.dedupe_key = Some("shared".to_string());
        let mut second = alert("b", "stu-1", 5, Some("transition"));
        second.dedupe_key = Some("shared".to_string());
        assert_eq!(deduplicate_alerts(&[first, second], 600_000).len(), 1);
    }

    #[test]
    fn applying_twice_is_a_no_op() {
        let events = vec![
            alert("a", "stu-1", 0, None),
            alert("b", "stu-1", 30, None),
            alert("c", "stu-1", 61, None),
            alert("d", "stu-1", 90, None),
            alert("e", "stu-2", 95, None),
        ];
        let once = deduplicate_alerts(&events, 60 * 60 * 1000);
        let twice = deduplicate_alerts(&once, 60 * 60 * 1000);
        assert_eq!(once, twice);
    }

    #[test]
    fn empty_input() {
        assert!(deduplicate_alerts(&[], 1000).is_empty());
    }
}
