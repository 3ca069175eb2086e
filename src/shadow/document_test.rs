use std::collections::BTreeSet;

use crate::AttributeEquality;
use crate::AttributeMap;
use crate::AttributeValue;
use crate::ExactEquality;
use crate::ShadowDocument;
use crate::StateKind;

fn delta(pairs: &[(&str, AttributeValue)]) -> AttributeMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[test]
fn test_empty_document_starts_at_version_zero() {
    let doc = ShadowDocument::empty("thermostat-1");

    assert_eq!(doc.version, 0);
    assert!(doc.reported.is_empty());
    assert!(doc.desired.is_empty());
    assert!(doc.pending.is_empty());
}

#[test]
fn test_merge_reports_only_changed_keys() {
    let mut doc = ShadowDocument::empty("thermostat-1");
    doc.reported
        .insert("mode".to_string(), AttributeValue::Text("heat".to_string()));

    let changed = doc.merge(
        StateKind::Reported,
        &delta(&[
            ("mode", AttributeValue::Text("heat".to_string())),
            ("temperature", AttributeValue::Number(21.0)),
        ]),
    );

    // "mode" was overwritten with an identical value; only "temperature"
    // actually changed
    assert_eq!(changed.len(), 1);
    assert!(changed.contains_key("temperature"));
    assert_eq!(doc.reported.len(), 2);
}

#[test]
fn test_merge_is_key_wise_not_document_wise() {
    let mut doc = ShadowDocument::empty("thermostat-1");
    doc.desired.insert(
        "mode".to_string(),
        AttributeValue::Text("cool".to_string()),
    );

    doc.merge(
        StateKind::Desired,
        &delta(&[("temperature", AttributeValue::Number(18.0))]),
    );

    // The previous desired attribute survives a delta that does not name it
    assert_eq!(doc.desired.len(), 2);
    assert!(doc.desired.contains_key("mode"));
}

#[test]
fn test_pending_iff_desired_disagrees_with_reported() {
    let mut doc = ShadowDocument::empty("thermostat-1");
    doc.desired = delta(&[
        ("temperature", AttributeValue::Number(140.0)),
        ("mode", AttributeValue::Text("heat".to_string())),
    ]);
    doc.reported = delta(&[
        ("temperature", AttributeValue::Number(135.0)),
        ("mode", AttributeValue::Text("heat".to_string())),
        ("humidity", AttributeValue::Number(40.0)),
    ]);

    doc.recompute_pending(&ExactEquality);

    // temperature disagrees, mode matches, humidity is reported-only
    let expected: BTreeSet<String> = ["temperature".to_string()].into();
    assert_eq!(doc.pending, expected);
}

#[test]
fn test_desired_without_reported_counterpart_is_pending() {
    let mut doc = ShadowDocument::empty("thermostat-1");
    doc.desired = delta(&[("fan", AttributeValue::Bool(true))]);

    let pending_delta = doc.recompute_pending(&ExactEquality);

    assert!(doc.pending.contains("fan"));
    assert!(pending_delta.added.contains("fan"));
    assert!(pending_delta.removed.is_empty());
}

#[test]
fn test_pending_delta_tracks_removal_on_convergence() {
    let mut doc = ShadowDocument::empty("thermostat-1");
    doc.desired = delta(&[("temperature", AttributeValue::Number(140.0))]);
    doc.recompute_pending(&ExactEquality);
    assert!(doc.pending.contains("temperature"));

    // Device confirms the requested value
    doc.merge(
        StateKind::Reported,
        &delta(&[("temperature", AttributeValue::Number(140.0))]),
    );
    let pending_delta = doc.recompute_pending(&ExactEquality);

    assert!(doc.pending.is_empty());
    assert!(pending_delta.removed.contains("temperature"));
}

struct TolerantEquality(f64);

impl AttributeEquality for TolerantEquality {
    fn converged(
        &self,
        _name: &str,
        desired: &crate::AttributeValue,
        reported: &crate::AttributeValue,
    ) -> bool {
        match (desired, reported) {
            (AttributeValue::Number(want), AttributeValue::Number(have)) => {
                (want - have).abs() <= self.0
            }
            _ => desired == reported,
        }
    }
}

#[test]
fn test_equality_rule_is_pluggable() {
    let mut doc = ShadowDocument::empty("thermostat-1");
    doc.desired = delta(&[("temperature", AttributeValue::Number(140.0))]);
    doc.reported = delta(&[("temperature", AttributeValue::Number(139.6))]);

    doc.recompute_pending(&ExactEquality);
    assert!(doc.pending.contains("temperature"));

    doc.recompute_pending(&TolerantEquality(0.5));
    assert!(doc.pending.is_empty());
}
