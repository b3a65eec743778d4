//! Reference accumulation across stages.
//!
//! A stage forwards everything it received plus everything it produced, so
//! downstream stages always see the full history of the run.

use crate::core::Reference;
use crate::envelope::Envelope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Merges two reference maps. Entries in `new` win on name collisions;
/// entries only in `old` are preserved.
#[must_use]
pub fn merge_references(
    old: &HashMap<String, Reference>,
    new: &HashMap<String, Reference>,
) -> HashMap<String, Reference> {
    let mut merged = old.clone();
    merged.extend(new.iter().map(|(name, reference)| (name.clone(), reference.clone())));
    merged
}

/// Counts describing one accumulation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulationReport {
    /// References in the merged result.
    pub total: usize,
    /// Names present in the produced set only.
    pub added: usize,
    /// Names present in both sets whose reference changed.
    pub overwritten: usize,
}

/// Combines the envelope a stage received with the envelope it produced.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceAccumulator;

impl ReferenceAccumulator {
    /// Creates a new accumulator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns `produced` with every reference of `received` it lacks.
    ///
    /// Status and summary come from `produced`; summary keys that only exist
    /// in `received` are carried over.
    #[must_use]
    pub fn accumulate(&self, received: &Envelope, produced: &Envelope) -> (Envelope, AccumulationReport) {
        let report = Self::report(received.references(), produced.references());

        let mut merged = produced.clone();
        merged.set_references(merge_references(received.references(), produced.references()));

        let carried: serde_json::Map<String, serde_json::Value> = received
            .summary()
            .iter()
            .filter(|(key, _)| produced.get_summary(key).is_none())
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        merged.merge_summary(carried);

        (merged, report)
    }

    fn report(old: &HashMap<String, Reference>, new: &HashMap<String, Reference>) -> AccumulationReport {
        let mut report = AccumulationReport::default();
        for (name, reference) in new {
            match old.get(name) {
                None => report.added += 1,
                Some(previous) if previous != reference => report.overwritten += 1,
                Some(_) => {}
            }
        }
        report.total = old.len() + report.added;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn r(key: &str) -> Reference {
        Reference::new("state", key)
    }

    fn map(entries: &[(&str, Reference)]) -> HashMap<String, Reference> {
        entries
            .iter()
            .map(|(name, reference)| ((*name).to_string(), reference.clone()))
            .collect()
    }

    #[test]
    fn test_merge_new_overwrites_old() {
        let old = map(&[("a", r("r1")), ("b", r("r2"))]);
        let new = map(&[("b", r("r3")), ("c", r("r4"))]);

        let merged = merge_references(&old, &new);
        assert_eq!(merged, map(&[("a", r("r1")), ("b", r("r3")), ("c", r("r4"))]));
    }

    #[test]
    fn test_merge_commutes_for_disjoint_names() {
        let left = map(&[("a", r("r1"))]);
        let right = map(&[("b", r("r2"))]);
        assert_eq!(merge_references(&left, &right), merge_references(&right, &left));
    }

    #[test]
    fn test_merge_with_empty_sides() {
        let refs = map(&[("a", r("r1"))]);
        let empty = HashMap::new();
        assert_eq!(merge_references(&refs, &empty), refs);
        assert_eq!(merge_references(&empty, &refs), refs);
    }

    #[test]
    fn test_accumulate_envelopes() {
        let mut received = Envelope::new("run-001").unwrap();
        received.add_reference("a", r("r1"));
        received.add_reference("b", r("r2"));
        received.add_summary("fromInput", serde_json::json!(1));
        received.add_summary("shared", serde_json::json!("old"));

        let mut produced = Envelope::new("run-001").unwrap();
        produced.add_reference("b", r("r3"));
        produced.add_reference("c", r("r4"));
        produced.set_status("TURN1_COMPLETED");
        produced.add_summary("shared", serde_json::json!("new"));

        let (merged, report) = ReferenceAccumulator::new().accumulate(&received, &produced);

        assert_eq!(merged.references(), &map(&[("a", r("r1")), ("b", r("r3")), ("c", r("r4"))]));
        assert_eq!(merged.status(), "TURN1_COMPLETED");
        assert_eq!(merged.get_summary("fromInput"), Some(&serde_json::json!(1)));
        assert_eq!(merged.get_summary("shared"), Some(&serde_json::json!("new")));
        assert_eq!(
            report,
            AccumulationReport {
                total: 3,
                added: 1,
                overwritten: 1
            }
        );
    }
}
