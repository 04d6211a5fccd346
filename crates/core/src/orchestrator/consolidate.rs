//! Pure consolidation of source results into one record update.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::source::{normalize_key, Payload, PayloadValue, SourceResult};
use crate::store::ClassificationPatch;

const MOVEMENTS_FIELD: &str = "movements";
const MOVEMENTS_COUNT_FIELD: &str = "movements_count";

/// Trim source keys, dropping blanks and case-insensitive repeats.
/// The first occurrence keeps its slot and its spelling.
pub(crate) fn dedup_sources(sources: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(normalize_key(s)))
        .map(str::to_string)
        .collect()
}

/// Union of related ids from successful results, sorted, excluding the case itself.
pub(crate) fn collect_related(target_id: &str, results: &[SourceResult]) -> Vec<String> {
    let target = target_id.trim();
    results
        .iter()
        .filter(|r| r.success)
        .flat_map(|r| r.related_targets.iter())
        .map(|id| id.trim())
        .filter(|id| !id.is_empty() && *id != target)
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Payload per successful source, keyed by the normalized source key.
pub(crate) fn collect_payloads(results: &[SourceResult]) -> BTreeMap<String, Payload> {
    let mut payloads = BTreeMap::new();
    for result in results.iter().filter(|r| r.success) {
        let mut data = result.data.clone();
        if let Some(count) = data.get(MOVEMENTS_FIELD).and_then(|m| m.as_list()).map(|l| l.len()) {
            data.insert(
                MOVEMENTS_COUNT_FIELD.to_string(),
                PayloadValue::Number(count as f64),
            );
        }
        payloads.insert(normalize_key(&result.source), data);
    }
    payloads
}

/// Last numeric value of `field` across successful results, in dispatch order.
pub(crate) fn last_number(results: &[SourceResult], field: &str) -> Option<f64> {
    results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.data.get(field).and_then(PayloadValue::as_f64))
        .last()
}

fn last_text(results: &[SourceResult], field: &str) -> Option<String> {
    results
        .iter()
        .filter(|r| r.success)
        .filter_map(|r| r.data.get(field).and_then(PayloadValue::as_str))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .last()
}

/// Classification labels reported by sources; last writer wins.
pub(crate) fn classification_patch(results: &[SourceResult]) -> ClassificationPatch {
    ClassificationPatch {
        category: last_text(results, "category"),
        side: last_text(results, "side"),
        risk: last_text(results, "risk"),
    }
}

/// Party names to try against the directory, in dispatch then field order.
///
/// A field may hold a single name or a list of names.
pub(crate) fn party_names(results: &[SourceResult], fields: &[String]) -> Vec<String> {
    let mut names = Vec::new();
    for result in results.iter().filter(|r| r.success) {
        for field in fields {
            match result.data.get(field) {
                Some(PayloadValue::Text(name)) => push_name(&mut names, name),
                Some(PayloadValue::List(items)) => {
                    for name in items.iter().filter_map(PayloadValue::as_str) {
                        push_name(&mut names, name);
                    }
                }
                _ => {}
            }
        }
    }
    names
}

fn push_name(names: &mut Vec<String>, name: &str) {
    let name = name.trim();
    if !name.is_empty() {
        names.push(name.to_string());
    }
}
