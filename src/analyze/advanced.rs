//! Detail view: every numeric leaf per raw category, no aggregation, no verdict.

use std::collections::BTreeMap;

use serde_json::Value;

use super::object;
use crate::analyze::extract::extract_media_uri;
use crate::decision::AdvancedAnalysis;

/// Raw categories shown in the detail view.
pub const CATEGORIES: [&str; 3] = ["nudity", "offensive", "type"];

/// Collect the numeric leaves of each known category. Non-numeric leaves are
/// dropped; a category with no numeric leaves is omitted.
pub fn extract_advanced(doc: &Value) -> AdvancedAnalysis {
    let root = doc.as_object();
    let mut categories = BTreeMap::new();

    for cat in CATEGORIES {
        let Some(map) = object(root, cat) else {
            continue;
        };
        let subs: BTreeMap<String, f64> = map
            .iter()
            .filter_map(|(k, v)| v.as_f64().map(|n| (k.clone(), n)))
            .collect();
        if !subs.is_empty() {
            categories.insert(cat.to_string(), subs);
        }
    }

    AdvancedAnalysis {
        categories,
        media_uri: extract_media_uri(doc),
    }
}
