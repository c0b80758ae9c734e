// src/analyze/mod.rs
//! Score extraction from loosely-typed moderation API responses.
//!
//! The upstream JSON may miss categories, carry extra fields, or put strings
//! where numbers belong. Every lookup here degrades to "no signal" (0 / empty)
//! instead of failing.

pub mod advanced;
pub mod extract;

use serde_json::{Map, Value};

pub use advanced::extract_advanced;
pub use extract::{extract_media_uri, extract_scores};

/// Nested object under `key`, or `None` when missing or not an object.
pub(crate) fn object<'a>(parent: Option<&'a Map<String, Value>>, key: &str) -> Option<&'a Map<String, Value>> {
    parent?.get(key)?.as_object()
}

/// Numeric field under `key`; anything else reads as 0.
pub(crate) fn number(parent: Option<&Map<String, Value>>, key: &str) -> f64 {
    parent
        .and_then(|m| m.get(key))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

/// String field under `key`, or empty.
pub(crate) fn string(parent: Option<&Map<String, Value>>, key: &str) -> String {
    parent
        .and_then(|m| m.get(key))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
