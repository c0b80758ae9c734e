//! Aggregated extraction: four canonical scores from a raw response.

use serde_json::Value;

use super::{number, object, string};
use crate::decision::Scores;

const EXPLICIT_FIELDS: [&str; 3] = ["sexual_activity", "sexual_display", "erotica"];
const SUGGESTIVE_FIELDS: [&str; 3] = ["very_suggestive", "suggestive", "mildly_suggestive"];
const OFFENSIVE_FIELDS: [&str; 5] = ["nazi", "asian_swastika", "confederate", "supremacist", "terrorist"];

/// Convert a moderation response into the four canonical scores. Never fails.
///
/// - explicit: worst of the explicit indicators
/// - suggestive: mean over all three named fields (missing = 0, divisor always 3)
/// - offensive: worst symbol class
/// - ai_generated: `type.ai_generated` as-is
pub fn extract_scores(doc: &Value) -> Scores {
    let root = doc.as_object();
    let nudity = object(root, "nudity");
    let offensive = object(root, "offensive");
    let kind = object(root, "type");

    Scores {
        nudity_explicit: max_of(EXPLICIT_FIELDS.iter().map(|f| number(nudity, f))),
        nudity_suggestive: mean_of(SUGGESTIVE_FIELDS.iter().map(|f| number(nudity, f))),
        offensive: max_of(OFFENSIVE_FIELDS.iter().map(|f| number(offensive, f))),
        ai_generated: number(kind, "ai_generated"),
    }
}

/// `media.uri`, or empty.
pub fn extract_media_uri(doc: &Value) -> String {
    string(object(doc.as_object(), "media"), "uri")
}

/// Maximum with a floor of 0.
fn max_of(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0, f64::max)
}

fn mean_of(values: impl ExactSizeIterator<Item = f64>) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    values.sum::<f64>() / n as f64
}
