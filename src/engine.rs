//! # Verdict Engine
//! Pure logic that maps `(scores, thresholds)` → `Analysis`.
//! No I/O, suitable for unit tests and offline evaluation.
//!
//! Policy: a rule fires when its score is at or above its threshold
//! (inclusive). Reasons are emitted in [`ReasonKind::ORDER`]; the image is
//! allowed only when nothing fired.

use serde_json::Value;

use crate::analyze::{extract_media_uri, extract_scores};
use crate::decision::{Analysis, ReasonKind, Scores};
use crate::thresholds::Thresholds;

/// Apply thresholds to scores. Always succeeds.
pub fn compute_verdict(scores: &Scores, thresholds: &Thresholds) -> Analysis {
    let reasons: Vec<ReasonKind> = ReasonKind::ORDER
        .into_iter()
        .filter(|r| {
            let name = r.threshold();
            scores.get(name) >= thresholds.get(name)
        })
        .collect();

    Analysis {
        allowed: reasons.is_empty(),
        reasons,
        scores: *scores,
        media_uri: String::new(),
    }
}

/// Extraction + verdict over a raw moderation response.
pub fn analyse_document(doc: &Value, thresholds: &Thresholds) -> Analysis {
    let mut analysis = compute_verdict(&extract_scores(doc), thresholds);
    analysis.media_uri = extract_media_uri(doc);
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::ThresholdName;
    use serde_json::json;

    #[test]
    fn empty_document_is_allowed_with_defaults() {
        let a = analyse_document(&json!({}), &Thresholds::default());
        assert!(a.allowed);
        assert!(a.reasons.is_empty());
        assert_eq!(a.scores, Scores::default());
    }

    #[test]
    fn boundary_is_inclusive_for_every_rule() {
        let t = Thresholds::default();
        for reason in ReasonKind::ORDER {
            let name = reason.threshold();
            let mut scores = Scores::default();
            match name {
                ThresholdName::NuditySuggestive => scores.nudity_suggestive = t.get(name),
                ThresholdName::NudityExplicit => scores.nudity_explicit = t.get(name),
                ThresholdName::Offensive => scores.offensive = t.get(name),
                ThresholdName::AiGenerated => scores.ai_generated = t.get(name),
            }
            let a = compute_verdict(&scores, &t);
            assert!(!a.allowed, "{name} at threshold should fire");
            assert_eq!(a.reasons, vec![reason]);
        }
    }

    #[test]
    fn just_below_threshold_is_allowed() {
        let scores = Scores {
            nudity_explicit: 0.2499,
            nudity_suggestive: 0.7499,
            offensive: 0.2499,
            ai_generated: 0.5999,
        };
        assert!(compute_verdict(&scores, &Thresholds::default()).allowed);
    }

    #[test]
    fn reasons_follow_fixed_order() {
        let scores = Scores {
            nudity_explicit: 1.0,
            nudity_suggestive: 1.0,
            offensive: 1.0,
            ai_generated: 1.0,
        };
        let a = compute_verdict(&scores, &Thresholds::default());
        assert_eq!(a.reasons, ReasonKind::ORDER.to_vec());
    }

    #[test]
    fn explicit_nudity_scenario() {
        let doc = json!({
            "nudity": {"sexual_activity": 0.9},
            "offensive": {},
            "type": {"ai_generated": 0.1},
            "media": {"uri": "https://cdn/img.png"}
        });
        let a = analyse_document(&doc, &Thresholds::default());
        assert!(!a.allowed);
        assert_eq!(a.scores.nudity_explicit, 0.9);
        assert_eq!(a.reasons, vec![ReasonKind::NudityExplicit]);
        assert_eq!(a.media_uri, "https://cdn/img.png");
    }

    #[test]
    fn zero_threshold_flags_everything() {
        let mut t = Thresholds::default();
        t.set(ThresholdName::Offensive, 0.0);
        let a = compute_verdict(&Scores::default(), &t);
        assert_eq!(a.reasons, vec![ReasonKind::OffensiveSymbols]);
    }
}
