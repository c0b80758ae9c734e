//! decision.rs: result shapes handed back to the command layer:
//! normalized scores, the verdict with its reasons, and the advanced per-category view.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::thresholds::ThresholdName;

/// The four canonical category scores, nominally in `[0, 1]`.
/// Missing upstream data reads as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    /// max(sexual_activity, sexual_display, erotica)
    pub nudity_explicit: f64,
    /// mean(very_suggestive, suggestive, mildly_suggestive)
    pub nudity_suggestive: f64,
    /// max over the offensive symbol classes
    pub offensive: f64,
    pub ai_generated: f64,
}

impl Scores {
    pub fn get(&self, name: ThresholdName) -> f64 {
        match name {
            ThresholdName::NuditySuggestive => self.nudity_suggestive,
            ThresholdName::NudityExplicit => self.nudity_explicit,
            ThresholdName::Offensive => self.offensive,
            ThresholdName::AiGenerated => self.ai_generated,
        }
    }
}

/// Violated rule tags, in the order the verdict engine checks them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    NudityExplicit,
    NuditySuggestive,
    OffensiveSymbols,
    AiGeneratedHigh,
}

impl ReasonKind {
    /// Evaluation order of the rules.
    pub const ORDER: [ReasonKind; 4] = [
        ReasonKind::NudityExplicit,
        ReasonKind::NuditySuggestive,
        ReasonKind::OffensiveSymbols,
        ReasonKind::AiGeneratedHigh,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReasonKind::NudityExplicit => "nudity_explicit",
            ReasonKind::NuditySuggestive => "nudity_suggestive",
            ReasonKind::OffensiveSymbols => "offensive_symbols",
            ReasonKind::AiGeneratedHigh => "ai_generated_high",
        }
    }

    /// Threshold that governs this rule.
    pub fn threshold(self) -> ThresholdName {
        match self {
            ReasonKind::NudityExplicit => ThresholdName::NudityExplicit,
            ReasonKind::NuditySuggestive => ThresholdName::NuditySuggestive,
            ReasonKind::OffensiveSymbols => ThresholdName::Offensive,
            ReasonKind::AiGeneratedHigh => ThresholdName::AiGenerated,
        }
    }
}

/// Verdict for a single analysis request. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// `true` when no rule fired.
    pub allowed: bool,
    #[serde(default)]
    pub reasons: Vec<ReasonKind>,
    pub scores: Scores,
    /// `media.uri` from the upstream response, empty when absent.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_uri: String,
}

/// Every numeric sub-score per raw category (`nudity`, `offensive`, `type`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvancedAnalysis {
    pub categories: BTreeMap<String, BTreeMap<String, f64>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_uri: String,
}

impl AdvancedAnalysis {
    /// Sub-scores of a category, highest first (ties by name).
    pub fn sorted(&self, category: &str) -> Vec<(&str, f64)> {
        let mut v: Vec<(&str, f64)> = self
            .categories
            .get(category)
            .map(|m| m.iter().map(|(k, v)| (k.as_str(), *v)).collect())
            .unwrap_or_default();
        v.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        v
    }
}
