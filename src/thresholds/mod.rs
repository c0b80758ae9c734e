//! # Thresholds
//! Canonical threshold names, compiled defaults, the resolved per-tenant set,
//! and parsing of user-entered values (`0.7` or `70%`).
//!
//! Storage lives in [`store`], the change history in [`audit`].

pub mod audit;
pub mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModerationError;

pub use audit::{AuditLog, HistoryQuery, HistoryScope, NewThresholdChange, ThresholdChange};
pub use store::{ResetOutcome, ThresholdStore};

pub const DEFAULT_NUDITY_SUGGESTIVE: f64 = 0.75;
pub const DEFAULT_NUDITY_EXPLICIT: f64 = 0.25;
pub const DEFAULT_OFFENSIVE: f64 = 0.25;
pub const DEFAULT_AI_GENERATED: f64 = 0.60;

/// Minimum Jaro-Winkler similarity for a "did you mean" hint.
const SUGGESTION_MIN_SIMILARITY: f64 = 0.8;

/// One of the four tunable decision boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ThresholdName {
    NuditySuggestive,
    NudityExplicit,
    Offensive,
    #[serde(rename = "AIGenerated")]
    AiGenerated,
}

impl ThresholdName {
    /// Resolution order: (suggestive, explicit, offensive, ai).
    pub const ALL: [ThresholdName; 4] = [
        ThresholdName::NuditySuggestive,
        ThresholdName::NudityExplicit,
        ThresholdName::Offensive,
        ThresholdName::AiGenerated,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdName::NuditySuggestive => "NuditySuggestive",
            ThresholdName::NudityExplicit => "NudityExplicit",
            ThresholdName::Offensive => "Offensive",
            ThresholdName::AiGenerated => "AIGenerated",
        }
    }

    /// Compiled-in default for this name.
    pub fn default_value(self) -> f64 {
        match self {
            ThresholdName::NuditySuggestive => DEFAULT_NUDITY_SUGGESTIVE,
            ThresholdName::NudityExplicit => DEFAULT_NUDITY_EXPLICIT,
            ThresholdName::Offensive => DEFAULT_OFFENSIVE,
            ThresholdName::AiGenerated => DEFAULT_AI_GENERATED,
        }
    }

    /// Human label used in replies.
    pub fn label(self) -> &'static str {
        match self {
            ThresholdName::NuditySuggestive => "Nudity (Suggestive)",
            ThresholdName::NudityExplicit => "Nudity (Explicit)",
            ThresholdName::Offensive => "Offensive",
            ThresholdName::AiGenerated => "AI Generated",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            ThresholdName::NuditySuggestive => 0,
            ThresholdName::NudityExplicit => 1,
            ThresholdName::Offensive => 2,
            ThresholdName::AiGenerated => 3,
        }
    }

    /// Comma separated list of canonical names, for error messages.
    pub fn valid_names() -> String {
        Self::ALL
            .iter()
            .map(|n| n.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Closest canonical name to an unrecognized input, if any is close enough.
    fn suggest(input: &str) -> Option<ThresholdName> {
        let needle = input.trim().to_ascii_lowercase();
        Self::ALL
            .iter()
            .map(|n| {
                let score = strsim::jaro_winkler(&needle, &n.as_str().to_ascii_lowercase());
                (*n, score)
            })
            .filter(|(_, s)| *s >= SUGGESTION_MIN_SIMILARITY)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(n, _)| n)
    }
}

impl fmt::Display for ThresholdName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThresholdName {
    type Err = ModerationError;

    /// Case-insensitive; accepts the canonical names plus a few aliases.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        match key.as_str() {
            "nuditysuggestive" | "suggestive" | "nudity_suggestive" => {
                Ok(ThresholdName::NuditySuggestive)
            }
            "nudityexplicit" | "explicit" | "nudity_explicit" => Ok(ThresholdName::NudityExplicit),
            "offensive" | "offensive_symbols" | "offensivesymbols" => Ok(ThresholdName::Offensive),
            "aigenerated" | "ai" | "genai" | "ai_generated" => Ok(ThresholdName::AiGenerated),
            _ => Err(ModerationError::UnknownThreshold {
                name: s.trim().to_string(),
                suggestion: ThresholdName::suggest(s),
            }),
        }
    }
}

/// Effective values for one tenant, one per canonical name.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub nudity_suggestive: f64,
    pub nudity_explicit: f64,
    pub offensive: f64,
    pub ai_generated: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            nudity_suggestive: DEFAULT_NUDITY_SUGGESTIVE,
            nudity_explicit: DEFAULT_NUDITY_EXPLICIT,
            offensive: DEFAULT_OFFENSIVE,
            ai_generated: DEFAULT_AI_GENERATED,
        }
    }
}

impl Thresholds {
    pub fn get(&self, name: ThresholdName) -> f64 {
        match name {
            ThresholdName::NuditySuggestive => self.nudity_suggestive,
            ThresholdName::NudityExplicit => self.nudity_explicit,
            ThresholdName::Offensive => self.offensive,
            ThresholdName::AiGenerated => self.ai_generated,
        }
    }

    pub fn set(&mut self, name: ThresholdName, value: f64) {
        match name {
            ThresholdName::NuditySuggestive => self.nudity_suggestive = value,
            ThresholdName::NudityExplicit => self.nudity_explicit = value,
            ThresholdName::Offensive => self.offensive = value,
            ThresholdName::AiGenerated => self.ai_generated = value,
        }
    }

    /// `(suggestive, explicit, offensive, ai)`.
    pub fn as_tuple(&self) -> (f64, f64, f64, f64) {
        (
            self.nudity_suggestive,
            self.nudity_explicit,
            self.offensive,
            self.ai_generated,
        )
    }
}

/// Target of a reset request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTarget {
    One(ThresholdName),
    All,
}

impl FromStr for ResetTarget {
    type Err = ModerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(ResetTarget::All);
        }
        s.parse().map(ResetTarget::One)
    }
}

/// Parse a user-entered value. A trailing `%` divides the number by 100.
///
/// Range is not checked here; see [`validate_range`].
pub fn parse_value(input: &str) -> Result<f64, ModerationError> {
    let s = input.trim();
    let parse_err = || ModerationError::Parse {
        input: input.trim().to_string(),
    };
    match s.strip_suffix('%') {
        Some(prefix) => prefix
            .trim()
            .parse::<f64>()
            .map(|v| v / 100.0)
            .map_err(|_| parse_err()),
        None => s.parse::<f64>().map_err(|_| parse_err()),
    }
}

/// Accept values in `[0, 1]` inclusive. NaN is rejected.
pub fn validate_range(value: f64) -> Result<f64, ModerationError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(ModerationError::Range { value })
    }
}

/// `parse_value` followed by `validate_range`.
pub fn parse_threshold_value(input: &str) -> Result<f64, ModerationError> {
    parse_value(input).and_then(validate_range)
}
