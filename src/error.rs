//! Domain error taxonomy and the user-facing text for each kind.

use thiserror::Error;

use crate::storage::StoreError;
use crate::thresholds::ThresholdName;

#[derive(Debug, Error)]
pub enum ModerationError {
    /// The supplied name is not one of the canonical threshold names.
    #[error("unknown threshold `{name}`")]
    UnknownThreshold {
        name: String,
        suggestion: Option<ThresholdName>,
    },

    /// A user-entered value could not be read as a number.
    #[error("could not parse `{input}` as a number")]
    Parse { input: String },

    /// A parsed value falls outside `[0, 1]`.
    #[error("value {value} is outside the range 0..=1")]
    Range { value: f64 },

    /// The persistence backend rejected a read or write.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// The moderation API call failed or returned a non-success status.
    #[error("upstream analysis failed: {0}")]
    UpstreamAnalysis(String),
}

impl ModerationError {
    /// Short message safe to show to the invoking user.
    pub fn user_message(&self) -> String {
        match self {
            ModerationError::UnknownThreshold { suggestion, .. } => {
                let mut msg = format!(
                    "Unknown threshold name. Use {}",
                    ThresholdName::valid_names()
                );
                if let Some(s) = suggestion {
                    msg.push_str(&format!(" (did you mean {s}?)"));
                }
                msg
            }
            ModerationError::Parse { input } => format!(
                "Could not read `{input}` as a number. Use a decimal like 0.70 or a percentage like 70%"
            ),
            ModerationError::Range { .. } => {
                "Value must be a number between 0.00 and 1.00, or a percentage like 70%".to_string()
            }
            ModerationError::StoreUnavailable(_) => {
                "Failed to update or fetch thresholds, please try again later".to_string()
            }
            ModerationError::UpstreamAnalysis(msg) => format!("Analysis failed: {msg}"),
        }
    }
}
