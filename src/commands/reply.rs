//! Reply shapes returned to the chat platform: plain content and/or embeds.

use serde::{Deserialize, Serialize};

pub const COLOR_ANALYSIS: u32 = 0x00BFA5;
pub const COLOR_ADVANCED: u32 = 0x4CAF50;
pub const COLOR_AI: u32 = 0x3F51B5;
pub const COLOR_THRESHOLDS: u32 = 0x9C27B0;
pub const COLOR_HISTORY: u32 = 0x607D8B;
pub const COLOR_ROLE_ADDED: u32 = 0x2ECC71;
pub const COLOR_ROLE_REMOVED: u32 = 0xE74C3C;
pub const COLOR_ROLES: u32 = 0x3498DB;
pub const COLOR_PING: u32 = 0xFFC107;
pub const COLOR_HELP: u32 = 0x5865F2;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default)]
    pub embeds: Vec<Embed>,
}

impl Reply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embeds: Vec::new(),
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            content: None,
            embeds: vec![embed],
        }
    }

    /// Put `text` under every embed that has no footer yet.
    pub fn with_footer(mut self, text: Option<&str>) -> Self {
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            for e in self.embeds.iter_mut().filter(|e| e.footer.is_none()) {
                e.footer = Some(EmbedFooter { text: text.to_string() });
            }
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    #[serde(default)]
    pub fields: Vec<EmbedField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

impl Embed {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: None,
            color,
            fields: Vec::new(),
            footer: None,
        }
    }

    pub fn description(mut self, d: impl Into<String>) -> Self {
        self.description = Some(d.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn field_value(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

/// `0.256` → `26%`.
pub fn pct(v: f64) -> String {
    format!("{:.0}%", v * 100.0)
}
