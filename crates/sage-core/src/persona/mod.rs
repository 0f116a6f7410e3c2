//! Personas: the voices that condition both stages
//!
//! A persona bundles display metadata, the core-concepts summary injected
//! into stage-1 prompts, the two instruction texts and a quote library.
//! Personas are static data, loaded once and never mutated.

mod quotes;
mod registry;

use serde::{Deserialize, Serialize};

pub use quotes::pick_quote;
pub use registry::PersonaRegistry;

/// Separator between a persona's name and its school, e.g. `老子式（道家）`
const SCHOOL_OPEN: char = '（';

/// A persona definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    /// Unique registry key
    pub key: String,
    #[serde(default)]
    pub icon: String,
    /// Accent color (hex)
    #[serde(default)]
    pub color: String,
    /// Background color for quote boxes (hex)
    #[serde(default)]
    pub bg_color: String,
    #[serde(default)]
    pub short_desc: String,
    /// Free-form summary injected verbatim into stage-1 prompts
    #[serde(default)]
    pub core_concepts: String,
    /// Instruction text for the reasoning stage
    pub stage1_system: String,
    /// Instruction text for the advice stage
    pub stage2_system: String,
    #[serde(default)]
    pub quotes: Vec<Quote>,
}

impl Persona {
    /// Name used for quote attribution: the key up to the school suffix
    pub fn display_name(&self) -> &str {
        self.key
            .split(SCHOOL_OPEN)
            .next()
            .unwrap_or(&self.key)
    }

    /// Icon followed by key, as shown in persona pickers
    pub fn label(&self) -> String {
        if self.icon.is_empty() {
            self.key.clone()
        } else {
            format!("{} {}", self.icon, self.key)
        }
    }
}

/// A short phrase attributed to the persona that owns it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quote(String);

impl Quote {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn text(&self) -> &str {
        &self.0
    }
}
