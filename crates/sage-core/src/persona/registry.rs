//! Persona registry
//!
//! Read-only after construction. Keys are unique and both instruction texts
//! are non-empty; anything else is rejected when the registry is built.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use super::Persona;
use crate::error::{CotError, RegistryError};

/// Embedded persona table
const BUILTIN_PERSONAS: &str = include_str!("personas.toml");

/// On-disk shape of a persona table
#[derive(Debug, Deserialize)]
struct PersonaTable {
    #[serde(default)]
    example_questions: Vec<String>,
    #[serde(default, rename = "persona")]
    personas: Vec<Persona>,
}

/// Registry of personas in registration order
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: Vec<Arc<Persona>>,
    example_questions: Vec<String>,
}

impl PersonaRegistry {
    /// Build a registry, validating every persona
    pub fn new(personas: Vec<Persona>) -> Result<Self, RegistryError> {
        Self::with_examples(personas, Vec::new())
    }

    /// Build a registry with a list of example questions
    pub fn with_examples(
        personas: Vec<Persona>,
        example_questions: Vec<String>,
    ) -> Result<Self, RegistryError> {
        if personas.is_empty() {
            return Err(RegistryError::Empty);
        }

        let mut seen = HashSet::new();
        for persona in &personas {
            validate(persona)?;
            if !seen.insert(persona.key.as_str()) {
                return Err(RegistryError::DuplicateKey(persona.key.clone()));
            }
        }

        debug!("Persona registry built with {} personas", personas.len());
        Ok(Self {
            personas: personas.into_iter().map(Arc::new).collect(),
            example_questions,
        })
    }

    /// The built-in thinkers
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_toml_str(BUILTIN_PERSONAS)
    }

    /// Parse a persona table from TOML
    pub fn from_toml_str(contents: &str) -> Result<Self, RegistryError> {
        let table: PersonaTable = toml::from_str(contents)?;
        Self::with_examples(table.personas, table.example_questions)
    }

    /// Load a persona table from a TOML file
    pub fn from_path(path: &Path) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path)?;
        let registry = Self::from_toml_str(&contents)?;
        info!(
            "Loaded {} personas from {}",
            registry.personas.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Look up a persona by key
    pub fn lookup(&self, key: &str) -> Result<Arc<Persona>, CotError> {
        self.personas
            .iter()
            .find(|p| p.key == key)
            .cloned()
            .ok_or_else(|| CotError::UnknownPersona(key.to_string()))
    }

    /// All personas in registration order
    pub fn all(&self) -> &[Arc<Persona>] {
        &self.personas
    }

    /// All persona keys in registration order
    pub fn keys(&self) -> Vec<String> {
        self.personas.iter().map(|p| p.key.clone()).collect()
    }

    pub fn example_questions(&self) -> &[String] {
        &self.example_questions
    }

    pub fn len(&self) -> usize {
        self.personas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.personas.is_empty()
    }
}

fn validate(persona: &Persona) -> Result<(), RegistryError> {
    let required = [
        ("key", &persona.key),
        ("stage1_system", &persona.stage1_system),
        ("stage2_system", &persona.stage2_system),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(RegistryError::EmptyField {
                key: persona.key.clone(),
                field,
            });
        }
    }
    Ok(())
}
