//! Caller-owned generation log
//!
//! Append-only. Nothing in the pipeline writes to it; callers push the
//! results they want to keep.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use super::GenerationResult;

/// What a history entry was generated for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistorySubject {
    /// One persona
    Single(String),
    /// Every persona side by side
    Comparison,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub question: String,
    pub persona: HistorySubject,
    /// Completed results as (persona key, result)
    pub results: Vec<(String, GenerationResult)>,
    pub at: DateTime<Local>,
}

impl HistoryEntry {
    pub fn single(
        question: impl Into<String>,
        key: impl Into<String>,
        result: GenerationResult,
    ) -> Self {
        let key = key.into();
        Self {
            question: question.into(),
            persona: HistorySubject::Single(key.clone()),
            results: vec![(key, result)],
            at: Local::now(),
        }
    }

    pub fn comparison(
        question: impl Into<String>,
        results: Vec<(String, GenerationResult)>,
    ) -> Self {
        Self {
            question: question.into(),
            persona: HistorySubject::Comparison,
            results,
            at: Local::now(),
        }
    }

    /// Short label for listings
    pub fn subject_label(&self) -> &str {
        match &self.persona {
            HistorySubject::Single(key) => key,
            HistorySubject::Comparison => "比較模式",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerationLog {
    entries: Vec<HistoryEntry>,
}

impl GenerationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    /// Up to `n` entries, newest first
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter().rev().take(n)
    }

    /// All entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
