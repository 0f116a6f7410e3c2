//! Two-stage chain-of-thought pipeline
//!
//! Stage 1 produces a persona-conditioned reasoning chain. Stage 2 turns the
//! complete chain into advice. The two stages of one request never overlap.
//!
//! ## Module Structure
//! - `prompt`: Stage prompt composition
//! - `state`: Per-run state machine
//! - `cancellation`: Caller-owned cancellation handle
//! - `orchestrator`: Streaming, batch and comparison runs
//! - `history`: Caller-owned generation log

mod cancellation;
mod history;
mod orchestrator;
mod prompt;
mod state;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use cancellation::Cancellation;
pub use history::{GenerationLog, HistoryEntry, HistorySubject};
pub use orchestrator::{CotOptions, CotOrchestrator, GenerationRequest, GenerationResult};
pub use prompt::{build_stage1_prompt, build_stage2_prompt};
pub use state::{CotRun, CotState};

/// Pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Stage 1: reasoning chain
    Reasoning,
    /// Stage 2: advice
    Advice,
}

impl Stage {
    /// 1-based stage number
    pub fn number(self) -> u8 {
        match self {
            Stage::Reasoning => 1,
            Stage::Advice => 2,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Reasoning => write!(f, "stage 1 (reasoning)"),
            Stage::Advice => write!(f, "stage 2 (advice)"),
        }
    }
}
