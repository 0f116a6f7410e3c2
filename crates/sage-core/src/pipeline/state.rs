//! Per-run state machine
//!
//! `Idle -> Stage1Running -> Stage1Done -> Stage2Running -> Stage2Done`,
//! with `Failed` reachable from either running state. `Stage2Done` and
//! `Failed` are terminal.

use std::fmt;
use std::time::Instant;

use tracing::{debug, warn};

use super::Stage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CotState {
    Idle,
    Stage1Running,
    Stage1Done,
    Stage2Running,
    Stage2Done,
    Failed { stage: Stage, detail: String },
}

impl CotState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CotState::Stage2Done | CotState::Failed { .. })
    }

    /// Whether `next` is a legal successor of this state
    pub fn can_advance_to(&self, next: &CotState) -> bool {
        use CotState::*;
        match (self, next) {
            (Idle, Stage1Running)
            | (Stage1Running, Stage1Done)
            | (Stage1Done, Stage2Running)
            | (Stage2Running, Stage2Done) => true,
            (Stage1Running, Failed { stage, .. }) => *stage == Stage::Reasoning,
            (Stage2Running, Failed { stage, .. }) => *stage == Stage::Advice,
            _ => false,
        }
    }
}

impl fmt::Display for CotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CotState::Idle => write!(f, "idle"),
            CotState::Stage1Running => write!(f, "stage 1 running"),
            CotState::Stage1Done => write!(f, "stage 1 done"),
            CotState::Stage2Running => write!(f, "stage 2 running"),
            CotState::Stage2Done => write!(f, "stage 2 done"),
            CotState::Failed { stage, detail } => write!(f, "{} failed: {}", stage, detail),
        }
    }
}

/// Tracks one generation through its states
#[derive(Debug)]
pub struct CotRun {
    persona: String,
    state: CotState,
    started: Instant,
}

impl CotRun {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            state: CotState::Idle,
            started: Instant::now(),
        }
    }

    pub fn state(&self) -> &CotState {
        &self.state
    }

    /// Move to `next` if the transition is legal.
    ///
    /// Illegal transitions leave the state unchanged. Returns the state after
    /// the attempt.
    pub fn advance(&mut self, next: CotState) -> &CotState {
        if self.state.can_advance_to(&next) {
            debug!(
                persona = %self.persona,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "CoT: {} -> {}",
                self.state,
                next
            );
            self.state = next;
        } else {
            warn!(
                persona = %self.persona,
                "CoT: rejected transition {} -> {}",
                self.state,
                next
            );
        }
        &self.state
    }

    /// Record a failure of the running stage
    pub fn fail(&mut self, stage: Stage, detail: impl fmt::Display) -> &CotState {
        self.advance(CotState::Failed {
            stage,
            detail: detail.to_string(),
        })
    }
}
