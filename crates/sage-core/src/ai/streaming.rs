//! Stream element types for incremental completions

use std::fmt;

/// Why a completion stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    Other(String),
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Stop => f.write_str("stop"),
            FinishReason::Length => f.write_str("length"),
            FinishReason::Other(reason) => f.write_str(reason),
        }
    }
}

/// One element of a streaming completion
///
/// The sequence is finite and single-pass. `Error` is terminal: nothing
/// follows it and the channel closes.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamPart {
    /// Non-empty text fragment
    TextDelta { delta: String },
    /// The upstream signalled completion
    Finish { reason: FinishReason },
    /// The stream broke after it started
    Error { detail: String },
}
