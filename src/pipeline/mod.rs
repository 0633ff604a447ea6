//! Pipeline orchestration: stage runner, review checkpoint and the
//! controller state machine tying them together.
//!
//! ```text
//! Idle -> Phase1Running -> AwaitingReview -> Phase2Running -> Completed
//!              |                 |                 |
//!              v                 v (reject)        v
//!            Failed             Idle             Failed
//! ```
//!
//! `Completed` and `Failed` return to `Idle` only through an explicit reset.

pub mod controller;
pub mod review;
pub mod run;
pub mod stage;

use serde::Serialize;
use std::fmt;

pub use controller::*;
pub use review::*;
pub use run::*;
pub use stage::*;

/// Top-level state of the pipeline controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Phase1Running,
    AwaitingReview,
    Phase2Running,
    Completed,
    Failed,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Phase1Running => "transcribing and translating",
            Self::AwaitingReview => "awaiting review",
            Self::Phase2Running => "dubbing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether a phase is executing right now.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Phase1Running | Self::Phase2Running)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
