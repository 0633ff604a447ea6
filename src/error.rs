use std::path::PathBuf;
use thiserror::Error;

use crate::pipeline::{PipelineState, StageKey};

/// Failures creating or removing a run workspace.
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Failed to create workspace under {root}: {source}")]
    Create {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove workspace {path}: {source}")]
    Destroy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Workspace {0} has already been destroyed")]
    Destroyed(PathBuf),

    #[error("Failed to write artifact {path}: {source}")]
    Artifact {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Failures raised by an external collaborator while a stage runs.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Audio extraction error: {0}")]
    Extraction(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Speech synthesis error: {0}")]
    Synthesis(String),

    #[error("Muxing error: {0}")]
    Mux(String),

    #[error("Missing input artifact: {0}")]
    MissingInput(&'static str),

    #[error(transparent)]
    Timeline(#[from] TimelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Malformed or misaligned subtitle data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimelineError {
    #[error("Malformed timeline: segment {index} {reason}")]
    Malformed { index: u32, reason: String },

    #[error("Malformed timeline: duplicate segment index {0}")]
    DuplicateIndex(u32),

    #[error("Malformed subtitle file: {0}")]
    Parse(String),

    #[error("Timeline mismatch: original has {original} segments, translated has {translated}")]
    Mismatch { original: usize, translated: usize },
}

/// An operation was invoked in a state that forbids it. Never mutates state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("A dubbing run is already active (state: {0})")]
    AlreadyRunning(PipelineState),

    #[error("Cannot {operation} while pipeline is {state}")]
    InvalidState {
        operation: &'static str,
        state: PipelineState,
    },

    #[error("Unknown run handle: {0}")]
    UnknownRun(uuid::Uuid),
}

#[derive(Error, Debug)]
pub enum DubroError {
    #[error("Workspace error: {0}")]
    Workspace(#[from] WorkspaceError),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: StageKey,
        #[source]
        source: StageError,
    },

    #[error("Timeline error: {0}")]
    Timeline(#[from] TimelineError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

impl DubroError {
    /// Stage that failed, if this error came out of the stage runner.
    pub fn failed_stage(&self) -> Option<StageKey> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, DubroError>;
