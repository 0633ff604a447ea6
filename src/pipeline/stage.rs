use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{PipelineRun, PipelineState};
use crate::error::{DubroError, Result, StageError};

/// Named unit of work; doubles as the key in the per-stage status map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKey {
    AudioExtraction,
    Transcription,
    SubtitleGeneration,
    Translation,
    SpeechSynthesis,
    VideoMuxing,
}

impl StageKey {
    pub const ALL: [StageKey; 6] = [
        StageKey::AudioExtraction,
        StageKey::Transcription,
        StageKey::SubtitleGeneration,
        StageKey::Translation,
        StageKey::SpeechSynthesis,
        StageKey::VideoMuxing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AudioExtraction => "audio_extraction",
            Self::Transcription => "transcription",
            Self::SubtitleGeneration => "subtitle_generation",
            Self::Translation => "translation",
            Self::SpeechSynthesis => "speech_synthesis",
            Self::VideoMuxing => "video_muxing",
        }
    }

    /// Human-readable activity shown while the stage runs.
    pub fn description(&self) -> &'static str {
        match self {
            Self::AudioExtraction => "Extracting audio from video",
            Self::Transcription => "Transcribing audio (this may take a few minutes)",
            Self::SubtitleGeneration => "Generating subtitle file",
            Self::Translation => "Translating subtitles",
            Self::SpeechSynthesis => "Generating dubbed audio (this may take a few minutes)",
            Self::VideoMuxing => "Creating final dubbed video",
        }
    }
}

impl fmt::Display for StageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The two stage sequences separated by the review checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// extract -> transcribe -> generate subtitles -> translate
    Transcribe,
    /// synthesize -> remux
    Dub,
}

impl Phase {
    /// Stages in execution order with the progress hint shown while each runs.
    pub fn stages(&self) -> &'static [(StageKey, u8)] {
        match self {
            Self::Transcribe => &[
                (StageKey::AudioExtraction, 20),
                (StageKey::Transcription, 40),
                (StageKey::SubtitleGeneration, 60),
                (StageKey::Translation, 80),
            ],
            Self::Dub => &[
                (StageKey::SpeechSynthesis, 30),
                (StageKey::VideoMuxing, 70),
            ],
        }
    }

    pub fn running_state(&self) -> PipelineState {
        match self {
            Self::Transcribe => PipelineState::Phase1Running,
            Self::Dub => PipelineState::Phase2Running,
        }
    }

    pub fn completion_message(&self) -> &'static str {
        match self {
            Self::Transcribe => "Subtitles ready for review",
            Self::Dub => "Video dubbing completed successfully",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Status of every stage in a run. A stage moves
/// `pending -> processing -> {completed | failed}` once and never goes back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusMap(BTreeMap<StageKey, StageStatus>);

impl Default for StatusMap {
    fn default() -> Self {
        Self(StageKey::ALL.iter().map(|k| (*k, StageStatus::Pending)).collect())
    }
}

impl StatusMap {
    pub fn get(&self, stage: StageKey) -> StageStatus {
        self.0.get(&stage).copied().unwrap_or(StageStatus::Pending)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StageKey, StageStatus)> + '_ {
        self.0.iter().map(|(k, v)| (*k, *v))
    }

    /// Apply a transition, refusing anything the stage state machine forbids.
    pub fn advance(&mut self, stage: StageKey, next: StageStatus) -> bool {
        let current = self.get(stage);
        let allowed = matches!(
            (current, next),
            (StageStatus::Pending, StageStatus::Processing)
                | (StageStatus::Processing, StageStatus::Completed)
                | (StageStatus::Processing, StageStatus::Failed)
        );

        if allowed {
            self.0.insert(stage, next);
        } else {
            warn!("Refusing stage transition {}: {} -> {}", stage, current, next);
        }
        allowed
    }
}

/// Point-in-time view of the pipeline for the presentation layer. Progress
/// is a display hint only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineStatus {
    pub run_id: Option<Uuid>,
    pub started_at: Option<DateTime<Utc>>,
    pub state: PipelineState,
    pub current_stage: Option<StageKey>,
    pub stages: StatusMap,
    pub progress_hint: u8,
    pub message: String,
    pub failure: Option<String>,
}

impl PipelineStatus {
    pub fn idle() -> Self {
        Self {
            run_id: None,
            started_at: None,
            state: PipelineState::Idle,
            current_stage: None,
            stages: StatusMap::default(),
            progress_hint: 0,
            message: String::new(),
            failure: None,
        }
    }
}

/// Publishes status snapshots to any number of subscribers.
#[derive(Debug)]
pub struct StatusReporter {
    sender: watch::Sender<PipelineStatus>,
}

impl Default for StatusReporter {
    fn default() -> Self {
        let (sender, _) = watch::channel(PipelineStatus::idle());
        Self { sender }
    }
}

impl StatusReporter {
    pub fn publish(&self, status: PipelineStatus) {
        self.sender.send_replace(status);
    }

    pub fn current(&self) -> PipelineStatus {
        self.sender.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.sender.subscribe()
    }
}

/// Work performed for one stage, reading and writing the run's artifacts.
#[async_trait]
pub trait StageAction: Send + Sync {
    async fn execute(&self, stage: StageKey, run: &mut PipelineRun) -> std::result::Result<(), StageError>;
}

/// Executes a phase's stages strictly in order. The first failure marks its
/// stage failed, leaves later stages pending and is returned unchanged.
pub struct StageRunner<'a> {
    reporter: &'a StatusReporter,
}

impl<'a> StageRunner<'a> {
    pub fn new(reporter: &'a StatusReporter) -> Self {
        Self { reporter }
    }

    pub async fn run_phase(
        &self,
        phase: Phase,
        run: &mut PipelineRun,
        action: &dyn StageAction,
    ) -> Result<()> {
        let state = phase.running_state();

        for &(stage, progress_hint) in phase.stages() {
            run.begin_stage(stage, progress_hint);
            self.reporter.publish(run.snapshot(state));
            info!("[{}] {}", stage, stage.description());

            match action.execute(stage, run).await {
                Ok(()) => {
                    run.complete_stage(stage);
                    info!("[{}] completed", stage);
                }
                Err(source) => {
                    error!("[{}] failed: {}", stage, source);
                    let failure = DubroError::Stage { stage, source };
                    run.fail_stage(stage, &failure);
                    self.reporter.publish(run.snapshot(state));
                    return Err(failure);
                }
            }
        }

        run.finish_phase(phase.completion_message());
        self.reporter.publish(run.snapshot(state));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_state_machine() {
        let mut map = StatusMap::default();
        assert!(StageKey::ALL.iter().all(|k| map.get(*k) == StageStatus::Pending));

        assert!(!map.advance(StageKey::Transcription, StageStatus::Completed));
        assert!(map.advance(StageKey::Transcription, StageStatus::Processing));
        assert!(map.advance(StageKey::Transcription, StageStatus::Failed));
        assert!(!map.advance(StageKey::Transcription, StageStatus::Processing));
        assert_eq!(map.get(StageKey::Transcription), StageStatus::Failed);
    }

    #[test]
    fn test_phase_order_and_hints() {
        let phase1: Vec<StageKey> = Phase::Transcribe.stages().iter().map(|(k, _)| *k).collect();
        assert_eq!(
            phase1,
            vec![
                StageKey::AudioExtraction,
                StageKey::Transcription,
                StageKey::SubtitleGeneration,
                StageKey::Translation,
            ]
        );
        let hints: Vec<u8> = Phase::Dub.stages().iter().map(|(_, h)| *h).collect();
        assert_eq!(hints, vec![30, 70]);
    }

    #[test]
    fn test_status_map_serializes_snake_case() {
        let mut map = StatusMap::default();
        map.advance(StageKey::AudioExtraction, StageStatus::Processing);
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["audio_extraction"], "processing");
        assert_eq!(json["video_muxing"], "pending");
    }

    #[test]
    fn test_reporter_subscribers_see_latest() {
        let reporter = StatusReporter::default();
        let receiver = reporter.subscribe();

        let mut status = PipelineStatus::idle();
        status.progress_hint = 40;
        reporter.publish(status);

        assert_eq!(receiver.borrow().progress_hint, 40);
        assert_eq!(reporter.current().progress_hint, 40);
    }
}
