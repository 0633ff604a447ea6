use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

use super::{PipelineState, PipelineStatus, StageKey, StageStatus, StatusMap};
use crate::error::DubroError;
use crate::subtitle::{AlignedPair, SubtitleTimeline};
use crate::transcribe::Transcript;
use crate::workspace::Workspace;

pub type RunId = Uuid;

/// Paths of artifacts produced so far. A stage only reads paths written by
/// the stages before it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunArtifacts {
    pub input_video: Option<PathBuf>,
    pub extracted_audio: Option<PathBuf>,
    pub original_subtitles: Option<PathBuf>,
    pub translated_subtitles: Option<PathBuf>,
    pub dubbed_audio: Option<PathBuf>,
    pub output_video: Option<PathBuf>,
}

/// Everything owned by one dubbing job, from upload to reset.
#[derive(Debug)]
pub struct PipelineRun {
    pub id: RunId,
    pub created_at: DateTime<Utc>,
    pub target_language: String,
    pub source_language: String,
    pub detected_language: Option<String>,
    pub workspace: Workspace,
    pub artifacts: RunArtifacts,
    pub transcript: Option<Transcript>,
    pub original: Option<SubtitleTimeline>,
    pub timelines: Option<AlignedPair>,
    stages: StatusMap,
    current_stage: Option<StageKey>,
    progress_hint: u8,
    message: String,
    failure: Option<String>,
}

impl PipelineRun {
    pub fn new(workspace: Workspace, target_language: &str, source_language: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            target_language: target_language.to_string(),
            source_language: source_language.to_string(),
            detected_language: None,
            workspace,
            artifacts: RunArtifacts::default(),
            transcript: None,
            original: None,
            timelines: None,
            stages: StatusMap::default(),
            current_stage: None,
            progress_hint: 0,
            message: "Video uploaded".to_string(),
            failure: None,
        }
    }

    pub fn stage_status(&self, stage: StageKey) -> StageStatus {
        self.stages.get(stage)
    }

    pub fn stages(&self) -> &StatusMap {
        &self.stages
    }

    /// Language the source subtitles are labelled with: the detected one when
    /// transcription reported it, the requested source language otherwise.
    pub fn subtitle_language(&self) -> &str {
        self.detected_language
            .as_deref()
            .filter(|lang| !lang.is_empty())
            .unwrap_or(&self.source_language)
    }

    pub(crate) fn begin_stage(&mut self, stage: StageKey, progress_hint: u8) {
        self.stages.advance(stage, StageStatus::Processing);
        self.current_stage = Some(stage);
        self.progress_hint = progress_hint;
        self.message = stage.description().to_string();
    }

    pub(crate) fn complete_stage(&mut self, stage: StageKey) {
        self.stages.advance(stage, StageStatus::Completed);
    }

    pub(crate) fn fail_stage(&mut self, stage: StageKey, error: &DubroError) {
        self.stages.advance(stage, StageStatus::Failed);
        self.message = format!("Error: {}", error);
        self.failure = Some(error.to_string());
    }

    pub(crate) fn finish_phase(&mut self, message: &str) {
        self.current_stage = None;
        self.progress_hint = 100;
        self.message = message.to_string();
    }

    pub(crate) fn set_message<S: Into<String>>(&mut self, message: S) {
        self.message = message.into();
        debug!("Run {}: {}", self.id, self.message);
    }

    pub fn snapshot(&self, state: PipelineState) -> PipelineStatus {
        PipelineStatus {
            run_id: Some(self.id),
            started_at: Some(self.created_at),
            state,
            current_stage: self.current_stage,
            stages: self.stages.clone(),
            progress_hint: self.progress_hint,
            message: self.message.clone(),
            failure: self.failure.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceConfig;
    use crate::workspace::WorkspaceManager;

    fn run_in(root: &std::path::Path) -> PipelineRun {
        let manager = WorkspaceManager::new(&WorkspaceConfig {
            root: Some(root.to_path_buf()),
            ..WorkspaceConfig::default()
        });
        PipelineRun::new(manager.create().unwrap(), "fr", "en")
    }

    #[test]
    fn test_new_run_snapshot() {
        let root = tempfile::tempdir().unwrap();
        let run = run_in(root.path());

        let status = run.snapshot(PipelineState::Phase1Running);
        assert_eq!(status.run_id, Some(run.id));
        assert_eq!(status.started_at, Some(run.created_at));
        assert!(run.created_at <= Utc::now());
        assert_eq!(status.progress_hint, 0);
        assert!(status.stages.iter().all(|(_, s)| s == StageStatus::Pending));
        assert!(status.failure.is_none());
    }

    #[test]
    fn test_subtitle_language_prefers_detected() {
        let root = tempfile::tempdir().unwrap();
        let mut run = run_in(root.path());
        assert_eq!(run.subtitle_language(), "en");

        run.detected_language = Some(String::new());
        assert_eq!(run.subtitle_language(), "en");

        run.detected_language = Some("de".to_string());
        assert_eq!(run.subtitle_language(), "de");
    }

    #[test]
    fn test_failure_is_recorded_once() {
        let root = tempfile::tempdir().unwrap();
        let mut run = run_in(root.path());

        run.begin_stage(StageKey::AudioExtraction, 20);
        let error = DubroError::Stage {
            stage: StageKey::AudioExtraction,
            source: crate::error::StageError::Extraction("no audio stream".into()),
        };
        run.fail_stage(StageKey::AudioExtraction, &error);

        let status = run.snapshot(PipelineState::Failed);
        assert_eq!(status.stages.get(StageKey::AudioExtraction), StageStatus::Failed);
        assert!(status.failure.unwrap().contains("no audio stream"));
        assert_eq!(status.current_stage, Some(StageKey::AudioExtraction));
    }
}
