use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::{
    Phase, PipelineRun, PipelineState, PipelineStatus, ReviewCheckpoint, ReviewData, RunId,
    StageAction, StageKey, StageRunner, StatusReporter,
};
use crate::config::Config;
use crate::error::{DubroError, Result, StageError, StateError};
use crate::language::language_name;
use crate::media::{MediaProcessorFactory, MediaProcessorTrait};
use crate::subtitle::{aligned_pair, read_srt, write_srt, AlignedPair, EditSet};
use crate::synthesize::{SpeechSynthesizer, SynthesizerFactory};
use crate::transcribe::{TranscriberFactory, TranscriberTrait};
use crate::translate::{Translator, TranslatorFactory};
use crate::workspace::{Artifact, DestroyOutcome, WorkspaceManager};

/// External services the stages call out to.
pub struct Collaborators {
    pub media: Box<dyn MediaProcessorTrait>,
    pub transcriber: Box<dyn TranscriberTrait>,
    pub translator: Box<dyn Translator>,
    pub synthesizer: Box<dyn SpeechSynthesizer>,
}

impl Collaborators {
    pub fn from_config(config: &Config) -> Result<Self> {
        let translator = TranslatorFactory::create_translator(config.translate.clone())
            .map_err(|e| DubroError::Config(format!("Cannot create translator: {}", e)))?;

        Ok(Self {
            media: MediaProcessorFactory::create_processor(config.media.clone()),
            transcriber: TranscriberFactory::create_default(config.transcriber.clone()),
            translator,
            synthesizer: SynthesizerFactory::create_synthesizer(
                config.synthesis.clone(),
                config.media.clone(),
            ),
        })
    }

    async fn extract_audio(&self, run: &mut PipelineRun) -> std::result::Result<(), StageError> {
        let video = required(&run.artifacts.input_video, "input video")?;
        let audio = run.workspace.artifact_path(&Artifact::ExtractedAudio);

        self.media.extract_audio(&video, &audio).await?;
        run.artifacts.extracted_audio = Some(audio);
        Ok(())
    }

    async fn transcribe(&self, run: &mut PipelineRun) -> std::result::Result<(), StageError> {
        let audio = required(&run.artifacts.extracted_audio, "extracted audio")?;

        let transcript = self.transcriber.transcribe(&audio).await?;
        info!(
            "Detected language: {} ({} segments)",
            language_name(&transcript.language),
            transcript.segments.len()
        );

        if !transcript.language.is_empty() {
            run.detected_language = Some(transcript.language.to_lowercase());
        }
        run.transcript = Some(transcript);
        Ok(())
    }

    async fn generate_subtitles(&self, run: &mut PipelineRun) -> std::result::Result<(), StageError> {
        let transcript = run
            .transcript
            .as_ref()
            .ok_or(StageError::MissingInput("transcript"))?;
        let timeline = transcript.to_timeline()?;

        let language = run.subtitle_language().to_string();
        let path = run.workspace.artifact_path(&Artifact::Subtitles(language));
        write_srt(&timeline, &path).await?;

        run.original = Some(timeline);
        run.artifacts.original_subtitles = Some(path);
        Ok(())
    }

    async fn translate(&self, run: &mut PipelineRun) -> std::result::Result<(), StageError> {
        let detected = run.subtitle_language().to_string();
        if detected.eq_ignore_ascii_case(&run.target_language) {
            return Err(StageError::Translation(format!(
                "video is already in {}, choose a different target language",
                language_name(&detected)
            )));
        }

        let source_path = required(&run.artifacts.original_subtitles, "original subtitles")?;
        let original = run
            .original
            .clone()
            .ok_or(StageError::MissingInput("original timeline"))?;
        let target_path = run
            .workspace
            .artifact_path(&Artifact::Subtitles(run.target_language.clone()));

        self.translator
            .translate_file(&source_path, &target_path, &run.target_language, &run.source_language)
            .await?;

        let translated = read_srt(&target_path).await?;
        let pair = aligned_pair(original, translated)?;

        run.artifacts.translated_subtitles = Some(target_path);
        run.timelines = Some(pair);
        Ok(())
    }

    async fn synthesize(&self, run: &mut PipelineRun) -> std::result::Result<(), StageError> {
        let subtitles = required(&run.artifacts.translated_subtitles, "translated subtitles")?;
        let output = run.workspace.artifact_path(&Artifact::DubbedAudio);

        self.synthesizer
            .synthesize(&subtitles, &output, &run.target_language)
            .await?;
        run.artifacts.dubbed_audio = Some(output);
        Ok(())
    }

    async fn remux(&self, run: &mut PipelineRun) -> std::result::Result<(), StageError> {
        let video = required(&run.artifacts.input_video, "input video")?;
        let audio = required(&run.artifacts.dubbed_audio, "dubbed audio")?;
        let output = run.workspace.artifact_path(&Artifact::OutputVideo);

        self.media.replace_audio(&video, &audio, &output).await?;
        run.artifacts.output_video = Some(output);
        Ok(())
    }
}

fn required(path: &Option<PathBuf>, what: &'static str) -> std::result::Result<PathBuf, StageError> {
    path.clone().ok_or(StageError::MissingInput(what))
}

#[async_trait]
impl StageAction for Collaborators {
    async fn execute(&self, stage: StageKey, run: &mut PipelineRun) -> std::result::Result<(), StageError> {
        match stage {
            StageKey::AudioExtraction => self.extract_audio(run).await,
            StageKey::Transcription => self.transcribe(run).await,
            StageKey::SubtitleGeneration => self.generate_subtitles(run).await,
            StageKey::Translation => self.translate(run).await,
            StageKey::SpeechSynthesis => self.synthesize(run).await,
            StageKey::VideoMuxing => self.remux(run).await,
        }
    }
}

/// Input video for a new run.
#[derive(Debug, Clone)]
pub enum VideoSource {
    /// Uploaded bytes
    Bytes(Vec<u8>),
    /// Existing file to copy in
    File(PathBuf),
}

/// Artifacts of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DubbingResult {
    pub video_path: PathBuf,
    pub original_subtitle_path: PathBuf,
    pub translated_subtitle_path: PathBuf,
    pub target_language: String,
}

impl DubbingResult {
    /// Copy the artifacts into `dir` under their download names.
    pub async fn export<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;

        let video_ext = self
            .video_path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("mp4");
        let lang = &self.target_language;

        let copies = [
            (&self.video_path, format!("dubbed_video_{}.{}", lang, video_ext)),
            (&self.original_subtitle_path, "original_subtitles.srt".to_string()),
            (&self.translated_subtitle_path, format!("translated_subtitles_{}.srt", lang)),
        ];

        let mut exported = Vec::with_capacity(copies.len());
        for (source, name) in copies {
            if !source.exists() {
                return Err(DubroError::FileNotFound(source.display().to_string()));
            }
            let target = dir.join(name);
            fs::copy(source, &target).await?;
            info!("Exported {}", target.display());
            exported.push(target);
        }

        Ok(exported)
    }
}

/// Owns at most one run and drives it through the two phases and the
/// review checkpoint between them. Operations refused by the state machine
/// return a [`StateError`] and change nothing.
pub struct PipelineController {
    collaborators: Collaborators,
    workspaces: WorkspaceManager,
    state: PipelineState,
    run: Option<PipelineRun>,
    review: Option<ReviewCheckpoint>,
    reporter: StatusReporter,
}

impl PipelineController {
    pub fn new(collaborators: Collaborators, workspaces: WorkspaceManager) -> Self {
        Self {
            collaborators,
            workspaces,
            state: PipelineState::Idle,
            run: None,
            review: None,
            reporter: StatusReporter::default(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            Collaborators::from_config(config)?,
            WorkspaceManager::new(&config.workspace),
        ))
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn run(&self) -> Option<&PipelineRun> {
        self.run.as_ref()
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.run.as_ref().map(|run| run.id)
    }

    /// Current snapshot. Pure query.
    pub fn status(&self) -> PipelineStatus {
        match &self.run {
            Some(run) => run.snapshot(self.state),
            None => PipelineStatus::idle(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PipelineStatus> {
        self.reporter.subscribe()
    }

    /// Create a run, store the video and execute phase 1. On success the
    /// controller waits in `AwaitingReview`; a stage failure leaves it
    /// `Failed` with the workspace kept for inspection.
    pub async fn start(
        &mut self,
        video: VideoSource,
        target_language: &str,
        source_language: &str,
    ) -> Result<RunId> {
        if self.state != PipelineState::Idle {
            return Err(StateError::AlreadyRunning(self.state).into());
        }
        if let VideoSource::File(path) = &video {
            if !path.exists() {
                return Err(DubroError::FileNotFound(path.display().to_string()));
            }
        }

        let mut workspace = self.workspaces.create()?;
        let stored = match &video {
            VideoSource::Bytes(bytes) => workspace.store_input_bytes(bytes).await,
            VideoSource::File(path) => workspace.store_input_file(path).await,
        };
        let input_video = match stored {
            Ok(path) => path,
            Err(e) => {
                if let DestroyOutcome::Failed(diagnostic) = workspace.destroy() {
                    warn!("Cleanup after failed upload: {}", diagnostic);
                }
                return Err(e.into());
            }
        };

        let mut run = PipelineRun::new(workspace, target_language, source_language);
        run.artifacts.input_video = Some(input_video);
        let id = run.id;
        info!(
            "Starting run {} at {}: {} -> {}",
            id,
            run.created_at.to_rfc3339(),
            language_name(source_language),
            language_name(target_language)
        );

        self.run = Some(run);
        self.transition(PipelineState::Phase1Running);

        let outcome = self.run_phase(Phase::Transcribe).await;
        match &outcome {
            Ok(()) => {
                self.review = self
                    .run
                    .as_ref()
                    .and_then(|run| run.timelines.as_ref())
                    .map(ReviewCheckpoint::open);
                self.transition(PipelineState::AwaitingReview);
            }
            Err(_) => self.transition(PipelineState::Failed),
        }

        outcome.map(|()| id)
    }

    /// Aligned pair under review, only while awaiting review.
    pub fn review_pair(&self) -> Option<&AlignedPair> {
        if self.state != PipelineState::AwaitingReview {
            return None;
        }
        self.run.as_ref().and_then(|run| run.timelines.as_ref())
    }

    pub fn edit_buffer(&self) -> Option<&EditSet> {
        self.review.as_ref().map(ReviewCheckpoint::buffer)
    }

    pub fn review_data(&self) -> Result<ReviewData> {
        match (self.review_pair(), self.review.as_ref()) {
            (Some(pair), Some(checkpoint)) => Ok(ReviewData::new(pair, checkpoint)),
            _ => Err(self.refuse("read review data")),
        }
    }

    /// Record one edit in the buffer without leaving the checkpoint.
    pub fn edit_segment<S: Into<String>>(&mut self, index: u32, text: S) -> Result<()> {
        if self.state != PipelineState::AwaitingReview {
            return Err(self.refuse("edit review"));
        }
        match self.review.as_mut() {
            Some(checkpoint) => {
                checkpoint.edit(index, text);
                Ok(())
            }
            None => Err(invalid_state("edit review", self.state)),
        }
    }

    /// Commit the edits, persist the translated subtitles and execute
    /// phase 2. A commit or write failure keeps the run in review.
    pub async fn approve_review(&mut self, edits: EditSet) -> Result<()> {
        if self.state != PipelineState::AwaitingReview {
            return Err(self.refuse("approve review"));
        }
        let state = self.state;
        let (Some(run), Some(checkpoint)) = (self.run.as_mut(), self.review.as_mut()) else {
            return Err(invalid_state("approve review", state));
        };
        let Some(pair) = run.timelines.as_ref() else {
            return Err(invalid_state("approve review", state));
        };

        checkpoint.merge(&edits);
        let committed = checkpoint.commit(pair)?;

        let path = run
            .artifacts
            .translated_subtitles
            .clone()
            .unwrap_or_else(|| run.workspace.artifact_path(&Artifact::Subtitles(run.target_language.clone())));
        write_srt(committed.translated(), &path).await.map_err(|e| match e {
            StageError::Io(source) => DubroError::Io(source),
            other => DubroError::Io(std::io::Error::other(other.to_string())),
        })?;
        info!("Review approved, {} segments committed to {}", committed.len(), path.display());

        run.artifacts.translated_subtitles = Some(path);
        run.timelines = Some(committed);
        run.set_message("Review approved");
        self.review = None;
        self.transition(PipelineState::Phase2Running);

        let outcome = self.run_phase(Phase::Dub).await;
        match &outcome {
            Ok(()) => self.transition(PipelineState::Completed),
            Err(_) => self.transition(PipelineState::Failed),
        }
        outcome
    }

    /// Discard the review and the whole run.
    pub fn reject_review(&mut self) -> Result<()> {
        if self.state != PipelineState::AwaitingReview {
            return Err(self.refuse("reject review"));
        }
        info!("Review rejected, discarding run");
        self.teardown();
        Ok(())
    }

    /// Return to `Idle` from a terminal state. A no-op when already idle.
    pub fn reset(&mut self) -> Result<()> {
        match self.state {
            PipelineState::Idle => {
                debug!("Reset requested while idle, nothing to do");
                Ok(())
            }
            PipelineState::Completed | PipelineState::Failed => {
                self.teardown();
                Ok(())
            }
            _ => Err(self.refuse("reset")),
        }
    }

    pub fn result(&self) -> Result<DubbingResult> {
        let run = match (&self.run, self.state) {
            (Some(run), PipelineState::Completed) => run,
            _ => return Err(self.refuse("get result")),
        };

        let missing = |what: &str| DubroError::FileNotFound(what.to_string());
        Ok(DubbingResult {
            video_path: run.artifacts.output_video.clone().ok_or_else(|| missing("output video"))?,
            original_subtitle_path: run
                .artifacts
                .original_subtitles
                .clone()
                .ok_or_else(|| missing("original subtitles"))?,
            translated_subtitle_path: run
                .artifacts
                .translated_subtitles
                .clone()
                .ok_or_else(|| missing("translated subtitles"))?,
            target_language: run.target_language.clone(),
        })
    }

    /// Keep the current workspace on disk after the process exits.
    pub fn keep_workspace(&mut self) -> Option<PathBuf> {
        self.run.as_mut().and_then(|run| run.workspace.detach())
    }

    async fn run_phase(&mut self, phase: Phase) -> Result<()> {
        let Some(run) = self.run.as_mut() else {
            return Err(invalid_state("run phase", self.state));
        };
        StageRunner::new(&self.reporter)
            .run_phase(phase, run, &self.collaborators)
            .await
    }

    fn teardown(&mut self) {
        self.review = None;
        if let Some(mut run) = self.run.take() {
            match self.workspaces.destroy(&mut run.workspace) {
                DestroyOutcome::Failed(e) => warn!("Workspace cleanup failed: {}", e),
                DestroyOutcome::AlreadyGone => debug!("Workspace for run {} was already gone", run.id),
                DestroyOutcome::Removed => {}
            }
        }
        self.transition(PipelineState::Idle);
    }

    fn transition(&mut self, next: PipelineState) {
        info!("Pipeline state: {} -> {}", self.state, next);
        self.state = next;
        self.reporter.publish(self.status());
    }

    fn refuse(&self, operation: &'static str) -> DubroError {
        invalid_state(operation, self.state)
    }
}

fn invalid_state(operation: &'static str, state: PipelineState) -> DubroError {
    StateError::InvalidState { operation, state }.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkspaceConfig;
    use crate::error::TimelineError;
    use crate::media::MockMediaProcessorTrait;
    use crate::pipeline::StageStatus;
    use crate::subtitle::Timestamp;
    use crate::synthesize::MockSpeechSynthesizer;
    use crate::transcribe::{MockTranscriberTrait, Transcript, TranscriptSegment};
    use crate::translate::MockTranslator;
    use tokio_test::{assert_err, assert_ok};

    const BONJOUR: &str = "1\n00:00:00,000 --> 00:00:02,000\nBonjour\n\n";

    fn transcript(language: &str, texts: &[&str]) -> Transcript {
        Transcript {
            language: language.to_string(),
            segments: texts
                .iter()
                .enumerate()
                .map(|(i, text)| TranscriptSegment {
                    start: Timestamp::from_millis(i as u64 * 2000),
                    end: Timestamp::from_millis(i as u64 * 2000 + 2000),
                    text: text.to_string(),
                })
                .collect(),
        }
    }

    fn media() -> MockMediaProcessorTrait {
        let mut media = MockMediaProcessorTrait::new();
        media
            .expect_extract_audio()
            .returning(|_, audio| std::fs::write(audio, b"audio").map_err(StageError::from));
        media
            .expect_replace_audio()
            .returning(|_, _, output| std::fs::write(output, b"dubbed video").map_err(StageError::from));
        media
    }

    fn transcriber(result: Transcript) -> MockTranscriberTrait {
        let mut transcriber = MockTranscriberTrait::new();
        transcriber
            .expect_transcribe()
            .times(1)
            .returning(move |_| Ok(result.clone()));
        transcriber
    }

    fn translator(srt: &'static str) -> MockTranslator {
        let mut translator = MockTranslator::new();
        translator
            .expect_translate_file()
            .returning(move |_, target, _, _| std::fs::write(target, srt).map_err(StageError::from));
        translator
    }

    fn synthesizer() -> MockSpeechSynthesizer {
        let mut synthesizer = MockSpeechSynthesizer::new();
        synthesizer
            .expect_synthesize()
            .returning(|_, output, _| std::fs::write(output, b"speech").map_err(StageError::from));
        synthesizer
    }

    fn controller(root: &Path, transcriber: MockTranscriberTrait, translator: MockTranslator) -> PipelineController {
        let collaborators = Collaborators {
            media: Box::new(media()),
            transcriber: Box::new(transcriber),
            translator: Box::new(translator),
            synthesizer: Box::new(synthesizer()),
        };
        with_collaborators(root, collaborators)
    }

    fn with_collaborators(root: &Path, collaborators: Collaborators) -> PipelineController {
        let workspaces = WorkspaceManager::new(&WorkspaceConfig {
            root: Some(root.to_path_buf()),
            ..WorkspaceConfig::default()
        });
        PipelineController::new(collaborators, workspaces)
    }

    fn hello_controller(root: &Path) -> PipelineController {
        controller(root, transcriber(transcript("en", &["Hello"])), translator(BONJOUR))
    }

    fn video() -> VideoSource {
        VideoSource::Bytes(b"video".to_vec())
    }

    #[tokio::test]
    async fn test_edit_then_approve_completes() {
        let root = tempfile::tempdir().unwrap();
        let mut controller = hello_controller(root.path());

        assert_ok!(controller.start(video(), "fr", "en").await);
        assert_eq!(controller.state(), PipelineState::AwaitingReview);

        let pair = controller.review_pair().unwrap();
        assert_eq!(pair.original().get(1).unwrap().text, "Hello");
        assert_eq!(pair.translated().get(1).unwrap().text, "Bonjour");

        assert_ok!(controller.approve_review(EditSet::from([(1, "Salut".to_string())])).await);
        assert_eq!(controller.state(), PipelineState::Completed);
        assert!(controller.edit_buffer().is_none());

        let run = controller.run().unwrap();
        assert_eq!(run.timelines.as_ref().unwrap().translated().get(1).unwrap().text, "Salut");
        let translated = std::fs::read_to_string(run.workspace.path().join("subtitles_fr.srt")).unwrap();
        assert!(translated.contains("Salut"));
        assert!(run.workspace.path().join("subtitles_en.srt").exists());

        let status = controller.status();
        assert!(status.stages.iter().all(|(_, s)| s == StageStatus::Completed));
        assert_eq!(status.progress_hint, 100);

        let result = controller.result().unwrap();
        assert!(result.video_path.ends_with("output_dubbed_video.mp4"));
    }

    #[tokio::test]
    async fn test_transcription_failure_fails_run() {
        let root = tempfile::tempdir().unwrap();
        let mut transcriber = MockTranscriberTrait::new();
        transcriber
            .expect_transcribe()
            .returning(|_| Err(StageError::Transcription("model not loaded".into())));
        let mut controller = controller(root.path(), transcriber, translator(BONJOUR));

        let error = controller.start(video(), "fr", "en").await.unwrap_err();
        assert_eq!(error.failed_stage(), Some(StageKey::Transcription));
        assert!(error.to_string().contains("model not loaded"));

        assert_eq!(controller.state(), PipelineState::Failed);
        let status = controller.status();
        assert_eq!(status.stages.get(StageKey::AudioExtraction), StageStatus::Completed);
        assert_eq!(status.stages.get(StageKey::Transcription), StageStatus::Failed);
        assert_eq!(status.stages.get(StageKey::SubtitleGeneration), StageStatus::Pending);
        assert_eq!(status.stages.get(StageKey::Translation), StageStatus::Pending);

        // Produced artifacts stay for inspection until reset
        let run = controller.run().unwrap();
        assert!(run.workspace.path().join("extracted_audio.wav").exists());
    }

    #[tokio::test]
    async fn test_segment_count_mismatch_fails_before_review() {
        let root = tempfile::tempdir().unwrap();
        let three = "1\n00:00:00,000 --> 00:00:02,000\na\n\n\
                     2\n00:00:02,000 --> 00:00:04,000\nb\n\n\
                     3\n00:00:04,000 --> 00:00:06,000\nc\n\n";
        let mut controller = controller(
            root.path(),
            transcriber(transcript("en", &["one", "two", "three", "four"])),
            translator(three),
        );

        let error = controller.start(video(), "fr", "en").await.unwrap_err();
        assert!(matches!(
            error,
            DubroError::Stage {
                stage: StageKey::Translation,
                source: StageError::Timeline(TimelineError::Mismatch { original: 4, translated: 3 }),
            }
        ));
        assert_eq!(controller.state(), PipelineState::Failed);
        assert!(controller.review_pair().is_none());
    }

    #[tokio::test]
    async fn test_same_language_fails_translation() {
        let root = tempfile::tempdir().unwrap();
        let mut translator = MockTranslator::new();
        translator.expect_translate_file().never();
        let mut controller = controller(root.path(), transcriber(transcript("fr", &["Bonjour"])), translator);

        let error = controller.start(video(), "fr", "en").await.unwrap_err();
        assert_eq!(error.failed_stage(), Some(StageKey::Translation));
    }

    #[tokio::test]
    async fn test_start_while_active_is_rejected_without_mutation() {
        let root = tempfile::tempdir().unwrap();
        let mut controller = hello_controller(root.path());
        let id = controller.start(video(), "fr", "en").await.unwrap();
        controller.edit_segment(1, "Coucou").unwrap();
        let before = controller.status();

        let error = controller.start(video(), "de", "en").await.unwrap_err();
        assert!(matches!(
            error,
            DubroError::State(StateError::AlreadyRunning(PipelineState::AwaitingReview))
        ));
        assert_eq!(controller.run_id(), Some(id));
        assert_eq!(controller.status(), before);
        assert_eq!(controller.edit_buffer().unwrap().get(&1).unwrap(), "Coucou");
    }

    #[tokio::test]
    async fn test_review_operations_outside_review() {
        let root = tempfile::tempdir().unwrap();
        let mut controller = hello_controller(root.path());

        let error = controller.approve_review(EditSet::new()).await.unwrap_err();
        assert!(matches!(
            error,
            DubroError::State(StateError::InvalidState { state: PipelineState::Idle, .. })
        ));
        assert_err!(controller.reject_review());
        assert_err!(controller.review_data());
        assert_eq!(controller.state(), PipelineState::Idle);

        controller.start(video(), "fr", "en").await.unwrap();
        controller.approve_review(EditSet::new()).await.unwrap();
        let before = controller.status();

        assert_err!(controller.approve_review(EditSet::from([(1, "x".to_string())])).await);
        assert_err!(controller.edit_segment(1, "x"));
        assert_eq!(controller.status(), before);
    }

    #[tokio::test]
    async fn test_reject_removes_workspace() {
        let root = tempfile::tempdir().unwrap();
        let mut controller = hello_controller(root.path());
        controller.start(video(), "fr", "en").await.unwrap();
        let workspace = controller.run().unwrap().workspace.path().to_path_buf();

        assert_ok!(controller.reject_review());

        assert_eq!(controller.state(), PipelineState::Idle);
        assert!(controller.run().is_none());
        assert!(controller.edit_buffer().is_none());
        assert!(!workspace.exists());
    }

    #[tokio::test]
    async fn test_reset_twice_is_safe() {
        let root = tempfile::tempdir().unwrap();
        let mut controller = hello_controller(root.path());
        controller.start(video(), "fr", "en").await.unwrap();

        assert_err!(controller.reset());
        assert_eq!(controller.state(), PipelineState::AwaitingReview);

        controller.approve_review(EditSet::new()).await.unwrap();
        let workspace = controller.run().unwrap().workspace.path().to_path_buf();

        assert_ok!(controller.reset());
        assert!(!workspace.exists());
        assert_ok!(controller.reset());
        assert_eq!(controller.status(), PipelineStatus::idle());
    }

    #[tokio::test]
    async fn test_synthesis_failure_fails_run_and_keeps_workspace() {
        let root = tempfile::tempdir().unwrap();
        let mut media = MockMediaProcessorTrait::new();
        media
            .expect_extract_audio()
            .returning(|_, audio| std::fs::write(audio, b"audio").map_err(StageError::from));
        media.expect_replace_audio().never();
        let mut synthesizer = MockSpeechSynthesizer::new();
        synthesizer
            .expect_synthesize()
            .returning(|_, _, _| Err(StageError::Synthesis("voice missing".into())));
        let mut controller = with_collaborators(
            root.path(),
            Collaborators {
                media: Box::new(media),
                transcriber: Box::new(transcriber(transcript("en", &["Hello"]))),
                translator: Box::new(translator(BONJOUR)),
                synthesizer: Box::new(synthesizer),
            },
        );

        controller.start(video(), "fr", "en").await.unwrap();
        let error = controller.approve_review(EditSet::new()).await.unwrap_err();
        assert_eq!(error.failed_stage(), Some(StageKey::SpeechSynthesis));
        assert!(error.to_string().contains("voice missing"));

        assert_eq!(controller.state(), PipelineState::Failed);
        let status = controller.status();
        assert_eq!(status.state, PipelineState::Failed);
        assert_eq!(status.stages.get(StageKey::Translation), StageStatus::Completed);
        assert_eq!(status.stages.get(StageKey::SpeechSynthesis), StageStatus::Failed);
        assert_eq!(status.stages.get(StageKey::VideoMuxing), StageStatus::Pending);
        assert!(status.failure.unwrap().contains("voice missing"));

        let workspace = controller.run().unwrap().workspace.path().to_path_buf();
        assert!(workspace.exists());
        assert!(workspace.join("subtitles_fr.srt").exists());
        assert_err!(controller.result());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_review_open() {
        let root = tempfile::tempdir().unwrap();
        let mut controller = hello_controller(root.path());
        controller.start(video(), "fr", "en").await.unwrap();

        std::fs::remove_dir_all(controller.run().unwrap().workspace.path()).unwrap();

        let error = controller
            .approve_review(EditSet::from([(1, "Salut".to_string())]))
            .await
            .unwrap_err();
        assert!(matches!(error, DubroError::Io(_)));
        assert_eq!(controller.state(), PipelineState::AwaitingReview);
        assert_eq!(controller.edit_buffer().unwrap().get(&1).unwrap(), "Salut");
    }

    #[tokio::test]
    async fn test_subscribers_follow_transitions() {
        let root = tempfile::tempdir().unwrap();
        let mut controller = hello_controller(root.path());
        let receiver = controller.subscribe();

        controller.start(video(), "fr", "en").await.unwrap();
        assert_eq!(receiver.borrow().state, PipelineState::AwaitingReview);
        assert_eq!(receiver.borrow().progress_hint, 100);

        controller.reject_review().unwrap();
        assert_eq!(receiver.borrow().state, PipelineState::Idle);
    }

    #[tokio::test]
    async fn test_missing_input_file() {
        let root = tempfile::tempdir().unwrap();
        let mut transcriber = MockTranscriberTrait::new();
        transcriber.expect_transcribe().never();
        let mut controller = controller(root.path(), transcriber, translator(BONJOUR));

        let error = controller
            .start(VideoSource::File(root.path().join("nope.mp4")), "fr", "en")
            .await
            .unwrap_err();
        assert!(matches!(error, DubroError::FileNotFound(_)));
        assert_eq!(controller.state(), PipelineState::Idle);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_export_uses_download_names() {
        let root = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let mut controller = hello_controller(root.path());
        controller.start(video(), "fr", "en").await.unwrap();
        controller.approve_review(EditSet::new()).await.unwrap();

        let exported = controller.result().unwrap().export(out.path()).await.unwrap();
        let names: Vec<String> = exported
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["dubbed_video_fr.mp4", "original_subtitles.srt", "translated_subtitles_fr.srt"]
        );
    }
}
