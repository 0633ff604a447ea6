use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::TranscriberConfig;
use crate::error::StageError;
use crate::subtitle::Timestamp;
use super::{TranscriberTrait, Transcript, TranscriptSegment};

/// whisper.cpp `-oj` JSON output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppOutput {
    pub result: WhisperCppResult,
    pub transcription: Vec<WhisperCppSegment>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppResult {
    pub language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppSegment {
    pub offsets: WhisperCppOffsets,
    pub text: String,
}

/// Segment bounds in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhisperCppOffsets {
    pub from: i64,
    pub to: i64,
}

impl From<WhisperCppOutput> for Transcript {
    fn from(whisper_output: WhisperCppOutput) -> Self {
        let segments = whisper_output
            .transcription
            .into_iter()
            .filter(|seg| !seg.text.trim().is_empty())
            .map(|seg| {
                let start = seg.offsets.from.max(0) as u64;
                let mut end = seg.offsets.to.max(0) as u64;
                // Timelines require end > start
                if end <= start {
                    warn!("Zero-length whisper segment at {}ms, widening to 1ms", start);
                    end = start + 1;
                }
                TranscriptSegment {
                    start: Timestamp::from_millis(start),
                    end: Timestamp::from_millis(end),
                    text: seg.text.trim().to_string(),
                }
            })
            .collect();

        Transcript {
            language: whisper_output.result.language,
            segments,
        }
    }
}

/// Transcriber backed by the whisper.cpp CLI
pub struct WhisperCppTranscriber {
    config: TranscriberConfig,
}

impl WhisperCppTranscriber {
    pub fn new(config: TranscriberConfig) -> Self {
        Self { config }
    }

    /// Model names resolve to `.dubro/models/ggml-<name>.bin`; anything that
    /// looks like a path is used as given
    fn model_path(&self) -> PathBuf {
        let model = &self.config.model;
        if model.ends_with(".bin") || model.contains(std::path::MAIN_SEPARATOR) {
            PathBuf::from(model)
        } else {
            PathBuf::from(".dubro").join("models").join(format!("ggml-{}.bin", model))
        }
    }

    fn build_command(&self, audio_path: &Path, output_prefix: &Path) -> Command {
        let mut cmd = Command::new(&self.config.binary_path);
        cmd.arg("-m").arg(self.model_path())
            .arg("-f").arg(audio_path)
            .arg("-l").arg("auto")
            .arg("-bs").arg(self.config.beam_size.to_string())
            .arg("-oj")
            .arg("-of").arg(output_prefix);

        if let Some(threads) = self.config.threads {
            cmd.arg("-t").arg(threads.to_string());
        }
        cmd
    }
}

#[async_trait]
impl TranscriberTrait for WhisperCppTranscriber {
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, StageError> {
        info!("Transcribing {} with model {}", audio_path.display(), self.config.model);

        // Scratch output lives beside the audio so it stays inside the run's workspace
        let scratch_parent = audio_path.parent().unwrap_or_else(|| Path::new("."));
        let scratch = tempfile::tempdir_in(scratch_parent)
            .map_err(|e| StageError::Transcription(format!("Failed to create scratch directory: {}", e)))?;
        let output_prefix = scratch.path().join("transcript");

        let mut cmd = self.build_command(audio_path, &output_prefix);
        debug!("Executing whisper command: {:?}", cmd);

        let output = cmd.output().await
            .map_err(|e| StageError::Transcription(format!("Failed to execute {}: {}", self.config.binary_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StageError::Transcription(format!("Whisper failed: {}", stderr.trim())));
        }

        let json_file = output_prefix.with_extension("json");
        let json_content = tokio::fs::read_to_string(&json_file).await
            .map_err(|e| StageError::Transcription(format!("Failed to read output: {}", e)))?;

        let whisper_output: WhisperCppOutput = serde_json::from_str(&json_content)
            .map_err(|e| StageError::Transcription(format!("Failed to parse whisper.cpp JSON: {}", e)))?;

        let transcript = Transcript::from(whisper_output);
        info!("Transcription completed: language {}, {} segments",
              transcript.language, transcript.segments.len());
        Ok(transcript)
    }
}
