use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{MediaConfig, SynthesisConfig};
use crate::error::StageError;
use crate::media::MediaCommandBuilder;
use crate::subtitle::{read_srt, SubtitleSegment};
use crate::workspace::Artifact;
use super::SpeechSynthesizer;

/// Synthesizer that voices each segment with an espeak-ng compatible CLI and
/// mixes the clips onto one track with ffmpeg
pub struct EspeakSynthesizer {
    config: SynthesisConfig,
    command_builder: MediaCommandBuilder,
}

impl EspeakSynthesizer {
    pub fn new(config: SynthesisConfig, media: MediaConfig) -> Self {
        Self {
            config,
            command_builder: MediaCommandBuilder::new(media.binary_path),
        }
    }

    async fn voice_segment(
        &self,
        segment: &SubtitleSegment,
        voice: &str,
        clip_path: &Path,
    ) -> Result<(), StageError> {
        let mut cmd = Command::new(&self.config.binary_path);
        cmd.arg("-v").arg(voice)
            .arg("-w").arg(clip_path)
            .args(&self.config.extra_args)
            .arg("--")
            .arg(segment_speech_text(segment));

        debug!("Executing TTS command: {:?}", cmd);

        let output = cmd.output().await
            .map_err(|e| StageError::Synthesis(format!("Failed to execute {}: {}", self.config.binary_path, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(StageError::Synthesis(format!(
                "Voicing segment {} failed: {}",
                segment.index,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// espeak-ng voice name for a language code
pub fn voice_for_language(language: &str) -> String {
    match language.to_lowercase().as_str() {
        "zh-cn" | "zh" => "cmn".to_string(),
        other => other.to_string(),
    }
}

/// Subtitle line breaks are layout, not pauses
fn segment_speech_text(segment: &SubtitleSegment) -> String {
    segment.text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[async_trait]
impl SpeechSynthesizer for EspeakSynthesizer {
    async fn synthesize(
        &self,
        subtitle_path: &Path,
        output_path: &Path,
        language: &str,
    ) -> Result<(), StageError> {
        let timeline = read_srt(subtitle_path).await?;
        if timeline.is_empty() {
            return Err(StageError::Synthesis("Subtitle file has no segments to voice".to_string()));
        }

        let clips_dir = output_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(Artifact::SpeechClips.file_name("", ""));
        fs::create_dir_all(&clips_dir).await?;

        let voice = voice_for_language(language);
        info!("Synthesizing {} segments with voice '{}'", timeline.len(), voice);

        let mut clips: Vec<(PathBuf, u64)> = Vec::with_capacity(timeline.len());
        for segment in &timeline {
            if segment_speech_text(segment).is_empty() {
                warn!("Segment {} has no text, leaving it silent", segment.index);
                continue;
            }
            let clip_path = clips_dir.join(format!("segment_{:05}.wav", segment.index));
            self.voice_segment(segment, &voice, &clip_path).await?;
            clips.push((clip_path, segment.start.as_millis()));
        }

        if clips.is_empty() {
            return Err(StageError::Synthesis("Every segment is empty, nothing to voice".to_string()));
        }

        self.command_builder
            .mix_clips_at_offsets(&clips, timeline.end().as_millis(), self.config.sample_rate, output_path)
            .execute()
            .await
            .map_err(StageError::Synthesis)?;

        info!("Dubbed audio written to {}", output_path.display());
        Ok(())
    }
}
