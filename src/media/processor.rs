use async_trait::async_trait;
use std::path::Path;
use tracing::info;

use crate::config::MediaConfig;
use crate::error::StageError;
use super::{MediaProcessorTrait, MediaCommandBuilder};

/// Concrete implementation of media processor (FFmpeg-based)
pub struct MediaProcessorImpl {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
}

impl MediaProcessorImpl {
    /// Create a new media processor implementation
    pub fn new(config: MediaConfig) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
        }
    }
}

#[async_trait]
impl MediaProcessorTrait for MediaProcessorImpl {
    async fn extract_audio(
        &self,
        video_path: &Path,
        audio_path: &Path,
    ) -> Result<(), StageError> {
        info!("Extracting audio from {} to {}", video_path.display(), audio_path.display());

        self.command_builder
            .extract_audio(video_path, audio_path)
            .execute()
            .await
            .map_err(StageError::Extraction)?;

        if !audio_path.exists() {
            return Err(StageError::Extraction(format!(
                "{} produced no audio output",
                self.config.binary_path
            )));
        }

        info!("Audio extraction completed");
        Ok(())
    }

    async fn replace_audio(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> Result<(), StageError> {
        info!("Replacing audio of {} with {} -> {}",
              video_path.display(), audio_path.display(), output_path.display());

        self.command_builder
            .replace_audio(
                video_path,
                audio_path,
                output_path,
                &self.config.video_codec,
                &self.config.audio_codec,
                &self.config.extra_options,
            )
            .execute()
            .await
            .map_err(StageError::Mux)?;

        info!("Audio track replacement completed successfully");
        Ok(())
    }

    async fn check_availability(&self) -> Result<(), StageError> {
        self.command_builder
            .version_check()
            .execute()
            .await
            .map_err(|e| StageError::Extraction(format!("Media processor not available: {}", e)))?;

        info!("Media processor is available");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor_with_binary(binary: &str) -> MediaProcessorImpl {
        MediaProcessorImpl::new(MediaConfig {
            binary_path: binary.to_string(),
            ..MediaConfig::default()
        })
    }

    #[tokio::test]
    async fn test_extraction_failure_maps_to_extraction_error() {
        let processor = processor_with_binary("definitely-not-a-real-ffmpeg-binary");
        let result = processor
            .extract_audio(Path::new("in.mp4"), Path::new("out.wav"))
            .await;
        assert!(matches!(result, Err(StageError::Extraction(_))));
    }

    #[tokio::test]
    async fn test_mux_failure_maps_to_mux_error() {
        let processor = processor_with_binary("definitely-not-a-real-ffmpeg-binary");
        let result = processor
            .replace_audio(Path::new("in.mp4"), Path::new("dub.wav"), Path::new("out.mp4"))
            .await;
        assert!(matches!(result, Err(StageError::Mux(_))));
    }
}
