// Media processing collaborators
//
// This module wraps ffmpeg behind two pipeline collaborators:
// - Audio extractor: pulls the speech track out of the input video
// - Muxer: puts the dubbed track back onto the original video
//
// Commands are assembled with MediaCommandBuilder so other collaborators
// (speech synthesis) can reuse the same binary and argument conventions.

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::StageError;

/// Audio extraction and remuxing operations consumed by the pipeline
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// Extract audio from video, failing with `StageError::Extraction`
    async fn extract_audio(
        &self,
        video_path: &Path,
        audio_path: &Path,
    ) -> Result<(), StageError>;

    /// Replace the video's audio track, failing with `StageError::Mux`
    async fn replace_audio(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> Result<(), StageError>;

    /// Check if media processor is available
    async fn check_availability(&self) -> Result<(), StageError>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(config: MediaConfig) -> Box<dyn MediaProcessorTrait> {
        Box::new(processor::MediaProcessorImpl::new(config))
    }
}
