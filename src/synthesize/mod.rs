// Text-to-speech synthesis of the reviewed translation
//
// A synthesizer turns the translated subtitle artifact into one audio
// artifact spanning the whole timeline, with each segment's speech starting
// at that segment's start time.

pub mod espeak;

use async_trait::async_trait;
use std::path::Path;

use crate::config::{MediaConfig, SynthesisConfig};
use crate::error::StageError;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Voice `subtitle_path` into `output_path`, failing with
    /// `StageError::Synthesis`
    async fn synthesize(
        &self,
        subtitle_path: &Path,
        output_path: &Path,
        language: &str,
    ) -> Result<(), StageError>;
}

pub struct SynthesizerFactory;

impl SynthesizerFactory {
    pub fn create_synthesizer(config: SynthesisConfig, media: MediaConfig) -> Box<dyn SpeechSynthesizer> {
        Box::new(espeak::EspeakSynthesizer::new(config, media))
    }
}
