// Speech-to-text transcription
//
// The pipeline only depends on TranscriberTrait. The bundled implementation
// drives the whisper.cpp command line tool and maps its JSON output into a
// service-agnostic Transcript.
//
// To add a new transcription service:
// 1. Parse the service's output into a Transcript
// 2. Implement TranscriberTrait for it
// 3. Add the service to TranscriberImplementation and the factory

pub mod whisper_cpp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::TranscriberConfig;
use crate::error::StageError;
use crate::subtitle::{SubtitleTimeline, Timestamp};
use crate::error::TimelineError;

/// One recognised span of speech
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: Timestamp,
    pub end: Timestamp,
    pub text: String,
}

/// Transcriber output: detected language and ordered segments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub language: String,
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// Number the segments from 1 and validate them as a timeline
    pub fn to_timeline(&self) -> Result<SubtitleTimeline, TimelineError> {
        SubtitleTimeline::from_spans(
            self.segments
                .iter()
                .map(|seg| (seg.start, seg.end, seg.text.clone())),
        )
    }
}

/// Main trait for transcription operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriberTrait: Send + Sync {
    /// Transcribe audio file, failing with `StageError::Transcription`
    async fn transcribe(&self, audio_path: &Path) -> Result<Transcript, StageError>;
}

/// Transcriber implementation type
#[derive(Debug, Clone)]
pub enum TranscriberImplementation {
    WhisperCpp,
}

/// Factory for creating transcriber instances
pub struct TranscriberFactory;

impl TranscriberFactory {
    /// Create a transcriber based on implementation type
    pub fn create_transcriber(
        implementation: TranscriberImplementation,
        config: TranscriberConfig,
    ) -> Box<dyn TranscriberTrait> {
        match implementation {
            TranscriberImplementation::WhisperCpp => {
                Box::new(whisper_cpp::WhisperCppTranscriber::new(config))
            }
        }
    }

    /// Create with default implementation
    pub fn create_default(config: TranscriberConfig) -> Box<dyn TranscriberTrait> {
        Self::create_transcriber(TranscriberImplementation::WhisperCpp, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transcript_to_timeline_numbers_from_one() {
        let transcript = Transcript {
            language: "en".to_string(),
            segments: vec![
                TranscriptSegment {
                    start: Timestamp::from_millis(0),
                    end: Timestamp::from_millis(1200),
                    text: "Hello".to_string(),
                },
                TranscriptSegment {
                    start: Timestamp::from_millis(1500),
                    end: Timestamp::from_millis(3000),
                    text: "world".to_string(),
                },
            ],
        };

        let timeline = transcript.to_timeline().unwrap();
        let indices: Vec<u32> = timeline.iter().map(|s| s.index).collect();
        assert_eq!(indices, vec![1, 2]);
    }
}
