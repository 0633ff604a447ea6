use serde::Serialize;
use tracing::{debug, info};

use crate::error::TimelineError;
use crate::subtitle::{aligned_pair, AlignedPair, EditSet, SubtitleTimeline};

/// How a reviewer leaves the checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Edit buffer for the translated timeline. Writes are last-write-wins per
/// segment index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReviewCheckpoint {
    buffer: EditSet,
}

impl ReviewCheckpoint {
    /// Seed the buffer with the translated texts.
    pub fn open(pair: &AlignedPair) -> Self {
        info!("Review checkpoint opened with {} segments", pair.len());
        Self {
            buffer: pair.translated().texts(),
        }
    }

    pub fn buffer(&self) -> &EditSet {
        &self.buffer
    }

    pub fn edit<S: Into<String>>(&mut self, index: u32, text: S) {
        let text = text.into();
        debug!("Review edit for segment {}: {}", index, text);
        self.buffer.insert(index, text);
    }

    pub fn merge(&mut self, edits: &EditSet) {
        for (index, text) in edits {
            self.edit(*index, text.clone());
        }
    }

    /// Apply the buffer to the translated timeline and re-check alignment.
    /// The pair itself is left untouched so a failed commit can be retried.
    pub fn commit(&self, pair: &AlignedPair) -> Result<AlignedPair, TimelineError> {
        let candidate: SubtitleTimeline = pair.translated().apply_edits(&self.buffer);
        aligned_pair(pair.original().clone(), candidate)
    }
}

/// Copy of the aligned pair handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReviewData {
    pub original: SubtitleTimeline,
    pub translated: SubtitleTimeline,
    pub edits: EditSet,
}

impl ReviewData {
    pub fn new(pair: &AlignedPair, checkpoint: &ReviewCheckpoint) -> Self {
        Self {
            original: pair.original().clone(),
            translated: pair.translated().clone(),
            edits: checkpoint.buffer().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitle::{SubtitleSegment, Timestamp};

    fn single(text: &str) -> SubtitleTimeline {
        SubtitleTimeline::from_segments(vec![SubtitleSegment::new(
            1,
            Timestamp::from_millis(0),
            Timestamp::from_millis(2000),
            text,
        )])
        .unwrap()
    }

    #[test]
    fn test_open_seeds_buffer_from_translation() {
        let pair = aligned_pair(single("Hello"), single("Bonjour")).unwrap();
        let checkpoint = ReviewCheckpoint::open(&pair);
        assert_eq!(checkpoint.buffer().get(&1).map(String::as_str), Some("Bonjour"));
    }

    #[test]
    fn test_last_write_wins() {
        let pair = aligned_pair(single("Hello"), single("Bonjour")).unwrap();
        let mut checkpoint = ReviewCheckpoint::open(&pair);

        checkpoint.edit(1, "Coucou");
        checkpoint.merge(&EditSet::from([(1, "Salut".to_string())]));

        let committed = checkpoint.commit(&pair).unwrap();
        assert_eq!(committed.translated().get(1).unwrap().text, "Salut");
        assert_eq!(committed.original().get(1).unwrap().text, "Hello");
        assert_eq!(pair.translated().get(1).unwrap().text, "Bonjour");
    }

    #[test]
    fn test_commit_ignores_unknown_index() {
        let pair = aligned_pair(single("Hello"), single("Bonjour")).unwrap();
        let mut checkpoint = ReviewCheckpoint::open(&pair);
        checkpoint.edit(42, "nowhere");

        let committed = checkpoint.commit(&pair).unwrap();
        assert_eq!(committed.translated(), pair.translated());
    }
}
