//! Subtitle timeline model shared by transcription, translation, review and
//! synthesis.
//!
//! A [`SubtitleTimeline`] is validated on construction: every segment has a
//! positive index, `start < end`, and indices are unique. Segments are kept in
//! insertion order. Transcribers occasionally emit segments that start before
//! their predecessor or overlap it; those are tolerated and reported through
//! [`SubtitleTimeline::ordering_anomalies`], never silently reordered.

pub mod srt;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::TimelineError;

pub use srt::{parse_srt, read_srt, render_srt, write_srt};

/// Edits submitted during review, keyed by segment index.
pub type EditSet = BTreeMap<u32, String>;

/// Millisecond-precision position on the media timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    /// Convert fractional seconds, rounding to the nearest millisecond.
    /// Negative and non-finite inputs clamp to zero.
    pub fn from_secs_f64(seconds: f64) -> Self {
        if !seconds.is_finite() || seconds <= 0.0 {
            return Self::ZERO;
        }
        Self((seconds * 1000.0).round() as u64)
    }

    pub fn as_millis(&self) -> u64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

/// Formats as `HH:MM:SS,mmm`.
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hours = self.0 / 3_600_000;
        let minutes = (self.0 % 3_600_000) / 60_000;
        let secs = (self.0 % 60_000) / 1_000;
        let millis = self.0 % 1_000;

        write!(f, "{:02}:{:02}:{:02},{:03}", hours, minutes, secs, millis)
    }
}

/// Parses `H:MM:SS,mmm`, accepting any number of hour digits and `.` as the
/// millisecond separator.
impl FromStr for Timestamp {
    type Err = TimelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TimelineError::Parse(format!("invalid timestamp '{}'", s));
        let trimmed = s.trim();

        let mut parts = trimmed.splitn(3, ':');
        let (Some(hours), Some(minutes), Some(rest)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        let (seconds, millis) = rest.split_once([',', '.']).ok_or_else(invalid)?;

        let hours: u64 = hours.parse().map_err(|_| invalid())?;
        let minutes: u64 = minutes.parse().map_err(|_| invalid())?;
        let seconds: u64 = seconds.parse().map_err(|_| invalid())?;
        if minutes >= 60 || seconds >= 60 || millis.len() != 3 {
            return Err(invalid());
        }
        let millis: u64 = millis.parse().map_err(|_| invalid())?;

        hours
            .checked_mul(3600)
            .and_then(|secs| secs.checked_add(minutes * 60 + seconds))
            .and_then(|secs| secs.checked_mul(1000))
            .and_then(|ms| ms.checked_add(millis))
            .map(Self)
            .ok_or_else(invalid)
    }
}

/// One time-stamped line of speech.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleSegment {
    pub index: u32,
    pub start: Timestamp,
    pub end: Timestamp,
    pub text: String,
}

impl SubtitleSegment {
    pub fn new<S: Into<String>>(index: u32, start: Timestamp, end: Timestamp, text: S) -> Self {
        Self {
            index,
            start,
            end,
            text: text.into(),
        }
    }

    pub fn duration_ms(&self) -> u64 {
        self.end.as_millis().saturating_sub(self.start.as_millis())
    }

    fn validate(&self) -> Result<(), TimelineError> {
        if self.index == 0 {
            return Err(TimelineError::Malformed {
                index: self.index,
                reason: "has index 0, indices must be positive".to_string(),
            });
        }
        if self.start >= self.end {
            return Err(TimelineError::Malformed {
                index: self.index,
                reason: format!("starts at {} but ends at {}", self.start, self.end),
            });
        }
        Ok(())
    }
}

impl fmt::Display for SubtitleSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {} → {} {}", self.index, self.start, self.end, self.text)
    }
}

/// Segment whose placement breaks monotonic, non-overlapping order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderingAnomaly {
    /// Segment starts before the segment preceding it.
    OutOfOrder { index: u32, previous: u32 },
    /// Segment starts before the preceding segment ends.
    Overlap { index: u32, previous: u32 },
}

/// Ordered, validated sequence of subtitle segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubtitleTimeline {
    segments: Vec<SubtitleSegment>,
}

impl SubtitleTimeline {
    /// Build a timeline, rejecting `start >= end`, zero indices and index
    /// collisions. Ordering anomalies are logged and kept as-is.
    pub fn from_segments(segments: Vec<SubtitleSegment>) -> Result<Self, TimelineError> {
        let mut seen = HashSet::with_capacity(segments.len());
        for segment in &segments {
            segment.validate()?;
            if !seen.insert(segment.index) {
                return Err(TimelineError::DuplicateIndex(segment.index));
            }
        }

        let timeline = Self { segments };
        for anomaly in timeline.ordering_anomalies() {
            warn!("Timeline ordering anomaly kept as-is: {:?}", anomaly);
        }
        Ok(timeline)
    }

    /// Number spans from 1 in the order given and build a timeline.
    pub fn from_spans<I, S>(spans: I) -> Result<Self, TimelineError>
    where
        I: IntoIterator<Item = (Timestamp, Timestamp, S)>,
        S: Into<String>,
    {
        let segments = spans
            .into_iter()
            .enumerate()
            .map(|(i, (start, end, text))| SubtitleSegment::new(i as u32 + 1, start, end, text))
            .collect();
        Self::from_segments(segments)
    }

    pub fn segments(&self) -> &[SubtitleSegment] {
        &self.segments
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SubtitleSegment> {
        self.segments.iter()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<&SubtitleSegment> {
        self.segments.iter().find(|s| s.index == index)
    }

    /// Text of every segment keyed by index.
    pub fn texts(&self) -> EditSet {
        self.segments.iter().map(|s| (s.index, s.text.clone())).collect()
    }

    /// Latest end time across all segments.
    pub fn end(&self) -> Timestamp {
        self.segments.iter().map(|s| s.end).max().unwrap_or(Timestamp::ZERO)
    }

    pub fn ordering_anomalies(&self) -> Vec<OrderingAnomaly> {
        self.segments
            .windows(2)
            .filter_map(|pair| {
                let (previous, current) = (&pair[0], &pair[1]);
                if current.start < previous.start {
                    Some(OrderingAnomaly::OutOfOrder { index: current.index, previous: previous.index })
                } else if current.start < previous.end {
                    Some(OrderingAnomaly::Overlap { index: current.index, previous: previous.index })
                } else {
                    None
                }
            })
            .collect()
    }

    /// Return a copy with `text` replaced for every index present in `edits`.
    /// Indices, timings and order never change; unknown indices are ignored.
    pub fn apply_edits(&self, edits: &EditSet) -> SubtitleTimeline {
        for index in edits.keys().filter(|i| self.get(**i).is_none()) {
            debug!("Ignoring edit for unknown segment index {}", index);
        }

        let segments = self
            .segments
            .iter()
            .map(|segment| match edits.get(&segment.index) {
                Some(text) => SubtitleSegment { text: text.clone(), ..segment.clone() },
                None => segment.clone(),
            })
            .collect();

        SubtitleTimeline { segments }
    }
}

impl<'de> Deserialize<'de> for SubtitleTimeline {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            segments: Vec<SubtitleSegment>,
        }

        let raw = Raw::deserialize(deserializer)?;
        SubtitleTimeline::from_segments(raw.segments).map_err(serde::de::Error::custom)
    }
}

impl<'a> IntoIterator for &'a SubtitleTimeline {
    type Item = &'a SubtitleSegment;
    type IntoIter = std::slice::Iter<'a, SubtitleSegment>;

    fn into_iter(self) -> Self::IntoIter {
        self.segments.iter()
    }
}

/// Original and translated timelines with index-aligned correspondence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlignedPair {
    original: SubtitleTimeline,
    translated: SubtitleTimeline,
    drift: Vec<usize>,
}

/// Pair the timelines, failing with [`TimelineError::Mismatch`] when their
/// lengths differ. Positions whose index or timing disagree are accepted but
/// flagged in [`AlignedPair::drift`].
pub fn aligned_pair(
    original: SubtitleTimeline,
    translated: SubtitleTimeline,
) -> Result<AlignedPair, TimelineError> {
    if original.len() != translated.len() {
        return Err(TimelineError::Mismatch {
            original: original.len(),
            translated: translated.len(),
        });
    }

    let drift: Vec<usize> = original
        .iter()
        .zip(translated.iter())
        .enumerate()
        .filter(|(_, (o, t))| o.index != t.index || o.start != t.start || o.end != t.end)
        .map(|(position, _)| position)
        .collect();

    if !drift.is_empty() {
        warn!(
            "Translated timeline drifts from original at {} position(s): {:?}",
            drift.len(),
            drift
        );
    }

    Ok(AlignedPair { original, translated, drift })
}

impl AlignedPair {
    pub fn original(&self) -> &SubtitleTimeline {
        &self.original
    }

    pub fn translated(&self) -> &SubtitleTimeline {
        &self.translated
    }

    /// Positions where index or timing differ between the two timelines.
    pub fn drift(&self) -> &[usize] {
        &self.drift
    }

    pub fn len(&self) -> usize {
        self.original.len()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    /// Side-by-side rows for review listings.
    pub fn rows(&self) -> impl Iterator<Item = (&SubtitleSegment, &SubtitleSegment)> {
        self.original.iter().zip(self.translated.iter())
    }

    pub fn into_parts(self) -> (SubtitleTimeline, SubtitleTimeline) {
        (self.original, self.translated)
    }
}
