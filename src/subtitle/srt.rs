use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;
use tokio::fs;
use tracing::info;

use super::{SubtitleSegment, SubtitleTimeline, Timestamp};
use crate::error::{StageError, TimelineError};

static TIMING_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d+:\d{2}:\d{2}[,.]\d{3})\s*-->\s*(\d+:\d{2}:\d{2}[,.]\d{3})")
        .expect("timing regex is valid")
});

/// Render a timeline as SRT. Blank lines inside a segment's text would end the
/// block early, so they are dropped.
pub fn render_srt(timeline: &SubtitleTimeline) -> String {
    let mut srt_content = String::new();

    for segment in timeline {
        let text = segment
            .text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        srt_content.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            segment.index, segment.start, segment.end, text
        ));
    }

    srt_content
}

/// Parse SRT content. Any block without a numeric index or a valid timing
/// line fails the whole parse.
pub fn parse_srt(content: &str) -> Result<SubtitleTimeline, TimelineError> {
    let content = content.trim_start_matches('\u{feff}');
    let mut segments = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    let mut block_number = 0;

    let lines = content.lines().map(|line| line.trim_end_matches('\r'));
    for line in lines.chain(std::iter::once("")) {
        if !line.trim().is_empty() {
            block.push(line);
            continue;
        }
        if block.is_empty() {
            continue;
        }

        block_number += 1;
        segments.push(parse_block(&block, block_number)?);
        block.clear();
    }

    SubtitleTimeline::from_segments(segments)
}

fn parse_block(block: &[&str], block_number: usize) -> Result<SubtitleSegment, TimelineError> {
    let index: u32 = block[0].trim().parse().map_err(|_| {
        TimelineError::Parse(format!(
            "block {}: expected a segment index, found '{}'",
            block_number, block[0]
        ))
    })?;

    let timing = block.get(1).map(|line| line.trim()).unwrap_or_default();
    let caps = TIMING_REGEX.captures(timing).ok_or_else(|| {
        TimelineError::Parse(format!(
            "block {}: expected 'start --> end', found '{}'",
            block_number, timing
        ))
    })?;

    let start: Timestamp = caps[1].parse()?;
    let end: Timestamp = caps[2].parse()?;
    let text = block[2..].join("\n");

    Ok(SubtitleSegment::new(index, start, end, text))
}

/// Write a timeline to an SRT file
pub async fn write_srt<P: AsRef<Path>>(timeline: &SubtitleTimeline, output_path: P) -> Result<(), StageError> {
    let output_path = output_path.as_ref();
    info!("Writing SRT file: {}", output_path.display());

    fs::write(output_path, render_srt(timeline)).await?;

    info!("SRT file written with {} segments", timeline.len());
    Ok(())
}

/// Read an SRT file into a timeline
pub async fn read_srt<P: AsRef<Path>>(input_path: P) -> Result<SubtitleTimeline, StageError> {
    let content = fs::read_to_string(input_path.as_ref()).await?;
    Ok(parse_srt(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_fs::prelude::*;

    const SAMPLE: &str = "\u{feff}1\r\n00:00:00,000 --> 00:00:02,000\r\nHello\r\n\r\n2\r\n00:00:02,500 --> 00:00:04,000\r\nHow are\r\nyou?\r\n";

    #[test]
    fn test_parse_sample() {
        let timeline = parse_srt(SAMPLE).unwrap();
        assert_eq!(timeline.len(), 2);

        let second = timeline.get(2).unwrap();
        assert_eq!(second.start.as_millis(), 2500);
        assert_eq!(second.end.as_millis(), 4000);
        assert_eq!(second.text, "How are\nyou?");
    }

    #[test]
    fn test_render_matches_srt_layout() {
        let timeline = parse_srt(SAMPLE).unwrap();
        assert_eq!(
            render_srt(&timeline),
            "1\n00:00:00,000 --> 00:00:02,000\nHello\n\n2\n00:00:02,500 --> 00:00:04,000\nHow are\nyou?\n\n"
        );
    }

    #[test]
    fn test_render_drops_blank_lines_in_text() {
        let timeline = SubtitleTimeline::from_segments(vec![SubtitleSegment::new(
            1,
            Timestamp::from_millis(0),
            Timestamp::from_millis(1000),
            "first\n\n  second  ",
        )])
        .unwrap();

        let reparsed = parse_srt(&render_srt(&timeline)).unwrap();
        assert_eq!(reparsed.get(1).unwrap().text, "first\nsecond");
    }

    #[test]
    fn test_malformed_blocks() {
        let no_index = "abc\n00:00:00,000 --> 00:00:01,000\nHi\n";
        assert!(matches!(parse_srt(no_index), Err(TimelineError::Parse(_))));

        let no_timing = "1\nnot a timing line\nHi\n";
        assert!(matches!(parse_srt(no_timing), Err(TimelineError::Parse(_))));

        let inverted = "1\n00:00:02,000 --> 00:00:01,000\nHi\n";
        assert!(matches!(parse_srt(inverted), Err(TimelineError::Malformed { index: 1, .. })));
    }

    #[test]
    fn test_oversized_hours_fail_parse() {
        let content = "1\n99999999999999999:00:00,000 --> 99999999999999999:00:01,000\nHi\n";
        assert!(matches!(parse_srt(content), Err(TimelineError::Parse(_))));
    }

    #[test]
    fn test_empty_content_is_empty_timeline() {
        assert!(parse_srt("").unwrap().is_empty());
        assert!(parse_srt("\n\n").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_write_then_read() {
        let temp = assert_fs::TempDir::new().unwrap();
        let file = temp.child("subtitles_en.srt");

        let timeline = parse_srt(SAMPLE).unwrap();
        write_srt(&timeline, file.path()).await.unwrap();
        file.assert(render_srt(&timeline));

        let loaded = read_srt(file.path()).await.unwrap();
        assert_eq!(loaded, timeline);
    }

    #[tokio::test]
    async fn test_read_missing_file_is_io_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let result = read_srt(temp.child("missing.srt").path()).await;
        assert!(matches!(result, Err(StageError::Io(_))));
    }
}
