use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::config::TranslateConfig;
use crate::error::StageError;
use crate::subtitle::{read_srt, write_srt, SubtitleSegment, SubtitleTimeline};
use super::{Translator, common::OllamaClient};

/// Simple translation: Translate each segment individually without context.
/// Output keeps every segment's index and timing, so the translated file is
/// index-aligned with the source.
pub struct SimpleTranslator {
    client: OllamaClient,
}

impl SimpleTranslator {
    pub fn new(config: TranslateConfig) -> Result<Self, StageError> {
        Ok(Self {
            client: OllamaClient::new(config)?,
        })
    }
}

#[async_trait]
impl Translator for SimpleTranslator {
    async fn translate_file(
        &self,
        source_path: &Path,
        target_path: &Path,
        target_language: &str,
        source_language: &str,
    ) -> Result<(), StageError> {
        info!("Starting simple translation {} -> {}", source_language, target_language);

        self.client.check_availability().await?;

        let source = read_srt(source_path).await?;
        let total_segments = source.len();
        // Repeated lines are common in speech; translate each distinct line once
        let mut seen: HashMap<String, String> = HashMap::new();
        let mut translated = Vec::with_capacity(total_segments);

        for (idx, segment) in source.iter().enumerate() {
            info!("┌─ Translating segment {}/{} ────────", idx + 1, total_segments);
            info!("│ Source: {}", segment.text);

            let text = match seen.get(&segment.text) {
                Some(cached) => cached.clone(),
                None => {
                    let translation = self.client
                        .translate_text(&segment.text, target_language, source_language)
                        .await?;
                    seen.insert(segment.text.clone(), translation.clone());
                    translation
                }
            };

            info!("│ Target: {}", text);
            info!("└─────────────────────────────────────");
            translated.push(SubtitleSegment { text, ..segment.clone() });
        }

        let timeline = SubtitleTimeline::from_segments(translated)?;
        write_srt(&timeline, target_path).await?;

        info!("Translated {} segments to {}", total_segments, target_language);
        Ok(())
    }
}
