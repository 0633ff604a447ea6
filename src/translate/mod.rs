// Machine translation of subtitle files
//
// Translators consume a source subtitle artifact and produce a translated one
// with the same segment count and order. The bundled implementation asks an
// Ollama model to translate each segment independently.

pub mod common;
pub mod simple;

use async_trait::async_trait;
use std::path::Path;

pub use common::*;
use crate::config::TranslateConfig;
use crate::error::StageError;

/// Main trait for translation operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `source_path` into `target_path`, failing with
    /// `StageError::Translation`
    async fn translate_file(
        &self,
        source_path: &Path,
        target_path: &Path,
        target_language: &str,
        source_language: &str,
    ) -> Result<(), StageError>;
}

/// Factory for creating translator instances
pub struct TranslatorFactory;

impl TranslatorFactory {
    /// Create the default segment-by-segment translator
    pub fn create_translator(config: TranslateConfig) -> Result<Box<dyn Translator>, StageError> {
        Ok(Box::new(simple::SimpleTranslator::new(config)?))
    }
}
