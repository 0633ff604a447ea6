use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::TranslateConfig;
use crate::error::StageError;
use crate::language::language_name;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResponse {
    pub response: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub text: String,
}

/// Ollama client shared by translator implementations
pub struct OllamaClient {
    pub client: Client,
    pub config: TranslateConfig,
}

impl OllamaClient {
    pub fn new(config: TranslateConfig) -> Result<Self, StageError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StageError::Translation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Translate one piece of text, retrying up to `max_retries` times
    pub async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
    ) -> Result<String, StageError> {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                warn!("Retrying translation (attempt {}/{})", attempt, self.config.max_retries);
            }
            match self.request_translation(text, target_language, source_language).await {
                Ok(translation) => return Ok(translation),
                Err(e) => {
                    warn!("Translation attempt failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| StageError::Translation("No translation attempt made".to_string())))
    }

    async fn request_translation(
        &self,
        text: &str,
        target_language: &str,
        source_language: &str,
    ) -> Result<String, StageError> {
        let request = TranslationRequest {
            model: self.config.model.clone(),
            prompt: build_translation_prompt(text, target_language, source_language),
            stream: false,
            format: "json".to_string(),
        };

        let url = format!("{}/api/generate", self.config.endpoint);
        debug!("Sending translation request to: {}", url);

        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| StageError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(StageError::Translation(format!(
                "Ollama API error {}: {}", status, error_text
            )));
        }

        let translation_response: TranslationResponse = response.json().await
            .map_err(|e| StageError::Translation(format!("Failed to parse response: {}", e)))?;

        debug!("Raw Ollama response: {}", translation_response.response);

        parse_translation_response(&translation_response.response)
            .ok_or_else(|| StageError::Translation("Empty translation received".to_string()))
    }

    /// Check that Ollama is reachable and the model is pulled
    pub async fn check_availability(&self) -> Result<(), StageError> {
        let url = format!("{}/api/show", self.config.endpoint);
        let model = &self.config.model;

        let response = self.client
            .post(&url)
            .json(&json!({ "name": model }))
            .send()
            .await
            .map_err(|e| StageError::Translation(format!("Failed to connect to Ollama: {}", e)))?;

        if response.status().is_success() {
            info!("Ollama model '{}' is available", model);
            Ok(())
        } else {
            Err(StageError::Translation(format!(
                "Ollama model '{}' not found. Please pull the model first: ollama pull {}",
                model, model
            )))
        }
    }
}

/// Build the translation prompt, asking for a JSON `{"text": ...}` reply
pub fn build_translation_prompt(text: &str, target_language: &str, source_language: &str) -> String {
    let target_name = language_name(target_language);
    let source_name = language_name(source_language);

    format!(
        "You are a professional translator for video dubbing.\n\
         \n\
         CRITICAL: You must translate the text from {} to {} ONLY. Do not translate to any other language.\n\
         The target language is: {} (language code: {})\n\
         The translation will be spoken aloud, so keep it natural and about as long as the source.\n\
         \n\
         Return ONLY the translation in JSON format as {{\"text\":\"your {} translation here\"}}.\n\
         Do not include any explanations, alternatives, or text in other languages.\n\
         \n\
         Text to translate: \"{}\"\n",
        source_name, target_name, target_name, target_language, target_name, text
    )
}

/// Extract the translation from a raw model reply; `None` when it is empty
pub fn parse_translation_response(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(result) = serde_json::from_str::<TranslationResult>(raw) {
        let text = result.text.trim();
        return (!text.is_empty()).then(|| text.to_string());
    }

    Some(clean_translation_response(raw))
}

/// Strip chatty preambles some models add around the translation
fn clean_translation_response(response: &str) -> String {
    let lines: Vec<&str> = response.lines().collect();

    for &line in &lines {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with("Here are") ||
           trimmed.starts_with("Here is") ||
           trimmed.starts_with("Option") ||
           trimmed.starts_with("**Option") ||
           trimmed.starts_with("Translation:") ||
           trimmed.starts_with("- ") ||
           trimmed.starts_with("* ") {
            continue;
        }

        if trimmed.starts_with("**") && trimmed.ends_with("**") {
            continue;
        }

        return trimmed.to_string();
    }

    response.trim().to_string()
}
