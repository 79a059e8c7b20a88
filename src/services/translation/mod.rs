pub mod protect;

use crate::core::error::TranslationError;
use crate::core::state::Story;
use crate::services::llm::{create_llm, strip_code_blocks, LlmClient, LlmConfig};
use crate::utils::text::split_paragraphs;
use async_trait::async_trait;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub use protect::TermProtector;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Overrides the LLM provider's model for translation calls.
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_source_language")]
    pub source_language: String,
    #[serde(default = "default_target_language")]
    pub target_language: String,
    #[serde(default)]
    pub protected_terms: Vec<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            model: String::new(),
            source_language: default_source_language(),
            target_language: default_target_language(),
            protected_terms: Vec::new(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_enabled() -> bool {
    true
}
fn default_source_language() -> String {
    "English".to_string()
}
fn default_target_language() -> String {
    "Spanish".to_string()
}
fn default_batch_size() -> usize {
    16
}

/// Black-box text-to-text model: one output paragraph per input paragraph.
#[async_trait]
pub trait TranslationModel: Send + Sync {
    async fn translate(&self, batch: &[String]) -> anyhow::Result<Vec<String>>;
}

pub struct LlmTranslationModel {
    llm: Box<dyn LlmClient>,
    source_language: String,
    target_language: String,
}

impl LlmTranslationModel {
    pub fn new(llm: Box<dyn LlmClient>, config: &TranslationConfig) -> Self {
        Self {
            llm,
            source_language: config.source_language.clone(),
            target_language: config.target_language.clone(),
        }
    }

    pub fn from_config(
        llm_config: &LlmConfig,
        config: &TranslationConfig,
    ) -> Result<Self, TranslationError> {
        let llm = create_llm(llm_config, Some(&config.model))
            .map_err(|e| TranslationError::ModelLoad(format!("{:#}", e)))?;
        info!(
            "Translation model ready ({} -> {})",
            config.source_language, config.target_language
        );
        Ok(Self::new(llm, config))
    }

    fn prompt(&self, batch: &[String]) -> anyhow::Result<String> {
        Ok(format!(
            "Translate each paragraph of the following JSON array from {} to {}.\n\
             Rules:\n\
             1. Keep every token of the form __TERMn__ exactly as written.\n\
             2. Keep quotation marks and dialogue punctuation.\n\
             3. Return ONLY a JSON array of strings with exactly {} elements, in the same order.\n\n\
             {}",
            self.source_language,
            self.target_language,
            batch.len(),
            serde_json::to_string(batch)?
        ))
    }
}

#[async_trait]
impl TranslationModel for LlmTranslationModel {
    async fn translate(&self, batch: &[String]) -> anyhow::Result<Vec<String>> {
        let prompt = self.prompt(batch)?;
        let response = self
            .llm
            .chat("You are a literary translator. Reply with valid JSON only.", &prompt)
            .await?;
        let clean_json = strip_code_blocks(&response);
        let translated: Vec<String> = serde_json::from_str(&clean_json)
            .map_err(|e| anyhow::anyhow!("Failed to parse translation JSON: {} ({})", clean_json, e))?;
        Ok(translated)
    }
}

/// Caching translation adapter. The cache is keyed by exact source paragraph
/// and lives as long as the translator.
pub struct Translator {
    model: Box<dyn TranslationModel>,
    protector: TermProtector,
    batch_size: usize,
    cache: HashMap<String, String>,
}

impl Translator {
    pub fn new(model: Box<dyn TranslationModel>, config: &TranslationConfig) -> Self {
        Self {
            model,
            protector: TermProtector::new(&config.protected_terms),
            batch_size: config.batch_size.max(1),
            cache: HashMap::new(),
        }
    }

    pub async fn translate_story(&mut self, story: &mut Story) -> Result<(), TranslationError> {
        if story.original_text.trim().is_empty() {
            warn!("Original text is empty, nothing to translate");
            story.translated_text = String::new();
            return Ok(());
        }

        info!("Translating story '{}'", story.title);
        let paragraphs = split_paragraphs(&story.original_text);
        let translated = self.translate_batch(&paragraphs).await?;
        story.translated_text = translated.join("\n\n");
        info!("Story translated ({} paragraphs)", translated.len());
        Ok(())
    }

    /// Translates `batch`, calling the model only for paragraphs not cached yet.
    pub async fn translate_batch(&mut self, batch: &[String]) -> Result<Vec<String>, TranslationError> {
        let mut misses: Vec<String> = Vec::new();
        for text in batch {
            if !self.cache.contains_key(text) && !misses.contains(text) {
                misses.push(text.clone());
            }
        }

        for chunk in misses.chunks(self.batch_size) {
            info!("Translating a batch of {} paragraphs", chunk.len());
            let (protected, maps) = self.protector.protect(chunk);
            let raw = self
                .model
                .translate(&protected)
                .await
                .map_err(|e| TranslationError::Batch(format!("{:#}", e)))?;
            if raw.len() != chunk.len() {
                return Err(TranslationError::BatchLength {
                    expected: chunk.len(),
                    got: raw.len(),
                });
            }
            let restored = TermProtector::restore(&raw, &maps);
            for (original, translated) in chunk.iter().zip(restored) {
                self.cache.insert(original.clone(), translated);
            }
        }

        batch
            .iter()
            .map(|text| {
                self.cache
                    .get(text)
                    .cloned()
                    .ok_or_else(|| TranslationError::Batch(format!("no translation for '{}'", text)))
            })
            .collect()
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
