pub mod command;
pub mod gradio;
pub mod synthesizer;
pub mod voice_bank;

use crate::core::error::SynthesisError;
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use command::CommandEngine;
pub use gradio::GradioEngine;
pub use synthesizer::SpeechSynthesizer;
pub use voice_bank::VoiceBank;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TtsConfig {
    /// "gradio" or "command".
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Gradio API name of the cloning endpoint.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Program and arguments for the "command" provider. `{text}`,
    /// `{reference}`, `{language}`, `{output}` and `{model}` are substituted.
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default = "default_narrator_voice")]
    pub narrator_voice: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_base_url(),
            command: Vec::new(),
            narrator_voice: default_narrator_voice(),
            language: default_language(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_provider() -> String {
    "gradio".to_string()
}
fn default_model() -> String {
    "synthesize".to_string()
}
fn default_base_url() -> String {
    "http://127.0.0.1:7860".to_string()
}
fn default_narrator_voice() -> String {
    "narrador".to_string()
}
fn default_language() -> String {
    "es".to_string()
}
fn default_concurrency() -> usize {
    1
}

/// A voice-cloning speech model: speaks `text` in the voice of the
/// reference recording and returns WAV bytes.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    async fn synthesize(&self, text: &str, reference_audio: &Path, language: &str) -> anyhow::Result<Vec<u8>>;

    fn max_concurrency(&self) -> usize {
        1
    }
}

pub fn create_speech_engine(config: &TtsConfig) -> Result<Box<dyn SpeechEngine>, SynthesisError> {
    info!("Initializing speech engine for provider: {}", config.provider);
    match config.provider.as_str() {
        "gradio" => Ok(Box::new(GradioEngine::new(config)?)),
        "command" => Ok(Box::new(CommandEngine::new(config)?)),
        other => Err(SynthesisError::EngineLoad(format!(
            "Unknown TTS provider: {}",
            other
        ))),
    }
}
