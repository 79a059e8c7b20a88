use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::services::analysis::AnalysisConfig;
use crate::services::llm::LlmConfig;
use crate::services::media::{AudioConfig, VideoConfig};
use crate::services::source::SourceConfig;
use crate::services::translation::TranslationConfig;
use crate::services::tts::TtsConfig;

pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub unattended: bool,

    pub llm: LlmConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub translation: TranslationConfig,

    #[serde(default)]
    pub dialogue_analysis: AnalysisConfig,

    #[serde(default)]
    pub tts: TtsConfig,

    #[serde(default)]
    pub audio: AudioConfig,

    #[serde(default)]
    pub video: VideoConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_voice_bank")]
    pub voice_bank: String,
    #[serde(default = "default_build")]
    pub build: String,
    #[serde(default = "default_output")]
    pub output: String,
    #[serde(default = "default_registry")]
    pub character_registry: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            voice_bank: default_voice_bank(),
            build: default_build(),
            output: default_output(),
            character_registry: default_registry(),
        }
    }
}

fn default_voice_bank() -> String {
    "data/voice_bank".to_string()
}
fn default_build() -> String {
    "build".to_string()
}
fn default_output() -> String {
    "output".to_string()
}
fn default_registry() -> String {
    "data/characters.json".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("{} not found. Please create one.", path.display());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml_ng::from_str(content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = serde_yaml_ng::to_string(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(())
    }

    pub fn ensure_directories(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.build)?;
        fs::create_dir_all(&self.paths.output)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_fills_defaults() {
        let yaml = r#"
llm:
  provider: ollama
  ollama:
    base_url: http://localhost:11434
    model: llama3
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.paths.voice_bank, "data/voice_bank");
        assert_eq!(config.translation.target_language, "Spanish");
        assert_eq!(config.dialogue_analysis.ner_model, "rules");
        assert_eq!(config.tts.narrator_voice, "narrador");
        assert_eq!(config.video.resolution, [1920, 1080]);
        assert!(config.translation.enabled);
        assert!(!config.unattended);
    }

    #[test]
    fn test_spacy_model_key_is_accepted() {
        let yaml = r#"
llm:
  provider: ollama
dialogue_analysis:
  spacy_model: llm
  speech_verbs: [said, asked]
translation:
  protected_terms: [Humanity, Deathworlder]
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.dialogue_analysis.ner_model, "llm");
        assert_eq!(config.dialogue_analysis.speech_verbs, vec!["said", "asked"]);
        assert_eq!(
            config.translation.protected_terms,
            vec!["Humanity", "Deathworlder"]
        );
    }

    #[test]
    fn test_save_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.yml");
        let config = Config::from_yaml("llm:\n  provider: ollama\nunattended: true\n")?;
        config.save(&path)?;
        let loaded = Config::load(&path)?;
        assert!(loaded.unattended);
        assert_eq!(loaded.llm.provider, "ollama");
        Ok(())
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let err = Config::load(Path::new("/nonexistent/config.yml")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
