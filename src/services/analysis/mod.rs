pub mod characters;
pub mod dialogue;
pub mod llm;
pub mod rules;

use crate::core::error::AnalysisError;
use crate::core::state::Story;
use crate::services::llm::{create_llm, LlmConfig};
use async_trait::async_trait;
use log::info;
use serde::{Deserialize, Serialize};

pub use characters::CharacterExtractor;
pub use dialogue::{Attribution, AttributionRule, DialogueSegmenter, SpeakerAttributor};
pub use llm::LlmAnalyzer;
pub use rules::RuleBasedAnalyzer;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AnalysisConfig {
    /// "rules" for the built-in analyzer, "llm" to ask the configured LLM for names.
    #[serde(default = "default_ner_model", alias = "spacy_model")]
    pub ner_model: String,
    #[serde(default = "default_speech_verbs")]
    pub speech_verbs: Vec<String>,
    /// Drops the narration after a quote when it is nothing but the speech tag
    /// that named the speaker.
    #[serde(default)]
    pub drop_speech_tags: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            ner_model: default_ner_model(),
            speech_verbs: default_speech_verbs(),
            drop_speech_tags: false,
        }
    }
}

fn default_ner_model() -> String {
    "rules".to_string()
}

pub fn default_speech_verbs() -> Vec<String> {
    ["dijo", "preguntó", "respondió", "gritó", "susurró", "exclamó"]
        .iter()
        .map(|v| v.to_string())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Word,
    /// A run of capitalized words merged into one token.
    ProperNoun,
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    Subject,
    Other,
}

/// One token of a shallow dependency parse.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub lemma: String,
    pub kind: TokenKind,
    pub dep: Dependency,
    pub head: Option<usize>,
}

/// Tokens whose head is `index`.
pub fn children(tokens: &[Token], index: usize) -> impl Iterator<Item = &Token> {
    tokens.iter().filter(move |t| t.head == Some(index))
}

/// Named-entity recognition plus a dependency parse good enough to find the
/// subject of a speech verb.
#[async_trait]
pub trait LanguageAnalyzer: Send + Sync {
    /// PERSON entity surfaces in order of first appearance.
    async fn person_entities(&self, text: &str) -> Result<Vec<String>, AnalysisError>;

    fn parse(&self, text: &str) -> Vec<Token>;
}

pub fn create_analyzer(
    config: &AnalysisConfig,
    llm_config: &LlmConfig,
) -> Result<Box<dyn LanguageAnalyzer>, AnalysisError> {
    match config.ner_model.as_str() {
        "rules" => Ok(Box::new(RuleBasedAnalyzer::new(&config.speech_verbs))),
        "llm" => {
            let llm = create_llm(llm_config, None)
                .map_err(|e| AnalysisError::ModelUnavailable(format!("llm: {:#}", e)))?;
            Ok(Box::new(LlmAnalyzer::new(
                llm,
                RuleBasedAnalyzer::new(&config.speech_verbs),
            )))
        }
        other => Err(AnalysisError::ModelUnavailable(other.to_string())),
    }
}

/// Character extraction followed by dialogue segmentation, over the
/// translated text of a story.
pub struct DialogueAnalyzer {
    analyzer: Box<dyn LanguageAnalyzer>,
    config: AnalysisConfig,
}

impl DialogueAnalyzer {
    pub fn new(analyzer: Box<dyn LanguageAnalyzer>, config: AnalysisConfig) -> Self {
        Self { analyzer, config }
    }

    pub fn from_config(config: &AnalysisConfig, llm_config: &LlmConfig) -> Result<Self, AnalysisError> {
        Ok(Self::new(create_analyzer(config, llm_config)?, config.clone()))
    }

    pub async fn extract_characters(&self, story: &mut Story) -> Result<(), AnalysisError> {
        let extractor = CharacterExtractor::new(self.analyzer.as_ref());
        story.characters = extractor.extract(&story.translated_text).await?;
        info!("Found {} characters", story.characters.len());
        Ok(())
    }

    pub fn build_script(&self, story: &mut Story) {
        let attributor = SpeakerAttributor::new(self.analyzer.as_ref(), &self.config.speech_verbs);
        let segmenter = DialogueSegmenter::new(attributor, self.config.drop_speech_tags);
        story.script = segmenter.segment(&story.translated_text, &story.characters);
        info!("Script has {} segments", story.script.len());
    }

    pub async fn analyze_story(&self, story: &mut Story) -> Result<(), AnalysisError> {
        self.extract_characters(story).await?;
        self.build_script(story);
        Ok(())
    }
}
