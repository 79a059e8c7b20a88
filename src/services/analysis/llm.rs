use super::{LanguageAnalyzer, RuleBasedAnalyzer, Token};
use crate::core::error::AnalysisError;
use crate::services::llm::{strip_code_blocks, LlmClient};
use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;

const SYSTEM_PROMPT: &str = "You are a literary assistant that lists the characters of a story. Reply with valid JSON only.";

#[derive(Deserialize)]
struct CharacterList {
    characters: Vec<String>,
}

/// Asks the LLM for person names; parsing stays rule based.
pub struct LlmAnalyzer {
    llm: Box<dyn LlmClient>,
    rules: RuleBasedAnalyzer,
}

impl LlmAnalyzer {
    pub fn new(llm: Box<dyn LlmClient>, rules: RuleBasedAnalyzer) -> Self {
        Self { llm, rules }
    }

    fn prompt(text: &str) -> String {
        format!(
            "List every person or named character who appears in the text below.\n\
             Use the exact spelling from the text. Do not include places, ships or species.\n\
             Return JSON: {{\"characters\": [\"Name\", ...]}}\n\n\
             Text:\n{}",
            text
        )
    }
}

#[async_trait]
impl LanguageAnalyzer for LlmAnalyzer {
    async fn person_entities(&self, text: &str) -> Result<Vec<String>, AnalysisError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .llm
            .chat(SYSTEM_PROMPT, &Self::prompt(text))
            .await
            .map_err(|e| AnalysisError::Failed(format!("{:#}", e)))?;
        let clean_json = strip_code_blocks(&response);
        debug!("Character list response: {}", clean_json);
        let list: CharacterList = serde_json::from_str(&clean_json)
            .map_err(|e| AnalysisError::Failed(format!("invalid character JSON: {}", e)))?;

        // Keep names that really occur in the text, ordered by first occurrence.
        let mut located: Vec<(usize, String)> = Vec::new();
        for name in list.characters {
            let name = name.trim().to_string();
            match text.find(&name) {
                Some(pos) if !name.is_empty() => {
                    if !located.iter().any(|(_, n)| *n == name) {
                        located.push((pos, name));
                    }
                }
                _ => warn!("Ignoring character '{}' not found in the text", name),
            }
        }
        located.sort_by_key(|(pos, _)| *pos);
        Ok(located.into_iter().map(|(_, name)| name).collect())
    }

    fn parse(&self, text: &str) -> Vec<Token> {
        self.rules.parse(text)
    }
}
