use super::LanguageAnalyzer;
use crate::core::error::AnalysisError;
use crate::core::state::{character_id, Character};
use log::{debug, warn};

pub struct CharacterExtractor<'a> {
    analyzer: &'a dyn LanguageAnalyzer,
}

impl<'a> CharacterExtractor<'a> {
    pub fn new(analyzer: &'a dyn LanguageAnalyzer) -> Self {
        Self { analyzer }
    }

    pub async fn extract(&self, text: &str) -> Result<Vec<Character>, AnalysisError> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let names = self.analyzer.person_entities(text).await?;
        Ok(build_registry(names))
    }
}

/// One character per distinct id, in order of first appearance. A name that
/// normalizes to an id already taken replaces the earlier name.
pub fn build_registry<I>(names: I) -> Vec<Character>
where
    I: IntoIterator<Item = String>,
{
    let mut registry: Vec<Character> = Vec::new();
    for raw in names {
        let name = raw.trim();
        if name.is_empty() {
            debug!("Skipping empty entity");
            continue;
        }
        let id = character_id(name);
        match registry.iter_mut().find(|c| c.id == id) {
            Some(existing) if existing.name == name => {}
            Some(existing) => {
                warn!(
                    "Names '{}' and '{}' share the id '{}', keeping '{}'",
                    existing.name, name, id, name
                );
                existing.name = name.to_string();
            }
            None => registry.push(Character::new(name)),
        }
    }
    registry
}
