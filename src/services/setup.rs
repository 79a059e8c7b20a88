use crate::core::config::Config;
use crate::core::state::Character;
use crate::services::tts::VoiceBank;
use anyhow::Result;
use inquire::Select;
use log::{info, warn};

/// Picks one voice archetype out of the voice bank.
pub trait VoiceSelector: Send + Sync {
    fn select(&self, prompt: &str, options: Vec<String>) -> Result<String>;
}

/// Terminal menu.
pub struct PromptSelector;

impl VoiceSelector for PromptSelector {
    fn select(&self, prompt: &str, options: Vec<String>) -> Result<String> {
        Ok(Select::new(prompt, options).prompt()?)
    }
}

/// Makes sure the narrator voice exists in the bank, asking for one when it
/// does not. Returns true when the config changed and should be saved.
pub fn run_setup(config: &mut Config, bank: &VoiceBank, selector: Option<&dyn VoiceSelector>) -> Result<bool> {
    if bank.is_empty() {
        warn!("Voice bank {} is empty, skipping voice setup", config.paths.voice_bank);
        return Ok(false);
    }
    if bank.contains(&config.tts.narrator_voice) {
        return Ok(false);
    }

    match selector {
        Some(selector) => {
            let prompt = format!(
                "Narrator voice '{}' is not in the voice bank. Select Narrator Voice:",
                config.tts.narrator_voice
            );
            config.tts.narrator_voice = selector.select(&prompt, bank.archetypes())?;
            info!("Narrator voice set to '{}'", config.tts.narrator_voice);
            Ok(true)
        }
        None => {
            warn!(
                "Narrator voice '{}' is not in the voice bank",
                config.tts.narrator_voice
            );
            Ok(false)
        }
    }
}

/// Asks for a voice for every character whose archetype is missing from the
/// bank. Without a selector the characters keep their archetype and fall
/// back to the narrator voice at synthesis time.
pub fn assign_voices(
    characters: &mut [Character],
    bank: &VoiceBank,
    selector: Option<&dyn VoiceSelector>,
) -> Result<usize> {
    let Some(selector) = selector else {
        return Ok(0);
    };
    if bank.is_empty() {
        return Ok(0);
    }

    let mut assigned = 0;
    for character in characters.iter_mut() {
        if bank.contains(&character.voice_archetype) {
            continue;
        }
        let prompt = format!("Select voice for {}:", character.name);
        character.voice_archetype = selector.select(&prompt, bank.archetypes())?;
        assigned += 1;
    }
    Ok(assigned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Always answers with the last option and remembers the prompts.
    #[derive(Default)]
    struct LastOption {
        prompts: Mutex<Vec<String>>,
    }

    impl VoiceSelector for LastOption {
        fn select(&self, prompt: &str, options: Vec<String>) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(options.last().cloned().unwrap_or_default())
        }
    }

    fn bank() -> VoiceBank {
        VoiceBank::from_entries(
            ["hombre", "mujer"]
                .iter()
                .map(|a| (a.to_string(), PathBuf::from(format!("{}.wav", a)))),
        )
    }

    #[test]
    fn test_only_unknown_archetypes_are_prompted() -> Result<()> {
        let mut characters = vec![Character::new("Eva"), Character::new("Kiran")];
        characters[1].voice_archetype = "hombre".to_string();
        let selector = LastOption::default();

        let assigned = assign_voices(&mut characters, &bank(), Some(&selector))?;

        assert_eq!(assigned, 1);
        assert_eq!(characters[0].voice_archetype, "mujer");
        assert_eq!(characters[1].voice_archetype, "hombre");
        assert_eq!(*selector.prompts.lock().unwrap(), vec!["Select voice for Eva:"]);
        Ok(())
    }

    #[test]
    fn test_unattended_leaves_characters_alone() -> Result<()> {
        let mut characters = vec![Character::new("Eva")];
        assert_eq!(assign_voices(&mut characters, &bank(), None)?, 0);
        assert_eq!(characters[0].voice_archetype, "default");
        Ok(())
    }

    #[test]
    fn test_setup_replaces_missing_narrator_voice() -> Result<()> {
        let mut config = Config::from_yaml("llm:\n  provider: ollama\n")?;
        let selector = LastOption::default();
        assert!(run_setup(&mut config, &bank(), Some(&selector))?);
        assert_eq!(config.tts.narrator_voice, "mujer");

        // Now present: nothing to ask.
        assert!(!run_setup(&mut config, &bank(), Some(&selector))?);
        assert_eq!(selector.prompts.lock().unwrap().len(), 1);
        Ok(())
    }
}
