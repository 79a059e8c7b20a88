use super::{SpeechEngine, TtsConfig, VoiceBank};
use crate::core::error::SynthesisError;
use crate::core::io::Storage;
use crate::core::state::{Character, Story, NARRATOR_ID};
use crate::utils::text::preview;
use futures_util::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

const NARRATOR_NAME: &str = "Narrador";

/// Turns a story script into one audio file per segment.
pub struct SpeechSynthesizer {
    engine: Box<dyn SpeechEngine>,
    bank: VoiceBank,
    narrator: Character,
    language: String,
}

struct Job {
    index: usize,
    text: String,
    speaker: String,
    reference: PathBuf,
    output: String,
}

impl SpeechSynthesizer {
    pub fn new(engine: Box<dyn SpeechEngine>, bank: VoiceBank, config: &TtsConfig) -> Self {
        Self {
            engine,
            bank,
            narrator: Character {
                id: NARRATOR_ID.to_string(),
                name: NARRATOR_NAME.to_string(),
                voice_archetype: config.narrator_voice.clone(),
            },
            language: config.language.clone(),
        }
    }

    pub fn voice_bank(&self) -> &VoiceBank {
        &self.bank
    }

    pub fn set_voice_bank(&mut self, bank: VoiceBank) {
        self.bank = bank;
    }

    /// Reference audio for a speaker. Unknown speakers and missing archetypes
    /// fall back to the narrator's voice.
    fn reference_for<'a>(
        &'a self,
        character_id: &str,
        characters: &'a HashMap<&str, &Character>,
    ) -> Result<(&'a Character, &'a Path), SynthesisError> {
        let character = match characters.get(character_id) {
            Some(c) => *c,
            None => {
                warn!("Character '{}' not found, using the narrator voice", character_id);
                &self.narrator
            }
        };

        if let Some(path) = self.bank.get(&character.voice_archetype) {
            return Ok((character, path));
        }
        if character.id != NARRATOR_ID {
            error!(
                "Voice archetype '{}' not in the voice bank, using the narrator voice",
                character.voice_archetype
            );
        }
        self.bank
            .get(&self.narrator.voice_archetype)
            .map(|path| (character, path))
            .ok_or_else(|| SynthesisError::NoNarratorVoice {
                archetype: character.voice_archetype.clone(),
                narrator: self.narrator.voice_archetype.clone(),
            })
    }

    pub async fn synthesize_story(
        &self,
        story: &mut Story,
        storage: &dyn Storage,
        out_dir: &str,
    ) -> Result<(), SynthesisError> {
        info!("Synthesizing {} segments for '{}'", story.script.len(), story.title);

        let mut characters: HashMap<&str, &Character> =
            story.characters.iter().map(|c| (c.id.as_str(), c)).collect();
        characters.insert(NARRATOR_ID, &self.narrator);

        let mut jobs = Vec::with_capacity(story.script.len());
        for (index, dialogue) in story.script.iter().enumerate() {
            let (character, reference) = self.reference_for(&dialogue.character_id, &characters)?;
            jobs.push(Job {
                index,
                text: dialogue.text.clone(),
                speaker: character.name.clone(),
                reference: reference.to_path_buf(),
                output: Path::new(out_dir)
                    .join(format!("segment_{:04}.wav", index))
                    .to_string_lossy()
                    .to_string(),
            });
        }

        let pb = ProgressBar::new(jobs.len() as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
        {
            pb.set_style(style.progress_chars("#>-"));
        }

        let concurrency = self.engine.max_concurrency().max(1);
        let results: Vec<(usize, Option<String>)> = futures_util::stream::iter(jobs)
            .map(|job| {
                let pb = pb.clone();
                async move {
                    debug!("[{}] {}", job.speaker, preview(&job.text, 30));
                    let audio = match self
                        .engine
                        .synthesize(&job.text, &job.reference, &self.language)
                        .await
                    {
                        Ok(bytes) => match storage.write(&job.output, &bytes).await {
                            Ok(()) => Some(job.output),
                            Err(e) => {
                                error!("Failed to write segment {}: {:#}", job.index, e);
                                None
                            }
                        },
                        Err(e) => {
                            error!("Failed to synthesize segment {}: {:#}", job.index, e);
                            None
                        }
                    };
                    pb.inc(1);
                    (job.index, audio)
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;
        pb.finish_with_message("Synthesis complete");

        for (index, audio) in results {
            if let Some(dialogue) = story.script.get_mut(index) {
                dialogue.audio_path = audio;
            }
        }

        let failed = story.script.iter().filter(|d| d.audio_path.is_none()).count();
        if failed > 0 {
            warn!("{} of {} segments have no audio", failed, story.script.len());
        }
        info!("Speech synthesis finished");
        Ok(())
    }
}
