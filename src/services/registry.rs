use crate::core::io::{read_json, write_json, Storage};
use crate::core::state::{Character, DEFAULT_ARCHETYPE};
use anyhow::Result;
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct VoiceProfile {
    #[serde(default)]
    pub model: String,
    /// Voice archetype, a stem in the voice bank.
    #[serde(default)]
    pub preset: String,
}

/// Persistent record of a character across stories.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct CharacterProfile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub voice_profile: VoiceProfile,
    #[serde(default)]
    pub image_embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub permanent_changes: Vec<String>,
    #[serde(default)]
    pub temporary_overrides: Vec<serde_json::Value>,
}

impl CharacterProfile {
    pub fn from_character(character: &Character) -> Self {
        Self {
            id: character.id.clone(),
            name: character.name.clone(),
            voice_profile: VoiceProfile {
                model: String::new(),
                preset: character.voice_archetype.clone(),
            },
            ..Default::default()
        }
    }
}

/// Characters keyed by id, stored as one JSON object.
#[derive(Debug, Default)]
pub struct CharacterRegistry {
    path: String,
    profiles: BTreeMap<String, CharacterProfile>,
}

impl CharacterRegistry {
    /// Loads the registry, starting empty when the file is missing or unreadable.
    pub async fn load(storage: &dyn Storage, path: &str) -> Self {
        let profiles = match storage.exists(path).await {
            Ok(true) => match read_json::<BTreeMap<String, CharacterProfile>>(storage, path).await {
                Ok(profiles) => {
                    info!("Loaded {} character profiles from {}", profiles.len(), path);
                    profiles
                }
                Err(e) => {
                    error!("Error loading character registry from {}: {:#}", path, e);
                    BTreeMap::new()
                }
            },
            Ok(false) => BTreeMap::new(),
            Err(e) => {
                error!("Cannot access character registry {}: {:#}", path, e);
                BTreeMap::new()
            }
        };
        Self {
            path: path.to_string(),
            profiles,
        }
    }

    pub async fn save(&self, storage: &dyn Storage) -> Result<()> {
        write_json(storage, &self.path, &self.profiles).await
    }

    pub fn get(&self, id: &str) -> Option<&CharacterProfile> {
        self.profiles.get(id)
    }

    pub fn upsert(&mut self, profile: CharacterProfile) {
        if profile.id.is_empty() {
            error!("Character profile for '{}' has no id, not stored", profile.name);
            return;
        }
        self.profiles.insert(profile.id.clone(), profile);
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn profiles(&self) -> impl Iterator<Item = &CharacterProfile> {
        self.profiles.values()
    }

    /// Gives characters still on the default archetype the preset remembered
    /// for them.
    pub fn apply_presets(&self, characters: &mut [Character]) {
        for character in characters.iter_mut() {
            if character.voice_archetype != DEFAULT_ARCHETYPE {
                continue;
            }
            if let Some(profile) = self.get(&character.id) {
                if !profile.voice_profile.preset.is_empty() {
                    character.voice_archetype = profile.voice_profile.preset.clone();
                }
            }
        }
    }

    /// Records the characters of a story, keeping what is already known
    /// about them.
    pub fn remember(&mut self, characters: &[Character]) {
        for character in characters {
            let profile = match self.get(&character.id) {
                Some(existing) => {
                    let mut profile = existing.clone();
                    profile.name = character.name.clone();
                    profile.voice_profile.preset = character.voice_archetype.clone();
                    profile
                }
                None => CharacterProfile::from_character(character),
            };
            self.upsert(profile);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;

    #[tokio::test]
    async fn test_missing_registry_is_empty() {
        let storage = NativeStorage::new();
        let registry = CharacterRegistry::load(&storage, "/no/such/characters.json").await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_registry_degrades_to_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("characters.json");
        std::fs::write(&path, "{ not json")?;
        let registry = CharacterRegistry::load(&NativeStorage::new(), path.to_str().unwrap()).await;
        assert!(registry.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_round_trip_keeps_profiles() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("db").join("characters.json");
        let path = path.to_str().unwrap();
        let storage = NativeStorage::new();

        let mut registry = CharacterRegistry::load(&storage, path).await;
        let mut eva = Character::new("Eva");
        eva.voice_archetype = "mujer_grave".to_string();
        registry.remember(&[eva]);
        registry.save(&storage).await?;

        let loaded = CharacterRegistry::load(&storage, path).await;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("eva").unwrap().voice_profile.preset, "mujer_grave");
        Ok(())
    }

    #[test]
    fn test_apply_presets_only_touches_defaults() {
        let mut registry = CharacterRegistry::default();
        registry.upsert(CharacterProfile {
            id: "kiran".to_string(),
            name: "Kiran".to_string(),
            voice_profile: VoiceProfile {
                model: String::new(),
                preset: "hombre_joven".to_string(),
            },
            ..Default::default()
        });

        let mut characters = vec![Character::new("Kiran"), Character::new("Mara")];
        characters[1].voice_archetype = "custom".to_string();
        registry.apply_presets(&mut characters);

        assert_eq!(characters[0].voice_archetype, "hombre_joven");
        assert_eq!(characters[1].voice_archetype, "custom");
    }

    #[test]
    fn test_remember_keeps_description() {
        let mut registry = CharacterRegistry::default();
        registry.upsert(CharacterProfile {
            id: "eva".to_string(),
            name: "Eva".to_string(),
            description: "Captain of the Ruiz".to_string(),
            ..Default::default()
        });
        registry.remember(&[Character::new("Eva")]);
        let eva = registry.get("eva").unwrap();
        assert_eq!(eva.description, "Captain of the Ruiz");
        assert_eq!(eva.voice_profile.preset, DEFAULT_ARCHETYPE);
    }

    #[test]
    fn test_profile_without_id_is_rejected() {
        let mut registry = CharacterRegistry::default();
        registry.upsert(CharacterProfile::default());
        assert!(registry.is_empty());
    }
}
