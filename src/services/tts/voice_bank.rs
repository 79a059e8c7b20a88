use crate::core::io::Storage;
use log::{info, warn};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Reference recordings keyed by voice archetype (the file stem).
#[derive(Debug, Clone, Default)]
pub struct VoiceBank {
    voices: BTreeMap<String, PathBuf>,
}

impl VoiceBank {
    pub async fn load(storage: &dyn Storage, dir: &str) -> Self {
        let mut voices = BTreeMap::new();
        if !Path::new(dir).is_dir() {
            warn!("Voice bank directory does not exist: {}", dir);
            return Self { voices };
        }

        match storage.list(dir).await {
            Ok(entries) => {
                for entry in entries {
                    let path = PathBuf::from(&entry);
                    let is_wav = path
                        .extension()
                        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
                    if let (true, Some(stem)) = (is_wav, path.file_stem()) {
                        voices.insert(stem.to_string_lossy().to_string(), path);
                    }
                }
            }
            Err(e) => warn!("Failed to list voice bank {}: {:#}", dir, e),
        }

        info!(
            "Loaded voices: {:?}",
            voices.keys().collect::<Vec<_>>()
        );
        Self { voices }
    }

    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, PathBuf)>,
    {
        Self {
            voices: entries.into_iter().collect(),
        }
    }

    pub fn get(&self, archetype: &str) -> Option<&Path> {
        self.voices.get(archetype).map(PathBuf::as_path)
    }

    pub fn contains(&self, archetype: &str) -> bool {
        self.voices.contains_key(archetype)
    }

    pub fn archetypes(&self) -> Vec<String> {
        self.voices.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;

    #[tokio::test]
    async fn test_load_keeps_wav_stems_only() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        std::fs::write(dir.path().join("narrador.wav"), b"RIFF")?;
        std::fs::write(dir.path().join("mujer_grave.WAV"), b"RIFF")?;
        std::fs::write(dir.path().join("notes.txt"), b"x")?;

        let bank = VoiceBank::load(&NativeStorage::new(), dir.path().to_str().unwrap()).await;
        assert_eq!(bank.archetypes(), vec!["mujer_grave", "narrador"]);
        assert!(bank.get("narrador").unwrap().ends_with("narrador.wav"));
        assert!(!bank.contains("notes"));
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_directory_is_empty_bank() {
        let bank = VoiceBank::load(&NativeStorage::new(), "/no/such/voice_bank").await;
        assert!(bank.is_empty());
    }
}
