use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Where stage artifacts and the character registry are kept.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, path: &str) -> Result<Vec<u8>>;
    /// Replaces `path` as a whole; readers never see a half-written file.
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;
    async fn exists(&self, path: &str) -> Result<bool>;
    /// Entries directly under `dir`, sorted. A missing directory is empty.
    async fn list(&self, dir: &str) -> Result<Vec<String>>;
}

/// Local filesystem storage.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeStorage;

impl NativeStorage {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Storage for NativeStorage {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let target = Path::new(path);
        if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut staging = target.as_os_str().to_owned();
        staging.push(".part");
        tokio::fs::write(&staging, content).await?;
        tokio::fs::rename(&staging, target).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(path).await?)
    }

    async fn list(&self, dir: &str) -> Result<Vec<String>> {
        let mut entries = Vec::new();
        let mut reader = match tokio::fs::read_dir(dir).await {
            Ok(reader) => reader,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(entries),
            Err(e) => return Err(e).with_context(|| format!("Failed to list {}", dir)),
        };
        while let Some(entry) = reader.next_entry().await? {
            entries.push(entry.path().to_string_lossy().to_string());
        }
        entries.sort();
        Ok(entries)
    }
}

pub async fn read_json<T: DeserializeOwned>(storage: &dyn Storage, path: &str) -> Result<T> {
    let bytes = storage.read(path).await?;
    serde_json::from_slice(&bytes).with_context(|| format!("Failed to parse {}", path))
}

pub async fn write_json<T: Serialize + ?Sized>(
    storage: &dyn Storage,
    path: &str,
    value: &T,
) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;
    storage
        .write(path, content.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_write_creates_parent_and_lists_sorted() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = NativeStorage::new();
        let root = dir.path().join("nested");
        let b = root.join("b.wav");
        let a = root.join("a.wav");

        storage.write(b.to_str().unwrap(), b"b").await?;
        storage.write(a.to_str().unwrap(), b"a").await?;
        storage.write(a.to_str().unwrap(), b"again").await?;

        let listed = storage.list(root.to_str().unwrap()).await?;
        assert_eq!(
            listed,
            vec![a.to_string_lossy().to_string(), b.to_string_lossy().to_string()]
        );
        assert_eq!(storage.read(a.to_str().unwrap()).await?, b"again");
        Ok(())
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() -> Result<()> {
        let storage = NativeStorage::new();
        assert!(storage.list("/definitely/not/here").await?.is_empty());
        assert!(!storage.exists("/definitely/not/here").await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_json_round_trip_reports_path_on_bad_content() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = NativeStorage::new();
        let path = dir.path().join("story.json");
        let path = path.to_str().unwrap();

        write_json(&storage, path, &vec!["uno", "dos"]).await?;
        let back: Vec<String> = read_json(&storage, path).await?;
        assert_eq!(back, vec!["uno", "dos"]);

        storage.write(path, b"{not json").await?;
        let err = read_json::<Vec<String>>(&storage, path).await.unwrap_err();
        assert!(err.to_string().contains("story.json"));
        Ok(())
    }
}
