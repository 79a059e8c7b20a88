use super::{SpeechEngine, TtsConfig};
use crate::core::error::SynthesisError;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, warn};
use reqwest::{multipart, Client};
use serde_json::{json, Value};
use std::path::Path;
use tokio::time::{sleep, Duration};

const MAX_RETRIES: usize = 3;

/// Voice cloning through a Gradio app exposing `/gradio_api/call/{model}`
/// with inputs `[reference audio, text, language]`.
pub struct GradioEngine {
    client: Client,
    base_url: String,
    api_name: String,
    concurrency: usize,
}

impl GradioEngine {
    pub fn new(config: &TtsConfig) -> Result<Self, SynthesisError> {
        if config.base_url.trim().is_empty() {
            return Err(SynthesisError::EngineLoad("tts.base_url is empty".to_string()));
        }
        Ok(Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_name: config.model.clone(),
            concurrency: config.concurrency.max(1),
        })
    }

    async fn upload(&self, reference_audio: &Path) -> Result<String> {
        let data = tokio::fs::read(reference_audio)
            .await
            .with_context(|| format!("Failed to read reference audio {}", reference_audio.display()))?;
        let file_name = reference_audio
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "reference.wav".to_string());
        debug!("Uploading reference audio {} ({} bytes)", file_name, data.len());

        let part = multipart::Part::bytes(data)
            .file_name(file_name)
            .mime_str("audio/wav")
            .context("Invalid mime type")?;
        let form = multipart::Form::new().part("files", part);

        let uploaded = self
            .client
            .post(format!("{}/gradio_api/upload", self.base_url))
            .multipart(form)
            .send()
            .await
            .context("Failed to send upload request")?
            .json::<Vec<String>>()
            .await
            .context("Failed to parse upload response")?;

        uploaded
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Upload failed: empty response"))
    }

    async fn generate(&self, server_path: &str, text: &str, language: &str) -> Result<Vec<u8>> {
        let call_url = format!("{}/gradio_api/call/{}", self.base_url, self.api_name);
        let payload = json!({
            "data": [
                { "path": server_path, "meta": { "_type": "gradio.FileData" } },
                text,
                language
            ]
        });

        let resp = self
            .client
            .post(&call_url)
            .json(&payload)
            .send()
            .await
            .context("Failed to send generation request")?
            .json::<Value>()
            .await
            .context("Failed to parse generation response")?;
        let event_id = resp["event_id"]
            .as_str()
            .ok_or_else(|| anyhow!("No event_id in response"))?;
        debug!("Generation event {}", event_id);

        let mut stream = self
            .client
            .get(format!("{}/{}", call_url, event_id))
            .send()
            .await
            .context("Failed to connect to event stream")?
            .bytes_stream();

        let mut output_path: Option<String> = None;
        while let Some(item) = stream.next().await {
            let chunk = item.context("Stream error")?;
            let chunk_text = String::from_utf8_lossy(&chunk);
            output_path = chunk_text.lines().find_map(output_file_path);
            if output_path.is_some() {
                break;
            }
        }
        let output_path = output_path.ok_or_else(|| anyhow!("No output file in event stream"))?;

        let bytes = self
            .client
            .get(format!("{}/gradio_api/file={}", self.base_url, output_path))
            .send()
            .await
            .context("Failed to download result")?
            .error_for_status()
            .context("Result download rejected")?
            .bytes()
            .await
            .context("Failed to read result bytes")?;
        debug!("Downloaded {} bytes of audio", bytes.len());
        Ok(bytes.to_vec())
    }
}

/// Output file path from one `data: [...]` line of the event stream.
fn output_file_path(line: &str) -> Option<String> {
    let json_str = line.strip_prefix("data: ")?;
    if json_str.is_empty() || json_str == "null" {
        return None;
    }
    let data: Value = serde_json::from_str(json_str).ok()?;
    data.as_array()?
        .first()?
        .get("path")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl SpeechEngine for GradioEngine {
    async fn synthesize(&self, text: &str, reference_audio: &Path, language: &str) -> Result<Vec<u8>> {
        let server_path = self.upload(reference_audio).await?;

        let mut last_error = anyhow!("Unknown error");
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                warn!("Synthesis failed (attempt {}/{}), retrying...", attempt + 1, MAX_RETRIES);
                sleep(Duration::from_secs(2)).await;
            }
            match self.generate(&server_path, text, language).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) => {
                    warn!("Synthesis error: {:#}", e);
                    last_error = e;
                }
            }
        }
        Err(last_error.context("Synthesis still failing after retries"))
    }

    fn max_concurrency(&self) -> usize {
        self.concurrency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_file_path_from_event_line() {
        let line = r#"data: [{"path": "/tmp/gradio/abc/audio.wav", "url": null}]"#;
        assert_eq!(output_file_path(line).as_deref(), Some("/tmp/gradio/abc/audio.wav"));
        assert_eq!(output_file_path("event: heartbeat"), None);
        assert_eq!(output_file_path("data: null"), None);
        assert_eq!(output_file_path("data: [\"not a file\"]"), None);
    }

    #[test]
    fn test_base_url_is_normalized() {
        let config = TtsConfig {
            base_url: "http://localhost:7860/".to_string(),
            ..Default::default()
        };
        let engine = GradioEngine::new(&config).unwrap();
        assert_eq!(engine.base_url, "http://localhost:7860");
        assert_eq!(engine.max_concurrency(), 1);
    }
}
