use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LlmConfig {
    /// "gemini", "ollama" or "openai".
    pub provider: String,
    #[serde(default = "default_retry_count")]
    pub retry_count: usize,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_seconds: u64,
    pub gemini: Option<ProviderConfig>,
    pub ollama: Option<ProviderConfig>,
    pub openai: Option<ProviderConfig>,
}

/// Connection settings shared by every provider. Fields a provider does not
/// use are ignored.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ProviderConfig {
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
}

fn default_retry_count() -> usize {
    3
}
fn default_retry_delay() -> u64 {
    10
}

/// One system prompt plus one user message in, the model's text out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, system: &str, user: &str) -> Result<String>;
}

/// Builds the configured client wrapped in retries. `model` overrides the
/// provider's model name when set and non-empty.
pub fn create_llm(config: &LlmConfig, model: Option<&str>) -> Result<Box<dyn LlmClient>> {
    let section = match config.provider.as_str() {
        "gemini" => config.gemini.as_ref(),
        "ollama" => config.ollama.as_ref(),
        "openai" => config.openai.as_ref(),
        other => bail!("Unknown LLM provider: {}", other),
    }
    .with_context(|| format!("'{}' section missing from the llm config", config.provider))?;

    let model = model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(&section.model)
        .to_string();
    let base_url = |fallback: &str| {
        section
            .base_url
            .as_deref()
            .unwrap_or(fallback)
            .trim_end_matches('/')
            .to_string()
    };

    let inner: Box<dyn LlmClient> = match config.provider.as_str() {
        "gemini" => Box::new(GeminiClient {
            http: reqwest::Client::new(),
            base_url: base_url(GEMINI_BASE_URL),
            api_key: section.api_key.clone(),
            model,
        }),
        "ollama" => Box::new(ChatClient {
            http: reqwest::Client::new(),
            dialect: ChatDialect::Ollama,
            base_url: base_url("http://localhost:11434"),
            api_key: None,
            model,
        }),
        _ => Box::new(ChatClient {
            http: reqwest::Client::new(),
            dialect: ChatDialect::OpenAi,
            base_url: base_url(OPENAI_BASE_URL),
            api_key: Some(section.api_key.clone()).filter(|k| !k.is_empty()),
            model,
        }),
    };

    Ok(Box::new(RetryingClient {
        inner,
        retry_count: config.retry_count,
        retry_delay: Duration::from_secs(config.retry_delay_seconds),
    }))
}

/// Removes a surrounding markdown fence (with or without a language tag).
pub fn strip_code_blocks(s: &str) -> String {
    let s = s.trim();
    let Some(rest) = s.strip_prefix("```") else {
        return s.to_string();
    };
    let body = match rest.split_once('\n') {
        Some((tag, body)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => body,
        _ => rest,
    };
    body.trim().trim_end_matches("```").trim().to_string()
}

async fn post_json<T: DeserializeOwned>(request: reqwest::RequestBuilder, body: &Value, provider: &str) -> Result<T> {
    let resp = request.json(body).send().await?;
    let status = resp.status();
    let text = resp.text().await?;
    if !status.is_success() {
        bail!("{} API error ({}): {}", provider, status, text);
    }
    serde_json::from_str(&text).map_err(|e| anyhow!("Unexpected {} response: {}. Body: {}", provider, e, text))
}

struct RetryingClient {
    inner: Box<dyn LlmClient>,
    retry_count: usize,
    retry_delay: Duration,
}

#[async_trait]
impl LlmClient for RetryingClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let mut failures = 0;
        loop {
            match self.inner.chat(system, user).await {
                Ok(text) => return Ok(text),
                Err(e) if failures < self.retry_count => {
                    failures += 1;
                    warn!(
                        "LLM call failed, retrying in {}s ({}/{}): {:#}",
                        self.retry_delay.as_secs(),
                        failures,
                        self.retry_count,
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e.context(format!("LLM call failed after {} attempts", failures + 1))),
            }
        }
    }
}

/// Chat-style endpoints: Ollama's native API and OpenAI-compatible servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChatDialect {
    Ollama,
    OpenAi,
}

struct ChatClient {
    http: reqwest::Client,
    dialect: ChatDialect,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OllamaReply {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct OpenAiReply {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

impl ChatClient {
    fn body(&self, system: &str, user: &str) -> Value {
        let messages = json!([
            { "role": "system", "content": system },
            { "role": "user", "content": user },
        ]);
        match self.dialect {
            ChatDialect::Ollama => json!({ "model": self.model, "messages": messages, "stream": false }),
            ChatDialect::OpenAi => json!({ "model": self.model, "messages": messages }),
        }
    }
}

#[async_trait]
impl LlmClient for ChatClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let body = self.body(system, user);
        debug!("{:?} chat request to {} ({})", self.dialect, self.base_url, self.model);
        let content = match self.dialect {
            ChatDialect::Ollama => {
                let request = self.http.post(format!("{}/api/chat", self.base_url));
                let reply: OllamaReply = post_json(request, &body, "Ollama").await?;
                reply.message.content
            }
            ChatDialect::OpenAi => {
                let mut request = self.http.post(format!("{}/chat/completions", self.base_url));
                if let Some(key) = &self.api_key {
                    request = request.bearer_auth(key);
                }
                let reply: OpenAiReply = post_json(request, &body, "OpenAI").await?;
                reply.choices.into_iter().next().and_then(|c| c.message.content)
            }
        };
        content.ok_or_else(|| anyhow!("{:?} reply has no content", self.dialect))
    }
}

struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Deserialize)]
struct GeminiReply {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    content: Option<GeminiContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

impl GeminiReply {
    fn into_text(self) -> Result<String> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            bail!("Gemini returned no candidates");
        };
        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        if text.is_empty() {
            bail!(
                "Gemini reply is empty (finish reason: {})",
                candidate.finish_reason.as_deref().unwrap_or("UNKNOWN")
            );
        }
        Ok(text)
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = json!({
            "system_instruction": { "parts": [{ "text": system }] },
            "contents": [{ "role": "user", "parts": [{ "text": user }] }],
        });
        let request = self.http.post(url);
        let reply: GeminiReply = post_json(request, &body, "Gemini").await?;
        reply.into_text()
    }
}
