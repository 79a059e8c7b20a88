use crate::core::error::{SourceFetchError, SourceParseError};
use crate::core::state::Story;
use crate::utils::text::normalize_newlines;
use log::{info, warn};
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

const UNKNOWN_TITLE: &str = "Untitled";
const UNKNOWN_AUTHOR: &str = "Unknown author";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SourceConfig {
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout() -> u64 {
    10
}
fn default_user_agent() -> String {
    "hfy-narrator/0.1 (story narration bot)".to_string()
}

/// Where a run takes its story from.
#[derive(Debug, Clone)]
pub enum StorySource {
    Url(String),
    File(String),
}

pub struct StoryFetcher {
    client: reqwest::Client,
}

impl StoryFetcher {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceFetchError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(SourceFetchError::Client)?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<Story, crate::core::error::AppError> {
        validate_post_url(url)?;

        info!("Fetching story from {}", url);
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| SourceFetchError::Network {
                url: url.to_string(),
                source,
            })?;

        if !resp.status().is_success() {
            return Err(SourceFetchError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            }
            .into());
        }

        let html = resp.text().await.map_err(|source| SourceFetchError::Network {
            url: url.to_string(),
            source,
        })?;

        Ok(parse_post(&html, url)?)
    }
}

pub fn validate_post_url(url: &str) -> Result<(), SourceFetchError> {
    let parsed = Url::parse(url).map_err(|_| SourceFetchError::InvalidUrl(url.to_string()))?;
    let host_ok = matches!(
        parsed.host_str(),
        Some("reddit.com") | Some("www.reddit.com") | Some("old.reddit.com")
    );
    if host_ok && parsed.path().contains("/comments/") {
        Ok(())
    } else {
        Err(SourceFetchError::InvalidUrl(url.to_string()))
    }
}

/// Extracts title, author and body paragraphs from a post page.
pub fn parse_post(html: &str, url: &str) -> Result<Story, SourceParseError> {
    let document = Html::parse_document(html);

    let title = select_text(&document, "h1").unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    let author = select_text(&document, "a[href*='/user/']")
        .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());

    let container = ["div[data-click-id='text']", "div[slot='text-body']"]
        .iter()
        .filter_map(|css| Selector::parse(css).ok())
        .find_map(|sel| document.select(&sel).next())
        .ok_or(SourceParseError::MissingContent)?;

    let p = Selector::parse("p").map_err(|_| SourceParseError::MissingContent)?;
    let paragraphs: Vec<String> = container
        .select(&p)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    if paragraphs.is_empty() {
        warn!("Post at {} has an empty body", url);
        return Err(SourceParseError::EmptyContent);
    }

    info!("Parsed story '{}' by {} ({} paragraphs)", title, author, paragraphs.len());
    Ok(Story::new(url, &title, &author, &paragraphs.join("\n\n")))
}

fn select_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

pub async fn read_text_file(path: &str) -> Result<Story, SourceFetchError> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| SourceFetchError::File {
            path: path.to_string(),
            source,
        })?;
    let title = Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| UNKNOWN_TITLE.to_string());
    info!("Read story '{}' from {}", title, path);
    let text = normalize_newlines(&text);
    Ok(Story::new(path, &title, UNKNOWN_AUTHOR, text.trim()))
}
