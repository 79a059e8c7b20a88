use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceFetchError {
    #[error("not a supported forum post URL: {0}")]
    InvalidUrl(String),
    #[error("could not build the HTTP client (check source.user_agent): {0}")]
    Client(#[source] reqwest::Error),
    #[error("could not reach {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("could not read input file {path}: {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum SourceParseError {
    #[error("post content container not found, the page layout may have changed")]
    MissingContent,
    #[error("post content is empty")]
    EmptyContent,
}

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translation model could not be loaded: {0}")]
    ModelLoad(String),
    #[error("translation batch failed: {0}")]
    Batch(String),
    #[error("translation returned {got} paragraphs for a batch of {expected}")]
    BatchLength { expected: usize, got: usize },
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("NER model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("dialogue analysis failed: {0}")]
    Failed(String),
}

#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("speech engine could not be loaded: {0}")]
    EngineLoad(String),
    #[error("no reference audio for voice '{archetype}' nor for the narrator voice '{narrator}'")]
    NoNarratorVoice { archetype: String, narrator: String },
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("no segment has usable audio, nothing to assemble")]
    NoSegments,
    #[error("could not export {path}: {reason}")]
    Export { path: String, reason: String },
    #[error("{tool} failed: {reason}")]
    Tool { tool: String, reason: String },
}

/// Common base for every pipeline failure.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    SourceFetch(#[from] SourceFetchError),
    #[error(transparent)]
    SourceParse(#[from] SourceParseError),
    #[error(transparent)]
    Translation(#[from] TranslationError),
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("artifact I/O failed: {0}")]
    Io(String),
}

impl AppError {
    pub fn stage(&self) -> &'static str {
        match self {
            AppError::SourceFetch(_) => "Fetch",
            AppError::SourceParse(_) => "Parse",
            AppError::Translation(_) => "Translation",
            AppError::Analysis(_) => "Dialogue analysis",
            AppError::Synthesis(_) => "Speech synthesis",
            AppError::Assembly(_) => "Media assembly",
            AppError::Config(_) => "Configuration",
            AppError::Io(_) => "Artifact storage",
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Io(format!("{:#}", e))
    }
}

pub type AppResult<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        let err: AppError = AssemblyError::NoSegments.into();
        assert_eq!(err.stage(), "Media assembly");

        let err: AppError = TranslationError::BatchLength { expected: 3, got: 2 }.into();
        assert_eq!(err.stage(), "Translation");
        assert_eq!(
            err.to_string(),
            "translation returned 2 paragraphs for a batch of 3"
        );
    }
}
