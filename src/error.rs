use std::path::PathBuf;
use thiserror::Error;

pub type MemeResult<T> = Result<T, MemeError>;

#[derive(Error, Debug)]
pub enum MemeError {
    #[error("Not found: {what} ({path})")]
    NotFound { what: String, path: PathBuf },

    #[error("Malformed storyboard: {0}")]
    MalformedStoryboard(String),

    #[error("Seed render failed: {0}")]
    Render(String),

    /// `scene` is numbered from 1.
    #[error("Video generation for scene {scene} did not finish within {waited_secs}s")]
    GenerationTimeout { scene: usize, waited_secs: u64 },

    #[error("{service} error{}: {message}", status_suffix(.status))]
    Provider {
        service: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("Frame extraction failed: {0}")]
    FrameExtraction(String),

    #[error("Clip assembly failed: {0}")]
    Assembly(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Generation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl MemeError {
    pub fn not_found(what: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            what: what.into(),
            path: path.into(),
        }
    }

    pub fn provider(
        service: &'static str,
        status: Option<u16>,
        message: impl Into<String>,
    ) -> Self {
        Self::Provider {
            service,
            status,
            message: message.into(),
        }
    }

    /// Maps a transport-level failure. Connection and timeout errors carry no status.
    pub fn transport(service: &'static str, err: reqwest::Error) -> Self {
        Self::Provider {
            service,
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }

    /// Transient failures worth another attempt: no response at all, 429, or 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { status: None, .. } => true,
            Self::Provider {
                status: Some(code), ..
            } => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}
