use crate::retry::{PollPolicy, RetryConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "genai_api_key", default)]
    pub genai_key: String,
    #[serde(rename = "upload_post_api_key", default)]
    pub upload_post_key: String,

    #[serde(default = "default_text_model")]
    pub text_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_video_model")]
    pub video_model: String,
    #[serde(default = "default_genai_base_url")]
    pub genai_base_url: String,
    #[serde(default = "default_upload_post_base_url")]
    pub upload_post_base_url: String,

    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,
    /// Defaults to `<assets_dir>/outputs` when unset.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default = "default_negative_prompt")]
    pub negative_prompt: String,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_max_wait_secs")]
    pub poll_max_wait_secs: u64,
    #[serde(default = "default_poll_backoff")]
    pub poll_backoff: f64,
    #[serde(default = "default_poll_max_interval_secs")]
    pub poll_max_interval_secs: u64,

    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_publish_account")]
    pub publish_account: String,
    #[serde(default = "default_publish_platforms")]
    pub publish_platforms: Vec<String>,
}

fn default_text_model() -> String {
    "gemini-2.0-flash-exp".to_string()
}

fn default_image_model() -> String {
    "gemini-2.0-flash-preview-image-generation".to_string()
}

fn default_video_model() -> String {
    "veo-3.0-fast-generate-preview".to_string()
}

fn default_genai_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_upload_post_base_url() -> String {
    "https://api.upload-post.com".to_string()
}

fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}

fn default_aspect_ratio() -> String {
    "16:9".to_string()
}

fn default_negative_prompt() -> String {
    "low quality, low resolution, blurry, grainy, noise, jittery, shaky camera, black bars, letterbox, pillarbox, watermark, logo, timestamp, subtitles, compression artifacts, muted colors, vignette, chromatic aberration, over-saturated, film grain, ugly, cartoon, aliasing, unnatural proportions".to_string()
}

fn default_poll_interval_secs() -> u64 {
    20
}

fn default_poll_max_wait_secs() -> u64 {
    900
}

fn default_poll_backoff() -> f64 {
    1.0
}

fn default_poll_max_interval_secs() -> u64 {
    60
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_publish_account() -> String {
    "angeli".to_string()
}

fn default_publish_platforms() -> Vec<String> {
    vec!["instagram".to_string()]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            genai_key: String::new(),
            upload_post_key: String::new(),
            text_model: default_text_model(),
            image_model: default_image_model(),
            video_model: default_video_model(),
            genai_base_url: default_genai_base_url(),
            upload_post_base_url: default_upload_post_base_url(),
            assets_dir: default_assets_dir(),
            output_dir: None,
            aspect_ratio: default_aspect_ratio(),
            negative_prompt: default_negative_prompt(),
            poll_interval_secs: default_poll_interval_secs(),
            poll_max_wait_secs: default_poll_max_wait_secs(),
            poll_backoff: default_poll_backoff(),
            poll_max_interval_secs: default_poll_max_interval_secs(),
            retry_attempts: default_retry_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            publish_account: default_publish_account(),
            publish_platforms: default_publish_platforms(),
        }
    }
}

impl Config {
    /// Reads `path` when it exists, then lets `GENAI_API_KEY` and
    /// `UPLOAD_POST_API_KEY` (process env or `.env`) fill in the keys.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let _ = dotenvy::dotenv();

        let mut config = if fs::metadata(path).await.is_ok() {
            let content = fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?
        } else {
            Config::default()
        };

        config.apply_env();

        if config.genai_key.is_empty() {
            anyhow::bail!(
                "{}: genai_api_key missing (or set GENAI_API_KEY)",
                path.display()
            );
        }

        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(key) = std::env::var("GENAI_API_KEY") {
            if !key.is_empty() {
                self.genai_key = key;
            }
        }
        if let Ok(key) = std::env::var("UPLOAD_POST_API_KEY") {
            if !key.is_empty() {
                self.upload_post_key = key;
            }
        }
    }

    pub fn output_root(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| self.assets_dir.join("outputs"))
    }

    pub fn poll_policy(&self) -> PollPolicy {
        let interval = Duration::from_secs(self.poll_interval_secs.max(1));
        PollPolicy {
            interval,
            max_wait: Duration::from_secs(self.poll_max_wait_secs),
            backoff: self.poll_backoff.max(1.0),
            max_interval: Duration::from_secs(self.poll_max_interval_secs).max(interval),
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new("remote call")
            .with_max_retries(self.retry_attempts)
            .with_base_delay(Duration::from_millis(self.retry_base_delay_ms))
    }
}
