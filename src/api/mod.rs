//! Remote service seams. The pipeline talks to these traits; `gemini` and
//! `upload_post` provide the production implementations.

use crate::error::MemeResult;
use crate::image::SeedImage;
use async_trait::async_trait;
use std::path::Path;

pub mod gemini;
pub mod upload_post;

/// Opaque reference to an in-flight remote job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationHandle(pub String);

impl std::fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A generated video the provider can hand back as bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedVideo {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Done(Vec<GeneratedVideo>),
    Failed(String),
}

pub struct VideoJobRequest<'a> {
    pub prompt: &'a str,
    pub image: &'a SeedImage,
    pub aspect_ratio: &'a str,
    pub negative_prompt: &'a str,
    pub count: u32,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_text(&self, prompt: &str) -> MemeResult<String>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Returns the first inline image of the reply, if any.
    async fn generate_image(
        &self,
        prompt: &str,
        references: &[SeedImage],
    ) -> MemeResult<Option<SeedImage>>;
}

#[async_trait]
pub trait VideoGenerator: Send + Sync {
    async fn submit(&self, request: VideoJobRequest<'_>) -> MemeResult<OperationHandle>;
    async fn status(&self, handle: &OperationHandle) -> MemeResult<JobStatus>;
    async fn download(&self, video: &GeneratedVideo) -> MemeResult<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PublishReceipt {
    pub status: u16,
    pub body: serde_json::Value,
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(
        &self,
        video_path: &Path,
        title: &str,
        account: &str,
        platforms: &[String],
    ) -> MemeResult<PublishReceipt>;
}
