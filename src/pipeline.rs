//! Scene chaining: each scene's video job is seeded with the last frame of the
//! previous scene's clip, so the concatenated result plays as one take.
//!
//! Scenes run strictly in order. Per scene the chain moves through
//! SUBMIT -> POLLING -> DOWNLOAD -> EXTRACT, and any failure aborts the whole
//! run: skipping a scene would seed every later scene from a stale frame.

use crate::api::{GeneratedVideo, JobStatus, OperationHandle, VideoGenerator, VideoJobRequest};
use crate::config::Config;
use crate::error::{MemeError, MemeResult};
use crate::image::SeedImage;
use crate::media::MediaToolkit;
use crate::retry::{PollPolicy, RetryConfig, retry_async, timeout_error};
use crate::{logi, logok, logw};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tokio::sync::watch;
use tokio::time::Instant;

/// One downloaded clip and the frame that seeds the next scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipArtifact {
    pub index: usize,
    pub path: PathBuf,
    pub last_frame: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Done,
    Failed,
}

/// An outstanding video job; owns the seed it was submitted with.
#[derive(Debug)]
struct GenerationJob<'s> {
    index: usize,
    prompt: &'s str,
    seed: SeedImage,
    handle: OperationHandle,
    state: JobState,
}

#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub aspect_ratio: String,
    pub negative_prompt: String,
    pub poll: PollPolicy,
    pub retry: RetryConfig,
}

impl ChainSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            aspect_ratio: cfg.aspect_ratio.clone(),
            negative_prompt: cfg.negative_prompt.clone(),
            poll: cfg.poll_policy(),
            retry: cfg.retry_config(),
        }
    }
}

pub struct SceneChain<'a> {
    video: &'a dyn VideoGenerator,
    media: &'a dyn MediaToolkit,
    settings: ChainSettings,
    work_dir: PathBuf,
    cancel: Option<watch::Receiver<bool>>,
}

impl<'a> SceneChain<'a> {
    pub fn new(
        video: &'a dyn VideoGenerator,
        media: &'a dyn MediaToolkit,
        settings: ChainSettings,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            video,
            media,
            settings,
            work_dir: work_dir.into(),
            cancel: None,
        }
    }

    /// Abort between polls once the receiver observes `true`.
    pub fn with_cancel(mut self, cancel: watch::Receiver<bool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn clip_path(&self, index: usize) -> PathBuf {
        self.work_dir.join(format!("video_{index}.mp4"))
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.work_dir.join(format!("frame_{index}_last.png"))
    }

    pub async fn run(&self, scenes: &[String], seed: SeedImage) -> MemeResult<Vec<ClipArtifact>> {
        if scenes.is_empty() {
            return Err(MemeError::MalformedStoryboard(
                "no scenes to render".to_string(),
            ));
        }
        fs::create_dir_all(&self.work_dir).await?;

        let mut current_seed = seed;
        let mut clips = Vec::with_capacity(scenes.len());

        for (index, prompt) in scenes.iter().enumerate() {
            self.ensure_not_cancelled()?;
            logi(format!("Scene {}/{}: submitting", index + 1, scenes.len()));

            let mut job = self.submit(index, prompt, current_seed).await?;
            let videos = match self.poll(&mut job).await {
                Ok(videos) => videos,
                Err(err) => {
                    job.state = JobState::Failed;
                    logw(format!(
                        "Scene {} job {} ended in {:?} (seed {}): {}",
                        job.index + 1,
                        job.handle,
                        job.state,
                        job.seed.mime,
                        err
                    ));
                    return Err(err);
                }
            };
            drop(job);

            let clip = self.download(index, &videos).await?;
            let (artifact, next_seed) = self.extract(index, clip).await?;
            logok(format!(
                "Scene {} done: {} (next seed {})",
                index + 1,
                artifact.path.display(),
                artifact.last_frame.display()
            ));
            clips.push(artifact);
            current_seed = next_seed;
        }

        Ok(clips)
    }

    async fn submit<'s>(
        &self,
        index: usize,
        prompt: &'s str,
        seed: SeedImage,
    ) -> MemeResult<GenerationJob<'s>> {
        let handle = retry_async(&self.settings.retry.named("video submit"), || {
            self.video.submit(VideoJobRequest {
                prompt,
                image: &seed,
                aspect_ratio: &self.settings.aspect_ratio,
                negative_prompt: &self.settings.negative_prompt,
                count: 1,
            })
        })
        .await?;

        logi(format!(
            "Scene {} submitted as {} (seed {} bytes)",
            index + 1,
            handle,
            seed.data.len()
        ));
        Ok(GenerationJob {
            index,
            prompt,
            seed,
            handle,
            state: JobState::Pending,
        })
    }

    /// Checks immediately, then once per poll interval until done or past the
    /// deadline.
    async fn poll(&self, job: &mut GenerationJob<'_>) -> MemeResult<Vec<GeneratedVideo>> {
        let policy = &self.settings.poll;
        let started = Instant::now();
        let mut pending_checks = 0u32;

        loop {
            let status = retry_async(&self.settings.retry.named("video status"), || {
                self.video.status(&job.handle)
            })
            .await?;

            match status {
                JobStatus::Done(videos) => {
                    if videos.is_empty() {
                        return Err(MemeError::provider(
                            "veo",
                            None,
                            format!("job {} finished without videos", job.handle),
                        ));
                    }
                    job.state = JobState::Done;
                    logok(format!(
                        "Scene {} generated after {} check(s)",
                        job.index + 1,
                        pending_checks + 1
                    ));
                    return Ok(videos);
                }
                JobStatus::Failed(message) => {
                    return Err(MemeError::provider(
                        "veo",
                        None,
                        format!("scene {} ({}): {}", job.index + 1, short(job.prompt), message),
                    ));
                }
                JobStatus::Pending => {
                    pending_checks += 1;
                    let elapsed = started.elapsed();
                    if elapsed >= policy.max_wait {
                        return Err(timeout_error(job.index + 1, elapsed));
                    }
                    let remaining = policy.max_wait - elapsed;
                    let delay = policy.delay_after(pending_checks).min(remaining);
                    logi(format!(
                        "Scene {} still rendering ({}s elapsed), next check in {}s",
                        job.index + 1,
                        elapsed.as_secs(),
                        delay.as_secs()
                    ));
                    self.pause(delay).await?;
                }
            }
        }
    }

    async fn download(&self, index: usize, videos: &[GeneratedVideo]) -> MemeResult<PathBuf> {
        let first = videos.first().ok_or_else(|| {
            MemeError::provider("veo", None, format!("scene {} has no video", index + 1))
        })?;
        let bytes = retry_async(&self.settings.retry.named("video download"), || {
            self.video.download(first)
        })
        .await?;
        if bytes.is_empty() {
            return Err(MemeError::provider(
                "veo",
                None,
                format!("scene {} downloaded an empty video", index + 1),
            ));
        }

        let path = self.clip_path(index);
        fs::write(&path, &bytes).await?;
        logi(format!("Saved {} ({} bytes)", path.display(), bytes.len()));
        Ok(path)
    }

    async fn extract(&self, index: usize, clip: PathBuf) -> MemeResult<(ClipArtifact, SeedImage)> {
        let frame = self.frame_path(index);
        self.media.extract_last_frame(&clip, &frame).await?;
        let next_seed = SeedImage::load(&frame).await?;
        Ok((
            ClipArtifact {
                index,
                path: clip,
                last_frame: frame,
            },
            next_seed,
        ))
    }

    fn ensure_not_cancelled(&self) -> MemeResult<()> {
        match &self.cancel {
            Some(rx) if *rx.borrow() => Err(MemeError::Cancelled),
            _ => Ok(()),
        }
    }

    async fn pause(&self, delay: Duration) -> MemeResult<()> {
        let deadline = Instant::now() + delay;
        let Some(rx) = &self.cancel else {
            tokio::time::sleep_until(deadline).await;
            return Ok(());
        };

        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return Err(MemeError::Cancelled);
            }
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return Ok(()),
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Sender gone: nobody can cancel any more.
                        tokio::time::sleep_until(deadline).await;
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn short(prompt: &str) -> String {
    let mut out: String = prompt.chars().take(60).collect();
    if prompt.chars().count() > 60 {
        out.push_str("...");
    }
    out
}
