//! Per-request working directories.
//!
//! Artifacts are written under `<output>/.runs/<id>/` while a request runs, so
//! concurrent requests never share files. A finished run is renamed into
//! `<output>/<product>/<influencer>/`; a failed one is deleted.

use crate::error::{MemeError, MemeResult};
use crate::{logi, logw};
use chrono::Utc;
use once_cell::sync::Lazy;
use rand::Rng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::fs;
use walkdir::WalkDir;

const RUNS_DIR: &str = ".runs";
const VIDEO_DIR: &str = "veo3";

type TargetLock = Arc<tokio::sync::Mutex<()>>;

/// One lock per final directory; finalizing into the same product/influencer
/// pair is serialized within the process.
static FINALIZE_LOCKS: Lazy<Mutex<HashMap<PathBuf, TargetLock>>> = Lazy::new(Default::default);

fn target_lock(target: &Path) -> TargetLock {
    let mut locks = FINALIZE_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
    locks.entry(target.to_path_buf()).or_default().clone()
}

pub fn new_request_id() -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S");
    let suffix: u32 = rand::thread_rng().r#gen();
    format!("{stamp}-{suffix:08x}")
}

/// Lowercased path segment with anything outside `[a-z0-9_-]` replaced.
pub fn slug(name: &str) -> String {
    let mut out = String::new();
    for ch in name.trim().chars() {
        match ch {
            'a'..='z' | '0'..='9' | '-' | '_' => out.push(ch),
            'A'..='Z' => out.push(ch.to_ascii_lowercase()),
            ' ' => out.push('_'),
            _ => {}
        }
    }
    if out.is_empty() {
        out.push_str("unnamed");
    }
    out
}

#[derive(Debug)]
pub struct RequestWorkspace {
    id: String,
    output_root: PathBuf,
    run_dir: PathBuf,
}

impl RequestWorkspace {
    pub async fn create(output_root: impl Into<PathBuf>) -> MemeResult<Self> {
        let output_root = output_root.into();
        let id = new_request_id();
        let run_dir = output_root.join(RUNS_DIR).join(&id);
        fs::create_dir_all(run_dir.join(VIDEO_DIR)).await?;
        logi(format!("Request {id} working in {}", run_dir.display()));
        Ok(Self {
            id,
            output_root,
            run_dir,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn video_dir(&self) -> PathBuf {
        self.run_dir.join(VIDEO_DIR)
    }

    pub fn storyboard_text(&self) -> PathBuf {
        self.run_dir.join("storyboard.txt")
    }

    pub fn storyboard_image(&self) -> PathBuf {
        self.run_dir.join("storyboard.png")
    }

    pub fn combined_video(&self) -> PathBuf {
        self.video_dir().join("combined.mp4")
    }

    pub fn final_dir(&self, product: &str, influencer: &str) -> PathBuf {
        self.output_root.join(slug(product)).join(slug(influencer))
    }

    /// Files currently in the run directory, relative to it, sorted.
    pub fn artifacts(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.run_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                e.path()
                    .strip_prefix(&self.run_dir)
                    .ok()
                    .map(Path::to_path_buf)
            })
            .collect();
        files.sort();
        files
    }

    /// Moves the run into its published location, replacing an earlier result
    /// for the same product and influencer. Returns the new directory.
    ///
    /// If the move fails the run directory is left in place and its path is
    /// logged; a finished run is never deleted here.
    pub async fn finalize(self, product: &str, influencer: &str) -> MemeResult<PathBuf> {
        let target = self.final_dir(product, influencer);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }

        let lock = target_lock(&target);
        let _held = lock.lock().await;

        let previous = if fs::metadata(&target).await.is_ok() {
            let aside = self
                .output_root
                .join(RUNS_DIR)
                .join(format!("{}.replaced", self.id));
            fs::rename(&target, &aside).await?;
            Some(aside)
        } else {
            None
        };

        if let Err(e) = fs::rename(&self.run_dir, &target).await {
            if let Some(aside) = &previous {
                if let Err(restore) = fs::rename(aside, &target).await {
                    logw(format!(
                        "Could not restore {} after failed finalize: {}",
                        target.display(),
                        restore
                    ));
                }
            }
            logw(format!(
                "Request {} could not be moved to {}; artifacts kept in {}",
                self.id,
                target.display(),
                self.run_dir.display()
            ));
            return Err(MemeError::Io(e));
        }

        if let Some(aside) = previous {
            if let Err(e) = fs::remove_dir_all(&aside).await {
                logw(format!("Failed to remove replaced output {}: {}", aside.display(), e));
            }
        }
        logi(format!("Request {} saved to {}", self.id, target.display()));
        Ok(target)
    }

    /// Deletes everything the request wrote. Failures are logged only.
    pub async fn discard(self) {
        let files = self.artifacts().len();
        match fs::remove_dir_all(&self.run_dir).await {
            Ok(()) => logi(format!("Discarded partial run {} ({} files)", self.id, files)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => logw(format!(
                "Failed to delete run directory {}: {}",
                self.run_dir.display(),
                e
            )),
        }
    }
}
