use crate::config::Config;
use crate::logi;
use anyhow::{Context, Result};
use std::path::PathBuf;
use tokio::fs;

/// Asset directories the generator reads from and writes to.
pub fn required_dirs(cfg: &Config) -> Vec<PathBuf> {
    vec![
        cfg.assets_dir.join("influencers"),
        cfg.assets_dir.join("products"),
        cfg.output_root(),
    ]
}

pub async fn ensure_directories(cfg: &Config) -> Result<()> {
    for dir in required_dirs(cfg) {
        if fs::metadata(&dir).await.is_err() {
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("create {}", dir.display()))?;
            logi(format!("Created directory: {}", dir.display()));
        }
    }
    Ok(())
}

async fn tool_available(tool: &str) -> bool {
    match tokio::process::Command::new(tool)
        .arg("-version")
        .output()
        .await
    {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

/// True when both `ffmpeg` and `ffprobe` run.
pub async fn check_ffmpeg() -> bool {
    tool_available("ffmpeg").await && tool_available("ffprobe").await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_asset_tree() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config {
            assets_dir: dir.path().join("assets"),
            ..Config::default()
        };
        ensure_directories(&cfg).await.unwrap();
        ensure_directories(&cfg).await.unwrap();

        assert!(dir.path().join("assets/influencers").is_dir());
        assert!(dir.path().join("assets/products").is_dir());
        assert!(dir.path().join("assets/outputs").is_dir());
    }
}
