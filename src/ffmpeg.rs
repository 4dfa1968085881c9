use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

async fn run_cmd(args: &[String]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }

    let mut cmd = Command::new(&args[0]);
    if args.len() > 1 {
        cmd.args(&args[1..]);
    }

    let output = cmd.output().await.context("Command execution failed")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail = stderr.trim().lines().last().unwrap_or("").to_string();
        return Err(anyhow::anyhow!("Command failed: {:?}: {}", args, tail));
    }

    Ok(())
}

pub async fn ffprobe_duration_seconds(path: &Path) -> Result<f64> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-show_entries",
            "format=duration",
            "-of",
            "default=noprint_wrappers=1:nokey=1",
        ])
        .arg(path)
        .output()
        .await
        .context("ffprobe duration failed")?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffprobe failed"));
    }

    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let duration = text.parse::<f64>().unwrap_or(-1.0);
    if duration <= 0.0 {
        return Err(anyhow::anyhow!("Invalid duration"));
    }
    Ok(duration)
}

/// Writes the final decoded frame of `in_mp4` to `out_png`.
///
/// Seeks close to the end and keeps overwriting the single output image, so
/// the file left behind is the last frame regardless of clip length.
pub async fn ffmpeg_extract_last_frame(in_mp4: &Path, out_png: &Path) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-sseof".to_string(),
        "-3".to_string(),
        "-i".to_string(),
        in_mp4.display().to_string(),
        "-an".to_string(),
        "-update".to_string(),
        "1".to_string(),
        "-f".to_string(),
        "image2".to_string(),
        out_png.display().to_string(),
    ];
    run_cmd(&args).await?;
    Ok(out_png.exists())
}

/// Concat-demuxer list with entries relative to the list file.
pub async fn write_concat_list(list_txt: &Path, clips: &[PathBuf]) -> Result<()> {
    let base = list_txt.parent().unwrap_or_else(|| Path::new("."));
    let mut listf = fs::File::create(list_txt)
        .await
        .with_context(|| format!("create concat list: {}", list_txt.display()))?;
    for clip in clips {
        let entry = pathdiff::diff_paths(clip, base).unwrap_or_else(|| clip.clone());
        let escaped = entry.display().to_string().replace('\'', r"'\''");
        listf
            .write_all(format!("file '{}'\n", escaped).as_bytes())
            .await?;
    }
    listf.flush().await?;
    Ok(())
}

pub async fn ffmpeg_concat_videos(list_txt: &Path, out_mp4: &Path) -> Result<bool> {
    let args = vec![
        "ffmpeg".to_string(),
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_txt.display().to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-preset".to_string(),
        "veryfast".to_string(),
        "-crf".to_string(),
        "22".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "192k".to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out_mp4.display().to_string(),
    ];
    run_cmd(&args).await?;
    Ok(out_mp4.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concat_list_uses_relative_entries() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("concat_list.txt");
        let clips = vec![
            dir.path().join("video_0.mp4"),
            dir.path().join("video_1.mp4"),
            dir.path().join("it's.mp4"),
        ];
        write_concat_list(&list, &clips).await.unwrap();

        let text = tokio::fs::read_to_string(&list).await.unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "file 'video_0.mp4'");
        assert_eq!(lines[1], "file 'video_1.mp4'");
        assert_eq!(lines[2], r"file 'it'\''s.mp4'");
    }
}
