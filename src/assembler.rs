use crate::error::{MemeError, MemeResult};
use crate::logok;
use crate::media::MediaToolkit;
use crate::pipeline::ClipArtifact;
use std::path::{Path, PathBuf};

/// Concatenates the clips in scene order into `out`.
///
/// Clips must be non-empty, indexed `0..n` without gaps, and present on disk.
pub async fn assemble(
    media: &dyn MediaToolkit,
    clips: &[ClipArtifact],
    out: &Path,
) -> MemeResult<PathBuf> {
    if clips.is_empty() {
        return Err(MemeError::Assembly("no clips to assemble".to_string()));
    }
    for (expected, clip) in clips.iter().enumerate() {
        if clip.index != expected {
            return Err(MemeError::Assembly(format!(
                "clip {} found where scene {} was expected",
                clip.index, expected
            )));
        }
        if !clip.path.is_file() {
            return Err(MemeError::Assembly(format!(
                "clip missing: {}",
                clip.path.display()
            )));
        }
    }

    let paths: Vec<PathBuf> = clips.iter().map(|c| c.path.clone()).collect();
    media.concat(&paths, out).await?;
    if !out.is_file() {
        return Err(MemeError::Assembly(format!("{} was not written", out.display())));
    }

    logok(format!("Combined {} clips into {}", clips.len(), out.display()));
    Ok(out.to_path_buf())
}
