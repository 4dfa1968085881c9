use crate::error::{MemeError, MemeResult};
use crate::ffmpeg;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Local video operations the pipeline and assembler depend on.
#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Decodes `clip` and writes its final frame as an image to `out`.
    async fn extract_last_frame(&self, clip: &Path, out: &Path) -> MemeResult<()>;

    /// Concatenates `clips` in the given order into `out`.
    async fn concat(&self, clips: &[PathBuf], out: &Path) -> MemeResult<()>;
}

#[derive(Debug, Clone, Default)]
pub struct FfmpegToolkit;

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn extract_last_frame(&self, clip: &Path, out: &Path) -> MemeResult<()> {
        let wrote = ffmpeg::ffmpeg_extract_last_frame(clip, out)
            .await
            .map_err(|e| MemeError::FrameExtraction(format!("{}: {:#}", clip.display(), e)))?;
        if !wrote {
            return Err(MemeError::FrameExtraction(format!(
                "no frame written for {}",
                clip.display()
            )));
        }
        Ok(())
    }

    async fn concat(&self, clips: &[PathBuf], out: &Path) -> MemeResult<()> {
        let list = out.with_file_name("concat_list.txt");
        ffmpeg::write_concat_list(&list, clips)
            .await
            .map_err(|e| MemeError::Assembly(format!("{:#}", e)))?;

        let wrote = ffmpeg::ffmpeg_concat_videos(&list, out)
            .await
            .map_err(|e| MemeError::Assembly(format!("{:#}", e)))?;
        if !wrote {
            return Err(MemeError::Assembly(format!("{} was not written", out.display())));
        }

        ffmpeg::ffprobe_duration_seconds(out)
            .await
            .map_err(|e| {
                MemeError::Assembly(format!("{} is not decodable: {:#}", out.display(), e))
            })?;
        Ok(())
    }
}
