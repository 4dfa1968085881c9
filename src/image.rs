use crate::error::{MemeError, MemeResult};
use crate::logw;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tokio::fs;

/// Where an image comes from before it is loaded.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes { data: Vec<u8>, mime: Option<String> },
}

/// The single in-memory image representation used past the boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedImage {
    pub data: Vec<u8>,
    pub mime: String,
}

impl SeedImage {
    pub fn new(data: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            data,
            mime: mime.into(),
        }
    }

    pub async fn load(path: &Path) -> MemeResult<Self> {
        let data = fs::read(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MemeError::not_found("image", path),
            _ => MemeError::Io(e),
        })?;
        let mime = sniff_mime(&data)
            .map(str::to_string)
            .or_else(|| mime_from_extension(path))
            .unwrap_or_else(|| "image/png".to_string());
        Ok(Self::new(data, mime))
    }

    pub async fn save(&self, path: &Path) -> MemeResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, &self.data).await?;
        Ok(())
    }
}

impl ImageSource {
    pub async fn resolve(&self) -> MemeResult<SeedImage> {
        match self {
            ImageSource::Path(path) => SeedImage::load(path).await,
            ImageSource::Bytes { data, mime } => {
                let mime = mime
                    .clone()
                    .or_else(|| sniff_mime(data).map(str::to_string))
                    .unwrap_or_else(|| "image/png".to_string());
                Ok(SeedImage::new(data.clone(), mime))
            }
        }
    }
}

pub fn sniff_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some("image/png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("image/gif")
    } else {
        None
    }
}

/// Image MIME type implied by the file extension, if any.
fn mime_from_extension(path: &Path) -> Option<String> {
    mime_guess::from_path(path)
        .first()
        .filter(|m| m.type_() == mime_guess::mime::IMAGE)
        .map(|m| m.essence_str().to_string())
}

/// A product image received from a caller and parked in a temp file for the
/// lifetime of one request. The file is removed on drop; `close` removes it
/// eagerly and reports failures.
#[derive(Debug)]
pub struct UploadedFile {
    path: TempPath,
}

impl UploadedFile {
    pub fn from_bytes(data: &[u8], suffix: &str) -> MemeResult<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("memereel-upload-")
            .suffix(suffix)
            .tempfile()?;
        file.write_all(data)?;
        file.flush()?;
        Ok(Self {
            path: file.into_temp_path(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn source(&self) -> ImageSource {
        ImageSource::Path(self.path.to_path_buf())
    }

    pub fn close(self) {
        let shown = self.path.display().to_string();
        if let Err(err) = self.path.close() {
            logw(format!("Failed to remove uploaded file {}: {}", shown, err));
        }
    }
}
