pub mod api;
pub mod assembler;
pub mod config;
pub mod error;
pub mod ffmpeg;
pub mod generator;
pub mod image;
pub mod init;
pub mod media;
pub mod pipeline;
pub mod profile;
pub mod render;
pub mod retry;
pub mod storyboard;
pub mod workspace;

pub use error::{MemeError, MemeResult};

pub(crate) fn logv(tag: &str, message: &str) {
    match tag {
        "WARN" => tracing::warn!(tag, "{}", message),
        _ => tracing::info!(tag, "{}", message),
    }
}

pub(crate) fn logi(message: impl AsRef<str>) {
    logv("INFO", message.as_ref());
}

pub(crate) fn logok(message: impl AsRef<str>) {
    logv("OK", message.as_ref());
}

pub(crate) fn logw(message: impl AsRef<str>) {
    logv("WARN", message.as_ref());
}
