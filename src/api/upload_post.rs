use crate::api::{PublishReceipt, Publisher};
use crate::config::Config;
use crate::error::{MemeError, MemeResult};
use crate::logw;
use async_trait::async_trait;
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone)]
pub struct UploadPostClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl UploadPostClient {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            api_key: cfg.upload_post_key.clone(),
            base_url: cfg.upload_post_base_url.trim_end_matches('/').to_string(),
        }
    }
}

/// The service reports some rejections with HTTP 200 and `success: false`.
fn rejection_reason(body: &serde_json::Value) -> Option<String> {
    if body.get("success").and_then(|v| v.as_bool()) == Some(false) {
        let msg = body
            .get("message")
            .or_else(|| body.get("error"))
            .and_then(|v| v.as_str())
            .unwrap_or("rejected without message");
        return Some(msg.to_string());
    }
    None
}

#[async_trait]
impl Publisher for UploadPostClient {
    async fn publish(
        &self,
        video_path: &Path,
        title: &str,
        account: &str,
        platforms: &[String],
    ) -> MemeResult<PublishReceipt> {
        if self.api_key.is_empty() {
            return Err(MemeError::Publish("upload_post_api_key missing".to_string()));
        }
        if platforms.is_empty() {
            return Err(MemeError::Publish("no target platforms".to_string()));
        }

        let bytes = fs::read(video_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => MemeError::not_found("video", video_path),
            _ => MemeError::Io(e),
        })?;
        let file_name = video_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());
        let video = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(|e| MemeError::Publish(e.to_string()))?;

        let mut form = Form::new()
            .text("user", account.to_string())
            .text("title", title.to_string());
        for platform in platforms {
            form = form.text("platform[]", platform.clone());
        }
        form = form.part("video", video);

        let resp = self
            .client
            .post(format!("{}/api/upload", self.base_url))
            .header("Authorization", format!("Apikey {}", self.api_key))
            .multipart(form)
            .timeout(Duration::from_secs(600))
            .send()
            .await
            .map_err(|e| MemeError::Publish(format!("request failed: {e}")))?;

        let status = resp.status();
        let raw = resp.text().await.unwrap_or_default();
        let body: serde_json::Value =
            serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw.clone()));

        if !status.is_success() {
            let snippet = raw.chars().take(800).collect::<String>();
            logw(format!("Upload-Post HTTP {}: {}", status.as_u16(), snippet));
            return Err(MemeError::Publish(format!("HTTP {}: {}", status.as_u16(), snippet)));
        }
        if let Some(reason) = rejection_reason(&body) {
            return Err(MemeError::Publish(reason));
        }

        Ok(PublishReceipt {
            status: status.as_u16(),
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_false_is_a_rejection() {
        let body = json!({"success": false, "message": "account not linked"});
        assert_eq!(rejection_reason(&body).as_deref(), Some("account not linked"));
        assert_eq!(rejection_reason(&json!({"success": true})), None);
        assert_eq!(rejection_reason(&json!({"results": {}})), None);
    }

    #[tokio::test]
    async fn missing_key_fails_before_network() {
        let cfg = Config::default();
        let client = UploadPostClient::new(Client::new(), &cfg);
        let err = client
            .publish(Path::new("combined.mp4"), "t", "angeli", &["instagram".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, MemeError::Publish(_)));
    }
}
