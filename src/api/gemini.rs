use crate::api::{
    GeneratedVideo, ImageGenerator, JobStatus, OperationHandle, TextGenerator, VideoGenerator,
    VideoJobRequest,
};
use crate::config::Config;
use crate::error::{MemeError, MemeResult};
use crate::image::SeedImage;
use crate::logw;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

const SERVICE: &str = "gemini";
const VEO: &str = "veo";

/// One client for text, image and Veo video generation.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
    video_model: String,
}

impl GeminiClient {
    pub fn new(client: Client, cfg: &Config) -> Self {
        Self {
            client,
            api_key: cfg.genai_key.clone(),
            base_url: cfg.genai_base_url.trim_end_matches('/').to_string(),
            text_model: cfg.text_model.clone(),
            image_model: cfg.image_model.clone(),
            video_model: cfg.video_model.clone(),
        }
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.base_url, model, method)
    }

    async fn post_json(
        &self,
        service: &'static str,
        url: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> MemeResult<String> {
        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| MemeError::transport(service, e))?;
        read_body(service, resp).await
    }

    async fn generate_content(
        &self,
        model: &str,
        body: serde_json::Value,
    ) -> MemeResult<GenerateContentResponse> {
        let url = self.model_url(model, "generateContent");
        let raw = self
            .post_json(SERVICE, &url, &body, Duration::from_secs(300))
            .await?;
        serde_json::from_str(&raw).map_err(|e| {
            MemeError::provider(SERVICE, None, format!("unexpected response shape: {e}"))
        })
    }
}

async fn read_body(service: &'static str, resp: reqwest::Response) -> MemeResult<String> {
    let status = resp.status();
    let raw = resp.text().await.unwrap_or_default();
    if !status.is_success() {
        let snippet = raw.chars().take(800).collect::<String>();
        logw(format!("{} HTTP {}: {}", service, status.as_u16(), snippet));
        return Err(MemeError::provider(
            service,
            Some(status.as_u16()),
            extract_error_message(&raw).unwrap_or(snippet),
        ));
    }
    Ok(raw)
}

fn extract_error_message(raw: &str) -> Option<String> {
    let root: serde_json::Value = serde_json::from_str(raw).ok()?;
    root.get("error")?
        .get("message")?
        .as_str()
        .map(str::to_string)
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    text: Option<String>,
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

impl GenerateContentResponse {
    fn parts(&self) -> impl Iterator<Item = &ResponsePart> {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .into_iter()
            .flat_map(|c| c.parts.iter())
    }

    fn text(&self) -> String {
        self.parts()
            .filter_map(|p| p.text.as_deref())
            .collect::<Vec<_>>()
            .join("")
    }

    fn first_image(&self) -> MemeResult<Option<SeedImage>> {
        let Some(inline) = self.parts().find_map(|p| p.inline_data.as_ref()) else {
            return Ok(None);
        };
        let data = B64.decode(inline.data.as_bytes()).map_err(|e| {
            MemeError::provider(SERVICE, None, format!("inline image is not base64: {e}"))
        })?;
        Ok(Some(SeedImage::new(data, inline.mime_type.clone())))
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> MemeResult<String> {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        });
        let resp = self.generate_content(&self.text_model, body).await?;
        let text = resp.text();
        if text.trim().is_empty() {
            return Err(MemeError::provider(SERVICE, None, "empty text reply"));
        }
        Ok(text)
    }
}

#[async_trait]
impl ImageGenerator for GeminiClient {
    async fn generate_image(
        &self,
        prompt: &str,
        references: &[SeedImage],
    ) -> MemeResult<Option<SeedImage>> {
        let mut parts = vec![json!({"text": prompt})];
        for image in references {
            parts.push(json!({
                "inlineData": InlineData {
                    mime_type: image.mime.clone(),
                    data: B64.encode(&image.data),
                }
            }));
        }
        let body = json!({
            "contents": [{"role": "user", "parts": parts}],
            "generationConfig": {"responseModalities": ["TEXT", "IMAGE"]},
        });
        let resp = self.generate_content(&self.image_model, body).await?;
        resp.first_image()
    }
}

#[derive(Debug, Deserialize)]
struct LongRunningOperation {
    name: String,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    done: bool,
    response: Option<VeoResponse>,
    error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VeoResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: SampleVideo,
}

#[derive(Debug, Deserialize)]
struct SampleVideo {
    uri: String,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl OperationStatus {
    fn into_job_status(self) -> JobStatus {
        if !self.done {
            return JobStatus::Pending;
        }
        if let Some(err) = self.error {
            return JobStatus::Failed(format!("code {}: {}", err.code, err.message));
        }
        let videos = self
            .response
            .and_then(|r| r.generate_video_response)
            .map(|r| r.generated_samples)
            .unwrap_or_default()
            .into_iter()
            .map(|s| GeneratedVideo { uri: s.video.uri })
            .collect();
        JobStatus::Done(videos)
    }
}

#[async_trait]
impl VideoGenerator for GeminiClient {
    async fn submit(&self, request: VideoJobRequest<'_>) -> MemeResult<OperationHandle> {
        let url = self.model_url(&self.video_model, "predictLongRunning");
        let body = json!({
            "instances": [{
                "prompt": request.prompt,
                "image": {
                    "bytesBase64Encoded": B64.encode(&request.image.data),
                    "mimeType": request.image.mime,
                },
            }],
            "parameters": {
                "aspectRatio": request.aspect_ratio,
                "negativePrompt": request.negative_prompt,
                "sampleCount": request.count,
            },
        });
        let raw = self
            .post_json(VEO, &url, &body, Duration::from_secs(120))
            .await?;
        let op: LongRunningOperation = serde_json::from_str(&raw).map_err(|e| {
            MemeError::provider(VEO, None, format!("operation handle missing: {e}"))
        })?;
        Ok(OperationHandle(op.name))
    }

    async fn status(&self, handle: &OperationHandle) -> MemeResult<JobStatus> {
        let url = format!("{}/{}", self.base_url, handle.0);
        let resp = self
            .client
            .get(&url)
            .header("x-goog-api-key", &self.api_key)
            .timeout(Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| MemeError::transport(VEO, e))?;
        let raw = read_body(VEO, resp).await?;
        let status: OperationStatus = serde_json::from_str(&raw)
            .map_err(|e| MemeError::provider(VEO, None, format!("bad operation status: {e}")))?;
        Ok(status.into_job_status())
    }

    async fn download(&self, video: &GeneratedVideo) -> MemeResult<Vec<u8>> {
        let resp = self
            .client
            .get(&video.uri)
            .header("x-goog-api-key", &self.api_key)
            .timeout(Duration::from_secs(600))
            .send()
            .await
            .map_err(|e| MemeError::transport(VEO, e))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(MemeError::provider(
                VEO,
                Some(status.as_u16()),
                format!("download of {} failed", video.uri),
            ));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| MemeError::transport(VEO, e))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_first_inline_image() {
        let raw = r#"{"candidates":[{"content":{"parts":[
            {"text":"here you go"},
            {"inlineData":{"mimeType":"image/png","data":"aGVsbG8="}}
        ]}}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let image = resp.first_image().unwrap().unwrap();
        assert_eq!(image.data, b"hello");
        assert_eq!(image.mime, "image/png");
        assert_eq!(resp.text(), "here you go");
    }

    #[test]
    fn reply_without_image_yields_none() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"sorry"}]}}]}"#;
        let resp: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.first_image().unwrap().is_none());
    }

    #[test]
    fn operation_status_mapping() {
        let pending: OperationStatus = serde_json::from_str(r#"{"name":"operations/x"}"#).unwrap();
        assert_eq!(pending.into_job_status(), JobStatus::Pending);

        let done: OperationStatus = serde_json::from_str(
            r#"{"done":true,"response":{"generateVideoResponse":{"generatedSamples":[
                {"video":{"uri":"https://example.test/v1.mp4"}}]}}}"#,
        )
        .unwrap();
        assert_eq!(
            done.into_job_status(),
            JobStatus::Done(vec![GeneratedVideo {
                uri: "https://example.test/v1.mp4".to_string()
            }])
        );

        let failed: OperationStatus = serde_json::from_str(
            r#"{"done":true,"error":{"code":3,"message":"unsafe prompt"}}"#,
        )
        .unwrap();
        assert!(matches!(
            failed.into_job_status(),
            JobStatus::Failed(msg) if msg.contains("unsafe")
        ));
    }

    #[test]
    fn error_message_is_extracted() {
        let raw = r#"{"error":{"code":400,"message":"API key not valid","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(extract_error_message(raw).as_deref(), Some("API key not valid"));
        assert_eq!(extract_error_message("not json"), None);
    }
}
