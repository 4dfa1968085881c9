use async_trait::async_trait;
use memereel::api::{
    GeneratedVideo, ImageGenerator, JobStatus, OperationHandle, PublishReceipt, Publisher,
    TextGenerator, VideoGenerator, VideoJobRequest,
};
use memereel::config::Config;
use memereel::generator::{MemeRequest, PublishTarget, Services, run_generation};
use memereel::image::{SeedImage, UploadedFile};
use memereel::media::MediaToolkit;
use memereel::{MemeError, MemeResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;

const PNG: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

const STORYBOARD_REPLY: &str = "Here you go!\n\
SCENE 1:\nDescription: Angeli wakes up late.\nCharacter Expression: Panic.\nVisual Effects: Shake.\n\n\
SCENE 2:\nDescription: She grabs the dress.\nCharacter Expression: Relief.\nVisual Effects: Sparkle.\n\n\
SCENE 3:\nDescription: Runway walk to the door.\nCharacter Expression: Confident.\nVisual Effects: Slow motion.\n";

struct CannedText;

#[async_trait]
impl TextGenerator for CannedText {
    async fn generate_text(&self, _prompt: &str) -> MemeResult<String> {
        Ok(STORYBOARD_REPLY.to_string())
    }
}

#[derive(Default)]
struct CannedImage {
    references: Mutex<Vec<usize>>,
}

#[async_trait]
impl ImageGenerator for CannedImage {
    async fn generate_image(
        &self,
        _prompt: &str,
        references: &[SeedImage],
    ) -> MemeResult<Option<SeedImage>> {
        self.references.lock().unwrap().push(references.len());
        let mut data = PNG.to_vec();
        data.extend_from_slice(b"storyboard-seed");
        Ok(Some(SeedImage::new(data, "image/png")))
    }
}

/// Finishes every job on the first status check, except `fail_scene`.
#[derive(Default)]
struct InstantVideo {
    fail_scene: Option<usize>,
    submitted: Mutex<Vec<(String, Vec<u8>)>>,
}

fn job_index(name: &str) -> usize {
    name.rsplit('/').next().unwrap().parse().unwrap()
}

#[async_trait]
impl VideoGenerator for InstantVideo {
    async fn submit(&self, request: VideoJobRequest<'_>) -> MemeResult<OperationHandle> {
        let mut submitted = self.submitted.lock().unwrap();
        submitted.push((request.prompt.to_string(), request.image.data.clone()));
        Ok(OperationHandle(format!("operations/{}", submitted.len() - 1)))
    }

    async fn status(&self, handle: &OperationHandle) -> MemeResult<JobStatus> {
        if self.fail_scene == Some(job_index(&handle.0)) {
            return Ok(JobStatus::Failed("content policy".to_string()));
        }
        Ok(JobStatus::Done(vec![GeneratedVideo {
            uri: format!("files/{}", job_index(&handle.0)),
        }]))
    }

    async fn download(&self, video: &GeneratedVideo) -> MemeResult<Vec<u8>> {
        Ok(format!("<clip{}>", job_index(&video.uri)).into_bytes())
    }
}

/// Accepts jobs that never finish.
#[derive(Default)]
struct StuckVideo {
    status_checks: Mutex<u32>,
}

#[async_trait]
impl VideoGenerator for StuckVideo {
    async fn submit(&self, _request: VideoJobRequest<'_>) -> MemeResult<OperationHandle> {
        Ok(OperationHandle("operations/stuck".to_string()))
    }

    async fn status(&self, _handle: &OperationHandle) -> MemeResult<JobStatus> {
        *self.status_checks.lock().unwrap() += 1;
        Ok(JobStatus::Pending)
    }

    async fn download(&self, _video: &GeneratedVideo) -> MemeResult<Vec<u8>> {
        unreachable!("a pending job is never downloaded")
    }
}

/// Frames are derived from clip bytes; concat appends clips in order.
struct FakeMedia;

#[async_trait]
impl MediaToolkit for FakeMedia {
    async fn extract_last_frame(&self, clip: &Path, out: &Path) -> MemeResult<()> {
        let mut frame = b"frame:".to_vec();
        frame.extend(tokio::fs::read(clip).await?);
        tokio::fs::write(out, frame).await?;
        Ok(())
    }

    async fn concat(&self, clips: &[PathBuf], out: &Path) -> MemeResult<()> {
        let mut body = Vec::new();
        for clip in clips {
            body.extend(tokio::fs::read(clip).await?);
        }
        tokio::fs::write(out, body).await?;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPublisher {
    calls: Mutex<Vec<(PathBuf, String, String, Vec<String>)>>,
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(
        &self,
        video_path: &Path,
        title: &str,
        account: &str,
        platforms: &[String],
    ) -> MemeResult<PublishReceipt> {
        assert!(video_path.is_file());
        self.calls.lock().unwrap().push((
            video_path.to_path_buf(),
            title.to_string(),
            account.to_string(),
            platforms.to_vec(),
        ));
        Ok(PublishReceipt {
            status: 200,
            body: serde_json::json!({"success": true}),
        })
    }
}

struct Fixture {
    dir: TempDir,
    cfg: Config,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let assets = dir.path().join("assets");
    let angeli = assets.join("influencers").join("angeli");
    std::fs::create_dir_all(angeli.join("images")).unwrap();
    std::fs::write(
        angeli.join("info.yaml"),
        "influencer:\n  name: Angeli\n  content_style: GRWM\npersonality:\n  traits: [playful]\n",
    )
    .unwrap();
    let mut portrait = PNG.to_vec();
    portrait.extend_from_slice(b"angeli");
    std::fs::write(angeli.join("images").join("full_body.png"), portrait).unwrap();

    let cfg = Config {
        genai_key: "test".to_string(),
        assets_dir: assets,
        output_dir: Some(dir.path().join("out")),
        retry_attempts: 0,
        ..Config::default()
    };
    Fixture { dir, cfg }
}

fn services(
    video: Arc<InstantVideo>,
    image: Arc<CannedImage>,
    publisher: Option<Arc<RecordingPublisher>>,
) -> Services {
    Services {
        text: Arc::new(CannedText),
        image,
        video,
        media: Arc::new(FakeMedia),
        publisher: publisher.map(|p| p as Arc<dyn Publisher>),
    }
}

fn upload() -> (UploadedFile, PathBuf) {
    let mut data = PNG.to_vec();
    data.extend_from_slice(b"dress");
    let upload = UploadedFile::from_bytes(&data, ".png").unwrap();
    let path = upload.path().to_path_buf();
    (upload, path)
}

fn runs_left(out: &Path) -> usize {
    match std::fs::read_dir(out.join(".runs")) {
        Ok(entries) => entries.count(),
        Err(_) => 0,
    }
}

#[tokio::test]
async fn generates_chained_clips_and_publishes() {
    let fx = fixture();
    let video = Arc::new(InstantVideo::default());
    let image = Arc::new(CannedImage::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let services = services(video.clone(), image.clone(), Some(publisher.clone()));

    let (upload, upload_path) = upload();
    let mut request = MemeRequest::new("dress", "FashionBrand");
    request.upload = Some(upload);
    request.publish = Some(PublishTarget {
        title: "GRWM with the new dress".to_string(),
        account: None,
        platforms: Vec::new(),
    });

    let outcome = run_generation(&fx.cfg, &services, request).await.unwrap();

    let expected_dir = fx.dir.path().join("out").join("dress").join("angeli");
    assert_eq!(outcome.output_dir, expected_dir);
    assert_eq!(outcome.storyboard.len(), 3);
    assert!(outcome.storyboard[0].starts_with("Description: Angeli wakes up late."));

    let storyboard_txt = std::fs::read_to_string(expected_dir.join("storyboard.txt")).unwrap();
    assert_eq!(storyboard_txt, outcome.storyboard.join("\n"));
    assert!(outcome.storyboard_image.is_file());

    let veo = expected_dir.join("veo3");
    assert_eq!(
        outcome.clips,
        (0..3).map(|i| veo.join(format!("video_{i}.mp4"))).collect::<Vec<_>>()
    );
    assert_eq!(
        std::fs::read_to_string(&outcome.combined_video).unwrap(),
        "<clip0><clip1><clip2>"
    );

    // Scene 1 starts from the rendered storyboard frame, later scenes from the
    // previous clip's last frame.
    let submitted = video.submitted.lock().unwrap();
    assert_eq!(submitted.len(), 3);
    assert!(submitted[0].1.ends_with(b"storyboard-seed"));
    assert_eq!(submitted[1].1, b"frame:<clip0>");
    assert_eq!(submitted[2].1, b"frame:<clip1>");
    for (i, (prompt, _)) in submitted.iter().enumerate() {
        assert_eq!(prompt, &outcome.storyboard[i]);
    }

    // influencer portrait plus the uploaded product image
    assert_eq!(*image.references.lock().unwrap(), vec![2]);

    let calls = publisher.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, outcome.combined_video);
    assert_eq!(calls[0].2, "angeli");
    assert_eq!(calls[0].3, vec!["instagram".to_string()]);
    assert_eq!(outcome.published.as_ref().map(|r| r.status), Some(200));

    assert!(!upload_path.exists());
    assert_eq!(runs_left(&fx.dir.path().join("out")), 0);
}

#[tokio::test]
async fn failed_scene_removes_partial_output_and_upload() {
    let fx = fixture();
    let video = Arc::new(InstantVideo {
        fail_scene: Some(1),
        ..InstantVideo::default()
    });
    let services = services(video.clone(), Arc::new(CannedImage::default()), None);

    let (upload, upload_path) = upload();
    let mut request = MemeRequest::new("dress", "FashionBrand");
    request.upload = Some(upload);

    let err = run_generation(&fx.cfg, &services, request).await.unwrap_err();

    assert!(matches!(err, MemeError::Provider { .. }));
    assert_eq!(video.submitted.lock().unwrap().len(), 2);
    assert!(!upload_path.exists());
    let out = fx.dir.path().join("out");
    assert!(!out.join("dress").exists());
    assert_eq!(runs_left(&out), 0);
}

#[tokio::test]
async fn unknown_influencer_fails_before_any_generation() {
    let fx = fixture();
    let video = Arc::new(InstantVideo::default());
    let image = Arc::new(CannedImage::default());
    let services = services(video.clone(), image.clone(), None);

    let (upload, upload_path) = upload();
    let mut request = MemeRequest::new("dress", "FashionBrand");
    request.influencer_name = "nobody".to_string();
    request.upload = Some(upload);

    let err = run_generation(&fx.cfg, &services, request).await.unwrap_err();

    assert!(matches!(err, MemeError::NotFound { .. }));
    assert!(video.submitted.lock().unwrap().is_empty());
    assert!(image.references.lock().unwrap().is_empty());
    assert!(!upload_path.exists());
}

#[tokio::test]
async fn publish_without_publisher_is_a_publish_error() {
    let fx = fixture();
    let services = services(
        Arc::new(InstantVideo::default()),
        Arc::new(CannedImage::default()),
        None,
    );
    let mut request = MemeRequest::new("dress", "FashionBrand");
    request.publish = Some(PublishTarget {
        title: "t".to_string(),
        account: Some("brand".to_string()),
        platforms: vec!["tiktok".to_string()],
    });

    let err = run_generation(&fx.cfg, &services, request).await.unwrap_err();
    assert!(matches!(err, MemeError::Publish(_)));
}

#[tokio::test]
async fn cancelling_mid_poll_discards_the_run_and_upload() {
    let mut fx = fixture();
    fx.cfg.poll_interval_secs = 1;
    let video = Arc::new(StuckVideo::default());
    let services = Services {
        text: Arc::new(CannedText),
        image: Arc::new(CannedImage::default()),
        video: video.clone(),
        media: Arc::new(FakeMedia),
        publisher: None,
    };

    let (upload, upload_path) = upload();
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut request = MemeRequest::new("dress", "FashionBrand");
    request.upload = Some(upload);
    request.cancel = Some(cancel_rx);

    let run = run_generation(&fx.cfg, &services, request);
    let cancel = async {
        // wait until the job is being polled, then cancel
        while *video.status_checks.lock().unwrap() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel_tx.send(true).unwrap();
    };
    let (result, ()) = tokio::join!(run, cancel);

    assert!(matches!(result, Err(MemeError::Cancelled)));
    let out = fx.dir.path().join("out");
    assert_eq!(runs_left(&out), 0);
    assert!(!out.join("dress").join("angeli").exists());
    assert!(!upload_path.exists());
}
