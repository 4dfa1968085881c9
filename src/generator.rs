use crate::api::gemini::GeminiClient;
use crate::api::upload_post::UploadPostClient;
use crate::api::{ImageGenerator, PublishReceipt, Publisher, TextGenerator, VideoGenerator};
use crate::assembler;
use crate::config::Config;
use crate::error::{MemeError, MemeResult};
use crate::image::{ImageSource, SeedImage, UploadedFile};
use crate::media::{FfmpegToolkit, MediaToolkit};
use crate::pipeline::{ChainSettings, SceneChain};
use crate::profile::{DEFAULT_INFLUENCER_IMAGE, ProductContext, Profile, ProfileKind, ProfileStore};
use crate::render;
use crate::storyboard::{self, Storyboard};
use crate::workspace::RequestWorkspace;
use crate::{logi, logok, logw};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::watch;

pub const DEFAULT_INFLUENCER: &str = "angeli";
pub const DEFAULT_MEME_TYPE: &str = "GRWM";
pub const DEFAULT_BRAND_PERSONALITY: &str = "fun and engaging";

#[derive(Debug, Clone)]
pub struct PublishTarget {
    pub title: String,
    /// Falls back to `publish_account` from the config.
    pub account: Option<String>,
    /// Empty means the configured `publish_platforms`.
    pub platforms: Vec<String>,
}

/// Everything one generation request needs from its caller.
#[derive(Debug)]
pub struct MemeRequest {
    pub product_name: String,
    pub brand_name: String,
    pub brand_personality: String,
    pub influencer_name: String,
    pub meme_type: String,
    pub product_image: Option<ImageSource>,
    /// Caller-supplied image parked in a temp file; removed when the request
    /// ends, whatever the outcome. Takes precedence over `product_image`.
    pub upload: Option<UploadedFile>,
    pub use_product_profile: bool,
    pub publish: Option<PublishTarget>,
    pub cancel: Option<watch::Receiver<bool>>,
}

impl MemeRequest {
    pub fn new(product_name: impl Into<String>, brand_name: impl Into<String>) -> Self {
        Self {
            product_name: product_name.into(),
            brand_name: brand_name.into(),
            brand_personality: DEFAULT_BRAND_PERSONALITY.to_string(),
            influencer_name: DEFAULT_INFLUENCER.to_string(),
            meme_type: DEFAULT_MEME_TYPE.to_string(),
            product_image: None,
            upload: None,
            use_product_profile: false,
            publish: None,
            cancel: None,
        }
    }
}

/// Remote providers and local media tooling used by a request.
#[derive(Clone)]
pub struct Services {
    pub text: Arc<dyn TextGenerator>,
    pub image: Arc<dyn ImageGenerator>,
    pub video: Arc<dyn VideoGenerator>,
    pub media: Arc<dyn MediaToolkit>,
    pub publisher: Option<Arc<dyn Publisher>>,
}

impl Services {
    /// Gemini for generation, ffmpeg for media, and Upload-Post when a key is
    /// configured.
    pub fn from_config(client: reqwest::Client, cfg: &Config) -> Self {
        let gemini = Arc::new(GeminiClient::new(client.clone(), cfg));
        let publisher: Option<Arc<dyn Publisher>> = if cfg.upload_post_key.is_empty() {
            None
        } else {
            Some(Arc::new(UploadPostClient::new(client, cfg)))
        };
        Self {
            text: gemini.clone(),
            image: gemini.clone(),
            video: gemini,
            media: Arc::new(FfmpegToolkit),
            publisher,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub request_id: String,
    pub output_dir: PathBuf,
    pub storyboard: Vec<String>,
    pub storyboard_image: PathBuf,
    pub clips: Vec<PathBuf>,
    pub combined_video: PathBuf,
    pub published: Option<PublishReceipt>,
}

/// Paths inside the run directory, before it is moved into place.
struct Produced {
    storyboard: Storyboard,
    storyboard_image: PathBuf,
    clips: Vec<PathBuf>,
    combined_video: PathBuf,
}

/// Runs one request end to end: profiles, storyboard, seed frame, chained
/// clips, combined video and, when asked, publishing.
///
/// Any failure aborts the request and deletes its partial artifacts. The
/// uploaded product image (if any) is removed on every path.
pub async fn run_generation(
    cfg: &Config,
    services: &Services,
    mut request: MemeRequest,
) -> MemeResult<GenerationOutcome> {
    let upload = request.upload.take();
    let result = generate(cfg, services, &request, upload.as_ref()).await;
    if let Some(upload) = upload {
        upload.close();
    }

    match &result {
        Ok(outcome) => logok(format!(
            "Request {} finished: {}",
            outcome.request_id,
            outcome.combined_video.display()
        )),
        Err(e) => logw(format!(
            "Generation failed for {} x {}: {}",
            request.product_name, request.influencer_name, e
        )),
    }
    result
}

async fn generate(
    cfg: &Config,
    services: &Services,
    request: &MemeRequest,
    upload: Option<&UploadedFile>,
) -> MemeResult<GenerationOutcome> {
    let store = ProfileStore::new(&cfg.assets_dir);
    logi(format!(
        "=== {} ({}) with {} ===",
        request.product_name, request.brand_name, request.influencer_name
    ));

    let influencer = store
        .load_profile(ProfileKind::Influencer, &request.influencer_name)
        .await?;
    let influencer_img_path = store
        .image_path(
            ProfileKind::Influencer,
            &request.influencer_name,
            DEFAULT_INFLUENCER_IMAGE,
        )
        .await?;
    let influencer_img = SeedImage::load(&influencer_img_path).await?;

    let product = if request.use_product_profile {
        let profile = store
            .load_profile(ProfileKind::Product, &request.product_name)
            .await?;
        ProductContext::from_profile(&profile, &request.brand_personality)
    } else {
        ProductContext::from_form(
            &request.product_name,
            &request.brand_name,
            &request.brand_personality,
            &request.meme_type,
        )
    };
    let product_img = product_image(&store, request, upload).await?;

    let workspace = RequestWorkspace::create(cfg.output_root()).await?;
    let produced = match produce(
        cfg,
        services,
        request,
        &workspace,
        &influencer,
        &product,
        &influencer_img,
        product_img.as_ref(),
    )
    .await
    {
        Ok(produced) => produced,
        Err(e) => {
            workspace.discard().await;
            return Err(e);
        }
    };

    let request_id = workspace.id().to_string();
    let run_dir = workspace.run_dir().to_path_buf();
    let output_dir = workspace
        .finalize(&request.product_name, &request.influencer_name)
        .await?;
    let moved = |p: &Path| relocate(p, &run_dir, &output_dir);

    let combined_video = moved(produced.combined_video.as_path());
    let published = match &request.publish {
        Some(target) => Some(publish(cfg, services, target, &combined_video).await?),
        None => None,
    };

    Ok(GenerationOutcome {
        request_id,
        storyboard: produced.storyboard.into_scenes(),
        storyboard_image: moved(produced.storyboard_image.as_path()),
        clips: produced.clips.iter().map(|c| moved(c.as_path())).collect(),
        combined_video,
        output_dir,
        published,
    })
}

#[allow(clippy::too_many_arguments)]
async fn produce(
    cfg: &Config,
    services: &Services,
    request: &MemeRequest,
    workspace: &RequestWorkspace,
    influencer: &Profile,
    product: &ProductContext,
    influencer_img: &SeedImage,
    product_img: Option<&SeedImage>,
) -> MemeResult<Produced> {
    let retry = cfg.retry_config();

    let storyboard =
        storyboard::compose(services.text.as_ref(), &retry, influencer, product).await?;
    let storyboard_txt = workspace.storyboard_text();
    fs::write(&storyboard_txt, storyboard.to_text()).await?;
    logok(format!("Storyboard saved: {}", storyboard_txt.display()));

    let first_scene = storyboard
        .scenes()
        .first()
        .ok_or_else(|| MemeError::MalformedStoryboard("storyboard has no scenes".to_string()))?;
    let seed = render::render_seed(
        services.image.as_ref(),
        &retry,
        first_scene,
        influencer_img,
        product_img,
    )
    .await?;
    let storyboard_image = workspace.storyboard_image();
    seed.save(&storyboard_image).await?;

    let mut chain = SceneChain::new(
        services.video.as_ref(),
        services.media.as_ref(),
        ChainSettings::from_config(cfg),
        workspace.video_dir(),
    );
    if let Some(cancel) = &request.cancel {
        chain = chain.with_cancel(cancel.clone());
    }
    let clips = chain.run(storyboard.scenes(), seed).await?;

    let combined_video = assembler::assemble(
        services.media.as_ref(),
        &clips,
        &workspace.combined_video(),
    )
    .await?;

    Ok(Produced {
        storyboard,
        storyboard_image,
        clips: clips.into_iter().map(|c| c.path).collect(),
        combined_video,
    })
}

/// Upload first, then an explicit source, then (for profile-backed products)
/// the product's stored image. No image at all is allowed.
async fn product_image(
    store: &ProfileStore,
    request: &MemeRequest,
    upload: Option<&UploadedFile>,
) -> MemeResult<Option<SeedImage>> {
    if let Some(upload) = upload {
        return upload.source().resolve().await.map(Some);
    }
    if let Some(source) = &request.product_image {
        return source.resolve().await.map(Some);
    }
    if request.use_product_profile {
        return match store.default_product_image(&request.product_name).await {
            Ok(path) => SeedImage::load(&path).await.map(Some),
            Err(MemeError::NotFound { path, .. }) => {
                logw(format!("No product image under {}", path.display()));
                Ok(None)
            }
            Err(e) => Err(e),
        };
    }
    Ok(None)
}

async fn publish(
    cfg: &Config,
    services: &Services,
    target: &PublishTarget,
    video: &Path,
) -> MemeResult<PublishReceipt> {
    let publisher = services
        .publisher
        .as_ref()
        .ok_or_else(|| MemeError::Publish("no publisher configured".to_string()))?;
    let account = target.account.as_deref().unwrap_or(&cfg.publish_account);
    let platforms = if target.platforms.is_empty() {
        &cfg.publish_platforms
    } else {
        &target.platforms
    };

    logi(format!(
        "Publishing {} as {} to {}",
        video.display(),
        account,
        platforms.join(", ")
    ));
    publisher.publish(video, &target.title, account, platforms).await
}

fn relocate(path: &Path, from: &Path, to: &Path) -> PathBuf {
    match path.strip_prefix(from) {
        Ok(rel) => to.join(rel),
        Err(_) => path.to_path_buf(),
    }
}
