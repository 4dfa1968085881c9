use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use memereel::config::Config;
use memereel::generator::{
    DEFAULT_BRAND_PERSONALITY, DEFAULT_INFLUENCER, DEFAULT_MEME_TYPE, MemeRequest, PublishTarget,
    Services, run_generation,
};
use memereel::image::ImageSource;
use memereel::init;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "memereel", version, about = "Influencer meme video generator")]
struct Cli {
    /// JSON config file; keys may also come from the environment or `.env`.
    #[arg(long, global = true, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate one meme video.
    Generate(GenerateArgs),
    /// Verify ffmpeg/ffprobe and the asset tree.
    Check,
}

#[derive(Args)]
struct GenerateArgs {
    #[arg(long)]
    product_name: String,
    #[arg(long)]
    brand_name: String,
    #[arg(long, default_value = DEFAULT_BRAND_PERSONALITY)]
    brand_personality: String,
    #[arg(long, default_value = DEFAULT_INFLUENCER)]
    influencer: String,
    #[arg(long, default_value = DEFAULT_MEME_TYPE)]
    meme_type: String,
    #[arg(long)]
    product_image: Option<PathBuf>,
    /// Build the product context from `products/<name>/info.yaml`.
    #[arg(long)]
    use_product_profile: bool,

    #[arg(long)]
    publish: bool,
    #[arg(long, requires = "publish")]
    title: Option<String>,
    #[arg(long, requires = "publish")]
    account: Option<String>,
    #[arg(long = "platform", requires = "publish")]
    platforms: Vec<String>,
}

impl GenerateArgs {
    fn into_request(self) -> MemeRequest {
        let publish = self.publish.then(|| PublishTarget {
            title: self
                .title
                .unwrap_or_else(|| format!("{} x {}", self.brand_name, self.product_name)),
            account: self.account,
            platforms: self.platforms,
        });

        let mut request = MemeRequest::new(self.product_name, self.brand_name);
        request.brand_personality = self.brand_personality;
        request.influencer_name = self.influencer;
        request.meme_type = self.meme_type;
        request.product_image = self.product_image.map(ImageSource::Path);
        request.use_product_profile = self.use_product_profile;
        request.publish = publish;
        request
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config).await?;
    init::ensure_directories(&cfg).await?;

    match cli.command {
        Command::Check => check(&cfg).await,
        Command::Generate(args) => generate(&cfg, args).await,
    }
}

async fn check(cfg: &Config) -> Result<()> {
    if !init::check_ffmpeg().await {
        anyhow::bail!("ffmpeg/ffprobe not found in PATH. Please install FFmpeg.");
    }
    for dir in init::required_dirs(cfg) {
        tracing::info!("ok: {}", dir.display());
    }
    if cfg.upload_post_key.is_empty() {
        tracing::warn!("upload_post_api_key not set; --publish will fail");
    }
    println!("ready");
    Ok(())
}

async fn generate(cfg: &Config, args: GenerateArgs) -> Result<()> {
    if !init::check_ffmpeg().await {
        tracing::warn!("FFmpeg not found in PATH. Please install FFmpeg.");
    }

    let client = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;
    let services = Services::from_config(client, cfg);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            let _ = cancel_tx.send(true);
        }
    });

    let mut request = args.into_request();
    request.cancel = Some(cancel_rx);

    let outcome = run_generation(cfg, &services, request)
        .await
        .context("meme generation failed")?;

    println!("request:  {}", outcome.request_id);
    println!("output:   {}", outcome.output_dir.display());
    println!("video:    {}", outcome.combined_video.display());
    if let Some(receipt) = &outcome.published {
        println!("published ({}): {}", receipt.status, receipt.body);
    }
    Ok(())
}
