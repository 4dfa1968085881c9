use crate::api::ImageGenerator;
use crate::error::{MemeError, MemeResult};
use crate::image::SeedImage;
use crate::retry::{RetryConfig, retry_async};
use crate::{logi, logok};

const IMAGE_GENERATION_PROMPT: &str = "
Create a scene image with applying second image in first image given below information:

{storyboard_item}

IMPORTANT:
1. NOT TO INCLUDE ANY TEXT IN IMAGE.
";

pub fn seed_prompt(scene: &str) -> String {
    IMAGE_GENERATION_PROMPT.replace("{storyboard_item}", scene)
}

/// Renders the opening frame for the first scene from the influencer image
/// and, when available, the product image.
pub async fn render_seed(
    images: &dyn ImageGenerator,
    retry: &RetryConfig,
    scene: &str,
    influencer_img: &SeedImage,
    product_img: Option<&SeedImage>,
) -> MemeResult<SeedImage> {
    let prompt = seed_prompt(scene);
    let mut references = vec![influencer_img.clone()];
    if let Some(product) = product_img {
        references.push(product.clone());
    }

    logi(format!(
        "Rendering seed frame with {} reference image(s)",
        references.len()
    ));
    let image = retry_async(&retry.named("seed render"), || {
        images.generate_image(&prompt, &references)
    })
    .await?
    .ok_or_else(|| MemeError::Render("provider reply contained no image".to_string()))?;

    logok(format!("Seed frame rendered ({} bytes, {})", image.data.len(), image.mime));
    Ok(image)
}
