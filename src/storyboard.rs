use crate::api::TextGenerator;
use crate::error::{MemeError, MemeResult};
use crate::profile::{ProductContext, Profile};
use crate::retry::{RetryConfig, retry_async};
use crate::{logi, logok};
use once_cell::sync::OnceCell;
use regex::Regex;

pub const SCENE_COUNT: usize = 3;

const STORYBOARD_OUTPUT_INSTRUCTION: &str = "
Output the storyboard in the following format:

Storyboard format:
1.\tScene description (background, character positions)
2.\tCharacter expressions/poses
3.\tVisual effects or points of emphasis

IMPORTANT:
1. DO NOT INCLUDE ANY TEXT(text overlay) IN THE STORYBOARD.
";

fn scene_marker() -> MemeResult<&'static Regex> {
    static MARKER_RE: OnceCell<Regex> = OnceCell::new();
    MARKER_RE.get_or_try_init(|| {
        Regex::new(r"SCENE\s+(\d+)\s*:")
            .map_err(|e| MemeError::MalformedStoryboard(format!("scene marker regex: {e}")))
    })
}

/// Ordered scene descriptions; scene N+1 continues visually from scene N.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Storyboard {
    scenes: Vec<String>,
}

impl Storyboard {
    pub fn scenes(&self) -> &[String] {
        &self.scenes
    }

    pub fn into_scenes(self) -> Vec<String> {
        self.scenes
    }

    /// The `storyboard.txt` body: scenes joined by newlines.
    pub fn to_text(&self) -> String {
        self.scenes.join("\n")
    }
}

fn joined(items: &[String], take: usize) -> String {
    items
        .iter()
        .take(take)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn influencer_name(influencer: &Profile) -> &str {
    influencer.text_or(&["influencer", "name"], "the influencer")
}

pub fn personalized_prompt(influencer: &Profile, product: &ProductContext) -> String {
    let name = influencer_name(influencer);
    let traits = influencer.list(&["personality", "traits"]).join(", ");
    let content_focus = influencer.list(&["content_focus"]).join(", ");
    let tone = influencer.text_or(&["brand_voice", "tone"], "engaging");
    let style = influencer.text_or(&["brand_voice", "style"], "casual");
    let content_style = influencer.text_or(&["influencer", "content_style"], "lifestyle content");
    let kind = influencer.text_or(&["influencer", "type"], "Influencer");
    let audience = influencer.text_or(&["audience", "primary"], "general audience");

    let themes = &product.content_themes;
    let lead_theme = joined(themes, 1);
    let personality = &product.brand_personality;
    let product_name = &product.name;
    let brand = &product.brand;

    format!(
        "
You are a viral meme storyboard expert creating {} content for {name}.

Influencer Profile:
- Type: {kind}
- Content Style: {content_style}
- Personality Traits: {traits}
- Content Focus: {content_focus}
- Brand Voice: {tone}, {style}
- Target Audience: {audience}

Product & Brand Profile:
- Product: {product_name}
- Brand: {brand}
- Brand Personality: {personality}
- Category: {}
- Key Features: {}
- Marketing Angles: {}
- Viral Trends: {}
- Content Themes: {}

Create a storyboard for a {lead_theme} meme that:
1. Authentically showcases {product_name} from {brand} through {name}'s unique lens
2. Reflects the brand's {personality} personality
3. Leverages {name}'s {content_style} expertise
4. Incorporates relevant product features naturally in a {lead_theme} format
5. Taps into current viral trends and challenges
6. Appeals to both {name}'s audience and the brand's target market
7. Creates an engaging 8-second video with exactly {SCENE_COUNT} scenes
8. Feels genuine to {name}'s established persona
9. Embodies the {personality} brand personality throughout

Consider these viral opportunities: {}
Focus on these content angles: {}
Meme Style: Emphasize {lead_theme} elements that showcase both the product and brand personality
",
        joined(themes, 2),
        product.category,
        product.key_features.join(", "),
        joined(&product.lifestyle_angles, 3),
        product.viral_trends.join(", "),
        joined(themes, 5),
        product.viral_challenges.join(", "),
        joined(themes, 3),
    )
}

/// Short brief naming what to highlight: top features, lifestyle themes and
/// trends.
pub fn context_prompt(influencer: &Profile, product: &ProductContext) -> String {
    let name = influencer_name(influencer);
    let category = if product.category.is_empty() {
        String::new()
    } else {
        format!(" ({})", product.category)
    };
    format!(
        "
Product: {}{category}
Influencer: {name}

Key Product Features to Highlight: {}
Suggested Content Angles: {}
Viral Opportunity: {}

Create a storyboard that:
- Showcases {} authentically through {name}'s lens
- Incorporates their content expertise: {}
- Leverages current trends and viral potential
- Feels natural to their established style and audience
",
        product.name,
        joined(&product.key_features, 3),
        joined(&product.lifestyle_themes, 2),
        joined(&product.viral_trends, 2),
        product.name,
        influencer.list(&["content_focus"]).join(", "),
    )
}

/// Full request sent to the text service, ending with the `SCENE n:` template.
pub fn storyboard_prompt(influencer: &Profile, product: &ProductContext) -> String {
    let name = influencer_name(influencer);
    let mut template = String::from("Please format each scene like this:\n");
    for n in 1..=SCENE_COUNT {
        template.push_str(&format!(
            "SCENE {n}:\nDescription: [scene description that fits {name}'s style]\nCharacter Expression: [expression matching their personality]\nVisual Effects: [visual effects that align with their brand aesthetic]\n\n"
        ));
    }
    template.push_str(&format!(
        "Output exactly {SCENE_COUNT} scenes and start each one with the literal marker `SCENE <number>:`.\n"
    ));

    format!(
        "{}\n{}\n{}\n{}",
        personalized_prompt(influencer, product),
        context_prompt(influencer, product),
        STORYBOARD_OUTPUT_INSTRUCTION,
        template
    )
}

/// Splits a text reply on `SCENE n:` markers. Text before the first marker is
/// ignored; each segment is trimmed and its lines joined with single spaces.
pub fn parse_storyboard(reply: &str) -> MemeResult<Storyboard> {
    // (number, marker start, marker end)
    let markers: Vec<(&str, usize, usize)> = scene_marker()?
        .captures_iter(reply)
        .filter_map(|cap| {
            let whole = cap.get(0)?;
            let number = cap.get(1)?;
            Some((number.as_str(), whole.start(), whole.end()))
        })
        .collect();

    if markers.is_empty() {
        return Err(MemeError::MalformedStoryboard(
            "no SCENE markers in reply".to_string(),
        ));
    }
    if markers.len() != SCENE_COUNT {
        return Err(MemeError::MalformedStoryboard(format!(
            "expected {} scenes, found {}",
            SCENE_COUNT,
            markers.len()
        )));
    }

    let mut scenes = Vec::with_capacity(SCENE_COUNT);
    for (idx, &(number, _, body_start)) in markers.iter().enumerate() {
        if number.parse::<usize>().ok() != Some(idx + 1) {
            return Err(MemeError::MalformedStoryboard(format!(
                "scene {} is numbered {}",
                idx + 1,
                number
            )));
        }
        let body_end = markers.get(idx + 1).map_or(reply.len(), |next| next.1);
        let text = flatten_segment(&reply[body_start..body_end]);
        if text.is_empty() {
            return Err(MemeError::MalformedStoryboard(format!(
                "scene {} is empty",
                idx + 1
            )));
        }
        scenes.push(text);
    }

    Ok(Storyboard { scenes })
}

fn flatten_segment(segment: &str) -> String {
    segment
        .lines()
        .map(|line| line.trim().trim_matches(|c| c == '*' || c == '#').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Builds the prompt, asks the text service once, and parses the reply.
pub async fn compose(
    text: &dyn TextGenerator,
    retry: &RetryConfig,
    influencer: &Profile,
    product: &ProductContext,
) -> MemeResult<Storyboard> {
    let prompt = storyboard_prompt(influencer, product);
    logi(format!(
        "Requesting storyboard for {} x {} ({} chars prompt)",
        influencer.id,
        product.name,
        prompt.len()
    ));
    let reply = retry_async(&retry.named("storyboard text"), || text.generate_text(&prompt)).await?;
    let storyboard = parse_storyboard(&reply)?;
    logok(format!("Storyboard parsed: {} scenes", storyboard.scenes().len()));
    Ok(storyboard)
}
