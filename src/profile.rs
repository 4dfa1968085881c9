//! Influencer and product profiles stored as `info.yaml` documents under the
//! assets tree, plus the product context the storyboard prompt is built from.

use crate::error::{MemeError, MemeResult};
use serde_yaml::Value;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DEFAULT_INFLUENCER_IMAGE: &str = "full_body";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileKind {
    Influencer,
    Product,
}

impl ProfileKind {
    fn dir_name(self) -> &'static str {
        match self {
            ProfileKind::Influencer => "influencers",
            ProfileKind::Product => "products",
        }
    }

    fn label(self) -> &'static str {
        match self {
            ProfileKind::Influencer => "influencer profile",
            ProfileKind::Product => "product profile",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub kind: ProfileKind,
    pub id: String,
    pub data: Value,
}

impl Profile {
    /// Looks up a nested string, e.g. `text(&["brand_voice", "tone"])`.
    pub fn text(&self, path: &[&str]) -> Option<&str> {
        lookup(&self.data, path).and_then(Value::as_str)
    }

    pub fn text_or<'a>(&'a self, path: &[&str], fallback: &'a str) -> &'a str {
        self.text(path).unwrap_or(fallback)
    }

    /// Nested sequence of scalars rendered as strings; missing paths yield nothing.
    pub fn list(&self, path: &[&str]) -> Vec<String> {
        lookup(&self.data, path).map(scalar_list).unwrap_or_default()
    }

    /// All list values under a mapping, in document order.
    pub fn flattened_lists(&self, path: &[&str]) -> Vec<String> {
        match lookup(&self.data, path) {
            Some(Value::Mapping(map)) => map
                .values()
                .filter(|v| v.is_sequence())
                .flat_map(scalar_list)
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, key| node.get(*key))
}

fn scalar_list(value: &Value) -> Vec<String> {
    value
        .as_sequence()
        .map(|seq| {
            seq.iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    Value::Bool(b) => Some(b.to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Resolves profile documents and reference images below one assets root.
#[derive(Debug, Clone)]
pub struct ProfileStore {
    root: PathBuf,
}

impl ProfileStore {
    pub fn new(assets_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: assets_dir.into(),
        }
    }

    /// `identifier` must be a single plain path segment.
    fn entry_dir(&self, kind: ProfileKind, identifier: &str) -> MemeResult<PathBuf> {
        let id = identifier.trim().to_lowercase();
        let dir = self.root.join(kind.dir_name());
        if !is_plain_segment(&id) {
            return Err(MemeError::not_found(kind.label(), dir.join(id)));
        }
        Ok(dir.join(id))
    }

    pub async fn load_profile(&self, kind: ProfileKind, identifier: &str) -> MemeResult<Profile> {
        let path = self.entry_dir(kind, identifier)?.join("info.yaml");
        let text = match fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MemeError::not_found(kind.label(), path));
            }
            Err(e) => return Err(e.into()),
        };
        let data: Value = serde_yaml::from_str(&text)?;
        Ok(Profile {
            kind,
            id: identifier.trim().to_lowercase(),
            data,
        })
    }

    /// Influencer images live at `images/<image_type>.png`; product images are
    /// named files under `images/`.
    pub async fn image_path(
        &self,
        kind: ProfileKind,
        identifier: &str,
        image_type: &str,
    ) -> MemeResult<PathBuf> {
        let images = self.entry_dir(kind, identifier)?.join("images");
        let label = format!("{} image", kind.label());
        if !is_plain_segment(image_type) {
            return Err(MemeError::not_found(label, images.join(image_type)));
        }
        let path = match kind {
            ProfileKind::Influencer => images.join(format!("{image_type}.png")),
            ProfileKind::Product => images.join(image_type),
        };
        if is_file(&path).await {
            Ok(path)
        } else {
            Err(MemeError::not_found(label, path))
        }
    }

    /// First existing of `<name>.png`, `main.png`, `product.png`.
    pub async fn default_product_image(&self, product: &str) -> MemeResult<PathBuf> {
        let images = self.entry_dir(ProfileKind::Product, product)?.join("images");
        let lower = product.trim().to_lowercase();
        for name in [format!("{lower}.png"), "main.png".to_string(), "product.png".to_string()] {
            let candidate = images.join(name);
            if is_file(&candidate).await {
                return Ok(candidate);
            }
        }
        Err(MemeError::not_found("product image", images))
    }
}

fn is_plain_segment(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !Path::new(name).is_absolute()
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

/// Product and brand attributes fed into the storyboard prompt.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductContext {
    pub name: String,
    pub brand: String,
    pub category: String,
    pub key_features: Vec<String>,
    pub lifestyle_angles: Vec<String>,
    pub lifestyle_themes: Vec<String>,
    /// Every content theme across categories, lifestyle first.
    pub content_themes: Vec<String>,
    pub viral_trends: Vec<String>,
    pub viral_challenges: Vec<String>,
    pub brand_personality: String,
}

impl ProductContext {
    pub fn from_form(
        product_name: &str,
        brand_name: &str,
        brand_personality: &str,
        meme_type: &str,
    ) -> Self {
        let lifestyle_themes = vec![
            format!("{meme_type} content"),
            "Daily routine".to_string(),
            "Style showcase".to_string(),
        ];
        let mut content_themes = lifestyle_themes.clone();
        content_themes.extend(
            ["Fun moments", "Creative content", "Viral potential"]
                .into_iter()
                .map(String::from),
        );

        Self {
            name: product_name.to_string(),
            brand: brand_name.to_string(),
            category: "product".to_string(),
            key_features: vec![
                format!("High-quality {product_name}"),
                "Trendy design".to_string(),
                "Perfect for content creation".to_string(),
            ],
            lifestyle_angles: vec![
                format!("Perfect for {meme_type} content"),
                "Trendy and stylish".to_string(),
                "Content creator approved".to_string(),
            ],
            lifestyle_themes,
            content_themes,
            viral_trends: vec![
                format!("{meme_type} trend"),
                "Product showcase".to_string(),
                "Lifestyle content".to_string(),
            ],
            viral_challenges: vec![
                format!("{brand_name} challenge"),
                format!("{product_name} styling"),
                "Creative showcase".to_string(),
            ],
            brand_personality: brand_personality.to_string(),
        }
    }

    /// Builds the context from a stored product profile. A non-empty
    /// `brand_personality` overrides the stored one.
    pub fn from_profile(profile: &Profile, brand_personality: &str) -> Self {
        let personality = if brand_personality.trim().is_empty() {
            profile
                .text(&["brand_personality"])
                .unwrap_or("fun and engaging")
                .to_string()
        } else {
            brand_personality.to_string()
        };

        Self {
            name: profile.text_or(&["product", "name"], &profile.id).to_string(),
            brand: profile.text_or(&["product", "brand"], "Brand").to_string(),
            category: profile.text_or(&["product", "category"], "").to_string(),
            key_features: profile.list(&["features", "key_features"]),
            lifestyle_angles: profile.list(&["marketing_angles", "lifestyle"]),
            lifestyle_themes: profile.list(&["content_themes", "lifestyle"]),
            content_themes: profile.flattened_lists(&["content_themes"]),
            viral_trends: profile.list(&["viral_potential", "trends"]),
            viral_challenges: profile.list(&["viral_potential", "challenges"]),
            brand_personality: personality,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const ANGELI: &str = r#"
influencer:
  name: Angeli
  type: Lifestyle Influencer
  content_style: GRWM and anime fashion
personality:
  traits: [playful, confident, witty]
content_focus: [fashion, anime]
brand_voice:
  tone: upbeat
audience:
  primary: Gen Z
"#;

    async fn fixture() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("influencers").join("angeli");
        tokio::fs::create_dir_all(base.join("images")).await.unwrap();
        tokio::fs::write(base.join("info.yaml"), ANGELI).await.unwrap();
        tokio::fs::write(base.join("images").join("full_body.png"), b"png")
            .await
            .unwrap();

        let product = dir.path().join("products").join("dress");
        tokio::fs::create_dir_all(product.join("images")).await.unwrap();
        tokio::fs::write(
            product.join("info.yaml"),
            "product:\n  name: Summer Dress\n  brand: FashionBrand\ncontent_themes:\n  lifestyle: [GRWM]\n  entertainment: [Twirl reveal]\n",
        )
        .await
        .unwrap();
        tokio::fs::write(product.join("images").join("main.png"), b"png")
            .await
            .unwrap();
        dir
    }

    #[tokio::test]
    async fn identifiers_are_case_insensitive() {
        let dir = fixture().await;
        let store = ProfileStore::new(dir.path());
        let profile = store
            .load_profile(ProfileKind::Influencer, "AnGeLi")
            .await
            .unwrap();
        assert_eq!(profile.id, "angeli");
        assert_eq!(profile.text(&["influencer", "name"]), Some("Angeli"));
        assert_eq!(profile.list(&["personality", "traits"]).len(), 3);
        assert_eq!(profile.text_or(&["brand_voice", "style"], "casual"), "casual");
    }

    #[tokio::test]
    async fn loading_twice_is_structurally_identical() {
        let dir = fixture().await;
        let store = ProfileStore::new(dir.path());
        let a = store.load_profile(ProfileKind::Influencer, "angeli").await.unwrap();
        let b = store.load_profile(ProfileKind::Influencer, "ANGELI").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let dir = fixture().await;
        let store = ProfileStore::new(dir.path());
        let err = store
            .load_profile(ProfileKind::Influencer, "nobody")
            .await
            .unwrap_err();
        assert!(matches!(err, MemeError::NotFound { .. }));

        let err = store
            .image_path(ProfileKind::Influencer, "angeli", "portrait")
            .await
            .unwrap_err();
        assert!(matches!(err, MemeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn identifiers_cannot_leave_the_assets_tree() {
        let dir = fixture().await;
        let store = ProfileStore::new(dir.path().join("nested"));
        tokio::fs::create_dir_all(dir.path().join("nested")).await.unwrap();

        for id in ["../../influencers/angeli", "..", "a/b", "a\\b", "  "] {
            let err = store
                .load_profile(ProfileKind::Influencer, id)
                .await
                .unwrap_err();
            assert!(matches!(err, MemeError::NotFound { .. }), "{id}");
        }

        let store = ProfileStore::new(dir.path());
        let err = store
            .image_path(ProfileKind::Influencer, "angeli", "../../angeli/info")
            .await
            .unwrap_err();
        assert!(matches!(err, MemeError::NotFound { .. }));
    }

    #[tokio::test]
    async fn resolves_reference_images() {
        let dir = fixture().await;
        let store = ProfileStore::new(dir.path());
        let path = store
            .image_path(ProfileKind::Influencer, "Angeli", DEFAULT_INFLUENCER_IMAGE)
            .await
            .unwrap();
        assert!(path.ends_with("influencers/angeli/images/full_body.png"));

        let product = store.default_product_image("Dress").await.unwrap();
        assert!(product.ends_with("products/dress/images/main.png"));
    }

    #[test]
    fn form_context_matches_meme_type() {
        let ctx = ProductContext::from_form("dress", "FashionBrand", "trendy", "GRWM");
        assert_eq!(ctx.key_features[0], "High-quality dress");
        assert_eq!(ctx.lifestyle_themes[0], "GRWM content");
        assert_eq!(ctx.content_themes.len(), 6);
        assert_eq!(ctx.viral_challenges[0], "FashionBrand challenge");
        assert_eq!(ctx.brand_personality, "trendy");
    }

    #[tokio::test]
    async fn profile_context_flattens_themes_in_order() {
        let dir = fixture().await;
        let store = ProfileStore::new(dir.path());
        let profile = store.load_profile(ProfileKind::Product, "dress").await.unwrap();
        let ctx = ProductContext::from_profile(&profile, "");
        assert_eq!(ctx.name, "Summer Dress");
        assert_eq!(ctx.content_themes, vec!["GRWM", "Twirl reveal"]);
        assert_eq!(ctx.brand_personality, "fun and engaging");
    }
}
