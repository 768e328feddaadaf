use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::asset::AssetState;
use crate::projects::AssetVersion;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub name: String,
    pub hex: String,
    pub usage: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandVoice {
    pub tone: String,
    pub dos: Vec<String>,
    pub donts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissionVision {
    pub mission: String,
    pub vision: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SocialPost {
    pub platform: String,
    pub caption: String,
    pub image_prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSize {
    OneK,
    TwoK,
    FourK,
}

impl ImageSize {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageSize::OneK => "1K",
            ImageSize::TwoK => "2K",
            ImageSize::FourK => "4K",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectRatio {
    Square,
    Wide,
    Tall,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Wide => "16:9",
            AspectRatio::Tall => "9:16",
        }
    }

    pub fn prompt_hint(self) -> String {
        format!(" Aspect ratio {}.", self.as_str().replace(':', " to "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MockupKind {
    Website,
    Signage,
    Merchandise,
    Stationery,
    Menu,
    Packaging,
    Social,
    Uniform,
    Interior,
}

impl MockupKind {
    pub const ALL: [MockupKind; 9] = [
        MockupKind::Website,
        MockupKind::Signage,
        MockupKind::Merchandise,
        MockupKind::Stationery,
        MockupKind::Menu,
        MockupKind::Packaging,
        MockupKind::Social,
        MockupKind::Uniform,
        MockupKind::Interior,
    ];

    pub fn key(self) -> &'static str {
        match self {
            MockupKind::Website => "website",
            MockupKind::Signage => "signage",
            MockupKind::Merchandise => "merchandise",
            MockupKind::Stationery => "stationery",
            MockupKind::Menu => "menu",
            MockupKind::Packaging => "packaging",
            MockupKind::Social => "social",
            MockupKind::Uniform => "uniform",
            MockupKind::Interior => "interior",
        }
    }

    pub fn prompt_suffix(self) -> &'static str {
        match self {
            MockupKind::Website => {
                "Laptop screen showing website landing page design, ui/ux, digital interface"
            }
            MockupKind::Signage => {
                "Modern 3D storefront signage, high end architectural photography, photorealistic"
            }
            MockupKind::Merchandise => {
                "Branded merchandise collection including tote bag and coffee mug, studio lighting"
            }
            MockupKind::Stationery => {
                "Premium stationery set, business cards, letterhead, and envelope, overhead view, elegant"
            }
            MockupKind::Menu => {
                "Restaurant menu or service list on clipboard or table, close up, depth of field"
            }
            MockupKind::Packaging => {
                "Product packaging design, box or bag, minimalist studio setting"
            }
            MockupKind::Social => {
                "Instagram story social media promotional design, modern typography, phone screen format"
            }
            MockupKind::Uniform => {
                "Staff uniform or apparel design, t-shirt or apron, professional model"
            }
            MockupKind::Interior => {
                "Interior design of the physical space, shop or office environment, atmospheric lighting"
            }
        }
    }

    pub fn aspect_ratio(self) -> AspectRatio {
        match self {
            MockupKind::Website => AspectRatio::Wide,
            MockupKind::Signage => AspectRatio::Wide,
            MockupKind::Merchandise => AspectRatio::Square,
            MockupKind::Stationery => AspectRatio::Wide,
            MockupKind::Menu => AspectRatio::Tall,
            MockupKind::Packaging => AspectRatio::Square,
            MockupKind::Social => AspectRatio::Tall,
            MockupKind::Uniform => AspectRatio::Tall,
            MockupKind::Interior => AspectRatio::Wide,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrandConcept {
    pub id: String,
    pub name: String,
    pub summary: String,
    pub logo_concept: String,
    pub typography: String,
    #[serde(default)]
    pub color_palette: Vec<Color>,
    pub mood_board: String,
    pub brand_voice: BrandVoice,
    pub mission_vision: MissionVision,
    #[serde(default)]
    pub taglines: Vec<String>,
    pub social_strategy: String,
    #[serde(default)]
    pub campaigns: Vec<SocialPost>,

    #[serde(default, skip_serializing_if = "AssetState::is_not_requested")]
    pub logo_url: AssetState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logo_history: Vec<AssetVersion>,

    #[serde(default, skip_serializing_if = "AssetState::is_not_requested")]
    pub mood_board_url: AssetState,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mood_board_history: Vec<AssetVersion>,

    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub mockups: IndexMap<MockupKind, AssetState>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub campaign_assets: IndexMap<u32, AssetState>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn minimal_concept() -> BrandConcept {
        BrandConcept {
            id: "concept-1700000000000-0".to_string(),
            name: "Clean Slate".to_string(),
            summary: "Quiet minimalism".to_string(),
            logo_concept: "A single brushstroke ring".to_string(),
            typography: "Grotesk display over humanist body".to_string(),
            color_palette: vec![Color {
                name: "Porcelain".to_string(),
                hex: "#F4F1EC".to_string(),
                usage: "Background".to_string(),
            }],
            mood_board: "Soft daylight, linen, stoneware".to_string(),
            brand_voice: BrandVoice {
                tone: "Warm, precise".to_string(),
                dos: vec!["Speak plainly".to_string()],
                donts: vec!["No jargon".to_string()],
            },
            mission_vision: MissionVision {
                mission: "Make mornings calmer".to_string(),
                vision: "A cafe on every quiet corner".to_string(),
            },
            taglines: vec!["Begin gently".to_string()],
            social_strategy: "Slow content, high craft".to_string(),
            campaigns: Vec::new(),
            logo_url: AssetState::NotRequested,
            logo_history: Vec::new(),
            mood_board_url: AssetState::NotRequested,
            mood_board_history: Vec::new(),
            mockups: IndexMap::new(),
            campaign_assets: IndexMap::new(),
        }
    }

    #[test]
    fn absent_assets_are_omitted_from_storage() -> anyhow::Result<()> {
        let value = serde_json::to_value(minimal_concept())?;
        let obj = value.as_object().unwrap();
        assert!(!obj.contains_key("logoUrl"));
        assert!(!obj.contains_key("logoHistory"));
        assert!(!obj.contains_key("mockups"));
        assert_eq!(obj["logoConcept"], json!("A single brushstroke ring"));
        Ok(())
    }

    #[test]
    fn sentinel_states_survive_storage() -> anyhow::Result<()> {
        let mut concept = minimal_concept();
        concept.logo_url = AssetState::Pending;
        concept
            .mockups
            .insert(MockupKind::Website, AssetState::Failed);
        concept
            .campaign_assets
            .insert(0, AssetState::Ready("data:image/png;base64,QUJD".to_string()));

        let value = serde_json::to_value(&concept)?;
        assert_eq!(value["logoUrl"], json!(""));
        assert_eq!(value["mockups"]["website"], json!("error_failed"));
        assert_eq!(
            value["campaignAssets"]["0"],
            json!("data:image/png;base64,QUJD")
        );

        let reloaded: BrandConcept = serde_json::from_value(value)?;
        assert_eq!(reloaded, concept);
        Ok(())
    }

    #[test]
    fn mockup_table_covers_all_nine_kinds() {
        assert_eq!(MockupKind::ALL.len(), 9);
        assert_eq!(MockupKind::Menu.aspect_ratio(), AspectRatio::Tall);
        assert_eq!(MockupKind::Packaging.aspect_ratio(), AspectRatio::Square);
        assert_eq!(MockupKind::Interior.aspect_ratio(), AspectRatio::Wide);
    }

    #[test]
    fn aspect_ratio_prompt_hint_reads_naturally() {
        assert_eq!(AspectRatio::Wide.prompt_hint(), " Aspect ratio 16 to 9.");
    }
}
