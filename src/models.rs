use serde::{Deserialize, Serialize};
use validator::Validate;

/// Target aspect-ratio / purpose tag for a generated asset.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ratio {
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "9:16")]
    Story,
    #[serde(rename = "4:5")]
    Portrait,
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "1:1-commercial")]
    Commercial,
}

impl Ratio {
    pub const ALL: [Ratio; 5] = [
        Ratio::Square,
        Ratio::Story,
        Ratio::Portrait,
        Ratio::Wide,
        Ratio::Commercial,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ratio::Square => "1:1",
            Ratio::Story => "9:16",
            Ratio::Portrait => "4:5",
            Ratio::Wide => "16:9",
            Ratio::Commercial => "1:1-commercial",
        }
    }

    /// Aspect ratio understood by the image model (the commercial studio
    /// variant renders on a square canvas).
    pub fn aspect(&self) -> &'static str {
        match self {
            Ratio::Square | Ratio::Commercial => "1:1",
            Ratio::Story => "9:16",
            Ratio::Portrait => "4:5",
            Ratio::Wide => "16:9",
        }
    }

    pub fn parse(s: &str) -> Option<Ratio> {
        Ratio::ALL.iter().copied().find(|r| r.as_str() == s)
    }
}

impl std::fmt::Display for Ratio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How multiple product shots are laid out inside one composition.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArrangementStyle {
    Single,
    Fan,
    Grid,
    Stack,
    Custom,
}

impl ArrangementStyle {
    pub fn parse(s: &str) -> Option<ArrangementStyle> {
        match s {
            "single" => Some(ArrangementStyle::Single),
            "fan" => Some(ArrangementStyle::Fan),
            "grid" => Some(ArrangementStyle::Grid),
            "stack" => Some(ArrangementStyle::Stack),
            "custom" => Some(ArrangementStyle::Custom),
            _ => None,
        }
    }
}

/// Output resolution level for rendered images.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum Resolution {
    #[default]
    #[serde(rename = "1K")]
    OneK,
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::OneK => "1K",
            Resolution::TwoK => "2K",
            Resolution::FourK => "4K",
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    Light,
    Regular,
    Bold,
    Black,
}

impl FontWeight {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontWeight::Light => "light",
            FontWeight::Regular => "regular",
            FontWeight::Bold => "bold",
            FontWeight::Black => "black",
        }
    }
}

/// User-facing language for error messages.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    Ko,
    #[default]
    En,
}

// --- Model outputs (produced by the generation calls, schema-checked) ---

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ProductAnalysis {
    pub name: String,
    pub visual_description: String,
    pub key_features: String,
}

/// One candidate marketing strategy from the first generation call.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Validate)]
pub struct MarketingRoute {
    #[validate(length(min = 1, message = "route_name is required"))]
    pub route_name: String,
    #[validate(length(min = 1, message = "headline is required"))]
    pub headline: String,
    #[validate(length(min = 1, message = "subhead is required"))]
    pub subhead: String,
    #[validate(length(min = 1, message = "style_brief is required"))]
    pub style_brief: String,
    #[validate(length(min = 1, message = "target_audience is required"))]
    pub target_audience: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DirectorOutput {
    pub product_analysis: ProductAnalysis,
    pub marketing_routes: Vec<MarketingRoute>,
}

/// One of three per-ratio content variants inside a plan. `id` follows the
/// `{ratio}_set{n}` convention by prompt instruction only.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContentSet {
    pub id: String,
    pub ratio: Ratio,
    pub size_label: String,
    pub set_number: u32,
    pub title: String,
    pub copy: String,
    pub visual_prompt_en: String,
    pub visual_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrangement_style: Option<ArrangementStyle>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ContentPlan {
    pub plan_name: String,
    pub selected_sizes: Vec<Ratio>,
    pub content_sets: Vec<ContentSet>,
}

// --- Request envelopes (one per operation, sent by the UI) ---

#[derive(Debug, Deserialize, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeRequest {
    #[validate(length(min = 1, message = "imageBase64 is required"))]
    pub image_base64: String,
    #[validate(length(min = 1, message = "imageMimeType is required"))]
    pub image_mime_type: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub product_info: String,
    #[serde(default)]
    pub product_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub locale: Locale,
}

#[derive(Debug, Deserialize, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    #[validate(nested)]
    pub route: MarketingRoute,
    pub product_analysis: ProductAnalysis,
    #[serde(default)]
    pub reference_copy: String,
    #[validate(length(min = 1, message = "selectedRatios must contain at least one size"))]
    pub selected_ratios: Vec<Ratio>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub locale: Locale,
}

#[derive(Debug, Deserialize, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GenerateImageRequest {
    #[validate(length(min = 1, message = "prompt is required"))]
    pub prompt: String,
    #[serde(default)]
    #[validate(custom(function = crate::validate::data_url))]
    pub reference_image: Option<String>,
    #[serde(default)]
    #[validate(custom(function = crate::validate::data_url))]
    pub secondary_image: Option<String>,
    #[serde(default = "default_ratio")]
    pub ratio: Ratio,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub locale: Locale,
}

#[derive(Debug, Deserialize, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegeneratePromptRequest {
    #[validate(length(min = 1, message = "title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "copy is required"))]
    pub copy: String,
    pub ratio: Ratio,
    #[validate(length(min = 1, message = "sizeLabel is required"))]
    pub size_label: String,
    #[serde(default)]
    pub visual_summary: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub locale: Locale,
}

#[derive(Debug, Deserialize, Clone, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceImageRequest {
    #[validate(
        length(min = 1, message = "productImage is required"),
        custom(function = crate::validate::data_url)
    )]
    pub product_image: String,
    #[validate(
        length(min = 1, message = "referenceImage is required"),
        custom(function = crate::validate::data_url)
    )]
    pub reference_image: String,
    /// How closely the result should follow the reference, 0-100.
    #[validate(range(min = 0, max = 100, message = "similarity must be between 0 and 100"))]
    pub similarity: u8,
    #[serde(default = "default_ratio")]
    pub ratio: Ratio,
    #[serde(default)]
    #[validate(custom(function = crate::validate::data_url))]
    pub brand_logo: Option<String>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub copy: String,
    #[serde(default)]
    pub show_text: bool,
    #[serde(default)]
    pub font_weights: Vec<FontWeight>,
    #[serde(default)]
    #[validate(custom(function = crate::validate::data_url))]
    pub secondary_product: Option<String>,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub locale: Locale,
}

fn default_ratio() -> Ratio {
    Ratio::Square
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn ratio_round_trips_through_serde() {
        for ratio in Ratio::ALL {
            let json = serde_json::to_string(&ratio).unwrap();
            assert_eq!(json, format!("\"{}\"", ratio.as_str()));
            let back: Ratio = serde_json::from_str(&json).unwrap();
            assert_eq!(back, ratio);
        }
    }

    #[test]
    fn ratio_parse_rejects_unknown_tags() {
        assert_eq!(Ratio::parse("1:1"), Some(Ratio::Square));
        assert_eq!(Ratio::parse("1:1-commercial"), Some(Ratio::Commercial));
        assert_eq!(Ratio::parse("3:4"), None);
    }

    #[test]
    fn commercial_renders_on_square_canvas() {
        assert_eq!(Ratio::Commercial.aspect(), "1:1");
        assert_eq!(Ratio::Story.aspect(), "9:16");
    }

    #[test]
    fn locale_defaults_to_english() {
        assert_eq!(Locale::default(), Locale::En);
    }

    #[test]
    fn analyze_request_accepts_empty_optional_fields() {
        let req: AnalyzeRequest = serde_json::from_value(serde_json::json!({
            "imageBase64": "aGVsbG8=",
            "imageMimeType": "image/png"
        }))
        .unwrap();
        assert_eq!(req.product_name, "");
        assert_eq!(req.locale, Locale::En);
    }

    #[test]
    fn content_set_deserializes_without_arrangement() {
        let set: ContentSet = serde_json::from_value(serde_json::json!({
            "id": "1:1_set1",
            "ratio": "1:1",
            "size_label": "Square feed",
            "set_number": 1,
            "title": "T",
            "copy": "C",
            "visual_prompt_en": "P",
            "visual_summary": ""
        }))
        .unwrap();
        assert_eq!(set.arrangement_style, None);
        assert_eq!(set.ratio, Ratio::Square);
    }
}
