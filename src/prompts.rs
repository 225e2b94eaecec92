//! Prompt templates for the generation calls. Kept as plain string
//! builders; the pipeline treats their output as opaque.

use crate::models::{FontWeight, MarketingRoute, ProductAnalysis, Ratio};

pub fn analysis_prompt(product_name: &str, product_info: &str, product_url: &str) -> String {
    let mut context = String::new();
    if !product_name.is_empty() {
        context.push_str(&format!("Product name: {product_name}. "));
    }
    if !product_info.is_empty() {
        context.push_str(&format!("Seller notes: {product_info}. "));
    }
    if !product_url.is_empty() {
        context.push_str(&format!("Product page: {product_url}. "));
    }
    format!(
        "You are a marketing creative director. Study the attached product photo. {context}\
        Respond with JSON only, no prose, in this exact shape: \
        {{\"product_analysis\": {{\"name\": string, \"visual_description\": string, \"key_features\": string}}, \
        \"marketing_routes\": [{{\"route_name\": string, \"headline\": string, \"subhead\": string, \
        \"style_brief\": string, \"target_audience\": string}}]}}. \
        Propose 3 distinct marketing routes (never more than 5), each with a clearly different angle. \
        All field values must be non-empty."
    )
}

pub fn plan_prompt(
    route: &MarketingRoute,
    analysis: &ProductAnalysis,
    reference_copy: &str,
    ratios: &[Ratio],
) -> String {
    let sizes = ratios
        .iter()
        .map(Ratio::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let reference = if reference_copy.is_empty() {
        String::new()
    } else {
        format!("Reference copy to echo in tone: {reference_copy}. ")
    };
    format!(
        "You are a marketing content planner. Product: {name} ({visual}). Key features: {features}. \
        Chosen strategy route \"{route_name}\": headline \"{headline}\", subhead \"{subhead}\", \
        style brief \"{style_brief}\", target audience \"{audience}\". {reference}\
        Build a content plan for these sizes: {sizes}. For EVERY size produce exactly 3 content sets, \
        numbered set_number 1 to 3, with id \"<ratio>_set<n>\". \
        Respond with JSON only in this exact shape: \
        {{\"plan_name\": string, \"selected_sizes\": [ratio strings], \"content_sets\": \
        [{{\"id\": string, \"ratio\": string, \"size_label\": string, \"set_number\": number, \
        \"title\": string, \"copy\": string, \"visual_prompt_en\": string, \"visual_summary\": string, \
        \"arrangement_style\": one of \"single\"|\"fan\"|\"grid\"|\"stack\"|\"custom\" (optional)}}]}}. \
        visual_prompt_en must be a production-ready English image prompt; visual_summary a one-line \
        summary of the composition.",
        name = analysis.name,
        visual = analysis.visual_description,
        features = analysis.key_features,
        route_name = route.route_name,
        headline = route.headline,
        subhead = route.subhead,
        style_brief = route.style_brief,
        audience = route.target_audience,
    )
}

pub fn regenerate_visual_prompt(
    title: &str,
    copy: &str,
    ratio: Ratio,
    size_label: &str,
    visual_summary: &str,
) -> String {
    let summary = if visual_summary.is_empty() {
        String::new()
    } else {
        format!("Current composition: {visual_summary}. ")
    };
    format!(
        "Write one production-ready English image-generation prompt for a {ratio} marketing visual \
        (\"{size_label}\"). Title on the creative: \"{title}\". Copy: \"{copy}\". {summary}\
        Describe scene, lighting, mood and composition. Respond with the prompt text only, \
        no JSON, no markdown."
    )
}

pub fn image_prompt(base_prompt: &str, ratio: Ratio) -> String {
    format!(
        "{base_prompt} Compose for a {ratio} marketing asset. High production value, \
        clean lighting, no watermark."
    )
}

#[allow(clippy::too_many_arguments)]
pub fn reference_image_prompt(
    similarity: u8,
    title: &str,
    copy: &str,
    show_text: bool,
    font_weights: &[FontWeight],
    has_logo: bool,
    has_secondary: bool,
    ratio: Ratio,
) -> String {
    let mut out = format!(
        "Recreate the reference image's style for the attached product photo. \
        Follow the reference composition at {similarity}% fidelity: below 50, keep only the \
        broad mood; above 80, match layout, palette and lighting closely. \
        Target a {ratio} marketing asset."
    );
    if has_secondary {
        out.push_str(" A secondary product shot is attached; feature both products together.");
    }
    if has_logo {
        out.push_str(" Place the attached brand logo naturally, small and legible.");
    }
    if show_text {
        let weights = if font_weights.is_empty() {
            "regular".to_string()
        } else {
            font_weights
                .iter()
                .map(FontWeight::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        };
        out.push_str(&format!(
            " Render the title \"{title}\" and copy \"{copy}\" on the image using {weights} weight \
            typography, well kerned, never distorted."
        ));
    } else {
        out.push_str(" Do not render any text on the image.");
    }
    out
}
