use crate::config::Config;
use crate::error::StudioError;
use crate::gate::{is_local_client, RateLimiter};
use crate::gemini::{
    resolve_credential, to_data_url, GenerationBackend, ImagePrompt, InlinePart, TextPrompt,
};
use crate::models::{
    AnalyzeRequest, ContentPlan, DirectorOutput, GenerateImageRequest, PlanRequest,
    RegeneratePromptRequest, ReferenceImageRequest,
};
use crate::retry::RetryPolicy;
use crate::trust::TrustVerifier;
use crate::{gemini, prompts, repair, schema, validate};
use std::sync::Arc;
use tracing::info;

/// Per-request caller context extracted at the HTTP boundary.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_id: String,
    pub trust_assertion: Option<String>,
}

/// The orchestration core. Each operation runs the same pipeline: validate
/// the envelope, pass the trust/rate gate, call the model under retry,
/// parse/repair, schema-check, return typed output. Errors surface as
/// `StudioError` categories; the HTTP layer localizes them.
pub struct Studio {
    config: Config,
    backend: Arc<dyn GenerationBackend>,
    limiter: RateLimiter,
    verifier: Option<Arc<dyn TrustVerifier>>,
    retry: RetryPolicy,
}

impl Studio {
    pub fn new(
        config: Config,
        backend: Arc<dyn GenerationBackend>,
        verifier: Option<Arc<dyn TrustVerifier>>,
    ) -> Self {
        let limiter = RateLimiter::new(config.rate_limit.clone());
        Self {
            config,
            backend,
            limiter,
            verifier,
            retry: RetryPolicy::default(),
        }
    }

    pub fn has_server_credential(&self) -> bool {
        self.config.has_server_credential()
    }

    /// Trust/rate gate. Only the server-shared credential path is counted:
    /// deployments without a shared key never throttle, verified trusted
    /// callers and loopback clients bypass the counter.
    async fn guard(&self, ctx: &RequestContext) -> Result<(), StudioError> {
        if !self.config.has_server_credential() {
            return Ok(());
        }
        if let (Some(verifier), Some(assertion)) = (&self.verifier, &ctx.trust_assertion) {
            if let Some(principal) = verifier.verify(assertion).await {
                info!(
                    subject = %principal.subject,
                    email = ?principal.email,
                    "trusted caller, skipping rate limit"
                );
                return Ok(());
            }
        }
        if is_local_client(&ctx.client_id) {
            return Ok(());
        }
        let decision = self.limiter.check(&ctx.client_id);
        if !decision.allowed {
            return Err(StudioError::RateLimited {
                retry_after_secs: Some(decision.retry_after_secs),
            });
        }
        if let Some(remaining) = decision.remaining {
            info!(client = %ctx.client_id, remaining, "rate gate passed");
        }
        Ok(())
    }

    fn credential(&self, caller_key: Option<&str>) -> Result<String, StudioError> {
        resolve_credential(self.config.api_key.as_deref(), caller_key)
    }

    /// First call: product photo in, analysis plus 1-5 marketing routes out.
    pub async fn analyze_product(
        &self,
        ctx: &RequestContext,
        request: AnalyzeRequest,
    ) -> Result<DirectorOutput, StudioError> {
        validate::check(&request)?;
        self.guard(ctx).await?;
        let credential = self.credential(request.api_key.as_deref())?;

        let text_request = TextPrompt {
            prompt: prompts::analysis_prompt(
                &request.product_name,
                &request.product_info,
                &request.product_url,
            ),
            images: vec![InlinePart {
                mime_type: request.image_mime_type.clone(),
                data: request.image_base64.clone(),
            }],
        };

        info!("🎬 analyzing product photo");
        let raw = self
            .retry
            .execute(|| self.backend.generate_text(&credential, &text_request))
            .await?;
        let value = repair::parse_model_json(&raw)?;
        let output = schema::validate_director_output(&value)?;
        info!(routes = output.marketing_routes.len(), "✅ analysis complete");
        Ok(output)
    }

    /// Second call: chosen route expanded into 3 content sets per size.
    pub async fn plan_content(
        &self,
        ctx: &RequestContext,
        request: PlanRequest,
    ) -> Result<ContentPlan, StudioError> {
        validate::check(&request)?;
        self.guard(ctx).await?;
        let credential = self.credential(request.api_key.as_deref())?;

        let text_request = TextPrompt {
            prompt: prompts::plan_prompt(
                &request.route,
                &request.product_analysis,
                &request.reference_copy,
                &request.selected_ratios,
            ),
            images: Vec::new(),
        };

        info!(sizes = request.selected_ratios.len(), "🗂️ planning content");
        let raw = self
            .retry
            .execute(|| self.backend.generate_text(&credential, &text_request))
            .await?;
        let value = repair::parse_model_json(&raw)?;
        let plan = schema::validate_content_plan(&value)?;
        info!(sets = plan.content_sets.len(), "✅ plan complete");
        Ok(plan)
    }

    /// Render one marketing image; returns a base64 data URL.
    pub async fn generate_image(
        &self,
        ctx: &RequestContext,
        request: GenerateImageRequest,
    ) -> Result<String, StudioError> {
        validate::check(&request)?;
        self.guard(ctx).await?;
        let credential = self.credential(request.api_key.as_deref())?;

        let mut images = Vec::new();
        for data_url in [&request.reference_image, &request.secondary_image]
            .into_iter()
            .flatten()
        {
            images.push(gemini::parse_data_url(data_url)?);
        }

        let image_request = ImagePrompt {
            prompt: prompts::image_prompt(&request.prompt, request.ratio),
            images,
            ratio: request.ratio,
            resolution: request.resolution,
        };

        info!(ratio = %request.ratio, "🖼️ generating image");
        let image = self
            .retry
            .execute(|| self.backend.generate_image(&credential, &image_request))
            .await?;
        Ok(to_data_url(&image.mime_type, &image.data))
    }

    /// Regenerate just the English visual prompt of one content set. The
    /// model answers in plain text; only fence stripping applies.
    pub async fn regenerate_visual_prompt(
        &self,
        ctx: &RequestContext,
        request: RegeneratePromptRequest,
    ) -> Result<String, StudioError> {
        validate::check(&request)?;
        self.guard(ctx).await?;
        let credential = self.credential(request.api_key.as_deref())?;

        let text_request = TextPrompt {
            prompt: prompts::regenerate_visual_prompt(
                &request.title,
                &request.copy,
                request.ratio,
                &request.size_label,
                &request.visual_summary,
            ),
            images: Vec::new(),
        };

        let raw = self
            .retry
            .execute(|| self.backend.generate_text(&credential, &text_request))
            .await?;
        let prompt = repair::strip_code_fences(&raw).trim().to_string();
        if prompt.is_empty() {
            return Err(StudioError::InvalidFormat(
                "model returned an empty prompt".to_string(),
            ));
        }
        Ok(prompt)
    }

    /// Style-transfer render: recreate a reference image's look around the
    /// product photo; returns a base64 data URL.
    pub async fn generate_image_from_reference(
        &self,
        ctx: &RequestContext,
        request: ReferenceImageRequest,
    ) -> Result<String, StudioError> {
        validate::check(&request)?;
        self.guard(ctx).await?;
        let credential = self.credential(request.api_key.as_deref())?;

        let mut images = vec![
            gemini::parse_data_url(&request.product_image)?,
            gemini::parse_data_url(&request.reference_image)?,
        ];
        if let Some(secondary) = &request.secondary_product {
            images.push(gemini::parse_data_url(secondary)?);
        }
        if let Some(logo) = &request.brand_logo {
            images.push(gemini::parse_data_url(logo)?);
        }

        let image_request = ImagePrompt {
            prompt: prompts::reference_image_prompt(
                request.similarity,
                &request.title,
                &request.copy,
                request.show_text,
                &request.font_weights,
                request.brand_logo.is_some(),
                request.secondary_product.is_some(),
                request.ratio,
            ),
            images,
            ratio: request.ratio,
            resolution: request.resolution,
        };

        info!(
            similarity = request.similarity,
            ratio = %request.ratio,
            "🎨 generating from reference"
        );
        let image = self
            .retry
            .execute(|| self.backend.generate_image(&credential, &image_request))
            .await?;
        Ok(to_data_url(&image.mime_type, &image.data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::error::StudioError;
    use crate::gemini::GeneratedImage;
    use crate::models::{Locale, Ratio};
    use crate::trust::testing::StaticVerifier;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    const DIRECTOR_JSON: &str = "```json\n{\"product_analysis\":{\"name\":\"X\",\"visual_description\":\"Y\",\"key_features\":\"Z\"},\"marketing_routes\":[{\"route_name\":\"A\",\"headline\":\"H\",\"subhead\":\"S\",\"style_brief\":\"B\",\"target_audience\":\"T\"}]}\n```";

    struct StubBackend {
        text: String,
        calls: AtomicU32,
    }

    impl StubBackend {
        fn returning(text: &str) -> Self {
            Self {
                text: text.to_string(),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl GenerationBackend for StubBackend {
        async fn generate_text(
            &self,
            _credential: &str,
            _request: &TextPrompt,
        ) -> Result<String, StudioError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(self.text.clone())
        }

        async fn generate_image(
            &self,
            _credential: &str,
            _request: &ImagePrompt,
        ) -> Result<GeneratedImage, StudioError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(GeneratedImage {
                mime_type: "image/png".to_string(),
                data: "iVBORw0KGgo=".to_string(),
            })
        }
    }

    fn server_config(max_requests: u32) -> Config {
        Config {
            api_key: Some("server-key".to_string()),
            rate_limit: RateLimitConfig {
                enabled: true,
                window: Duration::from_millis(60_000),
                max_requests,
            },
            ..Config::default()
        }
    }

    fn analyze_request() -> AnalyzeRequest {
        serde_json::from_value(serde_json::json!({
            "imageBase64": "aGVsbG8=",
            "imageMimeType": "image/png",
            "productName": "",
            "productInfo": "",
            "productUrl": ""
        }))
        .unwrap()
    }

    fn ctx(client: &str) -> RequestContext {
        RequestContext {
            client_id: client.to_string(),
            trust_assertion: None,
        }
    }

    #[tokio::test]
    async fn analyze_runs_the_whole_pipeline() {
        let studio = Studio::new(
            server_config(10),
            Arc::new(StubBackend::returning(DIRECTOR_JSON)),
            None,
        );
        let output = studio
            .analyze_product(&ctx("203.0.113.5"), analyze_request())
            .await
            .unwrap();
        assert_eq!(output.marketing_routes.len(), 1);
        assert_eq!(output.product_analysis.name, "X");
    }

    #[tokio::test]
    async fn invalid_input_fails_before_any_model_call() {
        let backend = Arc::new(StubBackend::returning(DIRECTOR_JSON));
        let studio = Studio::new(server_config(10), Arc::clone(&backend) as _, None);
        let mut request = analyze_request();
        request.image_base64 = String::new();
        let err = studio
            .analyze_product(&ctx("203.0.113.5"), request)
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::InvalidInput(_)));
        assert_eq!(backend.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn rate_gate_denies_after_limit_with_retry_seconds() {
        let studio = Studio::new(
            server_config(2),
            Arc::new(StubBackend::returning(DIRECTOR_JSON)),
            None,
        );
        let ctx = ctx("198.51.100.20");
        for _ in 0..2 {
            studio
                .analyze_product(&ctx, analyze_request())
                .await
                .unwrap();
        }
        let err = studio
            .analyze_product(&ctx, analyze_request())
            .await
            .unwrap_err();
        let StudioError::RateLimited { retry_after_secs } = err else {
            panic!("expected RateLimited");
        };
        assert!(retry_after_secs.unwrap() >= 1);
        // The localized message carries the retry hint in both locales.
        let err = StudioError::RateLimited { retry_after_secs };
        assert!(err.user_message(Locale::En).to_lowercase().contains("retry"));
    }

    #[tokio::test]
    async fn trusted_assertion_bypasses_the_counter() {
        let studio = Studio::new(
            server_config(1),
            Arc::new(StubBackend::returning(DIRECTOR_JSON)),
            Some(Arc::new(StaticVerifier::accepting("good-token"))),
        );
        let trusted = RequestContext {
            client_id: "198.51.100.30".to_string(),
            trust_assertion: Some("good-token".to_string()),
        };
        // Far past the numeric limit, every call still succeeds.
        for _ in 0..5 {
            studio
                .analyze_product(&trusted, analyze_request())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn unverifiable_assertion_still_counts_against_the_window() {
        let studio = Studio::new(
            server_config(1),
            Arc::new(StubBackend::returning(DIRECTOR_JSON)),
            Some(Arc::new(StaticVerifier::accepting("good-token"))),
        );
        let untrusted = RequestContext {
            client_id: "198.51.100.31".to_string(),
            trust_assertion: Some("forged-token".to_string()),
        };
        studio
            .analyze_product(&untrusted, analyze_request())
            .await
            .unwrap();
        let err = studio
            .analyze_product(&untrusted, analyze_request())
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::RateLimited { .. }));
    }

    #[tokio::test]
    async fn loopback_clients_are_never_throttled() {
        let studio = Studio::new(
            server_config(1),
            Arc::new(StubBackend::returning(DIRECTOR_JSON)),
            None,
        );
        for _ in 0..4 {
            studio
                .analyze_product(&ctx("127.0.0.1"), analyze_request())
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn no_server_credential_means_no_throttling_but_key_required() {
        let config = Config {
            api_key: None,
            ..server_config(1)
        };
        let studio = Studio::new(
            config,
            Arc::new(StubBackend::returning(DIRECTOR_JSON)),
            None,
        );

        // Without any key the call fails fast with MissingCredential.
        let err = studio
            .analyze_product(&ctx("198.51.100.40"), analyze_request())
            .await
            .unwrap_err();
        assert_eq!(err, StudioError::MissingCredential);

        // With a caller key, repeated calls pass: the gate is bypassed.
        for _ in 0..3 {
            let mut request = analyze_request();
            request.api_key = Some("caller-key".to_string());
            studio
                .analyze_product(&ctx("198.51.100.40"), request)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn truncated_model_output_surfaces_as_truncated() {
        let studio = Studio::new(
            server_config(10),
            Arc::new(StubBackend::returning("{\"product_analysis\": {\"name\": \"X\",")),
            None,
        );
        let err = studio
            .analyze_product(&ctx("203.0.113.6"), analyze_request())
            .await
            .unwrap_err();
        assert_eq!(err, StudioError::ResponseTruncated);
    }

    #[tokio::test]
    async fn non_conforming_model_output_surfaces_as_schema_invalid() {
        let studio = Studio::new(
            server_config(10),
            Arc::new(StubBackend::returning(
                "{\"product_analysis\":{\"name\":\"X\",\"visual_description\":\"Y\",\"key_features\":\"Z\"},\"marketing_routes\":[]}",
            )),
            None,
        );
        let err = studio
            .analyze_product(&ctx("203.0.113.7"), analyze_request())
            .await
            .unwrap_err();
        assert!(matches!(err, StudioError::SchemaInvalid(_)));
    }

    #[tokio::test]
    async fn generate_image_returns_a_data_url() {
        let studio = Studio::new(
            server_config(10),
            Arc::new(StubBackend::returning("")),
            None,
        );
        let request: GenerateImageRequest = serde_json::from_value(serde_json::json!({
            "prompt": "tumbler on a desk",
            "ratio": "9:16"
        }))
        .unwrap();
        let url = studio
            .generate_image(&ctx("203.0.113.8"), request)
            .await
            .unwrap();
        assert_eq!(url, "data:image/png;base64,iVBORw0KGgo=");
    }

    #[tokio::test]
    async fn regenerated_prompt_is_fence_stripped_plain_text() {
        let studio = Studio::new(
            server_config(10),
            Arc::new(StubBackend::returning(
                "```\nA matte tumbler on warm oak, morning light.\n```",
            )),
            None,
        );
        let request: RegeneratePromptRequest = serde_json::from_value(serde_json::json!({
            "title": "Stay warm",
            "copy": "All day heat",
            "ratio": "4:5",
            "sizeLabel": "Feed portrait"
        }))
        .unwrap();
        let prompt = studio
            .regenerate_visual_prompt(&ctx("203.0.113.9"), request)
            .await
            .unwrap();
        assert_eq!(prompt, "A matte tumbler on warm oak, morning light.");
    }

    #[tokio::test]
    async fn plan_content_round_trips_through_schema() {
        let plan_json = serde_json::json!({
            "plan_name": "Launch",
            "selected_sizes": ["1:1", "9:16"],
            "content_sets": (1..=3).flat_map(|n| {
                ["1:1", "9:16"].into_iter().map(move |r| serde_json::json!({
                    "id": format!("{r}_set{n}"),
                    "ratio": r,
                    "size_label": "Label",
                    "set_number": n,
                    "title": "T",
                    "copy": "C",
                    "visual_prompt_en": "P",
                    "visual_summary": "S"
                }))
            }).collect::<Vec<_>>()
        });
        let studio = Studio::new(
            server_config(10),
            Arc::new(StubBackend::returning(&plan_json.to_string())),
            None,
        );
        let request: PlanRequest = serde_json::from_value(serde_json::json!({
            "route": {
                "route_name": "A", "headline": "H", "subhead": "S",
                "style_brief": "B", "target_audience": "T"
            },
            "productAnalysis": {
                "name": "X", "visual_description": "Y", "key_features": "Z"
            },
            "selectedRatios": ["1:1", "9:16"]
        }))
        .unwrap();
        let plan = studio
            .plan_content(&ctx("203.0.113.10"), request)
            .await
            .unwrap();
        assert_eq!(plan.content_sets.len(), 6);
        assert_eq!(plan.selected_sizes, vec![Ratio::Square, Ratio::Story]);
    }
}
