use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::StudioError;
use crate::gate;
use crate::models::{
    AnalyzeRequest, GenerateImageRequest, Locale, PlanRequest, RegeneratePromptRequest,
    ReferenceImageRequest,
};
use crate::studio::{RequestContext, Studio};

#[derive(Clone)]
pub struct AppState {
    pub studio: Arc<Studio>,
}

/// Envelope for successful responses.
#[derive(Debug, Serialize)]
struct Generated<T> {
    request_id: Uuid,
    generated_at: DateTime<Utc>,
    result: T,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn success<T: Serialize>(result: T) -> Response {
    Json(Generated {
        request_id: Uuid::new_v4(),
        generated_at: Utc::now(),
        result,
    })
    .into_response()
}

/// One localized sentence out; the category detail stays in logs.
fn failure(err: &StudioError, locale: Locale) -> Response {
    tracing::warn!(error = %err, "request failed");
    let status = match err {
        StudioError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        StudioError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        StudioError::MissingCredential | StudioError::AuthInvalid(_) => StatusCode::UNAUTHORIZED,
        StudioError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        StudioError::ContentBlocked(_) | StudioError::ResponseTruncated => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        StudioError::Network(_)
        | StudioError::InvalidFormat(_)
        | StudioError::SchemaInvalid(_) => StatusCode::BAD_GATEWAY,
        StudioError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        StudioError::Unknown(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorBody {
            error: err.user_message(locale),
        }),
    )
        .into_response()
}

/// Caller identity as seen through the proxy stack.
fn context_from(headers: &HeaderMap) -> RequestContext {
    let get = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    RequestContext {
        client_id: gate::derive_client_id(
            get("cf-connecting-ip"),
            get("x-forwarded-for"),
            get("x-real-ip"),
        ),
        trust_assertion: get("cf-access-jwt-assertion").map(str::to_string),
    }
}

pub async fn analyze(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AnalyzeRequest>,
) -> Response {
    let ctx = context_from(&headers);
    let locale = body.locale;
    match state.studio.analyze_product(&ctx, body).await {
        Ok(output) => success(output),
        Err(err) => failure(&err, locale),
    }
}

pub async fn plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PlanRequest>,
) -> Response {
    let ctx = context_from(&headers);
    let locale = body.locale;
    match state.studio.plan_content(&ctx, body).await {
        Ok(plan) => success(plan),
        Err(err) => failure(&err, locale),
    }
}

pub async fn generate_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<GenerateImageRequest>,
) -> Response {
    let ctx = context_from(&headers);
    let locale = body.locale;
    match state.studio.generate_image(&ctx, body).await {
        Ok(data_url) => success(data_url),
        Err(err) => failure(&err, locale),
    }
}

pub async fn regenerate_prompt(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RegeneratePromptRequest>,
) -> Response {
    let ctx = context_from(&headers);
    let locale = body.locale;
    match state.studio.regenerate_visual_prompt(&ctx, body).await {
        Ok(prompt) => success(prompt),
        Err(err) => failure(&err, locale),
    }
}

pub async fn generate_from_reference(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ReferenceImageRequest>,
) -> Response {
    let ctx = context_from(&headers);
    let locale = body.locale;
    match state.studio.generate_image_from_reference(&ctx, body).await {
        Ok(data_url) => success(data_url),
        Err(err) => failure(&err, locale),
    }
}

#[derive(Debug, Serialize)]
pub struct CredentialStatus {
    has_server_credential: bool,
}

pub async fn credential_status(State(state): State<AppState>) -> Json<CredentialStatus> {
    Json(CredentialStatus {
        has_server_credential: state.studio.has_server_credential(),
    })
}

pub async fn health() -> &'static str {
    "ok"
}
