use crate::models::Locale;
use thiserror::Error;

/// Terminal error categories surfaced to the caller. Every failure anywhere
/// in the pipeline collapses into exactly one of these before leaving the
/// crate; the diagnostic payloads stay in logs.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StudioError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("rate limited{}", retry_suffix(.retry_after_secs))]
    RateLimited { retry_after_secs: Option<u64> },
    #[error("no API credential available")]
    MissingCredential,
    #[error("credential rejected: {0}")]
    AuthInvalid(String),
    #[error("network failure: {0}")]
    Network(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("blocked by safety filter: {0}")]
    ContentBlocked(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("response truncated")]
    ResponseTruncated,
    #[error("invalid response format: {0}")]
    InvalidFormat(String),
    #[error("schema validation failed: {0}")]
    SchemaInvalid(String),
    #[error("{0}")]
    Unknown(String),
}

fn retry_suffix(secs: &Option<u64>) -> String {
    match secs {
        Some(s) => format!(", retry after {s}s"),
        None => String::new(),
    }
}

/// Ordered marker groups for classifying opaque upstream error text.
/// Auth markers come first so a 401 never falls into a generic bucket.
const AUTH_MARKERS: &[&str] = &[
    "api key not valid",
    "api_key_invalid",
    "invalid api key",
    "invalid key",
    "expired key",
    "unauthorized",
    "unauthenticated",
    "permission denied",
    "401",
    "403",
];

const RATE_MARKERS: &[&str] = &[
    "quota",
    "rate limit",
    "resource_exhausted",
    "resource exhausted",
    "too many requests",
    "429",
];

const NETWORK_MARKERS: &[&str] = &[
    "econnreset",
    "econnrefused",
    "enotfound",
    "socket hang up",
    "dns",
    "fetch failed",
    "could not connect",
    "connection",
    "network",
];

const TIMEOUT_MARKERS: &[&str] = &["etimedout", "timed out", "timeout", "deadline exceeded"];

const SAFETY_MARKERS: &[&str] = &[
    "safety",
    "prohibited_content",
    "prohibited content",
    "blocked",
];

const SERVER_MARKERS: &[&str] = &[
    "503",
    "502",
    "504",
    "500",
    "service unavailable",
    "internal server error",
    "overloaded",
    "internal error",
];

fn matches_any(lower: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| lower.contains(m))
}

/// Map an opaque error message onto a category. Pure and deterministic;
/// returns the original message untouched when nothing matches.
pub fn classify_message(message: &str) -> StudioError {
    let lower = message.to_ascii_lowercase();
    if matches_any(&lower, AUTH_MARKERS) {
        StudioError::AuthInvalid(message.to_string())
    } else if matches_any(&lower, RATE_MARKERS) {
        StudioError::RateLimited {
            retry_after_secs: None,
        }
    } else if matches_any(&lower, NETWORK_MARKERS) {
        StudioError::Network(message.to_string())
    } else if matches_any(&lower, TIMEOUT_MARKERS) {
        StudioError::Timeout(message.to_string())
    } else if matches_any(&lower, SAFETY_MARKERS) {
        StudioError::ContentBlocked(message.to_string())
    } else if matches_any(&lower, SERVER_MARKERS) {
        StudioError::ServiceUnavailable(message.to_string())
    } else {
        StudioError::Unknown(message.to_string())
    }
}

impl StudioError {
    /// Transient failures are worth re-issuing; everything else is
    /// deterministic or cannot improve on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StudioError::Network(_)
            | StudioError::Timeout(_)
            | StudioError::ServiceUnavailable(_)
            | StudioError::RateLimited { .. } => true,
            StudioError::Unknown(msg) => {
                let lower = msg.to_ascii_lowercase();
                matches_any(&lower, NETWORK_MARKERS)
                    || matches_any(&lower, TIMEOUT_MARKERS)
                    || matches_any(&lower, SERVER_MARKERS)
                    || matches_any(&lower, RATE_MARKERS)
            }
            _ => false,
        }
    }

    /// The one sentence shown to the user, in their locale. Unknown errors
    /// pass their original message through unchanged.
    pub fn user_message(&self, locale: Locale) -> String {
        match (self, locale) {
            (StudioError::InvalidInput(_), Locale::En) => {
                "Invalid input. Please check your request and try again.".into()
            }
            (StudioError::InvalidInput(_), Locale::Ko) => {
                "입력값이 올바르지 않습니다. 요청을 확인한 뒤 다시 시도해 주세요.".into()
            }
            (
                StudioError::RateLimited {
                    retry_after_secs: Some(s),
                },
                Locale::En,
            ) => format!("Too many requests. Please retry in {s} seconds."),
            (
                StudioError::RateLimited {
                    retry_after_secs: Some(s),
                },
                Locale::Ko,
            ) => format!("요청이 너무 많습니다. {s}초 후에 다시 시도해 주세요."),
            (StudioError::RateLimited { .. }, Locale::En) => {
                "The rate limit has been reached. Please try again later.".into()
            }
            (StudioError::RateLimited { .. }, Locale::Ko) => {
                "요청 한도에 도달했습니다. 잠시 후 다시 시도해 주세요.".into()
            }
            (StudioError::MissingCredential, Locale::En) => {
                "No API key is configured. Add your Gemini API key and try again.".into()
            }
            (StudioError::MissingCredential, Locale::Ko) => {
                "API 키가 설정되지 않았습니다. Gemini API 키를 입력한 뒤 다시 시도해 주세요.".into()
            }
            (StudioError::AuthInvalid(_), Locale::En) => {
                "The API key is invalid or expired.".into()
            }
            (StudioError::AuthInvalid(_), Locale::Ko) => {
                "API 키가 유효하지 않거나 만료되었습니다.".into()
            }
            (StudioError::Network(_), Locale::En) => {
                "A network error occurred. Check your connection and try again.".into()
            }
            (StudioError::Network(_), Locale::Ko) => {
                "네트워크 오류가 발생했습니다. 연결 상태를 확인한 뒤 다시 시도해 주세요.".into()
            }
            (StudioError::Timeout(_), Locale::En) => {
                "The request timed out. Please try again.".into()
            }
            (StudioError::Timeout(_), Locale::Ko) => {
                "요청 시간이 초과되었습니다. 다시 시도해 주세요.".into()
            }
            (StudioError::ContentBlocked(_), Locale::En) => {
                "The request was blocked by the safety filter. Adjust the content and try again."
                    .into()
            }
            (StudioError::ContentBlocked(_), Locale::Ko) => {
                "안전 필터에 의해 요청이 차단되었습니다. 내용을 수정한 뒤 다시 시도해 주세요."
                    .into()
            }
            (StudioError::ServiceUnavailable(_), Locale::En) => {
                "The AI service is temporarily unavailable. Please try again shortly.".into()
            }
            (StudioError::ServiceUnavailable(_), Locale::Ko) => {
                "AI 서비스를 일시적으로 사용할 수 없습니다. 잠시 후 다시 시도해 주세요.".into()
            }
            (StudioError::ResponseTruncated, Locale::En) => {
                "The response was cut off. Try requesting fewer sizes at once.".into()
            }
            (StudioError::ResponseTruncated, Locale::Ko) => {
                "응답이 중간에 잘렸습니다. 한 번에 더 적은 사이즈를 요청해 보세요.".into()
            }
            (StudioError::InvalidFormat(_), Locale::En) => {
                "The AI response could not be understood. Please try again.".into()
            }
            (StudioError::InvalidFormat(_), Locale::Ko) => {
                "AI 응답을 해석할 수 없습니다. 다시 시도해 주세요.".into()
            }
            (StudioError::SchemaInvalid(_), Locale::En) => {
                "The AI response was incomplete. Please try again.".into()
            }
            (StudioError::SchemaInvalid(_), Locale::Ko) => {
                "AI 응답이 완전하지 않습니다. 다시 시도해 주세요.".into()
            }
            (StudioError::Unknown(msg), _) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn auth_markers_win_over_generic_status_markers() {
        // "401" appears in both an auth context and as a bare status; the
        // auth group is checked first.
        let err = classify_message("HTTP 401: unauthorized");
        assert!(matches!(err, StudioError::AuthInvalid(_)));
    }

    #[test]
    fn quota_text_classifies_as_rate_limited() {
        let err = classify_message("RESOURCE_EXHAUSTED: quota exceeded for model");
        assert!(matches!(err, StudioError::RateLimited { .. }));
    }

    #[test]
    fn connection_reset_classifies_as_network() {
        let err = classify_message("read ECONNRESET while talking to upstream");
        assert!(matches!(err, StudioError::Network(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn unmatched_message_passes_through_unchanged() {
        let err = classify_message("some entirely novel failure");
        assert_eq!(
            err,
            StudioError::Unknown("some entirely novel failure".to_string())
        );
        assert_eq!(
            err.user_message(Locale::Ko),
            "some entirely novel failure".to_string()
        );
    }

    #[test]
    fn auth_and_schema_failures_are_not_retryable() {
        assert!(!StudioError::AuthInvalid("401".into()).is_retryable());
        assert!(!StudioError::SchemaInvalid("bad".into()).is_retryable());
        assert!(!StudioError::MissingCredential.is_retryable());
        assert!(!StudioError::ContentBlocked("safety".into()).is_retryable());
        assert!(!StudioError::ResponseTruncated.is_retryable());
    }

    #[test]
    fn localization_is_deterministic_across_locales() {
        let err = classify_message("429 too many requests");
        let en = err.user_message(Locale::En);
        let ko = err.user_message(Locale::Ko);
        assert_ne!(en, ko);
        // Both render the same category.
        assert_eq!(en, err.user_message(Locale::En));
        assert_eq!(ko, err.user_message(Locale::Ko));
    }

    #[test]
    fn rate_limit_message_carries_retry_seconds() {
        let err = StudioError::RateLimited {
            retry_after_secs: Some(42),
        };
        assert!(err.user_message(Locale::En).contains("42"));
        assert!(err.user_message(Locale::Ko).contains("42"));
    }
}
