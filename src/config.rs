use std::time::Duration;
use tracing::warn;

const DEFAULT_TEXT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image";
const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Fixed-window limiter knobs. Applied only to requests riding on the
/// server-shared credential.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub window: Duration,
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_millis(60_000),
            max_requests: 10,
        }
    }
}

/// Zero-trust gateway settings for the trusted-caller bypass.
#[derive(Debug, Clone)]
pub struct TrustConfig {
    /// Team domain, e.g. `mycompany.cloudflareaccess.com`.
    pub team_domain: String,
    /// Expected application audience tag.
    pub audience: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Server-shared Gemini credential. Absent means callers must bring
    /// their own key and the rate gate is bypassed entirely.
    pub api_key: Option<String>,
    pub api_base: String,
    pub text_model: String,
    pub image_model: String,
    /// Thinking budget in tokens for the text model; 0 disables thinking.
    pub thinking_budget: u32,
    pub max_output_tokens: u32,
    pub request_timeout: Duration,
    pub rate_limit: RateLimitConfig,
    pub trust: Option<TrustConfig>,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base: DEFAULT_API_BASE.to_string(),
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            thinking_budget: 0,
            max_output_tokens: 8192,
            request_timeout: Duration::from_secs(120),
            rate_limit: RateLimitConfig::default(),
            trust: None,
            port: 8080,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Config::default();

        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|v| !v.trim().is_empty());

        let trust = match (
            std::env::var("ACCESS_TEAM_DOMAIN").ok().filter(|v| !v.is_empty()),
            std::env::var("ACCESS_AUDIENCE").ok().filter(|v| !v.is_empty()),
        ) {
            (Some(team_domain), Some(audience)) => Some(TrustConfig {
                team_domain,
                audience,
            }),
            _ => None,
        };

        Self {
            api_key,
            api_base: std::env::var("GEMINI_API_BASE")
                .unwrap_or_else(|_| defaults.api_base.clone()),
            text_model: std::env::var("GEMINI_TEXT_MODEL")
                .unwrap_or_else(|_| defaults.text_model.clone()),
            image_model: std::env::var("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|_| defaults.image_model.clone()),
            thinking_budget: env_clamped("GEMINI_THINKING_BUDGET", 0, 0, 24_576),
            max_output_tokens: env_clamped("GEMINI_MAX_OUTPUT_TOKENS", 8192, 1, 65_536),
            request_timeout: Duration::from_secs(u64::from(env_clamped(
                "REQUEST_TIMEOUT_SECS",
                120,
                1,
                600,
            ))),
            rate_limit: RateLimitConfig {
                enabled: std::env::var("RATE_LIMIT_ENABLED")
                    .map(|v| v != "false" && v != "0")
                    .unwrap_or(true),
                window: Duration::from_millis(u64::from(env_clamped(
                    "RATE_LIMIT_WINDOW_MS",
                    60_000,
                    1_000,
                    3_600_000,
                ))),
                max_requests: env_clamped("RATE_LIMIT_MAX_REQUESTS", 10, 1, 10_000),
            },
            trust,
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
        }
    }

    pub fn has_server_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Parse a numeric env var, clamping out-of-range values back into bounds.
fn env_clamped(name: &str, default: u32, min: u32, max: u32) -> u32 {
    match std::env::var(name) {
        Ok(raw) => match raw.parse::<u32>() {
            Ok(v) if v >= min && v <= max => v,
            Ok(v) => {
                let clamped = v.clamp(min, max);
                warn!(%name, value = v, clamped, "config value out of range, clamping");
                clamped
            }
            Err(_) => {
                warn!(%name, raw = %raw, default, "config value not numeric, using default");
                default
            }
        },
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.rate_limit.max_requests, 10);
        assert_eq!(config.rate_limit.window, Duration::from_millis(60_000));
        assert!(config.rate_limit.enabled);
        assert!(!config.has_server_credential());
        assert_eq!(config.text_model, "gemini-2.5-flash");
    }

    #[test]
    fn env_clamped_bounds_values() {
        // No var set: default.
        assert_eq!(env_clamped("CS_TEST_UNSET_VAR", 7, 1, 10), 7);

        std::env::set_var("CS_TEST_CLAMP_VAR", "99999");
        assert_eq!(env_clamped("CS_TEST_CLAMP_VAR", 7, 1, 10), 10);

        std::env::set_var("CS_TEST_CLAMP_VAR", "not-a-number");
        assert_eq!(env_clamped("CS_TEST_CLAMP_VAR", 7, 1, 10), 7);

        std::env::remove_var("CS_TEST_CLAMP_VAR");
    }
}
