//! Trust-assertion verification for the rate-gate bypass.
//!
//! Callers that reached us through the zero-trust access gateway carry a
//! signed JWT assertion. Verifying it against the team domain's published
//! key set proves the identity was already established upstream, so the
//! request is exempt from throttling. The key set is cached with a TTL so a
//! key rotation cannot be served stale forever.

use crate::config::TrustConfig;
use async_trait::async_trait;
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A verified caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub subject: String,
    pub email: Option<String>,
}

/// Seam for the pipeline: production verifies against the access gateway's
/// key set, tests substitute a stub.
#[async_trait]
pub trait TrustVerifier: Send + Sync {
    /// `Some(principal)` when the assertion checks out; `None` sends the
    /// caller through the ordinary rate counter instead.
    async fn verify(&self, assertion: &str) -> Option<Principal>;
}

#[derive(Debug, Deserialize)]
struct AccessClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
}

struct CachedKeys {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// Verifies Cloudflare-Access-style assertions against
/// `https://<team-domain>/cdn-cgi/access/certs`.
pub struct AccessVerifier {
    config: TrustConfig,
    http: Client,
    cache: RwLock<Option<CachedKeys>>,
    cache_ttl: Duration,
}

impl AccessVerifier {
    pub fn new(config: TrustConfig) -> Self {
        Self {
            config,
            http: Client::new(),
            cache: RwLock::new(None),
            cache_ttl: Duration::from_secs(3600),
        }
    }

    fn certs_url(&self) -> String {
        format!("https://{}/cdn-cgi/access/certs", self.config.team_domain)
    }

    fn issuer(&self) -> String {
        format!("https://{}", self.config.team_domain)
    }

    async fn key_set(&self) -> Option<JwkSet> {
        {
            let cached = self.cache.read();
            if let Some(keys) = cached.as_ref() {
                if keys.fetched_at.elapsed() < self.cache_ttl {
                    return Some(keys.jwks.clone());
                }
            }
        }

        let url = self.certs_url();
        debug!(%url, "fetching trust key set");
        let response = match self.http.get(&url).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "trust key set fetch failed");
                return None;
            }
        };
        if !response.status().is_success() {
            warn!(status = %response.status(), "trust key set fetch rejected");
            return None;
        }
        let jwks: JwkSet = match response.json().await {
            Ok(j) => j,
            Err(e) => {
                warn!(error = %e, "trust key set unparsable");
                return None;
            }
        };
        info!(keys = jwks.keys.len(), "loaded trust key set");
        // Whole-object replacement; readers either see the old set or the new.
        *self.cache.write() = Some(CachedKeys {
            jwks: jwks.clone(),
            fetched_at: Instant::now(),
        });
        Some(jwks)
    }
}

#[async_trait]
impl TrustVerifier for AccessVerifier {
    async fn verify(&self, assertion: &str) -> Option<Principal> {
        let header = match decode_header(assertion) {
            Ok(h) => h,
            Err(e) => {
                debug!(error = %e, "assertion header undecodable");
                return None;
            }
        };
        let kid = header.kid?;
        let jwks = self.key_set().await?;
        let jwk = jwks.find(&kid)?;
        let key = match DecodingKey::from_jwk(jwk) {
            Ok(k) => k,
            Err(e) => {
                debug!(error = %e, "key in trust set unusable");
                return None;
            }
        };

        let mut validation = Validation::new(header.alg);
        validation.set_audience(&[&self.config.audience]);
        validation.set_issuer(&[self.issuer()]);

        match decode::<AccessClaims>(assertion, &key, &validation) {
            Ok(token) => {
                debug!(subject = %token.claims.sub, "trusted caller verified");
                Some(Principal {
                    subject: token.claims.sub,
                    email: token.claims.email,
                })
            }
            Err(e) => {
                debug!(error = %e, "assertion rejected");
                None
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Stub verifier: accepts exactly one assertion string.
    pub struct StaticVerifier {
        pub accept: String,
        pub principal: Principal,
    }

    impl StaticVerifier {
        pub fn accepting(assertion: &str) -> Self {
            Self {
                accept: assertion.to_string(),
                principal: Principal {
                    subject: "stub-subject".to_string(),
                    email: Some("trusted@example.com".to_string()),
                },
            }
        }
    }

    #[async_trait]
    impl TrustVerifier for StaticVerifier {
        async fn verify(&self, assertion: &str) -> Option<Principal> {
            (assertion == self.accept).then(|| self.principal.clone())
        }
    }
}
