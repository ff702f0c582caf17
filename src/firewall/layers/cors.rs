// src/firewall/layers/cors.rs
use axum::http::StatusCode;

use crate::config::FirewallConfig;
use crate::firewall::context::RequestContext;
use crate::firewall::verdict::{LayerId, Reason, Verdict, VerdictData};
use crate::utils::patterns::glob_match;

const LAYER: LayerId = LayerId::Cors;

pub struct CorsPolicy {
    allowed_origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            allowed_origins: config.cors_allowed_origins.clone(),
        }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed_origins
            .iter()
            .any(|allowed| allowed == "*" || allowed == origin || glob_match(allowed, origin))
    }

    pub fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        let Some(origin) = ctx.header("origin").filter(|o| !o.is_empty()) else {
            return Verdict::allow_because(LAYER, Reason::SameOrigin);
        };

        if self.is_allowed(origin) {
            return Verdict::allow(LAYER).with_data(VerdictData::Origin(origin.to_string()));
        }

        tracing::warn!(ip = %ctx.ip, origin, "Blocked cross-origin request");
        Verdict::deny(LAYER, Reason::OriginNotAllowed, StatusCode::FORBIDDEN, "Origin not allowed")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::testing::RequestBuilder;

    fn policy(origins: &[&str]) -> CorsPolicy {
        CorsPolicy::new(&FirewallConfig {
            cors_allowed_origins: origins.iter().map(|o| o.to_string()).collect(),
            ..FirewallConfig::default()
        })
    }

    #[test]
    fn test_no_origin_is_same_origin() {
        let verdict = policy(&[]).evaluate(&RequestBuilder::get("/").build());
        assert_eq!(verdict.reason, Some(Reason::SameOrigin));
    }

    #[test]
    fn test_exact_and_glob_origins() {
        let policy = policy(&["https://app.example.com", "https://*.partner.io"]);

        let ctx = RequestBuilder::get("/").header("origin", "https://app.example.com").build();
        assert_eq!(
            policy.evaluate(&ctx).data,
            Some(VerdictData::Origin("https://app.example.com".into()))
        );

        let ctx = RequestBuilder::get("/").header("origin", "https://eu.partner.io").build();
        assert!(policy.evaluate(&ctx).is_allowed());

        let ctx = RequestBuilder::get("/").header("origin", "https://evil.example").build();
        let verdict = policy.evaluate(&ctx);
        assert_eq!(verdict.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(verdict.reason, Some(Reason::OriginNotAllowed));
    }

    #[test]
    fn test_wildcard_allows_anything() {
        let ctx = RequestBuilder::get("/").header("origin", "https://anywhere.test").build();
        assert!(policy(&["*"]).evaluate(&ctx).is_allowed());
    }
}
