// src/firewall/layers/geo_block.rs
use axum::http::StatusCode;
use std::sync::Arc;

use crate::config::FirewallConfig;
use crate::firewall::context::RequestContext;
use crate::firewall::guard::guarded;
use crate::firewall::verdict::{LayerId, Reason, Verdict};
use crate::storage::GeoResolver;
use crate::utils::patterns::is_private_ip;

const LAYER: LayerId = LayerId::GeoBlocking;

pub struct GeoBlocker {
    config: Arc<FirewallConfig>,
    resolver: Arc<dyn GeoResolver>,
}

impl GeoBlocker {
    pub fn new(config: Arc<FirewallConfig>, resolver: Arc<dyn GeoResolver>) -> Self {
        Self { config, resolver }
    }

    pub async fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        if !self.config.geo_enabled {
            return Verdict::allow_because(LAYER, Reason::Disabled);
        }

        let country = if is_private_ip(&ctx.ip) {
            self.config.geo_home_country.clone()
        } else {
            match guarded(
                LAYER,
                self.config.geo_fail_policy,
                self.config.collaborator_timeout,
                self.resolver.country_code(ctx.ip),
            )
            .await
            {
                Ok(code) => code.to_ascii_uppercase(),
                Err(verdict) => return verdict,
            }
        };

        let allowed = &self.config.geo_allowed_countries;
        if !allowed.is_empty() && !allowed.iter().any(|c| c.eq_ignore_ascii_case(&country)) {
            tracing::warn!(ip = %ctx.ip, country = %country, "Blocked request from disallowed country");
            return Verdict::deny(
                LAYER,
                Reason::CountryBlocked,
                StatusCode::FORBIDDEN,
                "Access from your location is not permitted",
            );
        }

        Verdict::allow(LAYER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::testing::{RequestBuilder, Spy};
    use crate::storage::StaticGeoResolver;

    fn blocker(enabled: bool, allowed: &[&str]) -> (GeoBlocker, Arc<Spy<StaticGeoResolver>>) {
        let config = FirewallConfig {
            geo_enabled: enabled,
            geo_allowed_countries: allowed.iter().map(|c| c.to_string()).collect(),
            ..FirewallConfig::default()
        };
        let resolver = Arc::new(Spy::new(
            StaticGeoResolver::new()
                .with("203.0.113.10".parse().unwrap(), "US")
                .with("198.51.100.1".parse().unwrap(), "ID"),
        ));
        (GeoBlocker::new(Arc::new(config), resolver.clone()), resolver)
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let (blocker, resolver) = blocker(false, &["ID"]);
        let verdict = blocker.evaluate(&RequestBuilder::get("/").build()).await;
        assert_eq!(verdict.reason, Some(Reason::Disabled));
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_country_outside_allow_list_is_denied() {
        let (blocker, _) = blocker(true, &["ID"]);
        let verdict = blocker.evaluate(&RequestBuilder::get("/").build()).await;
        assert_eq!(verdict.status(), Some(StatusCode::FORBIDDEN));
        assert_eq!(verdict.reason, Some(Reason::CountryBlocked));

        let local = RequestBuilder::get("/").ip("198.51.100.1").build();
        assert!(blocker.evaluate(&local).await.is_allowed());
    }

    #[tokio::test]
    async fn test_private_ip_resolves_home_without_lookup() {
        let (blocker, resolver) = blocker(true, &["ID"]);
        let ctx = RequestBuilder::get("/").ip("192.168.1.20").build();
        assert!(blocker.evaluate(&ctx).await.is_allowed());
        assert_eq!(resolver.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_allow_list_allows_all() {
        let (blocker, resolver) = blocker(true, &[]);
        assert!(blocker.evaluate(&RequestBuilder::get("/").build()).await.is_allowed());
        assert_eq!(resolver.calls(), 1);
    }
}
