// src/firewall/layers/https.rs
use axum::http::StatusCode;

use crate::config::{Environment, FirewallConfig};
use crate::firewall::context::RequestContext;
use crate::firewall::verdict::{LayerId, Reason, Verdict, VerdictData};

const LAYER: LayerId = LayerId::HttpsEnforcement;

pub struct HttpsEnforcer {
    environment: Environment,
}

impl HttpsEnforcer {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            environment: config.environment,
        }
    }

    pub fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        if self.environment.is_local() {
            return Verdict::allow_because(LAYER, Reason::LocalEnv);
        }

        // X-Forwarded-Proto only counts when it came from a trusted proxy.
        let forwarded_https = ctx.forwarded_trusted
            && ctx
                .header("x-forwarded-proto")
                .map_or(false, |proto| proto.eq_ignore_ascii_case("https"));

        if ctx.secure || forwarded_https {
            return Verdict::allow(LAYER);
        }

        Verdict::deny(LAYER, Reason::HttpsRequired, StatusCode::UPGRADE_REQUIRED, "HTTPS required")
            .with_data(VerdictData::Redirect(ctx.https_url()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firewall::testing::RequestBuilder;

    fn enforcer(environment: Environment) -> HttpsEnforcer {
        HttpsEnforcer::new(&FirewallConfig {
            environment,
            ..FirewallConfig::default()
        })
    }

    #[test]
    fn test_plain_http_gets_upgrade_target() {
        let ctx = RequestBuilder::get("/pay?order=9").header("host", "shop.test").build();
        let verdict = enforcer(Environment::Production).evaluate(&ctx);
        assert_eq!(verdict.status(), Some(StatusCode::UPGRADE_REQUIRED));
        assert_eq!(verdict.data, Some(VerdictData::Redirect("https://shop.test/pay?order=9".into())));
    }

    #[test]
    fn test_local_secure_and_proxied_requests_pass() {
        let plain = RequestBuilder::get("/").build();
        assert_eq!(enforcer(Environment::Local).evaluate(&plain).reason, Some(Reason::LocalEnv));

        let secure = RequestBuilder::get("/").secure().build();
        assert!(enforcer(Environment::Production).evaluate(&secure).is_allowed());

        let proxied = RequestBuilder::get("/").header("x-forwarded-proto", "https").trusted_proxy().build();
        assert!(enforcer(Environment::Production).evaluate(&proxied).is_allowed());
    }

    #[test]
    fn test_untrusted_forwarded_proto_is_ignored() {
        let spoofed = RequestBuilder::get("/").header("x-forwarded-proto", "https").build();
        assert!(!enforcer(Environment::Production).evaluate(&spoofed).is_allowed());
    }
}
