// src/firewall/layers/two_factor.rs
use axum::http::StatusCode;
use serde_json::Value;
use std::sync::Arc;

use crate::config::FirewallConfig;
use crate::firewall::context::RequestContext;
use crate::firewall::guard::guarded;
use crate::firewall::verdict::{LayerId, Reason, Verdict};
use crate::utils::patterns::RouteMatcher;

const LAYER: LayerId = LayerId::TwoFactor;
pub const VERIFIED_KEY: &str = "2fa_verified";

/// Gates protected routes on a prior 2FA verification. Issuing and checking codes happens elsewhere.
pub struct TwoFactorGate {
    config: Arc<FirewallConfig>,
    protected: RouteMatcher,
}

impl TwoFactorGate {
    pub fn new(config: Arc<FirewallConfig>) -> Self {
        let protected = RouteMatcher::new(&config.two_factor_routes);
        Self { config, protected }
    }

    pub async fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        if !self.protected.matches(&ctx.route) {
            return Verdict::allow_because(LAYER, Reason::NotRequired);
        }
        let Some(user) = &ctx.user else {
            return Verdict::allow_because(LAYER, Reason::NotAuthenticated);
        };
        if !user.has_two_factor() {
            return Verdict::allow_because(LAYER, Reason::TwoFactorNotEnabled);
        }

        let verified = match &ctx.session {
            Some(session) => match guarded(
                LAYER,
                self.config.two_factor_fail_policy,
                self.config.collaborator_timeout,
                session.get(VERIFIED_KEY),
            )
            .await
            {
                Ok(value) => value.as_ref().map_or(false, truthy),
                Err(verdict) => return verdict,
            },
            None => false,
        };

        if verified {
            Verdict::allow(LAYER)
        } else {
            tracing::info!(user = %user.id, path = %ctx.route, "Two-factor verification required");
            Verdict::deny(
                LAYER,
                Reason::TwoFactorRequired,
                StatusCode::FORBIDDEN,
                "Two-factor authentication required",
            )
        }
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}
