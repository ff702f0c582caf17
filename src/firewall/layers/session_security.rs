// src/firewall/layers/session_security.rs
use axum::http::StatusCode;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;

use crate::config::FirewallConfig;
use crate::firewall::context::RequestContext;
use crate::firewall::guard::guarded;
use crate::firewall::verdict::{LayerId, Reason, Verdict};
use crate::storage::StoreError;
use crate::utils::patterns::RouteMatcher;

const LAYER: LayerId = LayerId::SessionSecurity;
pub const FINGERPRINT_KEY: &str = "_fingerprint";

pub fn fingerprint(ctx: &RequestContext) -> String {
    let accept_language = ctx.header("accept-language").unwrap_or("");
    let material = format!("{}|{}|{}", ctx.ip, ctx.user_agent(), accept_language);
    hex::encode(Sha256::digest(material.as_bytes()))
}

/// Binds a session to the client that created it; a changed fingerprint destroys the session.
pub struct SessionSecurity {
    config: Arc<FirewallConfig>,
    exempt: RouteMatcher,
}

impl SessionSecurity {
    pub fn new(config: Arc<FirewallConfig>) -> Self {
        let exempt = RouteMatcher::new(&config.session_exempt_routes);
        Self { config, exempt }
    }

    pub async fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        if self.exempt.matches(&ctx.route) {
            return Verdict::allow_because(LAYER, Reason::ApiRoute);
        }
        let Some(session) = &ctx.session else {
            return Verdict::allow(LAYER);
        };

        let current = fingerprint(ctx);
        let stored = match self.call(session.get(FINGERPRINT_KEY)).await {
            Ok(stored) => stored,
            Err(verdict) => return verdict,
        };

        match stored.as_ref().and_then(Value::as_str) {
            None => match self.call(session.put(FINGERPRINT_KEY, Value::String(current))).await {
                Ok(()) => Verdict::allow(LAYER),
                Err(verdict) => verdict,
            },
            Some(stored) if stored == current => Verdict::allow(LAYER),
            Some(_) => {
                tracing::warn!(ip = %ctx.ip, user_agent = ctx.user_agent(), "Session fingerprint mismatch, flushing session");
                if let Err(verdict) = self.call(session.flush()).await {
                    return verdict;
                }
                Verdict::deny(
                    LAYER,
                    Reason::FingerprintMismatch,
                    StatusCode::UNAUTHORIZED,
                    "Session security violation",
                )
            }
        }
    }

    async fn call<T>(&self, fut: impl Future<Output = Result<T, StoreError>>) -> Result<T, Verdict> {
        guarded(LAYER, self.config.session_fail_policy, self.config.collaborator_timeout, fut).await
    }
}
