// src/firewall/layers/csrf.rs
use axum::http::{Method, StatusCode};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

use crate::config::FirewallConfig;
use crate::firewall::context::RequestContext;
use crate::firewall::guard::guarded;
use crate::firewall::verdict::{LayerId, Reason, Verdict};
use crate::utils::patterns::RouteMatcher;

const LAYER: LayerId = LayerId::Csrf;
pub const CSRF_HEADER: &str = "x-csrf-token";
pub const CSRF_FIELD: &str = "_token";
// 419 is not in the http crate's named constants.
const PAGE_EXPIRED: u16 = 419;

lazy_static! {
    static ref TOKEN_FORMAT: Regex = Regex::new(r"^[a-zA-Z0-9]{40,}$").expect("valid token regex");
}

pub struct CsrfGuard {
    config: Arc<FirewallConfig>,
    exempt: RouteMatcher,
}

impl CsrfGuard {
    pub fn new(config: Arc<FirewallConfig>) -> Self {
        let exempt = RouteMatcher::new(&config.csrf_exempt_routes);
        Self { config, exempt }
    }

    pub async fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        if self.exempt.matches(&ctx.route) {
            return Verdict::allow_because(LAYER, Reason::ExcludedRoute);
        }
        if !matches!(ctx.method, Method::POST | Method::PUT | Method::PATCH | Method::DELETE) {
            return Verdict::allow(LAYER);
        }

        let Some(token) = Self::token(ctx) else {
            tracing::warn!(ip = %ctx.ip, path = %ctx.route, "CSRF token missing");
            return expired(Reason::MissingCsrfToken, "CSRF token missing");
        };

        if !TOKEN_FORMAT.is_match(token) {
            tracing::warn!(ip = %ctx.ip, path = %ctx.route, "Malformed CSRF token");
            return expired(Reason::InvalidCsrfToken, "Invalid CSRF token format");
        }

        if let Some(session) = &ctx.session {
            let valid = match guarded(
                LAYER,
                self.config.csrf_fail_policy,
                self.config.collaborator_timeout,
                session.verify_csrf_token(token),
            )
            .await
            {
                Ok(valid) => valid,
                Err(verdict) => return verdict,
            };
            if !valid {
                tracing::warn!(ip = %ctx.ip, path = %ctx.route, "CSRF token mismatch");
                return expired(Reason::InvalidCsrfToken, "CSRF token mismatch");
            }
        }

        Verdict::allow(LAYER)
    }

    fn token(ctx: &RequestContext) -> Option<&str> {
        ctx.header(CSRF_HEADER)
            .or_else(|| ctx.inputs.get(CSRF_FIELD).and_then(|v| v.as_str()))
            .filter(|t| !t.is_empty())
    }
}

fn expired(reason: Reason, message: &str) -> Verdict {
    let status = StatusCode::from_u16(PAGE_EXPIRED).unwrap_or(StatusCode::FORBIDDEN);
    Verdict::deny(LAYER, reason, status, message)
}
