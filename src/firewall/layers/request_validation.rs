// src/firewall/layers/request_validation.rs
use axum::http::StatusCode;
use serde::de::IgnoredAny;

use crate::config::FirewallConfig;
use crate::firewall::context::RequestContext;
use crate::firewall::verdict::{LayerId, Reason, Verdict};

const LAYER: LayerId = LayerId::RequestValidation;

pub struct RequestValidator {
    max_payload_bytes: u64,
}

impl RequestValidator {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            max_payload_bytes: config.max_payload_bytes,
        }
    }

    pub fn evaluate(&self, ctx: &RequestContext) -> Verdict {
        // Size first, so oversized bodies are never parsed or scanned.
        let length = ctx.content_length().unwrap_or(ctx.body.len() as u64);
        if length > self.max_payload_bytes {
            tracing::warn!(ip = %ctx.ip, length, "Request payload too large");
            return Verdict::deny(
                LAYER,
                Reason::PayloadTooLarge,
                StatusCode::PAYLOAD_TOO_LARGE,
                "Request payload too large",
            );
        }

        if ctx.is_json() && !ctx.body.is_empty() && serde_json::from_slice::<IgnoredAny>(&ctx.body).is_err() {
            return Verdict::deny(LAYER, Reason::InvalidJson, StatusCode::BAD_REQUEST, "Invalid JSON payload");
        }

        if ctx.string_inputs().iter().any(|(_, value)| value.contains('\0')) {
            tracing::warn!(ip = %ctx.ip, path = %ctx.route, "Null byte in request input");
            return Verdict::deny(
                LAYER,
                Reason::NullBytesDetected,
                StatusCode::BAD_REQUEST,
                "Invalid characters in request",
            );
        }

        Verdict::allow(LAYER)
    }
}
