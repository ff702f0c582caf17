// src/firewall/response/headers.rs
use axum::http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::config::FirewallConfig;

const STATIC_HEADERS: [(&str, &str); 5] = [
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("x-xss-protection", "1; mode=block"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
];

const HSTS: &str = "max-age=31536000; includeSubDomains; preload";

pub struct SecurityHeaders {
    hsts: bool,
}

impl SecurityHeaders {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            hsts: !config.environment.is_local(),
        }
    }

    pub fn mutate(&self, headers: &mut HeaderMap) {
        for (name, value) in STATIC_HEADERS {
            headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }

        if self.hsts {
            headers.insert(header::STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS));
        }

        // Don't advertise the server stack
        headers.remove(header::SERVER);
    }
}
