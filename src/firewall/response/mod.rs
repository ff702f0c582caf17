// src/firewall/response/mod.rs - layers that rewrite the outgoing response
pub mod cookies;
pub mod csp;
pub mod headers;

pub use cookies::CookieHardener;
pub use csp::{ContentSecurityPolicy, CspNonce, CspPolicy};
pub use headers::SecurityHeaders;

use axum::http::{header, HeaderMap, HeaderValue};

use super::verdict::LayerId;

/// Response mutators. They never block; order is CSP, then headers, then cookies.
pub enum ResponseLayer {
    Csp(ContentSecurityPolicy),
    Headers(SecurityHeaders),
    Cookies(CookieHardener),
}

impl ResponseLayer {
    pub fn id(&self) -> LayerId {
        match self {
            ResponseLayer::Csp(_) => LayerId::ContentSecurityPolicy,
            ResponseLayer::Headers(_) => LayerId::SecurityHeaders,
            ResponseLayer::Cookies(_) => LayerId::CookieSecurity,
        }
    }

    pub fn mutate(&self, headers: &mut HeaderMap, nonce: Option<&CspNonce>) {
        match self {
            ResponseLayer::Csp(layer) => layer.mutate(headers, nonce),
            ResponseLayer::Headers(layer) => layer.mutate(headers),
            ResponseLayer::Cookies(layer) => layer.mutate(headers),
        }
    }
}

/// Echoes an allowed origin back to the browser.
pub fn apply_cors(headers: &mut HeaderMap, origin: &str) {
    let Ok(value) = HeaderValue::from_str(origin) else {
        tracing::warn!("Allowed origin is not a valid header value: {:?}", origin);
        return;
    };
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    headers.insert(header::ACCESS_CONTROL_ALLOW_CREDENTIALS, HeaderValue::from_static("true"));
    headers.append(header::VARY, HeaderValue::from_static("Origin"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_cors() {
        let mut headers = HeaderMap::new();
        apply_cors(&mut headers, "https://app.example.com");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://app.example.com");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::VARY], "Origin");
    }
}
