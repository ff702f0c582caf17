// src/firewall/response/cookies.rs
use axum::http::{header, HeaderMap, HeaderValue};
use axum_extra::extract::cookie::{Cookie, SameSite};

use crate::config::FirewallConfig;

/// Re-issues every outgoing cookie with Secure (outside local), HttpOnly and SameSite forced.
pub struct CookieHardener {
    secure: bool,
    same_site: SameSite,
}

impl CookieHardener {
    pub fn new(config: &FirewallConfig) -> Self {
        Self {
            secure: !config.environment.is_local(),
            same_site: config.same_site,
        }
    }

    /// Cookies that cannot be read or parsed are passed through untouched.
    pub fn mutate(&self, headers: &mut HeaderMap) {
        let raw: Vec<HeaderValue> = headers.get_all(header::SET_COOKIE).iter().cloned().collect();
        if raw.is_empty() {
            return;
        }

        headers.remove(header::SET_COOKIE);
        for value in raw {
            let value = self.harden(&value).unwrap_or(value);
            headers.append(header::SET_COOKIE, value);
        }
    }

    fn harden(&self, value: &HeaderValue) -> Option<HeaderValue> {
        let text = match value.to_str() {
            Ok(text) => text,
            Err(_) => {
                tracing::warn!("Passing through Set-Cookie header that is not visible ASCII");
                return None;
            }
        };
        let mut cookie = match Cookie::parse(text) {
            Ok(cookie) => cookie,
            Err(e) => {
                tracing::warn!("Passing through unparseable Set-Cookie header: {}", e);
                return None;
            }
        };
        cookie.set_secure(self.secure);
        cookie.set_http_only(true);
        cookie.set_same_site(self.same_site);

        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(hardened) => Some(hardened),
            Err(e) => {
                tracing::warn!(cookie = cookie.name(), "Hardened cookie is not a valid header value: {}", e);
                None
            }
        }
    }
}
