// src/routes.rs
use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::handlers::{firewall_admin, web};
use crate::middleware::{firewall_guard, FirewallState};
use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let guard = FirewallState::new(state.firewall.clone(), state.sessions.clone());
    // Multipart parsing inside the guard honours this limit, so it must wrap the guard.
    let upload_limit = usize::try_from(state.config.firewall.max_file_bytes).unwrap_or(usize::MAX);

    Router::new()
        // ==================
        // WEB UI ROUTES
        // ==================
        .route("/", get(web::index))
        .route("/csrf-token", get(web::csrf_token))
        .route("/upload", post(web::upload))
        // ==================
        // API ROUTES
        // ==================
        .route("/api/notes", get(web::search_notes).post(web::create_note))
        .route("/api/echo", post(web::echo))
        // Firewall administration
        .route("/api/admin/firewall/stats", get(firewall_admin::stats))
        .route("/api/admin/firewall/events", get(firewall_admin::recent_events))
        .route(
            "/api/admin/firewall/blocks",
            get(firewall_admin::list_blocks).post(firewall_admin::block_ip),
        )
        .route("/api/admin/firewall/blocks/:ip", delete(firewall_admin::unblock_ip))
        .with_state(state)
        .layer(from_fn_with_state(guard, firewall_guard))
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Environment, FirewallConfig};
    use crate::firewall::testing::BROWSER_UA;
    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{header, Request, StatusCode};
    use axum::response::Response;
    use serde_json::{json, Value};
    use std::net::SocketAddr;
    use tower::ServiceExt;

    const PEER: &str = "198.51.100.7";
    const TOKEN: &str = "operator-secret";

    async fn state(admin_token: Option<&str>) -> Arc<AppState> {
        state_with(
            admin_token,
            FirewallConfig {
                environment: Environment::Local,
                ..FirewallConfig::default()
            },
        )
        .await
    }

    async fn state_with(admin_token: Option<&str>, firewall: FirewallConfig) -> Arc<AppState> {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: "sqlite::memory:".to_string(),
            admin_token: admin_token.map(str::to_string),
            firewall,
        };
        Arc::new(AppState::build(config).await.unwrap())
    }

    fn request(method: &str, uri: &str, peer: &str) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::USER_AGENT, BROWSER_UA)
            .header(header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
            .header(header::ACCEPT_ENCODING, "gzip, deflate, br")
            .extension(ConnectInfo(SocketAddr::new(peer.parse().unwrap(), 52000)))
    }

    fn admin(method: &str, uri: &str) -> axum::http::request::Builder {
        request(method, uri, PEER).header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_admin_endpoints_require_configured_token() {
        let closed = create_router(state(None).await);
        let response = closed
            .oneshot(admin("GET", "/api/admin/firewall/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let app = create_router(state(Some(TOKEN)).await);
        let response = app
            .clone()
            .oneshot(request("GET", "/api/admin/firewall/stats", PEER).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(admin("GET", "/api/admin/firewall/stats?hours=1").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let stats: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(stats.is_object());
    }

    #[tokio::test]
    async fn test_blocked_ip_is_denied_until_unblocked() {
        let app = create_router(state(Some(TOKEN)).await);
        let blocked = "192.0.2.44";

        let response = app
            .clone()
            .oneshot(
                admin("POST", "/api/admin/firewall/blocks")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "ip": blocked, "minutes": 30 }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(request("GET", "/api/notes", blocked).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(admin("GET", "/api/admin/firewall/blocks").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let blocks: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(blocks.as_array().map(Vec::len), Some(1));

        let response = app
            .clone()
            .oneshot(
                admin("DELETE", &format!("/api/admin/firewall/blocks/{}", blocked))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request("GET", "/api/notes", blocked).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_block_request_is_validated() {
        let app = create_router(state(Some(TOKEN)).await);
        for (payload, status) in [
            (json!({ "ip": "not-an-ip", "minutes": 5 }), StatusCode::BAD_REQUEST),
            (json!({ "ip": "192.0.2.1", "minutes": 0 }), StatusCode::UNPROCESSABLE_ENTITY),
        ] {
            let response = app
                .clone()
                .oneshot(
                    admin("POST", "/api/admin/firewall/blocks")
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(payload.to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), status);
        }
    }

    #[tokio::test]
    async fn test_script_note_is_denied_and_audited() {
        let state = state(Some(TOKEN)).await;
        let app = create_router(state.clone());

        let response = app
            .oneshot(
                request("POST", "/api/notes", PEER)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "body": "<script>alert(1)</script>" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let events = state.firewall.audit().recent(10);
        assert_eq!(events.len(), 1);
        assert!(state.db.search_notes("", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_saved_note_is_encoded_on_index() {
        let app = create_router(state(None).await);

        let response = app
            .clone()
            .oneshot(
                request("POST", "/api/notes", PEER)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "author": "Tom & Jerry", "body": "fish   and chips" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let note: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(note["body"], "fish and chips");

        let response = app
            .oneshot(request("GET", "/", PEER).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("Tom &amp; Jerry"));
        assert!(html.contains("fish and chips"));
    }

    #[tokio::test]
    async fn test_index_script_nonce_matches_policy() {
        let app = create_router(state(None).await);
        let response = app
            .oneshot(request("GET", "/", PEER).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let csp = response
            .headers()
            .get(header::CONTENT_SECURITY_POLICY)
            .and_then(|v| v.to_str().ok())
            .unwrap()
            .to_string();
        assert!(response.headers().contains_key(header::SET_COOKIE));

        let html = body_text(response).await;
        let nonce = html
            .split("<script nonce=\"")
            .nth(1)
            .and_then(|rest| rest.split('"').next())
            .unwrap();
        assert!(csp.contains(&format!("'nonce-{}'", nonce)));
    }

    #[tokio::test]
    async fn test_empty_note_is_rejected() {
        let app = create_router(state(None).await);
        let response = app
            .oneshot(
                request("POST", "/api/notes", PEER)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json!({ "body": "   " }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_search_uses_sanitized_query() {
        let app = create_router(state(None).await);
        for body in ["remember the milk", "buy bread"] {
            let response = app
                .clone()
                .oneshot(
                    request("POST", "/api/notes", PEER)
                        .header(header::CONTENT_TYPE, "application/json")
                        .body(Body::from(json!({ "body": body }).to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::CREATED);
        }

        let response = app
            .oneshot(request("GET", "/api/notes?q=mi%07lk", PEER).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let notes: Value = serde_json::from_str(&body_text(response).await).unwrap();
        let notes = notes.as_array().unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0]["body"], "remember the milk");
    }

    #[tokio::test]
    async fn test_tls_fronted_production_serves_pages() {
        let firewall = FirewallConfig {
            assume_https: true,
            ..FirewallConfig::default()
        };
        let app = create_router(state_with(None, firewall).await);

        let response = app
            .oneshot(
                request("GET", "/", PEER)
                    .header(header::HOST, "notes.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(header::STRICT_TRANSPORT_SECURITY));
    }

    #[tokio::test]
    async fn test_block_accepts_form_fields() {
        let app = create_router(state(Some(TOKEN)).await);
        let response = app
            .oneshot(
                admin("POST", "/api/admin/firewall/blocks")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("ip=192.0.2.5&minutes=15"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["minutes"], 15);
    }
}
