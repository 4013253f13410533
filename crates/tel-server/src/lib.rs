//! HTTP server for the tamper-evident audit ledger.
//!
//! Exposes each organization's ledger under `/v1/orgs/:org/...` for
//! collaborators that append events and dashboards that read, filter,
//! and verify them. Ledger calls block on store I/O and run on tokio's
//! blocking pool.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use router::{build_router, AppState};
pub use server::TelServer;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tel_ledger::{LedgerConfig, LedgerRegistry};
    use tower::util::ServiceExt;

    fn app_with(config: LedgerConfig) -> Router {
        build_router(AppState {
            registry: Arc::new(LedgerRegistry::in_memory(config)),
            max_page_entries: 50,
        })
    }

    fn app() -> Router {
        app_with(LedgerConfig::default())
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn event(kind: &str, actor_id: &str) -> Value {
        json!({
            "event_type": kind,
            "actor": { "actor_type": "user", "actor_id": actor_id },
            "resource": { "resource_type": "repository", "resource_id": "repoA" },
            "payload": { "ticket": "SEC-1" }
        })
    }

    #[tokio::test]
    async fn health_endpoint() {
        let (status, body) = send(&app(), get("/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn append_then_read_back() {
        let app = app();
        let (status, created) =
            send(&app, post("/v1/orgs/acme/entries", event("gap_resolved", "alice"))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["sequence_number"], 0);
        assert_eq!(created["actor_id"], "alice");
        assert_eq!(created["previous_hash"], "0".repeat(64));

        let (status, fetched) = send(&app, get("/v1/orgs/acme/entries/0")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched, created);

        let (status, head) = send(&app, get("/v1/orgs/acme/head")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(head["latest_sequence_number"], 0);
        assert_eq!(head["latest_hash"], created["entry_hash"]);
    }

    #[tokio::test]
    async fn missing_entry_is_404() {
        let (status, body) = send(&app(), get("/v1/orgs/acme/entries/7")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn empty_ledger_head_is_null() {
        let (status, body) = send(&app(), get("/v1/orgs/acme/head")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, Value::Null);
    }

    #[tokio::test]
    async fn invalid_input_statuses() {
        let app = app_with(LedgerConfig {
            max_payload_bytes: 8,
            ..LedgerConfig::default()
        });

        let (status, body) = send(&app, post("/v1/orgs/Not-Valid/entries", event("x", "a"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_organization");

        let (status, body) = send(&app, post("/v1/orgs/acme/entries", event("x", " "))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_entry");

        let (status, body) = send(&app, post("/v1/orgs/acme/entries", event("x", "alice"))).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["error"], "payload_too_large");
    }

    #[tokio::test]
    async fn list_filters_and_limits() {
        let app = app();
        for (kind, who) in [
            ("gap_detected", "alice"),
            ("gap_resolved", "bob"),
            ("gap_detected", "bob"),
            ("gap_detected", "carol"),
        ] {
            let (status, _) = send(&app, post("/v1/orgs/acme/entries", event(kind, who))).await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, body) = send(&app, get("/v1/orgs/acme/entries?event_type=gap_detected&limit=2")).await;
        let seqs: Vec<u64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["sequence_number"].as_u64().unwrap())
            .collect();
        assert_eq!(seqs, vec![0, 2]);

        let (_, body) =
            send(&app, get("/v1/orgs/acme/entries?actor_type=user&actor_id=bob&start=2")).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = send(&app, get("/v1/orgs/acme/entries?start=3&end=1")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_range");
    }

    #[tokio::test]
    async fn full_and_incremental_verify() {
        let app = app();
        for who in ["alice", "bob", "carol"] {
            send(&app, post("/v1/orgs/acme/entries", event("access_granted", who))).await;
        }

        let (status, full) = send(&app, get("/v1/orgs/acme/verify")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(full["is_valid"], true);
        assert_eq!(full["entries_checked"], 3);

        send(&app, post("/v1/orgs/acme/entries", event("access_revoked", "bob"))).await;
        let hash = full["checkpoint"]["latest_hash"].as_str().unwrap();
        let (status, inc) = send(&app, get(&format!("/v1/orgs/acme/verify?from=3&previous_hash={hash}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(inc["is_valid"], true);
        assert_eq!(inc["entries_checked"], 1);
        assert_eq!(inc["from_sequence"], 3);

        let (status, _) = send(&app, get("/v1/orgs/acme/verify?from=2")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn organizations_are_isolated() {
        let app = app();
        send(&app, post("/v1/orgs/acme/entries", event("gap_detected", "alice"))).await;
        let (_, created) = send(&app, post("/v1/orgs/globex/entries", event("gap_detected", "bob"))).await;
        assert_eq!(created["sequence_number"], 0);

        let (_, orgs) = send(&app, get("/v1/orgs")).await;
        assert_eq!(orgs, json!(["acme", "globex"]));
    }
}
