//! Webhook capture server.
//!
//! Every request on any path is recorded in a [`WebhookStore`], except the
//! listing routes below. When a secret is configured, capture and listing
//! routes require a valid HS256 token in the `token` query parameter, and
//! every check is kept in a [`SecurityLog`].
//!
//! | Route                        | Purpose                       |
//! |------------------------------|-------------------------------|
//! | `GET /health`                | health report, never guarded  |
//! | `GET /security-events`       | token checks, never guarded   |
//! | `GET /webhooks`              | all captured webhooks         |
//! | `GET /webhooks/latest`       | most recent webhook           |
//! | `GET\|DELETE /webhooks/clear` | drop every captured webhook   |
//! | anything else                | captured                      |

use std::{
    collections::BTreeMap,
    net::SocketAddr,
    sync::Arc,
    time::Instant,
};

use anyhow::Context as _;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{ConnectInfo, State},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Utc;
use pgw_envelope::{
    config::Secret,
    jwt,
    webhook::{CapturedRequest, WebhookStore},
};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::{
    observability::{HealthCheck, HealthReport},
    security_log::{SecurityAttempt, SecurityEventKind, SecurityLog, token_preview},
};

/// Query parameter carrying the access token.
pub const TOKEN_PARAM: &str = "token";

const AUTH_HELP: &str = "Please provide a valid JWT token in the 'token' query parameter";

/// Shared state of the capture server.
#[derive(Debug, Clone)]
pub struct AppState {
    store: WebhookStore,
    secret: Option<Arc<Secret>>,
    security: SecurityLog,
    started: Instant,
}

impl AppState {
    /// State over `store`. `None` or an empty secret disables the token guard.
    #[must_use]
    pub fn new(store: WebhookStore, secret: Option<Secret>) -> Self {
        Self {
            store,
            secret: secret.filter(|s| !s.is_empty()).map(Arc::new),
            security: SecurityLog::default(),
            started: Instant::now(),
        }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &WebhookStore {
        &self.store
    }

    /// Authentication outcomes, newest first.
    #[must_use]
    pub const fn security_log(&self) -> &SecurityLog {
        &self.security
    }

    /// Verified claims, or `None` when the guard is disabled.
    fn authorize(&self, query: &BTreeMap<String, String>) -> Result<Option<Value>, String> {
        let Some(secret) = &self.secret else {
            return Ok(None);
        };
        let token = query
            .get(TOKEN_PARAM)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| "Missing token parameter".to_owned())?;
        jwt::verify_payload(token, secret.as_bytes())
            .map(Some)
            .map_err(|e| format!("Invalid token: {e}"))
    }
}

/// Builds the router.
///
/// Methods other than the listed ones on the listing paths are captured too.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health).fallback(capture))
        .route("/security-events", get(security_events).fallback(capture))
        .route("/webhooks", get(list_webhooks).fallback(capture))
        .route("/webhooks/latest", get(latest_webhook).fallback(capture))
        .route("/webhooks/clear", get(clear_webhooks).delete(clear_webhooks).fallback(capture))
        .fallback(capture)
        .with_state(state)
}

/// Binds `addr` and serves until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("cannot bind webhook server to {addr}"))?;
    info!(
        addr = %listener.local_addr()?,
        guarded = state.secret.is_some(),
        capacity = state.store.capacity(),
        "webhook server listening"
    );

    axum::serve(listener, router(state).into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("webhook server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("shutting down webhook server");
}

fn parse_query(uri: &Uri) -> BTreeMap<String, String> {
    uri.query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut map: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        map.entry(name.as_str().to_owned())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    map
}

fn auth_failed(message: &str) -> Response {
    let body = json!({
        "status": "error",
        "code": "AUTH_FAILED",
        "message": message,
        "timestamp": Utc::now().to_rfc3339(),
        "help": AUTH_HELP,
    });
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

fn guard(
    state: &AppState,
    uri: &Uri,
    headers: &HeaderMap,
    client: Option<&ConnectInfo<SocketAddr>>,
) -> Result<BTreeMap<String, String>, Response> {
    let query = parse_query(uri);
    let outcome = state.authorize(&query);
    if state.secret.is_none() {
        return Ok(query);
    }

    let token = query.get(TOKEN_PARAM).filter(|t| !t.is_empty());
    let (kind, details) = match &outcome {
        Ok(claims) => {
            let user = claims.as_ref().and_then(|c| c.get("name")).cloned();
            (SecurityEventKind::AuthenticationSuccess, json!({ "user": user }))
        }
        Err(reason) => (
            SecurityEventKind::AuthenticationFailed,
            json!({
                "reason": reason,
                "token_provided": token.is_some(),
                "token_preview": token.map(|t| token_preview(t)),
            }),
        ),
    };
    state.security_log().record(SecurityAttempt {
        kind,
        client_ip: client.map(|c| c.0.ip().to_string()),
        path: uri.path().to_owned(),
        user_agent: headers
            .get(header::USER_AGENT)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned()),
        details,
    });

    outcome.map_err(|reason| {
        warn!(
            path = uri.path(),
            client = ?client.map(|c| c.0),
            token_provided = token.is_some(),
            %reason,
            "webhook authentication failed"
        );
        auth_failed(&reason)
    })?;
    Ok(query)
}

async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let store = state.store();
    let stored = store.len();
    let mut checks = Vec::with_capacity(2);

    if stored >= store.capacity() {
        checks.push(HealthCheck::warn(
            "webhook_store",
            format!("full at {stored}/{}, oldest webhooks are evicted", store.capacity()),
        ));
    } else {
        checks.push(HealthCheck::pass("webhook_store", format!("{stored}/{}", store.capacity())));
    }
    if state.secret.is_some() {
        checks.push(HealthCheck::pass(
            "token_guard",
            format!("HS256 token required, {} checks logged", state.security_log().len()),
        ));
    } else {
        checks.push(HealthCheck::warn("token_guard", "disabled, requests are not authenticated"));
    }

    Json(HealthReport::new(state.started.elapsed().as_secs(), stored, checks))
}

async fn security_events(State(state): State<AppState>) -> Json<Value> {
    let events = state.security_log().all();
    Json(json!({ "total": events.len(), "events": events }))
}

async fn list_webhooks(
    State(state): State<AppState>,
    client: Option<ConnectInfo<SocketAddr>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = guard(&state, &uri, &headers, client.as_ref()) {
        return denied;
    }
    let webhooks = state.store().all();
    Json(json!({ "total": webhooks.len(), "webhooks": webhooks })).into_response()
}

async fn latest_webhook(
    State(state): State<AppState>,
    client: Option<ConnectInfo<SocketAddr>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = guard(&state, &uri, &headers, client.as_ref()) {
        return denied;
    }
    match state.store().latest() {
        Some(entry) => Json(entry).into_response(),
        None => (StatusCode::NOT_FOUND, Json(json!({ "message": "No webhooks received yet" })))
            .into_response(),
    }
}

async fn clear_webhooks(
    State(state): State<AppState>,
    client: Option<ConnectInfo<SocketAddr>>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = guard(&state, &uri, &headers, client.as_ref()) {
        return denied;
    }
    let cleared = state.store().clear();
    info!(cleared, "webhooks cleared");
    Json(json!({ "status": "success", "cleared": cleared })).into_response()
}

async fn capture(
    State(state): State<AppState>,
    client: Option<ConnectInfo<SocketAddr>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut query = match guard(&state, &uri, &headers, client.as_ref()) {
        Ok(query) => query,
        Err(denied) => return denied,
    };
    query.remove(TOKEN_PARAM);

    let request = CapturedRequest {
        method: method.to_string(),
        path: uri.path().to_owned(),
        query,
        headers: header_map(&headers),
        body: body.to_vec(),
        client_addr: client.map(|c| c.0.to_string()),
    };
    let entry = state.store().record(request);
    info!(
        id = entry.id,
        method = %entry.method,
        path = %entry.path,
        payment_response = entry.payment_response.is_some(),
        "webhook captured"
    );

    let mut response = json!({
        "status": "success",
        "message": "Webhook received successfully",
        "timestamp": entry.received_at.to_rfc3339(),
        "webhook_id": entry.id,
        "received_data": entry.body.as_ref().map_or(Value::Null, |b| json!(b)),
    });
    if let Some(decoded) = &entry.payment_response {
        response["payment_response"] = decoded.clone();
    }
    Json(response).into_response()
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum_test::TestServer;
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde_json::Map;

    use super::*;

    const SECRET: &str = "webhook-test-secret";

    fn open_server() -> (TestServer, WebhookStore) {
        let store = WebhookStore::new(3);
        let server = TestServer::new(router(AppState::new(store.clone(), None))).unwrap();
        (server, store)
    }

    fn guarded_server() -> TestServer {
        let state = AppState::new(WebhookStore::new(10), Some(Secret::new(SECRET)));
        TestServer::new(router(state)).unwrap()
    }

    fn valid_token() -> String {
        let mut claims = Map::new();
        claims.insert("name".to_owned(), json!("gateway"));
        jwt::CallbackToken::issue(claims, SECRET.as_bytes(), Duration::from_secs(60)).unwrap().token
    }

    #[tokio::test]
    async fn test_capture_json_post() {
        let (server, store) = open_server();

        let response = server
            .post("/webhook/payment")
            .add_query_param("source", "gateway")
            .json(&json!({"invoiceNo": "INV1", "respCode": "0000"}))
            .await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["status"], "success");
        assert_eq!(body["message"], "Webhook received successfully");
        assert_eq!(body["webhook_id"], 1);
        assert_eq!(body["received_data"]["invoiceNo"], "INV1");

        let entry = store.latest().unwrap();
        assert_eq!(entry.method, "POST");
        assert_eq!(entry.path, "/webhook/payment");
        assert_eq!(entry.query.get("source").map(String::as_str), Some("gateway"));
        assert_eq!(
            entry.headers.get("content-type").map(String::as_str),
            Some("application/json")
        );
    }

    #[tokio::test]
    async fn test_capture_any_method_and_text_body() {
        let (server, store) = open_server();

        server.put("/anything").text("plain body").await.assert_status_ok();
        server.get("/callback").await.assert_status_ok();
        server.delete("/webhooks").await.assert_status_ok();

        let methods: Vec<String> = store.all().into_iter().map(|e| e.method).collect();
        assert_eq!(methods, ["DELETE", "GET", "PUT"]);
        let put = store.all().into_iter().find(|e| e.method == "PUT").unwrap();
        assert_eq!(put.body, Some(pgw_envelope::webhook::WebhookBody::Text("plain body".into())));
    }

    #[tokio::test]
    async fn test_list_latest_and_clear() {
        let (server, _store) = open_server();

        let response = server.get("/webhooks/latest").await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(response.json::<Value>()["message"], "No webhooks received yet");

        for n in 1..=4 {
            server.post(&format!("/hook/{n}")).json(&json!({"n": n})).await.assert_status_ok();
        }

        let response = server.get("/webhooks").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["total"], 3);
        assert_eq!(body["webhooks"][0]["path"], "/hook/4");
        assert_eq!(body["webhooks"][2]["path"], "/hook/2");

        let latest: Value = server.get("/webhooks/latest").await.json();
        assert_eq!(latest["id"], 4);
        assert_eq!(latest["body"], json!({"n": 4}));

        let cleared: Value = server.delete("/webhooks/clear").await.json();
        assert_eq!(cleared["cleared"], 3);
        let body: Value = server.get("/webhooks").await.json();
        assert_eq!(body["total"], 0);
    }

    #[tokio::test]
    async fn test_capture_decodes_payment_response() {
        let (server, store) = open_server();
        let encoded = STANDARD.encode(br#"{"invoiceNo":"INV9","respCode":"2000"}"#);

        let response =
            server.get("/callback-frontend").add_query_param("paymentResponse", &encoded).await;
        response.assert_status_ok();

        let body: Value = response.json();
        assert_eq!(body["payment_response"]["respCode"], "2000");
        assert_eq!(store.latest().unwrap().payment_response.unwrap()["invoiceNo"], "INV9");
    }

    #[tokio::test]
    async fn test_health_reports_unguarded_store() {
        let (server, _store) = open_server();

        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["total_webhooks"], 0);
        assert_eq!(body["checks"][1]["name"], "token_guard");
    }

    #[tokio::test]
    async fn test_guard_rejects_missing_token() {
        let server = guarded_server();

        let response = server.post("/webhook").json(&json!({"a": 1})).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let body: Value = response.json();
        assert_eq!(body["status"], "error");
        assert_eq!(body["code"], "AUTH_FAILED");
        assert_eq!(body["message"], "Missing token parameter");
        assert_eq!(body["help"], AUTH_HELP);

        server.get("/webhooks").await.assert_status(StatusCode::UNAUTHORIZED);
        server.get("/webhooks/latest").await.assert_status(StatusCode::UNAUTHORIZED);
        server.delete("/webhooks/clear").await.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_guard_rejects_foreign_token() {
        let server = guarded_server();
        let foreign =
            jwt::CallbackToken::issue(Map::new(), b"another-secret", Duration::from_secs(60))
                .unwrap()
                .token;

        let response = server.post("/webhook").add_query_param(TOKEN_PARAM, &foreign).await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        let message = response.json::<Value>()["message"].as_str().unwrap().to_owned();
        assert!(message.starts_with("Invalid token: "), "{message}");
    }

    #[tokio::test]
    async fn test_guard_accepts_valid_token_and_strips_it() {
        let state = AppState::new(WebhookStore::new(10), Some(Secret::new(SECRET)));
        let store = state.store().clone();
        let server = TestServer::new(router(state)).unwrap();
        let token = valid_token();

        server
            .post("/webhook")
            .add_query_param(TOKEN_PARAM, &token)
            .add_query_param("ref", "A1")
            .json(&json!({"ok": true}))
            .await
            .assert_status_ok();

        let entry = store.latest().unwrap();
        assert!(!entry.query.contains_key(TOKEN_PARAM));
        assert_eq!(entry.query.get("ref").map(String::as_str), Some("A1"));

        let body: Value =
            server.get("/webhooks").add_query_param(TOKEN_PARAM, &token).await.json();
        assert_eq!(body["total"], 1);
    }

    #[tokio::test]
    async fn test_health_is_not_guarded() {
        let server = guarded_server();

        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_failed_authentication_is_logged() {
        let state = AppState::new(WebhookStore::new(10), Some(Secret::new(SECRET)));
        let log = state.security_log().clone();
        let server = TestServer::new(router(state)).unwrap();

        server.post("/webhook").await.assert_status(StatusCode::UNAUTHORIZED);
        server
            .get("/webhooks")
            .add_query_param(TOKEN_PARAM, "not-a-jwt-but-long-enough-to-cut")
            .add_header(header::USER_AGENT, header::HeaderValue::from_static("gateway-agent/1.0"))
            .await
            .assert_status(StatusCode::UNAUTHORIZED);

        let events = log.all();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, SecurityEventKind::AuthenticationFailed);
        assert_eq!(events[0].path, "/webhooks");
        assert_eq!(events[0].user_agent.as_deref(), Some("gateway-agent/1.0"));
        assert_eq!(events[0].details["token_provided"], true);
        assert_eq!(events[0].details["token_preview"], "not-a-jwt-but-long-e...");
        assert!(events[0].details["reason"].as_str().unwrap().starts_with("Invalid token: "));
        assert_eq!(events[1].path, "/webhook");
        assert_eq!(events[1].details["reason"], "Missing token parameter");
        assert_eq!(events[1].details["token_provided"], false);
        assert!(events[1].details["token_preview"].is_null());
    }

    #[tokio::test]
    async fn test_successful_authentication_is_logged() {
        let state = AppState::new(WebhookStore::new(10), Some(Secret::new(SECRET)));
        let log = state.security_log().clone();
        let server = TestServer::new(router(state)).unwrap();

        server
            .post("/webhook")
            .add_query_param(TOKEN_PARAM, &valid_token())
            .await
            .assert_status_ok();

        let events = log.all();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, SecurityEventKind::AuthenticationSuccess);
        assert_eq!(events[0].details["user"], "gateway");
        assert_eq!(events[0].id, 1);
    }

    #[tokio::test]
    async fn test_security_events_route_is_not_guarded() {
        let server = guarded_server();
        server.get("/webhooks/latest").await.assert_status(StatusCode::UNAUTHORIZED);

        let response = server.get("/security-events").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["total"], 1);
        assert_eq!(body["events"][0]["type"], "AUTHENTICATION_FAILED");
        assert_eq!(body["events"][0]["path"], "/webhooks/latest");
    }

    #[tokio::test]
    async fn test_unguarded_server_logs_no_security_events() {
        let state = AppState::new(WebhookStore::new(3), None);
        let log = state.security_log().clone();
        let server = TestServer::new(router(state)).unwrap();

        server.post("/webhook").json(&json!({"a": 1})).await.assert_status_ok();
        server.get("/webhooks").await.assert_status_ok();

        assert_eq!(log.len(), 0);
        let body: Value = server.get("/security-events").await.json();
        assert_eq!(body["total"], 0);
        assert_eq!(body["events"], json!([]));
    }

    #[test]
    fn test_empty_secret_disables_guard() {
        let state = AppState::new(WebhookStore::default(), Some(Secret::new("")));
        assert_eq!(state.authorize(&BTreeMap::new()), Ok(None));
    }

    #[test]
    fn test_header_map_joins_repeated_values() {
        let mut headers = HeaderMap::new();
        headers.append("x-trace", "a".parse().unwrap());
        headers.append("x-trace", "b".parse().unwrap());
        assert_eq!(header_map(&headers).get("x-trace").map(String::as_str), Some("a, b"));
    }
}
