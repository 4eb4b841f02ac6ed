//! HTTP transport implementation.
//!
//! This module provides HTTP/1.1 and HTTP/2 transport using reqwest. Each call is a
//! single attempt; the whole-request timeout comes from [`HttpConfig`].

use std::{
    sync::LazyLock,
    time::{Duration, Instant},
};

use reqwest::{Client, header::CONTENT_TYPE};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use super::config::{HttpConfig, HttpVersion};
use crate::{
    error::{HarnessError, Result},
    transport::{CONTENT_TYPE_JSON, CONTENT_TYPE_TEXT, Transport, TransportResponse, sealed},
};

/// Default HTTP client with connection pooling enabled.
///
/// Using a singleton avoids recreating the client per transport instance,
/// preserving connection pooling benefits across all default transports.
static DEFAULT_HTTP_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    let config = HttpConfig::default();
    Client::builder()
        .pool_max_idle_per_host(config.pool_max_idle_per_host)
        .timeout(config.timeout())
        .connect_timeout(config.connect_timeout())
        .build()
        .unwrap_or_default()
});

/// Parses `url` and requires an absolute `http` or `https` URL.
///
/// Loopback hosts are allowed: the harness is pointed at local mocks and tunnels.
fn validate_url(url: &str) -> Result<Url> {
    let parsed =
        Url::parse(url).map_err(|e| HarnessError::InvalidInput(format!("invalid URL {url}: {e}")))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(HarnessError::InvalidInput(format!(
            "unsupported URL scheme {} in {url}",
            parsed.scheme()
        )));
    }

    Ok(parsed)
}

/// HTTP/1.1 and HTTP/2 transport using reqwest.
///
/// Supports automatic connection pooling and keep-alive.
///
/// # Examples
///
/// ```rust,no_run
/// use pgw_envelope::transport::{HttpTransport, Transport};
///
/// # async fn example() -> pgw_envelope::error::Result<()> {
/// let transport = HttpTransport::new()?;
///
/// let response = transport
///     .post_text("https://demo2.2c2p.com/2C2PFrontend/PaymentAction/2.0/action", "eyJ...")
///     .await?;
/// println!("Status: {}", response.status);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct HttpTransport {
    client: Client,
    http_version: HttpVersion,
    timeout: Duration,
}

impl sealed::private::Sealed for HttpTransport {}

impl HttpTransport {
    /// Creates a new HTTP transport with default settings.
    ///
    /// Uses a shared singleton client for connection pooling efficiency.
    ///
    /// Default configuration:
    /// - Pool max idle per host: 10
    /// - Timeout: 60 seconds
    /// - Connect timeout: 10 seconds
    /// - HTTP version: Auto
    ///
    /// # Errors
    ///
    /// This method is infallible but returns `Result` for API consistency.
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: DEFAULT_HTTP_CLIENT.clone(),
            http_version: HttpVersion::Auto,
            timeout: HttpConfig::default().timeout(),
        })
    }

    /// Creates HTTP transport with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if the configuration is out of bounds, or
    /// [`HarnessError::Http`] if the client cannot be built.
    ///
    /// # Examples
    ///
    /// ```
    /// use pgw_envelope::transport::{HttpConfig, HttpTransport, HttpVersion};
    ///
    /// let config = HttpConfig {
    ///     pool_max_idle_per_host: 4,
    ///     timeout_secs: 120,
    ///     connect_timeout_secs: 15,
    ///     http_version: HttpVersion::Http1,
    /// };
    ///
    /// let transport = HttpTransport::with_config(&config).unwrap();
    /// ```
    pub fn with_config(config: &HttpConfig) -> Result<Self> {
        config.validate()?;

        let mut builder = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout());

        if config.http_version == HttpVersion::Http1 {
            builder = builder.http1_only();
        }

        let client = builder.build().map_err(HarnessError::Http)?;

        Ok(Self { client, http_version: config.http_version, timeout: config.timeout() })
    }

    /// Maps a reqwest failure onto the transport error variants.
    fn map_send_error(&self, url: &str, err: reqwest::Error) -> HarnessError {
        if err.is_timeout() {
            HarnessError::TransportTimeout { url: url.to_owned(), timeout: self.timeout }
        } else if err.is_connect() {
            HarnessError::TransportConnection { url: url.to_owned(), message: error_chain(&err) }
        } else {
            HarnessError::Http(err)
        }
    }

    #[instrument(skip(self, body), fields(url = url, content_type = content_type, bytes = body.len()))]
    async fn execute_post(
        &self,
        url: &str,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> Result<TransportResponse> {
        let parsed = validate_url(url)?;

        let started = Instant::now();
        let response = self
            .client
            .post(parsed)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_send_error(url, e))?;

        let status = response.status().as_u16();

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_owned()))
            .collect();

        let bytes = response.bytes().await.map_err(|e| self.map_send_error(url, e))?;
        let elapsed = started.elapsed();

        debug!(status, elapsed_ms = elapsed.as_millis(), "response received");

        Ok(TransportResponse {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
            headers,
            elapsed,
        })
    }
}

/// Flattens an error and its sources into one line.
fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

impl Transport for HttpTransport {
    async fn post_text<'a>(&'a self, url: &'a str, body: &'a str) -> Result<TransportResponse> {
        self.execute_post(url, CONTENT_TYPE_TEXT, body.as_bytes().to_vec()).await
    }

    async fn post_json<'a>(&'a self, url: &'a str, body: &'a Value) -> Result<TransportResponse> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| HarnessError::InvalidInput(format!("unserializable JSON body: {e}")))?;
        self.execute_post(url, CONTENT_TYPE_JSON, bytes).await
    }

    fn protocol_name(&self) -> &'static str {
        match self.http_version {
            HttpVersion::Http1 => "http/1.1",
            HttpVersion::Auto => "http",
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use axum::{Router, http::HeaderMap, routing::post};
    use tokio::net::TcpListener;

    use super::*;

    async fn spawn(router: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn echo_content_type(headers: &HeaderMap) -> String {
        headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_owned()
    }

    #[test]
    fn test_http_transport_new() {
        let transport = HttpTransport::new().unwrap();
        assert_eq!(transport.protocol_name(), "http");
        assert_eq!(transport.timeout(), Duration::from_secs(60));
    }

    #[test]
    fn test_http_transport_with_config() {
        let config =
            HttpConfig { timeout_secs: 5, http_version: HttpVersion::Http1, ..Default::default() };

        let transport = HttpTransport::with_config(&config).unwrap();
        assert_eq!(transport.protocol_name(), "http/1.1");
        assert_eq!(transport.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_http_transport_rejects_invalid_config() {
        let config = HttpConfig { timeout_secs: 0, ..Default::default() };
        let result = HttpTransport::with_config(&config);
        assert!(matches!(result, Err(HarnessError::Config(_))));
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://sandbox-pgw.2c2p.com/payment/4.3/paymentToken").is_ok());
        assert!(validate_url("http://127.0.0.1:8080/action").is_ok());
        assert!(matches!(validate_url("not-a-url"), Err(HarnessError::InvalidInput(_))));
        assert!(matches!(validate_url("ftp://example.com/"), Err(HarnessError::InvalidInput(_))));
    }

    #[test]
    fn test_error_chain_single() {
        let err = std::io::Error::other("boom");
        assert_eq!(error_chain(&err), "boom");
    }

    #[tokio::test]
    async fn test_post_text_sends_plain_body() {
        let url = spawn(Router::new().route(
            "/action",
            post(|headers: HeaderMap, body: String| async move {
                format!("{}|{body}", echo_content_type(&headers))
            }),
        ))
        .await;

        let transport = HttpTransport::new().unwrap();
        let response = transport.post_text(&format!("{url}/action"), "a.b.c").await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, "text/plain|a.b.c");
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn test_post_json_sends_json_body() {
        let url = spawn(Router::new().route(
            "/token",
            post(|headers: HeaderMap, body: String| async move {
                format!("{}|{body}", echo_content_type(&headers))
            }),
        ))
        .await;

        let transport = HttpTransport::new().unwrap();
        let body = serde_json::json!({"payload": "x.y.z"});
        let response = transport.post_json(&format!("{url}/token"), &body).await.unwrap();

        assert_eq!(response.body, r#"application/json|{"payload":"x.y.z"}"#);
    }

    #[tokio::test]
    async fn test_non_success_status_is_returned() {
        let url = spawn(Router::new().route(
            "/action",
            post(|| async { (axum::http::StatusCode::BAD_GATEWAY, "upstream down") }),
        ))
        .await;

        let transport = HttpTransport::new().unwrap();
        let response = transport.post_text(&format!("{url}/action"), "x").await.unwrap();

        assert_eq!(response.status, 502);
        assert_eq!(response.body, "upstream down");
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn test_timeout_maps_to_transport_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold connections without ever answering.
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = HttpConfig { timeout_secs: 1, connect_timeout_secs: 1, ..Default::default() };
        let transport = HttpTransport::with_config(&config).unwrap();
        let url = format!("http://{addr}/action");

        let err = transport.post_text(&url, "x").await.unwrap_err();
        match err {
            HarnessError::TransportTimeout { url: failed, timeout } => {
                assert_eq!(failed, url);
                assert_eq!(timeout, Duration::from_secs(1));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_refused_connection_maps_to_transport_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new().unwrap();
        let err = transport.post_text(&format!("http://{addr}/action"), "x").await.unwrap_err();

        assert!(matches!(err, HarnessError::TransportConnection { .. }), "{err:?}");
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_sending() {
        let transport = HttpTransport::new().unwrap();
        let err = transport.post_text("not-a-url", "x").await.unwrap_err();
        assert!(matches!(err, HarnessError::InvalidInput(_)));
    }
}
