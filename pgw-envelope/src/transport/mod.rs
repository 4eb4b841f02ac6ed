//! Transport abstraction for gateway requests.
//!
//! The gateway APIs are all single POSTs: `text/plain` for the Payment Action
//! envelope and `application/json` for everything else. A [`Transport`] sends one
//! request, makes exactly one attempt, and returns whatever the gateway answered.
//! Non-2xx statuses are returned as responses rather than errors, because the
//! harness displays failed responses too.
//!
//! # Examples
//!
//! ```rust,no_run
//! use pgw_envelope::transport::{HttpConfig, HttpTransport, Transport};
//!
//! # async fn example() -> pgw_envelope::error::Result<()> {
//! let transport = HttpTransport::with_config(&HttpConfig::default())?;
//! let response = transport
//!     .post_json("https://sandbox-pgw.2c2p.com/payment/4.3/paymentToken", &serde_json::json!({"payload": "..."}))
//!     .await?;
//! println!("{} in {:?}: {}", response.status, response.elapsed, response.body);
//! # Ok(())
//! # }
//! ```

#[allow(
    redundant_imports,
    reason = "Future needed for RPITIT despite being in Edition 2024 prelude"
)]
use std::future::Future;
use std::time::Duration;

use serde_json::Value;

use crate::error::Result;

pub mod config;
pub mod http;
mod sealed;

pub use config::{HttpConfig, HttpVersion};
pub use http::HttpTransport;

/// Content type of the Payment Action envelope.
pub const CONTENT_TYPE_TEXT: &str = "text/plain";
/// Content type of the JSON APIs.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Response from a transport operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, decoded as UTF-8 (lossy).
    pub body: String,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Time from sending the request to receiving the full body.
    pub elapsed: Duration,
}

impl TransportResponse {
    /// Whether the status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Transport protocol abstraction.
///
/// This trait is sealed; only implementations within this crate are allowed.
///
/// # Errors
///
/// Implementations report:
/// - [`crate::error::HarnessError::TransportTimeout`] when the configured timeout
///   elapses
/// - [`crate::error::HarnessError::TransportConnection`] when the endpoint cannot
///   be reached
/// - [`crate::error::HarnessError::Http`] for any other client failure
/// - [`crate::error::HarnessError::InvalidInput`] for a URL that is not absolute
///   `http(s)`
pub trait Transport: sealed::private::Sealed + Send + Sync {
    /// POSTs `body` as `text/plain`.
    ///
    /// # Errors
    ///
    /// See the trait documentation.
    fn post_text<'a>(
        &'a self,
        url: &'a str,
        body: &'a str,
    ) -> impl Future<Output = Result<TransportResponse>> + Send + 'a;

    /// POSTs `body` as `application/json`.
    ///
    /// # Errors
    ///
    /// See the trait documentation.
    fn post_json<'a>(
        &'a self,
        url: &'a str,
        body: &'a Value,
    ) -> impl Future<Output = Result<TransportResponse>> + Send + 'a;

    /// Returns the protocol name for logging.
    fn protocol_name(&self) -> &'static str;

    /// Whole-request timeout applied to every call.
    fn timeout(&self) -> Duration;
}
