//! In-memory store of captured webhook callbacks.
//!
//! The gateway posts asynchronous notifications (refund and void results, payment
//! status) to the merchant's notify URL. The harness captures every request it
//! receives there and keeps the most recent ones for inspection.
//!
//! # Examples
//!
//! ```
//! use pgw_envelope::webhook::{CapturedRequest, WebhookBody, WebhookStore};
//!
//! let store = WebhookStore::new(2);
//! store.record(CapturedRequest::new("POST", "/webhook", br#"{"respCode":"00"}"#.to_vec()));
//! store.record(CapturedRequest::new("POST", "/webhook/payment", b"plain".to_vec()));
//! store.record(CapturedRequest::new("POST", "/webhook", Vec::new()));
//!
//! assert_eq!(store.len(), 2);
//! let latest = store.latest().unwrap();
//! assert_eq!(latest.id, 3);
//! assert!(latest.body.is_none());
//! assert_eq!(store.all()[1].body, Some(WebhookBody::Text("plain".to_owned())));
//! ```

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::DEFAULT_WEBHOOK_CAPACITY;

/// Parameter carrying the base64 JSON result of a frontend redirect callback.
pub const PAYMENT_RESPONSE_PARAM: &str = "paymentResponse";

/// Decoded body of a captured request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum WebhookBody {
    /// Body parsed as JSON.
    Json(Value),
    /// Body that is not JSON, decoded as UTF-8 (lossy).
    Text(String),
}

impl WebhookBody {
    /// Classifies raw body bytes. Empty bodies have no body.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        Some(serde_json::from_slice(bytes).map_or_else(
            |_| Self::Text(String::from_utf8_lossy(bytes).into_owned()),
            Self::Json,
        ))
    }
}

/// An incoming request, before it is stored.
#[derive(Debug, Clone, Default)]
pub struct CapturedRequest {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Query parameters; repeated keys keep the last value.
    pub query: BTreeMap<String, String>,
    /// Request headers with lowercase names.
    pub headers: BTreeMap<String, String>,
    /// Raw body.
    pub body: Vec<u8>,
    /// Peer address, if known.
    pub client_addr: Option<String>,
}

impl CapturedRequest {
    /// Request with the given method, path and body and nothing else.
    #[must_use]
    pub fn new(method: impl Into<String>, path: impl Into<String>, body: Vec<u8>) -> Self {
        Self { method: method.into(), path: path.into(), body, ..Self::default() }
    }
}

/// A stored webhook.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookEntry {
    /// Sequence number, starting at 1. Not reset by [`WebhookStore::clear`].
    pub id: u64,
    /// Receive time, serialized as RFC 3339.
    pub received_at: DateTime<Utc>,
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Query parameters.
    pub query: BTreeMap<String, String>,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// JSON body, text body, or `None` when empty.
    pub body: Option<WebhookBody>,
    /// Decoded `paymentResponse` of a frontend callback, if present and valid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_response: Option<Value>,
    /// Peer address.
    pub client_addr: Option<String>,
}

/// Finds and decodes a `paymentResponse` in the query, a JSON body or a form body.
///
/// The gateway redirects the payer's browser with the payment result as base64
/// encoded JSON, either as a query parameter or as a posted field.
fn decode_payment_response(request: &CapturedRequest, body: Option<&WebhookBody>) -> Option<Value> {
    let encoded = request.query.get(PAYMENT_RESPONSE_PARAM).cloned().or_else(|| match body? {
        WebhookBody::Json(value) => value.get(PAYMENT_RESPONSE_PARAM)?.as_str().map(str::to_owned),
        WebhookBody::Text(text) => url::form_urlencoded::parse(text.as_bytes())
            .find(|(key, _)| key == PAYMENT_RESPONSE_PARAM)
            .map(|(_, value)| value.into_owned()),
    })?;

    let bytes = STANDARD.decode(encoded.trim()).ok()?;
    serde_json::from_slice(&bytes).ok()
}

#[derive(Debug)]
struct Inner {
    entries: VecDeque<WebhookEntry>,
    next_id: u64,
}

/// Bounded, newest-first webhook store.
///
/// Clones share the same storage. The lock is held only to copy entries in or
/// out, so the store is safe to use from any number of tasks.
#[derive(Debug, Clone)]
pub struct WebhookStore {
    inner: Arc<Mutex<Inner>>,
    capacity: usize,
}

impl Default for WebhookStore {
    fn default() -> Self {
        Self::new(DEFAULT_WEBHOOK_CAPACITY)
    }
}

impl WebhookStore {
    /// Creates a store keeping at most `capacity` entries (minimum 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity.min(64)),
                next_id: 1,
            })),
            capacity,
        }
    }

    // A panic while holding the lock cannot leave `Inner` half-updated.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `request` as the newest entry, evicting the oldest beyond capacity.
    pub fn record(&self, request: CapturedRequest) -> WebhookEntry {
        let body = WebhookBody::from_bytes(&request.body);
        let payment_response = decode_payment_response(&request, body.as_ref());
        let mut inner = self.lock();

        let entry = WebhookEntry {
            id: inner.next_id,
            received_at: Utc::now(),
            method: request.method,
            path: request.path,
            query: request.query,
            headers: request.headers,
            body,
            payment_response,
            client_addr: request.client_addr,
        };
        inner.next_id += 1;
        inner.entries.push_front(entry.clone());
        inner.entries.truncate(self.capacity);
        debug!(id = entry.id, path = %entry.path, stored = inner.entries.len(), "webhook recorded");

        entry
    }

    /// All entries, newest first.
    #[must_use]
    pub fn all(&self) -> Vec<WebhookEntry> {
        self.lock().entries.iter().cloned().collect()
    }

    /// Most recent entry.
    #[must_use]
    pub fn latest(&self) -> Option<WebhookEntry> {
        self.lock().entries.front().cloned()
    }

    /// Removes every entry and returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.lock();
        let removed = inner.entries.len();
        inner.entries.clear();
        removed
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Maximum number of entries kept.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }
}
