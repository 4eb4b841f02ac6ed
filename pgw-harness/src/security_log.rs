//! Bounded log of webhook authentication outcomes.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Events kept before the oldest is dropped.
pub const DEFAULT_SECURITY_EVENT_CAPACITY: usize = 500;

/// Outcome of a token check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SecurityEventKind {
    /// Token verified.
    AuthenticationSuccess,
    /// Token missing, malformed, foreign or expired.
    AuthenticationFailed,
}

/// One authentication attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityEvent {
    /// Sequence number, starting at 1.
    pub id: u64,
    /// When the attempt was checked.
    pub timestamp: DateTime<Utc>,
    /// Outcome.
    #[serde(rename = "type")]
    pub kind: SecurityEventKind,
    /// Peer address, when known.
    pub client_ip: Option<String>,
    /// Request path.
    pub path: String,
    /// `User-Agent` header, when sent.
    pub user_agent: Option<String>,
    /// Outcome specific details.
    pub details: Value,
}

/// Attempt description handed to [`SecurityLog::record`].
#[derive(Debug, Clone)]
pub struct SecurityAttempt {
    /// Outcome.
    pub kind: SecurityEventKind,
    /// Peer address, when known.
    pub client_ip: Option<String>,
    /// Request path.
    pub path: String,
    /// `User-Agent` header, when sent.
    pub user_agent: Option<String>,
    /// Outcome specific details.
    pub details: Value,
}

#[derive(Debug, Default)]
struct Inner {
    events: VecDeque<SecurityEvent>,
    next_id: u64,
}

/// Newest-first event log. Clones share storage.
#[derive(Debug, Clone)]
pub struct SecurityLog {
    inner: Arc<Mutex<Inner>>,
    capacity: usize,
}

impl Default for SecurityLog {
    fn default() -> Self {
        Self::new(DEFAULT_SECURITY_EVENT_CAPACITY)
    }
}

impl SecurityLog {
    /// Log keeping at most `capacity` events (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::default())), capacity: capacity.max(1) }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores an attempt, evicting the oldest event beyond capacity.
    pub fn record(&self, attempt: SecurityAttempt) -> SecurityEvent {
        let mut inner = self.lock();
        inner.next_id += 1;
        let event = SecurityEvent {
            id: inner.next_id,
            timestamp: Utc::now(),
            kind: attempt.kind,
            client_ip: attempt.client_ip,
            path: attempt.path,
            user_agent: attempt.user_agent,
            details: attempt.details,
        };
        inner.events.push_front(event.clone());
        inner.events.truncate(self.capacity);
        event
    }

    /// Events, newest first.
    #[must_use]
    pub fn all(&self) -> Vec<SecurityEvent> {
        self.lock().events.iter().cloned().collect()
    }

    /// Number of stored events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }
}

/// First 20 characters of a token, for display.
#[must_use]
pub fn token_preview(token: &str) -> String {
    let mut chars = token.chars();
    let head: String = chars.by_ref().take(20).collect();
    if chars.next().is_some() { format!("{head}...") } else { head }
}
