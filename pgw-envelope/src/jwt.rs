//! HS256 JWT payloads for the JSON gateway APIs and webhook tokens.
//!
//! The Payment Token, Payment Inquiry and POS APIs take their request claims as an
//! HS256 JWT signed with the merchant secret (the "SHA key", used as raw bytes),
//! wrapped as `{"payload": "<jwt>"}`. Responses carry a JWT in the same member;
//! the harness displays its claims without verifying them.
//!
//! Webhook callbacks are authenticated the other way round: the harness issues a
//! [`CallbackToken`], the gateway appends it to the notify URL as `?token=`, and
//! the webhook server checks it with [`verify_payload`].
//!
//! # Examples
//!
//! ```
//! use pgw_envelope::jwt::{decode_payload_unverified, sign_payload, verify_payload};
//! use serde_json::json;
//!
//! # fn example() -> pgw_envelope::error::Result<()> {
//! let secret = b"0A85F7ED911FD69D3316ECDF20FCA4E1";
//! let token = sign_payload(&json!({"merchantID": "M1", "invoiceNo": "INV1"}), secret)?;
//!
//! assert_eq!(decode_payload_unverified(&token)?["invoiceNo"], "INV1");
//! assert_eq!(verify_payload(&token, secret)?["merchantID"], "M1");
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use josekit::{
    jws::{HS256, JwsHeader},
    jwt::{self, JwtPayload},
};
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::{HarnessError, Result};

/// Default lifetime of a webhook callback token.
pub const DEFAULT_CALLBACK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// JSON member carrying the JWT in requests and responses.
pub const PAYLOAD_MEMBER: &str = "payload";

fn jwt_error(context: &str) -> impl FnOnce(josekit::JoseError) -> HarnessError + '_ {
    move |e| HarnessError::Jwt(format!("{context}: {e}"))
}

fn claims_map(claims: &impl Serialize) -> Result<Map<String, Value>> {
    match serde_json::to_value(claims) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(HarnessError::Jwt(format!(
            "claims must be a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(HarnessError::Jwt(format!("cannot serialize claims: {e}"))),
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Signs `claims` as a compact HS256 JWT with header `{"alg":"HS256","typ":"JWT"}`.
///
/// # Errors
///
/// Returns [`HarnessError::Jwt`] if the claims do not serialize to a JSON object,
/// contain an ill-typed registered claim (e.g. a string `exp`), or the secret is
/// unusable.
pub fn sign_payload(claims: &impl Serialize, secret: &[u8]) -> Result<String> {
    let payload = JwtPayload::from_map(claims_map(claims)?).map_err(jwt_error("invalid claims"))?;
    let signer = HS256.signer_from_bytes(secret).map_err(jwt_error("invalid secret"))?;

    let mut header = JwsHeader::new();
    header.set_token_type("JWT");
    jwt::encode_with_signer(&payload, &header, &signer).map_err(jwt_error("signing failed"))
}

/// Wraps a token as `{"payload": token}`.
#[must_use]
pub fn wrap_payload(token: &str) -> Value {
    json!({ PAYLOAD_MEMBER: token })
}

/// Decodes the claims of a compact JWT without checking its signature.
///
/// Only for display of gateway responses. Missing `=` padding is tolerated, as is
/// stray padding.
///
/// # Errors
///
/// Returns [`HarnessError::Jwt`] if the token does not have three segments or the
/// claims segment is not base64url encoded JSON.
pub fn decode_payload_unverified(token: &str) -> Result<Value> {
    let segments: Vec<&str> = token.trim().split('.').collect();
    let [_, claims, _] = segments.as_slice() else {
        return Err(HarnessError::Jwt(format!(
            "expected 3 segments, found {}",
            segments.len()
        )));
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(claims.trim_end_matches('='))
        .map_err(|e| HarnessError::Jwt(format!("claims are not base64url: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| HarnessError::Jwt(format!("claims are not JSON: {e}")))
}

/// Parses a JSON response body and decodes its `payload` member, if any.
///
/// Returns `Ok(None)` when the body is JSON without a string `payload` member
/// (gateway error responses look like that).
///
/// # Errors
///
/// Returns [`HarnessError::Jwt`] if the body is not JSON or the payload does not
/// decode.
pub fn extract_response_payload(body: &str) -> Result<Option<Value>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| HarnessError::Jwt(format!("response is not JSON: {e}")))?;
    value
        .get(PAYLOAD_MEMBER)
        .and_then(Value::as_str)
        .map(decode_payload_unverified)
        .transpose()
}

/// Verifies an HS256 JWT and returns its claims.
///
/// When an `exp` claim is present it must lie in the future.
///
/// # Errors
///
/// Returns [`HarnessError::Jwt`] if the token is malformed, not HS256, signed with
/// another secret, or expired.
pub fn verify_payload(token: &str, secret: &[u8]) -> Result<Value> {
    verify_payload_at(token, secret, Utc::now())
}

fn verify_payload_at(token: &str, secret: &[u8], now: DateTime<Utc>) -> Result<Value> {
    let verifier = HS256.verifier_from_bytes(secret).map_err(jwt_error("invalid secret"))?;
    let (payload, _) =
        jwt::decode_with_verifier(token.trim(), &verifier).map_err(jwt_error("invalid token"))?;

    if let Some(expires_at) = payload.expires_at()
        && DateTime::<Utc>::from(expires_at) <= now
    {
        return Err(HarnessError::Jwt("token has expired".to_owned()));
    }

    Ok(Value::Object(payload.claims_set().clone()))
}

/// Token for authenticating webhook callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackToken {
    /// Compact HS256 JWT.
    pub token: String,
    /// `iat` claim.
    pub issued_at: DateTime<Utc>,
    /// `exp` claim.
    pub expires_at: DateTime<Utc>,
}

impl CallbackToken {
    /// Issues a token carrying `claims` plus `iat` and `exp = iat + ttl`.
    ///
    /// Caller supplied `iat`/`exp` claims are overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Jwt`] if `ttl` is zero or out of range, or signing
    /// fails.
    pub fn issue(claims: Map<String, Value>, secret: &[u8], ttl: Duration) -> Result<Self> {
        Self::issue_at(claims, secret, ttl, Utc::now())
    }

    fn issue_at(
        mut claims: Map<String, Value>,
        secret: &[u8],
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if ttl.is_zero() {
            return Err(HarnessError::Jwt("token lifetime must be positive".to_owned()));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| HarnessError::Jwt(format!("token lifetime out of range: {e}")))?;
        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| HarnessError::Jwt("token lifetime out of range".to_owned()))?;

        claims.insert("iat".to_owned(), json!(now.timestamp()));
        claims.insert("exp".to_owned(), json!(expires_at.timestamp()));
        let token = sign_payload(&claims, secret)?;

        Ok(Self { token, issued_at: now, expires_at })
    }
}
