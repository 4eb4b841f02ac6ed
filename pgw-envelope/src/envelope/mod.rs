//! Nested JWS(JWE(XML)) envelope of the Payment Action API.
//!
//! # Outbound
//!
//! ```text
//! XML ──RSA-OAEP + A256GCM──▶ JWE compact (5 segments)
//!     ──PS256 over the JWE string──▶ JWS compact (3 segments) ──▶ text/plain POST
//! ```
//!
//! The JWE is encrypted to the gateway public key with protected header
//! `{"alg":"RSA-OAEP","enc":"A256GCM","kid":"1"}`. The JWS is signed with the
//! merchant private key with protected header `{"alg":"PS256","kid":"1"}`; its
//! payload segment base64url-decodes to exactly the JWE compact string.
//!
//! # Inbound
//!
//! Responses are classified by segment count alone, after trimming surrounding
//! whitespace:
//!
//! | Segments | Handling                                            |
//! |----------|-----------------------------------------------------|
//! | 3        | verify PS256 with the gateway key, then decrypt JWE |
//! | 5        | decrypt JWE with the merchant key                   |
//! | other    | [`HarnessError::MalformedEnvelope`]                 |
//!
//! A verified JWS whose payload is not a compact JWE is rejected as malformed.
//! Nothing is retried and no alternative interpretation is attempted.
//!
//! # Examples
//!
//! ```no_run
//! use pgw_envelope::{
//!     envelope::EnvelopeCodec,
//!     keys::{KeyMaterial, load_private_key_file, load_public_key_file},
//! };
//!
//! # fn example() -> pgw_envelope::error::Result<()> {
//! let keys = KeyMaterial::new(
//!     load_private_key_file("merchant.pfx", Some("secret"))?,
//!     load_public_key_file("gateway.cer")?,
//! );
//! let codec = EnvelopeCodec::new(keys);
//!
//! let sealed = codec.seal("<PaymentProcessRequest/>")?;
//! assert_eq!(sealed.jws.split('.').count(), 3);
//!
//! # let response_body = String::new();
//! let opened = codec.open(&response_body)?;
//! println!("{}", opened.xml);
//! # Ok(())
//! # }
//! ```

use std::fmt;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use josekit::{
    jwe::{self, JweHeader},
    jws::{self, JwsHeader},
};
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{HarnessError, Result},
    keys::{KeyMaterial, PrivateKey, PublicKey},
};

#[cfg(test)]
mod tests;

/// Key management algorithm of the inner JWE.
pub const JWE_ALGORITHM: &str = "RSA-OAEP";
/// Content encryption algorithm of the inner JWE.
pub const JWE_ENCRYPTION: &str = "A256GCM";
/// Signature algorithm of the outer JWS.
pub const JWS_ALGORITHM: &str = "PS256";

const JWS_SEGMENTS: usize = 3;
const JWE_SEGMENTS: usize = 5;

/// Shape of a response body, decided by segment count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Three segments: compact JWS wrapping a JWE.
    Jws,
    /// Five segments: bare compact JWE.
    Jwe,
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Jws => f.write_str("JWS"),
            Self::Jwe => f.write_str("JWE"),
        }
    }
}

/// Every stage of an outbound envelope, kept for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedEnvelope {
    /// XML payload.
    pub xml: String,
    /// Compact JWE over the XML.
    pub jwe: String,
    /// Compact JWS over the JWE; this is what goes on the wire.
    pub jws: String,
}

impl SealedEnvelope {
    /// Wire form of the envelope.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.jws
    }
}

impl fmt::Display for SealedEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.jws)
    }
}

/// A decoded response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedEnvelope {
    /// How the response was wrapped.
    pub kind: EnvelopeKind,
    /// Inner compact JWE.
    pub jwe: String,
    /// `kid` of the JWE protected header, if any.
    pub key_id: Option<String>,
    /// Decrypted XML payload.
    pub xml: String,
}

#[derive(Deserialize)]
struct ProtectedHeader {
    alg: Option<String>,
    enc: Option<String>,
}

/// Classifies a response body by its number of `.`-separated segments.
///
/// Surrounding whitespace is ignored. Segment contents are not inspected.
///
/// # Errors
///
/// Returns [`HarnessError::MalformedEnvelope`] for any count other than 3 or 5.
///
/// # Examples
///
/// ```
/// use pgw_envelope::envelope::{EnvelopeKind, classify};
///
/// assert_eq!(classify("a.b.c")?, EnvelopeKind::Jws);
/// assert_eq!(classify(" a.b.c.d.e\n")?, EnvelopeKind::Jwe);
/// assert!(classify("a.b.c.d").is_err());
/// # Ok::<(), pgw_envelope::error::HarnessError>(())
/// ```
pub fn classify(text: &str) -> Result<EnvelopeKind> {
    match text.trim().split('.').count() {
        JWS_SEGMENTS => Ok(EnvelopeKind::Jws),
        JWE_SEGMENTS => Ok(EnvelopeKind::Jwe),
        count => Err(HarnessError::MalformedEnvelope(format!(
            "response is not in compact JWS or JWE format ({count} segments)"
        ))),
    }
}

/// Encrypts `xml` to `recipient_public` and signs the result with `sender_private`.
///
/// # Errors
///
/// Returns [`HarnessError::Encryption`] if the JWE cannot be produced and
/// [`HarnessError::Signing`] if the JWS cannot be produced. Keys unusable for
/// RSA-OAEP or PS256 never get this far: they are rejected with
/// [`HarnessError::KeyLoad`] when loaded.
pub fn encode_request(
    xml: &str,
    recipient_public: &PublicKey,
    sender_private: &PrivateKey,
    key_id: &str,
) -> Result<SealedEnvelope> {
    let mut jwe_header = JweHeader::new();
    jwe_header.set_content_encryption(JWE_ENCRYPTION);
    jwe_header.set_key_id(key_id);
    let jwe = jwe::serialize_compact(xml.as_bytes(), &jwe_header, recipient_public.encrypter())
        .map_err(|e| HarnessError::Encryption(e.to_string()))?;
    debug!(len = jwe.len(), "encrypted payload");

    let mut jws_header = JwsHeader::new();
    jws_header.set_key_id(key_id);
    let jws = jws::serialize_compact(jwe.as_bytes(), &jws_header, sender_private.signer())
        .map_err(|e| HarnessError::Signing(e.to_string()))?;
    debug!(len = jws.len(), "signed envelope");

    Ok(SealedEnvelope { xml: xml.to_owned(), jwe, jws })
}

/// Verifies and decrypts a response body.
///
/// `recipient_private` is the merchant key the response was encrypted to;
/// `sender_public` is the gateway key it was signed with. Surrounding
/// whitespace is ignored on the body and on the JWE carried inside a JWS.
///
/// # Errors
///
/// - [`HarnessError::MalformedEnvelope`]: wrong segment count, or a JWS whose
///   payload is not a compact JWE
/// - [`HarnessError::SignatureVerification`]: JWS does not verify
/// - [`HarnessError::Decryption`]: unsupported `alg`/`enc`, wrong key, tampered
///   ciphertext or tag, or non UTF-8 plaintext
pub fn decode_response(
    text: &str,
    recipient_private: &PrivateKey,
    sender_public: &PublicKey,
) -> Result<OpenedEnvelope> {
    let text = text.trim();
    let kind = classify(text)?;
    debug!(%kind, "classified response");

    let jwe = match kind {
        EnvelopeKind::Jws => {
            let (payload, _) = jws::deserialize_compact(text, sender_public.verifier())
                .map_err(|e| HarnessError::SignatureVerification(e.to_string()))?;
            let inner = String::from_utf8(payload).map_err(|_| {
                HarnessError::MalformedEnvelope("JWS payload is not UTF-8".to_owned())
            })?;
            let inner = inner.trim();
            if inner.split('.').count() != JWE_SEGMENTS {
                return Err(HarnessError::MalformedEnvelope(
                    "JWS payload is not a compact JWE".to_owned(),
                ));
            }
            inner.to_owned()
        }
        EnvelopeKind::Jwe => text.to_owned(),
    };

    let (xml, key_id) = decrypt(&jwe, recipient_private)?;
    Ok(OpenedEnvelope { kind, jwe, key_id, xml })
}

fn decrypt(jwe: &str, recipient_private: &PrivateKey) -> Result<(String, Option<String>)> {
    check_jwe_algorithms(jwe)?;

    let (plaintext, header) = jwe::deserialize_compact(jwe, recipient_private.decrypter())
        .map_err(|e| HarnessError::Decryption(e.to_string()))?;
    let xml = String::from_utf8(plaintext)
        .map_err(|e| HarnessError::Decryption(format!("plaintext is not UTF-8: {e}")))?;

    Ok((xml, header.key_id().map(str::to_owned)))
}

fn check_jwe_algorithms(jwe: &str) -> Result<()> {
    let encoded = jwe.split('.').next().unwrap_or_default();
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| HarnessError::Decryption(format!("invalid protected header: {e}")))?;
    let header: ProtectedHeader = serde_json::from_slice(&bytes)
        .map_err(|e| HarnessError::Decryption(format!("invalid protected header: {e}")))?;

    let alg = header.alg.as_deref().unwrap_or("none");
    let enc = header.enc.as_deref().unwrap_or("none");
    if alg != JWE_ALGORITHM || enc != JWE_ENCRYPTION {
        return Err(HarnessError::Decryption(format!(
            "unsupported algorithm {alg}/{enc}, expected {JWE_ALGORITHM}/{JWE_ENCRYPTION}"
        )));
    }
    Ok(())
}

/// Envelope operations bound to one [`KeyMaterial`].
#[derive(Debug)]
pub struct EnvelopeCodec {
    keys: KeyMaterial,
}

impl EnvelopeCodec {
    /// Wraps loaded keys.
    #[must_use]
    pub const fn new(keys: KeyMaterial) -> Self {
        Self { keys }
    }

    /// Keys used by this codec.
    #[must_use]
    pub const fn keys(&self) -> &KeyMaterial {
        &self.keys
    }

    /// Encrypts to the gateway and signs as the merchant.
    ///
    /// # Errors
    ///
    /// See [`encode_request`].
    pub fn seal(&self, xml: &str) -> Result<SealedEnvelope> {
        encode_request(
            xml,
            self.keys.public_key(),
            self.keys.private_key(),
            self.keys.key_id(),
        )
    }

    /// Verifies as coming from the gateway and decrypts as the merchant.
    ///
    /// # Errors
    ///
    /// See [`decode_response`].
    pub fn open(&self, text: &str) -> Result<OpenedEnvelope> {
        decode_response(text, self.keys.private_key(), self.keys.public_key())
    }
}
