//! Payment gateway envelope codec and test harness library.
//!
//! Building blocks for exercising a card payment gateway's API family from a
//! developer machine: the nested JWS-over-JWE envelope of the Payment Action API,
//! HS256 JWT payloads for the JSON APIs, typed request models, an endpoint catalog
//! per environment, an HTTP transport, and an in-memory store for webhook
//! callbacks.
//!
//! # The envelope
//!
//! ```text
//!  PaymentProcessRequest XML
//!          │ RSA-OAEP + A256GCM, encrypted to the gateway public key
//!          ▼
//!  JWE compact (5 segments)  {"alg":"RSA-OAEP","enc":"A256GCM","kid":"1"}
//!          │ PS256, signed with the merchant private key
//!          ▼
//!  JWS compact (3 segments)  {"alg":"PS256","kid":"1"}   ── text/plain POST ──▶
//! ```
//!
//! Responses come back either as a JWS (verified with the gateway public key, then
//! decrypted) or as a bare JWE (decrypted). The two are told apart only by their
//! segment count.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pgw_envelope::{
//!     api::{PaymentActionRequest, ProcessType},
//!     envelope::EnvelopeCodec,
//!     keys::{KeyMaterial, load_private_key_file, load_public_key_file},
//!     xml::build_request_xml,
//! };
//!
//! # fn example() -> pgw_envelope::Result<()> {
//! let keys = KeyMaterial::new(
//!     load_private_key_file("merchant.pfx", Some("changeit"))?,
//!     load_public_key_file("gateway.cer")?,
//! );
//! let codec = EnvelopeCodec::new(keys);
//!
//! let request = PaymentActionRequest::new("704704000000211", "INV240101120000", ProcessType::Refund)
//!     .with_amount("10000");
//! let sealed = codec.seal(&build_request_xml(&request)?)?;
//! println!("{}", sealed.jws);
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`keys`]: PKCS#12 / PEM private keys and PEM / DER public keys
//! - [`xml`]: Payment Action XML building, parsing and pretty printing
//! - [`envelope`]: JWS(JWE(XML)) encode, classify and decode
//! - [`jwt`]: HS256 request payloads and webhook callback tokens
//! - [`api`]: typed request models
//! - [`environment`]: environments and endpoint catalog
//! - [`config`]: TOML configuration
//! - [`transport`]: sealed transport trait and reqwest implementation
//! - [`client`]: end-to-end flows per API
//! - [`webhook`]: captured webhook store
//! - [`error`]: error type with failing stage
//!
//! # Error Handling
//!
//! All operations return [`Result<T>`](error::Result). Each error knows the stage
//! it came from:
//!
//! ```rust
//! use pgw_envelope::{HarnessError, envelope::classify};
//!
//! match classify("a.b.c.d") {
//!     Err(err @ HarnessError::MalformedEnvelope(_)) => {
//!         assert_eq!(err.stage().as_str(), "classify");
//!     }
//!     other => panic!("unexpected: {other:?}"),
//! }
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![allow(
    clippy::multiple_crate_versions,
    reason = "transitive dependencies from josekit, openssl and reqwest"
)]

pub mod api;
pub mod client;
pub mod config;
pub mod envelope;
pub mod environment;
pub mod error;
pub mod jwt;
pub mod keys;
pub mod transport;
pub mod webhook;
pub mod xml;

#[cfg(test)]
mod test_support;

pub use client::GatewayClient;
pub use config::HarnessConfig;
pub use envelope::EnvelopeCodec;
pub use error::{HarnessError, Result};
pub use keys::KeyMaterial;
