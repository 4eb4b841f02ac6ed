//! Error types for the payment gateway envelope codec and harness.
//!
//! Every fallible operation in this crate returns [`Result<T>`], whose error type
//! [`HarnessError`] names the stage that failed and carries the underlying library
//! message. The envelope operations are otherwise opaque binary transforms, so the
//! message is never truncated.
//!
//! # Error Categories
//!
//! - **Key material** ([`HarnessError::KeyLoad`]): bad container, format or passphrase
//! - **Outbound envelope** ([`HarnessError::Encryption`], [`HarnessError::Signing`])
//! - **Inbound envelope** ([`HarnessError::MalformedEnvelope`],
//!   [`HarnessError::SignatureVerification`], [`HarnessError::Decryption`])
//! - **Transport** ([`HarnessError::TransportTimeout`],
//!   [`HarnessError::TransportConnection`], [`HarnessError::Http`])
//! - **Payload formats** ([`HarnessError::Xml`], [`HarnessError::Jwt`])
//! - **Setup** ([`HarnessError::Config`], [`HarnessError::InvalidInput`])
//!
//! # Examples
//!
//! ```
//! use pgw_envelope::error::{ErrorStage, HarnessError};
//!
//! let err = HarnessError::MalformedEnvelope("4 segments".to_owned());
//! assert_eq!(err.stage(), ErrorStage::Classify);
//! assert!(err.to_string().contains("4 segments"));
//! ```

use std::{fmt, time::Duration};

use thiserror::Error;

/// Result type alias for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Pipeline stage at which an error occurred.
///
/// Used by callers to render a diagnostic such as "failed at stage: decrypt".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorStage {
    /// Loading private keys or certificates.
    KeyLoad,
    /// JWE encryption of the outbound payload.
    Encrypt,
    /// JWS signing of the outbound JWE.
    Sign,
    /// Segment-count classification of a response.
    Classify,
    /// JWS signature verification of a response.
    Verify,
    /// JWE decryption of a response.
    Decrypt,
    /// Network transport.
    Transport,
    /// XML building or parsing.
    Xml,
    /// HS256 JWT payload handling.
    Jwt,
    /// Configuration loading or validation.
    Config,
    /// Caller supplied input.
    Input,
}

impl ErrorStage {
    /// Returns the stable lowercase name of this stage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::KeyLoad => "key_load",
            Self::Encrypt => "encrypt",
            Self::Sign => "sign",
            Self::Classify => "classify",
            Self::Verify => "verify",
            Self::Decrypt => "decrypt",
            Self::Transport => "transport",
            Self::Xml => "xml",
            Self::Jwt => "jwt",
            Self::Config => "config",
            Self::Input => "input",
        }
    }
}

impl fmt::Display for ErrorStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while building, sealing, sending or opening gateway requests.
///
/// All errors are terminal for the request/response cycle in which they occur;
/// nothing in this crate retries.
#[must_use = "errors should be handled, propagated, or explicitly panicked"]
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Key material could not be loaded.
    ///
    /// Common causes:
    /// - Wrong or missing passphrase for an encrypted PKCS#12 or PEM key
    /// - Bytes are not a PKCS#12 container, PEM key or X.509 certificate
    /// - Unsupported key file extension or non-RSA key
    #[error("key loading failed: {0}")]
    KeyLoad(String),

    /// JWE encryption (RSA-OAEP + A256GCM) failed.
    ///
    /// Usually means the recipient public key is unusable for RSA-OAEP.
    #[error("JWE encryption failed: {0}")]
    Encryption(String),

    /// JWS signing (PS256) failed.
    #[error("JWS signing failed: {0}")]
    Signing(String),

    /// A response is neither a 3-segment JWS nor a 5-segment JWE.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A JWS response signature did not verify against the gateway public key.
    #[error("JWS signature verification failed: {0}")]
    SignatureVerification(String),

    /// A JWE could not be decrypted.
    ///
    /// Covers authentication tag mismatch, wrong private key, an unsupported
    /// `alg`/`enc` pair in the protected header, and non UTF-8 plaintext.
    #[error("JWE decryption failed: {0}")]
    Decryption(String),

    /// The transport did not receive a response within the configured timeout.
    #[error("request to {url} timed out after {}s", timeout.as_secs())]
    TransportTimeout {
        /// Endpoint that was called.
        url: String,
        /// Timeout that elapsed.
        timeout: Duration,
    },

    /// The transport could not connect to the endpoint.
    #[error("connection to {url} failed: {message}")]
    TransportConnection {
        /// Endpoint that was called.
        url: String,
        /// Underlying client message.
        message: String,
    },

    /// Any other HTTP client failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// XML could not be built or parsed.
    #[error("XML processing failed: {0}")]
    Xml(String),

    /// An HS256 JWT could not be signed, decoded or verified.
    #[error("JWT processing failed: {0}")]
    Jwt(String),

    /// Configuration is missing or invalid.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Caller supplied input was rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl HarnessError {
    /// Returns the pipeline stage this error belongs to.
    ///
    /// # Examples
    ///
    /// ```
    /// use pgw_envelope::error::{ErrorStage, HarnessError};
    ///
    /// let err = HarnessError::Decryption("tag mismatch".to_owned());
    /// assert_eq!(err.stage(), ErrorStage::Decrypt);
    /// assert_eq!(err.stage().as_str(), "decrypt");
    /// ```
    pub const fn stage(&self) -> ErrorStage {
        match self {
            Self::KeyLoad(_) => ErrorStage::KeyLoad,
            Self::Encryption(_) => ErrorStage::Encrypt,
            Self::Signing(_) => ErrorStage::Sign,
            Self::MalformedEnvelope(_) => ErrorStage::Classify,
            Self::SignatureVerification(_) => ErrorStage::Verify,
            Self::Decryption(_) => ErrorStage::Decrypt,
            Self::TransportTimeout { .. } | Self::TransportConnection { .. } | Self::Http(_) => {
                ErrorStage::Transport
            }
            Self::Xml(_) => ErrorStage::Xml,
            Self::Jwt(_) => ErrorStage::Jwt,
            Self::Config(_) => ErrorStage::Config,
            Self::InvalidInput(_) => ErrorStage::Input,
        }
    }

    /// Returns `true` for transport-layer failures.
    ///
    /// The codec never produces these; callers can use this to tell a network
    /// problem apart from a protocol problem.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self.stage(), ErrorStage::Transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = HarnessError::Signing("key too small".into());
        assert_eq!(error.to_string(), "JWS signing failed: key too small");
    }

    #[test]
    fn test_malformed_envelope_message() {
        let error = HarnessError::MalformedEnvelope(
            "response is not in compact JWS or JWE format".to_owned(),
        );
        assert!(error.to_string().contains("compact JWS or JWE"));
        assert_eq!(error.stage(), ErrorStage::Classify);
    }

    #[test]
    fn test_timeout_display() {
        let error = HarnessError::TransportTimeout {
            url: "https://gateway.example.com/action".to_owned(),
            timeout: Duration::from_secs(60),
        };
        assert_eq!(
            error.to_string(),
            "request to https://gateway.example.com/action timed out after 60s"
        );
        assert!(error.is_transport());
    }

    #[test]
    fn test_connection_error_is_transport() {
        let error = HarnessError::TransportConnection {
            url: "https://gateway.example.com".to_owned(),
            message: "connection refused".to_owned(),
        };
        assert!(error.is_transport());
        assert_eq!(error.stage(), ErrorStage::Transport);
    }

    #[test]
    fn test_codec_errors_are_not_transport() {
        let errors = [
            HarnessError::KeyLoad("x".into()),
            HarnessError::Encryption("x".into()),
            HarnessError::Signing("x".into()),
            HarnessError::MalformedEnvelope("x".into()),
            HarnessError::SignatureVerification("x".into()),
            HarnessError::Decryption("x".into()),
        ];
        for error in errors {
            assert!(!error.is_transport(), "{error} must not be a transport error");
        }
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(ErrorStage::KeyLoad.to_string(), "key_load");
        assert_eq!(ErrorStage::Encrypt.to_string(), "encrypt");
        assert_eq!(ErrorStage::Sign.to_string(), "sign");
        assert_eq!(ErrorStage::Verify.to_string(), "verify");
        assert_eq!(ErrorStage::Decrypt.to_string(), "decrypt");
    }
}
