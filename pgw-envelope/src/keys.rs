//! Key material loading for the Payment Action envelope.
//!
//! The merchant signs requests with its own RSA private key (delivered as a
//! PKCS#12 container or a PEM file) and encrypts them to the gateway's RSA public
//! key (delivered as an X.509 certificate in PEM or DER form). Responses travel the
//! other way: they are signed by the gateway and encrypted to the merchant.
//!
//! Parsing is done with `openssl`; the parsed keys are handed to `josekit` once at
//! load time so that every handle returned from this module is ready for the JOSE
//! operations in [`crate::envelope`]. A handle is never partially initialized.
//!
//! # Examples
//!
//! ```no_run
//! use pgw_envelope::keys::{KeyMaterial, load_private_key_file, load_public_key_file};
//!
//! # fn example() -> pgw_envelope::error::Result<()> {
//! let private_key = load_private_key_file("merchant.pfx", Some("secret"))?;
//! let gateway_key = load_public_key_file("gateway.cer")?;
//! let keys = KeyMaterial::new(private_key, gateway_key);
//! assert_eq!(keys.key_id(), "1");
//! # Ok(())
//! # }
//! ```

use std::{fmt, path::Path, sync::OnceLock};

use josekit::{
    jwe::{
        RSA_OAEP,
        alg::rsaes::{RsaesJweDecrypter, RsaesJweEncrypter},
    },
    jws::{
        PS256,
        alg::rsassa_pss::{RsassaPssJwsSigner, RsassaPssJwsVerifier},
    },
};
use openssl::{
    pkcs12::{ParsedPkcs12_2, Pkcs12},
    pkey::{PKey, Private, Public},
    provider::Provider,
    rsa::Rsa,
    x509::X509,
};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{HarnessError, Result};

/// Key id placed in both protected headers unless overridden.
pub const DEFAULT_KEY_ID: &str = "1";

/// Container format of a merchant private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivateKeyFormat {
    /// PKCS#12 container (`.pfx`, `.p12`), usually passphrase protected.
    Pkcs12,
    /// PEM private key (`.pem`, `.key`), PKCS#1 or PKCS#8, optionally encrypted.
    Pem,
}

impl PrivateKeyFormat {
    /// Infers the container format from a file extension.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::KeyLoad`] for any extension other than
    /// `pfx`, `p12`, `pem` or `key` (case-insensitive).
    ///
    /// # Examples
    ///
    /// ```
    /// use pgw_envelope::keys::PrivateKeyFormat;
    ///
    /// assert_eq!(PrivateKeyFormat::from_path("merchant.P12")?, PrivateKeyFormat::Pkcs12);
    /// assert_eq!(PrivateKeyFormat::from_path("merchant.key")?, PrivateKeyFormat::Pem);
    /// assert!(PrivateKeyFormat::from_path("merchant.jks").is_err());
    /// # Ok::<(), pgw_envelope::error::HarnessError>(())
    /// ```
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        match extension.as_str() {
            "pfx" | "p12" => Ok(Self::Pkcs12),
            "pem" | "key" => Ok(Self::Pem),
            _ => Err(HarnessError::KeyLoad(format!(
                "unsupported private key file type: {}",
                path.display()
            ))),
        }
    }
}

/// Merchant RSA private key, ready for PS256 signing and RSA-OAEP decryption.
///
/// Read-only after loading and safe to share across threads. Debug output is
/// redacted.
pub struct PrivateKey {
    signer: RsassaPssJwsSigner,
    decrypter: RsaesJweDecrypter,
    public: PublicKey,
    certificate: Option<X509>,
}

impl PrivateKey {
    fn from_pkey(pkey: &PKey<Private>, certificate: Option<X509>) -> Result<Self> {
        let rsa = pkey
            .rsa()
            .map_err(|e| HarnessError::KeyLoad(format!("private key is not RSA: {e}")))?;
        let pem = Zeroizing::new(
            rsa.private_key_to_pem()
                .map_err(|e| HarnessError::KeyLoad(format!("failed to export private key: {e}")))?,
        );

        let signer = PS256
            .signer_from_pem(pem.as_slice())
            .map_err(|e| HarnessError::KeyLoad(format!("unusable signing key: {e}")))?;
        let decrypter = RSA_OAEP
            .decrypter_from_pem(pem.as_slice())
            .map_err(|e| HarnessError::KeyLoad(format!("unusable decryption key: {e}")))?;

        let public_rsa = Rsa::from_public_components(
            rsa.n().to_owned().map_err(|e| HarnessError::KeyLoad(e.to_string()))?,
            rsa.e().to_owned().map_err(|e| HarnessError::KeyLoad(e.to_string()))?,
        )
        .map_err(|e| HarnessError::KeyLoad(format!("failed to derive public key: {e}")))?;
        let public = PublicKey::from_rsa(&public_rsa)?;

        Ok(Self { signer, decrypter, public, certificate })
    }

    /// Returns the public half of this key.
    ///
    /// Handy for loopback testing, where the same party plays both merchant and
    /// gateway.
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        self.public.clone()
    }

    /// Returns the certificate embedded in a PKCS#12 container, if any.
    ///
    /// Kept for inspection only; the envelope never uses it.
    #[must_use]
    pub fn certificate(&self) -> Option<&X509> {
        self.certificate.as_ref()
    }

    /// Returns the modulus size in bits.
    #[must_use]
    pub fn bits(&self) -> u32 {
        self.public.bits
    }

    pub(crate) fn signer(&self) -> &RsassaPssJwsSigner {
        &self.signer
    }

    pub(crate) fn decrypter(&self) -> &RsaesJweDecrypter {
        &self.decrypter
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("bits", &self.public.bits)
            .field("has_certificate", &self.certificate.is_some())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// RSA public key of the counterparty, ready for RSA-OAEP encryption and PS256
/// verification.
#[derive(Debug, Clone)]
pub struct PublicKey {
    encrypter: RsaesJweEncrypter,
    verifier: RsassaPssJwsVerifier,
    pem: String,
    bits: u32,
}

impl PublicKey {
    fn from_rsa(rsa: &Rsa<Public>) -> Result<Self> {
        let pkcs1 = rsa
            .public_key_to_pem_pkcs1()
            .map_err(|e| HarnessError::KeyLoad(format!("failed to export public key: {e}")))?;
        let spki = rsa
            .public_key_to_pem()
            .map_err(|e| HarnessError::KeyLoad(format!("failed to export public key: {e}")))?;

        let encrypter = RSA_OAEP
            .encrypter_from_pem(&pkcs1)
            .map_err(|e| HarnessError::KeyLoad(format!("unusable encryption key: {e}")))?;
        let verifier = PS256
            .verifier_from_pem(&pkcs1)
            .map_err(|e| HarnessError::KeyLoad(format!("unusable verification key: {e}")))?;

        Ok(Self {
            encrypter,
            verifier,
            pem: String::from_utf8_lossy(&spki).into_owned(),
            bits: rsa.size() * 8,
        })
    }

    fn from_pkey(pkey: &PKey<Public>) -> Result<Self> {
        let rsa = pkey
            .rsa()
            .map_err(|e| HarnessError::KeyLoad(format!("public key is not RSA: {e}")))?;
        Self::from_rsa(&rsa)
    }

    /// Returns the key as a SubjectPublicKeyInfo PEM string.
    #[must_use]
    pub fn to_pem(&self) -> &str {
        &self.pem
    }

    /// Returns the modulus size in bits.
    #[must_use]
    pub const fn bits(&self) -> u32 {
        self.bits
    }

    pub(crate) fn encrypter(&self) -> &RsaesJweEncrypter {
        &self.encrypter
    }

    pub(crate) fn verifier(&self) -> &RsassaPssJwsVerifier {
        &self.verifier
    }
}

/// Key pair used by one Payment Action exchange.
///
/// `private_key` is the merchant's own key (signs requests, decrypts responses);
/// `public_key` is the gateway's key (encrypts requests, verifies responses).
#[derive(Debug)]
pub struct KeyMaterial {
    private_key: PrivateKey,
    public_key: PublicKey,
    key_id: String,
}

impl KeyMaterial {
    /// Bundles a merchant private key and gateway public key with key id `"1"`.
    #[must_use]
    pub fn new(private_key: PrivateKey, public_key: PublicKey) -> Self {
        Self { private_key, public_key, key_id: DEFAULT_KEY_ID.to_owned() }
    }

    /// Overrides the `kid` placed in the protected headers.
    #[must_use]
    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = key_id.into();
        self
    }

    /// Merchant private key.
    #[must_use]
    pub const fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// Gateway public key.
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Key id for the protected headers.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }
}

/// Loads a merchant RSA private key.
///
/// For [`PrivateKeyFormat::Pkcs12`] the embedded certificate is retained for
/// inspection. For [`PrivateKeyFormat::Pem`] both PKCS#1 and PKCS#8 are accepted,
/// encrypted or not. The passphrase is never prompted for interactively.
///
/// # Errors
///
/// Returns [`HarnessError::KeyLoad`] if the bytes are not a valid container, the
/// passphrase is wrong or missing, the container holds no private key, or the key
/// is not RSA.
#[tracing::instrument(skip(bytes, passphrase), fields(len = bytes.len()))]
pub fn load_private_key(
    bytes: &[u8],
    format: PrivateKeyFormat,
    passphrase: Option<&str>,
) -> Result<PrivateKey> {
    let key = match format {
        PrivateKeyFormat::Pkcs12 => {
            let container = Pkcs12::from_der(bytes)
                .map_err(|e| HarnessError::KeyLoad(format!("invalid PKCS#12 container: {e}")))?;
            let parsed = open_pkcs12(&container, passphrase.unwrap_or_default())?;
            let pkey = parsed.pkey.ok_or_else(|| {
                HarnessError::KeyLoad("PKCS#12 container holds no private key".to_owned())
            })?;
            PrivateKey::from_pkey(&pkey, parsed.cert)?
        }
        PrivateKeyFormat::Pem => {
            let secret = Zeroizing::new(passphrase.unwrap_or_default().as_bytes().to_vec());
            let pkey = PKey::private_key_from_pem_callback(bytes, |buf| {
                if secret.len() > buf.len() {
                    return Ok(0);
                }
                buf[..secret.len()].copy_from_slice(&secret);
                Ok(secret.len())
            })
            .map_err(|e| HarnessError::KeyLoad(format!("invalid PEM private key: {e}")))?;
            PrivateKey::from_pkey(&pkey, None)?
        }
    };

    debug!(bits = key.bits(), ?format, "loaded private key");
    Ok(key)
}

/// Opens a PKCS#12 container, retrying once with the OpenSSL `legacy` provider
/// loaded. Older `.pfx` exports use RC2/3DES PBE that OpenSSL 3 only decrypts
/// through that provider.
fn open_pkcs12(container: &Pkcs12, passphrase: &str) -> Result<ParsedPkcs12_2> {
    let first = match container.parse2(passphrase) {
        Ok(parsed) => return Ok(parsed),
        Err(e) => e,
    };
    if !legacy_provider_loaded() {
        return Err(HarnessError::KeyLoad(format!(
            "failed to open PKCS#12 container: {first} (OpenSSL legacy provider unavailable, \
             RC2/3DES protected containers cannot be read)"
        )));
    }
    container
        .parse2(passphrase)
        .map_err(|e| HarnessError::KeyLoad(format!("failed to open PKCS#12 container: {e}")))
}

/// Loads the `legacy` provider once per process and keeps it loaded.
fn legacy_provider_loaded() -> bool {
    static LEGACY: OnceLock<Option<Provider>> = OnceLock::new();
    LEGACY
        .get_or_init(|| match Provider::try_load(None, "legacy", true) {
            Ok(provider) => {
                debug!("loaded OpenSSL legacy provider");
                Some(provider)
            }
            Err(e) => {
                debug!(error = %e, "OpenSSL legacy provider not available");
                None
            }
        })
        .is_some()
}

/// Reads a private key file, inferring its format from the extension.
///
/// # Errors
///
/// Returns [`HarnessError::KeyLoad`] if the file cannot be read, has an
/// unsupported extension, or fails [`load_private_key`].
pub fn load_private_key_file(
    path: impl AsRef<Path>,
    passphrase: Option<&str>,
) -> Result<PrivateKey> {
    let path = path.as_ref();
    let format = PrivateKeyFormat::from_path(path)?;
    let bytes = Zeroizing::new(std::fs::read(path).map_err(|e| {
        HarnessError::KeyLoad(format!("cannot read {}: {e}", path.display()))
    })?);
    load_private_key(&bytes, format, passphrase)
}

/// Loads the gateway RSA public key.
///
/// Tries, in order: PEM X.509 certificate, PEM public key, DER X.509 certificate.
///
/// # Errors
///
/// Returns [`HarnessError::KeyLoad`] if none of the encodings parse or the key is
/// not RSA. The RSA-OAEP encrypter is built here, so a key josekit cannot
/// encrypt to (for example one under 2048 bits) fails now rather than later
/// as an encryption error.
#[tracing::instrument(skip(bytes), fields(len = bytes.len()))]
pub fn load_public_key(bytes: &[u8]) -> Result<PublicKey> {
    let pkey = if let Ok(cert) = X509::from_pem(bytes) {
        debug!("public key from PEM certificate");
        cert.public_key()
    } else if let Ok(pkey) = PKey::public_key_from_pem(bytes) {
        debug!("public key from PEM");
        Ok(pkey)
    } else {
        let cert = X509::from_der(bytes).map_err(|e| {
            HarnessError::KeyLoad(format!(
                "not a PEM certificate, PEM public key or DER certificate: {e}"
            ))
        })?;
        debug!("public key from DER certificate");
        cert.public_key()
    }
    .map_err(|e| HarnessError::KeyLoad(format!("certificate has no usable public key: {e}")))?;

    PublicKey::from_pkey(&pkey)
}

/// Reads a public key or certificate file.
///
/// # Errors
///
/// Returns [`HarnessError::KeyLoad`] if the file cannot be read or fails
/// [`load_public_key`].
pub fn load_public_key_file(path: impl AsRef<Path>) -> Result<PublicKey> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| HarnessError::KeyLoad(format!("cannot read {}: {e}", path.display())))?;
    load_public_key(&bytes)
}
