//! Harness configuration.
//!
//! The harness reads one TOML file. Every table is optional; missing values fall
//! back to defaults that match the sandbox environment. Secrets may be left out of
//! the file and supplied through environment variables instead (see
//! [`HarnessConfig::apply_env`]).
//!
//! # Examples
//!
//! ```
//! use pgw_envelope::{config::HarnessConfig, environment::Environment};
//!
//! let config = HarnessConfig::from_toml(r#"
//!     environment = "sandbox"
//!
//!     [merchant]
//!     merchant_id = "704704000000000"
//!
//!     [keys]
//!     private_key = "keys/merchant.pfx"
//!     public_key = "keys/gateway.cer"
//!
//!     [endpoints.sandbox]
//!     payment_action = "http://127.0.0.1:9000/action"
//! "#).unwrap();
//!
//! assert_eq!(config.environment, Environment::Sandbox);
//! assert_eq!(config.endpoint_table().unwrap().override_count(), 1);
//! ```

use std::{
    collections::HashMap,
    fmt,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::{
    environment::{ApiKind, EndpointTable, Environment},
    error::{HarnessError, Result},
    keys::{self, DEFAULT_KEY_ID, KeyMaterial},
    transport::HttpConfig,
};

/// Environment variable holding the private key passphrase.
pub const ENV_KEY_PASSPHRASE: &str = "PGW_KEY_PASSPHRASE";
/// Environment variable holding the merchant HS256 secret.
pub const ENV_MERCHANT_SECRET: &str = "PGW_MERCHANT_SECRET";
/// Environment variable holding the webhook token secret.
pub const ENV_WEBHOOK_SECRET: &str = "PGW_WEBHOOK_SECRET";

/// Default number of captured webhooks kept in memory.
pub const DEFAULT_WEBHOOK_CAPACITY: usize = 1000;

/// A secret string that is wiped from memory on drop and never printed.
#[derive(Clone, Default, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the secret value.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns the secret as raw bytes, as used for HS256 keys.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Whether the secret is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([REDACTED])")
    }
}

/// Root harness configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarnessConfig {
    /// Target environment.
    #[serde(default)]
    pub environment: Environment,

    /// Merchant identity and HS256 secret.
    #[serde(default)]
    pub merchant: MerchantSettings,

    /// Key files for the Payment Action envelope.
    #[serde(default)]
    pub keys: KeySettings,

    /// HTTP transport settings.
    #[serde(default)]
    pub http: HttpConfig,

    /// Endpoint overrides keyed by environment name, then API name.
    #[serde(default)]
    pub endpoints: HashMap<String, HashMap<String, String>>,

    /// Webhook capture server settings.
    #[serde(default)]
    pub webhook: WebhookSettings,
}

/// Merchant identity.
#[derive(Debug, Clone, Deserialize)]
pub struct MerchantSettings {
    /// Merchant ID issued by the gateway.
    #[serde(default)]
    pub merchant_id: String,

    /// HS256 secret for JWT-signed APIs.
    #[serde(default)]
    pub secret: Option<Secret>,

    /// Default ISO 4217 currency.
    #[serde(default = "default_currency_code")]
    pub currency_code: String,

    /// Default locale.
    #[serde(default = "default_locale")]
    pub locale: String,
}

impl Default for MerchantSettings {
    fn default() -> Self {
        Self {
            merchant_id: String::new(),
            secret: None,
            currency_code: default_currency_code(),
            locale: default_locale(),
        }
    }
}

/// Key file locations.
#[derive(Debug, Clone, Deserialize)]
pub struct KeySettings {
    /// Merchant private key (`.pfx`, `.p12`, `.pem` or `.key`).
    #[serde(default)]
    pub private_key: Option<PathBuf>,

    /// Passphrase of the private key.
    #[serde(default)]
    pub passphrase: Option<Secret>,

    /// Gateway public key or certificate (PEM or DER).
    #[serde(default)]
    pub public_key: Option<PathBuf>,

    /// `kid` written into both envelope headers.
    #[serde(default = "default_key_id")]
    pub key_id: String,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self { private_key: None, passphrase: None, public_key: None, key_id: default_key_id() }
    }
}

impl KeySettings {
    /// Loads the configured key pair.
    ///
    /// Relative paths are resolved against `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] when either path is missing, or
    /// [`HarnessError::KeyLoad`] when a file cannot be loaded.
    pub fn load(&self, base_dir: &Path) -> Result<KeyMaterial> {
        let private_path = self
            .private_key
            .as_deref()
            .ok_or_else(|| HarnessError::Config("keys.private_key is not set".to_owned()))?;
        let public_path = self
            .public_key
            .as_deref()
            .ok_or_else(|| HarnessError::Config("keys.public_key is not set".to_owned()))?;

        let private_key = keys::load_private_key_file(
            base_dir.join(private_path),
            self.passphrase.as_ref().map(Secret::expose),
        )?;
        let public_key = keys::load_public_key_file(base_dir.join(public_path))?;

        Ok(KeyMaterial::new(private_key, public_key).with_key_id(self.key_id.clone()))
    }
}

/// Webhook capture server settings.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    /// Listen address.
    #[serde(default = "default_webhook_bind")]
    pub bind: SocketAddr,

    /// HS256 secret guarding capture and listing routes. Unset disables the guard.
    #[serde(default)]
    pub secret: Option<Secret>,

    /// Maximum number of stored webhooks.
    #[serde(default = "default_webhook_capacity")]
    pub capacity: usize,
}

impl Default for WebhookSettings {
    fn default() -> Self {
        Self { bind: default_webhook_bind(), secret: None, capacity: default_webhook_capacity() }
    }
}

impl HarnessConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] on syntax errors or invalid values.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| HarnessError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if the file cannot be read or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Validates value ranges and endpoint overrides.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<()> {
        self.http.validate()?;

        if self.webhook.capacity == 0 {
            return Err(HarnessError::Config("webhook.capacity must be at least 1".to_owned()));
        }
        if self.keys.key_id.is_empty() {
            return Err(HarnessError::Config("keys.key_id must not be empty".to_owned()));
        }
        if !self.merchant.merchant_id.is_empty()
            && !self.merchant.merchant_id.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(HarnessError::Config(format!(
                "merchant.merchant_id '{}' must be alphanumeric",
                self.merchant.merchant_id
            )));
        }

        self.endpoint_table().map(|_| ())
    }

    /// Builds the endpoint catalog with this configuration's overrides.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] for unknown environment or API names and
    /// for URLs that are not absolute `http(s)`.
    pub fn endpoint_table(&self) -> Result<EndpointTable> {
        let mut table = EndpointTable::default();
        for (environment_name, apis) in &self.endpoints {
            let environment: Environment = environment_name.parse().map_err(|_| {
                HarnessError::Config(format!("unknown environment '{environment_name}' in endpoints"))
            })?;
            for (api_name, url) in apis {
                let api = ApiKind::ALL
                    .into_iter()
                    .find(|api| api.as_str() == api_name)
                    .ok_or_else(|| {
                        HarnessError::Config(format!(
                            "unknown API '{api_name}' in endpoints.{environment_name}"
                        ))
                    })?;
                table.set_override(api, environment, url.clone())?;
            }
        }
        Ok(table)
    }

    /// Fills unset secrets from the process environment.
    ///
    /// See [`Self::apply_env_from`].
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Fills unset secrets using `lookup`.
    ///
    /// Values already present in the file win. Empty values are ignored.
    /// Reads [`ENV_KEY_PASSPHRASE`], [`ENV_MERCHANT_SECRET`] and
    /// [`ENV_WEBHOOK_SECRET`].
    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let fill = |slot: &mut Option<Secret>, name: &str| {
            if slot.is_none()
                && let Some(value) = lookup(name).filter(|v| !v.is_empty())
            {
                *slot = Some(Secret::new(value));
            }
        };
        fill(&mut self.keys.passphrase, ENV_KEY_PASSPHRASE);
        fill(&mut self.merchant.secret, ENV_MERCHANT_SECRET);
        fill(&mut self.webhook.secret, ENV_WEBHOOK_SECRET);
    }

    /// Merchant HS256 secret.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] if no non-empty secret is configured.
    pub fn merchant_secret(&self) -> Result<&Secret> {
        self.merchant.secret.as_ref().filter(|s| !s.is_empty()).ok_or_else(|| {
            HarnessError::Config(format!(
                "merchant.secret is not set (config file or {ENV_MERCHANT_SECRET})"
            ))
        })
    }
}

fn default_currency_code() -> String {
    "VND".to_owned()
}

fn default_locale() -> String {
    "en".to_owned()
}

fn default_key_id() -> String {
    DEFAULT_KEY_ID.to_owned()
}

fn default_webhook_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

const fn default_webhook_capacity() -> usize {
    DEFAULT_WEBHOOK_CAPACITY
}
