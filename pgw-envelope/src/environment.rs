//! Gateway environments and their endpoint catalog.
//!
//! Every API is deployed in three environments. [`default_endpoint`] returns the
//! published URL; [`EndpointTable`] layers configured overrides on top.
//!
//! # Examples
//!
//! ```
//! use pgw_envelope::environment::{ApiKind, EndpointTable, Environment, default_endpoint};
//!
//! # fn example() -> pgw_envelope::error::Result<()> {
//! assert_eq!(
//!     default_endpoint(ApiKind::PaymentAction, Environment::Sandbox),
//!     "https://demo2.2c2p.com/2C2PFrontend/PaymentAction/2.0/action",
//! );
//!
//! let mut table = EndpointTable::default();
//! table.set_override(ApiKind::PaymentToken, Environment::Sandbox, "http://127.0.0.1:8080/token")?;
//! assert_eq!(table.resolve(ApiKind::PaymentToken, Environment::Sandbox), "http://127.0.0.1:8080/token");
//! # Ok(())
//! # }
//! ```

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{HarnessError, Result};

/// Deployment the harness talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// UAT / sandbox.
    #[default]
    Sandbox,
    /// Production.
    Production,
    /// MPay production.
    MpayProduction,
}

impl Environment {
    /// All environments in display order.
    pub const ALL: [Self; 3] = [Self::Sandbox, Self::Production, Self::MpayProduction];

    /// Stable lowercase name, as used in configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sandbox => "sandbox",
            Self::Production => "production",
            Self::MpayProduction => "mpay_production",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "sandbox" | "uat" => Ok(Self::Sandbox),
            "production" | "prod" => Ok(Self::Production),
            "mpay_production" | "mpay" => Ok(Self::MpayProduction),
            other => Err(HarnessError::InvalidInput(format!("unknown environment '{other}'"))),
        }
    }
}

/// Gateway API family member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKind {
    /// Payment Token (JWT).
    PaymentToken,
    /// Payment Option (JSON).
    PaymentOption,
    /// Payment Option Details (JSON).
    PaymentOptionDetails,
    /// Do Payment (JSON).
    DoPayment,
    /// Transaction Status (JSON).
    TransactionStatus,
    /// Payment Inquiry (JWT).
    PaymentInquiry,
    /// POS order creation (JWT in JSON).
    PaymentPos,
    /// Payment Action (JWS over JWE over XML).
    PaymentAction,
}

impl ApiKind {
    /// All APIs.
    pub const ALL: [Self; 8] = [
        Self::PaymentToken,
        Self::PaymentOption,
        Self::PaymentOptionDetails,
        Self::DoPayment,
        Self::TransactionStatus,
        Self::PaymentInquiry,
        Self::PaymentPos,
        Self::PaymentAction,
    ];

    /// Stable lowercase name, as used in configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::PaymentToken => "payment_token",
            Self::PaymentOption => "payment_option",
            Self::PaymentOptionDetails => "payment_option_details",
            Self::DoPayment => "do_payment",
            Self::TransactionStatus => "transaction_status",
            Self::PaymentInquiry => "payment_inquiry",
            Self::PaymentPos => "payment_pos",
            Self::PaymentAction => "payment_action",
        }
    }
}

impl fmt::Display for ApiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Published endpoint of `api` in `environment`.
#[must_use]
pub const fn default_endpoint(api: ApiKind, environment: Environment) -> &'static str {
    use ApiKind as A;
    use Environment as E;

    match (api, environment) {
        (A::PaymentAction, E::Sandbox) => {
            "https://demo2.2c2p.com/2C2PFrontend/PaymentAction/2.0/action"
        }
        (A::PaymentAction, E::Production) => "https://t.2c2p.com/PaymentAction/2.0/action",
        (A::PaymentAction, E::MpayProduction) => {
            "https://pgwcore.m-pay.vn/PaymentActionV2/2.0/action"
        }

        (A::DoPayment, E::Sandbox) => "https://sandbox-pgw.2c2p.com/payment/4.3/payment",
        (A::DoPayment, E::Production) => "https://pgw.2c2p.com/payment/4.3/payment",
        (A::DoPayment, E::MpayProduction) => "https://pgw.m-pay.vn/payment/4.1/payment",

        (A::PaymentOption, E::Sandbox) => "https://sandbox-pgw.2c2p.com/payment/4.3/paymentOption",
        (A::PaymentOption, E::Production) => "https://pgw.2c2p.com/payment/4.3/paymentOption",
        (A::PaymentOption, E::MpayProduction) => "https://pgw.m-pay.vn/payment/4.1/paymentOption",

        (A::PaymentOptionDetails, E::Sandbox) => {
            "https://sandbox-pgw.2c2p.com/payment/4.3/paymentOptionDetails"
        }
        (A::PaymentOptionDetails, E::Production) => {
            "https://pgw.2c2p.com/payment/4.3/paymentOptionDetails"
        }
        (A::PaymentOptionDetails, E::MpayProduction) => {
            "https://pgw.m-pay.vn/payment/4.1/paymentOptionDetails"
        }

        (A::TransactionStatus, E::Sandbox) => {
            "https://sandbox-pgw.2c2p.com/payment/4.3/transactionStatus"
        }
        (A::TransactionStatus, E::Production) => {
            "https://pgw.2c2p.com/payment/4.3/transactionStatus"
        }
        (A::TransactionStatus, E::MpayProduction) => {
            "https://pgw.m-pay.vn/payment/4.3/transactionStatus"
        }

        (A::PaymentInquiry, E::Sandbox) => {
            "https://sandbox-pgw.2c2p.com/payment/4.3/paymentInquiry"
        }
        (A::PaymentInquiry, E::Production) => "https://pgw.2c2p.com/payment/4.3/paymentInquiry",
        (A::PaymentInquiry, E::MpayProduction) => {
            "https://pgw.m-pay.vn/payment/4.3/paymentInquiry"
        }

        (A::PaymentPos, E::Sandbox) => "https://sandbox-pgw.2c2p.com/pos/v4.4/order/create",
        (A::PaymentPos, E::Production) => "https://posgw.2c2p.com/pos/4.4/order/create",
        (A::PaymentPos, E::MpayProduction) => "https://posgw.m-pay.vn/pos/4.4/order/create",

        (A::PaymentToken, E::Sandbox) => "https://sandbox-pgw.2c2p.com/payment/4.3/paymentToken",
        (A::PaymentToken, E::Production) => "https://pgw.2c2p.com/payment/4.3/paymentToken",
        (A::PaymentToken, E::MpayProduction) => "https://pgw.m-pay.vn/payment/4.1/paymentToken",
    }
}

/// Endpoint catalog with validated per-environment overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointTable {
    overrides: HashMap<(ApiKind, Environment), String>,
}

impl EndpointTable {
    /// Replaces the endpoint of `api` in `environment`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] unless `url` is an absolute `http` or
    /// `https` URL with a host.
    pub fn set_override(
        &mut self,
        api: ApiKind,
        environment: Environment,
        url: impl Into<String>,
    ) -> Result<()> {
        let url = url.into();
        validate_endpoint(&url)?;
        self.overrides.insert((api, environment), url);
        Ok(())
    }

    /// Endpoint of `api` in `environment`: the override if set, else the default.
    #[must_use]
    pub fn resolve(&self, api: ApiKind, environment: Environment) -> &str {
        self.overrides
            .get(&(api, environment))
            .map_or_else(|| default_endpoint(api, environment), String::as_str)
    }

    /// Number of overrides.
    #[must_use]
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }
}

/// Checks that `url` is an absolute `http(s)` URL with a host.
///
/// # Errors
///
/// Returns [`HarnessError::Config`] describing the problem.
pub fn validate_endpoint(url: &str) -> Result<()> {
    let parsed = Url::parse(url)
        .map_err(|e| HarnessError::Config(format!("invalid endpoint URL '{url}': {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(HarnessError::Config(format!(
            "endpoint URL '{url}' must use http or https"
        )));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(HarnessError::Config(format!("endpoint URL '{url}' has no host")));
    }
    Ok(())
}
