//! Plain JSON requests that operate on an issued payment token.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payment Option request: lists the channels available for a payment token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOptionRequest {
    /// Token returned by the Payment Token API.
    pub payment_token: String,
    /// Client id, see [`super::generate_client_id`].
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Response locale.
    pub locale: String,
    /// Free form browser description (`deviceType`, `name`, `os`, `version`).
    #[serde(default)]
    pub browser_details: Value,
}

/// Payment Option Details request: lists the options of one channel group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOptionDetailsRequest {
    /// Token returned by the Payment Token API.
    pub payment_token: String,
    /// Client id.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Response locale.
    pub locale: String,
    /// Channel category, e.g. `GCARD`.
    pub category_code: String,
    /// Channel group, e.g. `CC`.
    pub group_code: String,
}

/// Transaction Status request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatusRequest {
    /// Token returned by the Payment Token API.
    pub payment_token: String,
    /// Client id.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Response locale.
    pub locale: String,
    /// Ask for additional transaction details.
    pub additional_info: bool,
}
