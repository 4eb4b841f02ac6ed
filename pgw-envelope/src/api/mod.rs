//! Typed request models for the gateway APIs driven by the harness.
//!
//! | API                    | Model                           | Encoding                      |
//! |------------------------|---------------------------------|-------------------------------|
//! | Payment Action         | [`PaymentActionRequest`]        | XML in JWS(JWE), `text/plain` |
//! | Payment Token          | [`PaymentTokenRequest`]         | HS256 JWT in `{"payload"}`    |
//! | Payment Inquiry        | [`PaymentInquiryRequest`]       | HS256 JWT in `{"payload"}`    |
//! | POS order              | [`PosOrderRequest`]             | HS256 JWT as `paymentToken`   |
//! | Payment Option         | [`PaymentOptionRequest`]        | JSON                          |
//! | Payment Option Details | [`PaymentOptionDetailsRequest`] | JSON                          |
//! | Transaction Status     | [`TransactionStatusRequest`]    | JSON                          |
//! | Do Payment             | [`DoPaymentRequest`]            | JSON                          |
//!
//! Optional fields are typed and omitted from the wire when `None`.

mod action;
mod options;
mod payment;
mod token;

use chrono::Local;
pub use action::{
    ACTION_FIELD_ORDER, DEFAULT_ACTION_VERSION, PaymentActionRequest, ProcessType,
    action_timestamp,
};
pub use options::{PaymentOptionDetailsRequest, PaymentOptionRequest, TransactionStatusRequest};
pub use payment::{DoPaymentRequest, PaymentCode, PaymentDetails, PosOrderClaims, PosOrderRequest};
use serde::{Deserialize, Serialize};
pub use token::{PaymentInquiryRequest, PaymentTokenRequest};
use uuid::Uuid;

/// `Y`/`N` flag used by several optional request fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum YesNo {
    /// `Y`
    #[serde(rename = "Y")]
    Yes,
    /// `N`
    #[serde(rename = "N")]
    No,
}

impl From<bool> for YesNo {
    fn from(value: bool) -> Self {
        if value { Self::Yes } else { Self::No }
    }
}

/// Invoice number of the form `INVyyMMddHHmmss`.
#[must_use]
pub fn generate_invoice_no() -> String {
    Local::now().format("INV%y%m%d%H%M%S").to_string()
}

/// POS invoice number of the form `INV-POS-yyMMddHHmmss`.
#[must_use]
pub fn generate_pos_invoice_no() -> String {
    Local::now().format("INV-POS-%y%m%d%H%M%S").to_string()
}

/// Idempotency key of the form `idem-yyMMddHHmmss`.
#[must_use]
pub fn generate_idempotency_id() -> String {
    Local::now().format("idem-%y%m%d%H%M%S").to_string()
}

/// Random client id: 32 upper-case hex digits.
#[must_use]
pub fn generate_client_id() -> String {
    Uuid::new_v4().simple().to_string().to_ascii_uppercase()
}

/// Serializes amounts as JSON numbers, integers when the value is whole.
pub(crate) mod amount {
    use rust_decimal::{Decimal, prelude::ToPrimitive};
    use serde::{Deserialize, Deserializer, Serializer, ser::Error};

    pub(crate) fn serialize<S: Serializer>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error> {
        if value.fract().is_zero()
            && let Some(whole) = value.to_i64()
        {
            return serializer.serialize_i64(whole);
        }
        let float = value
            .to_f64()
            .ok_or_else(|| S::Error::custom(format!("amount {value} is out of range")))?;
        serializer.serialize_f64(float)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Decimal, D::Error> {
        <Decimal as Deserialize>::deserialize(deserializer)
    }

    #[allow(clippy::ref_option, reason = "signature required by serde serialize_with")]
    pub(crate) fn serialize_option<S: Serializer>(
        value: &Option<Decimal>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(value) => serialize(value, serializer),
            None => serializer.serialize_none(),
        }
    }
}
