//! JWT-signed request payloads: Payment Token and Payment Inquiry.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{YesNo, amount};

/// Claims of a Payment Token request.
///
/// Signed with the merchant secret and posted as `{"payload": "<jwt>"}`. Optional
/// fields left as `None` are omitted from the claims.
///
/// # Examples
///
/// ```
/// use pgw_envelope::api::{PaymentTokenRequest, YesNo};
/// use rust_decimal::Decimal;
///
/// let mut request = PaymentTokenRequest::new("704704000000000", "INV240101", Decimal::from(5000), "VND");
/// request.request_3ds = Some(YesNo::Yes);
///
/// let json = serde_json::to_value(&request)?;
/// assert_eq!(json["merchantID"], "704704000000000");
/// assert_eq!(json["amount"], 5000);
/// assert_eq!(json["paymentChannel"][0], "ALL");
/// assert_eq!(json["request3DS"], "Y");
/// assert!(json.get("locale").is_none());
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTokenRequest {
    /// Merchant identifier.
    #[serde(rename = "merchantID")]
    pub merchant_id: String,
    /// Merchant invoice number.
    pub invoice_no: String,
    /// Free text description.
    pub description: String,
    /// Payment amount.
    #[serde(with = "amount")]
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: String,
    /// Allowed payment channels, e.g. `ALL`, `CC`, `IPP`, `APM`, `QR`.
    pub payment_channel: Vec<String>,

    /// Agent channel filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_channel: Option<String>,
    /// Page locale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    /// Request 3-D Secure authentication.
    #[serde(rename = "request3DS", default, skip_serializing_if = "Option::is_none")]
    pub request_3ds: Option<YesNo>,
    /// Tokenize the card for later use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenize: Option<bool>,
    /// Stored customer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_token: Option<String>,
    /// Only allow payment with the stored customer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_token_only: Option<YesNo>,
    /// Tokenize without charging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokenize_only: Option<YesNo>,
    /// Store credentials for merchant initiated transactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_credentials: Option<YesNo>,
    /// Installment interest type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interest_type: Option<String>,
    /// Installment period filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment_period_filter: Option<String>,
    /// Installment bank filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installment_bank_filter: Option<String>,
    /// Product code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_code: Option<String>,
    /// Recurring payment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<YesNo>,
    /// Invoice prefix for recurring charges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_prefix: Option<String>,
    /// Amount of each recurring charge.
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "amount::serialize_option")]
    pub recurring_amount: Option<Decimal>,
    /// Allow accumulation of failed recurring charges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_accumulate: Option<YesNo>,
    /// Ceiling for accumulated recurring charges.
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "amount::serialize_option")]
    pub max_accumulate_amount: Option<Decimal>,
    /// Days between recurring charges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_interval: Option<String>,
    /// Number of recurring charges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring_count: Option<u32>,
    /// Date of the next recurring charge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_next_date: Option<String>,
    /// Day of month for recurring charges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub charge_on_date: Option<String>,
    /// Expiry of the payment token, `yyyy-MM-dd HH:mm:ss`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_expiry: Option<String>,
    /// Promotion code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promotion_code: Option<String>,
    /// Payment route id.
    #[serde(rename = "paymentRouteID", default, skip_serializing_if = "Option::is_none")]
    pub payment_route_id: Option<String>,
    /// FX provider code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fx_provider_code: Option<String>,
    /// Amount in the original currency.
    #[serde(default, skip_serializing_if = "Option::is_none", serialize_with = "amount::serialize_option")]
    pub original_amount: Option<Decimal>,
    /// Charge immediately.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immediate_payment: Option<YesNo>,
    /// Idempotency key.
    #[serde(rename = "idempotencyID", default, skip_serializing_if = "Option::is_none")]
    pub idempotency_id: Option<String>,
}

impl PaymentTokenRequest {
    /// Creates a request for all channels with description `Payment <invoice>`.
    #[must_use]
    pub fn new(
        merchant_id: impl Into<String>,
        invoice_no: impl Into<String>,
        amount: Decimal,
        currency_code: impl Into<String>,
    ) -> Self {
        let invoice_no = invoice_no.into();
        Self {
            merchant_id: merchant_id.into(),
            description: format!("Payment {invoice_no}"),
            invoice_no,
            amount,
            currency_code: currency_code.into(),
            payment_channel: vec!["ALL".to_owned()],
            agent_channel: None,
            locale: None,
            request_3ds: None,
            tokenize: None,
            customer_token: None,
            customer_token_only: None,
            tokenize_only: None,
            store_credentials: None,
            interest_type: None,
            installment_period_filter: None,
            installment_bank_filter: None,
            product_code: None,
            recurring: None,
            invoice_prefix: None,
            recurring_amount: None,
            allow_accumulate: None,
            max_accumulate_amount: None,
            recurring_interval: None,
            recurring_count: None,
            charge_next_date: None,
            charge_on_date: None,
            payment_expiry: None,
            promotion_code: None,
            payment_route_id: None,
            fx_provider_code: None,
            original_amount: None,
            immediate_payment: None,
            idempotency_id: None,
        }
    }
}

/// Claims of a Payment Inquiry request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentInquiryRequest {
    /// Merchant identifier.
    #[serde(rename = "merchantID")]
    pub merchant_id: String,
    /// Invoice to look up.
    pub invoice_no: String,
    /// Response locale.
    pub locale: String,
}
