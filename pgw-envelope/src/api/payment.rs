//! Do Payment and POS order requests.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::amount;

/// Channel selection of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCode {
    /// Channel code, e.g. `CC`, `POSCC`, `VNQR`.
    pub channel_code: String,
    /// Agent code for agent based channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_code: Option<String>,
    /// Agent channel code for agent based channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_channel_code: Option<String>,
}

impl PaymentCode {
    /// Channel code without agent information.
    #[must_use]
    pub fn channel(channel_code: impl Into<String>) -> Self {
        Self { channel_code: channel_code.into(), agent_code: None, agent_channel_code: None }
    }
}

/// `payment` member of a Do Payment body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Channel selection.
    pub code: PaymentCode,
    /// Channel specific data (card holder, email, loyalty points, ...).
    #[serde(default)]
    pub data: Value,
}

/// Do Payment request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoPaymentRequest {
    /// Token returned by the Payment Token API, or a signed POS order.
    pub payment_token: String,
    /// Client id.
    #[serde(rename = "clientID")]
    pub client_id: String,
    /// Client IP address; POS orders leave it out.
    #[serde(rename = "clientIP", default, skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    /// Response locale.
    pub locale: String,
    /// Where the payer's browser is sent afterwards.
    pub response_return_url: String,
    /// Channel and channel data.
    pub payment: PaymentDetails,
}

/// Claims of a POS order, signed with the merchant secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PosOrderClaims {
    /// Merchant identifier. Note the POS API spells it `merchantId`.
    pub merchant_id: String,
    /// Merchant invoice number.
    pub invoice_no: String,
    /// Free text description.
    pub description: String,
    /// Order amount.
    #[serde(with = "amount")]
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: String,
    /// Idempotency key.
    #[serde(rename = "idempotencyID")]
    pub idempotency_id: String,
    /// Terminal reference.
    #[serde(rename = "userDefined1", default, skip_serializing_if = "Option::is_none")]
    pub user_defined_1: Option<String>,
}

/// A POS order: signed claims plus the body fields around them.
#[derive(Debug, Clone, PartialEq)]
pub struct PosOrderRequest {
    /// Claims placed in the `paymentToken` field as an HS256 JWT.
    pub claims: PosOrderClaims,
    /// Client id.
    pub client_id: String,
    /// Response locale.
    pub locale: String,
    /// Where the payer's browser is sent afterwards.
    pub response_return_url: String,
    /// POS channel, `POSCC` or `VNQR`.
    pub channel_code: String,
    /// Customer data (`name`, `email`).
    pub customer: Value,
}

impl PosOrderRequest {
    /// Builds the wire body around an already signed order token.
    #[must_use]
    pub fn body(&self, payment_token: String) -> DoPaymentRequest {
        DoPaymentRequest {
            payment_token,
            client_id: self.client_id.clone(),
            client_ip: None,
            locale: self.locale.clone(),
            response_return_url: self.response_return_url.clone(),
            payment: PaymentDetails {
                code: PaymentCode::channel(self.channel_code.clone()),
                data: self.customer.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_do_payment_wire_format() {
        let request = DoPaymentRequest {
            payment_token: "tok".into(),
            client_id: "C1".into(),
            client_ip: Some("127.0.0.1".into()),
            locale: "en".into(),
            response_return_url: "https://merchant.example.com/return".into(),
            payment: PaymentDetails {
                code: PaymentCode {
                    channel_code: "CC".into(),
                    agent_code: None,
                    agent_channel_code: Some("WEBPAY".into()),
                },
                data: json!({"name": "A", "email": "a@example.com"}),
            },
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "paymentToken": "tok",
                "clientID": "C1",
                "clientIP": "127.0.0.1",
                "locale": "en",
                "responseReturnUrl": "https://merchant.example.com/return",
                "payment": {
                    "code": {"channelCode": "CC", "agentChannelCode": "WEBPAY"},
                    "data": {"name": "A", "email": "a@example.com"},
                },
            })
        );
    }

    #[test]
    fn test_pos_claims_spelling() {
        let claims = PosOrderClaims {
            merchant_id: "M1".into(),
            invoice_no: "INV-POS-1".into(),
            description: "d".into(),
            amount: Decimal::from(5000),
            currency_code: "VND".into(),
            idempotency_id: "idem-1".into(),
            user_defined_1: None,
        };
        assert_eq!(
            serde_json::to_value(&claims).unwrap(),
            json!({
                "merchantId": "M1",
                "invoiceNo": "INV-POS-1",
                "description": "d",
                "amount": 5000,
                "currencyCode": "VND",
                "idempotencyID": "idem-1",
            })
        );
    }

    #[test]
    fn test_pos_body_has_no_client_ip() {
        let order = PosOrderRequest {
            claims: PosOrderClaims {
                merchant_id: "M1".into(),
                invoice_no: "INV-POS-1".into(),
                description: "d".into(),
                amount: Decimal::from(1),
                currency_code: "VND".into(),
                idempotency_id: "idem-1".into(),
                user_defined_1: Some("00024500937".into()),
            },
            client_id: "C1".into(),
            locale: "en".into(),
            response_return_url: "https://r.example.com".into(),
            channel_code: "VNQR".into(),
            customer: json!({"name": "A", "email": "a@example.com"}),
        };
        let body = serde_json::to_value(order.body("signed".into())).unwrap();
        assert_eq!(body["paymentToken"], "signed");
        assert_eq!(body["payment"]["code"], json!({"channelCode": "VNQR"}));
        assert!(body.get("clientIP").is_none());
    }
}
