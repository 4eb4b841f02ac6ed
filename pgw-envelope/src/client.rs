//! Gateway client: build, encode, send and decode for each API.
//!
//! Every call returns an exchange record holding each intermediate stage, so the
//! harness can show what was sent and what came back even when decoding fails.
//! Transport and encoding failures are errors; a response that arrives but cannot
//! be decoded is not. It is recorded in the exchange next to the raw body.
//!
//! # Examples
//!
//! ```rust,no_run
//! use pgw_envelope::{
//!     api::{PaymentActionRequest, ProcessType},
//!     client::GatewayClient,
//!     config::HarnessConfig,
//! };
//!
//! # async fn example() -> pgw_envelope::error::Result<()> {
//! let config = HarnessConfig::from_file("pgw.toml")?;
//! let keys = config.keys.load(std::path::Path::new("."))?;
//! let client = GatewayClient::from_config(&config)?;
//!
//! let request = PaymentActionRequest::new("704704000000211", "INV240101120000", ProcessType::Inquiry);
//! let exchange = client.payment_action(&request, &keys).await?;
//!
//! println!("HTTP {} in {:?}", exchange.status, exchange.elapsed);
//! match &exchange.decoded {
//!     Ok(decoded) => println!("{}", decoded.pretty_xml),
//!     Err(e) => println!("failed at stage {}: {e}\n{}", e.stage(), exchange.raw_response),
//! }
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::{
    api::{
        DoPaymentRequest, PaymentActionRequest, PaymentInquiryRequest, PaymentOptionDetailsRequest,
        PaymentOptionRequest, PaymentTokenRequest, PosOrderRequest, TransactionStatusRequest,
    },
    config::HarnessConfig,
    envelope::{OpenedEnvelope, SealedEnvelope, decode_response, encode_request},
    environment::{ApiKind, EndpointTable, Environment},
    error::{HarnessError, Result},
    jwt::{extract_response_payload, sign_payload, wrap_payload},
    keys::KeyMaterial,
    transport::{HttpTransport, Transport, TransportResponse},
    xml::{XmlDocument, build_request_xml, parse_response_xml, pretty_print},
};

/// Decoded Payment Action response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedResponse {
    /// Verified and decrypted envelope.
    pub envelope: OpenedEnvelope,
    /// Response XML with two-space indentation.
    pub pretty_xml: String,
    /// Parsed response XML, `None` if the payload is not well-formed.
    pub document: Option<XmlDocument>,
}

impl DecodedResponse {
    fn from_envelope(envelope: OpenedEnvelope) -> Self {
        let pretty_xml = pretty_print(&envelope.xml);
        let document = parse_response_xml(&envelope.xml).ok();
        Self { envelope, pretty_xml, document }
    }

    /// Text of a top-level response field such as `respCode`.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<String> {
        self.document.as_ref()?.root.child_text(name)
    }
}

/// One Payment Action round trip.
#[derive(Debug)]
pub struct PaymentActionExchange {
    /// Endpoint called.
    pub url: String,
    /// Every stage of the outbound envelope.
    pub sealed: SealedEnvelope,
    /// HTTP status.
    pub status: u16,
    /// Round trip time.
    pub elapsed: Duration,
    /// Response body as received.
    pub raw_response: String,
    /// Decoded response, or the stage at which decoding failed.
    pub decoded: Result<DecodedResponse>,
}

/// One round trip of a JWT-signed JSON API.
#[derive(Debug)]
pub struct JwtExchange {
    /// Endpoint called.
    pub url: String,
    /// Claims that were signed.
    pub claims: Value,
    /// Compact HS256 JWT.
    pub token: String,
    /// JSON body sent.
    pub request: Value,
    /// HTTP status.
    pub status: u16,
    /// Round trip time.
    pub elapsed: Duration,
    /// Response body as received.
    pub raw_response: String,
    /// Unverified claims of the response `payload` member, `Ok(None)` if absent.
    pub decoded_payload: Result<Option<Value>>,
}

/// One round trip of a plain JSON API.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonExchange {
    /// Endpoint called.
    pub url: String,
    /// JSON body sent.
    pub request: Value,
    /// HTTP status.
    pub status: u16,
    /// Round trip time.
    pub elapsed: Duration,
    /// Response body as received.
    pub raw_response: String,
    /// Response body parsed as JSON, `None` if it is not JSON.
    pub parsed: Option<Value>,
}

fn to_json(request: &impl Serialize) -> Result<Value> {
    serde_json::to_value(request)
        .map_err(|e| HarnessError::InvalidInput(format!("cannot serialize request: {e}")))
}

fn log_response(api: ApiKind, response: &TransportResponse) {
    let elapsed_ms = response.elapsed.as_millis();
    if response.is_success() {
        info!(%api, status = response.status, elapsed_ms, "gateway responded");
    } else {
        warn!(%api, status = response.status, elapsed_ms, "gateway returned non-success status");
    }
}

/// Client for one environment of the gateway.
#[derive(Debug)]
pub struct GatewayClient<T: Transport = HttpTransport> {
    transport: T,
    endpoints: EndpointTable,
    environment: Environment,
}

impl GatewayClient<HttpTransport> {
    /// HTTP client for the configured environment, endpoints and timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] for invalid HTTP settings or endpoint
    /// overrides.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let transport = HttpTransport::with_config(&config.http)?;
        Ok(Self::new(transport, config.environment).with_endpoints(config.endpoint_table()?))
    }
}

impl<T: Transport> GatewayClient<T> {
    /// Client using the default endpoints of `environment`.
    #[must_use]
    pub fn new(transport: T, environment: Environment) -> Self {
        Self { transport, endpoints: EndpointTable::default(), environment }
    }

    /// Replaces the endpoint table.
    #[must_use]
    pub fn with_endpoints(mut self, endpoints: EndpointTable) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Target environment.
    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.environment
    }

    /// Endpoint of `api` in this client's environment.
    #[must_use]
    pub fn endpoint(&self, api: ApiKind) -> &str {
        self.endpoints.resolve(api, self.environment)
    }

    /// Sends a Payment Action (inquiry, refund or void).
    ///
    /// The XML is encrypted to the gateway key and signed with the merchant key
    /// from `keys`, posted as `text/plain`, and the response is verified,
    /// decrypted and pretty-printed.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be built, sealed or sent. Response
    /// decoding errors are reported in [`PaymentActionExchange::decoded`].
    #[instrument(
        skip(self, request, keys),
        fields(
            environment = %self.environment,
            invoice_no = %request.invoice_no,
            process_type = %request.process_type
        )
    )]
    pub async fn payment_action(
        &self,
        request: &PaymentActionRequest,
        keys: &KeyMaterial,
    ) -> Result<PaymentActionExchange> {
        let url = self.endpoint(ApiKind::PaymentAction);
        let xml = build_request_xml(request)?;
        let sealed = encode_request(&xml, keys.public_key(), keys.private_key(), keys.key_id())?;

        let response = self.transport.post_text(url, sealed.as_str()).await?;
        log_response(ApiKind::PaymentAction, &response);

        let decoded = decode_response(&response.body, keys.private_key(), keys.public_key())
            .map(DecodedResponse::from_envelope);
        if let Err(e) = &decoded {
            warn!(stage = %e.stage(), error = %e, "response could not be decoded");
        }

        Ok(PaymentActionExchange {
            url: url.to_owned(),
            sealed,
            status: response.status,
            elapsed: response.elapsed,
            raw_response: response.body,
            decoded,
        })
    }

    /// Requests a payment token.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or sending fails.
    #[instrument(skip(self, request, secret), fields(environment = %self.environment, invoice_no = %request.invoice_no))]
    pub async fn payment_token(
        &self,
        request: &PaymentTokenRequest,
        secret: &[u8],
    ) -> Result<JwtExchange> {
        self.send_jwt_payload(ApiKind::PaymentToken, request, secret).await
    }

    /// Looks up a payment by invoice number.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or sending fails.
    #[instrument(skip(self, request, secret), fields(environment = %self.environment, invoice_no = %request.invoice_no))]
    pub async fn payment_inquiry(
        &self,
        request: &PaymentInquiryRequest,
        secret: &[u8],
    ) -> Result<JwtExchange> {
        self.send_jwt_payload(ApiKind::PaymentInquiry, request, secret).await
    }

    /// Creates a POS order. The signed claims travel as the `paymentToken` of a
    /// Do Payment shaped body.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or sending fails.
    #[instrument(skip(self, request, secret), fields(environment = %self.environment, invoice_no = %request.claims.invoice_no))]
    pub async fn pos_order(&self, request: &PosOrderRequest, secret: &[u8]) -> Result<JwtExchange> {
        let claims = to_json(&request.claims)?;
        let token = sign_payload(&claims, secret)?;
        let body = to_json(&request.body(token.clone()))?;
        self.send_jwt(ApiKind::PaymentPos, claims, token, body).await
    }

    /// Lists payment options for a token.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    #[instrument(skip(self, request), fields(environment = %self.environment))]
    pub async fn payment_option(&self, request: &PaymentOptionRequest) -> Result<JsonExchange> {
        self.send_json(ApiKind::PaymentOption, request).await
    }

    /// Lists payment option details for a token and channel group.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    #[instrument(skip(self, request), fields(environment = %self.environment))]
    pub async fn payment_option_details(
        &self,
        request: &PaymentOptionDetailsRequest,
    ) -> Result<JsonExchange> {
        self.send_json(ApiKind::PaymentOptionDetails, request).await
    }

    /// Queries the status of a token's transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    #[instrument(skip(self, request), fields(environment = %self.environment))]
    pub async fn transaction_status(
        &self,
        request: &TransactionStatusRequest,
    ) -> Result<JsonExchange> {
        self.send_json(ApiKind::TransactionStatus, request).await
    }

    /// Executes a payment for a token.
    ///
    /// # Errors
    ///
    /// Returns an error if sending fails.
    #[instrument(skip(self, request), fields(environment = %self.environment))]
    pub async fn do_payment(&self, request: &DoPaymentRequest) -> Result<JsonExchange> {
        self.send_json(ApiKind::DoPayment, request).await
    }

    async fn send_jwt_payload(
        &self,
        api: ApiKind,
        claims: &impl Serialize,
        secret: &[u8],
    ) -> Result<JwtExchange> {
        let claims = to_json(claims)?;
        let token = sign_payload(&claims, secret)?;
        let body = wrap_payload(&token);
        self.send_jwt(api, claims, token, body).await
    }

    async fn send_jwt(
        &self,
        api: ApiKind,
        claims: Value,
        token: String,
        body: Value,
    ) -> Result<JwtExchange> {
        let url = self.endpoint(api);
        let response = self.transport.post_json(url, &body).await?;
        log_response(api, &response);

        let decoded_payload = extract_response_payload(&response.body);
        if let Err(e) = &decoded_payload {
            warn!(%api, error = %e, "response payload could not be decoded");
        }

        Ok(JwtExchange {
            url: url.to_owned(),
            claims,
            token,
            request: body,
            status: response.status,
            elapsed: response.elapsed,
            raw_response: response.body,
            decoded_payload,
        })
    }

    async fn send_json(&self, api: ApiKind, request: &impl Serialize) -> Result<JsonExchange> {
        let url = self.endpoint(api);
        let body = to_json(request)?;
        let response = self.transport.post_json(url, &body).await?;
        log_response(api, &response);

        let parsed = serde_json::from_str(&response.body).ok();
        Ok(JsonExchange {
            url: url.to_owned(),
            request: body,
            status: response.status,
            elapsed: response.elapsed,
            raw_response: response.body,
            parsed,
        })
    }
}
