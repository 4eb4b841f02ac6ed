//! Payment Action request (inquiry, refund, void).

use std::{fmt, str::FromStr};

use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};

/// Payment Action API version sent when the caller does not choose one.
pub const DEFAULT_ACTION_VERSION: &str = "3.8";

/// Element names of a `PaymentProcessRequest`, in wire order.
pub const ACTION_FIELD_ORDER: [&str; 8] = [
    "version",
    "timeStamp",
    "merchantID",
    "invoiceNo",
    "actionAmount",
    "recurringUniqueID",
    "processType",
    "notifyURL",
];

/// Administrative operation requested from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessType {
    /// Inquiry (`I`).
    #[serde(rename = "I")]
    Inquiry,
    /// Refund (`R`).
    #[serde(rename = "R")]
    Refund,
    /// Void (`V`).
    #[serde(rename = "V")]
    Void,
}

impl ProcessType {
    /// Single letter wire code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Inquiry => "I",
            Self::Refund => "R",
            Self::Void => "V",
        }
    }

    /// Whether the gateway conventionally expects a `notifyURL` for this
    /// operation.
    ///
    /// Refunds and voids complete asynchronously and report back to the notify
    /// URL; inquiries answer inline. Nothing in this crate enforces it.
    #[must_use]
    pub const fn expects_notify_url(&self) -> bool {
        matches!(self, Self::Refund | Self::Void)
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for ProcessType {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "i" | "inquiry" => Ok(Self::Inquiry),
            "r" | "refund" => Ok(Self::Refund),
            "v" | "void" => Ok(Self::Void),
            other => Err(HarnessError::InvalidInput(format!(
                "unknown process type '{other}', expected I, R or V"
            ))),
        }
    }
}

/// Fields of a `PaymentProcessRequest`.
///
/// All values are carried as text exactly as they will appear in the XML;
/// empty strings become empty elements.
///
/// # Examples
///
/// ```
/// use pgw_envelope::api::{PaymentActionRequest, ProcessType};
///
/// let request = PaymentActionRequest::new("704704000000211", "INV001", ProcessType::Refund)
///     .with_amount("5000")
///     .with_notify_url("https://merchant.example.com/notify");
///
/// assert_eq!(request.version, "3.8");
/// assert_eq!(request.time_stamp.len(), 12);
/// assert_eq!(request.fields()[6], ("processType", "R"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentActionRequest {
    /// API version, `3.8` by default.
    pub version: String,
    /// Request timestamp, `yyMMddHHmmss` local time by default.
    pub time_stamp: String,
    /// Merchant identifier.
    pub merchant_id: String,
    /// Invoice of the original payment.
    pub invoice_no: String,
    /// Amount to refund; empty for inquiries and voids.
    pub action_amount: String,
    /// Recurring payment id, usually empty.
    pub recurring_unique_id: String,
    /// Requested operation.
    pub process_type: ProcessType,
    /// Callback URL for asynchronous results, possibly empty.
    pub notify_url: String,
}

impl PaymentActionRequest {
    /// Creates a request with the default version and the current timestamp.
    #[must_use]
    pub fn new(
        merchant_id: impl Into<String>,
        invoice_no: impl Into<String>,
        process_type: ProcessType,
    ) -> Self {
        Self {
            version: DEFAULT_ACTION_VERSION.to_owned(),
            time_stamp: action_timestamp(),
            merchant_id: merchant_id.into(),
            invoice_no: invoice_no.into(),
            action_amount: String::new(),
            recurring_unique_id: String::new(),
            process_type,
            notify_url: String::new(),
        }
    }

    /// Sets `actionAmount`.
    #[must_use]
    pub fn with_amount(mut self, amount: impl Into<String>) -> Self {
        self.action_amount = amount.into();
        self
    }

    /// Sets `notifyURL`.
    #[must_use]
    pub fn with_notify_url(mut self, url: impl Into<String>) -> Self {
        self.notify_url = url.into();
        self
    }

    /// Sets `recurringUniqueID`.
    #[must_use]
    pub fn with_recurring_unique_id(mut self, id: impl Into<String>) -> Self {
        self.recurring_unique_id = id.into();
        self
    }

    /// Sets `version`.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Sets `timeStamp`.
    #[must_use]
    pub fn with_time_stamp(mut self, time_stamp: impl Into<String>) -> Self {
        self.time_stamp = time_stamp.into();
        self
    }

    /// Returns `(element name, text)` pairs in wire order.
    #[must_use]
    pub fn fields(&self) -> [(&'static str, &str); 8] {
        [
            (ACTION_FIELD_ORDER[0], self.version.as_str()),
            (ACTION_FIELD_ORDER[1], self.time_stamp.as_str()),
            (ACTION_FIELD_ORDER[2], self.merchant_id.as_str()),
            (ACTION_FIELD_ORDER[3], self.invoice_no.as_str()),
            (ACTION_FIELD_ORDER[4], self.action_amount.as_str()),
            (ACTION_FIELD_ORDER[5], self.recurring_unique_id.as_str()),
            (ACTION_FIELD_ORDER[6], self.process_type.code()),
            (ACTION_FIELD_ORDER[7], self.notify_url.as_str()),
        ]
    }
}

/// Current local time formatted as `yyMMddHHmmss`.
#[must_use]
pub fn action_timestamp() -> String {
    Local::now().format("%y%m%d%H%M%S").to_string()
}
