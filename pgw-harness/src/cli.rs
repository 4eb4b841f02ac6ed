//! Command line definitions.

use std::{net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use pgw_envelope::{
    api::{ProcessType, YesNo},
    environment::Environment,
};
use rust_decimal::Decimal;

use crate::observability::LogFormat;

/// Payment gateway test harness.
#[derive(Parser, Debug)]
#[command(name = "pgw-harness", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (defaults to ./pgw.toml when present)
    #[arg(short = 'c', long, value_name = "PATH", env = "PGW_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Target environment, overriding the configuration file
    #[arg(
        short = 'e',
        long = "env",
        value_name = "ENV",
        global = true,
        value_parser = parse_environment
    )]
    pub environment: Option<Environment>,

    /// Log output format
    #[arg(long, value_enum, env = "LOG_FORMAT", default_value = "pretty", global = true)]
    pub log_format: LogFormat,

    /// Print results as JSON instead of text sections
    #[arg(long, global = true)]
    pub json: bool,
}

fn parse_environment(value: &str) -> Result<Environment, String> {
    value.parse().map_err(|e: pgw_envelope::HarnessError| e.to_string())
}

fn parse_process_type(value: &str) -> Result<ProcessType, String> {
    value.parse().map_err(|e: pgw_envelope::HarnessError| e.to_string())
}

fn parse_yes_no(value: &str) -> Result<YesNo, String> {
    match value.to_ascii_uppercase().as_str() {
        "Y" | "YES" | "TRUE" => Ok(YesNo::Yes),
        "N" | "NO" | "FALSE" => Ok(YesNo::No),
        other => Err(format!("expected Y or N, got '{other}'")),
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Send a Payment Action (inquiry, refund or void) in a JWS/JWE envelope
    Action(ActionArgs),
    /// Request a payment token (HS256 JWT)
    Token(TokenArgs),
    /// Look up a payment by invoice number (HS256 JWT)
    Inquiry(InquiryArgs),
    /// List payment options for a token
    Options(OptionsArgs),
    /// List payment option details for a channel group
    OptionDetails(OptionDetailsArgs),
    /// Query the transaction status of a token
    Status(StatusArgs),
    /// Execute a payment for a token
    DoPayment(DoPaymentArgs),
    /// Create a POS order (POSCC or VNQR)
    Pos(PosArgs),
    /// Encrypt to the public key and sign with the private key, offline
    Seal(SealArgs),
    /// Verify with the public key and decrypt with the private key, offline
    Open(OpenArgs),
    /// Issue a webhook callback token
    CallbackToken(CallbackTokenArgs),
    /// Show the endpoint of every API in the selected environment
    Endpoints,
    /// Run the webhook capture server
    Webhook(WebhookArgs),
}

/// Key file options shared by envelope commands.
#[derive(Args, Debug, Clone, Default)]
pub struct KeyArgs {
    /// Merchant private key (.pfx, .p12, .pem, .key)
    #[arg(long, value_name = "PATH", help_heading = "Keys")]
    pub private_key: Option<PathBuf>,

    /// Passphrase of the private key
    #[arg(long, env = "PGW_KEY_PASSPHRASE", hide_env_values = true, help_heading = "Keys")]
    pub passphrase: Option<String>,

    /// Gateway public key or certificate (PEM or DER)
    #[arg(long, value_name = "PATH", help_heading = "Keys")]
    pub public_key: Option<PathBuf>,

    /// Key id placed in the protected headers
    #[arg(long, help_heading = "Keys")]
    pub key_id: Option<String>,
}

/// Merchant secret option shared by JWT commands.
#[derive(Args, Debug, Clone, Default)]
pub struct SecretArgs {
    /// Merchant HS256 secret
    #[arg(long, env = "PGW_MERCHANT_SECRET", hide_env_values = true)]
    pub secret: Option<String>,
}

#[derive(Args, Debug)]
pub struct ActionArgs {
    /// Invoice of the original payment
    #[arg(long)]
    pub invoice: String,

    /// Operation: I (inquiry), R (refund) or V (void)
    #[arg(short = 't', long, value_parser = parse_process_type, default_value = "I")]
    pub process_type: ProcessType,

    /// Amount to refund
    #[arg(long, default_value = "")]
    pub amount: String,

    /// Callback URL for the asynchronous result
    #[arg(long, default_value = "")]
    pub notify_url: String,

    /// Recurring payment id
    #[arg(long, default_value = "")]
    pub recurring_unique_id: String,

    /// Merchant id, overriding the configuration file
    #[arg(long)]
    pub merchant_id: Option<String>,

    /// API version
    #[arg(long)]
    pub version: Option<String>,

    #[command(flatten)]
    pub keys: KeyArgs,
}

#[derive(Args, Debug)]
pub struct TokenArgs {
    /// Invoice number (generated when omitted)
    #[arg(long)]
    pub invoice: Option<String>,

    /// Amount
    #[arg(long)]
    pub amount: Decimal,

    /// Currency, overriding the configuration file
    #[arg(long)]
    pub currency: Option<String>,

    /// Description (defaults to "Payment <invoice>")
    #[arg(long)]
    pub description: Option<String>,

    /// Payment channels
    #[arg(long = "channel", value_delimiter = ',', default_value = "ALL")]
    pub channels: Vec<String>,

    /// Response locale
    #[arg(long)]
    pub locale: Option<String>,

    /// Request 3DS authentication (Y or N)
    #[arg(long, value_parser = parse_yes_no)]
    pub request_3ds: Option<YesNo>,

    /// Tokenize the card
    #[arg(long)]
    pub tokenize: bool,

    /// Charge immediately
    #[arg(long)]
    pub immediate_payment: bool,

    /// Payment expiry (yyyy-MM-dd HH:mm:ss)
    #[arg(long)]
    pub payment_expiry: Option<String>,

    /// Add an idempotency id
    #[arg(long)]
    pub idempotent: bool,

    /// Merchant id, overriding the configuration file
    #[arg(long)]
    pub merchant_id: Option<String>,

    #[command(flatten)]
    pub secret: SecretArgs,
}

#[derive(Args, Debug)]
pub struct InquiryArgs {
    /// Invoice to look up
    #[arg(long)]
    pub invoice: String,

    /// Response locale
    #[arg(long)]
    pub locale: Option<String>,

    /// Merchant id, overriding the configuration file
    #[arg(long)]
    pub merchant_id: Option<String>,

    #[command(flatten)]
    pub secret: SecretArgs,
}

/// Token options shared by the JSON commands.
#[derive(Args, Debug)]
pub struct TokenRefArgs {
    /// Payment token returned by the token command
    #[arg(long = "token")]
    pub payment_token: String,

    /// Client id (generated when omitted)
    #[arg(long)]
    pub client_id: Option<String>,

    /// Response locale
    #[arg(long)]
    pub locale: Option<String>,
}

#[derive(Args, Debug)]
pub struct OptionsArgs {
    #[command(flatten)]
    pub token: TokenRefArgs,
}

#[derive(Args, Debug)]
pub struct OptionDetailsArgs {
    #[command(flatten)]
    pub token: TokenRefArgs,

    /// Channel category, e.g. GCARD
    #[arg(long)]
    pub category: String,

    /// Channel group, e.g. CC
    #[arg(long)]
    pub group: String,
}

#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub token: TokenRefArgs,

    /// Ask for additional transaction details
    #[arg(long)]
    pub additional_info: bool,
}

#[derive(Args, Debug)]
pub struct DoPaymentArgs {
    #[command(flatten)]
    pub token: TokenRefArgs,

    /// Payment channel code, e.g. PACC or QR
    #[arg(long)]
    pub channel: String,

    /// Agent code
    #[arg(long)]
    pub agent_code: Option<String>,

    /// Agent channel code
    #[arg(long)]
    pub agent_channel_code: Option<String>,

    /// Payer IP address
    #[arg(long)]
    pub client_ip: Option<String>,

    /// Where the payer's browser is sent afterwards
    #[arg(long, default_value = "")]
    pub return_url: String,

    /// Channel data as a JSON object
    #[arg(long, default_value = "{}")]
    pub data: String,
}

#[derive(Args, Debug)]
pub struct PosArgs {
    /// Amount
    #[arg(long)]
    pub amount: Decimal,

    /// POS channel
    #[arg(long, value_enum, default_value = "posc")]
    pub channel: PosChannel,

    /// Invoice number (generated when omitted)
    #[arg(long)]
    pub invoice: Option<String>,

    /// Description
    #[arg(long, default_value = "POS order")]
    pub description: String,

    /// Currency, overriding the configuration file
    #[arg(long)]
    pub currency: Option<String>,

    /// Customer name
    #[arg(long, default_value = "")]
    pub name: String,

    /// Customer email
    #[arg(long, default_value = "")]
    pub email: String,

    /// Terminal reference
    #[arg(long)]
    pub user_defined_1: Option<String>,

    /// Where the payer's browser is sent afterwards
    #[arg(long, default_value = "")]
    pub return_url: String,

    /// Merchant id, overriding the configuration file
    #[arg(long)]
    pub merchant_id: Option<String>,

    #[command(flatten)]
    pub secret: SecretArgs,
}

/// POS payment channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PosChannel {
    /// Card terminal
    Posc,
    /// VietQR
    Vnqr,
}

impl PosChannel {
    pub const fn code(self) -> &'static str {
        match self {
            Self::Posc => "POSCC",
            Self::Vnqr => "VNQR",
        }
    }
}

#[derive(Args, Debug)]
pub struct SealArgs {
    /// XML file to seal ("-" for stdin)
    pub input: PathBuf,

    #[command(flatten)]
    pub keys: KeyArgs,
}

#[derive(Args, Debug)]
pub struct OpenArgs {
    /// Envelope file to open ("-" for stdin)
    pub input: PathBuf,

    #[command(flatten)]
    pub keys: KeyArgs,
}

#[derive(Args, Debug)]
pub struct CallbackTokenArgs {
    /// Claims as a JSON object
    #[arg(long, default_value = "{}")]
    pub claims: String,

    /// Lifetime in hours
    #[arg(long, default_value_t = 24)]
    pub ttl_hours: u64,

    /// Token secret, overriding the configuration file
    #[arg(long, env = "PGW_WEBHOOK_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Webhook URL to append the token to
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(Args, Debug)]
pub struct WebhookArgs {
    /// Listen address, overriding the configuration file
    #[arg(long)]
    pub bind: Option<SocketAddr>,

    /// Number of webhooks kept in memory
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Token secret, overriding the configuration file
    #[arg(long, env = "PGW_WEBHOOK_SECRET", hide_env_values = true)]
    pub secret: Option<String>,

    /// Accept requests without a token, ignoring any configured secret
    #[arg(long)]
    pub no_auth: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_action() {
        let cli = Cli::try_parse_from([
            "pgw-harness",
            "--env",
            "prod",
            "action",
            "--invoice",
            "INV1",
            "-t",
            "refund",
            "--amount",
            "100",
        ])
        .unwrap();

        assert_eq!(cli.environment, Some(Environment::Production));
        let Command::Action(args) = cli.command else { panic!("expected action") };
        assert_eq!(args.invoice, "INV1");
        assert_eq!(args.process_type, ProcessType::Refund);
        assert_eq!(args.amount, "100");
        assert!(args.notify_url.is_empty());
    }

    #[test]
    fn test_parse_rejects_unknown_process_type() {
        let result =
            Cli::try_parse_from(["pgw-harness", "action", "--invoice", "INV1", "-t", "X"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_token_channels() {
        let cli = Cli::try_parse_from([
            "pgw-harness",
            "token",
            "--amount",
            "1500.50",
            "--channel",
            "CC,QR",
        ])
        .unwrap();
        let Command::Token(args) = cli.command else { panic!("expected token") };
        assert_eq!(args.amount, Decimal::new(150_050, 2));
        assert_eq!(args.channels, ["CC", "QR"]);
    }

    #[test]
    fn test_pos_channel_codes() {
        assert_eq!(PosChannel::Posc.code(), "POSCC");
        assert_eq!(PosChannel::Vnqr.code(), "VNQR");
    }
}
