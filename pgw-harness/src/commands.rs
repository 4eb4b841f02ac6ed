//! Command handlers.

use std::{
    io::Read as _,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context as _, bail};
use pgw_envelope::{
    EnvelopeCodec, GatewayClient, HarnessConfig, HarnessError, KeyMaterial,
    api::{
        DoPaymentRequest, PaymentActionRequest, PaymentCode, PaymentDetails, PaymentInquiryRequest,
        PaymentOptionDetailsRequest, PaymentOptionRequest, PaymentTokenRequest, PosOrderClaims,
        PosOrderRequest, TransactionStatusRequest, YesNo, generate_client_id,
        generate_idempotency_id, generate_invoice_no, generate_pos_invoice_no,
    },
    client::{JsonExchange, JwtExchange, PaymentActionExchange},
    config::Secret,
    environment::ApiKind,
    jwt::CallbackToken,
    webhook::WebhookStore,
    xml::pretty_print,
};
use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::{
    cli::{
        ActionArgs, CallbackTokenArgs, Cli, Command, DoPaymentArgs, InquiryArgs, KeyArgs, OpenArgs,
        OptionDetailsArgs, OptionsArgs, PosArgs, SealArgs, SecretArgs, StatusArgs, TokenArgs,
        TokenRefArgs, WebhookArgs,
    },
    webhook_server::{self, AppState},
};

/// Configuration file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "pgw.toml";

/// Loaded configuration plus output options.
#[derive(Debug)]
pub struct Context {
    config: HarnessConfig,
    base_dir: PathBuf,
    json: bool,
}

impl Context {
    /// Loads the configuration named on the command line, falls back to
    /// [`DEFAULT_CONFIG_FILE`], then to defaults. Unset secrets are filled from
    /// the environment.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let path = cli.config.clone().or_else(|| {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            default.is_file().then_some(default)
        });

        let (mut config, base_dir) = match path {
            Some(path) => {
                let config = HarnessConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?;
                let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                debug!(path = %path.display(), "configuration loaded");
                (config, base_dir)
            }
            None => (HarnessConfig::default(), PathBuf::new()),
        };
        config.apply_env();
        if let Some(environment) = cli.environment {
            config.environment = environment;
        }

        Ok(Self { config, base_dir, json: cli.json })
    }

    fn client(&self) -> anyhow::Result<GatewayClient> {
        GatewayClient::from_config(&self.config).context("building gateway client")
    }

    fn merchant_id(&self, flag: Option<String>) -> anyhow::Result<String> {
        let id = flag.unwrap_or_else(|| self.config.merchant.merchant_id.clone());
        if id.is_empty() {
            bail!("merchant id is not set (--merchant-id or merchant.merchant_id)");
        }
        Ok(id)
    }

    fn merchant_secret(&self, args: SecretArgs) -> anyhow::Result<Secret> {
        match args.secret.filter(|s| !s.is_empty()) {
            Some(secret) => Ok(Secret::new(secret)),
            None => Ok(self.config.merchant_secret()?.clone()),
        }
    }

    fn locale(&self, flag: Option<String>) -> String {
        flag.unwrap_or_else(|| self.config.merchant.locale.clone())
    }

    fn currency(&self, flag: Option<String>) -> String {
        flag.unwrap_or_else(|| self.config.merchant.currency_code.clone())
    }

    /// Command line key paths are relative to the working directory, file
    /// paths to the configuration file.
    fn key_material(&self, args: KeyArgs) -> anyhow::Result<KeyMaterial> {
        let mut settings = self.config.keys.clone();
        let cwd = std::env::current_dir().context("reading working directory")?;
        if let Some(path) = args.private_key {
            settings.private_key = Some(cwd.join(path));
        }
        if let Some(path) = args.public_key {
            settings.public_key = Some(cwd.join(path));
        }
        if let Some(passphrase) = args.passphrase {
            settings.passphrase = Some(Secret::new(passphrase));
        }
        if let Some(key_id) = args.key_id {
            settings.key_id = key_id;
        }
        Ok(settings.load(&self.base_dir)?)
    }
}

/// Runs the parsed command.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let ctx = Context::load(&cli)?;
    info!(environment = %ctx.config.environment, "pgw-harness starting");

    match cli.command {
        Command::Action(args) => action(&ctx, args).await,
        Command::Token(args) => token(&ctx, args).await,
        Command::Inquiry(args) => inquiry(&ctx, args).await,
        Command::Options(args) => options(&ctx, args).await,
        Command::OptionDetails(args) => option_details(&ctx, args).await,
        Command::Status(args) => status(&ctx, args).await,
        Command::DoPayment(args) => do_payment(&ctx, args).await,
        Command::Pos(args) => pos(&ctx, args).await,
        Command::Seal(args) => seal(&ctx, args),
        Command::Open(args) => open(&ctx, args),
        Command::CallbackToken(args) => callback_token(&ctx, args),
        Command::Endpoints => endpoints(&ctx),
        Command::Webhook(args) => webhook(&ctx, args).await,
    }
}

async fn action(ctx: &Context, args: ActionArgs) -> anyhow::Result<()> {
    let keys = ctx.key_material(args.keys)?;
    let merchant_id = ctx.merchant_id(args.merchant_id)?;
    let mut request = PaymentActionRequest::new(merchant_id, args.invoice, args.process_type)
        .with_amount(args.amount)
        .with_notify_url(args.notify_url)
        .with_recurring_unique_id(args.recurring_unique_id);
    if let Some(version) = args.version {
        request = request.with_version(version);
    }

    let exchange = ctx.client()?.payment_action(&request, &keys).await?;
    print_report(ctx.json, &action_report(&exchange));
    Ok(())
}

async fn token(ctx: &Context, args: TokenArgs) -> anyhow::Result<()> {
    let secret = ctx.merchant_secret(args.secret)?;
    let invoice = args.invoice.unwrap_or_else(generate_invoice_no);
    let mut request = PaymentTokenRequest::new(
        ctx.merchant_id(args.merchant_id)?,
        invoice,
        args.amount,
        ctx.currency(args.currency),
    );
    if let Some(description) = args.description {
        request.description = description;
    }
    request.payment_channel = args.channels;
    request.locale = args.locale;
    request.request_3ds = args.request_3ds;
    request.tokenize = args.tokenize.then_some(true);
    request.immediate_payment = args.immediate_payment.then_some(YesNo::Yes);
    request.payment_expiry = args.payment_expiry;
    request.idempotency_id = args.idempotent.then(generate_idempotency_id);

    let exchange = ctx.client()?.payment_token(&request, secret.as_bytes()).await?;
    print_report(ctx.json, &jwt_report(&exchange));
    Ok(())
}

async fn inquiry(ctx: &Context, args: InquiryArgs) -> anyhow::Result<()> {
    let secret = ctx.merchant_secret(args.secret)?;
    let request = PaymentInquiryRequest {
        merchant_id: ctx.merchant_id(args.merchant_id)?,
        invoice_no: args.invoice,
        locale: ctx.locale(args.locale),
    };

    let exchange = ctx.client()?.payment_inquiry(&request, secret.as_bytes()).await?;
    print_report(ctx.json, &jwt_report(&exchange));
    Ok(())
}

fn token_ref(ctx: &Context, args: TokenRefArgs) -> (String, String, String) {
    (
        args.payment_token,
        args.client_id.unwrap_or_else(generate_client_id),
        ctx.locale(args.locale),
    )
}

async fn options(ctx: &Context, args: OptionsArgs) -> anyhow::Result<()> {
    let (payment_token, client_id, locale) = token_ref(ctx, args.token);
    let request = PaymentOptionRequest {
        payment_token,
        client_id,
        locale,
        browser_details: json!({
            "deviceType": "desktop",
            "name": env!("CARGO_PKG_NAME"),
            "os": std::env::consts::OS,
            "version": env!("CARGO_PKG_VERSION"),
        }),
    };

    let exchange = ctx.client()?.payment_option(&request).await?;
    print_report(ctx.json, &json_report(&exchange));
    Ok(())
}

async fn option_details(ctx: &Context, args: OptionDetailsArgs) -> anyhow::Result<()> {
    let (payment_token, client_id, locale) = token_ref(ctx, args.token);
    let request = PaymentOptionDetailsRequest {
        payment_token,
        client_id,
        locale,
        category_code: args.category,
        group_code: args.group,
    };

    let exchange = ctx.client()?.payment_option_details(&request).await?;
    print_report(ctx.json, &json_report(&exchange));
    Ok(())
}

async fn status(ctx: &Context, args: StatusArgs) -> anyhow::Result<()> {
    let (payment_token, client_id, locale) = token_ref(ctx, args.token);
    let request = TransactionStatusRequest {
        payment_token,
        client_id,
        locale,
        additional_info: args.additional_info,
    };

    let exchange = ctx.client()?.transaction_status(&request).await?;
    print_report(ctx.json, &json_report(&exchange));
    Ok(())
}

async fn do_payment(ctx: &Context, args: DoPaymentArgs) -> anyhow::Result<()> {
    let data: Value = serde_json::from_str(&args.data).context("--data is not valid JSON")?;
    if !data.is_object() {
        bail!("--data must be a JSON object");
    }
    let (payment_token, client_id, locale) = token_ref(ctx, args.token);
    let request = DoPaymentRequest {
        payment_token,
        client_id,
        client_ip: args.client_ip,
        locale,
        response_return_url: args.return_url,
        payment: PaymentDetails {
            code: PaymentCode {
                channel_code: args.channel,
                agent_code: args.agent_code,
                agent_channel_code: args.agent_channel_code,
            },
            data,
        },
    };

    let exchange = ctx.client()?.do_payment(&request).await?;
    print_report(ctx.json, &json_report(&exchange));
    Ok(())
}

async fn pos(ctx: &Context, args: PosArgs) -> anyhow::Result<()> {
    let secret = ctx.merchant_secret(args.secret)?;
    let request = PosOrderRequest {
        claims: PosOrderClaims {
            merchant_id: ctx.merchant_id(args.merchant_id)?,
            invoice_no: args.invoice.unwrap_or_else(generate_pos_invoice_no),
            description: args.description,
            amount: args.amount,
            currency_code: ctx.currency(args.currency),
            idempotency_id: generate_idempotency_id(),
            user_defined_1: args.user_defined_1,
        },
        client_id: generate_client_id(),
        locale: ctx.locale(None),
        response_return_url: args.return_url,
        channel_code: args.channel.code().to_owned(),
        customer: json!({ "name": args.name, "email": args.email }),
    };

    let exchange = ctx.client()?.pos_order(&request, secret.as_bytes()).await?;
    print_report(ctx.json, &jwt_report(&exchange));
    Ok(())
}

fn read_input(path: &Path) -> anyhow::Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).context("reading stdin")?;
        return Ok(text);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn seal(ctx: &Context, args: SealArgs) -> anyhow::Result<()> {
    let xml = read_input(&args.input)?;
    let codec = EnvelopeCodec::new(ctx.key_material(args.keys)?);
    let sealed = codec.seal(&xml)?;

    if ctx.json {
        print_report(
            true,
            &Report::new("Seal").value(
                "envelope",
                json!({ "xml": sealed.xml, "jwe": sealed.jwe, "jws": sealed.jws }),
            ),
        );
    } else {
        println!("{}", sealed.jws);
    }
    Ok(())
}

fn open(ctx: &Context, args: OpenArgs) -> anyhow::Result<()> {
    let text = read_input(&args.input)?;
    let codec = EnvelopeCodec::new(ctx.key_material(args.keys)?);
    let opened = codec.open(&text)?;

    let report = Report::new("Open")
        .text("Kind", opened.kind.to_string())
        .text("Key id", opened.key_id.clone().unwrap_or_else(|| "(none)".to_owned()))
        .text("JWE", opened.jwe.clone())
        .text("XML", pretty_print(&opened.xml));
    print_report(ctx.json, &report);
    Ok(())
}

fn callback_token(ctx: &Context, args: CallbackTokenArgs) -> anyhow::Result<()> {
    let secret = match args.secret.filter(|s| !s.is_empty()) {
        Some(secret) => Secret::new(secret),
        None => ctx
            .config
            .webhook
            .secret
            .clone()
            .filter(|s| !s.is_empty())
            .context("webhook secret is not set (--secret, webhook.secret or PGW_WEBHOOK_SECRET)")?,
    };
    let claims: Map<String, Value> =
        serde_json::from_str(&args.claims).context("--claims must be a JSON object")?;
    if args.ttl_hours == 0 {
        bail!("--ttl-hours must be at least 1");
    }
    let ttl = Duration::from_secs(args.ttl_hours.saturating_mul(3600));

    let issued = CallbackToken::issue(claims, secret.as_bytes(), ttl)?;
    let mut report = Report::new("Callback token")
        .text("Token", issued.token.clone())
        .text("Issued at", issued.issued_at.to_rfc3339())
        .text("Expires at", issued.expires_at.to_rfc3339());
    if let Some(base) = args.url {
        report = report.text("URL", webhook_url(&base, &issued.token)?);
    }
    print_report(ctx.json, &report);
    Ok(())
}

fn webhook_url(base: &str, token: &str) -> anyhow::Result<String> {
    let mut url = url::Url::parse(base).with_context(|| format!("invalid URL '{base}'"))?;
    url.query_pairs_mut().append_pair(webhook_server::TOKEN_PARAM, token);
    Ok(url.into())
}

fn endpoints(ctx: &Context) -> anyhow::Result<()> {
    let client = ctx.client()?;
    let mut report = Report::new(format!("Endpoints ({})", client.environment()));
    for api in ApiKind::ALL {
        report = report.text(api.as_str(), client.endpoint(api).to_owned());
    }
    print_report(ctx.json, &report);
    Ok(())
}

async fn webhook(ctx: &Context, args: WebhookArgs) -> anyhow::Result<()> {
    let settings = &ctx.config.webhook;
    let bind = args.bind.unwrap_or(settings.bind);
    let capacity = args.capacity.unwrap_or(settings.capacity);
    if capacity == 0 {
        bail!("--capacity must be at least 1");
    }
    let secret = if args.no_auth {
        None
    } else {
        args.secret.map(Secret::new).or_else(|| settings.secret.clone())
    };

    let state = AppState::new(WebhookStore::new(capacity), secret);
    webhook_server::serve(bind, state).await
}

/// Titled list of labelled sections, printed as text or as one JSON object.
#[derive(Debug)]
struct Report {
    title: String,
    sections: Vec<(String, Value)>,
}

impl Report {
    fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), sections: Vec::new() }
    }

    fn text(self, label: impl Into<String>, text: String) -> Self {
        self.value(label, Value::String(text))
    }

    fn value(mut self, label: impl Into<String>, value: Value) -> Self {
        self.sections.push((label.into(), value));
        self
    }

    fn error(self, label: impl Into<String>, error: &HarnessError) -> Self {
        self.value(label, json!({ "stage": error.stage().as_str(), "message": error.to_string() }))
    }

    fn to_json(&self) -> Value {
        let sections: Map<String, Value> = self
            .sections
            .iter()
            .map(|(label, value)| (json_key(label), value.clone()))
            .collect();
        json!({ "title": self.title, "sections": sections })
    }

    fn to_text(&self) -> String {
        let mut out = format!("=== {} ===\n", self.title);
        for (label, value) in &self.sections {
            let body = match value {
                Value::String(text) => text.clone(),
                other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
            };
            if body.contains('\n') {
                out.push_str(&format!("\n--- {label} ---\n{body}\n"));
            } else {
                out.push_str(&format!("{label}: {body}\n"));
            }
        }
        out
    }
}

fn json_key(label: &str) -> String {
    label.to_ascii_lowercase().replace([' ', '-'], "_")
}

fn print_report(json: bool, report: &Report) {
    if json {
        let value = report.to_json();
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()));
    } else {
        print!("{}", report.to_text());
    }
}

fn exchange_header(report: Report, url: &str, status: u16, elapsed: Duration) -> Report {
    report
        .text("URL", url.to_owned())
        .value("Status", json!(status))
        .value("Elapsed ms", json!(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)))
}

fn action_report(exchange: &PaymentActionExchange) -> Report {
    let report = exchange_header(
        Report::new("Payment Action"),
        &exchange.url,
        exchange.status,
        exchange.elapsed,
    )
    .text("Request XML", pretty_print(&exchange.sealed.xml))
    .text("Request JWE", exchange.sealed.jwe.clone())
    .text("Request JWS", exchange.sealed.jws.clone())
    .text("Raw response", exchange.raw_response.clone());

    match &exchange.decoded {
        Ok(decoded) => report
            .text("Response kind", decoded.envelope.kind.to_string())
            .text("Response JWE", decoded.envelope.jwe.clone())
            .text("Response XML", decoded.pretty_xml.clone()),
        Err(e) => report.error("Decode error", e),
    }
}

fn jwt_report(exchange: &JwtExchange) -> Report {
    let report = exchange_header(
        Report::new("JWT request"),
        &exchange.url,
        exchange.status,
        exchange.elapsed,
    )
        .value("Claims", exchange.claims.clone())
        .text("Token", exchange.token.clone())
        .value("Request body", exchange.request.clone())
        .text("Raw response", exchange.raw_response.clone());

    match &exchange.decoded_payload {
        Ok(Some(payload)) => report.value("Response payload", payload.clone()),
        Ok(None) => report,
        Err(e) => report.error("Decode error", e),
    }
}

fn json_report(exchange: &JsonExchange) -> Report {
    let report = exchange_header(
        Report::new("JSON request"),
        &exchange.url,
        exchange.status,
        exchange.elapsed,
    )
        .value("Request body", exchange.request.clone());
    match &exchange.parsed {
        Some(parsed) => report.value("Response", parsed.clone()),
        None => report.text("Raw response", exchange.raw_response.clone()),
    }
}
