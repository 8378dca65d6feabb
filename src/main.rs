//! SOAP invoker binary.
//!
//! Run with: `soap-invoker --config service.yaml --request payload.xml`

use anyhow::{Context, Result};
use clap::Parser;
use soap_invoker::{
    parser, Authentication, ComplexContent, InvocationRequest, InvokerConfig, SoapInvoker, Value,
};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Invoke one SOAP operation described by a YAML configuration.
///
/// The request payload is an XML document holding the operation's input
/// element. The response or fault content is printed as YAML.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Path to the input element document (XML)
    #[arg(short, long)]
    request: Option<PathBuf>,

    /// Endpoint overriding the one declared by the service
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Transaction id handed to the HTTP client
    #[arg(long)]
    transaction_id: Option<String>,

    /// Username, optionally as DOMAIN/name or DOMAIN\name
    #[arg(short, long)]
    username: Option<String>,

    /// Password
    #[arg(short, long)]
    password: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries the result
    let log_level = args.log_level.parse().unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting SOAP invoker v{}", env!("CARGO_PKG_VERSION"));
    info!("Config file: {}", args.config.display());

    let config: InvokerConfig = if args.config.exists() {
        let content = tokio::fs::read_to_string(&args.config)
            .await
            .context("Failed to read config file")?;
        serde_yaml::from_str(&content).context("Failed to parse config file")?
    } else {
        info!("Config file not found, using defaults");
        InvokerConfig::default()
    };

    info!(
        operation = %config.operation.name,
        soap_version = ?config.operation.soap_version,
        charset = %config.settings.charset,
        "Configuration loaded"
    );

    let input = match &args.request {
        Some(path) => Some(read_input(&config, path).await?),
        None => None,
    };

    let authentication = if args.username.is_some() || args.password.is_some() {
        Some(Authentication {
            username: args.username,
            password: args.password,
        })
    } else {
        None
    };

    let invoker = SoapInvoker::from_config(config).context("Failed to create invoker")?;
    let result = invoker
        .invoke(InvocationRequest {
            endpoint: args.endpoint,
            transaction_id: args.transaction_id,
            request: input,
            authentication,
        })
        .await
        .map_err(|e| match e.code() {
            Some(code) => anyhow::anyhow!("{}: {}", code, e),
            None => anyhow::anyhow!("{} error: {}", e.kind().as_str(), e),
        })?;

    print!("{}", serde_yaml::to_string(&result).context("Failed to render result")?);
    Ok(())
}

/// Parse the request payload against the operation's input element.
async fn read_input(config: &InvokerConfig, path: &Path) -> Result<ComplexContent> {
    let element = config
        .operation
        .input_element()
        .context("Operation declares no input element")?;
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read request file {}", path.display()))?;
    let encoding = config.settings.encoding()?;

    match parser::unmarshal_element(&data, encoding, element)? {
        Value::Complex(content) => Ok(content),
        _ => anyhow::bail!("Input element {} is not a complex type", element.name),
    }
}
