//! idgate CLI: read-only access to the verification service.

use anyhow::{bail, Context};
use clap::Parser;
use idgate_client::{HttpVerificationClient, Outcome, VerificationService};
use idgate_types::{ContentAddress, WalletAddress};
use idgate_utils::LogFormat;
use idgate_verification::SessionConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "idgate", about = "Identity verification service client", version)]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// flags and env vars override them.
    #[arg(long, env = "IDGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Base URL of the verification service.
    #[arg(long, env = "IDGATE_BACKEND_URL")]
    backend_url: Option<String>,

    /// Request timeout in seconds; 0 disables it.
    #[arg(long, env = "IDGATE_REQUEST_TIMEOUT")]
    request_timeout: Option<u64>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "IDGATE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "IDGATE_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand, Debug)]
enum Command {
    /// Check that the service is up.
    Health,

    /// Stored identity documents.
    Documents {
        #[command(subcommand)]
        action: DocumentsAction,
    },

    /// Show the on-ledger identity commitment of a wallet.
    Commitment {
        #[arg(long)]
        wallet: String,
    },
}

#[derive(clap::Subcommand, Debug)]
enum DocumentsAction {
    /// List documents submitted by a wallet.
    List {
        #[arg(long)]
        wallet: String,
    },
    /// Fetch a stored document by content address.
    Fetch { content_address: String },
    /// Check a stored document against the ledger.
    Verify { content_address: String },
}

fn load_config(cli: &Cli) -> anyhow::Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::from_toml_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(url) = &cli.backend_url {
        config.backend_url = url.clone();
    }
    if let Some(secs) = cli.request_timeout {
        config.request_timeout_secs = secs;
    }
    if let Some(level) = &cli.log_level {
        config.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.log_format = LogFormat::parse(format);
    }
    config.validate()?;
    Ok(config)
}

/// Turn a call result into a process result; failures exit non-zero.
fn into_result<T>(outcome: Outcome<T>) -> anyhow::Result<T> {
    match outcome {
        Outcome::Ok(value) => Ok(value),
        Outcome::Rejected(reason) => bail!("rejected: {reason}"),
        Outcome::TransportFailure(detail) => bail!("service unreachable: {detail}"),
    }
}

async fn run(command: Command, client: &HttpVerificationClient) -> anyhow::Result<serde_json::Value> {
    let value = match command {
        Command::Health => {
            let status = into_result(client.health().await)?;
            serde_json::json!({ "status": status })
        }
        Command::Commitment { wallet } => {
            let wallet = WalletAddress::new(wallet)?;
            let commitment = into_result(client.query_ledger_commitment(&wallet).await)?;
            serde_json::json!({ "wallet": wallet, "commitment": commitment })
        }
        Command::Documents { action } => match action {
            DocumentsAction::List { wallet } => {
                let wallet = WalletAddress::new(wallet)?;
                let documents = into_result(client.list_documents(&wallet).await)?;
                serde_json::json!({ "wallet": wallet, "documents": documents })
            }
            DocumentsAction::Fetch { content_address } => {
                let address = ContentAddress::new(content_address)?;
                serde_json::to_value(into_result(client.fetch_document(&address).await)?)?
            }
            DocumentsAction::Verify { content_address } => {
                let address = ContentAddress::new(content_address)?;
                let verified = into_result(client.verify_document(&address).await)?;
                serde_json::json!({ "content_address": address, "verified": verified })
            }
        },
    };
    Ok(value)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    idgate_utils::init_logging(config.log_format, &config.log_level);

    tracing::debug!(backend = %config.backend_url, "using verification service");
    let client = HttpVerificationClient::new(&config.backend_url, config.http_options())?;

    let output = run(cli.command, &client).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_document_commands() {
        let cli = Cli::try_parse_from(["idgate", "documents", "list", "--wallet", "0xabc"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Documents {
                action: DocumentsAction::List { ref wallet }
            } if wallet == "0xabc"
        ));
        let cli = Cli::try_parse_from(["idgate", "documents", "verify", "QmA"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Documents {
                action: DocumentsAction::Verify { .. }
            }
        ));
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "idgate",
            "--backend-url",
            "https://verify.example.org",
            "--request-timeout",
            "0",
            "health",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.backend_url, "https://verify.example.org");
        assert_eq!(config.http_options().request_timeout, None);
    }

    #[test]
    fn failures_become_errors() {
        assert!(into_result(Outcome::<()>::Rejected("unknown wallet".into())).is_err());
        assert_eq!(into_result(Outcome::Ok(3)).unwrap(), 3);
    }
}
