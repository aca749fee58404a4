//! txpipe command line
//!
//! Runs one transfer or one caller-built transaction (or bundle) through the
//! execution pipeline and prints the outcome as JSON. Failures print an
//! error body and exit with status 1.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use txpipe::types::parse_address;
use txpipe::{
    endpoints, Config, PipelineError, TransactionExecutor, TransactionRequest, TransferAsset,
    TransferRequest, WalletRef,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Metrics port (overrides the config file)
    #[arg(long)]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(ClapArgs, Debug)]
struct WalletArgs {
    /// Wallet identifier at the custodial signer
    #[arg(long, env = "TXPIPE_WALLET_ID")]
    wallet_id: String,

    /// Wallet public address
    #[arg(long, env = "TXPIPE_WALLET_ADDRESS")]
    wallet_address: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Transfer SOL or an SPL token
    Transfer {
        #[command(flatten)]
        wallet: WalletArgs,

        /// Recipient address
        #[arg(long)]
        to: String,

        /// Amount in base units (lamports or raw token units)
        #[arg(long)]
        amount: u64,

        /// Token mint; omit for a native transfer
        #[arg(long, requires = "decimals")]
        mint: Option<String>,

        /// Token decimals
        #[arg(long, requires = "mint")]
        decimals: Option<u8>,

        /// Skip priority relays
        #[arg(long)]
        no_priority: bool,

        /// Return as soon as the transaction is accepted
        #[arg(long)]
        no_wait: bool,
    },
    /// Sign and broadcast base64-encoded unsigned transactions
    Execute {
        #[command(flatten)]
        wallet: WalletArgs,

        /// Unsigned transaction (repeat for a bundle)
        #[arg(long = "tx", required = true)]
        transactions: Vec<String>,

        /// Submit the transactions as one atomic bundle
        #[arg(long)]
        bundle: bool,

        /// Skip priority relays
        #[arg(long)]
        no_priority: bool,

        /// Wait for confirmation
        #[arg(long)]
        wait: bool,

        /// Bundle tip in lamports, replacing the live estimate
        #[arg(long)]
        tip_lamports: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose, args.json_logs) {
        eprintln!("failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Returns whether the pipeline succeeded
async fn run(args: Args) -> Result<bool> {
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    let config = load_config(&args.config)?;

    if config.monitoring.enable_metrics {
        let port = args.metrics_port.unwrap_or(config.monitoring.metrics_port);
        tokio::spawn(async move {
            if let Err(e) = endpoints::endpoint_server(port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let executor = TransactionExecutor::from_config(&config).context("Failed to build pipeline")?;
    let priority_default = config.execution.default_priority_path;

    let result = match args.command {
        Command::Transfer {
            wallet,
            to,
            amount,
            mint,
            decimals,
            no_priority,
            no_wait,
        } => {
            let wallet = wallet_ref(&wallet)?;
            let asset = match (mint, decimals) {
                (Some(mint), Some(decimals)) => TransferAsset::Token {
                    mint: parse_address(&mint).map_err(anyhow::Error::msg)?,
                    decimals,
                },
                _ => TransferAsset::Native,
            };
            match TransferRequest::new(wallet, &to, amount, asset) {
                Ok(request) => {
                    executor
                        .transfer(
                            request
                                .with_priority_path(priority_default && !no_priority)
                                .with_confirmation(!no_wait),
                        )
                        .await
                }
                Err(reason) => Err(PipelineError::Validation(reason)),
            }
        }
        Command::Execute {
            wallet,
            transactions,
            bundle,
            no_priority,
            wait,
            tip_lamports,
        } => {
            let wallet = wallet_ref(&wallet)?;
            let request = if bundle {
                TransactionRequest::bundle(wallet, &transactions)
            } else if transactions.len() == 1 {
                TransactionRequest::single(wallet, &transactions[0])
            } else {
                Err("several transactions require --bundle".to_string())
            };
            match request {
                Ok(mut request) => {
                    request = request
                        .with_priority_path(priority_default && !no_priority)
                        .with_confirmation(wait);
                    if let Some(tip) = tip_lamports {
                        request = request.with_tip_hint(tip);
                    }
                    executor.execute(request).await
                }
                Err(reason) => Err(PipelineError::Validation(reason)),
            }
        }
    };

    match result {
        Ok(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(true)
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.to_response())?);
            Ok(false)
        }
    }
}

fn wallet_ref(args: &WalletArgs) -> Result<WalletRef> {
    WalletRef::new(&args.wallet_id, &args.wallet_address).map_err(anyhow::Error::msg)
}

/// Initialize logging subsystem
fn init_logging(verbose: bool, json: bool) -> Result<()> {
    let env_filter = if verbose {
        "txpipe=debug,info"
    } else {
        "txpipe=info,warn"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| env_filter.into());

    // Logs go to stderr so stdout carries only the JSON result
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()?;
    }

    Ok(())
}

/// Load configuration from file with fallback to defaults
fn load_config(path: &str) -> Result<Config> {
    if std::path::Path::new(path).exists() {
        Config::from_file_with_env(path)
            .with_context(|| format!("Failed to load config from {}", path))
    } else {
        warn!("Config file '{}' not found, using defaults", path);
        Config::from_env()
    }
}
