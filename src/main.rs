//! neo-wallet-adapter - Neo N3 wallet tooling
//!
//! Lists the supported wallets, waits for transactions, and pairs with
//! WalletConnect wallets from the terminal.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use neo_wallet_adapter::wait::{wait_tx, RpcClient, WaitOptions};
use neo_wallet_adapter::{Config, WalletName};

/// neo-wallet-adapter: Unified Neo N3 wallet adapters
#[derive(Parser)]
#[command(name = "neo-wallet-adapter")]
#[command(about = "Unified adapters for Neo N3 wallets", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported wallets
    Wallets,

    /// Wait until a transaction is included in a block
    WaitTx {
        /// Transaction id
        #[arg(value_name = "TXID")]
        tx_id: String,

        /// Neo JSON-RPC node, overrides the configuration
        #[arg(short, long)]
        rpc: Option<String>,

        /// Polling interval in milliseconds
        #[arg(short, long, default_value = "1000")]
        frequency: u64,

        /// Timeout in milliseconds
        #[arg(short, long, default_value = "30000")]
        timeout: u64,
    },

    /// Pair with a WalletConnect wallet and print the connected account
    #[cfg(feature = "walletconnect")]
    Pair {
        /// Wallet to pair with
        #[arg(short, long, default_value = "WalletConnect")]
        wallet: WalletName,

        /// Message to have the wallet sign once connected
        #[arg(short, long)]
        sign: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let config = match &cli.config {
        Some(path) => match Config::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                error!("{}", e);
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };

    let result = match cli.command {
        Commands::Wallets => {
            list_wallets();
            Ok(())
        }
        Commands::WaitTx {
            tx_id,
            rpc,
            frequency,
            timeout,
        } => {
            let url = rpc.unwrap_or_else(|| config.rpc_url.clone());
            info!("Waiting for {} on {}", tx_id, url);
            wait_for(&url, &tx_id, frequency, timeout).await
        }
        #[cfg(feature = "walletconnect")]
        Commands::Pair { wallet, sign } => pair(&config, wallet, sign).await,
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn list_wallets() {
    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│  SUPPORTED WALLETS                                          │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│                                                             │");
    println!("│  Wallet          │ Transport                                │");
    println!("│  ────────────────┼───────────────────────────────────────── │");
    for name in WalletName::ALL {
        println!("│  {:<15} │ {:<26} {}", name.as_str(), name.transport(), name.url());
    }
    println!("│                                                             │");
    println!("└─────────────────────────────────────────────────────────────┘");
}

async fn wait_for(
    url: &str,
    tx_id: &str,
    frequency: u64,
    timeout: u64,
) -> Result<(), neo_wallet_adapter::WalletError> {
    let rpc = RpcClient::new(url);
    let options = WaitOptions {
        read_frequency: Duration::from_millis(frequency),
        timeout: Duration::from_millis(timeout),
    };
    let transaction = wait_tx(&rpc, tx_id, options).await?;

    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│  TRANSACTION CONFIRMED                                      │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│  Hash: {}", tx_id);
    if let Some(block) = transaction.get("blockhash").and_then(|b| b.as_str()) {
        println!("│  Block: {}", block);
    }
    if let Some(confirmations) = transaction.get("confirmations") {
        println!("│  Confirmations: {}", confirmations);
    }
    println!("└─────────────────────────────────────────────────────────────┘");
    Ok(())
}

#[cfg(feature = "walletconnect")]
async fn pair(
    config: &Config,
    name: WalletName,
    sign: Option<String>,
) -> Result<(), neo_wallet_adapter::WalletError> {
    use neo_wallet_adapter::adapter::SignMessageInvocation;
    use neo_wallet_adapter::wallets::walletconnect::{RelaySignClientBuilder, TerminalPresenter};
    use neo_wallet_adapter::{ProviderOptions, Wallet, WalletError, WalletProvider};
    use std::sync::Arc;

    if !matches!(name, WalletName::WalletConnect | WalletName::Neon) {
        return Err(neo_wallet_adapter::WalletError::method_not_supported()
            .with_message(format!("{} does not pair over WalletConnect", name)));
    }

    let wallet = Wallet::walletconnect(
        name,
        config.wallet_connect.clone(),
        Arc::new(RelaySignClientBuilder::default()),
        Arc::new(TerminalPresenter::new()),
    );
    let provider = WalletProvider::with_options(
        vec![wallet],
        ProviderOptions {
            auto_connect: false,
            on_error: Arc::new(|e: &WalletError| error!("{}", e)),
        },
    );

    provider.select(name).await?;
    provider.connect().await?;
    let state = provider.state();

    println!("┌─────────────────────────────────────────────────────────────┐");
    println!("│  CONNECTED                                                  │");
    println!("├─────────────────────────────────────────────────────────────┤");
    println!("│  Wallet: {}", name);
    println!("│  Address: {}", state.address.unwrap_or_default());
    println!("│  Chain: {}", config.wallet_connect.options.chain_id);
    println!("└─────────────────────────────────────────────────────────────┘");

    if let Some(message) = sign {
        let result = provider
            .sign_message(&SignMessageInvocation {
                message,
                version: None,
            })
            .await?;
        match serde_json::to_string_pretty(&result) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to render result: {}", e),
        }
    }

    provider.disconnect().await
}
