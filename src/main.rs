//! # aw: Offchain Ark Wallet
//!
//! Command line front end for the aw wallet library. Creates a wallet
//! identity, shows its balances (boarding, settled, preconfirmed,
//! recoverable), settles boarding funds into the offchain pool, and sends
//! payments. All protocol work happens in the wallet SDK, reached through a
//! local bridge process.
//!
//! ## Balance Lifecycle
//!
//! ```text
//! ┌─────────────┐  deposit   ┌─────────────┐   settle    ┌─────────────┐
//! │  Boarding   │ ─────────> │  Boarding   │ ──────────> │   Settled   │
//! │   Address   │            │  (on-chain) │             │ (offchain)  │
//! └─────────────┘            └─────────────┘             └─────────────┘
//!                                                               │ send
//!                                                               ▼
//!                                                        ┌─────────────┐
//!                                                        │Preconfirmed │
//!                                                        │ (recipient) │
//!                                                        └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! aw create
//! aw refresh
//! aw settle
//! aw send tark1q... 10000
//! aw clear --yes
//!
//! # Offline walkthrough against a simulated server
//! aw demo
//! ```

use anyhow::Result;
use aw_wallet::{
    config::{self, WalletConfig},
    reconcile::Freshness,
    services::{simulated::SimulatedCoordinator, HttpSessionFactory},
    storage::{FileStore, MemoryStore, WalletRepository},
    utils::{address, amount, time, txid},
    PaymentRequest, SecretKey, Wallet, WalletError, WalletRecord,
};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};

#[derive(Parser)]
#[command(name = "aw")]
#[command(about = "An offchain Ark wallet: boarding, settlement and payments")]
struct Cli {
    /// Ark coordination server URL
    #[arg(long, global = true)]
    server_url: Option<String>,
    /// SDK bridge URL
    #[arg(long, global = true)]
    bridge_url: Option<String>,
    /// Directory holding the wallet record
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Timeout for each network step, in seconds
    #[arg(long, global = true)]
    timeout: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key, create the wallet and fetch its first balance
    Create,
    /// Show the stored wallet without contacting the server
    Show {
        /// Print the private key in hex
        #[arg(long, default_value_t = false)]
        reveal: bool,
    },
    /// Check for incoming funds and refresh the balance
    Refresh,
    /// Settle boarding funds into the offchain pool
    Settle,
    /// Send a payment
    Send {
        /// Destination address (offchain or on-chain)
        destination: String,
        /// Amount in satoshis
        amount: String,
    },
    /// Delete the wallet. There is no backup.
    Clear {
        /// Confirm deletion
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
    /// Print a fresh private key without creating a wallet
    Keygen,
    /// Walk through the wallet lifecycle against a simulated server
    Demo {
        /// Settlement fee charged by the simulated server, in sats
        #[arg(long, default_value_t = 0)]
        settlement_fee: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    match cli.command {
        Commands::Create => create(&config).await?,
        Commands::Show { reveal } => show(&config, reveal)?,
        Commands::Refresh => refresh(&config).await?,
        Commands::Settle => settle(&config).await?,
        Commands::Send {
            destination,
            amount,
        } => send(&config, &destination, &amount).await?,
        Commands::Clear { yes } => clear(&config, yes)?,
        Commands::Keygen => keygen()?,
        Commands::Demo { settlement_fee } => demo(&config, settlement_fee).await?,
    }

    Ok(())
}

fn resolve_config(cli: &Cli) -> Result<WalletConfig> {
    let mut config = WalletConfig::from_env()?;
    if let Some(url) = &cli.server_url {
        config.server_url = url.clone();
    }
    if let Some(url) = &cli.bridge_url {
        config.bridge_url = url.clone();
    }
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(raw) = &cli.timeout {
        config.operation_timeout = config::parse_timeout_secs(raw)?;
    }
    config.validate()?;
    Ok(config)
}

fn open_wallet(config: &WalletConfig) -> Result<Wallet> {
    let store = FileStore::open(&config.data_dir)?;
    let factory = HttpSessionFactory::new(&config.bridge_url)?;
    Ok(Wallet::new(
        WalletRepository::new(Box::new(store)),
        Arc::new(factory),
        config.clone(),
    ))
}

async fn create(config: &WalletConfig) -> Result<()> {
    let wallet = open_wallet(config)?;
    println!("🔑 Creating wallet against {}", config.server_url);

    let view = wallet.create().await?;
    println!("✅ Wallet created");
    print_record(&view.record, false);
    print_freshness(&view.freshness);
    if let Some(boarding) = &view.record.boarding_address {
        println!("\nSend on-chain funds to {} to board them", boarding);
    }
    Ok(())
}

fn show(config: &WalletConfig, reveal: bool) -> Result<()> {
    let wallet = open_wallet(config)?;
    match wallet.load()? {
        Some(record) => print_record(&record, reveal),
        None => println!("No wallet found. Run `aw create` to make one."),
    }
    Ok(())
}

async fn refresh(config: &WalletConfig) -> Result<()> {
    let wallet = open_wallet(config)?;
    match wallet.refresh().await {
        Ok(view) => {
            print_record(&view.record, false);
            print_freshness(&view.freshness);
            Ok(())
        }
        Err(e) => {
            report_stale_fallback(&wallet, &e);
            Err(e.into())
        }
    }
}

async fn settle(config: &WalletConfig) -> Result<()> {
    let wallet = open_wallet(config)?;
    println!("⏳ Settling boarding funds, this waits for the next round...");

    match wallet.settle().await {
        Ok(outcome) => {
            println!(
                "✅ Settled in commitment {}",
                txid::format_short(&outcome.commitment.0)
            );
            print_record(&outcome.record, false);
            print_freshness(&outcome.freshness);
            Ok(())
        }
        Err(WalletError::Settlement(err)) if err.funds_moved() => {
            println!("⚠️  {}", err);
            println!("   Funds moved. Run `aw refresh` to update the balance.");
            Err(WalletError::Settlement(err).into())
        }
        Err(e) => Err(e.into()),
    }
}

async fn send(config: &WalletConfig, destination: &str, amount_input: &str) -> Result<()> {
    let wallet = open_wallet(config)?;
    let request = PaymentRequest::parse(destination, amount_input).map_err(WalletError::from)?;
    let kind = if address::is_offchain_address(request.destination()) {
        "offchain"
    } else {
        "on-chain"
    };
    println!(
        "💸 Sending {} to {} ({})",
        amount::format_sats(request.amount()),
        address::format_short(request.destination()),
        kind
    );

    let receipt = wallet.send(request).await?;
    match &receipt.txid {
        Some(id) => println!("✅ Payment sent: {}", id),
        None => println!("✅ Payment accepted, transaction id not known yet"),
    }
    print_record(&receipt.record, false);
    print_freshness(&receipt.freshness);
    Ok(())
}

fn clear(config: &WalletConfig, yes: bool) -> Result<()> {
    if !yes {
        println!("This deletes the wallet and its private key permanently.");
        println!("Re-run with --yes to confirm.");
        return Ok(());
    }
    let wallet = open_wallet(config)?;
    wallet.clear()?;
    println!("🗑️  Wallet cleared");
    Ok(())
}

fn keygen() -> Result<()> {
    let key = SecretKey::generate()?;
    let identity = key.public_identity()?;
    println!("Private key: {}", key.expose_hex());
    println!("Public key:  {}", identity);
    Ok(())
}

async fn demo(config: &WalletConfig, settlement_fee: u64) -> Result<()> {
    let coordinator = SimulatedCoordinator::new().with_settlement_fee(settlement_fee);
    let new_wallet = || {
        Wallet::new(
            WalletRepository::new(Box::new(MemoryStore::new())),
            Arc::new(coordinator.clone()),
            config.clone(),
        )
    };
    let alice = new_wallet();
    let bob = new_wallet();

    println!("🧪 Simulated server, nothing leaves this process\n");

    println!("1. Creating two wallets");
    let alice_record = alice.create().await?.record;
    let bob_record = bob.create().await?.record;
    print_balance("alice", &alice_record);
    print_balance("bob", &bob_record);

    let boarding = alice_record
        .boarding_address
        .clone()
        .ok_or_else(|| anyhow::anyhow!("simulated server returned no boarding address"))?;
    println!("\n2. Depositing 50,000 sats to alice's boarding address");
    coordinator.fund_boarding(&boarding, 50_000, true)?;
    let view = alice.refresh().await?;
    print_balance("alice", &view.record);

    println!("\n3. Settling boarding funds (fee {} sats)", settlement_fee);
    let outcome = alice.settle().await?;
    println!("   commitment {}", txid::format_short(&outcome.commitment.0));
    print_balance("alice", &outcome.record);

    println!("\n4. Overspending is caught before any network call");
    let too_much = outcome.record.balance.available + 1;
    match alice
        .send(PaymentRequest::new(&bob_record.address, too_much)?)
        .await
    {
        Err(e) => println!("   refused: {}", e),
        Ok(_) => anyhow::bail!("overspend was accepted"),
    }

    println!("\n5. Alice pays bob 12,000 sats");
    let receipt = alice
        .send(PaymentRequest::new(&bob_record.address, 12_000)?)
        .await?;
    if let Some(id) = &receipt.txid {
        println!("   txid {}", txid::format_short(id));
    }
    print_balance("alice", &receipt.record);
    let bob_view = bob.refresh().await?;
    print_balance("bob", &bob_view.record);

    println!("\n6. Clearing alice's wallet");
    alice.clear()?;
    println!(
        "   record present afterwards: {}",
        alice.load()?.is_some()
    );

    Ok(())
}

fn print_balance(name: &str, record: &WalletRecord) {
    let balance = &record.balance;
    println!(
        "   {:<6} total {:>14} | available {:>14} | boarding {:>14} | settled {:>14} | preconfirmed {:>14}",
        name,
        amount::format_sats(balance.total),
        amount::format_sats(balance.available),
        amount::format_sats(balance.boarding.total),
        amount::format_sats(balance.settled),
        amount::format_sats(balance.preconfirmed),
    );
}

fn print_record(record: &WalletRecord, reveal: bool) {
    let balance = &record.balance;
    println!("\n🏦 Ark Wallet");
    println!("Address:          {}", record.address);
    if let Some(boarding) = &record.boarding_address {
        println!("Boarding address: {}", boarding);
    }
    if let Some(server) = &record.server_url {
        println!("Server:           {}", server);
    }
    if reveal {
        println!("Private key:      {}", record.private_key);
    }

    println!("\n💰 Balance");
    println!("Total:            {}", amount::format_dual(balance.total));
    println!("Available:        {}", amount::format_sats(balance.available));
    println!("Settled:          {}", amount::format_sats(balance.settled));
    println!("Preconfirmed:     {}", amount::format_sats(balance.preconfirmed));
    println!("Recoverable:      {}", amount::format_sats(balance.recoverable));
    println!(
        "Boarding:         {} ({} confirmed, {} unconfirmed)",
        amount::format_sats(balance.boarding.total),
        amount::format_sats(balance.boarding.confirmed),
        amount::format_sats(balance.boarding.unconfirmed),
    );
    println!("Updated:          {}", time::format_unix(record.balance_updated_at));
    if record.balance_stale {
        println!("⚠️  Balance may be out of date. Run `aw refresh`.");
    }
}

fn print_freshness(freshness: &Freshness) {
    if let Freshness::Stale { reason } = freshness {
        println!("⚠️  Balance may be stale: {}", reason);
    }
}

/// After a failed refresh, show what is cached so the user is not left blind
fn report_stale_fallback(wallet: &Wallet, err: &WalletError) {
    if matches!(err, WalletError::NoWallet) {
        return;
    }
    if let Ok(Some(record)) = wallet.load() {
        println!("⚠️  Refresh failed, showing the last known balance:");
        print_record(&record, false);
    }
}
