//! Command Line Interface for the transaction tracker.
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use txmirror_data::{Database, FileStore, PgSnapshotStore, SnapshotStore};
use txmirror_domain::value_objects::{genesis_key, parse_h256};
use txmirror_domain::{Ledger, LedgerSnapshot, TxInfo, TxState};
use txmirror_execution::{CachePolicy, TrackerConfig, TrackerSnapshot, TxTracker};
use txmirror_protocols::rpc::JsonRpcClient;

#[derive(Parser)]
#[command(name = "txmirror")]
#[command(about = "Client-side transaction lifecycle tracker", long_about = None)]
struct Cli {
    /// Directory of the file snapshot store
    #[arg(long, env = "TXMIRROR_STORE_DIR", default_value = ".txmirror", global = true)]
    store_dir: PathBuf,

    /// PostgreSQL connection string. Replaces the file store when set
    #[arg(long, env = "DATABASE_URL", global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Track transactions until none is pending, received or dropped
    Watch {
        /// JSON-RPC endpoint of the node
        #[arg(long, env = "TXMIRROR_RPC_URL")]
        rpc_url: String,

        /// Transaction hashes to track
        hashes: Vec<String>,

        /// Blocks required on top of a receipt before confirming
        #[arg(long, default_value_t = 12)]
        confirm_count: u64,

        /// Confirmed plus failed transactions kept per account
        #[arg(long, default_value_t = 100)]
        buffer_size: usize,

        /// Fail transactions pending for more than this many blocks
        #[arg(long)]
        max_pending_blocks: Option<u64>,

        /// Forget cached data of evicted transactions
        #[arg(long, default_value_t = false)]
        prune: bool,

        /// New-block polling interval in milliseconds
        #[arg(long, default_value_t = 2000)]
        poll_ms: u64,
    },
    /// Print the persisted snapshot of a chain, or list stored chains
    Inspect {
        /// Genesis block hash of the chain
        genesis: Option<String>,

        /// Print the raw snapshot as JSON
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Clear the persisted snapshot of a chain, or of every chain
    Clear {
        /// Genesis block hash of the chain
        genesis: Option<String>,
    },
}

/// Snapshot backend selected on the command line.
enum Backend {
    File(FileStore),
    Postgres(PgSnapshotStore),
}

impl Backend {
    async fn open(cli: &Cli) -> Result<Self> {
        match &cli.database_url {
            Some(url) => {
                let db = Database::connect(url)
                    .await
                    .context("failed to connect to database")?;
                db.migrate().await.context("failed to run migrations")?;
                Ok(Self::Postgres(db.snapshots()))
            }
            None => Ok(Self::File(FileStore::new(cli.store_dir.clone()))),
        }
    }

    fn store(&self) -> Arc<dyn SnapshotStore> {
        match self {
            Self::File(store) => Arc::new(store.clone()),
            Self::Postgres(store) => Arc::new(store.clone()),
        }
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(match self {
            Self::File(store) => store.keys().await?,
            Self::Postgres(store) => store
                .find_all()
                .await?
                .into_iter()
                .map(|record| record.genesis)
                .collect(),
        })
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match self {
            Self::File(store) => store.remove(key).await?,
            Self::Postgres(store) => {
                store.delete(key).await?;
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let backend = Backend::open(&cli).await?;

    match cli.command {
        Commands::Watch {
            rpc_url,
            hashes,
            confirm_count,
            buffer_size,
            max_pending_blocks,
            prune,
            poll_ms,
        } => {
            let mut config = TrackerConfig::default()
                .with_confirm_count(confirm_count)
                .with_buffer_size(buffer_size);
            if let Some(max_age) = max_pending_blocks {
                config = config.with_max_pending_blocks(max_age);
            }
            if prune {
                config = config.with_cache_policy(CachePolicy::PruneEvicted);
            }
            let rpc =
                JsonRpcClient::new(rpc_url)?.with_poll_interval(Duration::from_millis(poll_ms));
            watch(Arc::new(rpc), backend.store(), config, &hashes).await?;
        }
        Commands::Inspect { genesis, json } => {
            let Some(genesis) = genesis else {
                let keys = backend.keys().await?;
                println!("📂 {} stored chain(s)", keys.len());
                for key in keys {
                    println!("  {key}");
                }
                return Ok(());
            };

            let key = genesis_key(&parse_h256(&genesis)?);
            let Some(blob) = backend.store().get(&key).await? else {
                println!("❌ No snapshot stored for {key}");
                return Ok(());
            };
            let snapshot = LedgerSnapshot::from_blob(&blob)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                println!("📦 Snapshot for {key}");
                println!(
                    "{} slot(s), {} info record(s), {} receipt(s)",
                    snapshot.accounts.len(),
                    snapshot.info.len(),
                    snapshot.receipts.len()
                );
                print_ledger(&snapshot.accounts);
            }
        }
        Commands::Clear { genesis } => match genesis {
            Some(genesis) => {
                let key = genesis_key(&parse_h256(&genesis)?);
                backend.remove(&key).await?;
                println!("🧹 Cleared {key}");
            }
            None => {
                backend.store().clear().await?;
                println!("🧹 Cleared every stored chain");
            }
        },
    }

    Ok(())
}

async fn watch(
    rpc: Arc<JsonRpcClient>,
    store: Arc<dyn SnapshotStore>,
    config: TrackerConfig,
    hashes: &[String],
) -> Result<()> {
    let infos = hashes
        .iter()
        .map(|hash| parse_h256(hash).map(TxInfo::new))
        .collect::<Result<Vec<_>, _>>()?;

    println!("📡 Connecting to {}...", rpc.url());
    let tracker = TxTracker::connect(rpc, store, config).await?;
    let snapshot = tracker.snapshot();
    println!(
        "🔗 Chain {:#x} at block {}",
        snapshot.genesis, snapshot.block_number
    );

    for err in tracker.add(infos).await? {
        println!("⚠️  {err}");
    }

    let mut rx = tracker.subscribe();
    let mut current = rx.borrow_and_update().clone();
    print_snapshot(&current);
    while current.has_active() {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                current = rx.borrow_and_update().clone();
                print_snapshot(&current);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }
    if !current.has_active() {
        println!("✅ Nothing left to track");
    }

    tracker.shutdown().await;
    Ok(())
}

fn print_snapshot(snapshot: &TrackerSnapshot) {
    let hash = snapshot
        .block_hash
        .map(|hash| format!("{hash:#x}"))
        .unwrap_or_default();
    println!(
        "\n📊 Block {} {} (revision {})",
        snapshot.block_number, hash, snapshot.revision
    );
    print_ledger(&snapshot.accounts);
    if let Some(err) = &snapshot.error {
        println!("⚠️  Last error: {err}");
    }
}

fn print_ledger(ledger: &Ledger) {
    println!(
        "{:<66} | {:<42} | {:>6} | {:<9}",
        "Hash", "Account", "Nonce", "State"
    );
    println!("{}", "-".repeat(132));
    for record in ledger.states_of(None, &TxState::ALL) {
        println!(
            "{:<66} | {:<42} | {:>6} | {:<9}",
            format!("{:#x}", record.hash),
            format!("{:#x}", record.account),
            record.nonce,
            record.state.as_str()
        );
    }
}
