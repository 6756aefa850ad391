//! cellar Workload Binary
//!
//! Drives transactions through a `MemoryEngine` with a file WAL and reports
//! cache and WAL statistics.

use std::process;
use std::sync::Arc;
use std::time::Instant;

use cellar::cache::CacheEnv;
use cellar::config::{WalMode, WalSyncStrategy};
use cellar::engine::LATEST_VLSN;
use cellar::{
    tuple, Config, IteratorType, Key, KeyDef, MemoryEngine, Request, Session, Space, Tuple, TxnEnv,
};
use clap::{Parser, ValueEnum};
use tracing_subscriber::{fmt, EnvFilter};

/// cellar workload generator
#[derive(Parser, Debug)]
#[command(name = "cellar-workload")]
#[command(about = "Run a transactional workload against the in-memory engine")]
#[command(version)]
struct Args {
    /// Data directory (holds wal.log)
    #[arg(short, long, default_value = "./cellar_data")]
    data_dir: String,

    /// Number of transactions to run
    #[arg(short = 'n', long, default_value = "1000")]
    transactions: u64,

    /// Statements per multi-statement transaction (1 = autocommit)
    #[arg(short, long, default_value = "4")]
    statements: u64,

    /// Number of distinct keys
    #[arg(short, long, default_value = "256")]
    keys: u64,

    /// WAL mode
    #[arg(short, long, value_enum, default_value = "write")]
    wal: WalArg,

    /// fsync after every WAL batch
    #[arg(long)]
    sync_every_write: bool,

    /// Tuple cache quota in MB
    #[arg(short, long, default_value = "16")]
    cache_mb: usize,

    /// Range scans to run after the writes
    #[arg(long, default_value = "100")]
    scans: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum WalArg {
    Write,
    None,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cellar=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("cellar workload v{}", cellar::VERSION);
    tracing::info!("Data directory: {}", args.data_dir);

    if let Err(e) = run(&args) {
        tracing::error!("Workload failed: {}", e);
        process::exit(1);
    }
}

fn run(args: &Args) -> cellar::Result<()> {
    let sync_strategy = if args.sync_every_write {
        WalSyncStrategy::EveryWrite
    } else {
        WalSyncStrategy::EveryNEntries { count: 100 }
    };
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .wal_mode(match args.wal {
            WalArg::Write => WalMode::Write,
            WalArg::None => WalMode::None,
        })
        .wal_sync_strategy(sync_strategy)
        .cache_quota(args.cache_mb * 1024 * 1024)
        .build();

    let env = Arc::new(TxnEnv::open(config.clone())?);
    let cache_env = CacheEnv::new(config.cache_quota);
    let engine = MemoryEngine::new("memory", cache_env.clone());
    let space = engine.create_space(512, "workload", KeyDef::new(vec![0, 1]), false)?;
    let mut session = Session::new(Arc::clone(&env));

    // Step 1: writes
    let start = Instant::now();
    let keys = args.keys.max(1);
    let mut failed = 0u64;
    for i in 0..args.transactions {
        let multi = args.statements > 1;
        if multi {
            session.begin(false)?;
        }
        let mut result = Ok(());
        for s in 0..args.statements.max(1) {
            let k = (i * 7 + s * 13) % keys;
            let tuple = tuple![k % 16, k, format!("value-{}-{}", i, s)];
            result = replace_one(&mut session, &engine, &space, tuple);
            if result.is_err() {
                session.rollback_statement()?;
                break;
            }
        }
        if multi {
            result = match result {
                Ok(()) => session.commit(),
                Err(e) => session.rollback().and(Err(e)),
            };
        }
        if let Err(e) = result {
            failed += 1;
            tracing::debug!(txn = i, error = %e, "transaction failed");
        }
    }
    let elapsed = start.elapsed();
    tracing::info!(
        transactions = args.transactions,
        failed,
        signature = env.signature(),
        elapsed_ms = elapsed.as_millis() as u64,
        "writes finished"
    );

    // Step 2: scans, repeated so the second pass can hit the cache
    let start = Instant::now();
    let mut rows = 0usize;
    for i in 0..args.scans {
        let prefix = Key::new(vec![cellar::Value::from(i % 16)]);
        rows += engine
            .select(space.id(), IteratorType::Eq, &prefix, LATEST_VLSN)?
            .len();
    }
    let stats = engine.stats();
    let cache = cache_env.stats();
    tracing::info!(
        scans = args.scans,
        rows,
        cache_hits = stats.cache_hits,
        store_reads = stats.store_reads,
        cached = cache.entries,
        cache_bytes = cache.mem_used,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "scans finished"
    );
    Ok(())
}

fn replace_one(
    session: &mut Session,
    engine: &MemoryEngine,
    space: &Arc<Space>,
    tuple: Tuple,
) -> cellar::Result<()> {
    let request = Request::replace(space.id(), &tuple);
    let txn = session.begin_statement(space)?;
    engine.replace(txn, space, tuple)?;
    session.commit_statement(Some(&request))
}
