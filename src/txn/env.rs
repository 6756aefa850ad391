//! Transaction environment
//!
//! Services shared by every session of an instance: configuration, the WAL
//! (absent when durability is off), the recovery clock that hands out LSNs,
//! and the scheduler used to yield after a failed WAL write.

use std::fs;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::config::{Config, WalMode};
use crate::error::Result;
use crate::wal::{Recovery, VClock, Wal, WalThread, WAL_FILE_NAME};

/// Cooperative scheduling hook
pub trait Scheduler: Send + Sync {
    /// Move the current execution context to the back of the run queue
    fn reschedule(&self);
}

/// Scheduler for plain OS threads
#[derive(Debug, Default)]
pub struct YieldScheduler;

impl Scheduler for YieldScheduler {
    fn reschedule(&self) {
        std::thread::yield_now();
    }
}

pub struct TxnEnv {
    config: Config,
    wal: Option<Arc<dyn Wal>>,
    recovery: Mutex<Recovery>,
    scheduler: Arc<dyn Scheduler>,
    next_txn_id: AtomicU64,
}

impl TxnEnv {
    /// Environment with an explicit WAL (or none) and an empty clock
    pub fn new(config: Config, wal: Option<Arc<dyn Wal>>) -> Result<Self> {
        Self::with_vclock(config, wal, VClock::new())
    }

    /// Environment continuing from `vclock`
    pub fn with_vclock(config: Config, wal: Option<Arc<dyn Wal>>, vclock: VClock) -> Result<Self> {
        let recovery = Recovery::with_vclock(config.replica_id, vclock)?;
        Ok(Self {
            config,
            wal,
            recovery: Mutex::new(recovery),
            scheduler: Arc::new(YieldScheduler),
            next_txn_id: AtomicU64::new(1),
        })
    }

    /// Environment as configured: a WAL thread over `{data_dir}/wal.log`
    /// in `WalMode::Write`, no WAL in `WalMode::None`
    pub fn open(config: Config) -> Result<Self> {
        match config.wal_mode {
            WalMode::None => Self::new(config, None),
            WalMode::Write => {
                fs::create_dir_all(&config.data_dir)?;
                let path = config.data_dir.join(WAL_FILE_NAME);
                let thread = WalThread::start(
                    &path,
                    config.wal_sync_strategy,
                    config.wal_write_timeout(),
                )?;
                let vclock = thread.start_vclock().clone();
                tracing::info!(
                    path = %path.display(),
                    signature = vclock.sum(),
                    "transaction environment opened"
                );
                Self::with_vclock(config, Some(Arc::new(thread)), vclock)
            }
        }
    }

    /// Replace the scheduler
    pub fn with_scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn wal(&self) -> Option<&Arc<dyn Wal>> {
        self.wal.as_ref()
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub(crate) fn recovery(&self) -> MutexGuard<'_, Recovery> {
        self.recovery.lock()
    }

    /// Signature of everything handed to the WAL so far
    pub fn signature(&self) -> i64 {
        self.recovery.lock().signature()
    }

    pub fn vclock(&self) -> VClock {
        self.recovery.lock().vclock().clone()
    }

    /// Accept relayed rows from `replica_id`
    pub fn register_replica(&self, replica_id: u32) {
        self.recovery.lock().register_replica(replica_id);
    }

    pub(crate) fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::Relaxed)
    }
}
