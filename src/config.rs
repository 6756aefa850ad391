//! Configuration for cellar
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;
use std::time::Duration;

/// Main configuration for a cellar instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for data files
    /// Internal structure:
    ///   {data_dir}/
    ///     └── wal.log          (write-ahead log)
    pub data_dir: PathBuf,

    // -------------------------------------------------------------------------
    // WAL Configuration
    // -------------------------------------------------------------------------
    /// Whether committed rows go to a WAL at all
    pub wal_mode: WalMode,

    /// Sync strategy: how often to fsync WAL
    pub wal_sync_strategy: WalSyncStrategy,

    /// Upper bound for one WAL write call (milliseconds, 0 = wait forever)
    pub wal_write_timeout_ms: u64,

    /// WAL writes slower than this are logged as warnings (milliseconds)
    pub too_long_threshold_ms: u64,

    /// Replica id stamped on locally originated rows
    pub replica_id: u32,

    // -------------------------------------------------------------------------
    // Tuple Cache Configuration
    // -------------------------------------------------------------------------
    /// Memory quota shared by all tuple caches (in bytes, 0 disables caching)
    pub cache_quota: usize,
}

/// WAL mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalMode {
    /// Rows are appended to the WAL before the engine commits
    Write,

    /// Durability disabled; signatures come from the recovery clock
    None,
}

/// WAL sync strategy
#[derive(Debug, Clone, Copy)]
pub enum WalSyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N uncommitted entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./cellar_data"),
            wal_mode: WalMode::Write,
            wal_sync_strategy: WalSyncStrategy::EveryWrite,
            wal_write_timeout_ms: 5000,
            too_long_threshold_ms: 500,
            replica_id: 1,
            cache_quota: 128 * 1024 * 1024, // 128 MB
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// WAL write timeout, `None` when unbounded
    pub fn wal_write_timeout(&self) -> Option<Duration> {
        match self.wal_write_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Slow WAL write threshold
    pub fn too_long_threshold(&self) -> Duration {
        Duration::from_millis(self.too_long_threshold_ms)
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for the WAL file)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the WAL mode
    pub fn wal_mode(mut self, mode: WalMode) -> Self {
        self.config.wal_mode = mode;
        self
    }

    /// Set the WAL sync strategy
    pub fn wal_sync_strategy(mut self, strategy: WalSyncStrategy) -> Self {
        self.config.wal_sync_strategy = strategy;
        self
    }

    /// Set the WAL write timeout (in milliseconds)
    pub fn wal_write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.wal_write_timeout_ms = ms;
        self
    }

    /// Set the slow WAL write threshold (in milliseconds)
    pub fn too_long_threshold_ms(mut self, ms: u64) -> Self {
        self.config.too_long_threshold_ms = ms;
        self
    }

    /// Set the local replica id
    pub fn replica_id(mut self, id: u32) -> Self {
        self.config.replica_id = id;
        self
    }

    /// Set the tuple cache quota (in bytes)
    pub fn cache_quota(mut self, bytes: usize) -> Self {
        self.config.cache_quota = bytes;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
