//! # cellar
//!
//! Transactional write path and tuple read cache of an embedded storage
//! engine:
//! - Transactions with nested statements, autocommit and two-phase commit
//! - One WAL batch per commit, LSNs assigned in statement commit order
//! - Pluggable storage engines behind a small hook trait
//! - An ordered, gap-aware tuple cache with a shared LRU quota
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Session (one per context)                 │
//! │        begin / begin_statement / commit / rollback           │
//! └──────────────┬──────────────────────────────┬───────────────┘
//!                │ redo rows                    │ hooks
//!                ▼                              ▼
//!   ┌─────────────────────┐          ┌─────────────────────┐
//!   │  WAL (WalThread)    │          │   StorageEngine     │
//!   │  Recovery / VClock  │          │   (MemoryEngine)    │
//!   └─────────────────────┘          └──────────┬──────────┘
//!                                               │ add / invalidate
//!                                               ▼
//!                                    ┌─────────────────────┐
//!                                    │ TupleCache ×N       │
//!                                    │ CacheEnv (LRU/quota)│
//!                                    └─────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod tuple;
pub mod key_def;
pub mod cache;
pub mod wal;
pub mod engine;
pub mod space;
pub mod trigger;
pub mod txn;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CellarError, Result};
pub use config::Config;
pub use engine::{MemoryEngine, StorageEngine};
pub use key_def::{IteratorType, Key, KeyDef};
pub use space::Space;
pub use tuple::{Tuple, Value};
pub use txn::{Request, Session, Transaction, TxnEnv};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of cellar
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
