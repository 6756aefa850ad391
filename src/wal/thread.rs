//! WAL writer thread
//!
//! Owns the `WalWriter` and serves write requests from any number of
//! sessions over a channel. Callers block until their batch is written or
//! the configured timeout expires.
//!
//! A batch that timed out before the thread picked it up is never written.
//! Once the thread has claimed a batch the caller waits for its outcome, so
//! a caller never reports failure for rows that reach the log.
//!
//! ```text
//! Session ──┐                    ┌──────────────┐
//! Session ──┼── WalRequest ────► │  WAL thread  │──► wal.log
//! Session ──┘ ◄── Result<i64> ── │ (WalWriter)  │
//!                                └──────────────┘
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use crate::config::WalSyncStrategy;
use crate::error::{CellarError, Result};

use super::row::RedoRow;
use super::vclock::VClock;
use super::writer::WalWriter;
use super::Wal;

const PENDING: u8 = 0;
const CLAIMED: u8 = 1;
const CANCELLED: u8 = 2;

struct WalRequest {
    rows: Vec<RedoRow>,
    reply: Sender<Result<i64>>,
    /// PENDING until either the thread claims it or the caller gives up
    state: Arc<AtomicU8>,
}

impl WalRequest {
    fn claim(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CLAIMED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

fn cancel(state: &AtomicU8) -> bool {
    state
        .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

/// Handle to a running WAL writer thread
pub struct WalThread {
    requests: Option<Sender<WalRequest>>,
    handle: Option<JoinHandle<()>>,
    timeout: Option<Duration>,
    /// Clock of the log when the thread started
    start_vclock: VClock,
}

impl WalThread {
    /// Open the WAL at `path` and start the writer thread
    pub fn start(
        path: &Path,
        sync_strategy: WalSyncStrategy,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let writer = WalWriter::open(path, sync_strategy)?;
        let start_vclock = writer.vclock().clone();
        let (tx, rx) = channel::unbounded();
        let handle = thread::Builder::new()
            .name("cellar-wal".to_string())
            .spawn(move || run(writer, rx))?;
        Ok(Self {
            requests: Some(tx),
            handle: Some(handle),
            timeout,
            start_vclock,
        })
    }

    /// Clock of the log as recovered at start
    pub fn start_vclock(&self) -> &VClock {
        &self.start_vclock
    }
}

fn run(mut writer: WalWriter, requests: Receiver<WalRequest>) {
    tracing::debug!(path = %writer.path().display(), "WAL thread started");
    for request in requests.iter() {
        if !request.claim() {
            tracing::debug!(rows = request.rows.len(), "skipping timed out WAL batch");
            continue;
        }
        let result = writer.write_batch(&request.rows);
        if let Err(e) = &result {
            tracing::error!(error = %e, rows = request.rows.len(), "WAL write failed");
        }
        // The session may have given up waiting
        let _ = request.reply.send(result);
    }
    tracing::debug!(rows = writer.rows_written(), "WAL thread stopped");
}

impl Wal for WalThread {
    fn write(&self, rows: &[RedoRow]) -> Result<i64> {
        let requests = self
            .requests
            .as_ref()
            .ok_or_else(|| CellarError::WalIo("WAL thread is stopped".to_string()))?;
        let (reply, response) = channel::bounded(1);
        let state = Arc::new(AtomicU8::new(PENDING));
        requests
            .send(WalRequest {
                rows: rows.to_vec(),
                reply,
                state: Arc::clone(&state),
            })
            .map_err(|_| CellarError::WalIo("WAL thread is gone".to_string()))?;

        match self.timeout {
            None => response
                .recv()
                .map_err(|_| CellarError::WalIo("WAL thread dropped the request".to_string()))?,
            Some(timeout) => match response.recv_timeout(timeout) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) if cancel(&state) => {
                    Err(CellarError::WalTimeout(timeout))
                }
                Err(RecvTimeoutError::Timeout) => {
                    // Already being written: its outcome is the outcome
                    tracing::warn!(
                        rows = rows.len(),
                        timeout_ms = timeout.as_millis() as u64,
                        "WAL write outlived its timeout"
                    );
                    response.recv().map_err(|_| {
                        CellarError::WalIo("WAL thread dropped the request".to_string())
                    })?
                }
                Err(RecvTimeoutError::Disconnected) => Err(CellarError::WalIo(
                    "WAL thread dropped the request".to_string(),
                )),
            },
        }
    }
}

impl Drop for WalThread {
    fn drop(&mut self) {
        // Closing the channel ends the thread loop
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("WAL thread panicked");
            }
        }
    }
}
