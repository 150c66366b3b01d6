mod availability;
mod conflict;
mod error;
mod ledger;
mod lifecycle;
mod mutations;
mod queries;
mod scoring;

pub use availability::{available_chambers, ChamberFilter};
pub use conflict::{booking_window, day_span, has_conflict};
pub use error::EngineError;
pub use ledger::Ledger;
pub use lifecycle::{authorize, BookingAction};
pub use scoring::{pick_optimal, score, usage_counts, AssignmentFactors};

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use crate::log::{EventLog, MemoryLog, WalLog};
use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

/// Clock returning Unix milliseconds.
pub type Clock = Arc<dyn Fn() -> Ms + Send + Sync>;

/// Facility scheduling engine.
///
/// Every mutation holds the ledger write lock across its conflict re-check,
/// the log append and the in-memory apply, so concurrent requests for the
/// same chamber or provider serialise and at most one of them wins.
pub struct Engine {
    ledger: RwLock<Ledger>,
    log: Arc<dyn EventLog>,
    pub notify: Arc<NotifyHub>,
    clock: Clock,
}

impl Engine {
    /// Engine over an existing log whose contents are `history`.
    pub fn new(history: &[Event], log: Arc<dyn EventLog>, notify: Arc<NotifyHub>) -> Self {
        Self {
            ledger: RwLock::new(Ledger::from_events(history)),
            log,
            notify,
            clock: Arc::new(conflict::now_ms),
        }
    }

    /// Replay the WAL at `path` and keep appending to it.
    /// Must be called inside a tokio runtime (spawns the WAL writer).
    pub fn open(path: &Path, notify: Arc<NotifyHub>) -> std::io::Result<Self> {
        let history = Wal::replay(path)?;
        let log = WalLog::open(path)?;
        info!("replayed {} events from {}", history.len(), path.display());
        Ok(Self::new(&history, Arc::new(log), notify))
    }

    /// Non-durable engine, for tests and ephemeral deployments.
    pub fn in_memory() -> Self {
        Self::new(&[], Arc::new(MemoryLog::new()), Arc::new(NotifyHub::new()))
    }

    /// Replace the clock used for "today" and cancellation timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn now(&self) -> Ms {
        (self.clock)()
    }

    /// Append to the log, then apply and broadcast. Nothing is applied if the
    /// append fails. Caller holds the ledger write lock.
    pub(super) async fn commit(&self, ledger: &mut Ledger, event: Event) -> Result<(), EngineError> {
        if let Err(e) = self.log.append(&event).await {
            tracing::warn!("log append failed, operation rolled back: {e}");
            return Err(e.into());
        }
        ledger.apply(&event);
        if let Some(facility_id) = ledger.facility_of(&event) {
            self.notify.send(facility_id, &event);
        }
        Ok(())
    }

    /// Rewrite the log as a snapshot of current state.
    pub async fn compact(&self) -> Result<(), EngineError> {
        // Write lock: no commit may land between snapshot and swap.
        let ledger = self.ledger.write().await;
        self.log.compact(ledger.snapshot()).await?;
        metrics::counter!(crate::observability::COMPACTIONS_TOTAL).increment(1);
        Ok(())
    }

    pub async fn appends_since_compact(&self) -> u64 {
        self.log.appends_since_compact().await
    }

    /// `(facilities, chambers, bookings)` currently held.
    pub async fn stats(&self) -> (usize, usize, usize) {
        let ledger = self.ledger.read().await;
        (ledger.facility_count(), ledger.chamber_count(), ledger.booking_count())
    }
}
