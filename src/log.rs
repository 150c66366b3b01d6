//! Durability seam between the engine and its storage.
//!
//! The engine appends exactly one [`Event`] per committed operation and only
//! applies it to in-memory state once the append has succeeded.

use std::io;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::model::Event;
use crate::observability;
use crate::wal::Wal;

#[async_trait]
pub trait EventLog: Send + Sync {
    /// Durably record one event. On error the event must not be visible on replay.
    async fn append(&self, event: &Event) -> io::Result<()>;

    /// Replace the whole log with a snapshot that recreates current state.
    async fn compact(&self, snapshot: Vec<Event>) -> io::Result<()>;

    async fn appends_since_compact(&self) -> u64;
}

// ── Group-commit WAL ─────────────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Maintenance(Maintenance),
}

/// Commands that run between append batches.
enum Maintenance {
    Compact {
        snapshot: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// [`EventLog`] backed by a [`Wal`] owned by a background writer task.
///
/// Appends that arrive while a flush is in flight are batched into the next
/// fsync, so concurrent commits share one disk sync.
pub struct WalLog {
    tx: mpsc::Sender<WalCommand>,
}

impl WalLog {
    /// Open the WAL and spawn its writer. Must be called inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::spawn(Wal::open(path)?))
    }

    pub(crate) fn spawn(wal: Wal) -> Self {
        let (tx, rx) = mpsc::channel(4096);
        tokio::spawn(writer_loop(wal, rx));
        Self { tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> WalCommand,
    ) -> io::Result<T> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(make(tx))
            .await
            .map_err(|_| io::Error::other("WAL writer shut down"))?;
        rx.await
            .map_err(|_| io::Error::other("WAL writer dropped response"))
    }
}

#[async_trait]
impl EventLog for WalLog {
    async fn append(&self, event: &Event) -> io::Result<()> {
        let event = event.clone();
        self.request(|response| WalCommand::Append { event, response })
            .await?
    }

    async fn compact(&self, snapshot: Vec<Event>) -> io::Result<()> {
        self.request(|response| {
            WalCommand::Maintenance(Maintenance::Compact { snapshot, response })
        })
        .await?
    }

    async fn appends_since_compact(&self) -> u64 {
        self.request(|response| {
            WalCommand::Maintenance(Maintenance::AppendsSinceCompact { response })
        })
        .await
        .unwrap_or(0)
    }
}

/// 1. Block until a command arrives.
/// 2. For an append, drain every append already queued behind it.
/// 3. One flush + fsync for the batch, then answer every sender.
/// 4. A maintenance command found while draining runs after the batch flush.
async fn writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            WalCommand::Maintenance(m) => {
                maintain(&mut wal, m);
                continue;
            }
        };

        let mut batch: Vec<PendingAppend> = vec![(event, response)];
        let mut deferred = None;
        while let Ok(next) = rx.try_recv() {
            match next {
                WalCommand::Append { event, response } => batch.push((event, response)),
                WalCommand::Maintenance(m) => {
                    deferred = Some(m);
                    break;
                }
            }
        }

        metrics::histogram!(observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let started = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(observability::WAL_FLUSH_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::warn!("WAL flush of {} events failed: {e}", batch.len());
        }

        for (_, response) in batch {
            let _ = response.send(match &result {
                Ok(()) => Ok(()),
                Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
            });
        }
        if let Some(m) = deferred {
            maintain(&mut wal, m);
        }
    }
}

/// Write and fsync the whole batch, or leave the file as it was before it.
/// Every caller in a failed batch is told it failed, so none of its records
/// may survive to be replayed.
fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mark = wal.mark()?;
    let written = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
        .and_then(|()| wal.flush_sync());
    if let Err(e) = written {
        if let Err(rollback) = wal.rollback(mark) {
            tracing::error!("WAL rollback failed, refusing further appends: {rollback}");
        }
        return Err(e);
    }
    Ok(())
}

fn maintain(wal: &mut Wal, cmd: Maintenance) {
    match cmd {
        Maintenance::Compact { snapshot, response } => {
            let result = wal.compact(&snapshot);
            if result.is_ok() {
                tracing::info!("compacted {} to {} events", wal.path().display(), snapshot.len());
            }
            let _ = response.send(result);
        }
        Maintenance::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
    }
}

// ── In-memory log ────────────────────────────────────────

/// Non-durable [`EventLog`] that keeps events in memory.
#[derive(Default)]
pub struct MemoryLog {
    events: Mutex<Vec<Event>>,
    appends_since_compact: Mutex<u64>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

fn poisoned() -> io::Error {
    io::Error::other("memory log lock poisoned")
}

#[async_trait]
impl EventLog for MemoryLog {
    async fn append(&self, event: &Event) -> io::Result<()> {
        self.events.lock().map_err(|_| poisoned())?.push(event.clone());
        *self.appends_since_compact.lock().map_err(|_| poisoned())? += 1;
        Ok(())
    }

    async fn compact(&self, snapshot: Vec<Event>) -> io::Result<()> {
        *self.events.lock().map_err(|_| poisoned())? = snapshot;
        *self.appends_since_compact.lock().map_err(|_| poisoned())? = 0;
        Ok(())
    }

    async fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact.lock().map(|n| *n).unwrap_or(0)
    }
}
