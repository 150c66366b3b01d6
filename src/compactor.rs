use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::Engine;

/// Rewrite the log as a snapshot once `threshold` appends have accumulated.
/// Returns whether a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> bool {
    let pending = engine.appends_since_compact().await;
    if pending < threshold {
        return false;
    }
    match engine.compact().await {
        Ok(()) => {
            info!("compacted ledger after {pending} appends");
            true
        }
        Err(e) => {
            warn!("compaction failed: {e}");
            false
        }
    }
}

/// Background task that checks every `every` whether the log needs compacting.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        if !compact_if_due(&engine, threshold).await {
            debug!("compactor: nothing to do");
        }
    }
}
