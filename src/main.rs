use std::sync::Arc;

use tracing::info;

use chamberd::config::Config;
use chamberd::engine::Engine;
use chamberd::notify::NotifyHub;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    chamberd::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let ledger_path = config.ledger_path();
    let engine = Arc::new(Engine::open(&ledger_path, Arc::new(NotifyHub::new()))?);

    let (facilities, chambers, bookings) = engine.stats().await;
    info!("chamberd ready");
    info!("  ledger: {}", ledger_path.display());
    info!("  state: {facilities} facilities, {chambers} chambers, {bookings} bookings");
    info!(
        "  compaction: every {} appends, checked every {:?}",
        config.compact_threshold, config.compact_interval
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let compactor = tokio::spawn(chamberd::compactor::run_compactor(
        engine.clone(),
        config.compact_threshold,
        config.compact_interval,
    ));

    shutdown_signal().await?;
    info!("shutdown signal received");
    compactor.abort();

    // Final snapshot.
    if let Err(e) = engine.compact().await {
        tracing::warn!("final compaction failed: {e}");
    }
    info!("chamberd stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        r = tokio::signal::ctrl_c() => r,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
