use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: engine operations executed. Labels: op, status.
pub const OPERATIONS_TOTAL: &str = "chamberd_operations_total";

/// Histogram: operation latency in seconds. Labels: op.
pub const OPERATION_DURATION_SECONDS: &str = "chamberd_operation_duration_seconds";

// ── Scheduling outcomes ─────────────────────────────────────────

/// Counter: bookings created. Labels: assignment (explicit | optimal).
pub const BOOKINGS_CREATED_TOTAL: &str = "chamberd_bookings_created_total";

/// Counter: creates/updates rejected for overlapping a chamber or provider booking.
pub const BOOKING_CONFLICTS_TOTAL: &str = "chamberd_booking_conflicts_total";

/// Counter: implicit-assignment creates that found no free chamber.
pub const NO_CHAMBER_AVAILABLE_TOTAL: &str = "chamberd_no_chamber_available_total";

/// Counter: lifecycle transitions applied. Labels: action.
pub const TRANSITIONS_TOTAL: &str = "chamberd_transitions_total";

// ── USE metrics (storage) ───────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "chamberd_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "chamberd_wal_flush_batch_size";

/// Counter: WAL compactions performed.
pub const COMPACTIONS_TOTAL: &str = "chamberd_compactions_total";

/// Install the Prometheus exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Record one finished engine operation.
pub fn record_operation<T, E>(op: &'static str, started: std::time::Instant, result: &Result<T, E>) {
    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(OPERATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    metrics::histogram!(OPERATION_DURATION_SECONDS, "op" => op)
        .record(started.elapsed().as_secs_f64());
}

