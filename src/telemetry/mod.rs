//! Logging setup and periodic stats reporting

use crate::config::TelemetryConfig;
use crate::metrics::IngestMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize structured logging. `RUST_LOG` overrides the configured level.
pub fn init_logging(config: &TelemetryConfig) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;

    Ok(())
}

/// Log a metrics snapshot at a fixed interval until shutdown.
///
/// One log line per interval with every counter, so operators can follow
/// throughput and drop rates without a metrics backend.
pub async fn stats_loop(
    config: TelemetryConfig,
    metrics: Arc<IngestMetrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    if config.stats_interval_secs == 0 {
        return;
    }
    let mut interval = tokio::time::interval(Duration::from_secs(config.stats_interval_secs));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick fires immediately; skip it so the first line carries a
    // full interval of counts.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = interval.tick() => log_snapshot(&metrics),
            _ = shutdown.changed() => break,
        }
    }
}

fn log_snapshot(metrics: &IngestMetrics) {
    let snap = metrics.snapshot();
    let staleness_secs = snap
        .write_staleness(chrono::Utc::now())
        .map(|d| d.num_seconds());
    tracing::info!(
        state = %snap.connection_state,
        received = snap.messages_received,
        normalized = snap.messages_normalized,
        dropped_invalid = snap.dropped_invalid,
        dropped_backpressure = snap.dropped_backpressure,
        written = snap.records_written,
        records_dropped = snap.records_dropped,
        store_errors = snap.store_errors,
        subscription_failures = snap.subscription_failures,
        catalog_errors = snap.catalog_errors,
        reconnects = snap.reconnects,
        write_staleness_secs = staleness_secs,
        "Ingest stats"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stats_loop_disabled_returns_immediately() {
        let config = TelemetryConfig {
            log_level: "info".to_string(),
            stats_interval_secs: 0,
        };
        let metrics = Arc::new(IngestMetrics::new());
        let (_tx, rx) = watch::channel(false);

        tokio::time::timeout(Duration::from_millis(50), stats_loop(config, metrics, rx))
            .await
            .expect("disabled stats loop must not block");
    }

    #[tokio::test]
    async fn test_stats_loop_stops_on_shutdown() {
        let config = TelemetryConfig {
            log_level: "info".to_string(),
            stats_interval_secs: 3600,
        };
        let metrics = Arc::new(IngestMetrics::new());
        let (tx, rx) = watch::channel(false);

        let handle = tokio::spawn(stats_loop(config, metrics, rx));
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("stats loop must exit on shutdown")
            .unwrap();
    }
}
