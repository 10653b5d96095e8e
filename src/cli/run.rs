//! Run command implementation
//!
//! Wires the pipeline together: catalog fetch, store connection, batch
//! writer, connection manager, daily catalog refresher, and the stats
//! reporter, then waits for Ctrl-C and shuts everything down with a
//! bounded grace period.

use crate::catalog::{refresh_loop, Catalog};
use crate::config::Config;
use crate::metrics::IngestMetrics;
use crate::store::{MemoryStore, RedisStore};
use crate::telemetry::stats_loop;
use crate::writer::BatchWriter;
use crate::ws::{CatalogUpdate, ConnectionManager};
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Use an in-memory store instead of Redis (local runs)
    #[arg(long)]
    pub memory_store: bool,
}

impl RunArgs {
    pub async fn execute(&self, config: Config) -> anyhow::Result<()> {
        let catalog = Catalog::new(config.catalog.clone())?;

        // No catalog, no feed. Startup is the one place this is fatal;
        // once running, refresh failures keep the previous set.
        let symbols = catalog.fetch_symbols().await?;
        tracing::info!(symbols = symbols.len(), "Resolved option catalog");

        let metrics = Arc::new(IngestMetrics::new());
        let (record_tx, record_rx) = mpsc::channel(config.writer.queue_capacity);
        let (catalog_tx, catalog_rx) = mpsc::channel::<CatalogUpdate>(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let entry_ttl = Duration::from_secs(config.store.entry_ttl_secs);
        let writer_handle: JoinHandle<()> = if self.memory_store {
            tracing::info!("Using in-memory store");
            let writer = BatchWriter::new(
                config.writer.clone(),
                entry_ttl,
                MemoryStore::new(),
                Arc::clone(&metrics),
                record_rx,
                shutdown_rx.clone(),
            );
            tokio::spawn(writer.run())
        } else {
            let store = RedisStore::connect(
                &config.store.url,
                Duration::from_secs(config.store.timeout_secs),
            )
            .await?;
            tracing::info!(url = %config.store.url, "Connected to store");
            let writer = BatchWriter::new(
                config.writer.clone(),
                entry_ttl,
                store,
                Arc::clone(&metrics),
                record_rx,
                shutdown_rx.clone(),
            );
            tokio::spawn(writer.run())
        };

        let manager = ConnectionManager::new(
            config.transport.clone(),
            config.subscription.clone(),
            symbols.clone(),
            Arc::clone(&metrics),
            record_tx,
            catalog_rx,
            shutdown_rx.clone(),
        );
        let manager_handle = tokio::spawn(manager.run());

        let refresh_handle = tokio::spawn(refresh_loop(
            catalog,
            symbols,
            catalog_tx,
            Arc::clone(&metrics),
            shutdown_rx.clone(),
        ));

        let stats_handle = tokio::spawn(stats_loop(
            config.telemetry.clone(),
            Arc::clone(&metrics),
            shutdown_rx,
        ));

        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown signal received");
        shutdown_tx.send(true)?;

        let all = futures_util::future::join_all([
            manager_handle,
            writer_handle,
            refresh_handle,
            stats_handle,
        ]);
        if tokio::time::timeout(SHUTDOWN_GRACE, all).await.is_err() {
            tracing::warn!(
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "Shutdown grace period expired; exiting anyway"
            );
        }

        let snap = metrics.snapshot();
        tracing::info!(
            received = snap.messages_received,
            written = snap.records_written,
            dropped = snap.records_dropped,
            "Ingestion stopped"
        );
        Ok(())
    }
}
