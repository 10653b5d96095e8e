//! Connection manager: single owner of the WebSocket session
//!
//! One task runs the whole lifecycle: Disconnected → Connecting →
//! Subscribing → Live, dropping to Backoff on any detected failure and
//! reconnecting forever. Subscription pacing and heartbeat share the
//! socket's write half inside the session loop, keeping single-writer
//! discipline without locks.

use crate::config::{SubscriptionConfig, TransportConfig};
use crate::error::TransportError;
use crate::feed::{parse_frame, ControlReply, Inbound, TickerRecord};
use crate::metrics::IngestMetrics;
use crate::subscription::ChunkScheduler;
use crate::ws::{BackoffPolicy, ConnState};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Catalog refresh result delivered to the connection manager
#[derive(Debug, Clone)]
pub struct CatalogUpdate {
    /// Complete current symbol set; becomes the basis of the next full
    /// re-subscription pass
    pub symbols: Vec<String>,
    /// Newly listed symbols; subscribed incrementally right away
    pub added: Vec<String>,
}

/// Owns the transport handle and the connection state machine
pub struct ConnectionManager {
    config: TransportConfig,
    symbols: Vec<String>,
    scheduler: ChunkScheduler,
    metrics: Arc<IngestMetrics>,
    record_tx: mpsc::Sender<TickerRecord>,
    catalog_rx: mpsc::Receiver<CatalogUpdate>,
    shutdown: watch::Receiver<bool>,
}

impl ConnectionManager {
    pub fn new(
        config: TransportConfig,
        sub_config: SubscriptionConfig,
        symbols: Vec<String>,
        metrics: Arc<IngestMetrics>,
        record_tx: mpsc::Sender<TickerRecord>,
        catalog_rx: mpsc::Receiver<CatalogUpdate>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            symbols,
            scheduler: ChunkScheduler::new(sub_config),
            metrics,
            record_tx,
            catalog_rx,
            shutdown,
        }
    }

    /// Run until shutdown. Reconnects indefinitely; there is no failure
    /// mode that makes this return early.
    pub async fn run(mut self) {
        let mut backoff = BackoffPolicy::new(
            std::time::Duration::from_millis(self.config.backoff_initial_ms),
            std::time::Duration::from_millis(self.config.backoff_max_ms),
        );

        while !*self.shutdown.borrow() {
            set_state(&self.metrics, ConnState::Connecting);

            match self.connect().await {
                Ok(stream) => {
                    backoff.reset();
                    match self.session(stream).await {
                        Ok(()) => break, // shutdown requested
                        Err(e) => {
                            tracing::warn!(error = %e, "Connection lost");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Connect failed");
                }
            }

            if *self.shutdown.borrow() {
                break;
            }

            set_state(&self.metrics, ConnState::Backoff);
            self.metrics.reconnect();
            let delay = backoff.next_delay();

            if backoff.attempt_count() >= self.config.escalate_after_attempts {
                tracing::error!(
                    attempts = backoff.attempt_count(),
                    delay_ms = delay.as_millis() as u64,
                    "Upstream still unreachable; continuing to retry"
                );
            } else {
                tracing::info!(
                    attempt = backoff.attempt_count(),
                    delay_ms = delay.as_millis() as u64,
                    "Reconnecting after backoff"
                );
            }

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.shutdown.changed() => {}
            }
        }

        set_state(&self.metrics, ConnState::Disconnected);
        tracing::info!("Connection manager stopped");
    }

    async fn connect(&self) -> Result<WsStream, TransportError> {
        tracing::info!(url = %self.config.url, "Connecting to upstream feed");

        match tokio::time::timeout(self.config.connect_timeout(), connect_async(&self.config.url))
            .await
        {
            Err(_) => Err(TransportError::Connect("handshake timed out".to_string())),
            Ok(Err(e)) => Err(TransportError::Connect(e.to_string())),
            Ok(Ok((stream, _response))) => Ok(stream),
        }
    }

    /// Drive one connected session until failure or shutdown.
    ///
    /// `Ok(())` means shutdown was requested and the transport was closed
    /// cleanly; any error forces Backoff in the caller.
    async fn session(&mut self, stream: WsStream) -> Result<(), TransportError> {
        // Split the borrow so the select arms and their handlers can touch
        // disjoint parts of the manager.
        let Self {
            config,
            symbols,
            scheduler,
            metrics,
            record_tx,
            catalog_rx,
            shutdown,
        } = self;

        let (mut write, mut read) = stream.split();

        set_state(metrics, ConnState::Subscribing);
        scheduler.begin_full_pass(symbols);
        tracing::info!(
            symbols = symbols.len(),
            "Connected; starting full subscription pass"
        );

        let mut pace = tokio::time::interval(scheduler.pacing_delay());
        pace.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut ping_interval = tokio::time::interval(config.ping_interval());
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut pong_deadline: Option<tokio::time::Instant> = None;
        let mut last_inbound = Instant::now();
        let mut subscribing = true;
        let mut catalog_closed = false;

        loop {
            tokio::select! {
                msg = read.next() => {
                    last_inbound = Instant::now();
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            handle_text(scheduler, metrics, record_tx, &mut pong_deadline, &text);
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await
                                .map_err(|e| TransportError::Send(e.to_string()))?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            pong_deadline = None;
                        }
                        Some(Ok(Message::Close(_))) => {
                            return Err(TransportError::Closed);
                        }
                        Some(Err(e)) => {
                            return Err(TransportError::Read(e.to_string()));
                        }
                        None => {
                            return Err(TransportError::Read("stream ended".to_string()));
                        }
                        _ => {}
                    }
                }

                _ = pace.tick() => {
                    if let Some((_req_id, json)) = scheduler.next_ready(Instant::now()) {
                        write.send(Message::Text(json)).await
                            .map_err(|e| TransportError::Send(e.to_string()))?;
                    } else if subscribing && scheduler.all_submitted() {
                        subscribing = false;
                        set_state(metrics, ConnState::Live);
                        tracing::info!(symbols = symbols.len(), "Subscription pass complete");
                    }
                }

                _ = ping_interval.tick() => {
                    if last_inbound.elapsed() >= config.idle_timeout() {
                        return Err(TransportError::Idle(config.idle_timeout()));
                    }
                    let ping = format!(
                        r#"{{"op":"ping","req_id":"{}"}}"#,
                        chrono::Utc::now().timestamp_millis()
                    );
                    write.send(Message::Text(ping)).await
                        .map_err(|e| TransportError::Send(e.to_string()))?;
                    if pong_deadline.is_none() {
                        pong_deadline = Some(tokio::time::Instant::now() + config.pong_timeout());
                    }
                }

                _ = deadline_or_pending(pong_deadline) => {
                    return Err(TransportError::PongTimeout(config.pong_timeout()));
                }

                update = catalog_rx.recv(), if !catalog_closed => {
                    match update {
                        Some(update) => {
                            tracing::info!(
                                total = update.symbols.len(),
                                added = update.added.len(),
                                "Catalog refreshed"
                            );
                            *symbols = update.symbols;
                            scheduler.add_symbols(&update.added);
                        }
                        None => catalog_closed = true,
                    }
                }

                _ = shutdown.changed() => {
                    tracing::info!("Shutdown requested; closing transport");
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }
}

/// Classify and dispatch one text frame. Malformed frames are counted and
/// dropped; nothing here can take the session down.
fn handle_text(
    scheduler: &mut ChunkScheduler,
    metrics: &IngestMetrics,
    record_tx: &mpsc::Sender<TickerRecord>,
    pong_deadline: &mut Option<tokio::time::Instant>,
    text: &str,
) {
    match parse_frame(text) {
        Ok(Inbound::Record(record)) => {
            metrics.message_received();
            metrics.message_normalized();
            if let Err(mpsc::error::TrySendError::Full(_)) = record_tx.try_send(record) {
                // The writer applies its own backpressure; never block the
                // socket task on the store.
                metrics.dropped_backpressure();
            }
        }
        Ok(Inbound::Control(ControlReply::Pong)) => {
            *pong_deadline = None;
        }
        Ok(Inbound::Control(ControlReply::Subscribe {
            req_id,
            success,
            ret_msg,
        })) => {
            let req_id = req_id.unwrap_or_default();
            if let Err(e) =
                scheduler.handle_ack(&req_id, success, ret_msg.as_deref(), Instant::now())
            {
                metrics.subscription_failure();
                tracing::warn!(error = %e, "Subscription failure");
            }
        }
        Ok(Inbound::Control(ControlReply::Other(op))) => {
            tracing::debug!(op, "Ignoring control frame");
        }
        Err(e) => {
            metrics.message_received();
            metrics.dropped_invalid();
            tracing::debug!(error = %e, "Dropped malformed frame");
        }
    }
}

fn set_state(metrics: &IngestMetrics, state: ConnState) {
    tracing::debug!(%state, "Connection state change");
    metrics.set_state(state);
}

async fn deadline_or_pending(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SubscriptionConfig;

    fn test_parts() -> (
        ChunkScheduler,
        Arc<IngestMetrics>,
        mpsc::Sender<TickerRecord>,
        mpsc::Receiver<TickerRecord>,
    ) {
        let (record_tx, record_rx) = mpsc::channel(16);
        (
            ChunkScheduler::new(SubscriptionConfig::default()),
            Arc::new(IngestMetrics::new()),
            record_tx,
            record_rx,
        )
    }

    #[test]
    fn test_handle_text_record_reaches_channel() {
        let (mut scheduler, metrics, record_tx, mut record_rx) = test_parts();
        let mut pong = None;

        let frame = r#"{
            "topic": "tickers.BTC-27JUN25-60000-C",
            "type": "snapshot",
            "ts": 1718000000123,
            "data": {"symbol": "BTC-27JUN25-60000-C", "lastPrice": "100"}
        }"#;
        handle_text(&mut scheduler, &metrics, &record_tx, &mut pong, frame);

        let record = record_rx.try_recv().unwrap();
        assert_eq!(record.symbol, "BTC-27JUN25-60000-C");

        let snap = metrics.snapshot();
        assert_eq!(snap.messages_received, 1);
        assert_eq!(snap.messages_normalized, 1);
        assert_eq!(snap.dropped_invalid, 0);
    }

    #[test]
    fn test_handle_text_malformed_counted_and_dropped() {
        let (mut scheduler, metrics, record_tx, mut record_rx) = test_parts();
        let mut pong = None;

        handle_text(&mut scheduler, &metrics, &record_tx, &mut pong, "{garbage");
        // data frame with no timestamp
        handle_text(
            &mut scheduler,
            &metrics,
            &record_tx,
            &mut pong,
            r#"{"topic":"tickers.X","data":{}}"#,
        );

        assert!(record_rx.try_recv().is_err());
        let snap = metrics.snapshot();
        assert_eq!(snap.messages_received, 2);
        assert_eq!(snap.messages_normalized, 0);
        assert_eq!(snap.dropped_invalid, 2);
    }

    #[test]
    fn test_handle_text_pong_clears_deadline() {
        let (mut scheduler, metrics, record_tx, _record_rx) = test_parts();
        let mut pong = Some(tokio::time::Instant::now());

        handle_text(&mut scheduler, &metrics, &record_tx, &mut pong, r#"{"op":"pong"}"#);
        assert!(pong.is_none());
    }

    #[test]
    fn test_handle_text_backpressure_counts_drop() {
        let (mut scheduler, metrics, _tx, _rx) = test_parts();
        let (record_tx, mut record_rx) = mpsc::channel(1);
        let mut pong = None;

        let frame = r#"{
            "topic": "tickers.BTC-27JUN25-60000-C",
            "type": "snapshot",
            "ts": 1718000000123,
            "data": {"symbol": "BTC-27JUN25-60000-C"}
        }"#;
        handle_text(&mut scheduler, &metrics, &record_tx, &mut pong, frame); // fills
        handle_text(&mut scheduler, &metrics, &record_tx, &mut pong, frame); // dropped

        assert_eq!(metrics.snapshot().dropped_backpressure, 1);
        assert!(record_rx.try_recv().is_ok());
    }

    #[test]
    fn test_handle_text_subscription_rejection_counted() {
        let (mut scheduler, metrics, record_tx, _record_rx) = test_parts();
        let mut pong = None;

        scheduler.begin_full_pass(&["BTC-27JUN25-60000-C".to_string()]);
        let (req_id, _) = scheduler.next_ready(Instant::now()).unwrap();

        let reply = format!(
            r#"{{"success":false,"ret_msg":"args error","op":"subscribe","req_id":"{}"}}"#,
            req_id
        );
        handle_text(&mut scheduler, &metrics, &record_tx, &mut pong, &reply);

        assert_eq!(metrics.snapshot().subscription_failures, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown_before_connect() {
        let metrics = Arc::new(IngestMetrics::new());
        let (record_tx, _record_rx) = mpsc::channel(16);
        let (_catalog_tx, catalog_rx) = mpsc::channel::<CatalogUpdate>(4);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let manager = ConnectionManager::new(
            TransportConfig::default(),
            SubscriptionConfig::default(),
            vec!["BTC-27JUN25-60000-C".to_string()],
            Arc::clone(&metrics),
            record_tx,
            catalog_rx,
            shutdown_rx,
        );

        shutdown_tx.send(true).unwrap();
        // Must return promptly without attempting the network.
        tokio::time::timeout(std::time::Duration::from_secs(1), manager.run())
            .await
            .expect("run did not stop on shutdown");
        assert_eq!(metrics.snapshot().connection_state, ConnState::Disconnected);
    }
}
