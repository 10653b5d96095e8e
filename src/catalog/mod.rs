//! Instrument catalog
//!
//! Resolves the tradable option symbols for the configured base assets
//! from the exchange's instruments-info endpoint, and refreshes the set
//! once a day at a fixed time of day (the exchange lists new expiries on a
//! daily cycle, so a fixed interval would drift against it). A failed
//! refresh keeps the previous set in effect; ingestion never stops over a
//! catalog problem.

use crate::config::CatalogConfig;
use crate::error::CatalogError;
use crate::metrics::IngestMetrics;
use crate::ws::CatalogUpdate;
use chrono::{DateTime, NaiveTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Client for the instruments-info endpoint
pub struct Catalog {
    config: CatalogConfig,
    refresh_at: NaiveTime,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg", default)]
    ret_msg: String,
    result: Option<InstrumentsResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstrumentsResult {
    #[serde(default)]
    next_page_cursor: Option<String>,
    #[serde(default)]
    list: Vec<Instrument>,
}

#[derive(Debug, Deserialize)]
struct Instrument {
    symbol: String,
    status: Option<String>,
}

impl Catalog {
    /// Create a catalog client. Fails only on invalid configuration; that
    /// is a startup error and is allowed to be fatal.
    pub fn new(config: CatalogConfig) -> anyhow::Result<Self> {
        let refresh_at = parse_refresh_at(&config.refresh_at).ok_or_else(|| {
            anyhow::anyhow!("invalid catalog.refresh_at {:?}, expected HH:MM", config.refresh_at)
        })?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            config,
            refresh_at,
            client,
        })
    }

    /// Fetch the full current symbol set, retrying each attempt with a
    /// linearly increasing delay.
    pub async fn fetch_symbols(&self) -> Result<Vec<String>, CatalogError> {
        let mut last_error = String::new();

        for attempt in 1..=self.config.retry_attempts {
            match self.fetch_once().await {
                Ok(symbols) => return Ok(symbols),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Catalog fetch attempt failed");
                    last_error = e.to_string();
                    if attempt < self.config.retry_attempts {
                        let delay =
                            Duration::from_millis(self.config.retry_delay_ms) * attempt;
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Err(CatalogError::RetriesExhausted {
            attempts: self.config.retry_attempts,
            last: last_error,
        })
    }

    async fn fetch_once(&self) -> Result<Vec<String>, CatalogError> {
        let mut all_symbols = Vec::new();

        for asset in &self.config.assets {
            let symbols = self.fetch_asset(asset).await?;
            tracing::debug!(asset = %asset, count = symbols.len(), "Fetched option symbols");
            all_symbols.extend(symbols);
        }

        if all_symbols.is_empty() {
            return Err(CatalogError::Parse("no tradable symbols returned".to_string()));
        }

        Ok(all_symbols)
    }

    /// Page through one asset's instrument listing
    async fn fetch_asset(&self, asset: &str) -> Result<Vec<String>, CatalogError> {
        let mut symbols = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query: Vec<(&str, String)> = vec![
                ("category", "option".to_string()),
                ("baseCoin", asset.to_string()),
                ("limit", "1000".to_string()),
            ];
            if let Some(ref c) = cursor {
                query.push(("cursor", c.clone()));
            }

            let response = self
                .client
                .get(&self.config.base_url)
                .query(&query)
                .send()
                .await?
                .error_for_status()?;

            let body: ApiResponse = response.json().await?;
            if body.ret_code != 0 {
                return Err(CatalogError::Api {
                    code: body.ret_code,
                    message: body.ret_msg,
                });
            }

            let result = body
                .result
                .ok_or_else(|| CatalogError::Parse("result".to_string()))?;

            symbols.extend(tradable_symbols(result.list));

            match result.next_page_cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        Ok(symbols)
    }

    /// Next daily refresh instant strictly after `now`
    pub fn next_refresh_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        next_occurrence(self.refresh_at, now)
    }
}

/// Keep only instruments the exchange reports as tradable
fn tradable_symbols(list: Vec<Instrument>) -> Vec<String> {
    list.into_iter()
        .filter(|i| i.status.as_deref() == Some("Trading"))
        .map(|i| i.symbol)
        .collect()
}

/// Parse a "HH:MM" time-of-day string
pub fn parse_refresh_at(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

fn next_occurrence(at: NaiveTime, now: DateTime<Utc>) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        (now.date_naive() + chrono::Days::new(1)).and_time(at).and_utc()
    }
}

/// Compute the symbols present in `current` but not in `previous`
fn added_symbols(previous: &[String], current: &[String]) -> Vec<String> {
    let known: HashSet<&String> = previous.iter().collect();
    current
        .iter()
        .filter(|s| !known.contains(s))
        .cloned()
        .collect()
}

/// Daily refresh task.
///
/// Sleeps until the configured time of day, refetches the catalog, and
/// notifies the connection manager with the full set plus the freshly
/// listed symbols. Delisted symbols are not torn down here; they drop out
/// at the next full re-subscription pass and their store entries passively
/// expire.
pub async fn refresh_loop(
    catalog: Catalog,
    mut current: Vec<String>,
    update_tx: mpsc::Sender<CatalogUpdate>,
    metrics: Arc<IngestMetrics>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next_at = catalog.next_refresh_after(Utc::now());
        let wait = (next_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::from_secs(0));
        tracing::info!(next_refresh = %next_at, "Next catalog refresh scheduled");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            _ = shutdown.changed() => {
                tracing::info!("Catalog refresher stopped");
                return;
            }
        }

        match catalog.fetch_symbols().await {
            Ok(symbols) => {
                let added = added_symbols(&current, &symbols);
                let removed = {
                    let listed: HashSet<&String> = symbols.iter().collect();
                    current.iter().filter(|s| !listed.contains(s)).count()
                };
                tracing::info!(
                    total = symbols.len(),
                    added = added.len(),
                    removed,
                    "Catalog refresh complete"
                );
                current = symbols.clone();
                if update_tx
                    .send(CatalogUpdate { symbols, added })
                    .await
                    .is_err()
                {
                    // Connection manager gone; nothing left to feed.
                    return;
                }
            }
            Err(e) => {
                // Previous set stays in effect.
                metrics.catalog_error();
                tracing::warn!(error = %e, "Catalog refresh failed; keeping previous symbol set");
            }
        }
    }
}
