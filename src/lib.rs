//! optrack: Options ticker ingestion core for Bybit
//!
//! This library provides the core components for:
//! - Instrument catalog resolution with daily refresh
//! - Chunked, paced, retried topic subscription
//! - WebSocket connection management with heartbeat and backoff
//! - Ticker frame normalization into typed records
//! - Batched writes to a TTL-keyed Redis store
//! - Ingestion metrics and health tracking

pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod store;
pub mod subscription;
pub mod telemetry;
pub mod writer;
pub mod ws;
