//! polybot: market data pipeline for Polymarket crypto up/down markets
//!
//! This library provides the core components for:
//! - Market discovery via the Gamma API with title parsing and validation
//! - Live YES/NO pricing from the CLOB API with stale-market tracking
//! - Dual-rate polling with round-robin batching
//! - OHLC candle aggregation from price ticks
//! - Paper execution and momentum strategies
//! - Structured logging and Prometheus metrics

pub mod candles;
pub mod cli;
pub mod config;
pub mod execution;
pub mod market;
pub mod pricing;
pub mod provider;
pub mod retry;
pub mod scheduler;
pub mod strategy;
pub mod telemetry;
