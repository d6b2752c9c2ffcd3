//! CLI interface for polybot
//!
//! Provides subcommands for:
//! - `run`: Start the provider with paper-trading strategies
//! - `markets`: One-shot market discovery
//! - `config`: Show the effective configuration

mod markets;
mod run;

pub use markets::MarketsArgs;
pub use run::RunArgs;

use crate::config::Config;
use crate::market::{GammaClient, MarketSource, MergedSource};
use crate::pricing::ClobClient;
use crate::provider::{MarketDataProvider, ProviderConfig};
use clap::{Parser, Subcommand};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "polybot")]
#[command(about = "Market data and paper trading for Polymarket crypto up/down markets")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: String,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the provider and paper-trading strategies
    Run(RunArgs),
    /// Fetch and parse the current market universe once
    Markets(MarketsArgs),
    /// Show the effective configuration
    Config,
}

/// Market source for the configured listing endpoints
pub fn build_market_source(config: &Config) -> anyhow::Result<Arc<dyn MarketSource>> {
    let retry = config.retry.policy();
    let primary = GammaClient::new(config.gamma.client_config(&config.gamma.base_url), retry)?;

    let Some(fallback_url) = &config.gamma.fallback_url else {
        return Ok(Arc::new(primary));
    };

    let fallback = GammaClient::new(config.gamma.client_config(fallback_url), retry)?;
    tracing::info!(fallback = %fallback_url, "Using fallback market listing");
    Ok(Arc::new(
        MergedSource::new(Arc::new(primary)).with_fallback(Arc::new(fallback)),
    ))
}

/// Provider wired to the configured HTTP sources
pub fn build_provider(config: &Config) -> anyhow::Result<MarketDataProvider> {
    let source = build_market_source(config)?;
    let prices = Arc::new(ClobClient::new(
        config.clob.client_config(),
        config.retry.policy(),
    )?);

    let provider_config = ProviderConfig {
        scheduler: config.scheduler.scheduler_config(),
        max_markets: config.gamma.max_markets,
        page_size: config.gamma.page_size,
        candle_timeframes: config.candles.timeframes.clone(),
        max_candle_history: config.candles.max_history,
    };

    Ok(MarketDataProvider::new(source, prices, provider_config))
}
