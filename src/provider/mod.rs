//! Market data provider
//!
//! Owns the live market set and wires the scheduler to two refresh jobs:
//! - slow tick: diff the active market universe against the previous cycle,
//!   admitting new parseable markets and evicting vanished ones
//! - fast tick: quote a round-robin batch of live markets, feed the candle
//!   aggregator and notify subscribers
//!
//! Constructed once and shared by `Arc`; there is no global instance.

mod prices;
mod universe;

pub use universe::UniverseReport;

use crate::candles::{CandleAggregator, DEFAULT_MAX_HISTORY, DEFAULT_TIMEFRAMES};
use crate::market::{LiveMarket, MarketParser, MarketSource, TokenMapper};
use crate::pricing::PriceSource;
use crate::scheduler::{RoundRobin, Scheduler, SchedulerConfig};
use crate::strategy::Strategy;
use crate::telemetry::{self, GaugeMetric};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Callback invoked with every freshly priced market
pub type Subscriber = Arc<dyn Fn(&LiveMarket) -> anyhow::Result<()> + Send + Sync>;

/// Provider tuning
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub scheduler: SchedulerConfig,
    /// Upper bound on records per universe fetch
    pub max_markets: usize,
    pub page_size: usize,
    /// Candle timeframes in minutes
    pub candle_timeframes: Vec<u32>,
    pub max_candle_history: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            max_markets: 1000,
            page_size: 100,
            candle_timeframes: DEFAULT_TIMEFRAMES.to_vec(),
            max_candle_history: DEFAULT_MAX_HISTORY,
        }
    }
}

/// State shared between the provider handle and the scheduler jobs
struct ProviderState {
    source: Arc<dyn MarketSource>,
    prices: Arc<dyn PriceSource>,
    tokens: TokenMapper,
    parser: MarketParser,
    candles: CandleAggregator,
    batcher: Arc<RoundRobin>,
    max_markets: usize,
    page_size: usize,
    markets: RwLock<HashMap<String, LiveMarket>>,
    /// Ids seen in the last universe fetch, admitted or not
    known_ids: Mutex<HashSet<String>>,
    subscribers: RwLock<Vec<Subscriber>>,
}

/// Shared market data provider
pub struct MarketDataProvider {
    state: Arc<ProviderState>,
    scheduler: Scheduler,
}

impl MarketDataProvider {
    pub fn new(
        source: Arc<dyn MarketSource>,
        prices: Arc<dyn PriceSource>,
        config: ProviderConfig,
    ) -> Self {
        let batcher = Arc::new(RoundRobin::new(config.scheduler.max_markets_per_tick));
        let state = Arc::new(ProviderState {
            source,
            prices,
            tokens: TokenMapper::new(),
            parser: MarketParser::new(),
            candles: CandleAggregator::with_max_history(
                config.candle_timeframes,
                config.max_candle_history,
            ),
            batcher: batcher.clone(),
            max_markets: config.max_markets,
            page_size: config.page_size,
            markets: RwLock::new(HashMap::new()),
            known_ids: Mutex::new(HashSet::new()),
            subscribers: RwLock::new(Vec::new()),
        });

        let scheduler = Scheduler::with_batcher(config.scheduler, batcher);

        let slow_state = state.clone();
        scheduler.add_slow_callback(move || {
            let state = slow_state.clone();
            async move { state.refresh_universe().await.map(|_| ()) }
        });

        let fast_state = state.clone();
        scheduler.add_fast_callback(move |batch| {
            let state = fast_state.clone();
            async move {
                state.refresh_prices(&batch).await;
                Ok(())
            }
        });

        Self { state, scheduler }
    }

    /// Run one universe refresh, then start the tick loops
    ///
    /// A failed initial refresh is logged; the slow tick retries it.
    pub async fn start(&self) {
        tracing::info!("Starting market data provider");
        if let Err(err) = self.state.refresh_universe().await {
            tracing::error!(error = %format!("{:#}", err), "Initial universe refresh failed");
        }
        self.scheduler.start();
    }

    /// Stop the tick loops; safe to call repeatedly
    pub async fn stop(&self) {
        tracing::info!("Stopping market data provider");
        self.scheduler.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Slow-tick job, callable directly
    pub async fn refresh_universe(&self) -> anyhow::Result<UniverseReport> {
        self.state.refresh_universe().await
    }

    /// Fast-tick job for an explicit batch; returns the number of markets updated
    pub async fn refresh_prices(&self, batch: &[String]) -> usize {
        self.state.refresh_prices(batch).await
    }

    /// Live markets ordered by id
    pub fn markets(&self) -> Vec<LiveMarket> {
        let mut markets: Vec<LiveMarket> = self.state.markets.read().values().cloned().collect();
        markets.sort_by(|a, b| a.market_id().cmp(b.market_id()));
        markets
    }

    pub fn market(&self, market_id: &str) -> Option<LiveMarket> {
        self.state.markets.read().get(market_id).cloned()
    }

    pub fn market_count(&self) -> usize {
        self.state.markets.read().len()
    }

    pub fn candles(&self) -> &CandleAggregator {
        &self.state.candles
    }

    pub fn tokens(&self) -> &TokenMapper {
        &self.state.tokens
    }

    pub fn parser(&self) -> &MarketParser {
        &self.state.parser
    }

    /// Price source, e.g. to clear a stale marker
    pub fn price_source(&self) -> &Arc<dyn PriceSource> {
        &self.state.prices
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Register a callback for market updates; returns the subscriber count
    pub fn subscribe<F>(&self, callback: F) -> usize
    where
        F: Fn(&LiveMarket) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let count = {
            let mut subscribers = self.state.subscribers.write();
            subscribers.push(Arc::new(callback));
            subscribers.len()
        };
        telemetry::set_gauge(GaugeMetric::Subscribers, count as f64);
        tracing::info!(total = count, "Subscriber added");
        count
    }

    /// Feed market updates to a strategy
    pub fn subscribe_strategy<S>(&self, strategy: Arc<S>) -> usize
    where
        S: Strategy + 'static,
    {
        tracing::info!(strategy = strategy.name(), "Subscribing strategy");
        self.subscribe(move |market| strategy.on_market_data(market))
    }
}
