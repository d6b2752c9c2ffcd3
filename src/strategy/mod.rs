//! Trading strategies driven by live market updates

mod momentum;

pub use momentum::{MomentumConfig, MomentumStrategy};

use crate::market::LiveMarket;

/// A strategy reacting to price updates
///
/// Called from the fast tick, once per updated market, in subscription
/// order. Errors are logged by the caller and never stop the feed.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn on_market_data(&self, market: &LiveMarket) -> anyhow::Result<()>;
}
