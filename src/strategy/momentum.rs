//! Probability momentum strategy
//!
//! Buys YES when the implied probability rises by more than `min_change`
//! and sits above `threshold`; buys NO when it falls by more than
//! `min_change` and sits below `1 - threshold`.

use super::Strategy;
use crate::execution::{ExecutionEngine, OrderSide, OrderStatus};
use crate::market::LiveMarket;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::sync::Arc;

/// Configuration for the momentum strategy
#[derive(Debug, Clone)]
pub struct MomentumConfig {
    /// Probability level a rising market must exceed (default: 0.55)
    pub threshold: Decimal,
    /// Minimum tick-to-tick probability change (default: 0.02)
    pub min_change: Decimal,
    /// Shares per order (default: 10)
    pub order_size: Decimal,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            threshold: dec!(0.55),
            min_change: dec!(0.02),
            order_size: dec!(10),
        }
    }
}

/// Momentum strategy trading through an execution engine
pub struct MomentumStrategy<E: ExecutionEngine> {
    name: String,
    config: MomentumConfig,
    engine: Arc<E>,
    last_probability: Mutex<HashMap<String, Decimal>>,
}

impl<E: ExecutionEngine> MomentumStrategy<E> {
    pub fn new(name: impl Into<String>, config: MomentumConfig, engine: Arc<E>) -> Self {
        Self {
            name: name.into(),
            config,
            engine,
            last_probability: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    /// Signal for a probability move, if any
    fn signal(&self, previous: Decimal, current: Decimal) -> Option<OrderSide> {
        let change = current - previous;
        if change > self.config.min_change && current > self.config.threshold {
            Some(OrderSide::Yes)
        } else if change < -self.config.min_change && current < Decimal::ONE - self.config.threshold
        {
            Some(OrderSide::No)
        } else {
            None
        }
    }
}

impl<E: ExecutionEngine> Strategy for MomentumStrategy<E> {
    fn name(&self) -> &str {
        &self.name
    }

    fn on_market_data(&self, market: &LiveMarket) -> anyhow::Result<()> {
        let Some(probability) = market.implied_probability.filter(|p| !p.is_zero()) else {
            return Ok(());
        };
        let market_id = market.market_id();

        let position = self.engine.get_position(market_id);
        if let Some(position) = &position {
            let mark = match position.side {
                OrderSide::Yes => market.yes_price,
                OrderSide::No => market.no_price,
            };
            if let Some(mark) = mark {
                self.engine.update_position_price(market_id, mark);
            }
        }

        let previous = self
            .last_probability
            .lock()
            .insert(market_id.to_string(), probability);
        let Some(previous) = previous else {
            return Ok(());
        };

        let Some(side) = self.signal(previous, probability) else {
            return Ok(());
        };
        if position.is_some_and(|p| p.side == side) {
            return Ok(());
        }

        let price = match side {
            OrderSide::Yes => probability,
            OrderSide::No => Decimal::ONE - probability,
        };

        tracing::info!(
            strategy = %self.name,
            market_id,
            asset = %market.descriptor.asset,
            timeframe = %market.descriptor.timeframe,
            %side,
            probability = %probability,
            change = %(probability - previous),
            "Momentum signal"
        );

        let order = self
            .engine
            .place_order(market_id, side, self.config.order_size, price)?;
        if order.status != OrderStatus::Filled {
            tracing::debug!(strategy = %self.name, market_id, status = ?order.status, "Order not filled");
        }
        Ok(())
    }
}
