//! Execution engine module
//!
//! Order placement and position tracking. Strategies receive market updates
//! synchronously, so the engine interface is synchronous too.

mod paper;
mod types;

pub use paper::PaperEngine;
pub use types::{
    EngineMetrics, ExecutionError, Order, OrderId, OrderSide, OrderStatus, Position,
};

use rust_decimal::Decimal;

/// Trait for execution engine implementations
pub trait ExecutionEngine: Send + Sync {
    /// Place an order for `size` shares of `side` at `price`
    ///
    /// Orders the engine cannot afford come back `Cancelled`; malformed
    /// orders are an error.
    fn place_order(
        &self,
        market_id: &str,
        side: OrderSide,
        size: Decimal,
        price: Decimal,
    ) -> Result<Order, ExecutionError>;

    /// Cancel a pending order; false if unknown or no longer pending
    fn cancel_order(&self, order_id: OrderId) -> bool;

    fn get_position(&self, market_id: &str) -> Option<Position>;

    fn get_positions(&self) -> Vec<Position>;

    /// Close a position at its last mark; false if none is open
    fn close_position(&self, market_id: &str) -> bool;

    /// Mark a position to `price`, quoted in the position's own side
    fn update_position_price(&self, market_id: &str, price: Decimal);

    /// Free cash
    fn balance(&self) -> Decimal;
}
