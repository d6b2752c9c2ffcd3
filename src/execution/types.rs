//! Execution types

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Order identifier
pub type OrderId = Uuid;

/// Outcome token an order buys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Yes,
    No,
}

impl OrderSide {
    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Yes => OrderSide::No,
            OrderSide::No => OrderSide::Yes,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Yes => write!(f, "YES"),
            OrderSide::No => write!(f, "NO"),
        }
    }
}

/// Order lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    Pending,
    Filled,
    Cancelled,
}

/// An order and its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub market_id: String,
    pub side: OrderSide,
    /// Number of shares
    pub size: Decimal,
    /// Price per share, in terms of `side`
    pub price: Decimal,
    pub status: OrderStatus,
    /// Fees charged on the fill
    pub fees: Decimal,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
}

/// An open position in one market
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub market_id: String,
    pub side: OrderSide,
    pub size: Decimal,
    /// Volume-weighted entry price
    pub entry_price: Decimal,
    /// Last mark, in terms of `side`
    pub current_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    /// PnL of the whole position at `price`
    pub fn pnl_at(&self, price: Decimal) -> Decimal {
        (price - self.entry_price) * self.size
    }
}

/// Snapshot of an engine's performance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub strategy_name: String,
    pub total_trades: usize,
    pub open_positions: usize,
    /// Percentage of closed round trips with positive realized PnL
    pub win_rate: Decimal,
    pub total_pnl: Decimal,
    pub pnl_percent: Decimal,
    pub balance: Decimal,
    pub equity: Decimal,
    pub initial_balance: Decimal,
}

/// Orders the engine refuses outright
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("order size must be positive, got {0}")]
    InvalidSize(Decimal),
    #[error("order price must be within (0, 1], got {0}")]
    InvalidPrice(Decimal),
}
