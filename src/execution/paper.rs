//! Paper trading execution engine
//!
//! Orders fill instantly at their limit price. Buying the side opposite an
//! open position closes it: a NO bought at `p` exits a YES position at
//! `1 - p` and vice versa. Any size beyond the position opens a new one on
//! the order's side.

use super::{
    EngineMetrics, ExecutionEngine, ExecutionError, Order, OrderId, OrderSide, OrderStatus,
    Position,
};
use chrono::Utc;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;

#[derive(Debug)]
struct Book {
    balance: Decimal,
    positions: HashMap<String, Position>,
    orders: HashMap<OrderId, Order>,
    fills: Vec<Order>,
    /// Realized PnL per closed (or partially closed) position
    realized: Vec<Decimal>,
}

/// Paper trading execution engine with simulated fills
pub struct PaperEngine {
    name: String,
    initial_balance: Decimal,
    fee_rate: Decimal,
    book: Mutex<Book>,
}

impl PaperEngine {
    /// Create a fee-free engine
    pub fn new(name: impl Into<String>, initial_balance: Decimal) -> Self {
        Self::with_fee_rate(name, initial_balance, Decimal::ZERO)
    }

    /// Create an engine charging `fee_rate` of notional on every fill
    pub fn with_fee_rate(name: impl Into<String>, initial_balance: Decimal, fee_rate: Decimal) -> Self {
        let name = name.into();
        tracing::info!(strategy = %name, %initial_balance, %fee_rate, "Paper engine initialized");
        Self {
            name,
            initial_balance,
            fee_rate,
            book: Mutex::new(Book {
                balance: initial_balance,
                positions: HashMap::new(),
                orders: HashMap::new(),
                fills: Vec::new(),
                realized: Vec::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_balance(&self) -> Decimal {
        self.initial_balance
    }

    /// Cash plus the marked value of open positions
    pub fn equity(&self) -> Decimal {
        equity_of(&self.book.lock())
    }

    /// Equity change since start
    pub fn total_pnl(&self) -> Decimal {
        self.equity() - self.initial_balance
    }

    /// Filled orders in fill order
    pub fn trades(&self) -> Vec<Order> {
        self.book.lock().fills.clone()
    }

    pub fn metrics(&self) -> EngineMetrics {
        let book = self.book.lock();
        let equity = equity_of(&book);
        let total_pnl = equity - self.initial_balance;
        let pnl_percent = if self.initial_balance > Decimal::ZERO {
            total_pnl / self.initial_balance * Decimal::ONE_HUNDRED
        } else {
            Decimal::ZERO
        };

        let wins = book.realized.iter().filter(|pnl| **pnl > Decimal::ZERO).count();
        let win_rate = if book.realized.is_empty() {
            Decimal::ZERO
        } else {
            Decimal::from(wins) / Decimal::from(book.realized.len()) * Decimal::ONE_HUNDRED
        };

        EngineMetrics {
            strategy_name: self.name.clone(),
            total_trades: book.fills.len(),
            open_positions: book.positions.len(),
            win_rate,
            total_pnl,
            pnl_percent,
            balance: book.balance,
            equity,
            initial_balance: self.initial_balance,
        }
    }

    fn fee(&self, notional: Decimal) -> Decimal {
        notional * self.fee_rate
    }
}

fn equity_of(book: &Book) -> Decimal {
    let marked: Decimal = book
        .positions
        .values()
        .map(|p| p.size * p.current_price)
        .sum();
    book.balance + marked
}

fn validate_order(size: Decimal, price: Decimal) -> Result<(), ExecutionError> {
    if size <= Decimal::ZERO {
        return Err(ExecutionError::InvalidSize(size));
    }
    if price <= Decimal::ZERO || price > Decimal::ONE {
        return Err(ExecutionError::InvalidPrice(price));
    }
    Ok(())
}

impl ExecutionEngine for PaperEngine {
    fn place_order(
        &self,
        market_id: &str,
        side: OrderSide,
        size: Decimal,
        price: Decimal,
    ) -> Result<Order, ExecutionError> {
        validate_order(size, price)?;

        let now = Utc::now();
        let fees = self.fee(size * price);
        let mut order = Order {
            order_id: OrderId::new_v4(),
            market_id: market_id.to_string(),
            side,
            size,
            price,
            status: OrderStatus::Pending,
            fees,
            created_at: now,
            filled_at: None,
        };

        let mut book = self.book.lock();

        // Portion of the order that closes an opposite position
        let (close_qty, exit_price) = match book.positions.get(market_id) {
            Some(position) if position.side != side => {
                (size.min(position.size), Decimal::ONE - price)
            }
            _ => (Decimal::ZERO, Decimal::ZERO),
        };
        let open_qty = size - close_qty;
        let proceeds = close_qty * exit_price;
        let cost = open_qty * price;

        if cost + fees > book.balance + proceeds {
            tracing::warn!(
                strategy = %self.name,
                market_id,
                need = %(cost + fees),
                have = %(book.balance + proceeds),
                "Insufficient balance, order cancelled"
            );
            order.status = OrderStatus::Cancelled;
            book.orders.insert(order.order_id, order.clone());
            return Ok(order);
        }

        if close_qty > Decimal::ZERO {
            if let Some(position) = book.positions.get_mut(market_id) {
                let realized = (exit_price - position.entry_price) * close_qty;
                position.size -= close_qty;
                let closed = position.size.is_zero();
                if !closed {
                    position.unrealized_pnl = position.pnl_at(position.current_price);
                }
                book.realized.push(realized);
                if closed {
                    book.positions.remove(market_id);
                }
                tracing::info!(
                    strategy = %self.name,
                    market_id,
                    closed_size = %close_qty,
                    %exit_price,
                    pnl = %realized,
                    "Position reduced"
                );
            }
        }

        if open_qty > Decimal::ZERO {
            match book.positions.get_mut(market_id) {
                Some(position) => {
                    let total_cost = position.size * position.entry_price + cost;
                    position.size += open_qty;
                    position.entry_price = total_cost / position.size;
                    position.unrealized_pnl = position.pnl_at(position.current_price);
                }
                None => {
                    book.positions.insert(
                        market_id.to_string(),
                        Position {
                            market_id: market_id.to_string(),
                            side,
                            size: open_qty,
                            entry_price: price,
                            current_price: price,
                            unrealized_pnl: Decimal::ZERO,
                            opened_at: now,
                        },
                    );
                }
            }
        }

        book.balance += proceeds - cost - fees;
        order.status = OrderStatus::Filled;
        order.filled_at = Some(now);
        book.orders.insert(order.order_id, order.clone());
        book.fills.push(order.clone());

        tracing::debug!(
            strategy = %self.name,
            market_id,
            %side,
            %size,
            %price,
            balance = %book.balance,
            "Paper order filled"
        );

        Ok(order)
    }

    fn cancel_order(&self, order_id: OrderId) -> bool {
        let mut book = self.book.lock();
        match book.orders.get_mut(&order_id) {
            Some(order) if order.status == OrderStatus::Pending => {
                order.status = OrderStatus::Cancelled;
                tracing::info!(?order_id, "Paper order cancelled");
                true
            }
            _ => false,
        }
    }

    fn get_position(&self, market_id: &str) -> Option<Position> {
        self.book.lock().positions.get(market_id).cloned()
    }

    fn get_positions(&self) -> Vec<Position> {
        self.book.lock().positions.values().cloned().collect()
    }

    fn close_position(&self, market_id: &str) -> bool {
        let mut book = self.book.lock();
        let Some(position) = book.positions.remove(market_id) else {
            return false;
        };

        let exit_price = position.current_price;
        let notional = position.size * exit_price;
        let realized = position.pnl_at(exit_price);
        book.balance += notional - self.fee(notional);
        book.realized.push(realized);

        tracing::info!(
            strategy = %self.name,
            market_id,
            pnl = %realized,
            balance = %book.balance,
            "Position closed"
        );
        true
    }

    fn update_position_price(&self, market_id: &str, price: Decimal) {
        let mut book = self.book.lock();
        if let Some(position) = book.positions.get_mut(market_id) {
            position.current_price = price;
            position.unrealized_pnl = position.pnl_at(price);
        }
    }

    fn balance(&self) -> Decimal {
        self.book.lock().balance
    }
}
