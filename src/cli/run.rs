//! Run command implementation

use super::build_provider;
use crate::config::Config;
use crate::execution::PaperEngine;
use crate::strategy::MomentumStrategy;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Stop after this many seconds (default: until Ctrl-C)
    #[arg(long)]
    pub duration_secs: Option<u64>,

    /// Number of momentum strategies, each with its own paper account
    #[arg(long, default_value_t = 1)]
    pub strategies: usize,
}

impl RunArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let provider = build_provider(config)?;
        let momentum = config.strategy.momentum_config();

        let mut strategies = Vec::with_capacity(self.strategies);
        for i in 1..=self.strategies {
            let name = format!("momentum-{}", i);
            let engine = Arc::new(PaperEngine::with_fee_rate(
                name.clone(),
                config.paper.initial_balance,
                config.paper.fee_rate,
            ));
            let strategy = Arc::new(MomentumStrategy::new(name, momentum.clone(), engine));
            provider.subscribe_strategy(strategy.clone());
            strategies.push(strategy);
        }

        provider.start().await;
        tracing::info!(
            markets = provider.market_count(),
            strategies = strategies.len(),
            "Paper trading started"
        );

        let deadline = async {
            match self.duration_secs {
                Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                None => std::future::pending().await,
            }
        };
        let scheduler_exit = async {
            while provider.is_running() {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("Ctrl-C received, shutting down");
            }
            _ = deadline => tracing::info!("Run duration elapsed, shutting down"),
            _ = scheduler_exit => tracing::info!("Scheduler reached max runtime"),
        }

        provider.stop().await;

        for strategy in &strategies {
            let metrics = strategy.engine().metrics();
            tracing::info!(
                strategy = %metrics.strategy_name,
                trades = metrics.total_trades,
                open_positions = metrics.open_positions,
                equity = %metrics.equity,
                pnl = %metrics.total_pnl,
                pnl_pct = %metrics.pnl_percent.round_dp(2),
                "Strategy results"
            );
            println!("{}", serde_json::to_string(&metrics)?);
        }

        Ok(())
    }
}
