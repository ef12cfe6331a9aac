//! Strategy driven by the stateless decision engine

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use types::{Signal, TrendState};

use super::{expired, StrategyContext};
use crate::dispatcher::{Strategy, StrategyOutcome};
use crate::error::Result;

pub const ENGINE_STRATEGY: &str = "engine";

pub struct EngineStrategy {
    ctx: StrategyContext,
}

impl EngineStrategy {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Strategy for EngineStrategy {
    fn name(&self) -> &str {
        ENGINE_STRATEGY
    }

    async fn execute(&self, signal: &Signal) -> Result<StrategyOutcome> {
        if let Some(outcome) = expired(signal) {
            return Ok(outcome);
        }

        let trend = self
            .ctx
            .trends
            .state(&signal.symbol)
            .unwrap_or_else(|| TrendState::unknown(&signal.symbol, Utc::now()));
        let (position, _) = self.ctx.positions.state(signal).await?;

        let verdict = self.ctx.engine.evaluate(signal, &trend, position.as_ref());
        info!(
            strategy = ENGINE_STRATEGY,
            symbol = %signal.symbol,
            direction = ?trend.direction,
            side = %verdict.side,
            "Decision {}",
            verdict.decision
        );

        // Ranging entries carry the side the engine picked
        let target = if verdict.side != signal.side {
            Signal {
                side: verdict.side,
                ..signal.clone()
            }
        } else {
            signal.clone()
        };

        let order_id = self
            .ctx
            .positions
            .apply_decision(&verdict.decision, &target, position.as_ref())
            .await?;
        Ok(StrategyOutcome::new(verdict.decision, order_id))
    }
}
