//! Level-based strategy on the `decide` path

use async_trait::async_trait;
use tracing::info;
use types::{Action, DecisionContext, Signal, SignalLevel};

use super::{expired, StrategyContext};
use crate::dispatcher::{Strategy, StrategyOutcome};
use crate::engine::unrealized_r;
use crate::error::Result;
use crate::position::EntryParams;

pub const LEVEL_STRATEGY: &str = "tv-level";

pub struct LevelStrategy {
    ctx: StrategyContext,
}

impl LevelStrategy {
    pub fn new(ctx: StrategyContext) -> Self {
        Self { ctx }
    }

    /// Risk distance of the initial entry, in percent of the entry price
    fn initial_risk_pct(signal: &Signal) -> f64 {
        if signal.sl_pct > 0.0 {
            signal.sl_pct
        } else {
            EntryParams::for_action(Action::Open).map_or(0.9, |p| p.sl_pct)
        }
    }
}

#[async_trait]
impl Strategy for LevelStrategy {
    fn name(&self) -> &str {
        LEVEL_STRATEGY
    }

    async fn execute(&self, signal: &Signal) -> Result<StrategyOutcome> {
        if let Some(outcome) = expired(signal) {
            return Ok(outcome);
        }

        let (position, _) = self.ctx.positions.state(signal).await?;
        let l2_meta = self
            .ctx
            .positions
            .get_position_by_level(&signal.symbol, SignalLevel::L2);

        let ctx = DecisionContext {
            has_l2_position: position.is_some() && l2_meta.is_some(),
            l2_entry: l2_meta.as_ref().map(|m| m.entry_price),
            l2_side: l2_meta.as_ref().map(|m| m.side),
            unrealized_r: position
                .as_ref()
                .map_or(0.0, |p| unrealized_r(p, Self::initial_risk_pct(signal))),
            trend_ok: self.ctx.trends.is_trend_ok(&signal.symbol, signal.side),
            strong_short_tf: self.ctx.trends.is_strong_short_tf(&signal.symbol),
        };

        let decision = self.ctx.signals.decide_and_save(signal, &ctx);

        info!(
            strategy = LEVEL_STRATEGY,
            symbol = %signal.symbol,
            level = %signal.level,
            side = %signal.side,
            "Decision {}",
            decision
        );

        let order_id = self
            .ctx
            .positions
            .apply_decision(&decision, signal, position.as_ref())
            .await?;
        Ok(StrategyOutcome::new(decision, order_id))
    }
}
