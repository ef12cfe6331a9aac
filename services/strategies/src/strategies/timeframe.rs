//! Scalp (15m) and trend (1h) strategies on the `should_execute` gate

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::info;
use types::{Action, Decision, Signal};

use super::{expired, StrategyContext};
use crate::dispatcher::{Strategy, StrategyOutcome};
use crate::error::Result;

pub const SCALP_STRATEGY: &str = "scalp-15m";
pub const TREND_STRATEGY: &str = "trend-1h";

pub struct TimeframeStrategy {
    name: &'static str,
    ctx: StrategyContext,
    default_tp_pct: f64,
    default_sl_pct: f64,
    /// Minimum gap between two orders of the same symbol, side and trade type
    cooldown: Duration,
}

impl TimeframeStrategy {
    pub fn scalp(ctx: StrategyContext) -> Self {
        Self {
            name: SCALP_STRATEGY,
            ctx,
            default_tp_pct: 0.78,
            default_sl_pct: 0.5,
            cooldown: Duration::minutes(15),
        }
    }

    pub fn trend(ctx: StrategyContext) -> Self {
        Self {
            name: TREND_STRATEGY,
            ctx,
            default_tp_pct: 2.0,
            default_sl_pct: 1.0,
            cooldown: Duration::minutes(60),
        }
    }

    fn tp_sl(&self, signal: &Signal) -> (f64, f64) {
        let tp = if signal.tp_pct > 0.0 {
            signal.tp_pct
        } else {
            self.default_tp_pct
        };
        let sl = if signal.sl_pct > 0.0 {
            signal.sl_pct
        } else {
            self.default_sl_pct
        };
        (tp, sl)
    }
}

#[async_trait]
impl Strategy for TimeframeStrategy {
    fn name(&self) -> &str {
        self.name
    }

    async fn execute(&self, signal: &Signal) -> Result<StrategyOutcome> {
        if let Some(outcome) = expired(signal) {
            return Ok(outcome);
        }

        self.ctx.gate.save(signal);
        let verdict = self.ctx.gate.should_execute(signal);
        if !verdict.execute {
            info!(strategy = self.name, symbol = %signal.symbol, "Skipped: {}", verdict.reason);
            return Ok(StrategyOutcome::ignored(verdict.reason));
        }
        let target = verdict.signal;

        let since = Utc::now() - self.cooldown;
        let recent = self
            .ctx
            .positions
            .store()
            .recent_order(self.name, &target.symbol, target.side, target.trade_type, since)
            .await?;
        if let Some(order) = recent {
            info!(
                strategy = self.name,
                symbol = %target.symbol,
                last_order = %order.order_id,
                "Skipped: order cooldown"
            );
            return Ok(StrategyOutcome::ignored("order-cooldown"));
        }

        if verdict.close_first {
            let closed = self
                .ctx
                .positions
                .close_all(&target.symbol, target.trade_type)
                .await?;
            info!(
                strategy = self.name,
                symbol = %target.symbol,
                closed = closed.len(),
                "Closed opposite position before reversing"
            );
        }

        let (tp, sl) = self.tp_sl(&target);
        let order_id = self.ctx.positions.open(&target, tp, sl, 0.0).await?;
        self.ctx.gate.mark_executed(&target.symbol, target.side);
        Ok(StrategyOutcome::new(
            Decision::new(Action::Open, verdict.reason),
            Some(order_id),
        ))
    }
}
