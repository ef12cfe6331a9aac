//! Mirrors a tracked wallet's fills onto our account

use async_trait::async_trait;
use tracing::info;
use types::{Action, Decision, PositionSide, Signal};

use super::{expired, StrategyContext};
use crate::dispatcher::{Strategy, StrategyOutcome};
use crate::engine::copy_trade_action;
use crate::error::{Result, StrategyError};

pub const COPY_STRATEGY: &str = "hype-copy";

/// Meta key carrying the tracked wallet's position side (`long`/`short`),
/// absent when the wallet holds nothing
pub const WALLET_SIDE_KEY: &str = "wallet_side";

pub struct CopyTradeStrategy {
    name: String,
    ctx: StrategyContext,
}

impl CopyTradeStrategy {
    pub fn new(ctx: StrategyContext) -> Self {
        Self::with_name(ctx, COPY_STRATEGY)
    }

    pub fn with_name(ctx: StrategyContext, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ctx,
        }
    }

    fn wallet_side(signal: &Signal) -> Result<Option<PositionSide>> {
        match signal.meta.get(WALLET_SIDE_KEY).and_then(|v| v.as_str()) {
            None => Ok(None),
            Some(side) => side
                .parse()
                .map(Some)
                .map_err(|_| StrategyError::invalid_signal(format!("bad wallet side {side:?}"))),
        }
    }
}

#[async_trait]
impl Strategy for CopyTradeStrategy {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, signal: &Signal) -> Result<StrategyOutcome> {
        if let Some(outcome) = expired(signal) {
            return Ok(outcome);
        }

        let wallet = Self::wallet_side(signal)?;
        let (position, _) = self.ctx.positions.state(signal).await?;
        let action = copy_trade_action(wallet, position.as_ref(), signal.side);

        // Entries follow the wallet's direction; adds follow ours
        let side = match (action, wallet, position.as_ref()) {
            (Action::Open, Some(w), _) => w.opening_side(),
            (_, _, Some(held)) => held.direction.opening_side(),
            _ => signal.side,
        };
        let target = Signal {
            side,
            ..signal.clone()
        };

        let decision = Decision::new(action, format!("copy-{}", signal.side));
        info!(
            strategy = %self.name,
            symbol = %signal.symbol,
            wallet = ?wallet,
            held = ?position.as_ref().map(|p| p.direction),
            "Decision {}",
            decision
        );

        let order_id = self
            .ctx
            .positions
            .apply_decision(&decision, &target, position.as_ref())
            .await?;
        Ok(StrategyOutcome::new(decision, order_id))
    }
}
