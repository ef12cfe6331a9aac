//! Strategy composers over the signal manager, decision engine and
//! position service

pub mod copy;
pub mod engine_driven;
pub mod level;
pub mod timeframe;

pub use copy::{CopyTradeStrategy, COPY_STRATEGY};
pub use engine_driven::{EngineStrategy, ENGINE_STRATEGY};
pub use level::{LevelStrategy, LEVEL_STRATEGY};
pub use timeframe::{TimeframeStrategy, SCALP_STRATEGY, TREND_STRATEGY};

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use types::Signal;

use crate::dispatcher::{StrategyDispatcher, StrategyOutcome};
use crate::engine::DecisionEngine;
use crate::market::TrendManager;
use crate::position::PositionService;
use crate::signal::{SignalGate, SignalManager};

/// Shared components every strategy composes
#[derive(Clone)]
pub struct StrategyContext {
    pub signals: Arc<SignalManager>,
    pub gate: Arc<SignalGate>,
    pub trends: Arc<TrendManager>,
    pub positions: Arc<PositionService>,
    pub engine: Arc<DecisionEngine>,
}

impl StrategyContext {
    pub fn new(
        signals: Arc<SignalManager>,
        trends: Arc<TrendManager>,
        positions: Arc<PositionService>,
    ) -> Self {
        Self {
            signals,
            gate: Arc::new(SignalGate::new()),
            trends,
            positions,
            engine: Arc::new(DecisionEngine::new()),
        }
    }
}

/// Register the built-in strategies; the copy-trade strategy answers to
/// `copy_name`
pub fn register_all(dispatcher: &mut StrategyDispatcher, ctx: &StrategyContext, copy_name: &str) {
    dispatcher.register(Arc::new(LevelStrategy::new(ctx.clone())));
    dispatcher.register(Arc::new(TimeframeStrategy::scalp(ctx.clone())));
    dispatcher.register(Arc::new(TimeframeStrategy::trend(ctx.clone())));
    dispatcher.register(Arc::new(EngineStrategy::new(ctx.clone())));
    dispatcher.register(Arc::new(CopyTradeStrategy::with_name(ctx.clone(), copy_name)));
}

/// Outcome for a signal past its level lifetime
pub(crate) fn expired(signal: &Signal) -> Option<StrategyOutcome> {
    if signal.is_expired(Utc::now()) {
        info!(
            symbol = %signal.symbol,
            level = %signal.level,
            timestamp = %signal.timestamp,
            "Discarding expired signal"
        );
        return Some(StrategyOutcome::ignored("signal-expired"));
    }
    None
}
