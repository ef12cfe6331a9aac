//! `should_execute` gate with L3 → L2 upgrade

use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use types::{Side, Signal, SignalLevel};

/// Same-side L3 signals needed before an upgrade is considered
const UPGRADE_BUFFER_LEN: usize = 2;

/// Outcome of [`SignalGate::should_execute`]
#[derive(Debug, Clone, PartialEq)]
pub struct GateVerdict {
    pub execute: bool,
    /// An opposite position must be closed before opening
    pub close_first: bool,
    /// The signal to act on; level 2 when an L3 run was upgraded
    pub signal: Signal,
    pub reason: &'static str,
}

impl GateVerdict {
    fn skip(signal: &Signal, reason: &'static str) -> Self {
        Self {
            execute: false,
            close_first: false,
            signal: signal.clone(),
            reason,
        }
    }
}

#[derive(Debug, Default)]
struct GateState {
    last_by_level: HashMap<SignalLevel, Signal>,
    l3_buffer: Vec<Signal>,
    /// Side of the last order actually placed
    executed_side: Option<Side>,
}

impl GateState {
    fn live_side(&self, level: SignalLevel, signal: &Signal) -> Option<Side> {
        self.last_by_level
            .get(&level)
            .filter(|s| !s.is_expired(signal.timestamp))
            .map(|s| s.side)
    }
}

/// Level gate used by the scalp and trend strategies. One lock covers the
/// stored signals and the upgrade buffer.
#[derive(Debug, Default)]
pub struct SignalGate {
    states: Mutex<HashMap<String, GateState>>,
}

impl SignalGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `signal` as the latest of its level; an L2 side flip clears
    /// the upgrade buffer
    pub fn save(&self, signal: &Signal) {
        let mut states = self.states.lock();
        let state = states.entry(signal.symbol.clone()).or_default();

        if let Some(stored) = state.last_by_level.get(&signal.level) {
            if stored.timestamp > signal.timestamp {
                return;
            }
            if signal.level == SignalLevel::L2 && stored.side != signal.side {
                state.l3_buffer.clear();
            }
        }
        state.last_by_level.insert(signal.level, signal.clone());
    }

    pub fn should_execute(&self, signal: &Signal) -> GateVerdict {
        let mut states = self.states.lock();
        let state = states.entry(signal.symbol.clone()).or_default();
        let verdict = evaluate(state, signal, 0);
        debug!(
            symbol = %signal.symbol,
            level = %signal.level,
            execute = verdict.execute,
            close_first = verdict.close_first,
            "Gate: {}",
            verdict.reason
        );
        verdict
    }

    /// Record that an order on `side` went through for `symbol`. Only
    /// marked sides count towards a later reversal.
    pub fn mark_executed(&self, symbol: &str, side: Side) {
        self.states
            .lock()
            .entry(symbol.to_string())
            .or_default()
            .executed_side = Some(side);
    }

    /// Buffered same-side L3 signals for `symbol`
    pub fn buffered(&self, symbol: &str) -> usize {
        self.states
            .lock()
            .get(symbol)
            .map_or(0, |s| s.l3_buffer.len())
    }
}

fn evaluate(state: &mut GateState, signal: &Signal, depth: u8) -> GateVerdict {
    if depth > 1 {
        warn!(symbol = %signal.symbol, "Signal upgrade re-entered more than once");
        return GateVerdict::skip(signal, "upgrade-depth-exceeded");
    }
    if signal.side == Side::Hold {
        return GateVerdict::skip(signal, "hold");
    }

    match signal.level {
        SignalLevel::L1 => GateVerdict::skip(signal, "L1-reference-only"),
        SignalLevel::L2 => {
            let close_first = state.executed_side.is_some_and(|s| s != signal.side);
            GateVerdict {
                execute: true,
                close_first,
                signal: signal.clone(),
                reason: if close_first { "L2-reverse" } else { "L2-execute" },
            }
        }
        SignalLevel::L3 => {
            if state
                .l3_buffer
                .last()
                .is_some_and(|prev| prev.side != signal.side)
            {
                state.l3_buffer.clear();
            }
            state.l3_buffer.push(signal.clone());

            let aligned = state.live_side(SignalLevel::L1, signal) == Some(signal.side)
                && state.live_side(SignalLevel::L2, signal) == Some(signal.side);
            if state.l3_buffer.len() < UPGRADE_BUFFER_LEN || !aligned {
                return GateVerdict::skip(signal, "L3-buffered");
            }

            state.l3_buffer.clear();
            let upgraded = signal.with_level(SignalLevel::L2);
            info!(
                symbol = %signal.symbol,
                side = %signal.side,
                "Upgrading L3 run to L2"
            );
            let mut verdict = evaluate(state, &upgraded, depth + 1);
            if verdict.execute {
                verdict.reason = "L3-upgraded-to-L2";
            }
            verdict
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn signal(level: SignalLevel, side: Side, minute: i64) -> Signal {
        let t0 = Utc.with_ymd_and_hms(2025, 8, 10, 0, 0, 0).unwrap();
        Signal::new(
            "scalp-15m",
            "ETH/USDT",
            side,
            level,
            dec!(3500),
            t0 + Duration::minutes(minute),
        )
    }

    fn submit(gate: &SignalGate, s: &Signal) -> GateVerdict {
        gate.save(s);
        gate.should_execute(s)
    }

    #[test]
    fn test_l2_executes_and_flags_reversal() {
        let gate = SignalGate::new();
        let v = submit(&gate, &signal(SignalLevel::L2, Side::Buy, 0));
        assert!(v.execute && !v.close_first);
        gate.mark_executed("ETH/USDT", Side::Buy);

        let v = submit(&gate, &signal(SignalLevel::L2, Side::Sell, 10));
        assert!(v.execute && v.close_first);
        assert_eq!(v.reason, "L2-reverse");
    }

    #[test]
    fn test_unexecuted_l2_does_not_arm_reversal() {
        let gate = SignalGate::new();
        let v = submit(&gate, &signal(SignalLevel::L2, Side::Buy, 0));
        assert!(v.execute);

        // No order went through for the buy
        let v = submit(&gate, &signal(SignalLevel::L2, Side::Sell, 10));
        assert!(v.execute && !v.close_first);
        assert_eq!(v.reason, "L2-execute");
    }

    #[test]
    fn test_l3_run_upgrades_when_context_agrees() {
        let gate = SignalGate::new();
        submit(&gate, &signal(SignalLevel::L1, Side::Buy, 0));
        submit(&gate, &signal(SignalLevel::L2, Side::Buy, 1));

        let v = submit(&gate, &signal(SignalLevel::L3, Side::Buy, 5));
        assert!(!v.execute);
        assert_eq!(gate.buffered("ETH/USDT"), 1);

        let v = submit(&gate, &signal(SignalLevel::L3, Side::Buy, 10));
        assert!(v.execute);
        assert_eq!(v.signal.level, SignalLevel::L2);
        assert_eq!(v.reason, "L3-upgraded-to-L2");
        assert_eq!(gate.buffered("ETH/USDT"), 0);
    }

    #[test]
    fn test_l3_run_waits_without_l1() {
        let gate = SignalGate::new();
        submit(&gate, &signal(SignalLevel::L2, Side::Sell, 0));
        submit(&gate, &signal(SignalLevel::L3, Side::Sell, 1));
        let v = submit(&gate, &signal(SignalLevel::L3, Side::Sell, 2));
        assert!(!v.execute);
        assert_eq!(gate.buffered("ETH/USDT"), 2);
    }

    #[test]
    fn test_side_flip_clears_buffer() {
        let gate = SignalGate::new();
        submit(&gate, &signal(SignalLevel::L3, Side::Buy, 1));
        submit(&gate, &signal(SignalLevel::L3, Side::Buy, 2));
        assert_eq!(gate.buffered("ETH/USDT"), 2);

        submit(&gate, &signal(SignalLevel::L3, Side::Sell, 3));
        assert_eq!(gate.buffered("ETH/USDT"), 1);

        submit(&gate, &signal(SignalLevel::L2, Side::Buy, 4));
        submit(&gate, &signal(SignalLevel::L2, Side::Sell, 5));
        assert_eq!(gate.buffered("ETH/USDT"), 0);
    }

    #[test]
    fn test_upgrade_depth_guard() {
        let mut state = GateState::default();
        let v = evaluate(&mut state, &signal(SignalLevel::L2, Side::Buy, 0), 2);
        assert!(!v.execute);
        assert_eq!(v.reason, "upgrade-depth-exceeded");
    }
}
