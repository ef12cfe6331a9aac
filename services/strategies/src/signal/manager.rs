use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};
use trader_config::StrategyConfig;
use types::{Action, Decision, DecisionContext, Side, Signal, SignalLevel};

/// Per-symbol arbitration state
#[derive(Debug, Clone, Default)]
pub struct SymbolSignals {
    pub last_by_level: HashMap<SignalLevel, Signal>,
    pub l2_side: Option<Side>,
    pub l2_last_flip_at: Option<DateTime<Utc>>,
}

impl SymbolSignals {
    /// Stored signal of `level` that is still alive at `now`
    fn live(&self, level: SignalLevel, now: DateTime<Utc>) -> Option<&Signal> {
        self.last_by_level
            .get(&level)
            .filter(|s| !s.is_expired(now))
    }
}

/// Latest signal per `(symbol, level)` plus the `decide` policy
pub struct SignalManager {
    config: StrategyConfig,
    states: RwLock<HashMap<String, SymbolSignals>>,
}

impl SignalManager {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    /// Record `signal` as the latest of its level. A signal older than the
    /// stored one is refused and `false` is returned.
    pub fn save(&self, signal: &Signal) -> bool {
        let mut states = self.states.write();
        record(states.entry(signal.symbol.clone()).or_default(), signal)
    }

    /// [`decide`](Self::decide) then [`save`](Self::save) under one write
    /// lock, so concurrent signals of a symbol are arbitrated one at a time
    pub fn decide_and_save(&self, signal: &Signal, ctx: &DecisionContext) -> Decision {
        let mut states = self.states.write();
        let state = states.entry(signal.symbol.clone()).or_default();
        let decision = self.decide_against(Some(&*state), signal, ctx);
        record(state, signal);
        decision
    }

    pub fn get_last_signal(&self, symbol: &str, level: SignalLevel) -> Option<Signal> {
        self.states
            .read()
            .get(symbol)?
            .last_by_level
            .get(&level)
            .cloned()
    }

    /// Snapshot of a symbol's state
    pub fn symbol_state(&self, symbol: &str) -> Option<SymbolSignals> {
        self.states.read().get(symbol).cloned()
    }

    /// Arbitrate `signal` against the stored signals of its symbol.
    ///
    /// Call before [`save`](Self::save): debounce and flip checks compare
    /// against the previous signal of each level.
    pub fn decide(&self, signal: &Signal, ctx: &DecisionContext) -> Decision {
        let states = self.states.read();
        self.decide_against(states.get(&signal.symbol), signal, ctx)
    }

    fn decide_against(
        &self,
        state: Option<&SymbolSignals>,
        signal: &Signal,
        ctx: &DecisionContext,
    ) -> Decision {
        let now = signal.timestamp;
        let (last_l1, last_l2, last_l3, l2_side) = match state {
            Some(state) => (
                state.live(SignalLevel::L1, now),
                state.live(SignalLevel::L2, now),
                state.live(SignalLevel::L3, now),
                state.l2_side,
            ),
            None => (None, None, None, None),
        };

        let decision = match signal.level {
            SignalLevel::L1 => Decision::ignore("L1-reference-only"),
            SignalLevel::L2 => self.decide_l2(signal, ctx, last_l1, last_l2),
            SignalLevel::L3 => self.decide_l3(
                signal,
                ctx,
                last_l1,
                last_l2,
                last_l3,
                l2_side.or(ctx.l2_side),
            ),
        };

        if self.config.enable_debug_log {
            debug!(
                symbol = %signal.symbol,
                level = %signal.level,
                side = %signal.side,
                ?ctx,
                "Decision {}",
                decision
            );
        }
        decision
    }

    fn decide_l2(
        &self,
        signal: &Signal,
        ctx: &DecisionContext,
        last_l1: Option<&Signal>,
        last_l2: Option<&Signal>,
    ) -> Decision {
        if signal.side == Side::Hold {
            return Decision::ignore("L2-hold");
        }

        if let Some(prev) = last_l2 {
            if prev.side == signal.side
                && signal.timestamp - prev.timestamp < self.config.min_spacing_l2()
            {
                return Decision::ignore("L2-debounce");
            }
        }

        if !ctx.has_l2_position {
            if self.config.require_l1_confirm_for_l2_open {
                let confirmed = last_l1.is_some_and(|l1| {
                    l1.side == signal.side
                        && signal.timestamp - l1.timestamp <= self.config.l1_confirm_max_delay()
                });
                return if confirmed {
                    Decision::new(Action::Open, "L2-open-with-L1-confirm")
                } else {
                    Decision::ignore("L2-open-wait-L1-confirm")
                };
            }
            if self.config.require_trend_filter && !ctx.trend_ok {
                return Decision::ignore("L2-open-blocked-by-trend");
            }
            return Decision::new(Action::Open, "L2-open");
        }

        // The held side comes from the last L2 on record, or from the
        // position itself when it was opened out-of-band
        let held = last_l2.map(|s| s.side).or(ctx.l2_side);
        match held {
            Some(side) if side != signal.side => Decision::new(Action::Close, "L2-flip-close"),
            _ => Decision::ignore("L2-same-keep"),
        }
    }

    fn decide_l3(
        &self,
        signal: &Signal,
        ctx: &DecisionContext,
        last_l1: Option<&Signal>,
        last_l2: Option<&Signal>,
        last_l3: Option<&Signal>,
        l2_side: Option<Side>,
    ) -> Decision {
        if !ctx.has_l2_position || last_l2.is_none() {
            return Decision::ignore("L3-no-L2");
        }
        if signal.side == Side::Hold {
            return Decision::ignore("L3-hold");
        }

        let spacing = self.config.min_spacing_l3();
        if let Some(prev) = last_l3 {
            if prev.side == signal.side && signal.timestamp - prev.timestamp < spacing {
                return Decision::ignore("L3-debounce");
            }
        }

        if l2_side == Some(signal.side) {
            if self.config.require_trend_filter && !ctx.strong_short_tf {
                return Decision::new(Action::TightenSL, "L3-add-trend-weak");
            }
            let recent_opposite_l1 = last_l1.is_some_and(|l1| {
                l1.side == signal.side.opposite() && signal.timestamp - l1.timestamp < spacing * 2
            });
            if recent_opposite_l1 {
                return Decision::new(Action::TightenSL, "L3-add-blocked-by-recent-L1-opposite");
            }
            return Decision::new(Action::Add, "L3-add-with-L2");
        }

        if ctx.unrealized_r >= self.config.l3_reduce_at_r_multiple {
            Decision::reduce(self.config.l3_reduce_percent, "L3-counter-reduce")
        } else {
            Decision::new(Action::TightenSL, "L3-counter-tightenSL")
        }
    }
}

fn record(state: &mut SymbolSignals, signal: &Signal) -> bool {
    if let Some(stored) = state.last_by_level.get(&signal.level) {
        if stored.timestamp > signal.timestamp {
            debug!(
                symbol = %signal.symbol,
                level = %signal.level,
                "Refusing out-of-order signal"
            );
            return false;
        }
    }

    if signal.level == SignalLevel::L2
        && signal.side != Side::Hold
        && state.l2_side != Some(signal.side)
    {
        if state.l2_side.is_some() {
            info!(symbol = %signal.symbol, side = %signal.side, "L2 direction flipped");
        }
        state.l2_side = Some(signal.side);
        state.l2_last_flip_at = Some(signal.timestamp);
    }

    state.last_by_level.insert(signal.level, signal.clone());
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 8, 10, 12, 0, 0).unwrap() + Duration::seconds(secs)
    }

    fn signal(level: SignalLevel, side: Side, at: i64) -> Signal {
        Signal::new("tv-level", "BTC/USDT", side, level, dec!(100000), t(at))
    }

    fn manager() -> SignalManager {
        SignalManager::new(StrategyConfig {
            min_spacing_l2: 30,
            min_spacing_l3: 60,
            ..Default::default()
        })
    }

    fn held(side: Side) -> DecisionContext {
        DecisionContext {
            has_l2_position: true,
            l2_side: Some(side),
            ..Default::default()
        }
    }

    #[test]
    fn test_l1_is_reference_only() {
        let m = manager();
        let d = m.decide(&signal(SignalLevel::L1, Side::Buy, 0), &held(Side::Buy));
        assert_eq!(d, Decision::ignore("L1-reference-only"));
    }

    #[test]
    fn test_save_refuses_older_signal() {
        let m = manager();
        assert!(m.save(&signal(SignalLevel::L2, Side::Buy, 100)));
        assert!(!m.save(&signal(SignalLevel::L2, Side::Sell, 50)));
        let last = m.get_last_signal("BTC/USDT", SignalLevel::L2).unwrap();
        assert_eq!(last.timestamp, t(100));
        assert_eq!(last.side, Side::Buy);
    }

    #[test]
    fn test_l2_flip_tracking() {
        let m = manager();
        m.save(&signal(SignalLevel::L2, Side::Buy, 0));
        m.save(&signal(SignalLevel::L2, Side::Buy, 100));
        let state = m.symbol_state("BTC/USDT").unwrap();
        assert_eq!(state.l2_side, Some(Side::Buy));
        assert_eq!(state.l2_last_flip_at, Some(t(0)));

        m.save(&signal(SignalLevel::L2, Side::Sell, 200));
        let state = m.symbol_state("BTC/USDT").unwrap();
        assert_eq!(state.l2_side, Some(Side::Sell));
        assert_eq!(state.l2_last_flip_at, Some(t(200)));
    }

    #[test]
    fn test_l2_debounce_then_spacing_passes() {
        let m = manager();
        let flat = DecisionContext::default();
        m.save(&signal(SignalLevel::L2, Side::Buy, 0));

        let d = m.decide(&signal(SignalLevel::L2, Side::Buy, 10), &flat);
        assert_eq!(d.reason, "L2-debounce");

        let d = m.decide(&signal(SignalLevel::L2, Side::Buy, 31), &flat);
        assert_eq!(d, Decision::new(Action::Open, "L2-open"));

        // Opposite side is never debounced
        let d = m.decide(&signal(SignalLevel::L2, Side::Sell, 10), &flat);
        assert_eq!(d.action, Action::Open);
    }

    #[test]
    fn test_l2_open_requires_l1_confirm() {
        let m = SignalManager::new(StrategyConfig {
            require_l1_confirm_for_l2_open: true,
            l1_confirm_max_delay: 3600,
            ..Default::default()
        });
        let flat = DecisionContext::default();

        let d = m.decide(&signal(SignalLevel::L2, Side::Buy, 0), &flat);
        assert_eq!(d.reason, "L2-open-wait-L1-confirm");

        m.save(&signal(SignalLevel::L1, Side::Sell, 0));
        let d = m.decide(&signal(SignalLevel::L2, Side::Buy, 60), &flat);
        assert_eq!(d.reason, "L2-open-wait-L1-confirm");

        m.save(&signal(SignalLevel::L1, Side::Buy, 100));
        let d = m.decide(&signal(SignalLevel::L2, Side::Buy, 200), &flat);
        assert_eq!(d, Decision::new(Action::Open, "L2-open-with-L1-confirm"));

        // Confirmation older than the allowed delay
        let d = m.decide(&signal(SignalLevel::L2, Side::Buy, 100 + 3601), &flat);
        assert_eq!(d.reason, "L2-open-wait-L1-confirm");
    }

    #[test]
    fn test_l2_trend_filter() {
        let m = SignalManager::new(StrategyConfig {
            require_trend_filter: true,
            ..Default::default()
        });
        let mut ctx = DecisionContext::default();
        let d = m.decide(&signal(SignalLevel::L2, Side::Buy, 0), &ctx);
        assert_eq!(d, Decision::ignore("L2-open-blocked-by-trend"));

        ctx.trend_ok = true;
        let d = m.decide(&signal(SignalLevel::L2, Side::Buy, 0), &ctx);
        assert_eq!(d.action, Action::Open);
    }

    #[test]
    fn test_l2_with_position_closes_on_flip_only() {
        let m = manager();
        m.save(&signal(SignalLevel::L2, Side::Buy, 0));

        let d = m.decide(&signal(SignalLevel::L2, Side::Sell, 300), &held(Side::Buy));
        assert_eq!(d, Decision::new(Action::Close, "L2-flip-close"));

        let d = m.decide(&signal(SignalLevel::L2, Side::Buy, 300), &held(Side::Buy));
        assert_eq!(d, Decision::ignore("L2-same-keep"));
    }

    #[test]
    fn test_l2_flip_against_out_of_band_position() {
        let m = manager();
        let d = m.decide(&signal(SignalLevel::L2, Side::Sell, 0), &held(Side::Buy));
        assert_eq!(d.action, Action::Close);
    }

    #[test]
    fn test_expired_l2_is_not_used() {
        let m = manager();
        m.save(&signal(SignalLevel::L2, Side::Buy, 0));
        // L2 lifetime is three hours
        let d = m.decide(&signal(SignalLevel::L3, Side::Buy, 3 * 3600 + 1), &held(Side::Buy));
        assert_eq!(d.reason, "L3-no-L2");
    }

    #[test]
    fn test_l3_needs_l2() {
        let m = manager();
        let d = m.decide(&signal(SignalLevel::L3, Side::Buy, 0), &DecisionContext::default());
        assert_eq!(d, Decision::ignore("L3-no-L2"));

        let d = m.decide(&signal(SignalLevel::L3, Side::Buy, 0), &held(Side::Buy));
        assert_eq!(d.reason, "L3-no-L2");
    }

    #[test]
    fn test_l3_with_trend_paths() {
        let m = manager();
        m.save(&signal(SignalLevel::L2, Side::Buy, 0));

        let d = m.decide(&signal(SignalLevel::L3, Side::Buy, 100), &held(Side::Buy));
        assert_eq!(d, Decision::new(Action::Add, "L3-add-with-L2"));

        m.save(&signal(SignalLevel::L3, Side::Buy, 100));
        let d = m.decide(&signal(SignalLevel::L3, Side::Buy, 130), &held(Side::Buy));
        assert_eq!(d.reason, "L3-debounce");

        m.save(&signal(SignalLevel::L1, Side::Sell, 150));
        let d = m.decide(&signal(SignalLevel::L3, Side::Buy, 200), &held(Side::Buy));
        assert_eq!(
            d,
            Decision::new(Action::TightenSL, "L3-add-blocked-by-recent-L1-opposite")
        );
        let d = m.decide(&signal(SignalLevel::L3, Side::Buy, 271), &held(Side::Buy));
        assert_eq!(d.action, Action::Add);
    }

    #[test]
    fn test_l3_weak_short_tf_tightens() {
        let m = SignalManager::new(StrategyConfig {
            require_trend_filter: true,
            ..Default::default()
        });
        m.save(&signal(SignalLevel::L2, Side::Buy, 0));
        let d = m.decide(&signal(SignalLevel::L3, Side::Buy, 600), &held(Side::Buy));
        assert_eq!(d, Decision::new(Action::TightenSL, "L3-add-trend-weak"));

        let mut ctx = held(Side::Buy);
        ctx.strong_short_tf = true;
        let d = m.decide(&signal(SignalLevel::L3, Side::Buy, 600), &ctx);
        assert_eq!(d.action, Action::Add);
    }

    #[test]
    fn test_l3_counter_reduce_or_tighten() {
        let m = manager();
        m.save(&signal(SignalLevel::L2, Side::Buy, 0));

        let mut ctx = held(Side::Buy);
        ctx.unrealized_r = 0.4;
        let d = m.decide(&signal(SignalLevel::L3, Side::Sell, 100), &ctx);
        assert_eq!(d, Decision::new(Action::TightenSL, "L3-counter-tightenSL"));

        ctx.unrealized_r = 1.2;
        let d = m.decide(&signal(SignalLevel::L3, Side::Sell, 100), &ctx);
        assert_eq!(d.action, Action::Reduce);
        assert_eq!(d.reduce_percent, Some(0.3));
    }

    #[test]
    fn test_decide_and_save_records_the_signal() {
        let m = manager();
        let flat = DecisionContext::default();
        let d = m.decide_and_save(&signal(SignalLevel::L2, Side::Buy, 0), &flat);
        assert_eq!(d, Decision::new(Action::Open, "L2-open"));
        assert_eq!(m.get_last_signal("BTC/USDT", SignalLevel::L2).unwrap().timestamp, t(0));

        let d = m.decide_and_save(&signal(SignalLevel::L2, Side::Buy, 5), &flat);
        assert_eq!(d.reason, "L2-debounce");
    }

    #[test]
    fn test_concurrent_same_side_l2_opens_once() {
        let m = manager();
        let flat = DecisionContext::default();
        let (m, flat) = (&m, &flat);
        let opens = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(move || {
                        m.decide_and_save(&signal(SignalLevel::L2, Side::Buy, 0), flat)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|d| d.action == Action::Open)
                .count()
        });
        assert_eq!(opens, 1);
    }
}
