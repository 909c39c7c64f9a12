use chrono::{DateTime, TimeDelta, Utc};
use quantra_instrument::{Side, symbol::Symbol};
use quantra_integration::channel::{Tx, UnboundedTx};
use quantra_strategy::{SignalAction, combiner::TradeIntent};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::{info, warn};

/// Stop supervision parameters.
#[derive(Debug, Clone)]
pub struct StopConfig {
    /// Trailing distance as a fraction of the high-water price. `None` keeps the
    /// initial stop fixed.
    pub trailing_pct: Option<Decimal>,
    /// Close an unprofitable position after this long in the trade.
    pub time_stop: Option<TimeDelta>,
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            trailing_pct: None,
            time_stop: Some(TimeDelta::hours(48)),
        }
    }
}

#[derive(Debug, Clone)]
struct StopState {
    side: Side,
    entry_price: Decimal,
    entry_time: DateTime<Utc>,
    stop_price: Option<Decimal>,
    take_profit: Option<Decimal>,
    /// Most favourable price seen since entry; the trailing stop ratchets off it.
    high_water: Decimal,
}

/// The reason a stop fired, carried in the close intent for log correlation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StopTrigger {
    StopLoss,
    Trailing,
    TakeProfit,
    TimeStop,
}

/// Supervises armed stop-loss/take-profit triggers against the live ticker stream.
///
/// The supervisor is a market-data consumer like any other: when a trigger crosses it
/// emits a `Close` [`TradeIntent`] into the engine's intent channel rather than
/// touching the portfolio or execution state directly.
#[derive(Debug)]
pub struct StopLossSupervisor {
    config: StopConfig,
    stops: HashMap<Symbol, StopState>,
    intent_tx: UnboundedTx<TradeIntent>,
}

impl StopLossSupervisor {
    pub fn new(config: StopConfig, intent_tx: UnboundedTx<TradeIntent>) -> Self {
        Self {
            config,
            stops: HashMap::new(),
            intent_tx,
        }
    }

    /// Arm supervision for a freshly opened position.
    pub fn arm(
        &mut self,
        symbol: Symbol,
        side: Side,
        entry_price: Decimal,
        stop_price: Option<Decimal>,
        take_profit: Option<Decimal>,
        entry_time: DateTime<Utc>,
    ) {
        info!(%symbol, %side, %entry_price, ?stop_price, ?take_profit, "armed stop supervision");
        self.stops.insert(
            symbol,
            StopState {
                side,
                entry_price,
                entry_time,
                stop_price,
                take_profit,
                high_water: entry_price,
            },
        );
    }

    /// Disarm supervision (position closed or cancelled).
    pub fn disarm(&mut self, symbol: &Symbol) {
        self.stops.remove(symbol);
    }

    pub fn is_armed(&self, symbol: &Symbol) -> bool {
        self.stops.contains_key(symbol)
    }

    /// Feed the latest price; emits at most one close intent per armed symbol.
    pub fn on_price(&mut self, symbol: &Symbol, price: Decimal, now: DateTime<Utc>) {
        let Some(state) = self.stops.get_mut(symbol) else {
            return;
        };

        // Ratchet the trailing stop in the favourable direction only.
        if let Some(trailing_pct) = self.config.trailing_pct {
            match state.side {
                Side::Buy if price > state.high_water => {
                    state.high_water = price;
                    let candidate = price * (Decimal::ONE - trailing_pct);
                    if state.stop_price.is_none_or(|stop| candidate > stop) {
                        state.stop_price = Some(candidate);
                    }
                }
                Side::Sell if price < state.high_water => {
                    state.high_water = price;
                    let candidate = price * (Decimal::ONE + trailing_pct);
                    if state.stop_price.is_none_or(|stop| candidate < stop) {
                        state.stop_price = Some(candidate);
                    }
                }
                _ => {}
            }
        }

        let trigger = self.check(symbol, price, now);
        if let Some(trigger) = trigger {
            let state = self.stops.remove(symbol).expect("state present above");
            warn!(%symbol, ?trigger, %price, entry = %state.entry_price, "stop trigger crossed - emitting close intent");
            let intent = TradeIntent {
                symbol: symbol.clone(),
                action: SignalAction::Close,
                strength: Decimal::ONE,
                quantity: Decimal::ZERO,
                target_price: Some(price),
                stop_loss: None,
                take_profit: None,
                originating_signals: Vec::new(),
            };
            if self.intent_tx.send(intent).is_err() {
                warn!(%symbol, "intent channel closed - stop close dropped");
            }
        }
    }

    fn check(&self, symbol: &Symbol, price: Decimal, now: DateTime<Utc>) -> Option<StopTrigger> {
        let state = self.stops.get(symbol)?;
        let stop_hit = state.stop_price.is_some_and(|stop| match state.side {
            Side::Buy => price <= stop,
            Side::Sell => price >= stop,
        });
        if stop_hit {
            return Some(if self.config.trailing_pct.is_some() {
                StopTrigger::Trailing
            } else {
                StopTrigger::StopLoss
            });
        }

        let take_profit_hit = state.take_profit.is_some_and(|target| match state.side {
            Side::Buy => price >= target,
            Side::Sell => price <= target,
        });
        if take_profit_hit {
            return Some(StopTrigger::TakeProfit);
        }

        if let Some(time_stop) = self.config.time_stop {
            let unprofitable = match state.side {
                Side::Buy => price < state.entry_price,
                Side::Sell => price > state.entry_price,
            };
            if unprofitable && now - state.entry_time >= time_stop {
                return Some(StopTrigger::TimeStop);
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantra_integration::channel::{UnboundedRx, mpsc_unbounded};
    use rust_decimal_macros::dec;

    fn supervisor(config: StopConfig) -> (StopLossSupervisor, UnboundedRx<TradeIntent>) {
        let (tx, rx) = mpsc_unbounded();
        (StopLossSupervisor::new(config, tx), rx)
    }

    fn symbol() -> Symbol {
        "BTC/USDT".parse().unwrap()
    }

    #[test]
    fn test_fixed_stop_triggers_close() {
        let (mut supervisor, mut rx) = supervisor(StopConfig {
            trailing_pct: None,
            time_stop: None,
        });
        supervisor.arm(
            symbol(),
            Side::Buy,
            dec!(100),
            Some(dec!(98)),
            None,
            Utc::now(),
        );

        supervisor.on_price(&symbol(), dec!(99), Utc::now());
        assert!(rx.rx.try_recv().is_err());

        supervisor.on_price(&symbol(), dec!(97.5), Utc::now());
        let intent = rx.rx.try_recv().unwrap();
        assert_eq!(intent.action, SignalAction::Close);
        assert!(!supervisor.is_armed(&symbol()));
    }

    #[test]
    fn test_take_profit_triggers_close() {
        let (mut supervisor, mut rx) = supervisor(StopConfig {
            trailing_pct: None,
            time_stop: None,
        });
        supervisor.arm(
            symbol(),
            Side::Buy,
            dec!(100),
            Some(dec!(98)),
            Some(dec!(104)),
            Utc::now(),
        );
        supervisor.on_price(&symbol(), dec!(104.5), Utc::now());
        assert!(rx.rx.try_recv().is_ok());
    }

    #[test]
    fn test_trailing_stop_ratchets_favourably_only() {
        let (mut supervisor, mut rx) = supervisor(StopConfig {
            trailing_pct: Some(dec!(0.01)),
            time_stop: None,
        });
        supervisor.arm(symbol(), Side::Buy, dec!(100), Some(dec!(98)), None, Utc::now());

        // Rally: stop ratchets up under the new high-water mark.
        supervisor.on_price(&symbol(), dec!(110), Utc::now());
        assert!(rx.rx.try_recv().is_err());
        let stop_after_rally = supervisor.stops.get(&symbol()).unwrap().stop_price;
        assert_eq!(stop_after_rally, Some(dec!(108.90)));

        // Pullback above the stop: no ratchet down, no trigger.
        supervisor.on_price(&symbol(), dec!(109.5), Utc::now());
        assert_eq!(
            supervisor.stops.get(&symbol()).unwrap().stop_price,
            stop_after_rally
        );

        // Drop through the trailed stop fires the close.
        supervisor.on_price(&symbol(), dec!(108), Utc::now());
        assert!(rx.rx.try_recv().is_ok());
    }

    #[test]
    fn test_short_side_trailing_direction() {
        let (mut supervisor, mut rx) = supervisor(StopConfig {
            trailing_pct: Some(dec!(0.01)),
            time_stop: None,
        });
        supervisor.arm(symbol(), Side::Sell, dec!(100), Some(dec!(102)), None, Utc::now());

        supervisor.on_price(&symbol(), dec!(90), Utc::now());
        assert_eq!(
            supervisor.stops.get(&symbol()).unwrap().stop_price,
            Some(dec!(90.90))
        );

        supervisor.on_price(&symbol(), dec!(91), Utc::now());
        assert!(rx.rx.try_recv().is_ok());
    }

    #[test]
    fn test_time_stop_closes_unprofitable_positions() {
        let (mut supervisor, mut rx) = supervisor(StopConfig {
            trailing_pct: None,
            time_stop: Some(TimeDelta::hours(48)),
        });
        let entry = Utc::now() - TimeDelta::hours(49);
        supervisor.arm(symbol(), Side::Buy, dec!(100), None, None, entry);

        // Profitable: the time stop leaves it alone.
        supervisor.on_price(&symbol(), dec!(101), Utc::now());
        assert!(rx.rx.try_recv().is_err());

        supervisor.on_price(&symbol(), dec!(99), Utc::now());
        assert!(rx.rx.try_recv().is_ok());
    }
}
