use crate::{
    DataAppetite, Signal, SignalAction, Strategy, StrategyId,
    indicators::SimpleMovingAverage,
};
use chrono::Utc;
use quantra_data::event::{DataKind, MarketEvent};
use quantra_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Extract the close price a strategy window is evaluated over.
pub(crate) fn close_of(event: &MarketEvent) -> Option<Decimal> {
    match &event.kind {
        DataKind::Ticker(ticker) => Some(ticker.last),
        DataKind::Trade(trade) => Some(trade.price),
        _ => None,
    }
}

/// Moving-average cross strategy.
///
/// Emits a buy when the fast SMA crosses above the slow SMA within the latest event,
/// and a sell on the opposite cross. Conviction scales with the divergence between
/// the averages at the moment of the cross.
#[derive(Debug)]
pub struct MaCrossStrategy {
    id: StrategyId,
    symbols: Vec<Symbol>,
    fast_period: usize,
    slow_period: usize,
}

impl MaCrossStrategy {
    pub fn new(symbols: Vec<Symbol>, fast_period: usize, slow_period: usize) -> Self {
        Self {
            id: StrategyId::new("ma_cross"),
            symbols,
            fast_period,
            slow_period,
        }
    }

    fn averages(&self, closes: &[Decimal]) -> (Decimal, Decimal) {
        let mut fast = SimpleMovingAverage::new(self.fast_period);
        let mut slow = SimpleMovingAverage::new(self.slow_period);
        for close in closes {
            fast.update(*close);
            slow.update(*close);
        }
        (fast.average(), slow.average())
    }
}

impl Strategy for MaCrossStrategy {
    fn id(&self) -> StrategyId {
        self.id.clone()
    }

    fn appetite(&self) -> DataAppetite {
        DataAppetite::tickers(self.symbols.clone(), self.slow_period * 2)
    }

    fn analyze(&mut self, symbol: &Symbol, window: &[MarketEvent]) -> Option<Signal> {
        let closes: Vec<Decimal> = window.iter().filter_map(close_of).collect();
        if closes.len() <= self.slow_period {
            return None;
        }

        let (fast_prev, slow_prev) = self.averages(&closes[..closes.len() - 1]);
        let (fast_now, slow_now) = self.averages(&closes);

        let crossed_up = fast_prev <= slow_prev && fast_now > slow_now;
        let crossed_down = fast_prev >= slow_prev && fast_now < slow_now;
        if !crossed_up && !crossed_down {
            return None;
        }

        let price = *closes.last().expect("closes checked non-empty");
        let divergence = if slow_now.is_zero() {
            Decimal::ZERO
        } else {
            ((fast_now - slow_now) / slow_now).abs()
        };
        let strength = (dec!(0.6) + divergence * dec!(10)).min(Decimal::ONE);

        let mut metadata = HashMap::new();
        metadata.insert(
            "fast_ma".to_string(),
            serde_json::Value::String(fast_now.to_string()),
        );
        metadata.insert(
            "slow_ma".to_string(),
            serde_json::Value::String(slow_now.to_string()),
        );

        Some(Signal {
            symbol: symbol.clone(),
            action: if crossed_up {
                SignalAction::Buy
            } else {
                SignalAction::Sell
            },
            strength,
            price,
            time: window.last().map(|event| event.time_exchange).unwrap_or_else(Utc::now),
            strategy: self.id.clone(),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use quantra_data::event::Ticker;
    use quantra_instrument::exchange::ExchangeId;
    use rust_decimal_macros::dec;

    fn ticker_event(symbol: &Symbol, price: Decimal) -> MarketEvent {
        MarketEvent::new(
            Utc::now(),
            Utc::now(),
            ExchangeId::Binance,
            symbol.clone(),
            DataKind::Ticker(Ticker::new(price, price, price, dec!(1), dec!(1))),
        )
    }

    #[test]
    fn test_insufficient_data_produces_no_signal() {
        let symbol: Symbol = "BTC/USDT".parse().unwrap();
        let mut strategy = MaCrossStrategy::new(vec![symbol.clone()], 2, 5);
        let window: Vec<MarketEvent> =
            (0..3).map(|i| ticker_event(&symbol, Decimal::from(100 + i))).collect();
        assert!(strategy.analyze(&symbol, &window).is_none());
    }

    #[test]
    fn test_cross_up_emits_buy() {
        let symbol: Symbol = "BTC/USDT".parse().unwrap();
        let mut strategy = MaCrossStrategy::new(vec![symbol.clone()], 2, 4);

        // Downtrend establishing fast < slow, then a sharp rally crossing up.
        let prices = [100, 98, 96, 94, 92, 90, 120];
        let window: Vec<MarketEvent> = prices
            .iter()
            .map(|price| ticker_event(&symbol, Decimal::from(*price)))
            .collect();

        let signal = strategy.analyze(&symbol, &window).expect("cross expected");
        assert_eq!(signal.action, SignalAction::Buy);
        assert!(signal.strength >= dec!(0.6));
        assert!(signal.strength <= Decimal::ONE);
    }

    #[test]
    fn test_cross_down_emits_sell() {
        let symbol: Symbol = "BTC/USDT".parse().unwrap();
        let mut strategy = MaCrossStrategy::new(vec![symbol.clone()], 2, 4);

        let prices = [100, 102, 104, 106, 108, 110, 80];
        let window: Vec<MarketEvent> = prices
            .iter()
            .map(|price| ticker_event(&symbol, Decimal::from(*price)))
            .collect();

        let signal = strategy.analyze(&symbol, &window).expect("cross expected");
        assert_eq!(signal.action, SignalAction::Sell);
    }
}
