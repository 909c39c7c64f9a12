use crate::{
    DataAppetite, Signal, SignalAction, Strategy, StrategyId,
    indicators::RelativeStrengthIndex, ma_cross::close_of,
};
use chrono::Utc;
use quantra_data::event::MarketEvent;
use quantra_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Relative Strength Index strategy.
///
/// Buys when the RSI drops under the oversold band, sells when it breaks over the
/// overbought band. Conviction scales with how deep into the band the RSI sits.
#[derive(Debug)]
pub struct RsiStrategy {
    id: StrategyId,
    symbols: Vec<Symbol>,
    period: usize,
    oversold: Decimal,
    overbought: Decimal,
}

impl RsiStrategy {
    pub fn new(symbols: Vec<Symbol>, period: usize) -> Self {
        Self {
            id: StrategyId::new("rsi"),
            symbols,
            period,
            oversold: dec!(30),
            overbought: dec!(70),
        }
    }

    pub fn with_bands(mut self, oversold: Decimal, overbought: Decimal) -> Self {
        self.oversold = oversold;
        self.overbought = overbought;
        self
    }
}

impl Strategy for RsiStrategy {
    fn id(&self) -> StrategyId {
        self.id.clone()
    }

    fn appetite(&self) -> DataAppetite {
        DataAppetite::tickers(self.symbols.clone(), self.period * 3)
    }

    fn analyze(&mut self, symbol: &Symbol, window: &[MarketEvent]) -> Option<Signal> {
        let mut rsi = RelativeStrengthIndex::new(self.period);
        let mut latest = None;
        let mut price = Decimal::ZERO;
        for event in window {
            if let Some(close) = close_of(event) {
                latest = rsi.update(close);
                price = close;
            }
        }
        let rsi_value = latest?;

        let (action, strength) = if rsi_value <= self.oversold {
            let depth = (self.oversold - rsi_value) / self.oversold;
            (SignalAction::Buy, (dec!(0.4) + depth).min(Decimal::ONE))
        } else if rsi_value >= self.overbought {
            let depth = (rsi_value - self.overbought) / (dec!(100) - self.overbought);
            (SignalAction::Sell, (dec!(0.4) + depth).min(Decimal::ONE))
        } else {
            return None;
        };

        let mut metadata = HashMap::new();
        metadata.insert(
            "rsi".to_string(),
            serde_json::Value::String(rsi_value.round_dp(2).to_string()),
        );

        Some(Signal {
            symbol: symbol.clone(),
            action,
            strength,
            price,
            time: window
                .last()
                .map(|event| event.time_exchange)
                .unwrap_or_else(Utc::now),
            strategy: self.id.clone(),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantra_data::event::{DataKind, Ticker};
    use quantra_instrument::exchange::ExchangeId;

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
    fn test_sustained_rally_emits_sell() {
        let symbol: Symbol = "BTC/USDT".parse().unwrap();
        let mut strategy = RsiStrategy::new(vec![symbol.clone()], 3);

        let window: Vec<MarketEvent> = (0..8)
            .map(|i| ticker_event(&symbol, Decimal::from(100 + i * 5)))
            .collect();

        let signal = strategy.analyze(&symbol, &window).expect("overbought");
        assert_eq!(signal.action, SignalAction::Sell);
        assert!(signal.strength > dec!(0.4));
    }

    #[test]
    fn test_sustained_selloff_emits_buy() {
        let symbol: Symbol = "BTC/USDT".parse().unwrap();
        let mut strategy = RsiStrategy::new(vec![symbol.clone()], 3);

        let window: Vec<MarketEvent> = (0..8)
            .map(|i| ticker_event(&symbol, Decimal::from(200 - i * 5)))
            .collect();

        let signal = strategy.analyze(&symbol, &window).expect("oversold");
        assert_eq!(signal.action, SignalAction::Buy);
    }

    #[test]
    fn test_neutral_band_is_silent() {
        let symbol: Symbol = "BTC/USDT".parse().unwrap();
        let mut strategy = RsiStrategy::new(vec![symbol.clone()], 3);

        // Alternating moves keep the RSI near 50.
        let prices = [100, 101, 100, 101, 100, 101, 100, 101];
        let window: Vec<MarketEvent> = prices
            .iter()
            .map(|price| ticker_event(&symbol, Decimal::from(*price)))
            .collect();

        assert!(strategy.analyze(&symbol, &window).is_none());
    }
}
