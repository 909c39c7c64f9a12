use crate::subscription::ChannelKind;
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use quantra_instrument::{Side, exchange::ExchangeId, symbol::Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Normalised market event envelope delivered to [`MarketBus`](crate::bus::MarketBus)
/// subscribers.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct MarketEvent<Kind = DataKind> {
    pub time_exchange: DateTime<Utc>,
    pub time_received: DateTime<Utc>,
    pub exchange: ExchangeId,
    pub symbol: Symbol,
    pub kind: Kind,
}

impl MarketEvent {
    /// Bus partition this event is delivered on.
    pub fn channel(&self) -> ChannelKind {
        match &self.kind {
            DataKind::Ticker(_) => ChannelKind::Ticker,
            DataKind::Trade(_) => ChannelKind::Trade,
            DataKind::OrderBookSnapshot(_) | DataKind::OrderBookDelta(_) => ChannelKind::OrderBook,
            DataKind::Gap(channel) => *channel,
        }
    }
}

/// Available kinds of normalised market event.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum DataKind {
    Ticker(Ticker),
    Trade(PublicTrade),
    OrderBookSnapshot(OrderBookSnapshot),
    OrderBookDelta(OrderBookDelta),
    /// Missed-window notification: emitted once per re-established channel after a
    /// reconnect, before any new data, so consumers never observe a silent gap.
    Gap(ChannelKind),
}

/// Normalised best bid/ask ticker.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Ticker {
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub base_volume: Decimal,
    pub quote_volume: Decimal,
}

impl Ticker {
    /// A ticker whose bid crosses its ask is malformed and must not be applied.
    pub fn is_coherent(&self) -> bool {
        self.bid <= self.ask
    }
}

/// Normalised public trade.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct PublicTrade {
    pub id: String,
    pub price: Decimal,
    pub amount: Decimal,
    pub side: Side,
}

/// One price level of an order book.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Level {
    pub price: Decimal,
    pub amount: Decimal,
}

/// Full order book state: bids descending, asks ascending.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct OrderBookSnapshot {
    pub last_update_id: u64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

/// Incremental order book update, meaningful only relative to a prior snapshot's
/// sequence id. A level with `amount == 0` removes that price.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct OrderBookDelta {
    pub first_update_id: u64,
    pub last_update_id: u64,
    pub bids: Vec<Level>,
    pub asks: Vec<Level>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ticker_coherence() {
        let ticker = Ticker::new(dec!(100), dec!(101), dec!(100.5), dec!(10), dec!(1000));
        assert!(ticker.is_coherent());

        let crossed = Ticker::new(dec!(102), dec!(101), dec!(100.5), dec!(10), dec!(1000));
        assert!(!crossed.is_coherent());
    }
}
