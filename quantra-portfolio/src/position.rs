use chrono::{DateTime, Utc};
use quantra_instrument::{Side, symbol::Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// An open position in one symbol.
///
/// `size > 0` always holds: a position reduced to zero is deleted by the portfolio
/// atomically with the closing fill. Side::Buy is a long, Side::Sell a short.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Position {
    pub symbol: Symbol,
    pub side: Side,
    pub size: Decimal,
    /// Size-weighted average entry price across all increasing fills.
    pub entry_price: Decimal,
    pub entry_time: DateTime<Utc>,
    /// Realised P&L accumulated by partial reductions of this position.
    pub realized_pnl: Decimal,
    /// Marked-to-market P&L of the remaining size.
    pub unrealized_pnl: Decimal,
}

/// Result of applying one fill to a position book entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionDelta {
    /// Realised P&L produced by this fill (zero for entries and increases).
    pub realized_pnl: Decimal,
    /// Quantity that closed existing exposure.
    pub closed_size: Decimal,
    /// Quantity left over after a flip, opening exposure on the opposite side.
    pub flipped_size: Decimal,
}

impl Position {
    /// Open a fresh position from an initial fill.
    pub fn open(
        symbol: Symbol,
        side: Side,
        size: Decimal,
        price: Decimal,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol,
            side,
            size,
            entry_price: price,
            entry_time: time,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
        }
    }

    /// Increase the position with a same-side fill, maintaining the VWAP entry:
    /// `new_avg = (old_size * old_avg + fill_size * fill_price) / (old_size + fill_size)`.
    pub fn increase(&mut self, size: Decimal, price: Decimal) {
        let total = self.size + size;
        self.entry_price = (self.size * self.entry_price + size * price) / total;
        self.size = total;
    }

    /// Reduce the position with an opposite-side fill of `size`, realising
    /// `(fill_price - entry) * closed` for longs (sign-flipped for shorts).
    ///
    /// When `size` exceeds the remaining position the excess is reported as
    /// `flipped_size` for the caller to open on the opposite side.
    pub fn reduce(&mut self, size: Decimal, price: Decimal) -> PositionDelta {
        let closed = size.min(self.size);
        let realized = match self.side {
            Side::Buy => (price - self.entry_price) * closed,
            Side::Sell => (self.entry_price - price) * closed,
        };
        self.size -= closed;
        self.realized_pnl += realized;

        PositionDelta {
            realized_pnl: realized,
            closed_size: closed,
            flipped_size: size - closed,
        }
    }

    /// Mark the remaining size against the latest price, returning the change in
    /// unrealised P&L.
    pub fn update_price(&mut self, price: Decimal) -> Decimal {
        let fresh = match self.side {
            Side::Buy => (price - self.entry_price) * self.size,
            Side::Sell => (self.entry_price - price) * self.size,
        };
        let delta = fresh - self.unrealized_pnl;
        self.unrealized_pnl = fresh;
        delta
    }

    /// Current notional at the provided mark price.
    pub fn notional(&self, price: Decimal) -> Decimal {
        self.size * price
    }

    pub fn is_closed(&self) -> bool {
        self.size.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(side: Side, size: Decimal, price: Decimal) -> Position {
        Position::open("BTC/USDT".parse().unwrap(), side, size, price, Utc::now())
    }

    #[test]
    fn test_vwap_entry_is_mean_of_equal_fills() {
        // N equal-size fills at p1..pN yield entry = mean(p).
        let prices = [dec!(100), dec!(110), dec!(90), dec!(104)];
        let mut position = position(Side::Buy, dec!(1), prices[0]);
        for price in &prices[1..] {
            position.increase(dec!(1), *price);
        }
        assert_eq!(position.entry_price, dec!(101));
        assert_eq!(position.size, dec!(4));
    }

    #[test]
    fn test_weighted_vwap() {
        let mut position = position(Side::Buy, dec!(3), dec!(100));
        position.increase(dec!(1), dec!(120));
        // (3*100 + 1*120) / 4
        assert_eq!(position.entry_price, dec!(105));
    }

    #[test]
    fn test_long_reduce_realises_profit() {
        let mut position = position(Side::Buy, dec!(0.1), dec!(20000));
        let delta = position.reduce(dec!(0.1), dec!(21000));
        assert_eq!(delta.realized_pnl, dec!(100.0));
        assert_eq!(delta.flipped_size, Decimal::ZERO);
        assert!(position.is_closed());
    }

    #[test]
    fn test_short_reduce_realises_profit_on_fall() {
        let mut position = position(Side::Sell, dec!(2), dec!(50));
        let delta = position.reduce(dec!(1), dec!(45));
        assert_eq!(delta.realized_pnl, dec!(5));
        assert_eq!(position.size, dec!(1));
    }

    #[test]
    fn test_over_reduce_reports_flip_and_never_goes_negative() {
        let mut position = position(Side::Buy, dec!(1), dec!(100));
        let delta = position.reduce(dec!(1.5), dec!(110));
        assert_eq!(delta.closed_size, dec!(1));
        assert_eq!(delta.flipped_size, dec!(0.5));
        assert_eq!(delta.realized_pnl, dec!(10));
        assert!(position.size >= Decimal::ZERO);
        assert!(position.is_closed());
    }

    #[test]
    fn test_unrealized_marks_to_latest_price() {
        let mut position = position(Side::Buy, dec!(2), dec!(100));
        assert_eq!(position.update_price(dec!(105)), dec!(10));
        assert_eq!(position.unrealized_pnl, dec!(10));
        // Delta is relative to the previous mark.
        assert_eq!(position.update_price(dec!(103)), dec!(-4));
        assert_eq!(position.unrealized_pnl, dec!(6));
    }
}
