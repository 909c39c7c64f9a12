use crate::{asset::AssetName, symbol::Symbol};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Venue metadata for one tradeable market.
///
/// Quantities and prices submitted to the venue must respect the declared
/// precisions and minimums; adapters use this to round and validate outgoing
/// orders.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Market {
    pub symbol: Symbol,
    pub base: AssetName,
    pub quote: AssetName,
    /// Decimal places accepted for order prices.
    pub price_precision: u32,
    /// Decimal places accepted for order quantities.
    pub qty_precision: u32,
    /// Smallest order quantity the venue accepts.
    pub min_qty: Decimal,
    /// Smallest order notional (price * quantity) the venue accepts.
    pub min_notional: Decimal,
}

impl Market {
    /// Round a quantity down to the market's quantity precision.
    pub fn round_qty(&self, qty: Decimal) -> Decimal {
        qty.trunc_with_scale(self.qty_precision)
    }

    /// Round a price to the market's price precision.
    pub fn round_price(&self, price: Decimal) -> Decimal {
        price.round_dp(self.price_precision)
    }

    /// Whether an order of `qty` at `price` satisfies the venue minimums.
    pub fn meets_minimums(&self, qty: Decimal, price: Decimal) -> bool {
        qty >= self.min_qty && qty * price >= self.min_notional
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market::new(
            Symbol::new("BTC", "USDT"),
            AssetName::new("BTC"),
            AssetName::new("USDT"),
            2,
            5,
            dec!(0.00001),
            dec!(10),
        )
    }

    #[test]
    fn test_round_qty_truncates() {
        assert_eq!(market().round_qty(dec!(0.123456789)), dec!(0.12345));
    }

    #[test]
    fn test_meets_minimums() {
        let market = market();
        assert!(market.meets_minimums(dec!(0.001), dec!(20000)));
        assert!(!market.meets_minimums(dec!(0.000001), dec!(20000)));
        assert!(!market.meets_minimums(dec!(0.0001), dec!(10)));
    }
}
