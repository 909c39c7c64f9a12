use quantra_instrument::exchange::ExchangeId;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};

/// Uniform per-venue maker/taker fee schedule, expressed as fractions
/// (eg/ 0.001 = 10 bps).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct FeeSchedule {
    pub maker: Decimal,
    pub taker: Decimal,
}

impl FeeSchedule {
    pub fn new(maker_bps: u32, taker_bps: u32) -> Self {
        let scale = Decimal::from_u32(10_000).expect("10_000 is representable");
        Self {
            maker: Decimal::from(maker_bps) / scale,
            taker: Decimal::from(taker_bps) / scale,
        }
    }

    /// Default tier schedule for a venue.
    pub fn for_exchange(exchange: ExchangeId) -> Self {
        match exchange {
            ExchangeId::Binance => Self::new(10, 10),
            ExchangeId::Bybit => Self::new(10, 10),
            ExchangeId::Bitget => Self::new(10, 10),
            ExchangeId::Poloniex => Self::new(14, 15),
            // Venues without a dedicated adapter yet share a conservative default.
            _ => Self::new(20, 20),
        }
    }

    /// Taker fee charged on a notional amount.
    pub fn taker_fee(&self, notional: Decimal) -> Decimal {
        notional * self.taker
    }

    /// Maker fee charged on a notional amount.
    pub fn maker_fee(&self, notional: Decimal) -> Decimal {
        notional * self.maker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_adapter_fee_rates_pinned() {
        assert_eq!(
            FeeSchedule::for_exchange(ExchangeId::Binance),
            FeeSchedule {
                maker: dec!(0.001),
                taker: dec!(0.001)
            }
        );
        assert_eq!(
            FeeSchedule::for_exchange(ExchangeId::Bybit),
            FeeSchedule {
                maker: dec!(0.001),
                taker: dec!(0.001)
            }
        );
        assert_eq!(
            FeeSchedule::for_exchange(ExchangeId::Bitget),
            FeeSchedule {
                maker: dec!(0.001),
                taker: dec!(0.001)
            }
        );
        assert_eq!(
            FeeSchedule::for_exchange(ExchangeId::Poloniex),
            FeeSchedule {
                maker: dec!(0.0014),
                taker: dec!(0.0015)
            }
        );
    }

    #[test]
    fn test_taker_fee_on_notional() {
        let fees = FeeSchedule::for_exchange(ExchangeId::Binance);
        assert_eq!(fees.taker_fee(dec!(10000)), dec!(10));
    }
}
