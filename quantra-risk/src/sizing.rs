use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Position sizing parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SizingConfig {
    /// Fraction of equity risked per trade (eg/ 0.01 = 1%).
    pub max_risk_per_trade: Decimal,
    /// Minimum order quantity in base units.
    pub min_quantity: Decimal,
    /// Maximum position notional as a fraction of equity.
    pub max_position_pct: Decimal,
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade: dec!(0.01),
            min_quantity: dec!(0.0001),
            max_position_pct: dec!(0.1),
        }
    }
}

/// Risk-based position sizing: quantity such that hitting the stop loses at most
/// `max_risk_per_trade` of equity, clamped to the configured bounds.
#[derive(Debug, Clone, Default)]
pub struct PositionSizer {
    config: SizingConfig,
}

impl PositionSizer {
    pub fn new(config: SizingConfig) -> Self {
        Self { config }
    }

    /// Quantity for an entry at `price` with a stop at `stop_price`, given account
    /// `equity` and signal `conviction` in `[0, 1]`.
    pub fn quantity(
        &self,
        equity: Decimal,
        price: Decimal,
        stop_price: Decimal,
        conviction: Decimal,
    ) -> Decimal {
        let risk_per_unit = (price - stop_price).abs();
        if risk_per_unit.is_zero() || price.is_zero() || equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        let risk_amount = equity * self.config.max_risk_per_trade * conviction;
        let quantity = risk_amount / risk_per_unit;

        // Cap the notional at the per-position share of equity.
        let max_notional = equity * self.config.max_position_pct;
        let quantity = quantity.min(max_notional / price);

        if quantity < self.config.min_quantity {
            Decimal::ZERO
        } else {
            quantity
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_amount_determines_quantity() {
        let sizer = PositionSizer::new(SizingConfig {
            max_risk_per_trade: dec!(0.01),
            min_quantity: dec!(0.0001),
            max_position_pct: dec!(0.5),
        });
        // Equity 50_000, 1% risk, full conviction, stop 2_000 under entry.
        let quantity = sizer.quantity(dec!(50000), dec!(50000), dec!(48000), Decimal::ONE);
        // 500 / 2000 = 0.25
        assert_eq!(quantity, dec!(0.25));
    }

    #[test]
    fn test_notional_cap_applies() {
        let sizer = PositionSizer::new(SizingConfig {
            max_risk_per_trade: dec!(0.05),
            min_quantity: dec!(0.0001),
            max_position_pct: dec!(0.1),
        });
        // Uncapped sizing would be 2500/500 = 5; the 10% notional cap limits it.
        let quantity = sizer.quantity(dec!(50000), dec!(1000), dec!(500), Decimal::ONE);
        assert_eq!(quantity, dec!(5));

        let capped = sizer.quantity(dec!(50000), dec!(10000), dec!(9900), Decimal::ONE);
        // risk 2500 / 100 = 25 uncapped; cap = 5000/10000 = 0.5
        assert_eq!(capped, dec!(0.5));
    }

    #[test]
    fn test_degenerate_inputs_produce_zero() {
        let sizer = PositionSizer::default();
        assert_eq!(
            sizer.quantity(dec!(10000), dec!(100), dec!(100), Decimal::ONE),
            Decimal::ZERO
        );
        assert_eq!(
            sizer.quantity(Decimal::ZERO, dec!(100), dec!(99), Decimal::ONE),
            Decimal::ZERO
        );
    }
}
