use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Tracks peak equity to compute the portfolio drawdown fraction.
///
/// Drawdown is `(peak - current) / peak`, a monotonically non-decreasing function of
/// losses until a new equity peak resets it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DrawdownTracker {
    peak: Decimal,
    current: Decimal,
}

impl DrawdownTracker {
    pub fn new(initial_equity: Decimal) -> Self {
        Self {
            peak: initial_equity,
            current: initial_equity,
        }
    }

    /// Observe a fresh equity figure, ratcheting the peak upward only.
    pub fn update_equity(&mut self, equity: Decimal) {
        self.current = equity;
        if equity > self.peak {
            self.peak = equity;
        }
    }

    pub fn peak(&self) -> Decimal {
        self.peak
    }

    pub fn drawdown(&self) -> Decimal {
        if self.peak.is_zero() {
            Decimal::ZERO
        } else {
            ((self.peak - self.current) / self.peak).max(Decimal::ZERO)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_peak_ratchets_upward_only() {
        let mut tracker = DrawdownTracker::new(dec!(10000));
        tracker.update_equity(dec!(12000));
        assert_eq!(tracker.peak(), dec!(12000));
        tracker.update_equity(dec!(9000));
        assert_eq!(tracker.peak(), dec!(12000));
        assert_eq!(tracker.drawdown(), dec!(0.25));
    }

    #[test]
    fn test_drawdown_at_peak_is_zero() {
        let tracker = DrawdownTracker::new(dec!(10000));
        assert_eq!(tracker.drawdown(), Decimal::ZERO);
    }
}
