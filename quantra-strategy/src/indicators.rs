use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Simple moving average indicator.
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    values: VecDeque<Decimal>,
    sum: Decimal,
}

impl SimpleMovingAverage {
    /// Create a new SMA with the given period.
    pub fn new(period: usize) -> Self {
        Self {
            period,
            values: VecDeque::new(),
            sum: Decimal::ZERO,
        }
    }

    /// Update the SMA with a new value and return the latest average.
    pub fn update(&mut self, value: Decimal) -> Decimal {
        self.values.push_back(value);
        self.sum += value;
        if self.values.len() > self.period {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.average()
    }

    /// Current average value.
    pub fn average(&self) -> Decimal {
        if self.values.is_empty() {
            Decimal::ZERO
        } else {
            self.sum / Decimal::from(self.values.len() as u64)
        }
    }

    /// Whether a full period of values has been observed.
    pub fn is_warm(&self) -> bool {
        self.values.len() >= self.period
    }
}

/// Exponential moving average indicator.
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    multiplier: Decimal,
    value: Option<Decimal>,
}

impl ExponentialMovingAverage {
    /// Create a new EMA with the given period.
    pub fn new(period: usize) -> Self {
        let multiplier = Decimal::from(2u64) / Decimal::from(period as u64 + 1);
        Self {
            multiplier,
            value: None,
        }
    }

    /// Update the EMA with a new price and return the latest value.
    pub fn update(&mut self, price: Decimal) -> Decimal {
        match self.value {
            Some(val) => {
                let next = (price - val) * self.multiplier + val;
                self.value = Some(next);
                next
            }
            None => {
                self.value = Some(price);
                price
            }
        }
    }

    /// Current EMA value if initialised.
    pub fn value(&self) -> Option<Decimal> {
        self.value
    }
}

/// Relative Strength Index over gains/losses of consecutive closes.
#[derive(Debug, Clone)]
pub struct RelativeStrengthIndex {
    period: usize,
    previous: Option<Decimal>,
    gains: SimpleMovingAverage,
    losses: SimpleMovingAverage,
}

impl RelativeStrengthIndex {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            previous: None,
            gains: SimpleMovingAverage::new(period),
            losses: SimpleMovingAverage::new(period),
        }
    }

    /// Update with a new close and return the RSI in `[0, 100]` once warm.
    pub fn update(&mut self, close: Decimal) -> Option<Decimal> {
        if let Some(previous) = self.previous {
            let change = close - previous;
            if change >= Decimal::ZERO {
                self.gains.update(change);
                self.losses.update(Decimal::ZERO);
            } else {
                self.gains.update(Decimal::ZERO);
                self.losses.update(-change);
            }
        }
        self.previous = Some(close);

        if !self.gains.is_warm() {
            return None;
        }
        let avg_loss = self.losses.average();
        if avg_loss.is_zero() {
            return Some(Decimal::from(100u64));
        }
        let rs = self.gains.average() / avg_loss;
        Some(Decimal::from(100u64) - Decimal::from(100u64) / (Decimal::ONE + rs))
    }

    pub fn period(&self) -> usize {
        self.period
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_sma_rolls_over_period() {
        let mut sma = SimpleMovingAverage::new(3);
        sma.update(dec!(1));
        sma.update(dec!(2));
        assert_eq!(sma.update(dec!(3)), dec!(2));
        // Window rolls: (2 + 3 + 7) / 3
        assert_eq!(sma.update(dec!(7)), dec!(4));
    }

    #[test]
    fn test_ema_initialises_to_first_value() {
        let mut ema = ExponentialMovingAverage::new(9);
        assert_eq!(ema.update(dec!(10)), dec!(10));
        assert!(ema.update(dec!(20)) > dec!(10));
    }

    #[test]
    fn test_rsi_bounds() {
        let mut rsi = RelativeStrengthIndex::new(3);
        assert!(rsi.update(dec!(10)).is_none());

        // Monotonic rally pins RSI at 100.
        rsi.update(dec!(11));
        rsi.update(dec!(12));
        let value = rsi.update(dec!(13)).unwrap();
        assert_eq!(value, dec!(100));

        // A sell-off pulls it back under 100.
        let value = rsi.update(dec!(9)).unwrap();
        assert!(value < dec!(100));
        assert!(value >= Decimal::ZERO);
    }
}
