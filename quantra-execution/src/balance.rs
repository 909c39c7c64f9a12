use derive_more::Constructor;
use quantra_instrument::asset::AssetName;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Balance of one asset. `used` is the sum of reservations held by open orders and
/// open positions; `total = free + used` always holds because total is derived.
#[derive(
    Debug, Copy, Clone, Default, Eq, PartialEq, Deserialize, Serialize, Constructor,
)]
pub struct Balance {
    pub free: Decimal,
    pub used: Decimal,
}

impl Balance {
    pub fn free_only(free: Decimal) -> Self {
        Self {
            free,
            used: Decimal::ZERO,
        }
    }

    pub fn total(&self) -> Decimal {
        self.free + self.used
    }

    /// Move `amount` from free into used. Fails without mutating when free is
    /// insufficient.
    pub fn reserve(&mut self, amount: Decimal) -> Result<(), Decimal> {
        if amount > self.free {
            return Err(self.free);
        }
        self.free -= amount;
        self.used += amount;
        Ok(())
    }

    /// Release a reservation back into free. Releasing more than is reserved clamps
    /// to the reserved amount.
    pub fn release(&mut self, amount: Decimal) {
        let released = amount.min(self.used);
        self.used -= released;
        self.free += released;
    }
}

/// A [`Balance`] tagged with its asset, as returned by venue balance endpoints.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize, Constructor)]
pub struct AssetBalance {
    pub asset: AssetName,
    pub balance: Balance,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reserve_and_release_conserve_total() {
        let mut balance = Balance::free_only(dec!(100));
        balance.reserve(dec!(30)).unwrap();
        assert_eq!(balance.free, dec!(70));
        assert_eq!(balance.used, dec!(30));
        assert_eq!(balance.total(), dec!(100));

        balance.release(dec!(30));
        assert_eq!(balance.free, dec!(100));
        assert_eq!(balance.total(), dec!(100));
    }

    #[test]
    fn test_reserve_insufficient_free_fails_cleanly() {
        let mut balance = Balance::free_only(dec!(10));
        assert_eq!(balance.reserve(dec!(11)), Err(dec!(10)));
        assert_eq!(balance.free, dec!(10));
        assert_eq!(balance.used, dec!(0));
    }

    #[test]
    fn test_release_clamps_to_reserved() {
        let mut balance = Balance::new(dec!(5), dec!(2));
        balance.release(dec!(10));
        assert_eq!(balance.used, dec!(0));
        assert_eq!(balance.free, dec!(7));
    }
}
