use quantra_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;

/// Pairwise correlation estimates between symbols, symmetric by construction.
#[derive(Debug, Default, Clone)]
pub struct CorrelationMatrix {
    correlations: HashMap<(Symbol, Symbol), Decimal>,
}

impl CorrelationMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, a: Symbol, b: Symbol, correlation: Decimal) {
        self.correlations.insert(Self::key(a, b), correlation);
    }

    pub fn get(&self, a: &Symbol, b: &Symbol) -> Option<Decimal> {
        self.correlations
            .get(&Self::key(a.clone(), b.clone()))
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.correlations.is_empty()
    }

    fn key(a: Symbol, b: Symbol) -> (Symbol, Symbol) {
        if a <= b { (a, b) } else { (b, a) }
    }

    /// Equity-weighted average correlation of `symbol` against the open positions.
    ///
    /// `positions` are `(symbol, weight)` pairs where weight is the position's share
    /// of account equity.
    pub fn average_against(
        &self,
        symbol: &Symbol,
        positions: &[(Symbol, Decimal)],
    ) -> Option<Decimal> {
        let mut weighted = Decimal::ZERO;
        let mut total_weight = Decimal::ZERO;
        for (open_symbol, weight) in positions {
            if open_symbol == symbol {
                continue;
            }
            if let Some(correlation) = self.get(symbol, open_symbol) {
                weighted += correlation * *weight;
                total_weight += *weight;
            }
        }
        if total_weight.is_zero() {
            None
        } else {
            Some(weighted / total_weight)
        }
    }

    /// Sizing haircut `1 - 0.5 * |avg correlation|` against current positions.
    pub fn size_factor(&self, symbol: &Symbol, positions: &[(Symbol, Decimal)]) -> Decimal {
        match self.average_against(symbol, positions) {
            Some(average) => Decimal::ONE - dec!(0.5) * average.abs(),
            None => Decimal::ONE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbol(pair: &str) -> Symbol {
        pair.parse().unwrap()
    }

    #[test]
    fn test_symmetric_lookup() {
        let mut matrix = CorrelationMatrix::new();
        matrix.set(symbol("BTC/USDT"), symbol("ETH/USDT"), dec!(0.8));
        assert_eq!(
            matrix.get(&symbol("ETH/USDT"), &symbol("BTC/USDT")),
            Some(dec!(0.8))
        );
    }

    #[test]
    fn test_equity_weighted_average() {
        let mut matrix = CorrelationMatrix::new();
        matrix.set(symbol("BTC/USDT"), symbol("ETH/USDT"), dec!(0.8));
        matrix.set(symbol("BTC/USDT"), symbol("SOL/USDT"), dec!(0.4));

        let positions = vec![
            (symbol("ETH/USDT"), dec!(0.3)),
            (symbol("SOL/USDT"), dec!(0.1)),
        ];
        // (0.8*0.3 + 0.4*0.1) / 0.4 = 0.7
        assert_eq!(
            matrix.average_against(&symbol("BTC/USDT"), &positions),
            Some(dec!(0.7))
        );
    }

    #[test]
    fn test_size_factor_haircut() {
        let mut matrix = CorrelationMatrix::new();
        matrix.set(symbol("BTC/USDT"), symbol("ETH/USDT"), dec!(-0.6));
        let positions = vec![(symbol("ETH/USDT"), dec!(0.5))];
        // 1 - 0.5 * |-0.6|
        assert_eq!(
            matrix.size_factor(&symbol("BTC/USDT"), &positions),
            dec!(0.7)
        );
    }

    #[test]
    fn test_no_information_means_no_haircut() {
        let matrix = CorrelationMatrix::new();
        assert_eq!(
            matrix.size_factor(&symbol("BTC/USDT"), &[]),
            Decimal::ONE
        );
    }
}
