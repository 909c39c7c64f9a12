use crate::{Signal, SignalAction, StrategyId};
use chrono::{DateTime, TimeDelta, Utc};
use quantra_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Proposed trade produced by the combiner, consumed by the risk gate.
///
/// `quantity` is zero until the risk pipeline sizes the intent.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradeIntent {
    pub symbol: Symbol,
    pub action: SignalAction,
    /// Net conviction in `[0, 1]`: winning score minus losing score.
    pub strength: Decimal,
    pub quantity: Decimal,
    pub target_price: Option<Decimal>,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub originating_signals: Vec<Signal>,
}

/// Combiner configuration: evaluation window, decision threshold and per-strategy
/// weights (missing strategies default to 1.0).
#[derive(Debug, Clone)]
pub struct CombinerConfig {
    pub evaluation_window: TimeDelta,
    /// Minimum winning score after normalisation by the winning side's weight mass.
    pub threshold: Decimal,
    pub weights: HashMap<StrategyId, Decimal>,
}

impl Default for CombinerConfig {
    fn default() -> Self {
        Self {
            evaluation_window: TimeDelta::seconds(1),
            threshold: dec!(0.3),
            weights: HashMap::new(),
        }
    }
}

impl CombinerConfig {
    fn weight(&self, strategy: &StrategyId) -> Decimal {
        self.weights.get(strategy).copied().unwrap_or(Decimal::ONE)
    }
}

/// Weighted aggregation of concurrent strategy signals into a [`TradeIntent`].
///
/// For each `(symbol, evaluation tick)` the combiner scores the buy and sell sides by
/// `Σ weight * strength`; the larger side wins, ties resolve to hold, and a winner
/// below the normalised threshold also resolves to hold.
#[derive(Debug, Default)]
pub struct SignalCombiner {
    config: CombinerConfig,
    pending: HashMap<Symbol, Vec<Signal>>,
}

impl SignalCombiner {
    pub fn new(config: CombinerConfig) -> Self {
        Self {
            config,
            pending: HashMap::new(),
        }
    }

    /// Buffer a signal until the next evaluation tick for its symbol.
    pub fn collect(&mut self, signal: Signal) {
        self.pending
            .entry(signal.symbol.clone())
            .or_default()
            .push(signal);
    }

    /// Symbols with buffered signals awaiting evaluation.
    pub fn pending_symbols(&self) -> Vec<Symbol> {
        self.pending.keys().cloned().collect()
    }

    /// Evaluate the buffered signals for `symbol`, draining them.
    pub fn evaluate(&mut self, symbol: &Symbol, now: DateTime<Utc>) -> Vec<TradeIntent> {
        let Some(buffered) = self.pending.remove(symbol) else {
            return Vec::new();
        };
        let fresh: Vec<Signal> = buffered
            .into_iter()
            .filter(|signal| now - signal.time <= self.config.evaluation_window)
            .collect();
        if fresh.is_empty() {
            return Vec::new();
        }

        let mut intents = Vec::new();

        // Close signals bypass scoring: they unwind an existing position.
        let closes: Vec<Signal> = fresh
            .iter()
            .filter(|signal| signal.action == SignalAction::Close)
            .cloned()
            .collect();
        if let Some(strongest) = closes
            .iter()
            .map(|signal| signal.strength)
            .max()
        {
            intents.push(TradeIntent {
                symbol: symbol.clone(),
                action: SignalAction::Close,
                strength: strongest,
                quantity: Decimal::ZERO,
                target_price: closes.last().map(|signal| signal.price),
                stop_loss: None,
                take_profit: None,
                originating_signals: closes,
            });
        }

        if let Some(intent) = self.score(symbol, &fresh) {
            intents.push(intent);
        }
        intents
    }

    fn score(&self, symbol: &Symbol, signals: &[Signal]) -> Option<TradeIntent> {
        let mut buy_score = Decimal::ZERO;
        let mut buy_weight = Decimal::ZERO;
        let mut sell_score = Decimal::ZERO;
        let mut sell_weight = Decimal::ZERO;

        for signal in signals {
            let weight = self.config.weight(&signal.strategy);
            match signal.action {
                SignalAction::Buy => {
                    buy_score += weight * signal.strength;
                    buy_weight += weight.abs();
                }
                SignalAction::Sell => {
                    sell_score += weight * signal.strength;
                    sell_weight += weight.abs();
                }
                SignalAction::Hold | SignalAction::Close => {}
            }
        }

        // Ties resolve to hold.
        if buy_score == sell_score {
            return None;
        }
        let (action, winner, loser, winner_weight) = if buy_score > sell_score {
            (SignalAction::Buy, buy_score, sell_score, buy_weight)
        } else {
            (SignalAction::Sell, sell_score, buy_score, sell_weight)
        };

        // Normalise by the winning side's weight mass before applying the threshold.
        if winner_weight.is_zero() || winner / winner_weight < self.config.threshold {
            return None;
        }

        let contributing: Vec<Signal> = signals
            .iter()
            .filter(|signal| {
                matches!(signal.action, SignalAction::Buy | SignalAction::Sell)
            })
            .cloned()
            .collect();
        let target_price = contributing
            .iter()
            .filter(|signal| signal.action == action)
            .next_back()
            .map(|signal| signal.price);

        Some(TradeIntent {
            symbol: symbol.clone(),
            action,
            strength: (winner - loser).clamp(Decimal::ZERO, Decimal::ONE),
            quantity: Decimal::ZERO,
            target_price,
            stop_loss: None,
            take_profit: None,
            originating_signals: contributing,
        })
    }
}
