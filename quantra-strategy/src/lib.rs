#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]

//! # Quantra-Strategy
//! Event-driven trading strategies and the runtime that hosts them.
//!
//! Strategies are pure consumers: the runtime owns a bounded sliding window of recent
//! events per `(strategy, symbol)`, appends each incoming event and invokes the
//! strategy against the window. Cross-strategy communication is forbidden - signals
//! meet only inside the [`SignalCombiner`](combiner::SignalCombiner).

use chrono::{DateTime, Utc};
use quantra_data::{event::MarketEvent, subscription::ChannelKind};
use quantra_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// Decimal-native technical indicators.
pub mod indicators;

/// Moving-average cross strategy.
pub mod ma_cross;

/// Relative Strength Index strategy.
pub mod rsi;

/// Per-strategy sliding-window runtime with CPU budgets and degradation.
pub mod runtime;

/// Weighted aggregation of concurrent strategy signals into trade intents.
pub mod combiner;

/// Unique strategy name, fixed at registration.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub struct StrategyId(pub SmolStr);

impl StrategyId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for StrategyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Proposed action attached to a [`Signal`].
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
    Close,
}

/// Immutable output of one strategy evaluation.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Signal {
    pub symbol: Symbol,
    pub action: SignalAction,
    /// Conviction in `[0, 1]`.
    pub strength: Decimal,
    pub price: Decimal,
    pub time: DateTime<Utc>,
    pub strategy: StrategyId,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// What market data a strategy wants to see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataAppetite {
    /// Symbols of interest; empty means every symbol.
    pub symbols: Vec<Symbol>,
    /// Channel kinds the strategy consumes.
    pub channels: Vec<ChannelKind>,
    /// Sliding window length maintained by the runtime.
    pub window: usize,
}

impl DataAppetite {
    pub fn tickers(symbols: Vec<Symbol>, window: usize) -> Self {
        Self {
            symbols,
            channels: vec![ChannelKind::Ticker],
            window,
        }
    }

    pub fn wants(&self, event: &MarketEvent) -> bool {
        self.channels.contains(&event.channel())
            && (self.symbols.is_empty() || self.symbols.contains(&event.symbol))
    }
}

/// Trait implemented by event-driven strategies.
///
/// `analyze` receives the sliding window for `(self, symbol)` with the newest event
/// last. Strategies must be CPU-bound and run to completion: no I/O, no shared state
/// outside the window.
pub trait Strategy: Send {
    fn id(&self) -> StrategyId;

    fn appetite(&self) -> DataAppetite;

    fn analyze(&mut self, symbol: &Symbol, window: &[MarketEvent]) -> Option<Signal>;
}
