use crate::{Signal, Strategy, StrategyId};
use quantra_data::event::MarketEvent;
use quantra_instrument::symbol::Symbol;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::warn;

const DEFAULT_CPU_BUDGET: Duration = Duration::from_millis(50);
const DEFAULT_OFFENCE_LIMIT: u32 = 3;
const DEGRADED_WEIGHT: Decimal = dec!(0.5);

struct StrategyEntry {
    strategy: Box<dyn Strategy>,
    windows: HashMap<Symbol, VecDeque<MarketEvent>>,
    offences: u32,
    degraded: bool,
}

/// Hosts registered strategies and fans market events into them.
///
/// The runtime owns one bounded sliding window per `(strategy, symbol)`. Each
/// invocation is timed against a CPU budget; repeat offenders are marked degraded and
/// their signals down-weighted. Registration is static at startup.
pub struct StrategyRuntime {
    entries: Vec<StrategyEntry>,
    cpu_budget: Duration,
    offence_limit: u32,
}

impl std::fmt::Debug for StrategyRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRuntime")
            .field("strategies", &self.entries.len())
            .finish_non_exhaustive()
    }
}

impl Default for StrategyRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyRuntime {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            cpu_budget: DEFAULT_CPU_BUDGET,
            offence_limit: DEFAULT_OFFENCE_LIMIT,
        }
    }

    pub fn with_cpu_budget(mut self, budget: Duration) -> Self {
        self.cpu_budget = budget;
        self
    }

    /// Register a strategy. Names must be unique; a duplicate replaces the earlier
    /// registration.
    pub fn register(&mut self, strategy: Box<dyn Strategy>) {
        let id = strategy.id();
        self.entries.retain(|entry| entry.strategy.id() != id);
        self.entries.push(StrategyEntry {
            strategy,
            windows: HashMap::new(),
            offences: 0,
            degraded: false,
        });
    }

    pub fn strategy_ids(&self) -> Vec<StrategyId> {
        self.entries.iter().map(|entry| entry.strategy.id()).collect()
    }

    pub fn degraded_ids(&self) -> Vec<StrategyId> {
        self.entries
            .iter()
            .filter(|entry| entry.degraded)
            .map(|entry| entry.strategy.id())
            .collect()
    }

    /// Feed one market event through every interested strategy, collecting signals.
    pub fn on_event(&mut self, event: &MarketEvent) -> Vec<Signal> {
        let mut signals = Vec::new();
        let cpu_budget = self.cpu_budget;
        let offence_limit = self.offence_limit;

        for entry in &mut self.entries {
            let appetite = entry.strategy.appetite();
            if !appetite.wants(event) {
                continue;
            }

            let window = entry
                .windows
                .entry(event.symbol.clone())
                .or_insert_with(|| VecDeque::with_capacity(appetite.window));
            window.push_back(event.clone());
            while window.len() > appetite.window {
                window.pop_front();
            }
            let window_slice = window.make_contiguous();

            let started = Instant::now();
            let signal = entry.strategy.analyze(&event.symbol, window_slice);
            let elapsed = started.elapsed();

            if elapsed > cpu_budget {
                entry.offences += 1;
                warn!(
                    strategy = %entry.strategy.id(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    offences = entry.offences,
                    "strategy exceeded per-event CPU budget"
                );
                if entry.offences >= offence_limit && !entry.degraded {
                    entry.degraded = true;
                    warn!(
                        strategy = %entry.strategy.id(),
                        "strategy marked degraded - signals will be down-weighted"
                    );
                }
            }

            if let Some(mut signal) = signal {
                if entry.degraded {
                    signal.strength *= DEGRADED_WEIGHT;
                }
                signals.push(signal);
            }
        }

        signals
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataAppetite, SignalAction};
    use chrono::Utc;
    use quantra_data::{
        event::{DataKind, Ticker},
        subscription::ChannelKind,
    };
    use quantra_instrument::exchange::ExchangeId;

    struct FixedStrategy {
        id: StrategyId,
        window: usize,
        delay: Duration,
        seen: usize,
    }

    impl Strategy for FixedStrategy {
        fn id(&self) -> StrategyId {
            self.id.clone()
        }

        fn appetite(&self) -> DataAppetite {
            DataAppetite {
                symbols: vec![],
                channels: vec![ChannelKind::Ticker],
                window: self.window,
            }
        }

        fn analyze(&mut self, symbol: &Symbol, window: &[MarketEvent]) -> Option<Signal> {
            self.seen = window.len();
            std::thread::sleep(self.delay);
            Some(Signal {
                symbol: symbol.clone(),
                action: SignalAction::Buy,
                strength: Decimal::ONE,
                price: Decimal::ONE,
                time: Utc::now(),
                strategy: self.id.clone(),
                metadata: HashMap::new(),
            })
        }
    }

    fn ticker_event() -> MarketEvent {
        MarketEvent::new(
            Utc::now(),
            Utc::now(),
            ExchangeId::Binance,
            "BTC/USDT".parse().unwrap(),
            DataKind::Ticker(Ticker::new(
                Decimal::ONE,
                Decimal::ONE,
                Decimal::ONE,
                Decimal::ONE,
                Decimal::ONE,
            )),
        )
    }

    #[test]
    fn test_window_is_bounded() {
        let mut runtime = StrategyRuntime::new();
        runtime.register(Box::new(FixedStrategy {
            id: StrategyId::new("fixed"),
            window: 3,
            delay: Duration::ZERO,
            seen: 0,
        }));

        for _ in 0..10 {
            runtime.on_event(&ticker_event());
        }
        // The strategy only ever sees at most `window` events.
        let entry = &runtime.entries[0];
        let window = entry.windows.values().next().unwrap();
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_cpu_budget_degrades_and_down_weights() {
        let mut runtime =
            StrategyRuntime::new().with_cpu_budget(Duration::from_millis(1));
        runtime.register(Box::new(FixedStrategy {
            id: StrategyId::new("slow"),
            window: 4,
            delay: Duration::from_millis(5),
            seen: 0,
        }));

        let mut last = Vec::new();
        for _ in 0..DEFAULT_OFFENCE_LIMIT + 1 {
            last = runtime.on_event(&ticker_event());
        }

        assert_eq!(runtime.degraded_ids(), vec![StrategyId::new("slow")]);
        assert_eq!(last[0].strength, dec!(0.5));
    }

    #[test]
    fn test_duplicate_registration_replaces() {
        let mut runtime = StrategyRuntime::new();
        for _ in 0..2 {
            runtime.register(Box::new(FixedStrategy {
                id: StrategyId::new("dup"),
                window: 2,
                delay: Duration::ZERO,
                seen: 0,
            }));
        }
        assert_eq!(runtime.strategy_ids().len(), 1);
    }
}
