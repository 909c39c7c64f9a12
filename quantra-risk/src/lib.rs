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

//! # Quantra-Risk
//! Pre-trade validation of trade intents: kill switch, risk-based sizing, position
//! concentration, portfolio drawdown, daily trade budget, correlation haircuts and
//! venue capability translation.
//!
//! The gate is CPU-bound and performs no I/O; it validates against a read-only
//! [`PortfolioView`] snapshot supplied by the caller. Close intents (stop-loss exits)
//! must NOT pass through the gate - a drawdown halt stops new entries, never exits.

use chrono::{DateTime, TimeDelta, Utc};
use quantra_execution::{
    capability::Capabilities,
    order::{OrderKind, TimeInForce},
};
use quantra_instrument::{Side, symbol::Symbol};
use quantra_integration::error::ExchangeError;
use quantra_strategy::{SignalAction, combiner::TradeIntent};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use thiserror::Error;
use tracing::{debug, warn};

/// Peak-equity drawdown tracking.
pub mod drawdown;

/// Pairwise correlation estimates and sizing haircuts.
pub mod correlation;

/// Risk-based position sizing.
pub mod sizing;

use correlation::CorrelationMatrix;
use drawdown::DrawdownTracker;
use sizing::{PositionSizer, SizingConfig};

/// Price aggression used when translating an unsupported market order into an
/// immediate-or-cancel limit crossing deep into the book.
const FAR_BOOK_AGGRESSION: Decimal = dec!(0.05);

/// Risk management configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskConfig {
    /// Fraction of equity risked per trade.
    pub max_risk_per_trade: Decimal,
    /// Maximum single-position notional as a fraction of equity.
    pub max_position_size: Decimal,
    /// Default stop-loss distance as a fraction of entry price.
    pub stop_loss_pct: Decimal,
    /// Default take-profit distance as a fraction of entry price.
    pub take_profit_pct: Decimal,
    /// Maximum fills admitted in any rolling 24h window.
    pub max_daily_trades: usize,
    /// Drawdown fraction at which new entries are rejected.
    pub max_drawdown: Decimal,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_risk_per_trade: dec!(0.01),
            max_position_size: dec!(0.1),
            stop_loss_pct: dec!(0.02),
            take_profit_pct: dec!(0.04),
            max_daily_trades: 20,
            max_drawdown: dec!(0.1),
        }
    }
}

/// Operator-controlled trading halt. Cloneable; all clones share one flag.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    engaged: Arc<AtomicBool>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engage(&self) {
        warn!("kill switch engaged - rejecting all new intents");
        self.engaged.store(true, Ordering::SeqCst);
    }

    pub fn disengage(&self) {
        self.engaged.store(false, Ordering::SeqCst);
    }

    pub fn is_engaged(&self) -> bool {
        self.engaged.load(Ordering::SeqCst)
    }
}

/// One open position as seen by the gate.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionView {
    pub symbol: Symbol,
    pub notional: Decimal,
}

/// Read-only snapshot of portfolio state used for validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioView {
    pub equity: Decimal,
    pub positions: Vec<PositionView>,
}

impl PortfolioView {
    fn notional_for(&self, symbol: &Symbol) -> Decimal {
        self.positions
            .iter()
            .filter(|position| &position.symbol == symbol)
            .map(|position| position.notional)
            .sum()
    }

    fn equity_weights(&self) -> Vec<(Symbol, Decimal)> {
        if self.equity.is_zero() {
            return Vec::new();
        }
        self.positions
            .iter()
            .map(|position| (position.symbol.clone(), position.notional / self.equity))
            .collect()
    }
}

/// The rule that rejected an intent.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub enum RiskRule {
    KillSwitch,
    PerTradeRisk,
    Concentration,
    Drawdown,
    DailyTradeLimit,
    Capability,
}

/// Rejection carrying the triggering rule and human-readable context.
#[derive(Debug, Clone, Error)]
#[error("intent rejected by {rule:?}: {reason}")]
pub struct RiskRejection {
    pub rule: RiskRule,
    pub reason: String,
}

impl From<RiskRejection> for ExchangeError {
    fn from(rejection: RiskRejection) -> Self {
        match rejection.rule {
            RiskRule::KillSwitch => ExchangeError::KillSwitch,
            RiskRule::Drawdown => ExchangeError::Drawdown {
                drawdown: rejection.reason.clone(),
                limit: String::new(),
            },
            RiskRule::Capability => ExchangeError::RiskRejected(rejection.reason),
            _ => ExchangeError::RiskRejected(rejection.to_string()),
        }
    }
}

/// An intent the gate has approved, sized and translated for the chosen venue.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovedOrder {
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub time_in_force: TimeInForce,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub stop_loss: Option<Decimal>,
    pub take_profit: Option<Decimal>,
    pub intent: TradeIntent,
}

/// Pre-trade risk gate. Every entry intent is validated against the rules in order;
/// the first failure rejects with the triggering rule.
#[derive(Debug)]
pub struct RiskGate {
    config: RiskConfig,
    kill_switch: KillSwitch,
    drawdown: DrawdownTracker,
    correlations: CorrelationMatrix,
    sizer: PositionSizer,
    recent_fills: VecDeque<DateTime<Utc>>,
}

impl RiskGate {
    pub fn new(config: RiskConfig, initial_equity: Decimal) -> Self {
        let sizer = PositionSizer::new(SizingConfig {
            max_risk_per_trade: config.max_risk_per_trade,
            max_position_pct: config.max_position_size,
            ..SizingConfig::default()
        });
        Self {
            config,
            kill_switch: KillSwitch::new(),
            drawdown: DrawdownTracker::new(initial_equity),
            correlations: CorrelationMatrix::new(),
            sizer,
            recent_fills: VecDeque::new(),
        }
    }

    pub fn kill_switch(&self) -> KillSwitch {
        self.kill_switch.clone()
    }

    pub fn set_correlations(&mut self, correlations: CorrelationMatrix) {
        self.correlations = correlations;
    }

    /// Feed the latest equity figure into drawdown tracking.
    pub fn update_equity(&mut self, equity: Decimal) {
        self.drawdown.update_equity(equity);
    }

    pub fn drawdown(&self) -> Decimal {
        self.drawdown.drawdown()
    }

    /// Record an executed fill for the rolling daily budget.
    pub fn record_fill(&mut self, time: DateTime<Utc>) {
        self.recent_fills.push_back(time);
    }

    fn fills_in_window(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = now - TimeDelta::hours(24);
        while let Some(front) = self.recent_fills.front() {
            if *front < cutoff {
                self.recent_fills.pop_front();
            } else {
                break;
            }
        }
        self.recent_fills.len()
    }

    /// Validate an entry intent, returning a sized [`ApprovedOrder`] or the first
    /// rule that rejects it.
    pub fn check(
        &mut self,
        intent: &TradeIntent,
        view: &PortfolioView,
        capabilities: &Capabilities,
        now: DateTime<Utc>,
    ) -> Result<ApprovedOrder, RiskRejection> {
        // 1. Kill switch.
        if self.kill_switch.is_engaged() {
            return Err(RiskRejection {
                rule: RiskRule::KillSwitch,
                reason: "operator halt".to_string(),
            });
        }

        let side = match intent.action {
            SignalAction::Buy => Side::Buy,
            SignalAction::Sell => Side::Sell,
            other => {
                return Err(RiskRejection {
                    rule: RiskRule::Capability,
                    reason: format!("non-executable intent action {other:?}"),
                });
            }
        };
        let Some(price) = intent.target_price.filter(|price| !price.is_zero()) else {
            return Err(RiskRejection {
                rule: RiskRule::PerTradeRisk,
                reason: "intent carries no reference price".to_string(),
            });
        };

        let stop_loss = intent.stop_loss.unwrap_or(match side {
            Side::Buy => price * (Decimal::ONE - self.config.stop_loss_pct),
            Side::Sell => price * (Decimal::ONE + self.config.stop_loss_pct),
        });
        let take_profit = intent.take_profit.unwrap_or(match side {
            Side::Buy => price * (Decimal::ONE + self.config.take_profit_pct),
            Side::Sell => price * (Decimal::ONE - self.config.take_profit_pct),
        });

        // 2. Per-trade risk: size the intent, or validate a caller-provided size.
        let risk_per_unit = (price - stop_loss).abs();
        let risk_budget = view.equity * self.config.max_risk_per_trade;
        let mut quantity = if intent.quantity.is_zero() {
            self.sizer
                .quantity(view.equity, price, stop_loss, intent.strength)
        } else {
            let risk = intent.quantity * risk_per_unit;
            if risk > risk_budget {
                return Err(RiskRejection {
                    rule: RiskRule::PerTradeRisk,
                    reason: format!(
                        "requested risk {risk} exceeds per-trade budget {risk_budget}"
                    ),
                });
            }
            intent.quantity
        };
        if quantity.is_zero() {
            return Err(RiskRejection {
                rule: RiskRule::PerTradeRisk,
                reason: "sized to zero under current equity and stop distance".to_string(),
            });
        }

        // 3. Position concentration: post-trade notional must fit the cap.
        let cap = view.equity * self.config.max_position_size;
        let current = view.notional_for(&intent.symbol);
        let headroom = cap - current;
        if headroom <= Decimal::ZERO {
            return Err(RiskRejection {
                rule: RiskRule::Concentration,
                reason: format!(
                    "position notional {current} already at cap {cap} for {}",
                    intent.symbol
                ),
            });
        }
        if quantity * price > headroom {
            quantity = headroom / price;
            debug!(symbol = %intent.symbol, %quantity, "resized intent to concentration headroom");
        }

        // 4. Portfolio drawdown.
        let drawdown = self.drawdown.drawdown();
        if drawdown >= self.config.max_drawdown {
            return Err(RiskRejection {
                rule: RiskRule::Drawdown,
                reason: format!(
                    "drawdown {drawdown} breaches limit {}",
                    self.config.max_drawdown
                ),
            });
        }

        // 5. Rolling daily trade budget.
        if self.fills_in_window(now) >= self.config.max_daily_trades {
            return Err(RiskRejection {
                rule: RiskRule::DailyTradeLimit,
                reason: format!("{} fills in the last 24h", self.recent_fills.len()),
            });
        }

        // 6. Correlation haircut.
        if !self.correlations.is_empty() {
            let factor = self
                .correlations
                .size_factor(&intent.symbol, &view.equity_weights());
            quantity *= factor;
        }

        // 7. Venue capability: refuse or translate unsupported order shapes.
        let (kind, time_in_force, limit_price) = if capabilities.supports_kind(OrderKind::Market) {
            (OrderKind::Market, TimeInForce::ImmediateOrCancel, None)
        } else if capabilities.supports_kind(OrderKind::Limit) {
            // Market ≡ IOC limit crossing far into the book.
            let aggressive = match side {
                Side::Buy => price * (Decimal::ONE + FAR_BOOK_AGGRESSION),
                Side::Sell => price * (Decimal::ONE - FAR_BOOK_AGGRESSION),
            };
            (
                OrderKind::Limit,
                TimeInForce::ImmediateOrCancel,
                Some(aggressive),
            )
        } else {
            return Err(RiskRejection {
                rule: RiskRule::Capability,
                reason: "venue supports neither market nor limit orders".to_string(),
            });
        };

        Ok(ApprovedOrder {
            symbol: intent.symbol.clone(),
            side,
            kind,
            time_in_force,
            price: limit_price,
            quantity,
            stop_loss: Some(stop_loss),
            take_profit: Some(take_profit),
            intent: intent.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(action: SignalAction, price: Decimal) -> TradeIntent {
        TradeIntent {
            symbol: "BTC/USDT".parse().unwrap(),
            action,
            strength: Decimal::ONE,
            quantity: Decimal::ZERO,
            target_price: Some(price),
            stop_loss: None,
            take_profit: None,
            originating_signals: vec![],
        }
    }

    fn capabilities() -> Capabilities {
        Capabilities {
            order_kinds: vec![OrderKind::Market, OrderKind::Limit],
            time_in_force: vec![
                TimeInForce::GoodTilCancelled,
                TimeInForce::ImmediateOrCancel,
            ],
            client_id_lookup: true,
            user_stream: true,
        }
    }

    fn view(equity: Decimal) -> PortfolioView {
        PortfolioView {
            equity,
            positions: vec![],
        }
    }

    #[test]
    fn test_kill_switch_rejects_everything() {
        let mut gate = RiskGate::new(RiskConfig::default(), dec!(10000));
        gate.kill_switch().engage();

        let rejection = gate
            .check(
                &intent(SignalAction::Buy, dec!(20000)),
                &view(dec!(10000)),
                &capabilities(),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(rejection.rule, RiskRule::KillSwitch);
        assert!(matches!(
            ExchangeError::from(rejection),
            ExchangeError::KillSwitch
        ));
    }

    #[test]
    fn test_drawdown_trip_rejects_new_intents() {
        // Peak equity 10_000, current 9_000, limit 5%.
        let config = RiskConfig {
            max_drawdown: dec!(0.05),
            ..RiskConfig::default()
        };
        let mut gate = RiskGate::new(config, dec!(10000));
        gate.update_equity(dec!(9000));

        let rejection = gate
            .check(
                &intent(SignalAction::Buy, dec!(20000)),
                &view(dec!(9000)),
                &capabilities(),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(rejection.rule, RiskRule::Drawdown);
    }

    #[test]
    fn test_approved_size_respects_concentration_cap() {
        // Soundness: approved post-fill notional never exceeds the cap.
        let config = RiskConfig {
            max_position_size: dec!(0.1),
            max_risk_per_trade: dec!(0.05),
            stop_loss_pct: dec!(0.001),
            ..RiskConfig::default()
        };
        for equity in [dec!(5000), dec!(10000), dec!(50000)] {
            let mut gate = RiskGate::new(config.clone(), equity);
            let approved = gate
                .check(
                    &intent(SignalAction::Buy, dec!(100)),
                    &view(equity),
                    &capabilities(),
                    Utc::now(),
                )
                .unwrap();
            assert!(
                approved.quantity * dec!(100) <= equity * config.max_position_size,
                "equity={equity} quantity={}",
                approved.quantity
            );
        }
    }

    #[test]
    fn test_existing_position_at_cap_rejected() {
        let config = RiskConfig {
            max_position_size: dec!(0.1),
            ..RiskConfig::default()
        };
        let mut gate = RiskGate::new(config, dec!(10000));
        let view = PortfolioView {
            equity: dec!(10000),
            positions: vec![PositionView {
                symbol: "BTC/USDT".parse().unwrap(),
                notional: dec!(1000),
            }],
        };

        let rejection = gate
            .check(
                &intent(SignalAction::Buy, dec!(20000)),
                &view,
                &capabilities(),
                Utc::now(),
            )
            .unwrap_err();
        assert_eq!(rejection.rule, RiskRule::Concentration);
    }

    #[test]
    fn test_daily_trade_budget() {
        let config = RiskConfig {
            max_daily_trades: 2,
            ..RiskConfig::default()
        };
        let mut gate = RiskGate::new(config, dec!(10000));
        let now = Utc::now();
        gate.record_fill(now - TimeDelta::hours(1));
        gate.record_fill(now - TimeDelta::minutes(30));

        let rejection = gate
            .check(
                &intent(SignalAction::Buy, dec!(20000)),
                &view(dec!(10000)),
                &capabilities(),
                now,
            )
            .unwrap_err();
        assert_eq!(rejection.rule, RiskRule::DailyTradeLimit);

        // Fills older than 24h age out of the window.
        let mut gate = RiskGate::new(
            RiskConfig {
                max_daily_trades: 2,
                ..RiskConfig::default()
            },
            dec!(10000),
        );
        gate.record_fill(now - TimeDelta::hours(30));
        gate.record_fill(now - TimeDelta::minutes(30));
        assert!(
            gate.check(
                &intent(SignalAction::Buy, dec!(20000)),
                &view(dec!(10000)),
                &capabilities(),
                now,
            )
            .is_ok()
        );
    }

    #[test]
    fn test_correlation_haircut_shrinks_size() {
        let mut gate = RiskGate::new(RiskConfig::default(), dec!(10000));
        let baseline = gate
            .check(
                &intent(SignalAction::Buy, dec!(100)),
                &view(dec!(10000)),
                &capabilities(),
                Utc::now(),
            )
            .unwrap()
            .quantity;

        let mut correlations = CorrelationMatrix::new();
        correlations.set(
            "BTC/USDT".parse().unwrap(),
            "ETH/USDT".parse().unwrap(),
            dec!(0.8),
        );
        gate.set_correlations(correlations);
        let correlated_view = PortfolioView {
            equity: dec!(10000),
            positions: vec![PositionView {
                symbol: "ETH/USDT".parse().unwrap(),
                notional: dec!(2000),
            }],
        };
        let haircut = gate
            .check(
                &intent(SignalAction::Buy, dec!(100)),
                &correlated_view,
                &capabilities(),
                Utc::now(),
            )
            .unwrap()
            .quantity;
        // 1 - 0.5 * 0.8
        assert_eq!(haircut, baseline * dec!(0.6));
    }

    #[test]
    fn test_market_translated_to_ioc_limit_when_unsupported() {
        let mut gate = RiskGate::new(RiskConfig::default(), dec!(10000));
        let limit_only = Capabilities {
            order_kinds: vec![OrderKind::Limit],
            time_in_force: vec![TimeInForce::ImmediateOrCancel],
            client_id_lookup: false,
            user_stream: false,
        };

        let approved = gate
            .check(
                &intent(SignalAction::Buy, dec!(100)),
                &view(dec!(10000)),
                &limit_only,
                Utc::now(),
            )
            .unwrap();
        assert_eq!(approved.kind, OrderKind::Limit);
        assert_eq!(approved.time_in_force, TimeInForce::ImmediateOrCancel);
        assert_eq!(approved.price, Some(dec!(105)));
    }

    #[test]
    fn test_default_stops_attached() {
        let config = RiskConfig {
            stop_loss_pct: dec!(0.02),
            take_profit_pct: dec!(0.04),
            ..RiskConfig::default()
        };
        let mut gate = RiskGate::new(config, dec!(10000));
        let approved = gate
            .check(
                &intent(SignalAction::Buy, dec!(100)),
                &view(dec!(10000)),
                &capabilities(),
                Utc::now(),
            )
            .unwrap();
        assert_eq!(approved.stop_loss, Some(dec!(98.00)));
        assert_eq!(approved.take_profit, Some(dec!(104.00)));
    }
}
