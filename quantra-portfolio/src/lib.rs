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

//! # Quantra-Portfolio
//! The authoritative record of balances, positions and P&L.
//!
//! All mutation is funnelled through a single owner task consuming a command channel
//! (see [`PortfolioHandle`]); readers receive consistent snapshots over oneshot
//! replies. Fills are the only events that move balances and positions.

use chrono::{DateTime, Utc};
use quantra_execution::{balance::AssetBalance, balance::Balance, trade::Fill};
use quantra_instrument::{Side, asset::AssetName, symbol::Symbol};
use quantra_integration::error::ExchangeError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// Position state and VWAP/reduction math.
pub mod position;

/// JSON snapshot persistence with atomic writes and backup rotation.
pub mod snapshot;

use position::Position;
use snapshot::{PortfolioSnapshot, SnapshotStore};

/// One executed trade retained in the log.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TradeRecord {
    pub symbol: Symbol,
    pub side: Side,
    pub size: Decimal,
    pub price: Decimal,
    pub time: DateTime<Utc>,
    /// Realised P&L this trade produced (zero for entries).
    pub pnl: Decimal,
    pub fee: Decimal,
}

/// Effect of applying one fill.
#[derive(Debug, Clone, PartialEq)]
pub struct FillOutcome {
    pub realized_pnl_delta: Decimal,
    pub cash_delta: Decimal,
    pub position_closed: bool,
    pub equity: Decimal,
}

/// Read-only performance summary.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSummary {
    pub equity: Decimal,
    pub cash: Decimal,
    pub realized_pnl: Decimal,
    pub unrealized_pnl: Decimal,
    pub total_return_pct: Decimal,
    pub win_rate_pct: Decimal,
    pub drawdown: Decimal,
    pub peak_equity: Decimal,
    pub active_positions: usize,
    pub total_trades: usize,
    pub positions: Vec<Position>,
    pub prices: HashMap<Symbol, Decimal>,
}

/// Authoritative balances/positions state. Not shared: exactly one owner task holds
/// a `Portfolio` and serialises every mutation (see [`spawn`]).
#[derive(Debug)]
pub struct Portfolio {
    base_currency: AssetName,
    balances: HashMap<AssetName, Balance>,
    positions: HashMap<Symbol, Position>,
    prices: HashMap<Symbol, Decimal>,
    trades: Vec<TradeRecord>,
    initial_balance: Decimal,
    peak_balance: Decimal,
}

impl Portfolio {
    /// Fresh portfolio holding `initial_cash` of `base_currency`.
    pub fn new(base_currency: AssetName, initial_cash: Decimal) -> Self {
        let mut balances = HashMap::new();
        balances.insert(base_currency.clone(), Balance::free_only(initial_cash));
        Self {
            base_currency,
            balances,
            positions: HashMap::new(),
            prices: HashMap::new(),
            trades: Vec::new(),
            initial_balance: initial_cash,
            peak_balance: initial_cash,
        }
    }

    /// Restore from a persisted snapshot.
    pub fn from_snapshot(snapshot: PortfolioSnapshot) -> Self {
        Self {
            base_currency: snapshot.base_currency,
            balances: snapshot.balances,
            positions: snapshot.positions,
            prices: HashMap::new(),
            trades: snapshot.trades,
            initial_balance: snapshot.initial_balance,
            peak_balance: snapshot.peak_balance,
        }
    }

    pub fn to_snapshot(&self) -> PortfolioSnapshot {
        PortfolioSnapshot {
            schema_version: 1,
            base_currency: self.base_currency.clone(),
            balances: self.balances.clone(),
            positions: self.positions.clone(),
            trades: self.trades.clone(),
            initial_balance: self.initial_balance,
            peak_balance: self.peak_balance,
        }
    }

    fn cash(&self) -> Decimal {
        self.balances
            .get(&self.base_currency)
            .map(Balance::total)
            .unwrap_or_default()
    }

    fn mark_price(&self, position: &Position) -> Decimal {
        self.prices
            .get(&position.symbol)
            .copied()
            .unwrap_or(position.entry_price)
    }

    /// Equity: cash plus signed market value of open positions.
    pub fn equity(&self) -> Decimal {
        let positions: Decimal = self
            .positions
            .values()
            .map(|position| {
                let value = position.notional(self.mark_price(position));
                match position.side {
                    Side::Buy => value,
                    Side::Sell => -value,
                }
            })
            .sum();
        self.cash() + positions
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        self.positions
            .values()
            .map(|position| position.unrealized_pnl)
            .sum()
    }

    pub fn realized_pnl(&self) -> Decimal {
        self.trades.iter().map(|trade| trade.pnl).sum()
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.values()
    }

    /// Apply a fill: mutate cash, maintain the position book (VWAP increase, reduce,
    /// flip), append the trade log and ratchet peak equity.
    pub fn apply_fill(&mut self, fill: &Fill) -> FillOutcome {
        let outcome = self.apply_trade(
            fill.symbol.clone(),
            fill.side,
            fill.quantity,
            fill.price,
            fee_in_quote(fill),
            fill.time,
        );
        debug!(
            symbol = %fill.symbol,
            side = %fill.side,
            quantity = %fill.quantity,
            price = %fill.price,
            realized = %outcome.realized_pnl_delta,
            "applied fill"
        );
        outcome
    }

    fn apply_trade(
        &mut self,
        symbol: Symbol,
        side: Side,
        size: Decimal,
        price: Decimal,
        fee: Decimal,
        time: DateTime<Utc>,
    ) -> FillOutcome {
        // Cash flow first: buys consume quote currency, sells produce it.
        let notional = size * price;
        let cash_delta = match side {
            Side::Buy => -notional - fee,
            Side::Sell => notional - fee,
        };
        let cash = self
            .balances
            .entry(self.base_currency.clone())
            .or_default();
        cash.free += cash_delta;

        let mut realized = Decimal::ZERO;
        let mut position_closed = false;

        match self.positions.get_mut(&symbol) {
            Some(position) if position.side == side => {
                position.increase(size, price);
            }
            Some(position) => {
                let delta = position.reduce(size, price);
                realized = delta.realized_pnl;
                if position.is_closed() {
                    self.positions.remove(&symbol);
                    position_closed = true;
                }
                if !delta.flipped_size.is_zero() {
                    self.positions.insert(
                        symbol.clone(),
                        Position::open(symbol.clone(), side, delta.flipped_size, price, time),
                    );
                }
            }
            None => {
                self.positions.insert(
                    symbol.clone(),
                    Position::open(symbol.clone(), side, size, price, time),
                );
            }
        }

        self.prices.insert(symbol.clone(), price);
        self.trades.push(TradeRecord {
            symbol,
            side,
            size,
            price,
            time,
            pnl: realized,
            fee,
        });

        let equity = self.equity();
        if equity > self.peak_balance {
            self.peak_balance = equity;
        }

        FillOutcome {
            realized_pnl_delta: realized,
            cash_delta,
            position_closed,
            equity,
        }
    }

    /// Mark open positions against fresh prices, returning the unrealised P&L delta.
    pub fn update_prices(&mut self, prices: &HashMap<Symbol, Decimal>) -> Decimal {
        let mut delta = Decimal::ZERO;
        for (symbol, price) in prices {
            self.prices.insert(symbol.clone(), *price);
            if let Some(position) = self.positions.get_mut(symbol) {
                delta += position.update_price(*price);
            }
        }
        let equity = self.equity();
        if equity > self.peak_balance {
            self.peak_balance = equity;
        }
        delta
    }

    /// Open (or extend) a position directly, without an order lifecycle. Used by
    /// paper flows and state repair; live trading only ever opens through fills.
    pub fn open_position(
        &mut self,
        symbol: Symbol,
        side: Side,
        size: Decimal,
        price: Decimal,
    ) -> FillOutcome {
        self.apply_trade(symbol, side, size, price, Decimal::ZERO, Utc::now())
    }

    /// Close the full position at `exit_price`, returning the realised P&L.
    pub fn close_position(
        &mut self,
        symbol: &Symbol,
        exit_price: Decimal,
    ) -> Result<Decimal, ExchangeError> {
        let position = self.positions.get(symbol).ok_or_else(|| {
            ExchangeError::InvalidOrder(format!("no open position for {symbol}"))
        })?;
        let outcome = self.apply_trade(
            symbol.clone(),
            position.side.inverse(),
            position.size,
            exit_price,
            Decimal::ZERO,
            Utc::now(),
        );
        Ok(outcome.realized_pnl_delta)
    }

    /// Quantity risking `risk_amount` with a stop `stop_loss_pct` under the entry.
    pub fn calculate_position_size(
        &self,
        price: Decimal,
        risk_amount: Decimal,
        stop_loss_pct: Decimal,
    ) -> Decimal {
        let risk_per_unit = price * stop_loss_pct;
        if risk_per_unit.is_zero() {
            return Decimal::ZERO;
        }
        risk_amount / risk_per_unit
    }

    /// Move `amount` of an asset from free into the order reservation.
    pub fn reserve(&mut self, asset: &AssetName, amount: Decimal) -> Result<(), ExchangeError> {
        let balance = self.balances.entry(asset.clone()).or_default();
        balance.reserve(amount).map_err(|free| {
            ExchangeError::InvalidOrder(format!(
                "insufficient {asset}: requested {amount}, free {free}"
            ))
        })
    }

    /// Release an order reservation back into free balance.
    pub fn release(&mut self, asset: &AssetName, amount: Decimal) {
        if let Some(balance) = self.balances.get_mut(asset) {
            balance.release(amount);
        }
    }

    /// Reconcile against venue-reported balances; the venue is authoritative for
    /// balances while persisted state remains authoritative for positions.
    pub fn reconcile_balances(&mut self, venue_balances: Vec<AssetBalance>) -> Vec<String> {
        let mut discrepancies = Vec::new();
        for AssetBalance { asset, balance } in venue_balances {
            match self.balances.get(&asset) {
                Some(local) if local.total() != balance.total() => {
                    discrepancies.push(format!(
                        "{asset}: local total {local_total} != venue total {venue_total}",
                        local_total = local.total(),
                        venue_total = balance.total()
                    ));
                    self.balances.insert(asset, balance);
                }
                Some(_) => {}
                None => {
                    discrepancies.push(format!(
                        "{asset}: missing locally, venue reports {}",
                        balance.total()
                    ));
                    self.balances.insert(asset, balance);
                }
            }
        }
        for discrepancy in &discrepancies {
            warn!(%discrepancy, "balance reconciliation discrepancy");
        }
        discrepancies
    }

    pub fn summary(&self) -> PortfolioSummary {
        let equity = self.equity();
        let closed: Vec<&TradeRecord> = self
            .trades
            .iter()
            .filter(|trade| !trade.pnl.is_zero())
            .collect();
        let winners = closed.iter().filter(|trade| trade.pnl > Decimal::ZERO).count();
        let win_rate_pct = if closed.is_empty() {
            Decimal::ZERO
        } else {
            Decimal::from(winners as u64) / Decimal::from(closed.len() as u64)
                * Decimal::from(100u64)
        };
        let total_return_pct = if self.initial_balance.is_zero() {
            Decimal::ZERO
        } else {
            (equity - self.initial_balance) / self.initial_balance * Decimal::from(100u64)
        };
        let drawdown = if self.peak_balance.is_zero() {
            Decimal::ZERO
        } else {
            ((self.peak_balance - equity) / self.peak_balance).max(Decimal::ZERO)
        };

        PortfolioSummary {
            equity,
            cash: self.cash(),
            realized_pnl: self.realized_pnl(),
            unrealized_pnl: self.unrealized_pnl(),
            total_return_pct,
            win_rate_pct,
            drawdown,
            peak_equity: self.peak_balance,
            active_positions: self.positions.len(),
            total_trades: self.trades.len(),
            positions: self.positions.values().cloned().collect(),
            prices: self.prices.clone(),
        }
    }
}

fn fee_in_quote(fill: &Fill) -> Decimal {
    match &fill.fee_asset {
        Some(asset) if *asset == fill.symbol.base() => fill.fee * fill.price,
        _ => fill.fee,
    }
}

enum PortfolioCommand {
    ApplyFill {
        fill: Box<Fill>,
        reply: oneshot::Sender<FillOutcome>,
    },
    UpdatePrices {
        prices: HashMap<Symbol, Decimal>,
        reply: oneshot::Sender<Decimal>,
    },
    ClosePosition {
        symbol: Symbol,
        exit_price: Decimal,
        reply: oneshot::Sender<Result<Decimal, ExchangeError>>,
    },
    Reserve {
        asset: AssetName,
        amount: Decimal,
        reply: oneshot::Sender<Result<(), ExchangeError>>,
    },
    Release {
        asset: AssetName,
        amount: Decimal,
        reply: oneshot::Sender<()>,
    },
    ReconcileBalances {
        balances: Vec<AssetBalance>,
        reply: oneshot::Sender<Vec<String>>,
    },
    Summary {
        reply: oneshot::Sender<PortfolioSummary>,
    },
    Save {
        reply: oneshot::Sender<Result<(), ExchangeError>>,
    },
}

impl std::fmt::Debug for PortfolioCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PortfolioCommand::ApplyFill { .. } => "ApplyFill",
            PortfolioCommand::UpdatePrices { .. } => "UpdatePrices",
            PortfolioCommand::ClosePosition { .. } => "ClosePosition",
            PortfolioCommand::Reserve { .. } => "Reserve",
            PortfolioCommand::Release { .. } => "Release",
            PortfolioCommand::ReconcileBalances { .. } => "ReconcileBalances",
            PortfolioCommand::Summary { .. } => "Summary",
            PortfolioCommand::Save { .. } => "Save",
        };
        f.write_str(name)
    }
}

/// Cloneable front of the single-writer portfolio task.
#[derive(Debug, Clone)]
pub struct PortfolioHandle {
    tx: mpsc::UnboundedSender<PortfolioCommand>,
}

/// Spawn the owner task. Dropping every handle stops the task after a final flush.
pub fn spawn(
    portfolio: Portfolio,
    store: Option<SnapshotStore>,
) -> (PortfolioHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(portfolio, store, rx));
    (PortfolioHandle { tx }, task)
}

async fn run(
    mut portfolio: Portfolio,
    store: Option<SnapshotStore>,
    mut rx: mpsc::UnboundedReceiver<PortfolioCommand>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            PortfolioCommand::ApplyFill { fill, reply } => {
                let _ = reply.send(portfolio.apply_fill(&fill));
            }
            PortfolioCommand::UpdatePrices { prices, reply } => {
                let _ = reply.send(portfolio.update_prices(&prices));
            }
            PortfolioCommand::ClosePosition {
                symbol,
                exit_price,
                reply,
            } => {
                let _ = reply.send(portfolio.close_position(&symbol, exit_price));
            }
            PortfolioCommand::Reserve {
                asset,
                amount,
                reply,
            } => {
                let _ = reply.send(portfolio.reserve(&asset, amount));
            }
            PortfolioCommand::Release {
                asset,
                amount,
                reply,
            } => {
                portfolio.release(&asset, amount);
                let _ = reply.send(());
            }
            PortfolioCommand::ReconcileBalances { balances, reply } => {
                let _ = reply.send(portfolio.reconcile_balances(balances));
            }
            PortfolioCommand::Summary { reply } => {
                let _ = reply.send(portfolio.summary());
            }
            PortfolioCommand::Save { reply } => {
                let _ = reply.send(save(&portfolio, store.as_ref()));
            }
        }
    }

    // Final flush on shutdown.
    if let Err(error) = save(&portfolio, store.as_ref()) {
        error!(?error, "final portfolio flush failed");
    }
    info!("portfolio task stopped");
}

fn save(portfolio: &Portfolio, store: Option<&SnapshotStore>) -> Result<(), ExchangeError> {
    match store {
        Some(store) => store.save(&portfolio.to_snapshot()),
        None => Ok(()),
    }
}

impl PortfolioHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> PortfolioCommand,
    ) -> Result<T, ExchangeError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .map_err(|_| ExchangeError::Internal("portfolio task stopped".to_string()))?;
        rx.await
            .map_err(|_| ExchangeError::Internal("portfolio task dropped reply".to_string()))
    }

    pub async fn apply_fill(&self, fill: Fill) -> Result<FillOutcome, ExchangeError> {
        self.request(|reply| PortfolioCommand::ApplyFill {
            fill: Box::new(fill),
            reply,
        })
        .await
    }

    pub async fn update_prices(
        &self,
        prices: HashMap<Symbol, Decimal>,
    ) -> Result<Decimal, ExchangeError> {
        self.request(|reply| PortfolioCommand::UpdatePrices { prices, reply })
            .await
    }

    pub async fn close_position(
        &self,
        symbol: Symbol,
        exit_price: Decimal,
    ) -> Result<Decimal, ExchangeError> {
        self.request(|reply| PortfolioCommand::ClosePosition {
            symbol,
            exit_price,
            reply,
        })
        .await?
    }

    pub async fn reserve(&self, asset: AssetName, amount: Decimal) -> Result<(), ExchangeError> {
        self.request(|reply| PortfolioCommand::Reserve {
            asset,
            amount,
            reply,
        })
        .await?
    }

    pub async fn release(&self, asset: AssetName, amount: Decimal) -> Result<(), ExchangeError> {
        self.request(|reply| PortfolioCommand::Release {
            asset,
            amount,
            reply,
        })
        .await
    }

    pub async fn reconcile_balances(
        &self,
        balances: Vec<AssetBalance>,
    ) -> Result<Vec<String>, ExchangeError> {
        self.request(|reply| PortfolioCommand::ReconcileBalances { balances, reply })
            .await
    }

    pub async fn summary(&self) -> Result<PortfolioSummary, ExchangeError> {
        self.request(|reply| PortfolioCommand::Summary { reply }).await
    }

    pub async fn save(&self) -> Result<(), ExchangeError> {
        self.request(|reply| PortfolioCommand::Save { reply }).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantra_execution::order::{ClientOrderId, OrderId};
    use quantra_instrument::exchange::ExchangeId;
    use rust_decimal_macros::dec;

    fn fill(side: Side, quantity: Decimal, price: Decimal) -> Fill {
        Fill::new(
            ExchangeId::Binance,
            "BTC/USDT".parse().unwrap(),
            OrderId::new("order-1"),
            Some(ClientOrderId::random()),
            "trade-1".to_string(),
            side,
            price,
            quantity,
            Decimal::ZERO,
            None,
            Utc::now(),
        )
    }

    fn portfolio() -> Portfolio {
        Portfolio::new(AssetName::new("USDT"), dec!(10000))
    }

    #[test]
    fn test_open_and_close_at_profit() {
        // Initial cash 10_000, open 0.1 long at 20_000, mark 21_000, close.
        let mut portfolio = portfolio();
        portfolio.apply_fill(&fill(Side::Buy, dec!(0.1), dec!(20000)));
        assert_eq!(portfolio.cash(), dec!(8000));
        assert_eq!(portfolio.equity(), dec!(10000));

        let mut prices = HashMap::new();
        prices.insert("BTC/USDT".parse().unwrap(), dec!(21000));
        let unrealized_delta = portfolio.update_prices(&prices);
        assert_eq!(unrealized_delta, dec!(100.0));
        assert_eq!(portfolio.equity(), dec!(10100.0));

        let outcome = portfolio.apply_fill(&fill(Side::Sell, dec!(0.1), dec!(21000)));
        assert_eq!(outcome.realized_pnl_delta, dec!(100.0));
        assert!(outcome.position_closed);
        assert_eq!(portfolio.cash(), dec!(10100.0));
        assert_eq!(portfolio.positions.len(), 0);
    }

    #[test]
    fn test_realized_matches_per_position_accounting() {
        // Sum of realised deltas equals (exit - entry) * size * side_sign per closed
        // position, and total balance is conserved (zero fees).
        let mut portfolio = portfolio();
        let fills = [
            (Side::Buy, dec!(0.2), dec!(10000)),
            (Side::Buy, dec!(0.2), dec!(11000)),
            (Side::Sell, dec!(0.4), dec!(12000)),
            (Side::Sell, dec!(1), dec!(100)),
            (Side::Buy, dec!(1), dec!(90)),
        ];
        let mut realized_total = Decimal::ZERO;
        for (side, quantity, price) in fills {
            realized_total += portfolio
                .apply_fill(&fill(side, quantity, price))
                .realized_pnl_delta;
        }
        // Long leg: 0.4 * (12000 - 10500) = 600; short leg: 1 * (100 - 90) = 10.
        assert_eq!(realized_total, dec!(610.0));
        assert_eq!(portfolio.equity(), dec!(10610.0));
        assert_eq!(portfolio.realized_pnl(), dec!(610.0));
    }

    #[test]
    fn test_no_intermediate_negative_size_or_flip_loss() {
        let mut portfolio = portfolio();
        portfolio.apply_fill(&fill(Side::Buy, dec!(1), dec!(100)));
        // Over-sell flips the book into a short with the excess.
        let outcome = portfolio.apply_fill(&fill(Side::Sell, dec!(1.5), dec!(110)));
        assert_eq!(outcome.realized_pnl_delta, dec!(10));

        let position = portfolio.positions.values().next().unwrap();
        assert_eq!(position.side, Side::Sell);
        assert_eq!(position.size, dec!(0.5));
        assert!(position.size > Decimal::ZERO);
        assert_eq!(position.entry_price, dec!(110));
    }

    #[test]
    fn test_fees_reduce_cash_only() {
        let mut portfolio = portfolio();
        let mut with_fee = fill(Side::Buy, dec!(0.1), dec!(20000));
        with_fee.fee = dec!(2);
        portfolio.apply_fill(&with_fee);
        assert_eq!(portfolio.cash(), dec!(7998));
        // Position book unaffected by the fee.
        assert_eq!(
            portfolio.positions.values().next().unwrap().size,
            dec!(0.1)
        );
    }

    #[test]
    fn test_base_denominated_fee_converted() {
        let mut portfolio = portfolio();
        let mut with_fee = fill(Side::Buy, dec!(0.1), dec!(20000));
        with_fee.fee = dec!(0.0001);
        with_fee.fee_asset = Some(AssetName::new("BTC"));
        let outcome = portfolio.apply_fill(&with_fee);
        // 0.0001 BTC at 20_000 = 2 USDT on top of the notional.
        assert_eq!(outcome.cash_delta, dec!(-2002.0));
    }

    #[test]
    fn test_reserve_release_conserve_totals() {
        let mut portfolio = portfolio();
        portfolio.reserve(&AssetName::new("USDT"), dec!(4000)).unwrap();
        let balance = portfolio.balances.get(&AssetName::new("USDT")).unwrap();
        assert_eq!(balance.free, dec!(6000));
        assert_eq!(balance.used, dec!(4000));
        assert_eq!(balance.total(), dec!(10000));

        assert!(portfolio.reserve(&AssetName::new("USDT"), dec!(7000)).is_err());
        portfolio.release(&AssetName::new("USDT"), dec!(4000));
        assert_eq!(
            portfolio.balances.get(&AssetName::new("USDT")).unwrap().free,
            dec!(10000)
        );
    }

    #[test]
    fn test_summary_metrics() {
        let mut portfolio = portfolio();
        portfolio.apply_fill(&fill(Side::Buy, dec!(0.1), dec!(20000)));
        portfolio.apply_fill(&fill(Side::Sell, dec!(0.1), dec!(21000)));
        portfolio.apply_fill(&fill(Side::Buy, dec!(0.1), dec!(21000)));
        portfolio.apply_fill(&fill(Side::Sell, dec!(0.1), dec!(20000)));

        let summary = portfolio.summary();
        assert_eq!(summary.realized_pnl, dec!(0.0));
        assert_eq!(summary.win_rate_pct, dec!(50));
        assert_eq!(summary.total_trades, 4);
        assert_eq!(summary.active_positions, 0);
        assert_eq!(summary.total_return_pct, dec!(0.0));
    }

    #[test]
    fn test_peak_equity_ratchets() {
        let mut portfolio = portfolio();
        portfolio.apply_fill(&fill(Side::Buy, dec!(0.1), dec!(20000)));
        let mut prices = HashMap::new();
        prices.insert("BTC/USDT".parse::<Symbol>().unwrap(), dec!(25000));
        portfolio.update_prices(&prices);
        assert_eq!(portfolio.peak_balance, dec!(10500.0));

        prices.insert("BTC/USDT".parse::<Symbol>().unwrap(), dec!(18000));
        portfolio.update_prices(&prices);
        assert_eq!(portfolio.peak_balance, dec!(10500.0));
        assert!(portfolio.summary().drawdown > Decimal::ZERO);
    }

    #[test]
    fn test_open_then_close_position_directly() {
        let mut portfolio = portfolio();
        let symbol: Symbol = "BTC/USDT".parse().unwrap();
        portfolio.open_position(symbol.clone(), Side::Buy, dec!(0.1), dec!(20000));
        assert_eq!(portfolio.positions.len(), 1);

        let realized = portfolio.close_position(&symbol, dec!(21000)).unwrap();
        assert_eq!(realized, dec!(100.0));
        assert!(portfolio.positions.is_empty());

        // Closing again is an error, not a silent no-op.
        assert!(portfolio.close_position(&symbol, dec!(21000)).is_err());
    }

    #[test]
    fn test_calculate_position_size() {
        let portfolio = portfolio();
        // Risk 100 with a 2% stop at price 20_000: 100 / 400 = 0.25.
        assert_eq!(
            portfolio.calculate_position_size(dec!(20000), dec!(100), dec!(0.02)),
            dec!(0.25)
        );
    }

    #[test]
    fn test_reconcile_prefers_venue_balances() {
        let mut portfolio = portfolio();
        let discrepancies = portfolio.reconcile_balances(vec![AssetBalance::new(
            AssetName::new("USDT"),
            Balance::free_only(dec!(9500)),
        )]);
        assert_eq!(discrepancies.len(), 1);
        assert_eq!(portfolio.cash(), dec!(9500));
    }

    #[tokio::test]
    async fn test_single_writer_handle_round_trip() {
        let (handle, task) = spawn(portfolio(), None);

        let outcome = handle
            .apply_fill(fill(Side::Buy, dec!(0.1), dec!(20000)))
            .await
            .unwrap();
        assert_eq!(outcome.cash_delta, dec!(-2000));

        let summary = handle.summary().await.unwrap();
        assert_eq!(summary.active_positions, 1);

        drop(handle);
        task.await.unwrap();
    }
}
