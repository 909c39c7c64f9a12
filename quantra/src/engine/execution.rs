use chrono::{DateTime, TimeDelta, Utc};
use quantra_data::account::{AccountEvent, AccountEventKind};
use quantra_execution::{
    client::ExchangeApi,
    order::{ClientOrderId, Order, OrderId, OrderRequest, OrderStatus},
    trade::Fill,
};
use quantra_instrument::{Side, asset::AssetName, symbol::Symbol};
use quantra_integration::error::ExchangeError;
use quantra_portfolio::{FillOutcome, PortfolioHandle};
use quantra_risk::ApprovedOrder;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Execution behaviour knobs.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Hard gate: false short-circuits every placement into a `DRY-` acknowledgement.
    pub live_trading: bool,
    /// How long to poll for the true outcome of an uncertain placement.
    pub reconcile_timeout: Duration,
    /// Poll cadence during reconciliation.
    pub reconcile_poll: Duration,
    /// How long fill reconciliation stays alive after a cancel acknowledgement.
    pub cancel_fill_linger: TimeDelta,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            live_trading: false,
            reconcile_timeout: Duration::from_secs(30),
            reconcile_poll: Duration::from_secs(2),
            cancel_fill_linger: TimeDelta::seconds(5),
        }
    }
}

/// One not-yet-acknowledged placement, persisted before any wire traffic so a crash
/// or read timeout can be reconciled by client-id lookup instead of a blind re-send.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OutboxEntry {
    pub client_id: String,
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Persistent intent→client-id outbox.
#[derive(Debug)]
pub struct Outbox {
    path: Option<PathBuf>,
    entries: HashMap<String, OutboxEntry>,
}

impl Outbox {
    /// In-memory outbox for tests and dry runs without a state directory.
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            entries: HashMap::new(),
        }
    }

    /// Open a persistent outbox, surfacing entries left over by a previous run.
    pub fn open(path: PathBuf) -> Result<Self, ExchangeError> {
        let entries = match std::fs::read(&path) {
            Ok(payload) => serde_json::from_slice::<Vec<OutboxEntry>>(&payload)
                .map_err(|err| ExchangeError::StateCorrupt(format!("outbox parse: {err}")))?
                .into_iter()
                .map(|entry| (entry.client_id.clone(), entry))
                .collect(),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(err) => {
                return Err(ExchangeError::Internal(format!("outbox read: {err}")));
            }
        };
        let outbox = Self {
            path: Some(path),
            entries,
        };
        for entry in outbox.entries.values() {
            warn!(
                client_id = %entry.client_id,
                symbol = %entry.symbol,
                "unresolved placement found in outbox - reconcile before trading"
            );
        }
        Ok(outbox)
    }

    pub fn pending(&self) -> impl Iterator<Item = &OutboxEntry> {
        self.entries.values()
    }

    fn record(&mut self, entry: OutboxEntry) -> Result<(), ExchangeError> {
        self.entries.insert(entry.client_id.clone(), entry);
        self.persist()
    }

    fn clear(&mut self, client_id: &str) -> Result<(), ExchangeError> {
        self.entries.remove(client_id);
        self.persist()
    }

    fn persist(&self) -> Result<(), ExchangeError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let entries: Vec<&OutboxEntry> = self.entries.values().collect();
        let payload = serde_json::to_vec_pretty(&entries)
            .map_err(|err| ExchangeError::Internal(format!("outbox serialize: {err}")))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, payload)
            .map_err(|err| ExchangeError::Internal(format!("outbox write: {err}")))?;
        std::fs::rename(&tmp, path)
            .map_err(|err| ExchangeError::Internal(format!("outbox rename: {err}")))
    }
}

#[derive(Debug)]
struct Reservation {
    asset: AssetName,
    remaining: Decimal,
    per_unit: Decimal,
}

/// Translates approved intents into venue orders and reconciles their lifecycle.
///
/// Owns orders until they reach a terminal state; balances and positions stay with
/// the portfolio task, mutated only through its handle.
pub struct ExecutionEngine {
    adapter: Arc<dyn ExchangeApi>,
    portfolio: PortfolioHandle,
    outbox: Outbox,
    config: ExecutionConfig,
    cancel: CancellationToken,
    open_orders: HashMap<OrderId, Order>,
    reservations: HashMap<OrderId, Reservation>,
    terminal_since: HashMap<OrderId, DateTime<Utc>>,
}

impl std::fmt::Debug for ExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionEngine")
            .field("exchange", &self.adapter.id())
            .field("open_orders", &self.open_orders.len())
            .finish_non_exhaustive()
    }
}

impl ExecutionEngine {
    pub fn new(
        adapter: Arc<dyn ExchangeApi>,
        portfolio: PortfolioHandle,
        outbox: Outbox,
        config: ExecutionConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adapter,
            portfolio,
            outbox,
            config,
            cancel,
            open_orders: HashMap::new(),
            reservations: HashMap::new(),
            terminal_since: HashMap::new(),
        }
    }

    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.open_orders.values()
    }

    pub fn has_in_flight(&self) -> bool {
        self.open_orders
            .values()
            .any(|order| !order.is_terminal())
    }

    /// Place an approved order. At-most-once: an unknown outcome is reconciled by
    /// lookup, never by blind re-send.
    pub async fn execute(&mut self, approved: &ApprovedOrder) -> Result<Order, ExchangeError> {
        if approved.quantity <= Decimal::ZERO {
            return Err(ExchangeError::InvalidOrder(
                "zero-quantity intent".to_string(),
            ));
        }

        let client_id = ClientOrderId::random();
        self.outbox.record(OutboxEntry {
            client_id: client_id.to_string(),
            symbol: approved.symbol.clone(),
            side: approved.side,
            quantity: approved.quantity,
            created_at: Utc::now(),
        })?;

        let request = OrderRequest {
            symbol: approved.symbol.clone(),
            side: approved.side,
            kind: approved.kind,
            quantity: approved.quantity,
            price: approved.price,
            time_in_force: approved.time_in_force,
            client_id: client_id.clone(),
        };

        if !self.config.live_trading {
            // Dry-run gate: synthetic acknowledgement, no wire traffic, no
            // balance reservation.
            let now = Utc::now();
            let order = Order {
                order_id: OrderId::new(format!("DRY-{client_id}")),
                client_id: Some(client_id.clone()),
                symbol: request.symbol,
                side: request.side,
                kind: request.kind,
                price: request.price,
                quantity: request.quantity,
                filled_quantity: Decimal::ZERO,
                status: OrderStatus::New,
                time_in_force: request.time_in_force,
                created_at: now,
                updated_at: now,
            };
            self.outbox.clear(client_id.as_str())?;
            info!(order_id = %order.order_id, symbol = %order.symbol, "dry-run placement recorded");
            return Ok(order);
        }

        // Reserve before the wire call so a fill can never overdraw: buys hold the
        // quote notional, sells hold the base quantity.
        let reference_price = approved
            .price
            .or(approved.intent.target_price)
            .unwrap_or_default();
        let (asset, amount) = match approved.side {
            Side::Buy => (approved.symbol.quote(), approved.quantity * reference_price),
            Side::Sell => (approved.symbol.base(), approved.quantity),
        };
        if let Err(err) = self.portfolio.reserve(asset.clone(), amount).await {
            self.outbox.clear(client_id.as_str())?;
            return Err(err);
        }

        match self.adapter.create_order(&request).await {
            Ok(order) => {
                self.outbox.clear(client_id.as_str())?;
                self.track(order.clone(), asset, amount);
                info!(order_id = %order.order_id, client_id = %client_id, "placement acknowledged");
                Ok(order)
            }
            Err(ExchangeError::UncertainPlacement { .. }) => {
                self.reconcile_uncertain(&request, asset, amount).await
            }
            Err(err) => {
                self.portfolio.release(asset, amount).await?;
                self.outbox.clear(client_id.as_str())?;
                match &err {
                    ExchangeError::InvalidOrder(reason) => {
                        warn!(%client_id, %reason, "placement permanently rejected");
                    }
                    other => {
                        warn!(%client_id, error = %other, "placement failed before send");
                    }
                }
                Err(err)
            }
        }
    }

    /// Poll the venue for the true outcome of an uncertain placement. If the order is
    /// found it is adopted with the acknowledged id; otherwise the failure is
    /// surfaced to the operator with the outbox entry retained - no duplicate send.
    async fn reconcile_uncertain(
        &mut self,
        request: &OrderRequest,
        asset: AssetName,
        amount: Decimal,
    ) -> Result<Order, ExchangeError> {
        let client_id = request.client_id.to_string();
        let deadline = tokio::time::Instant::now() + self.config.reconcile_timeout;
        warn!(%client_id, "placement outcome unknown - reconciling via order lookup");

        loop {
            let found = self.lookup_by_client_id(&client_id, &request.symbol).await;
            if let Some(order) = found {
                info!(%client_id, order_id = %order.order_id, "uncertain placement adopted");
                self.outbox.clear(&client_id)?;
                self.track(order.clone(), asset, amount);
                return Ok(order);
            }

            if tokio::time::Instant::now() >= deadline {
                self.portfolio.release(asset, amount).await?;
                error!(%client_id, "uncertain placement unresolved - operator action required");
                return Err(ExchangeError::UncertainPlacement { client_id });
            }
            tokio::select! {
                _ = tokio::time::sleep(self.config.reconcile_poll) => {}
                _ = self.cancel.cancelled() => {
                    return Err(ExchangeError::UncertainPlacement { client_id });
                }
            }
        }
    }

    async fn lookup_by_client_id(&self, client_id: &str, symbol: &Symbol) -> Option<Order> {
        if self.adapter.capabilities().client_id_lookup {
            if let Ok(found) = self.adapter.get_order_by_client_id(client_id, symbol).await {
                return found;
            }
        }
        match self.adapter.get_open_orders(Some(symbol)).await {
            Ok(orders) => orders.into_iter().find(|order| {
                order
                    .client_id
                    .as_ref()
                    .is_some_and(|id| id.as_str() == client_id)
            }),
            Err(_) => None,
        }
    }

    fn track(&mut self, order: Order, asset: AssetName, amount: Decimal) {
        let per_unit = if order.quantity.is_zero() {
            Decimal::ZERO
        } else {
            amount / order.quantity
        };
        self.reservations.insert(
            order.order_id.clone(),
            Reservation {
                asset,
                remaining: amount,
                per_unit,
            },
        );
        self.open_orders.insert(order.order_id.clone(), order);
    }

    /// Cancel an order. Idempotent: cancelling an unknown or already-terminal order
    /// is a no-op success. Partial fills racing the cancel keep being applied for
    /// the configured linger window.
    pub async fn cancel(
        &mut self,
        order_id: &OrderId,
        symbol: &Symbol,
    ) -> Result<Option<Order>, ExchangeError> {
        if let Some(order) = self.open_orders.get(order_id)
            && order.is_terminal()
        {
            return Ok(None);
        }

        let cancelled = self.adapter.cancel_order(order_id, symbol).await?;
        if let Some(order) = &cancelled {
            self.apply_order_state(order.order_id.clone(), order.status, order.filled_quantity)
                .await?;
        } else {
            // Venue no-op: locally mark anything we track as cancelled.
            self.apply_order_state(order_id.clone(), OrderStatus::Canceled, Decimal::ZERO)
                .await?;
        }
        Ok(cancelled)
    }

    /// Apply a normalised account event. Fills flow into the portfolio atomically;
    /// order updates maintain local order state and reservations.
    pub async fn on_account_event(
        &mut self,
        event: AccountEvent,
    ) -> Result<Option<FillOutcome>, ExchangeError> {
        match event.kind {
            AccountEventKind::Fill(fill_event) => {
                let fill = Fill::from_event(event.exchange, event.time_exchange, fill_event);
                self.release_for_fill(&fill).await?;
                let outcome = self.portfolio.apply_fill(fill.clone()).await?;
                self.bump_order_fill(&fill);
                Ok(Some(outcome))
            }
            AccountEventKind::OrderUpdate(update) => {
                self.apply_order_state(
                    OrderId::new(&update.order_id),
                    update.status,
                    update.filled_quantity,
                )
                .await?;
                Ok(None)
            }
            // Balance updates are advisory; reconciliation against the venue's REST
            // balances is authoritative.
            AccountEventKind::BalanceUpdate(_) => Ok(None),
        }
    }

    async fn release_for_fill(&mut self, fill: &Fill) -> Result<(), ExchangeError> {
        let Some(reservation) = self.reservations.get_mut(&fill.order_id) else {
            return Ok(());
        };
        let release = (reservation.per_unit * fill.quantity).min(reservation.remaining);
        reservation.remaining -= release;
        let asset = reservation.asset.clone();
        if !release.is_zero() {
            self.portfolio.release(asset, release).await?;
        }
        Ok(())
    }

    fn bump_order_fill(&mut self, fill: &Fill) {
        if let Some(order) = self.open_orders.get_mut(&fill.order_id) {
            let filled = (order.filled_quantity + fill.quantity).min(order.quantity);
            let status = if filled == order.quantity {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            order.apply_update(status, filled, fill.time);
            if order.is_terminal() {
                self.terminal_since.entry(fill.order_id.clone()).or_insert(fill.time);
            }
        }
    }

    async fn apply_order_state(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        filled_quantity: Decimal,
    ) -> Result<(), ExchangeError> {
        let Some(order) = self.open_orders.get_mut(&order_id) else {
            return Ok(());
        };
        order.apply_update(status, filled_quantity.max(order.filled_quantity), Utc::now());

        if order.is_terminal() {
            self.terminal_since.entry(order_id.clone()).or_insert_with(Utc::now);
            // Whatever reservation the fills have not consumed is returned now.
            if let Some(reservation) = self.reservations.remove(&order_id)
                && !reservation.remaining.is_zero()
            {
                self.portfolio
                    .release(reservation.asset, reservation.remaining)
                    .await?;
            }
        }
        Ok(())
    }

    /// Drop terminal orders whose cancel-linger window has elapsed. Late fills inside
    /// the window still reconcile into the position through `on_account_event`.
    pub fn prune_terminal(&mut self, now: DateTime<Utc>) {
        let linger = self.config.cancel_fill_linger;
        let expired: Vec<OrderId> = self
            .terminal_since
            .iter()
            .filter(|(_, since)| now - **since >= linger)
            .map(|(order_id, _)| order_id.clone())
            .collect();
        for order_id in expired {
            self.terminal_since.remove(&order_id);
            self.open_orders.remove(&order_id);
            self.reservations.remove(&order_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantra_execution::{
        ApiCredentials,
        balance::AssetBalance,
        capability::Capabilities,
        order::{OrderKind, TimeInForce},
    };
    use quantra_instrument::{exchange::ExchangeId, market::Market};
    use quantra_portfolio::Portfolio;
    use quantra_strategy::{SignalAction, combiner::TradeIntent};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use quantra_data::event::{OrderBookSnapshot, Ticker};
    use rust_decimal_macros::dec;

    /// Scripted venue: every create_order returns the queued response.
    #[derive(Debug, Default)]
    struct ScriptedAdapter {
        placements: Mutex<Vec<OrderRequest>>,
        create_responses: Mutex<Vec<Result<Order, ExchangeError>>>,
        lookup_response: Mutex<Option<Order>>,
    }

    fn ack_order(request: &OrderRequest, order_id: &str) -> Order {
        Order {
            order_id: OrderId::new(order_id),
            client_id: Some(request.client_id.clone()),
            symbol: request.symbol.clone(),
            side: request.side,
            kind: request.kind,
            price: request.price,
            quantity: request.quantity,
            filled_quantity: Decimal::ZERO,
            status: OrderStatus::New,
            time_in_force: request.time_in_force,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[async_trait]
    impl ExchangeApi for ScriptedAdapter {
        fn id(&self) -> ExchangeId {
            ExchangeId::Binance
        }

        fn capabilities(&self) -> Capabilities {
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

        async fn connect(&self) -> Result<(), ExchangeError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), ExchangeError> {
            Ok(())
        }

        async fn get_markets(&self) -> Result<Vec<Market>, ExchangeError> {
            Ok(vec![])
        }

        async fn get_ticker(&self, _: &Symbol) -> Result<Ticker, ExchangeError> {
            unimplemented!("not exercised")
        }

        async fn get_order_book(
            &self,
            _: &Symbol,
            _: usize,
        ) -> Result<OrderBookSnapshot, ExchangeError> {
            unimplemented!("not exercised")
        }

        async fn get_balances(&self) -> Result<Vec<AssetBalance>, ExchangeError> {
            Ok(vec![])
        }

        async fn create_order(&self, request: &OrderRequest) -> Result<Order, ExchangeError> {
            self.placements.lock().push(request.clone());
            self.create_responses
                .lock()
                .pop()
                .unwrap_or_else(|| Ok(ack_order(request, "ack-1")))
        }

        async fn cancel_order(
            &self,
            _: &OrderId,
            _: &Symbol,
        ) -> Result<Option<Order>, ExchangeError> {
            Ok(None)
        }

        async fn get_open_orders(&self, _: Option<&Symbol>) -> Result<Vec<Order>, ExchangeError> {
            Ok(self.lookup_response.lock().clone().into_iter().collect())
        }

        async fn get_order(&self, _: &OrderId, _: &Symbol) -> Result<Order, ExchangeError> {
            Err(ExchangeError::InvalidOrder("not found".to_string()))
        }

        async fn get_order_by_client_id(
            &self,
            client_id: &str,
            _: &Symbol,
        ) -> Result<Option<Order>, ExchangeError> {
            Ok(self
                .lookup_response
                .lock()
                .clone()
                .filter(|order| {
                    order
                        .client_id
                        .as_ref()
                        .is_some_and(|id| id.as_str() == client_id)
                }))
        }
    }

    fn approved(quantity: Decimal) -> ApprovedOrder {
        ApprovedOrder {
            symbol: "BTC/USDT".parse().unwrap(),
            side: Side::Buy,
            kind: OrderKind::Market,
            time_in_force: TimeInForce::ImmediateOrCancel,
            price: None,
            quantity,
            stop_loss: Some(dec!(19600)),
            take_profit: Some(dec!(20800)),
            intent: TradeIntent {
                symbol: "BTC/USDT".parse().unwrap(),
                action: SignalAction::Buy,
                strength: Decimal::ONE,
                quantity,
                target_price: Some(dec!(20000)),
                stop_loss: None,
                take_profit: None,
                originating_signals: vec![],
            },
        }
    }

    fn engine(
        adapter: Arc<ScriptedAdapter>,
        live_trading: bool,
    ) -> (ExecutionEngine, PortfolioHandle) {
        let portfolio = Portfolio::new(AssetName::new("USDT"), dec!(100000));
        let (handle, _task) = quantra_portfolio::spawn(portfolio, None);
        let engine = ExecutionEngine::new(
            adapter,
            handle.clone(),
            Outbox::ephemeral(),
            ExecutionConfig {
                live_trading,
                reconcile_timeout: Duration::from_millis(200),
                reconcile_poll: Duration::from_millis(20),
                ..ExecutionConfig::default()
            },
            CancellationToken::new(),
        );
        (engine, handle)
    }

    #[tokio::test]
    async fn test_zero_quantity_rejected() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let (mut engine, _portfolio) = engine(Arc::clone(&adapter), true);
        let result = engine.execute(&approved(Decimal::ZERO)).await;
        assert!(matches!(result, Err(ExchangeError::InvalidOrder(_))));
        assert!(adapter.placements.lock().is_empty());
    }

    #[tokio::test]
    async fn test_dry_run_short_circuits_placement() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let (mut engine, portfolio) = engine(Arc::clone(&adapter), false);

        let order = engine.execute(&approved(dec!(0.1))).await.unwrap();
        assert!(order.order_id.as_str().starts_with("DRY-"));
        // No HTTP POST was issued and no reservation taken.
        assert!(adapter.placements.lock().is_empty());
        let summary = portfolio.summary().await.unwrap();
        assert_eq!(summary.cash, dec!(100000));
        assert!(engine.outbox.pending().next().is_none());
    }

    #[tokio::test]
    async fn test_live_placement_reserves_and_tracks() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let (mut engine, portfolio) = engine(Arc::clone(&adapter), true);

        let order = engine.execute(&approved(dec!(0.1))).await.unwrap();
        assert_eq!(order.order_id.as_str(), "ack-1");
        assert_eq!(adapter.placements.lock().len(), 1);
        // Buy of 0.1 at reference 20_000 reserves 2_000 quote.
        let summary = portfolio.summary().await.unwrap();
        assert_eq!(summary.cash, dec!(100000));
        assert!(engine.has_in_flight());
    }

    #[tokio::test]
    async fn test_uncertain_placement_adopts_found_order() {
        let adapter = Arc::new(ScriptedAdapter::default());
        adapter.create_responses.lock().push(Err(
            ExchangeError::UncertainPlacement {
                client_id: "ignored".to_string(),
            },
        ));
        let (mut engine, _portfolio) = engine(Arc::clone(&adapter), true);

        // Seed the lookup with the order the venue actually accepted.
        let request_probe = Arc::clone(&adapter);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let placed = request_probe.placements.lock().last().cloned().unwrap();
            *request_probe.lookup_response.lock() = Some(ack_order(&placed, "adopted-7"));
        });

        let order = engine.execute(&approved(dec!(0.1))).await.unwrap();
        assert_eq!(order.order_id.as_str(), "adopted-7");
        assert!(engine.outbox.pending().next().is_none());
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_uncertain_placement_unresolved_is_surfaced_not_resent() {
        let adapter = Arc::new(ScriptedAdapter::default());
        adapter.create_responses.lock().push(Err(
            ExchangeError::UncertainPlacement {
                client_id: "ignored".to_string(),
            },
        ));
        let (mut engine, portfolio) = engine(Arc::clone(&adapter), true);

        let result = engine.execute(&approved(dec!(0.1))).await;
        assert!(matches!(
            result,
            Err(ExchangeError::UncertainPlacement { .. })
        ));
        // Exactly one send attempt; the outbox entry is kept for the operator.
        assert_eq!(adapter.placements.lock().len(), 1);
        assert_eq!(engine.outbox.pending().count(), 1);
        // The reservation was returned.
        let summary = portfolio.summary().await.unwrap();
        assert_eq!(summary.cash, dec!(100000));
    }

    #[tokio::test]
    async fn test_fill_releases_reservation_and_updates_portfolio() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let (mut engine, portfolio) = engine(Arc::clone(&adapter), true);
        let order = engine.execute(&approved(dec!(0.1))).await.unwrap();

        let fill_event = quantra_data::account::FillEvent::new(
            "BTC/USDT".parse().unwrap(),
            order.order_id.to_string(),
            order.client_id.as_ref().map(|id| id.to_string()),
            "t-1".to_string(),
            Side::Buy,
            dec!(20000),
            dec!(0.1),
            Decimal::ZERO,
            None,
        );
        let outcome = engine
            .on_account_event(AccountEvent::new(
                ExchangeId::Binance,
                Utc::now(),
                AccountEventKind::Fill(fill_event),
            ))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome.cash_delta, dec!(-2000));

        let summary = portfolio.summary().await.unwrap();
        assert_eq!(summary.active_positions, 1);
        assert_eq!(summary.cash, dec!(98000));
    }

    #[tokio::test]
    async fn test_cancel_unknown_order_is_noop_success() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let (mut engine, _portfolio) = engine(adapter, true);
        let result = engine
            .cancel(&OrderId::new("missing"), &"BTC/USDT".parse().unwrap())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_terminal_orders_pruned_after_linger() {
        let adapter = Arc::new(ScriptedAdapter::default());
        let (mut engine, _portfolio) = engine(adapter, true);
        let order = engine.execute(&approved(dec!(0.1))).await.unwrap();

        engine
            .apply_order_state(order.order_id.clone(), OrderStatus::Canceled, Decimal::ZERO)
            .await
            .unwrap();
        // Inside the linger window the order is retained for late fills.
        engine.prune_terminal(Utc::now());
        assert!(engine.open_orders.contains_key(&order.order_id));

        engine.prune_terminal(Utc::now() + TimeDelta::seconds(6));
        assert!(!engine.open_orders.contains_key(&order.order_id));
    }
}
