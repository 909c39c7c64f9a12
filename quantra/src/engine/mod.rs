use crate::{
    config::Config,
    engine::execution::{ExecutionConfig, ExecutionEngine, Outbox},
    engine::stops::{StopConfig, StopLossSupervisor},
    error::EngineError,
    shutdown::with_watchdog,
};
use chrono::Utc;
use quantra_data::{
    account::AccountEvent,
    bus::{MarketBus, OverflowPolicy},
    connector::{StreamConnector, StreamCredentials},
    event::{DataKind, MarketEvent},
    exchange::{
        binance::BinanceStream, bitget::BitgetStream, bybit::BybitStream,
        poloniex::PoloniexStream,
    },
    session::{ReconnectionBackoffPolicy, SessionHandle, StreamSession},
    subscription::{ChannelKind, Subscription},
};
use quantra_execution::{
    ApiCredentials, client::ExchangeApi, registry::ExchangeRegistry,
};
use quantra_instrument::{asset::AssetName, exchange::ExchangeId};
use quantra_integration::channel::{UnboundedRx, UnboundedTx, mpsc_unbounded};
use quantra_portfolio::{Portfolio, PortfolioHandle, snapshot::SnapshotStore};
use quantra_risk::{PortfolioView, PositionView, RiskGate};
use quantra_strategy::{
    SignalAction, combiner::{CombinerConfig, SignalCombiner, TradeIntent}, ma_cross::MaCrossStrategy,
    rsi::RsiStrategy, runtime::StrategyRuntime,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Intent-to-order translation, placement reconciliation and the persistent outbox.
pub mod execution;

/// Stop-loss / take-profit supervision over the live ticker stream.
pub mod stops;

/// Opaque correlation id attached to every rejection and placement log line.
fn correlation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

const EVALUATION_TICK: Duration = Duration::from_secs(1);
const MAINTENANCE_TICK: Duration = Duration::from_secs(5);
const ADAPTER_SHUTDOWN_DEADLINE: Duration = Duration::from_secs(10);
const SHUTDOWN_WATCHDOG: Duration = Duration::from_secs(30);
const IN_FLIGHT_DRAIN: Duration = Duration::from_secs(10);

/// The composed trading engine.
///
/// Data flow: stream sessions normalise venue frames onto the market bus; the
/// strategy runtime turns events into signals; the combiner scores them into
/// intents; the risk gate validates and sizes; the execution engine places orders;
/// fills flow back through the account channel into the portfolio.
pub struct Engine {
    config: Config,
    cancel: CancellationToken,
    session_cancel: CancellationToken,
    registry: ExchangeRegistry,
    adapter: Arc<dyn ExchangeApi>,
    sessions: Vec<(ExchangeId, SessionHandle)>,
    session_tasks: Vec<tokio::task::JoinHandle<()>>,
    runtime: StrategyRuntime,
    combiner: SignalCombiner,
    risk: RiskGate,
    portfolio: PortfolioHandle,
    execution: ExecutionEngine,
    supervisor: StopLossSupervisor,
    market_rx: mpsc::UnboundedReceiver<MarketEvent>,
    account_rx: UnboundedRx<AccountEvent>,
    intent_rx: UnboundedRx<TradeIntent>,
    intent_tx: UnboundedTx<TradeIntent>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("venue", &self.adapter.id())
            .field("symbols", &self.config.trading.symbols)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Wire the engine from configuration: restore state, construct the preferred
    /// venue adapter, reconcile, spawn stream sessions and register strategies.
    pub async fn build(config: Config, cancel: CancellationToken) -> Result<Self, EngineError> {
        // Persisted state first: corruption here halts startup (exit code 3).
        let store = SnapshotStore::open(&config.state_file).map_err(EngineError::from)?;
        let portfolio = match store.load().map_err(EngineError::from)? {
            Some(snapshot) => {
                info!(path = %store.path().display(), "restored portfolio snapshot");
                Portfolio::from_snapshot(snapshot)
            }
            None => Portfolio::new(
                AssetName::new(&config.base_currency),
                config.initial_balance,
            ),
        };
        let initial_equity = portfolio.equity();
        let (portfolio_handle, _portfolio_task) =
            quantra_portfolio::spawn(portfolio, Some(store));

        // Preferred-venue routing: the alphabetically first configured venue.
        let mut venues: Vec<&String> = config.exchanges.keys().collect();
        venues.sort();
        let preferred = venues
            .first()
            .ok_or_else(|| EngineError::Config("no exchanges configured".to_string()))?
            .as_str();
        let venue_id: ExchangeId = preferred
            .parse()
            .map_err(EngineError::Config)?;
        let venue_config = &config.exchanges[preferred];
        let credentials = ApiCredentials {
            api_key: venue_config.api_key.clone(),
            secret: venue_config.secret.clone(),
            passphrase: venue_config.passphrase.clone(),
        };

        let registry = ExchangeRegistry::with_defaults(cancel.child_token(), venue_config.sandbox);
        let adapter = registry
            .create(venue_id, credentials.clone())
            .map_err(EngineError::from)?;
        adapter
            .connect()
            .await
            .map_err(|err| EngineError::Adapter(format!("{venue_id}: {err}")))?;

        // Startup reconciliation: venue balances are authoritative, persisted
        // positions are (the venue may lack full history).
        match adapter.get_balances().await {
            Ok(balances) => {
                let discrepancies = portfolio_handle
                    .reconcile_balances(balances)
                    .await
                    .map_err(EngineError::from)?;
                if !discrepancies.is_empty() {
                    warn!(count = discrepancies.len(), "balance discrepancies reconciled");
                }
            }
            Err(err) => warn!(?err, "balance reconciliation unavailable"),
        }
        match adapter.get_open_orders(None).await {
            Ok(open) if !open.is_empty() => {
                warn!(count = open.len(), "venue reports open orders from a previous run");
            }
            Ok(_) => {}
            Err(err) => warn!(?err, "open-order reconciliation unavailable"),
        }

        // Streaming layer.
        let bus = MarketBus::new();
        let session_cancel = cancel.child_token();
        let (account_tx, account_rx) = mpsc_unbounded::<AccountEvent>();
        let (market_tx, market_rx) = mpsc::unbounded_channel::<MarketEvent>();

        let mut sessions = Vec::new();
        let mut session_tasks = Vec::new();

        let public_connector = public_connector(venue_id)?;
        let public_subs: Vec<Subscription> = config
            .trading
            .symbols
            .iter()
            .flat_map(|symbol| {
                [
                    Subscription::new(ChannelKind::Ticker, symbol.clone()),
                    Subscription::new(ChannelKind::Trade, symbol.clone()),
                ]
            })
            .collect();
        let (public_session, public_handle) = StreamSession::new(
            public_connector,
            bus.clone(),
            None,
            None,
            ReconnectionBackoffPolicy::default(),
        );
        public_handle.subscribe(public_subs);
        sessions.push((venue_id, public_handle));
        session_tasks.push(spawn_session(public_session, session_cancel.clone(), venue_id));

        if config.enable_live_trading && adapter.capabilities().user_stream {
            let private_connector = private_connector(venue_id)?;
            let stream_credentials = StreamCredentials {
                api_key: credentials.api_key.clone(),
                secret: credentials.secret.clone(),
                passphrase: credentials.passphrase.clone(),
            };
            let (private_session, private_handle) = StreamSession::new(
                private_connector,
                bus.clone(),
                Some(stream_credentials),
                Some(account_tx.clone()),
                ReconnectionBackoffPolicy::default(),
            );
            private_handle.subscribe(
                config
                    .trading
                    .symbols
                    .iter()
                    .map(|symbol| Subscription::new(ChannelKind::User, symbol.clone()))
                    .collect(),
            );
            sessions.push((venue_id, private_handle));
            session_tasks.push(spawn_session(private_session, session_cancel.clone(), venue_id));
        }

        // One engine-side consumer per (channel, symbol) partition feeding the
        // merged market channel; per-partition ordering survives the merge.
        for symbol in &config.trading.symbols {
            for channel in [ChannelKind::Ticker, ChannelKind::Trade] {
                let subscriber = bus.subscribe(
                    channel,
                    symbol.clone(),
                    quantra_data::bus::DEFAULT_QUEUE_CAPACITY,
                    OverflowPolicy::DropOldest,
                );
                let tx = market_tx.clone();
                session_tasks.push(tokio::spawn(async move {
                    while let Some(event) = subscriber.recv().await {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                }));
            }
        }

        // Strategy layer.
        let mut runtime = StrategyRuntime::new();
        for name in &config.trading.strategies {
            match name.as_str() {
                "ma_cross" => runtime.register(Box::new(MaCrossStrategy::new(
                    config.trading.symbols.clone(),
                    10,
                    30,
                ))),
                "rsi" => runtime.register(Box::new(RsiStrategy::new(
                    config.trading.symbols.clone(),
                    14,
                ))),
                unknown => {
                    return Err(EngineError::Config(format!(
                        "unknown strategy: {unknown}"
                    )));
                }
            }
        }

        let risk = RiskGate::new((&config.trading.risk_management).into(), initial_equity);

        let (intent_tx, intent_rx) = mpsc_unbounded();
        let supervisor = StopLossSupervisor::new(StopConfig::default(), intent_tx.clone());

        let outbox_path = config.state_file.with_file_name("outbox.json");
        let execution = ExecutionEngine::new(
            Arc::clone(&adapter),
            portfolio_handle.clone(),
            Outbox::open(outbox_path).map_err(EngineError::from)?,
            ExecutionConfig {
                live_trading: config.enable_live_trading,
                ..ExecutionConfig::default()
            },
            cancel.child_token(),
        );

        Ok(Self {
            config,
            cancel,
            session_cancel,
            registry,
            adapter,
            sessions,
            session_tasks,
            runtime,
            combiner: SignalCombiner::new(CombinerConfig::default()),
            risk,
            portfolio: portfolio_handle,
            execution,
            supervisor,
            market_rx,
            account_rx,
            intent_rx,
            intent_tx,
        })
    }

    /// Sender half of the intent channel: the stop supervisor, operator tooling and
    /// tests inject intents here like any other producer.
    pub fn intent_sender(&self) -> UnboundedTx<TradeIntent> {
        self.intent_tx.clone()
    }

    /// Drive the engine until the root cancellation token fires, then perform an
    /// orderly shutdown in reverse dependency order.
    pub async fn run(mut self) -> Result<(), EngineError> {
        info!(
            venue = %self.adapter.id(),
            symbols = ?self.config.trading.symbols,
            live = self.config.enable_live_trading,
            "engine running"
        );
        let mut evaluation_tick = tokio::time::interval(EVALUATION_TICK);
        let mut maintenance_tick = tokio::time::interval(MAINTENANCE_TICK);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                Some(event) = self.market_rx.recv() => {
                    self.on_market_event(event).await;
                }
                Some(event) = futures::StreamExt::next(&mut self.account_rx) => {
                    self.on_account_event(event).await;
                }
                Some(intent) = futures::StreamExt::next(&mut self.intent_rx) => {
                    self.handle_intent(intent).await;
                }
                _ = evaluation_tick.tick() => {
                    let now = Utc::now();
                    for symbol in self.combiner.pending_symbols() {
                        for intent in self.combiner.evaluate(&symbol, now) {
                            self.handle_intent(intent).await;
                        }
                    }
                }
                _ = maintenance_tick.tick() => {
                    self.execution.prune_terminal(Utc::now());
                    if let Err(err) = self.portfolio.save().await {
                        // Trading continues without persistence; the alert is the
                        // operator's cue to intervene.
                        error!(?err, "portfolio persistence failed");
                    }
                }
            }
        }

        self.shutdown().await
    }

    async fn on_market_event(&mut self, event: MarketEvent) {
        if let DataKind::Ticker(ticker) = &event.kind {
            let mut prices = HashMap::new();
            prices.insert(event.symbol.clone(), ticker.last);
            if let Ok(_unrealized_delta) = self.portfolio.update_prices(prices).await {
                if let Ok(summary) = self.portfolio.summary().await {
                    self.risk.update_equity(summary.equity);
                }
            }
            self.supervisor
                .on_price(&event.symbol, ticker.last, Utc::now());
        }

        for signal in self.runtime.on_event(&event) {
            self.combiner.collect(signal);
        }
    }

    async fn on_account_event(&mut self, event: AccountEvent) {
        let fill_symbol = match &event.kind {
            quantra_data::account::AccountEventKind::Fill(fill) => Some(fill.symbol.clone()),
            _ => None,
        };
        match self.execution.on_account_event(event).await {
            Ok(Some(outcome)) => {
                self.risk.record_fill(Utc::now());
                self.risk.update_equity(outcome.equity);
                if outcome.position_closed
                    && let Some(symbol) = fill_symbol
                {
                    self.supervisor.disarm(&symbol);
                }
            }
            Ok(None) => {}
            Err(err) => error!(?err, "account event application failed"),
        }
    }

    async fn handle_intent(&mut self, intent: TradeIntent) {
        let correlation = correlation_id();
        match intent.action {
            SignalAction::Hold => {}
            SignalAction::Close => {
                self.close_position(&intent, &correlation).await;
            }
            SignalAction::Buy | SignalAction::Sell => {
                self.open_from_intent(intent, &correlation).await;
            }
        }
    }

    async fn open_from_intent(&mut self, intent: TradeIntent, correlation: &str) {
        let Ok(summary) = self.portfolio.summary().await else {
            error!(%correlation, "portfolio snapshot unavailable");
            return;
        };
        self.risk.update_equity(summary.equity);

        // Supplemented portfolio guard: cap concurrent positions.
        let already_open = summary
            .positions
            .iter()
            .any(|position| position.symbol == intent.symbol);
        if !already_open && summary.active_positions >= self.config.trading.max_positions {
            warn!(
                %correlation,
                symbol = %intent.symbol,
                max = self.config.trading.max_positions,
                "max concurrent positions reached - intent dropped"
            );
            return;
        }

        let view = PortfolioView {
            equity: summary.equity,
            positions: summary
                .positions
                .iter()
                .map(|position| PositionView {
                    symbol: position.symbol.clone(),
                    notional: position.size
                        * summary
                            .prices
                            .get(&position.symbol)
                            .copied()
                            .unwrap_or(position.entry_price),
                })
                .collect(),
        };

        let approved = match self.risk.check(
            &intent,
            &view,
            &self.adapter.capabilities(),
            Utc::now(),
        ) {
            Ok(approved) => approved,
            Err(rejection) => {
                warn!(
                    %correlation,
                    symbol = %intent.symbol,
                    rule = ?rejection.rule,
                    reason = %rejection.reason,
                    "intent rejected by risk gate"
                );
                return;
            }
        };

        match self.execution.execute(&approved).await {
            Ok(order) => {
                let entry_reference = approved
                    .price
                    .or(approved.intent.target_price)
                    .unwrap_or_default();
                self.supervisor.arm(
                    order.symbol.clone(),
                    order.side,
                    entry_reference,
                    approved.stop_loss,
                    approved.take_profit,
                    Utc::now(),
                );
                info!(%correlation, order_id = %order.order_id, symbol = %order.symbol, "order placed");
            }
            Err(err) => {
                // Placement failures are logged and dropped; they never crash the
                // engine loop.
                error!(%correlation, symbol = %approved.symbol, %err, "placement failed");
            }
        }
    }

    /// Close intents bypass the risk gate: exits must work even under a drawdown
    /// halt or kill switch.
    async fn close_position(&mut self, intent: &TradeIntent, correlation: &str) {
        self.supervisor.disarm(&intent.symbol);
        let Ok(summary) = self.portfolio.summary().await else {
            return;
        };
        let Some(position) = summary
            .positions
            .iter()
            .find(|position| position.symbol == intent.symbol)
        else {
            warn!(%correlation, symbol = %intent.symbol, "close intent for unknown position");
            return;
        };

        let approved = quantra_risk::ApprovedOrder {
            symbol: intent.symbol.clone(),
            side: position.side.inverse(),
            kind: quantra_execution::order::OrderKind::Market,
            time_in_force: quantra_execution::order::TimeInForce::ImmediateOrCancel,
            price: None,
            quantity: position.size,
            stop_loss: None,
            take_profit: None,
            intent: intent.clone(),
        };
        match self.execution.execute(&approved).await {
            Ok(order) => {
                info!(%correlation, order_id = %order.order_id, symbol = %order.symbol, "close order placed");
            }
            Err(err) => {
                error!(%correlation, symbol = %intent.symbol, %err, "close placement failed");
            }
        }
    }

    /// Orderly shutdown in reverse dependency order with a hard-deadline watchdog:
    /// stop accepting intents, drain in-flight placements, close stream sessions,
    /// flush the portfolio, then disconnect adapters.
    async fn shutdown(mut self) -> Result<(), EngineError> {
        info!("engine shutting down");

        let sequence = async {
            // Drain in-flight placements (bounded): keep applying account events
            // until open orders resolve or the drain window elapses.
            let drain_deadline = tokio::time::Instant::now() + IN_FLIGHT_DRAIN;
            while self.execution.has_in_flight() && tokio::time::Instant::now() < drain_deadline {
                tokio::select! {
                    maybe = futures::StreamExt::next(&mut self.account_rx) => match maybe {
                        Some(event) => {
                            if self.execution.on_account_event(event).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = tokio::time::sleep(Duration::from_millis(200)) => {}
                }
            }

            // Sessions unsubscribe and close their sockets.
            self.session_cancel.cancel();
            for task in self.session_tasks.drain(..) {
                let _ = task.await;
            }
            self.sessions.clear();

            // Portfolio flush.
            if let Err(err) = self.portfolio.save().await {
                error!(?err, "final portfolio save failed");
            }

            // Adapters disconnect in parallel with a bounded deadline.
            self.registry.shutdown_all(ADAPTER_SHUTDOWN_DEADLINE).await;
        };

        with_watchdog("engine-shutdown", SHUTDOWN_WATCHDOG, sequence).await;
        info!("engine stopped");
        Ok(())
    }
}

fn spawn_session(
    session: StreamSession,
    cancel: CancellationToken,
    venue: ExchangeId,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = session.run(cancel).await {
            error!(%venue, ?err, "stream session terminated with error");
        }
    })
}

fn public_connector(id: ExchangeId) -> Result<Arc<dyn StreamConnector>, EngineError> {
    Ok(match id {
        ExchangeId::Binance => Arc::new(BinanceStream::new()),
        ExchangeId::Bybit => Arc::new(BybitStream::new()),
        ExchangeId::Bitget => Arc::new(BitgetStream::new()),
        ExchangeId::Poloniex => Arc::new(PoloniexStream::new()),
        other => {
            return Err(EngineError::Config(format!(
                "no stream connector for {other}"
            )));
        }
    })
}

fn private_connector(id: ExchangeId) -> Result<Arc<dyn StreamConnector>, EngineError> {
    Ok(match id {
        // Binance selects the account stream via a REST listen key; obtaining one is
        // a separate concern, so the private session starts unauthenticated and the
        // user channel rides the public endpoint until a listen key is supplied.
        ExchangeId::Binance => Arc::new(BinanceStream::new()),
        ExchangeId::Bybit => Arc::new(BybitStream::private()),
        ExchangeId::Bitget => Arc::new(BitgetStream::private()),
        ExchangeId::Poloniex => Arc::new(PoloniexStream::private()),
        other => {
            return Err(EngineError::Config(format!(
                "no private stream connector for {other}"
            )));
        }
    })
}
