use crate::{
    balance::AssetBalance,
    capability::Capabilities,
    fees::FeeSchedule,
    order::{Order, OrderId, OrderRequest},
};
use async_trait::async_trait;
use quantra_data::event::{OrderBookSnapshot, Ticker};
use quantra_instrument::{exchange::ExchangeId, market::Market, symbol::Symbol};
use quantra_integration::error::ExchangeError;

/// Binance REST adapter.
pub mod binance;

/// Bybit REST adapter.
pub mod bybit;

/// Bitget REST adapter.
pub mod bitget;

/// Poloniex REST adapter.
pub mod poloniex;

/// The unified execution contract every venue adapter implements.
///
/// Adapters own symbol-form translation, decimal normalisation of numeric fields,
/// per-endpoint rate-bucket selection and mapping of venue errors into the shared
/// [`ExchangeError`] taxonomy. They are used as trait objects so the
/// [`ExchangeRegistry`](crate::registry::ExchangeRegistry) can hold heterogeneous
/// venues behind one type.
#[async_trait]
pub trait ExchangeApi: Send + Sync {
    fn id(&self) -> ExchangeId;

    /// What this adapter supports; the execution engine refuses or translates
    /// unsupported order shapes instead of silently degrading.
    fn capabilities(&self) -> Capabilities;

    /// Default-tier fee schedule used for P&L estimates.
    fn fees(&self) -> FeeSchedule {
        FeeSchedule::for_exchange(self.id())
    }

    /// Establish connectivity (warm the HTTP pool, verify reachability).
    async fn connect(&self) -> Result<(), ExchangeError>;

    /// Release resources. Called once at shutdown; must be idempotent.
    async fn disconnect(&self) -> Result<(), ExchangeError>;

    async fn get_markets(&self) -> Result<Vec<Market>, ExchangeError>;

    async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExchangeError>;

    async fn get_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> Result<OrderBookSnapshot, ExchangeError>;

    async fn get_balances(&self) -> Result<Vec<AssetBalance>, ExchangeError>;

    async fn create_order(&self, request: &OrderRequest) -> Result<Order, ExchangeError>;

    /// Cancel an order. Cancelling an already-terminal or unknown order is a no-op
    /// success: adapters map the venue's "unknown order" rejection accordingly.
    async fn cancel_order(
        &self,
        order_id: &OrderId,
        symbol: &Symbol,
    ) -> Result<Option<Order>, ExchangeError>;

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>, ExchangeError>;

    async fn get_order(&self, order_id: &OrderId, symbol: &Symbol) -> Result<Order, ExchangeError>;

    /// Look up an order by the engine-generated client id, where the venue supports
    /// it (see [`Capabilities::client_id_lookup`]).
    async fn get_order_by_client_id(
        &self,
        client_id: &str,
        symbol: &Symbol,
    ) -> Result<Option<Order>, ExchangeError> {
        let _ = (client_id, symbol);
        Err(ExchangeError::Unsupported {
            venue: self.id().as_str(),
            item: "client order id lookup".to_string(),
        })
    }
}
