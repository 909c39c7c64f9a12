use crate::order::{ClientOrderId, OrderId};
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use quantra_data::account::FillEvent;
use quantra_instrument::{Side, asset::AssetName, exchange::ExchangeId, symbol::Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A (partial or full) execution report for an order.
///
/// Fills are the authoritative source for balance and position change: the portfolio
/// mutates only in response to them.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct Fill {
    pub exchange: ExchangeId,
    pub symbol: Symbol,
    pub order_id: OrderId,
    pub client_id: Option<ClientOrderId>,
    pub trade_id: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub fee_asset: Option<AssetName>,
    pub time: DateTime<Utc>,
}

impl Fill {
    /// Quote notional of the fill.
    pub fn notional(&self) -> Decimal {
        self.price * self.quantity
    }

    /// Build a [`Fill`] from a normalised user-channel event.
    pub fn from_event(exchange: ExchangeId, time: DateTime<Utc>, event: FillEvent) -> Self {
        Self {
            exchange,
            symbol: event.symbol,
            order_id: OrderId::new(&event.order_id),
            client_id: event.client_id.map(ClientOrderId::new),
            trade_id: event.trade_id,
            side: event.side,
            price: event.price,
            quantity: event.quantity,
            fee: event.fee,
            fee_asset: event.fee_asset,
            time,
        }
    }
}
