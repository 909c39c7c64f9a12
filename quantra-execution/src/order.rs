use chrono::{DateTime, Utc};
use derive_more::Display;
use quantra_instrument::{Side, symbol::Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub use quantra_data::account::OrderStatus;

/// Order kinds of the unified contract. Venue adapters translate to native encodings
/// and refuse kinds absent from their [`Capabilities`](crate::capability::Capabilities).
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
    StopLimit,
    TakeProfit,
    TakeProfitLimit,
}

impl OrderKind {
    /// Whether this kind requires a limit price.
    pub fn requires_price(&self) -> bool {
        matches!(
            self,
            OrderKind::Limit | OrderKind::StopLimit | OrderKind::TakeProfitLimit
        )
    }
}

/// How long an order remains active.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
pub enum TimeInForce {
    #[serde(rename = "GTC")]
    GoodTilCancelled,
    #[serde(rename = "IOC")]
    ImmediateOrCancel,
    #[serde(rename = "FOK")]
    FillOrKill,
    #[serde(rename = "GTD")]
    GoodTilDate,
}

/// Engine-generated client order id (UUIDv4), recorded in the outbox before any wire
/// traffic so an uncertain placement can be reconciled by lookup.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
pub struct ClientOrderId(pub SmolStr);

impl ClientOrderId {
    pub fn random() -> Self {
        Self(SmolStr::new(Uuid::new_v4().to_string()))
    }

    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ClientOrderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Venue-assigned order id.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
pub struct OrderId(pub SmolStr);

impl OrderId {
    pub fn new<S: AsRef<str>>(id: S) -> Self {
        Self(SmolStr::new(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for OrderId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Request to open an order on a venue.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub client_id: ClientOrderId,
}

/// Unified order state as tracked by the engine and returned by venue adapters.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Order {
    pub order_id: OrderId,
    pub client_id: Option<ClientOrderId>,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub status: OrderStatus,
    pub time_in_force: TimeInForce,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// `0 <= filled_quantity <= quantity` must hold at every observable point.
    pub fn fill_invariant_holds(&self) -> bool {
        self.filled_quantity >= Decimal::ZERO && self.filled_quantity <= self.quantity
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    /// Apply a venue status/fill update. Terminal orders are immutable: updates
    /// against them are ignored.
    pub fn apply_update(&mut self, status: OrderStatus, filled_quantity: Decimal, at: DateTime<Utc>) {
        if self.is_terminal() {
            return;
        }
        self.status = status;
        self.filled_quantity = filled_quantity.clamp(Decimal::ZERO, self.quantity);
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order() -> Order {
        Order {
            order_id: OrderId::new("1"),
            client_id: Some(ClientOrderId::random()),
            symbol: "BTC/USDT".parse().unwrap(),
            side: Side::Buy,
            kind: OrderKind::Limit,
            price: Some(dec!(20000)),
            quantity: dec!(1),
            filled_quantity: Decimal::ZERO,
            status: OrderStatus::New,
            time_in_force: TimeInForce::GoodTilCancelled,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_terminal_orders_are_immutable() {
        let mut order = order();
        order.apply_update(OrderStatus::Canceled, dec!(0.4), Utc::now());
        assert_eq!(order.status, OrderStatus::Canceled);

        // Any further update is ignored.
        order.apply_update(OrderStatus::Filled, dec!(1), Utc::now());
        assert_eq!(order.status, OrderStatus::Canceled);
        assert_eq!(order.filled_quantity, dec!(0.4));
    }

    #[test]
    fn test_fill_quantity_clamped_to_order_quantity() {
        let mut order = order();
        order.apply_update(OrderStatus::PartiallyFilled, dec!(2), Utc::now());
        assert_eq!(order.filled_quantity, dec!(1));
        assert!(order.fill_invariant_holds());
    }

    #[test]
    fn test_client_id_is_uuid() {
        let id = ClientOrderId::random();
        assert!(uuid::Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn test_kind_price_requirements() {
        assert!(OrderKind::Limit.requires_price());
        assert!(OrderKind::StopLimit.requires_price());
        assert!(!OrderKind::Market.requires_price());
        assert!(!OrderKind::Stop.requires_price());
    }
}
