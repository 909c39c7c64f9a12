use chrono::{DateTime, Utc};
use derive_more::Constructor;
use quantra_instrument::{Side, asset::AssetName, exchange::ExchangeId, symbol::Symbol};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Normalised account event delivered over an authenticated user channel.
///
/// Fills are the authoritative source for balance and position change; order updates
/// and balance updates are advisory state the execution engine reconciles against.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct AccountEvent {
    pub exchange: ExchangeId,
    pub time_exchange: DateTime<Utc>,
    pub kind: AccountEventKind,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum AccountEventKind {
    Fill(FillEvent),
    OrderUpdate(OrderUpdateEvent),
    BalanceUpdate(BalanceUpdateEvent),
}

/// Execution report for a (partial or full) order fill.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct FillEvent {
    pub symbol: Symbol,
    pub order_id: String,
    pub client_id: Option<String>,
    pub trade_id: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub fee_asset: Option<AssetName>,
}

/// Normalised order lifecycle status.
///
/// `Filled`, `Canceled`, `Rejected` and `Expired` are terminal: an order in a terminal
/// status is immutable.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }
}

/// Advisory order state change from the venue.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct OrderUpdateEvent {
    pub symbol: Symbol,
    pub order_id: String,
    pub client_id: Option<String>,
    pub status: OrderStatus,
    pub filled_quantity: Decimal,
}

/// Advisory balance change from the venue.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, Constructor)]
pub struct BalanceUpdateEvent {
    pub asset: AssetName,
    pub free: Decimal,
    pub used: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Canceled.is_terminal());
        assert!(OrderStatus::Rejected.is_terminal());
        assert!(OrderStatus::Expired.is_terminal());
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::PartiallyFilled.is_terminal());
    }
}
