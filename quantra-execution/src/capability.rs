use crate::order::{OrderKind, TimeInForce};
use serde::{Deserialize, Serialize};

/// What a venue adapter supports, declared up front so the execution engine can refuse
/// or translate unsupported order shapes instead of silently degrading.
#[derive(Debug, Clone, Eq, PartialEq, Deserialize, Serialize)]
pub struct Capabilities {
    pub order_kinds: Vec<OrderKind>,
    pub time_in_force: Vec<TimeInForce>,
    /// Whether orders can be looked up by client order id (used for uncertain
    /// placement reconciliation).
    pub client_id_lookup: bool,
    /// Whether the venue offers an authenticated user stream for fills.
    pub user_stream: bool,
}

impl Capabilities {
    pub fn supports_kind(&self, kind: OrderKind) -> bool {
        self.order_kinds.contains(&kind)
    }

    pub fn supports_time_in_force(&self, time_in_force: TimeInForce) -> bool {
        self.time_in_force.contains(&time_in_force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supports_checks() {
        let capabilities = Capabilities {
            order_kinds: vec![OrderKind::Market, OrderKind::Limit],
            time_in_force: vec![TimeInForce::GoodTilCancelled, TimeInForce::ImmediateOrCancel],
            client_id_lookup: true,
            user_stream: true,
        };
        assert!(capabilities.supports_kind(OrderKind::Limit));
        assert!(!capabilities.supports_kind(OrderKind::StopLimit));
        assert!(!capabilities.supports_time_in_force(TimeInForce::GoodTilDate));
    }
}
