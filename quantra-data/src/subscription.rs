use quantra_instrument::symbol::Symbol;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};

/// Channel types a session can subscribe to.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Ticker,
    OrderBook,
    Trade,
    /// Private account-scoped stream (orders, fills, balances); requires authentication.
    User,
}

impl ChannelKind {
    pub fn is_private(&self) -> bool {
        matches!(self, ChannelKind::User)
    }
}

impl Display for ChannelKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChannelKind::Ticker => "ticker",
            ChannelKind::OrderBook => "orderbook",
            ChannelKind::Trade => "trade",
            ChannelKind::User => "user",
        };
        write!(f, "{name}")
    }
}

/// One subscription: a `(channel, symbol)` pair.
///
/// Account-wide user streams still carry the symbol they were requested for; connectors
/// whose user stream is account-scoped deduplicate at the wire level.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub struct Subscription {
    pub channel: ChannelKind,
    pub symbol: Symbol,
}

impl Subscription {
    pub fn new(channel: ChannelKind, symbol: Symbol) -> Self {
        Self { channel, symbol }
    }

    /// Unique identifier used to route inbound frames back to this subscription.
    pub fn id(&self) -> SubscriptionId {
        SubscriptionId::new(format!("{}|{}", self.channel, self.symbol))
    }
}

/// Unique `SmolStr` identifier for a subscribed data stream.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize)]
pub struct SubscriptionId(pub SmolStr);

impl SubscriptionId {
    pub fn new<S: AsRef<str>>(input: S) -> Self {
        Self(SmolStr::new(input.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The set of subscriptions a session holds, with idempotent add/remove.
///
/// The active set is what must be re-sent, in full, after every reconnect.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct SubscriptionSet {
    active: BTreeSet<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add subscriptions, returning only those not already active (duplicates are
    /// idempotent and produce no wire traffic).
    pub fn add(&mut self, subscriptions: impl IntoIterator<Item = Subscription>) -> Vec<Subscription> {
        subscriptions
            .into_iter()
            .filter(|subscription| self.active.insert(subscription.clone()))
            .collect()
    }

    /// Remove subscriptions, returning only those that were actually active.
    pub fn remove(
        &mut self,
        subscriptions: impl IntoIterator<Item = Subscription>,
    ) -> Vec<Subscription> {
        subscriptions
            .into_iter()
            .filter(|subscription| self.active.remove(subscription))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Subscription> {
        self.active.iter()
    }

    pub fn contains(&self, subscription: &Subscription) -> bool {
        self.active.contains(subscription)
    }

    pub fn has_private(&self) -> bool {
        self.active
            .iter()
            .any(|subscription| subscription.channel.is_private())
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sub(channel: ChannelKind, pair: &str) -> Subscription {
        Subscription::new(channel, pair.parse().unwrap())
    }

    #[test]
    fn test_duplicate_subscribe_is_idempotent() {
        let mut set = SubscriptionSet::new();
        let added = set.add([
            sub(ChannelKind::Ticker, "BTC/USDT"),
            sub(ChannelKind::Ticker, "BTC/USDT"),
        ]);
        assert_eq!(added.len(), 1);
        assert_eq!(set.len(), 1);

        let added = set.add([sub(ChannelKind::Ticker, "BTC/USDT")]);
        assert!(added.is_empty());
    }

    #[test]
    fn test_remove_unknown_is_noop() {
        let mut set = SubscriptionSet::new();
        set.add([sub(ChannelKind::Trade, "BTC/USDT")]);
        let removed = set.remove([sub(ChannelKind::Ticker, "ETH/USDT")]);
        assert!(removed.is_empty());
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_active_set_survives_round_trip() {
        // The post-reconnect resubscription set equals the pre-disconnect set.
        let mut set = SubscriptionSet::new();
        set.add([
            sub(ChannelKind::Ticker, "BTC/USDT"),
            sub(ChannelKind::Trade, "BTC/USDT"),
        ]);

        let before: Vec<_> = set.iter().cloned().collect();
        let resubscribe: Vec<_> = set.iter().cloned().collect();
        assert_eq!(before, resubscribe);
    }

    #[test]
    fn test_has_private() {
        let mut set = SubscriptionSet::new();
        set.add([sub(ChannelKind::Ticker, "BTC/USDT")]);
        assert!(!set.has_private());
        set.add([sub(ChannelKind::User, "BTC/USDT")]);
        assert!(set.has_private());
    }
}
