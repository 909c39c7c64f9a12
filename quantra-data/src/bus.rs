use crate::event::{DataKind, MarketEvent};
use crate::subscription::ChannelKind;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use quantra_instrument::{exchange::ExchangeId, symbol::Symbol};
use std::collections::{HashMap, VecDeque};
use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering},
};
use tokio::sync::Notify;
use tracing::warn;

/// Default bounded queue capacity per subscriber.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// What to do when a subscriber's bounded queue is full.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum OverflowPolicy {
    /// Evict the oldest queued event to admit the new one. Default for tickers and
    /// depth, where only the latest state matters.
    DropOldest,
    /// Discard the incoming event.
    DropNewest,
    /// Suspend the publisher until the subscriber drains; pauses reading from the venue.
    Block,
}

struct EventQueue {
    buffer: Mutex<VecDeque<MarketEvent>>,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: AtomicU64,
    closed: AtomicBool,
    readable: Notify,
    writable: Notify,
}

impl EventQueue {
    fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
            policy,
            dropped: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn push(&self, event: MarketEvent) {
        loop {
            let wait = {
                let mut buffer = self.buffer.lock();
                if self.is_closed() {
                    return;
                }
                if buffer.len() < self.capacity {
                    buffer.push_back(event);
                    self.readable.notify_one();
                    return;
                }
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        buffer.pop_front();
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        buffer.push_back(event);
                        self.readable.notify_one();
                        return;
                    }
                    OverflowPolicy::DropNewest => {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    OverflowPolicy::Block => self.writable.notified(),
                }
            };
            wait.await;
        }
    }

    async fn pop(&self) -> Option<MarketEvent> {
        loop {
            let wait = {
                let mut buffer = self.buffer.lock();
                if let Some(event) = buffer.pop_front() {
                    self.writable.notify_one();
                    return Some(event);
                }
                if self.is_closed() {
                    return None;
                }
                self.readable.notified()
            };
            wait.await;
        }
    }
}

/// Receiving half handed to a bus subscriber.
///
/// Dropping the subscriber closes its queue; the bus prunes it on the next publish.
#[derive(Debug)]
pub struct BusSubscriber {
    queue: Arc<EventQueue>,
}

impl std::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventQueue")
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl BusSubscriber {
    /// Receive the next event in publish order, or `None` once closed and drained.
    pub async fn recv(&self) -> Option<MarketEvent> {
        self.queue.pop().await
    }

    /// Events this subscriber has lost to its overflow policy.
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for BusSubscriber {
    fn drop(&mut self) {
        self.queue.closed.store(true, Ordering::Release);
        self.queue.writable.notify_waiters();
        self.queue.readable.notify_waiters();
    }
}

/// Counters surfaced for observability.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct BusStats {
    pub stale_tickers_dropped: u64,
    pub incoherent_tickers_dropped: u64,
}

struct BusInner {
    partitions: RwLock<HashMap<(ChannelKind, Symbol), Vec<Arc<EventQueue>>>>,
    last_ticker_ts: Mutex<HashMap<(ExchangeId, Symbol), DateTime<Utc>>>,
    stale_tickers_dropped: AtomicU64,
    incoherent_tickers_dropped: AtomicU64,
}

/// Symbol-partitioned publish/subscribe fabric.
///
/// Events for the same `(channel, symbol)` are delivered to each subscriber in publish
/// order. Cross-symbol ordering is not guaranteed. Each subscriber has a bounded queue
/// with a configurable [`OverflowPolicy`].
#[derive(Clone)]
pub struct MarketBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for MarketBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketBus").finish_non_exhaustive()
    }
}

impl Default for MarketBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                partitions: RwLock::new(HashMap::new()),
                last_ticker_ts: Mutex::new(HashMap::new()),
                stale_tickers_dropped: AtomicU64::new(0),
                incoherent_tickers_dropped: AtomicU64::new(0),
            }),
        }
    }

    /// Attach a subscriber to a `(channel, symbol)` partition.
    pub fn subscribe(
        &self,
        channel: ChannelKind,
        symbol: Symbol,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> BusSubscriber {
        let queue = Arc::new(EventQueue::new(capacity, policy));
        self.inner
            .partitions
            .write()
            .entry((channel, symbol))
            .or_default()
            .push(Arc::clone(&queue));
        BusSubscriber { queue }
    }

    /// Attach a subscriber with the default capacity and drop-oldest policy.
    pub fn subscribe_default(&self, channel: ChannelKind, symbol: Symbol) -> BusSubscriber {
        self.subscribe(
            channel,
            symbol,
            DEFAULT_QUEUE_CAPACITY,
            OverflowPolicy::DropOldest,
        )
    }

    /// Publish an event to every subscriber of its `(channel, symbol)` partition.
    ///
    /// Tickers are validated at this single fan-out point: an incoherent ticker
    /// (bid > ask) or one whose exchange timestamp regresses is dropped and counted,
    /// so every consumer observes the same monotone sequence.
    pub async fn publish(&self, event: MarketEvent) {
        if let DataKind::Ticker(ticker) = &event.kind {
            if !ticker.is_coherent() {
                self.inner
                    .incoherent_tickers_dropped
                    .fetch_add(1, Ordering::Relaxed);
                warn!(symbol = %event.symbol, "dropping incoherent ticker (bid > ask)");
                return;
            }
            let mut last = self.inner.last_ticker_ts.lock();
            let key = (event.exchange, event.symbol.clone());
            match last.get(&key) {
                Some(previous) if event.time_exchange < *previous => {
                    self.inner
                        .stale_tickers_dropped
                        .fetch_add(1, Ordering::Relaxed);
                    return;
                }
                _ => {
                    last.insert(key, event.time_exchange);
                }
            }
        }

        let queues: Vec<Arc<EventQueue>> = {
            let mut partitions = self.inner.partitions.write();
            let Some(slots) = partitions.get_mut(&(event.channel(), event.symbol.clone())) else {
                return;
            };
            slots.retain(|queue| !queue.is_closed());
            slots.iter().map(Arc::clone).collect()
        };

        for queue in queues {
            queue.push(event.clone()).await;
        }
    }

    pub fn stats(&self) -> BusStats {
        BusStats {
            stale_tickers_dropped: self.inner.stale_tickers_dropped.load(Ordering::Relaxed),
            incoherent_tickers_dropped: self
                .inner
                .incoherent_tickers_dropped
                .load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Ticker;
    use rust_decimal_macros::dec;

    fn symbol() -> Symbol {
        "BTC/USDT".parse().unwrap()
    }

    fn ticker_event(ts_ms: i64, bid: rust_decimal::Decimal) -> MarketEvent {
        MarketEvent::new(
            DateTime::from_timestamp_millis(ts_ms).unwrap(),
            Utc::now(),
            ExchangeId::Binance,
            symbol(),
            DataKind::Ticker(Ticker::new(bid, bid + dec!(1), bid, dec!(10), dec!(1000))),
        )
    }

    #[tokio::test]
    async fn test_publish_order_preserved() {
        let bus = MarketBus::new();
        let subscriber = bus.subscribe_default(ChannelKind::Ticker, symbol());

        for ts in 1..=5 {
            bus.publish(ticker_event(ts, dec!(100))).await;
        }

        let mut previous = None;
        for _ in 0..5 {
            let event = subscriber.recv().await.unwrap();
            if let Some(previous) = previous {
                assert!(event.time_exchange >= previous);
            }
            previous = Some(event.time_exchange);
        }
    }

    #[tokio::test]
    async fn test_regressing_ticker_dropped_and_counted() {
        let bus = MarketBus::new();
        let subscriber = bus.subscribe_default(ChannelKind::Ticker, symbol());

        bus.publish(ticker_event(1000, dec!(100))).await;
        bus.publish(ticker_event(500, dec!(99))).await;
        bus.publish(ticker_event(2000, dec!(101))).await;

        assert_eq!(bus.stats().stale_tickers_dropped, 1);
        assert_eq!(subscriber.recv().await.unwrap().time_exchange.timestamp_millis(), 1000);
        assert_eq!(subscriber.recv().await.unwrap().time_exchange.timestamp_millis(), 2000);
    }

    #[tokio::test]
    async fn test_incoherent_ticker_dropped() {
        let bus = MarketBus::new();
        let _subscriber = bus.subscribe_default(ChannelKind::Ticker, symbol());

        let crossed = MarketEvent::new(
            Utc::now(),
            Utc::now(),
            ExchangeId::Binance,
            symbol(),
            DataKind::Ticker(Ticker::new(
                dec!(101),
                dec!(100),
                dec!(100),
                dec!(10),
                dec!(1000),
            )),
        );
        bus.publish(crossed).await;
        assert_eq!(bus.stats().incoherent_tickers_dropped, 1);
    }

    #[tokio::test]
    async fn test_drop_oldest_overflow() {
        let bus = MarketBus::new();
        let subscriber = bus.subscribe(ChannelKind::Ticker, symbol(), 2, OverflowPolicy::DropOldest);

        for ts in 1..=4 {
            bus.publish(ticker_event(ts, dec!(100))).await;
        }

        assert_eq!(subscriber.dropped_count(), 2);
        // Oldest were evicted: the queue holds ts=3 and ts=4.
        assert_eq!(subscriber.recv().await.unwrap().time_exchange.timestamp_millis(), 3);
        assert_eq!(subscriber.recv().await.unwrap().time_exchange.timestamp_millis(), 4);
    }

    #[tokio::test]
    async fn test_drop_newest_overflow() {
        let bus = MarketBus::new();
        let subscriber = bus.subscribe(ChannelKind::Ticker, symbol(), 2, OverflowPolicy::DropNewest);

        for ts in 1..=4 {
            bus.publish(ticker_event(ts, dec!(100))).await;
        }

        assert_eq!(subscriber.dropped_count(), 2);
        assert_eq!(subscriber.recv().await.unwrap().time_exchange.timestamp_millis(), 1);
        assert_eq!(subscriber.recv().await.unwrap().time_exchange.timestamp_millis(), 2);
    }

    #[tokio::test]
    async fn test_block_policy_waits_for_drain() {
        let bus = MarketBus::new();
        let subscriber = bus.subscribe(ChannelKind::Ticker, symbol(), 1, OverflowPolicy::Block);

        let publisher = {
            let bus = bus.clone();
            tokio::spawn(async move {
                for ts in 1..=3 {
                    bus.publish(ticker_event(ts, dec!(100))).await;
                }
            })
        };

        for expected in 1..=3 {
            let event = subscriber.recv().await.unwrap();
            assert_eq!(event.time_exchange.timestamp_millis(), expected);
        }
        publisher.await.unwrap();
        assert_eq!(subscriber.dropped_count(), 0);
    }
}
