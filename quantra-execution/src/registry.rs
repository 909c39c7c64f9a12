use crate::{
    ApiCredentials,
    client::{
        ExchangeApi, binance::BinanceExecution, bitget::BitgetExecution, bybit::BybitExecution,
        poloniex::PoloniexExecution,
    },
};
use parking_lot::Mutex;
use quantra_instrument::exchange::ExchangeId;
use quantra_integration::error::ExchangeError;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Constructor registered for one venue.
pub type AdapterConstructor =
    Arc<dyn Fn(ApiCredentials) -> Arc<dyn ExchangeApi> + Send + Sync>;

/// Process-wide venue registry.
///
/// `create` caches adapter instances keyed by `(venue, credential fingerprint)` so
/// repeated lookups reuse the same connection pool. The registry is initialised once
/// by the composition root and torn down via [`shutdown_all`](Self::shutdown_all).
pub struct ExchangeRegistry {
    constructors: HashMap<ExchangeId, AdapterConstructor>,
    instances: Mutex<HashMap<(ExchangeId, String), Arc<dyn ExchangeApi>>>,
}

impl std::fmt::Debug for ExchangeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeRegistry")
            .field("venues", &self.constructors.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl ExchangeRegistry {
    /// An empty registry; venues are added with [`register`](Self::register).
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Registry pre-populated with every venue that ships an adapter.
    pub fn with_defaults(cancel: CancellationToken, sandbox: bool) -> Self {
        let mut registry = Self::new();

        let token = cancel.clone();
        registry.register(
            ExchangeId::Binance,
            Arc::new(move |credentials| {
                Arc::new(BinanceExecution::new(credentials, sandbox, token.child_token()))
            }),
        );
        let token = cancel.clone();
        registry.register(
            ExchangeId::Bybit,
            Arc::new(move |credentials| {
                Arc::new(BybitExecution::new(credentials, sandbox, token.child_token()))
            }),
        );
        let token = cancel.clone();
        registry.register(
            ExchangeId::Bitget,
            Arc::new(move |credentials| {
                Arc::new(BitgetExecution::new(credentials, token.child_token()))
            }),
        );
        let token = cancel;
        registry.register(
            ExchangeId::Poloniex,
            Arc::new(move |credentials| {
                Arc::new(PoloniexExecution::new(credentials, token.child_token()))
            }),
        );

        registry
    }

    pub fn register(&mut self, id: ExchangeId, constructor: AdapterConstructor) {
        self.constructors.insert(id, constructor);
    }

    pub fn supported(&self) -> impl Iterator<Item = ExchangeId> + '_ {
        self.constructors.keys().copied()
    }

    /// Return the cached adapter for `(id, credentials)` or construct a new one.
    pub fn create(
        &self,
        id: ExchangeId,
        credentials: ApiCredentials,
    ) -> Result<Arc<dyn ExchangeApi>, ExchangeError> {
        let constructor = self.constructors.get(&id).ok_or_else(|| {
            ExchangeError::Unsupported {
                venue: id.as_str(),
                item: "no adapter registered".to_string(),
            }
        })?;

        let key = (id, credentials.fingerprint());
        let mut instances = self.instances.lock();
        if let Some(instance) = instances.get(&key) {
            return Ok(Arc::clone(instance));
        }

        let instance = constructor(credentials);
        instances.insert(key, Arc::clone(&instance));
        info!(venue = %id, "constructed venue adapter");
        Ok(instance)
    }

    /// Disconnect every cached adapter in parallel, bounded by `deadline`.
    ///
    /// Adapters that exceed the deadline are abandoned: their disconnect future keeps
    /// running detached while shutdown proceeds.
    pub async fn shutdown_all(&self, deadline: Duration) {
        let instances: Vec<((ExchangeId, String), Arc<dyn ExchangeApi>)> =
            self.instances.lock().drain().collect();

        let tasks = instances.into_iter().map(|((id, _), adapter)| {
            tokio::spawn(async move {
                if let Err(error) = adapter.disconnect().await {
                    warn!(venue = %id, ?error, "adapter disconnect failed");
                }
                id
            })
        });

        for task in tasks {
            match tokio::time::timeout(deadline, task).await {
                Ok(Ok(id)) => info!(venue = %id, "adapter disconnected"),
                Ok(Err(error)) => warn!(?error, "adapter disconnect task panicked"),
                Err(_) => warn!("adapter exceeded shutdown deadline - abandoning"),
            }
        }
    }
}

impl Default for ExchangeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        balance::AssetBalance,
        capability::Capabilities,
        order::{Order, OrderId, OrderKind, OrderRequest, TimeInForce},
    };
    use async_trait::async_trait;
    use quantra_data::event::{OrderBookSnapshot, Ticker};
    use quantra_instrument::{market::Market, symbol::Symbol};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct MockAdapter {
        disconnect_delay: Duration,
    }

    #[async_trait]
    impl ExchangeApi for MockAdapter {
        fn id(&self) -> ExchangeId {
            ExchangeId::Binance
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                order_kinds: vec![OrderKind::Market, OrderKind::Limit],
                time_in_force: vec![TimeInForce::GoodTilCancelled],
                client_id_lookup: false,
                user_stream: false,
            }
        }

        async fn connect(&self) -> Result<(), ExchangeError> {
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), ExchangeError> {
            tokio::time::sleep(self.disconnect_delay).await;
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

        async fn create_order(&self, _: &OrderRequest) -> Result<Order, ExchangeError> {
            unimplemented!("not exercised")
        }

        async fn cancel_order(
            &self,
            _: &OrderId,
            _: &Symbol,
        ) -> Result<Option<Order>, ExchangeError> {
            Ok(None)
        }

        async fn get_open_orders(&self, _: Option<&Symbol>) -> Result<Vec<Order>, ExchangeError> {
            Ok(vec![])
        }

        async fn get_order(&self, _: &OrderId, _: &Symbol) -> Result<Order, ExchangeError> {
            unimplemented!("not exercised")
        }
    }

    fn mock_registry(constructed: Arc<AtomicUsize>, disconnect_delay: Duration) -> ExchangeRegistry {
        let mut registry = ExchangeRegistry::new();
        registry.register(
            ExchangeId::Binance,
            Arc::new(move |_| {
                constructed.fetch_add(1, Ordering::SeqCst);
                Arc::new(MockAdapter { disconnect_delay })
            }),
        );
        registry
    }

    #[tokio::test]
    async fn test_create_caches_by_credential_fingerprint() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let registry = mock_registry(Arc::clone(&constructed), Duration::ZERO);

        let first = registry
            .create(ExchangeId::Binance, ApiCredentials::new("key-a", "s"))
            .unwrap();
        let second = registry
            .create(ExchangeId::Binance, ApiCredentials::new("key-a", "s"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(constructed.load(Ordering::SeqCst), 1);

        let _third = registry
            .create(ExchangeId::Binance, ApiCredentials::new("key-b", "s"))
            .unwrap();
        assert_eq!(constructed.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_create_unregistered_venue_fails() {
        let registry = ExchangeRegistry::new();
        assert!(matches!(
            registry.create(ExchangeId::Kraken, ApiCredentials::default()),
            Err(ExchangeError::Unsupported { .. })
        ));
    }

    #[tokio::test]
    async fn test_shutdown_abandons_laggards() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let registry = mock_registry(constructed, Duration::from_secs(60));
        let _ = registry
            .create(ExchangeId::Binance, ApiCredentials::new("key", "s"))
            .unwrap();

        let start = std::time::Instant::now();
        registry.shutdown_all(Duration::from_millis(100)).await;
        assert!(start.elapsed() < Duration::from_secs(5));
    }
}
