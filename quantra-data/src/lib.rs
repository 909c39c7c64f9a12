#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    missing_debug_implementations,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Quantra-Data
//! Normalised streaming market data for leading cryptocurrency exchanges.
//!
//! One [`StreamSession`](session::StreamSession) per venue owns a persistent WebSocket
//! connection: it manages the subscription set, re-authenticates and re-subscribes after
//! reconnects, normalises venue frames into [`MarketEvent`](event::MarketEvent)s, and
//! publishes them onto the symbol-partitioned [`MarketBus`](bus::MarketBus) that consumers
//! subscribe to with per-subscriber backpressure policies.

/// Normalised public market data events: tickers, trades, order book updates.
pub mod event;

/// Normalised private account events delivered over authenticated user channels.
pub mod account;

/// Local order book maintenance: snapshot replace, delta apply, sequence-gap detection.
pub mod books;

/// Subscription identity and the idempotent subscription set a session maintains.
pub mod subscription;

/// Symbol-partitioned publish/subscribe fabric with bounded per-subscriber queues.
pub mod bus;

/// Venue-agnostic stream connector contract.
pub mod connector;

/// Persistent streaming session: connect, subscribe, dispatch, reconnect.
pub mod session;

/// Venue stream connector implementations.
pub mod exchange;
