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

//! # Quantra-Integration
//! Low-level venue integration primitives shared by the rest of the Quantra
//! trading ecosystem.
//!
//! ## Core abstractions:
//! - **RestClient** providing rate-limited, signed Http communication with retry/backoff.
//! - **RateLimiter** token-bucket admission control per venue endpoint class.
//! - **WebSocket** protocol utilities for streaming market & account data.
//! - **ExchangeError** the engine-wide error taxonomy every component speaks.

/// All [`Error`](std::error::Error)s generated in Quantra-Integration, including the
/// engine-wide [`ExchangeError`](error::ExchangeError) taxonomy.
pub mod error;

/// Signed REST execution and WebSocket protocol utilities.
pub mod protocol;

/// Token-bucket admission control per venue endpoint class.
pub mod rate_limit;

/// Defines a trait [`Tx`](channel::Tx) abstraction over different channel kinds, as well as
/// other channel utilities.
pub mod channel;

/// Utilities to assist deserialisation.
pub mod de;

/// Determines if something is considered "unrecoverable", such as an unrecoverable error.
pub trait Unrecoverable {
    fn is_unrecoverable(&self) -> bool;
}
