#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_extern_crates,
    clippy::unused_self,
    rust_2018_idioms
)]
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Quantra
//! Multi-exchange cryptocurrency trading engine.
//!
//! The engine connects concurrently to several venues, ingests live market data over
//! streaming transports, evaluates trading strategies on the merged stream, and
//! routes the resulting orders back to the venues while maintaining a consistent
//! view of positions, balances, and realised/unrealised profit and loss.
//!
//! See [`engine::Engine`] for the composition root and
//! [`config::Config`] for the startup document it is wired from.

/// YAML configuration with environment overrides.
pub mod config;

/// The composed engine: market data → strategies → risk → execution → portfolio.
pub mod engine;

/// Top-level error and process exit-code mapping.
pub mod error;

/// `tracing` subscriber initialisation.
pub mod logging;

/// Orderly teardown helpers.
pub mod shutdown;

pub use config::Config;
pub use engine::Engine;
pub use error::EngineError;
