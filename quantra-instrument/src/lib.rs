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

//! # Quantra-Instrument
//! Canonical trading-pair symbols, venue identifiers, asset names and market metadata.
//!
//! The canonical [`Symbol`](symbol::Symbol) form `BASE/QUOTE` is the only cross-component
//! currency; venue adapters translate to and from their native encodings at the edge.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Canonical `BASE/QUOTE` trading pair identifier.
pub mod symbol;

/// Unique identifiers for supported venues.
pub mod exchange;

/// Asset name new type (eg/ "BTC", "USDT").
pub mod asset;

/// Venue market metadata: precisions and minimum order constraints.
pub mod market;

/// [`Side`] of a trade or position - Buy or Sell.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize,
)]
pub enum Side {
    #[serde(alias = "buy", alias = "BUY", alias = "b")]
    Buy,
    #[serde(alias = "sell", alias = "SELL", alias = "s")]
    Sell,
}

impl Side {
    /// The opposing side.
    pub fn inverse(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl Display for Side {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Side::Buy => "buy",
                Side::Sell => "sell",
            }
        )
    }
}
