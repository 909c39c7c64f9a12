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

//! # Quantra-Execution
//! Unified exchange execution: one [`ExchangeApi`](client::ExchangeApi) contract,
//! per-venue REST adapters responsible for symbol translation, decimal normalisation,
//! request signing, endpoint rate buckets and error mapping, and a process-wide
//! [`ExchangeRegistry`](registry::ExchangeRegistry) that caches adapter instances per
//! credential fingerprint.

/// Orders: kinds, time in force, lifecycle status, requests.
pub mod order;

/// Asset balances with free/used reservation accounting.
pub mod balance;

/// Execution reports (fills).
pub mod trade;

/// Per-venue capability descriptors.
pub mod capability;

/// Uniform per-venue maker/taker fee schedules.
pub mod fees;

/// The unified [`ExchangeApi`](client::ExchangeApi) contract and venue adapters.
pub mod client;

/// Venue name to adapter constructor registry with instance caching.
pub mod registry;

use serde::{Deserialize, Serialize};

/// API credentials for one venue account.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiCredentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: Option<String>,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            secret: secret.into(),
            passphrase: None,
        }
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    /// Stable fingerprint used to key cached adapter instances. Never log the key
    /// itself; the fingerprint is safe to surface.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(self.api_key.as_bytes());
        hex::encode(hasher.finalize())
    }
}
