/// Binance stream connector.
pub mod binance;

/// Bybit stream connector.
pub mod bybit;

/// Bitget stream connector.
pub mod bitget;

/// Poloniex stream connector.
pub mod poloniex;

use parking_lot::RwLock;
use quantra_instrument::symbol::Symbol;
use smol_str::SmolStr;
use std::collections::HashMap;

/// Venue-native symbol to canonical [`Symbol`] translation table.
///
/// Venue encodings without a separator (eg/ `BTCUSDT`) cannot be split
/// unambiguously, so connectors record the mapping when building subscribe
/// requests and consult it when normalising inbound frames.
#[derive(Debug, Default)]
pub(crate) struct SymbolTable {
    map: RwLock<HashMap<SmolStr, Symbol>>,
}

impl SymbolTable {
    pub(crate) fn insert(&self, native: impl AsRef<str>, symbol: Symbol) {
        self.map
            .write()
            .insert(SmolStr::new(native.as_ref()), symbol);
    }

    pub(crate) fn get(&self, native: &str) -> Option<Symbol> {
        self.map.read().get(native).cloned()
    }
}
