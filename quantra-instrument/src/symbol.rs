use crate::asset::AssetName;
use serde::{Deserialize, Deserializer, Serialize};
use smol_str::{SmolStr, format_smolstr};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;

/// Canonical trading pair identifier of the form `BASE/QUOTE` (eg/ "BTC/USDT").
///
/// This is the only symbol form that crosses component boundaries - venue adapters
/// translate to native encodings (`BTCUSDT`, `BTC_USDT`, ...) at the edge.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct Symbol(SmolStr);

/// Failure to interpret an input as a canonical `BASE/QUOTE` pair.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("invalid symbol: {0} (expected BASE/QUOTE)")]
pub struct SymbolError(pub String);

impl Symbol {
    /// Construct a canonical [`Symbol`] from base and quote asset names.
    pub fn new<B, Q>(base: B, quote: Q) -> Self
    where
        B: AsRef<str>,
        Q: AsRef<str>,
    {
        Self(format_smolstr!(
            "{}/{}",
            base.as_ref().to_uppercase(),
            quote.as_ref().to_uppercase()
        ))
    }

    /// Base asset of the pair (eg/ "BTC" of "BTC/USDT").
    pub fn base(&self) -> AssetName {
        let (base, _) = self.split();
        AssetName::new(base)
    }

    /// Quote asset of the pair (eg/ "USDT" of "BTC/USDT").
    pub fn quote(&self) -> AssetName {
        let (_, quote) = self.split();
        AssetName::new(quote)
    }

    fn split(&self) -> (&str, &str) {
        self.0
            .split_once('/')
            .expect("Symbol is validated on construction")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.split_once('/') {
            Some((base, quote)) if !base.is_empty() && !quote.is_empty() => {
                Ok(Symbol::new(base, quote))
            }
            _ => Err(SymbolError(input.to_string())),
        }
    }
}

impl Debug for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let input = String::deserialize(deserializer)?;
        input.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_canonical_form() {
        let symbol = Symbol::new("btc", "usdt");
        assert_eq!(symbol.as_str(), "BTC/USDT");
        assert_eq!(symbol.base().as_ref(), "BTC");
        assert_eq!(symbol.quote().as_ref(), "USDT");
    }

    #[test]
    fn test_symbol_parse() {
        assert_eq!(
            "eth/usd".parse::<Symbol>().unwrap(),
            Symbol::new("ETH", "USD")
        );
        assert!("ETHUSD".parse::<Symbol>().is_err());
        assert!("/USD".parse::<Symbol>().is_err());
        assert!("ETH/".parse::<Symbol>().is_err());
    }

    #[test]
    fn test_symbol_serde_round_trip() {
        let symbol = Symbol::new("BTC", "USDT");
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"BTC/USDT\"");
        assert_eq!(serde_json::from_str::<Symbol>(&json).unwrap(), symbol);
    }
}
