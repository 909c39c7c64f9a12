use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Unique identifier for a supported venue.
///
/// The set is extensible: adding a venue means adding a variant here plus its
/// stream connector and REST client implementations.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Deserialize, Serialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeId {
    Ascendex,
    Binance,
    Bitfinex,
    Bitget,
    Bitrue,
    Bitstamp,
    Bybit,
    Coinbase,
    Gateio,
    Kraken,
    Kucoin,
    Poloniex,
}

impl ExchangeId {
    /// Venue name in configuration / registry form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeId::Ascendex => "ascendex",
            ExchangeId::Binance => "binance",
            ExchangeId::Bitfinex => "bitfinex",
            ExchangeId::Bitget => "bitget",
            ExchangeId::Bitrue => "bitrue",
            ExchangeId::Bitstamp => "bitstamp",
            ExchangeId::Bybit => "bybit",
            ExchangeId::Coinbase => "coinbase",
            ExchangeId::Gateio => "gateio",
            ExchangeId::Kraken => "kraken",
            ExchangeId::Kucoin => "kucoin",
            ExchangeId::Poloniex => "poloniex",
        }
    }
}

impl Display for ExchangeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ExchangeId {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_lowercase().as_str() {
            "ascendex" => Ok(ExchangeId::Ascendex),
            "binance" => Ok(ExchangeId::Binance),
            "bitfinex" => Ok(ExchangeId::Bitfinex),
            "bitget" => Ok(ExchangeId::Bitget),
            "bitrue" => Ok(ExchangeId::Bitrue),
            "bitstamp" => Ok(ExchangeId::Bitstamp),
            "bybit" => Ok(ExchangeId::Bybit),
            "coinbase" => Ok(ExchangeId::Coinbase),
            "gateio" | "gate.io" | "gate" => Ok(ExchangeId::Gateio),
            "kraken" => Ok(ExchangeId::Kraken),
            "kucoin" => Ok(ExchangeId::Kucoin),
            "poloniex" => Ok(ExchangeId::Poloniex),
            other => Err(format!("unknown venue: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_id_round_trip() {
        for id in [
            ExchangeId::Binance,
            ExchangeId::Bybit,
            ExchangeId::Bitget,
            ExchangeId::Poloniex,
        ] {
            assert_eq!(id.as_str().parse::<ExchangeId>().unwrap(), id);
        }
    }

    #[test]
    fn test_gateio_aliases() {
        assert_eq!("gate.io".parse::<ExchangeId>().unwrap(), ExchangeId::Gateio);
    }
}
