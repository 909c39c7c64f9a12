use crate::error::EngineError;
use base64::Engine as _;
use quantra_instrument::symbol::Symbol;
use quantra_risk::RiskConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variables override any configuration leaf:
/// `CRYPTO_TRADING_<UPPER__DOT__PATH>` (eg/ `CRYPTO_TRADING_TRADING__MAX_POSITIONS=5`).
const ENV_PREFIX: &str = "CRYPTO_TRADING_";

/// A complete base64-encoded YAML document supplied via the environment takes
/// precedence over the config file.
const ENV_CONFIG_B64: &str = "CRYPTO_TOOL_CONFIG_B64";

/// Engine configuration, loaded from a YAML document at startup.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub exchanges: HashMap<String, ExchangeConfig>,
    pub trading: TradingConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    /// Hard gate: false means every placement is a dry run.
    #[serde(default)]
    pub enable_live_trading: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_base_currency")]
    pub base_currency: String,
    #[serde(default = "default_initial_balance")]
    pub initial_balance: Decimal,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExchangeConfig {
    pub api_key: String,
    pub secret: String,
    #[serde(default)]
    pub passphrase: Option<String>,
    #[serde(default)]
    pub sandbox: bool,
    /// Requests per minute admitted by the client-side limiter.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_true")]
    pub enable_rate_limit: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TradingConfig {
    pub symbols: Vec<Symbol>,
    pub strategies: Vec<String>,
    #[serde(default = "default_max_positions")]
    pub max_positions: usize,
    #[serde(default)]
    pub risk_management: RiskManagementConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RiskManagementConfig {
    #[serde(default = "default_max_position_size")]
    pub max_position_size: Decimal,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: usize,
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
    #[serde(default = "default_max_risk_per_trade")]
    pub max_risk_per_trade: Decimal,
}

impl Default for RiskManagementConfig {
    fn default() -> Self {
        Self {
            max_position_size: default_max_position_size(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            max_daily_trades: default_max_daily_trades(),
            max_drawdown_pct: default_max_drawdown_pct(),
            max_risk_per_trade: default_max_risk_per_trade(),
        }
    }
}

impl From<&RiskManagementConfig> for RiskConfig {
    fn from(config: &RiskManagementConfig) -> Self {
        Self {
            max_risk_per_trade: config.max_risk_per_trade,
            max_position_size: config.max_position_size,
            stop_loss_pct: config.stop_loss_pct,
            take_profit_pct: config.take_profit_pct,
            max_daily_trades: config.max_daily_trades,
            max_drawdown: config.max_drawdown_pct,
        }
    }
}

/// Monitoring endpoints are external collaborators; the block is parsed and exposed
/// so they can consume it.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub opentelemetry: OpenTelemetryConfig,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub endpoint: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OpenTelemetryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub insecure: bool,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct HealthConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub live_endpoint: String,
    #[serde(default)]
    pub ready_endpoint: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from("portfolio.json")
}

fn default_base_currency() -> String {
    "USDT".to_string()
}

fn default_initial_balance() -> Decimal {
    dec!(10000)
}

fn default_rate_limit() -> u32 {
    1200
}

fn default_true() -> bool {
    true
}

fn default_max_positions() -> usize {
    3
}

fn default_max_position_size() -> Decimal {
    dec!(0.1)
}

fn default_stop_loss_pct() -> Decimal {
    dec!(0.02)
}

fn default_take_profit_pct() -> Decimal {
    dec!(0.04)
}

fn default_max_daily_trades() -> usize {
    20
}

fn default_max_drawdown_pct() -> Decimal {
    dec!(0.1)
}

fn default_max_risk_per_trade() -> Decimal {
    dec!(0.01)
}

impl Config {
    /// Load configuration: `CRYPTO_TOOL_CONFIG_B64` wins over the file; environment
    /// variable leaf overrides are applied either way.
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let document = match std::env::var(ENV_CONFIG_B64) {
            Ok(blob) => {
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(blob.trim())
                    .map_err(|error| {
                        EngineError::Config(format!("{ENV_CONFIG_B64}: {error}"))
                    })?;
                String::from_utf8(decoded).map_err(|error| {
                    EngineError::Config(format!("{ENV_CONFIG_B64} is not utf-8: {error}"))
                })?
            }
            Err(_) => {
                let path = path.ok_or_else(|| {
                    EngineError::Config("no config file provided".to_string())
                })?;
                std::fs::read_to_string(path).map_err(|error| {
                    EngineError::Config(format!("{}: {error}", path.display()))
                })?
            }
        };
        Self::from_yaml_with_env(&document, std::env::vars())
    }

    /// Parse a YAML document, applying `CRYPTO_TRADING_*` overrides from `env`.
    pub fn from_yaml_with_env(
        document: &str,
        env: impl Iterator<Item = (String, String)>,
    ) -> Result<Self, EngineError> {
        let mut value: serde_yaml::Value = serde_yaml::from_str(document)
            .map_err(|error| EngineError::Config(format!("yaml parse: {error}")))?;

        for (key, raw) in env {
            let Some(path) = key.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let segments: Vec<String> = path
                .split("__")
                .map(|segment| segment.to_lowercase())
                .collect();
            apply_override(&mut value, &segments, &raw);
        }

        let config: Config = serde_yaml::from_value(value)
            .map_err(|error| EngineError::Config(format!("config structure: {error}")))?;
        config.validate()
    }

    fn validate(self) -> Result<Self, EngineError> {
        if self.trading.symbols.is_empty() {
            return Err(EngineError::Config(
                "trading.symbols must not be empty".to_string(),
            ));
        }
        if self.trading.strategies.is_empty() {
            return Err(EngineError::Config(
                "trading.strategies must not be empty".to_string(),
            ));
        }
        if self.enable_live_trading {
            for (venue, exchange) in &self.exchanges {
                if exchange.api_key.is_empty() || exchange.secret.is_empty() {
                    return Err(EngineError::Config(format!(
                        "live trading enabled but {venue} credentials are missing"
                    )));
                }
            }
            if self.exchanges.is_empty() {
                return Err(EngineError::Config(
                    "live trading enabled but no exchanges configured".to_string(),
                ));
            }
        }
        Ok(self)
    }
}

/// Set a scalar leaf at `segments`, creating intermediate mappings as needed. The raw
/// value is parsed as YAML so booleans and numbers keep their types.
fn apply_override(value: &mut serde_yaml::Value, segments: &[String], raw: &str) {
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };

    let mut cursor = value;
    for parent in parents {
        if !cursor.is_mapping() {
            return;
        }
        let mapping = cursor.as_mapping_mut().expect("checked is_mapping");
        let key = serde_yaml::Value::String(parent.clone());
        cursor = mapping
            .entry(key)
            .or_insert_with(|| serde_yaml::Value::Mapping(Default::default()));
    }

    if let Some(mapping) = cursor.as_mapping_mut() {
        let parsed = serde_yaml::from_str(raw)
            .unwrap_or_else(|_| serde_yaml::Value::String(raw.to_string()));
        mapping.insert(serde_yaml::Value::String(leaf.clone()), parsed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
exchanges:
  binance:
    api_key: "key"
    secret: "secret"
    sandbox: true
    rate_limit: 600
trading:
  symbols: ["BTC/USDT", "ETH/USDT"]
  strategies: ["ma_cross", "rsi"]
  max_positions: 5
  risk_management:
    max_position_size: 0.2
    stop_loss_pct: 0.03
enable_live_trading: false
log_level: debug
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = Config::from_yaml_with_env(SAMPLE, std::iter::empty()).unwrap();
        assert_eq!(config.trading.symbols.len(), 2);
        assert_eq!(config.trading.max_positions, 5);
        assert_eq!(config.trading.risk_management.max_position_size, dec!(0.2));
        // Defaults fill unspecified leaves.
        assert_eq!(config.trading.risk_management.max_daily_trades, 20);
        assert!(!config.enable_live_trading);
        assert_eq!(config.log_level, "debug");
        assert!(config.exchanges["binance"].sandbox);
    }

    #[test]
    fn test_env_overrides_leaves() {
        let env = vec![
            (
                "CRYPTO_TRADING_TRADING__MAX_POSITIONS".to_string(),
                "9".to_string(),
            ),
            (
                "CRYPTO_TRADING_ENABLE_LIVE_TRADING".to_string(),
                "true".to_string(),
            ),
            (
                "CRYPTO_TRADING_EXCHANGES__BINANCE__API_KEY".to_string(),
                "env-key".to_string(),
            ),
            ("UNRELATED".to_string(), "ignored".to_string()),
        ];
        let config = Config::from_yaml_with_env(SAMPLE, env.into_iter()).unwrap();
        assert_eq!(config.trading.max_positions, 9);
        assert!(config.enable_live_trading);
        assert_eq!(config.exchanges["binance"].api_key, "env-key");
    }

    #[test]
    fn test_empty_symbols_rejected() {
        let document = r#"
trading:
  symbols: []
  strategies: ["rsi"]
"#;
        assert!(matches!(
            Config::from_yaml_with_env(document, std::iter::empty()),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_live_trading_requires_credentials() {
        let document = r#"
exchanges:
  binance:
    api_key: ""
    secret: ""
trading:
  symbols: ["BTC/USDT"]
  strategies: ["rsi"]
enable_live_trading: true
"#;
        assert!(matches!(
            Config::from_yaml_with_env(document, std::iter::empty()),
            Err(EngineError::Config(_))
        ));
    }

    #[test]
    fn test_risk_config_conversion() {
        let config = Config::from_yaml_with_env(SAMPLE, std::iter::empty()).unwrap();
        let risk: RiskConfig = (&config.trading.risk_management).into();
        assert_eq!(risk.max_position_size, dec!(0.2));
        assert_eq!(risk.stop_loss_pct, dec!(0.03));
    }
}
