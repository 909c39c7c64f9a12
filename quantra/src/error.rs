use quantra_integration::error::ExchangeError;
use thiserror::Error;

/// Top-level engine failure, mapped onto process exit codes.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("unrecoverable adapter error: {0}")]
    Adapter(String),

    #[error("state file corrupt: {0}")]
    StateCorrupt(String),

    #[error("interrupted")]
    Interrupted,

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Process exit code contract: 0 clean, 1 configuration, 2 adapter,
    /// 3 state corruption, 130 interrupted.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Config(_) => 1,
            EngineError::Adapter(_) => 2,
            EngineError::StateCorrupt(_) => 3,
            EngineError::Interrupted => 130,
            EngineError::Internal(_) => 2,
        }
    }
}

impl From<ExchangeError> for EngineError {
    fn from(error: ExchangeError) -> Self {
        match error {
            ExchangeError::Config(message) => EngineError::Config(message),
            ExchangeError::StateCorrupt(message) => EngineError::StateCorrupt(message),
            other => EngineError::Adapter(other.to_string()),
        }
    }
}
