use crate::Unrecoverable;
use thiserror::Error;

/// All socket IO related errors generated by the transport layer.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error("Sink error")]
    Sink,

    #[error("Deserialising JSON error: {error} for payload: {payload}")]
    Deserialise {
        error: serde_json::Error,
        payload: String,
    },

    #[error("Deserialising JSON error: {error} for binary payload: {payload:?}")]
    DeserialiseBinary {
        error: serde_json::Error,
        payload: Vec<u8>,
    },

    #[error("Serialising JSON error: {0}")]
    Serialise(serde_json::Error),

    #[error("SerDe url encoding serialisation error: {0}")]
    UrlEncoded(#[from] serde_urlencoded::ser::Error),

    #[error("error parsing Url: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("error subscribing to resources over the socket: {0}")]
    Subscribe(String),

    #[error("ExchangeStream terminated with closing frame: {0}")]
    Terminated(String),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("HTTP request timed out")]
    HttpTimeout(reqwest::Error),

    #[error("HTTP response (status={0}) error: {1}")]
    HttpResponse(reqwest::StatusCode, String),

    #[error("consumed unidentifiable message: {0}")]
    Unidentifiable(String),

    #[error("consumed error message from venue: {0}")]
    Exchange(String),
}

impl From<reqwest::Error> for SocketError {
    fn from(error: reqwest::Error) -> Self {
        match error {
            error if error.is_timeout() => SocketError::HttpTimeout(error),
            error => SocketError::Http(error),
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SocketError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        SocketError::WebSocket(Box::new(error))
    }
}

/// Engine-wide error taxonomy.
///
/// Every component maps its failures into these kinds before they cross a
/// component boundary, so propagation policy can be written once against the
/// kind rather than per venue.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("venue rate limit hit (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("order request sent but outcome unknown (client_id={client_id})")]
    UncertainPlacement { client_id: String },

    #[error("venue rejected order: {0}")]
    InvalidOrder(String),

    #[error("{venue} does not support: {item}")]
    Unsupported { venue: &'static str, item: String },

    #[error("kill switch engaged")]
    KillSwitch,

    #[error("drawdown limit breached: drawdown={drawdown} limit={limit}")]
    Drawdown { drawdown: String, limit: String },

    #[error("risk gate rejected intent: {0}")]
    RiskRejected(String),

    #[error("persisted state failed integrity check: {0}")]
    StateCorrupt(String),

    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl ExchangeError {
    /// Transient errors may be retried within the caller's retry budget.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::Network(_) | ExchangeError::RateLimited { .. }
        )
    }

    /// Venue-signalled `Retry-After`, where one was provided.
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            ExchangeError::RateLimited {
                retry_after_ms: Some(ms),
            } => Some(std::time::Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

impl From<SocketError> for ExchangeError {
    fn from(error: SocketError) -> Self {
        match error {
            SocketError::Http(inner) | SocketError::HttpTimeout(inner) => {
                ExchangeError::Network(inner.to_string())
            }
            SocketError::WebSocket(inner) => ExchangeError::Network(inner.to_string()),
            SocketError::HttpResponse(status, _) if status.as_u16() == 429 => {
                ExchangeError::RateLimited {
                    retry_after_ms: None,
                }
            }
            SocketError::HttpResponse(status, body) if status.is_server_error() => {
                ExchangeError::Network(format!("status={status} body={body}"))
            }
            SocketError::HttpResponse(status, body) => {
                ExchangeError::InvalidOrder(format!("status={status} body={body}"))
            }
            other => ExchangeError::Internal(other.to_string()),
        }
    }
}

impl Unrecoverable for ExchangeError {
    fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            ExchangeError::Internal(_) | ExchangeError::StateCorrupt(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_kinds() {
        assert!(ExchangeError::Network("dns".into()).is_transient());
        assert!(
            ExchangeError::RateLimited {
                retry_after_ms: Some(500)
            }
            .is_transient()
        );
        assert!(!ExchangeError::InvalidOrder("precision".into()).is_transient());
        assert!(
            !ExchangeError::UncertainPlacement {
                client_id: "cid".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_retry_after_surfaced() {
        let err = ExchangeError::RateLimited {
            retry_after_ms: Some(1500),
        };
        assert_eq!(
            err.retry_after(),
            Some(std::time::Duration::from_millis(1500))
        );
        assert_eq!(ExchangeError::KillSwitch.retry_after(), None);
    }
}
