use crate::{account::AccountEvent, event::MarketEvent, subscription::Subscription};
use quantra_instrument::exchange::ExchangeId;
use quantra_integration::{error::SocketError, protocol::websocket::WsMessage};
use std::time::Duration;
use url::Url;

/// Credentials used for the user-channel auth handshake.
#[derive(Debug, Clone)]
pub struct StreamCredentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: Option<String>,
}

/// Outcome of parsing one inbound WebSocket frame.
#[derive(Debug)]
pub enum ParsedFrame {
    /// Normalised public market events ready for the bus.
    Market(Vec<MarketEvent>),
    /// Normalised private account events for the execution engine.
    Account(Vec<AccountEvent>),
    /// Venue acknowledgement of a subscribe/unsubscribe request.
    SubAck { success: bool, context: String },
    /// Venue acknowledgement of the auth handshake.
    AuthAck { success: bool, context: String },
    /// Application-level heartbeat answer.
    Pong,
    /// Frame carrying nothing the session cares about.
    Ignore,
}

/// Venue-specific half of a [`StreamSession`](crate::session::StreamSession): wire formats
/// for subscribe/auth requests and normalisation of inbound frames.
///
/// Implementations hold no connection state - the session owns the socket and its
/// lifecycle; the connector is consulted for payloads and parsing only.
pub trait StreamConnector: Send + Sync {
    fn id(&self) -> ExchangeId;

    /// WebSocket endpoint to connect to.
    fn url(&self) -> Result<Url, SocketError>;

    /// Cadence at which the session sends pings.
    fn ping_interval(&self) -> Duration {
        Duration::from_secs(20)
    }

    /// How long after an unanswered ping the link is declared dead.
    fn pong_timeout(&self) -> Duration {
        Duration::from_secs(10)
    }

    /// Heartbeat message. Protocol-level ping by default; venues with application-level
    /// heartbeats override this.
    fn ping_message(&self) -> WsMessage {
        WsMessage::Ping(Vec::new().into())
    }

    /// Wire messages subscribing to the provided set.
    fn subscribe_requests(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Vec<WsMessage>, SocketError>;

    /// Wire messages unsubscribing from the provided set.
    fn unsubscribe_requests(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Vec<WsMessage>, SocketError>;

    /// Auth handshake message for private channels, or `None` when the venue
    /// authenticates out-of-band (eg/ listen-key in the connection url).
    fn auth_request(
        &self,
        credentials: &StreamCredentials,
    ) -> Result<Option<WsMessage>, SocketError>;

    /// Normalise one inbound frame.
    fn parse(&self, message: WsMessage) -> Result<ParsedFrame, SocketError>;
}
