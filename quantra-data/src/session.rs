use crate::{
    account::AccountEvent,
    bus::MarketBus,
    connector::{ParsedFrame, StreamConnector, StreamCredentials},
    event::{DataKind, MarketEvent},
    subscription::{Subscription, SubscriptionSet},
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use quantra_integration::{
    channel::{Tx, UnboundedTx},
    error::SocketError,
    protocol::websocket::{self, WsMessage, WsSink, WsStream, is_websocket_disconnected},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reconnection backoff policy for a [`StreamSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectionBackoffPolicy {
    /// Initial backoff millisecond duration after the first `Stream` disconnection.
    ///
    /// This value then scales with the `backoff_multiplier` in the case of repeated
    /// failed reconnection attempts.
    pub backoff_ms_initial: u64,

    /// Scaling factor for the backoff duration in the case of repeated reconnection
    /// attempts.
    pub backoff_multiplier: u8,

    /// Maximum possible backoff duration between reconnection attempts.
    pub backoff_ms_max: u64,

    /// Random jitter applied on top of the calculated backoff duration, as a
    /// percentage of it. A value of 20 yields sleeps in `[0.8x, 1.2x]`.
    pub jitter_pct: u8,
}

impl Default for ReconnectionBackoffPolicy {
    fn default() -> Self {
        Self {
            backoff_ms_initial: 1_000,
            backoff_multiplier: 2,
            backoff_ms_max: 30_000,
            jitter_pct: 20,
        }
    }
}

#[derive(Debug, Clone)]
struct ReconnectionState {
    policy: ReconnectionBackoffPolicy,
    backoff_ms_current: u64,
}

impl From<ReconnectionBackoffPolicy> for ReconnectionState {
    fn from(policy: ReconnectionBackoffPolicy) -> Self {
        Self {
            backoff_ms_current: policy.backoff_ms_initial,
            policy,
        }
    }
}

impl ReconnectionState {
    fn reset_backoff(&mut self) {
        self.backoff_ms_current = self.policy.backoff_ms_initial;
    }

    fn multiply_backoff(&mut self) {
        let next = self.backoff_ms_current * self.policy.backoff_multiplier as u64;
        self.backoff_ms_current = std::cmp::min(next, self.policy.backoff_ms_max);
    }

    fn generate_sleep_duration(&self) -> Duration {
        let base = self.backoff_ms_current as f64;
        let jitter = self.policy.jitter_pct as f64 / 100.0;
        let factor = 1.0 - jitter + rand::random::<f64>() * jitter * 2.0;
        Duration::from_millis((base * factor) as u64)
    }
}

/// Lifecycle states of a [`StreamSession`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    Reconnecting,
}

#[derive(Debug)]
enum SessionCommand {
    Subscribe(Vec<Subscription>),
    Unsubscribe(Vec<Subscription>),
}

/// Cloneable front for issuing subscription changes to a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    cmd_tx: mpsc::UnboundedSender<SessionCommand>,
    state: Arc<parking_lot::RwLock<SessionState>>,
}

impl SessionHandle {
    /// Request subscriptions; duplicates of already-active subscriptions are idempotent.
    pub fn subscribe(&self, subscriptions: Vec<Subscription>) {
        let _ = self.cmd_tx.send(SessionCommand::Subscribe(subscriptions));
    }

    /// Request unsubscriptions; unknown subscriptions are a no-op.
    pub fn unsubscribe(&self, subscriptions: Vec<Subscription>) {
        let _ = self.cmd_tx.send(SessionCommand::Unsubscribe(subscriptions));
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }
}

/// One persistent streaming connection to a venue.
///
/// The session owns the socket and the subscription set. On any error it transitions to
/// `Reconnecting`, re-establishes the connection with exponential backoff and jitter,
/// re-authenticates private channels, re-sends every active subscription, and emits one
/// missed-window [`DataKind::Gap`] notification per channel before dispatching new data.
pub struct StreamSession {
    connector: Arc<dyn StreamConnector>,
    bus: MarketBus,
    credentials: Option<StreamCredentials>,
    account_tx: Option<UnboundedTx<AccountEvent>>,
    backoff: ReconnectionBackoffPolicy,
    subscriptions: SubscriptionSet,
    cmd_rx: mpsc::UnboundedReceiver<SessionCommand>,
    state: Arc<parking_lot::RwLock<SessionState>>,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("exchange", &self.connector.id())
            .field("subscriptions", &self.subscriptions)
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        bus: MarketBus,
        credentials: Option<StreamCredentials>,
        account_tx: Option<UnboundedTx<AccountEvent>>,
        backoff: ReconnectionBackoffPolicy,
    ) -> (Self, SessionHandle) {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let state = Arc::new(parking_lot::RwLock::new(SessionState::Disconnected));
        let session = Self {
            connector,
            bus,
            credentials,
            account_tx,
            backoff,
            subscriptions: SubscriptionSet::new(),
            cmd_rx,
            state: Arc::clone(&state),
        };
        let handle = SessionHandle { cmd_tx, state };
        (session, handle)
    }

    fn set_state(&self, state: SessionState) {
        *self.state.write() = state;
    }

    /// Drive the session until the cancellation token fires.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), SocketError> {
        let exchange = self.connector.id();
        let mut reconnection = ReconnectionState::from(self.backoff.clone());
        let mut first_connect = true;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.set_state(SessionState::Connecting);
            let url = self.connector.url()?;
            let websocket = match websocket::connect(url).await {
                Ok(websocket) => websocket,
                Err(error) => {
                    let sleep = reconnection.generate_sleep_duration();
                    warn!(%exchange, ?error, ?sleep, "stream connect failed - backing off");
                    reconnection.multiply_backoff();
                    self.set_state(SessionState::Reconnecting);
                    tokio::select! {
                        _ = tokio::time::sleep(sleep) => continue,
                        _ = cancel.cancelled() => break,
                    }
                }
            };

            info!(%exchange, "stream connected");
            reconnection.reset_backoff();
            self.set_state(SessionState::Connected);
            let (mut sink, mut stream) = websocket.split();

            if let Err(error) = self.establish(&mut sink, &mut stream, first_connect).await {
                warn!(%exchange, ?error, "stream establishment failed - reconnecting");
                self.set_state(SessionState::Reconnecting);
                continue;
            }
            first_connect = false;

            match self.dispatch(&mut sink, &mut stream, &cancel).await {
                DispatchEnd::Cancelled => break,
                DispatchEnd::Reconnect => {
                    let sleep = reconnection.generate_sleep_duration();
                    warn!(%exchange, ?sleep, "stream lost - backing off before reconnect");
                    reconnection.multiply_backoff();
                    self.set_state(SessionState::Reconnecting);
                    tokio::select! {
                        _ = tokio::time::sleep(sleep) => {}
                        _ = cancel.cancelled() => break,
                    }
                }
            }
        }

        self.set_state(SessionState::Disconnected);
        info!(%exchange, "stream session stopped");
        Ok(())
    }

    /// Authenticate (when private channels are active) and re-send the full active
    /// subscription set, emitting one gap notification per channel on reconnects.
    async fn establish(
        &mut self,
        sink: &mut WsSink,
        stream: &mut WsStream,
        first_connect: bool,
    ) -> Result<(), SocketError> {
        if self.subscriptions.has_private() {
            self.authenticate(sink, stream).await;
        }

        let active: Vec<Subscription> = self.subscriptions.iter().cloned().collect();
        if !active.is_empty() {
            for request in self.connector.subscribe_requests(&active)? {
                sink.send(request).await?;
            }
            self.set_state(SessionState::Subscribed);
        }

        if !first_connect {
            for subscription in &active {
                if subscription.channel.is_private() {
                    continue;
                }
                let gap = MarketEvent::new(
                    Utc::now(),
                    Utc::now(),
                    self.connector.id(),
                    subscription.symbol.clone(),
                    DataKind::Gap(subscription.channel),
                );
                self.bus.publish(gap).await;
            }
        }

        Ok(())
    }

    /// Perform the user-channel auth handshake. Failure keeps the session connected
    /// for public channels but drops the private subscriptions.
    async fn authenticate(&mut self, sink: &mut WsSink, stream: &mut WsStream) {
        let exchange = self.connector.id();
        let Some(credentials) = &self.credentials else {
            error!(%exchange, "private subscriptions active but no credentials configured");
            self.drop_private_subscriptions();
            return;
        };

        let request = match self.connector.auth_request(credentials) {
            Ok(Some(request)) => request,
            // Venue authenticates out-of-band (eg/ listen-key url).
            Ok(None) => return,
            Err(error) => {
                error!(%exchange, ?error, "building auth request failed");
                self.drop_private_subscriptions();
                return;
            }
        };

        if let Err(error) = sink.send(request).await {
            warn!(%exchange, ?error, "sending auth request failed");
            return;
        }

        let deadline = tokio::time::sleep(Duration::from_secs(10));
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => {
                    error!(%exchange, "auth handshake timed out");
                    self.drop_private_subscriptions();
                    return;
                }
                frame = stream.next() => match frame {
                    Some(Ok(message)) => match self.connector.parse(message) {
                        Ok(ParsedFrame::AuthAck { success: true, .. }) => {
                            info!(%exchange, "user channel authenticated");
                            return;
                        }
                        Ok(ParsedFrame::AuthAck { success: false, context }) => {
                            error!(%exchange, %context, "authentication rejected");
                            self.drop_private_subscriptions();
                            return;
                        }
                        _ => continue,
                    },
                    _ => {
                        warn!(%exchange, "stream closed during auth handshake");
                        return;
                    }
                }
            }
        }
    }

    fn drop_private_subscriptions(&mut self) {
        let private: Vec<Subscription> = self
            .subscriptions
            .iter()
            .filter(|subscription| subscription.channel.is_private())
            .cloned()
            .collect();
        self.subscriptions.remove(private);
    }

    async fn dispatch(
        &mut self,
        sink: &mut WsSink,
        stream: &mut WsStream,
        cancel: &CancellationToken,
    ) -> DispatchEnd {
        let exchange = self.connector.id();
        let ping_interval = self.connector.ping_interval();
        let pong_timeout = self.connector.pong_timeout();
        let mut ping_timer = tokio::time::interval(ping_interval);
        // First tick fires immediately; skip it so the first ping waits a full interval.
        ping_timer.tick().await;
        let mut awaiting_pong: Option<tokio::time::Instant> = None;
        let mut commands_open = true;

        loop {
            let pong_deadline = awaiting_pong
                .map(|since| since + pong_timeout)
                .unwrap_or_else(|| tokio::time::Instant::now() + Duration::from_secs(86_400));

            tokio::select! {
                _ = cancel.cancelled() => {
                    self.close(sink).await;
                    return DispatchEnd::Cancelled;
                }
                _ = ping_timer.tick() => {
                    if sink.send(self.connector.ping_message()).await.is_err() {
                        return DispatchEnd::Reconnect;
                    }
                    if awaiting_pong.is_none() {
                        awaiting_pong = Some(tokio::time::Instant::now());
                    }
                }
                _ = tokio::time::sleep_until(pong_deadline), if awaiting_pong.is_some() => {
                    warn!(%exchange, "no pong within timeout - declaring link dead");
                    return DispatchEnd::Reconnect;
                }
                command = self.cmd_rx.recv(), if commands_open => match command {
                    Some(command) => {
                        if self.handle_command(sink, command).await.is_err() {
                            return DispatchEnd::Reconnect;
                        }
                    }
                    // All handles dropped: keep streaming with the current set.
                    None => commands_open = false,
                },
                frame = stream.next() => match frame {
                    None => {
                        warn!(%exchange, "stream closed by venue");
                        return DispatchEnd::Reconnect;
                    }
                    Some(Err(error)) => {
                        if is_websocket_disconnected(&error) {
                            warn!(%exchange, ?error, "stream transport error");
                            return DispatchEnd::Reconnect;
                        }
                        debug!(%exchange, ?error, "recoverable stream error");
                    }
                    Some(Ok(WsMessage::Ping(payload))) => {
                        let _ = sink.send(WsMessage::Pong(payload)).await;
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        awaiting_pong = None;
                    }
                    Some(Ok(message)) => match self.connector.parse(message) {
                        Ok(parsed) => {
                            if self.handle_frame(parsed, &mut awaiting_pong).await.is_err() {
                                return DispatchEnd::Reconnect;
                            }
                        }
                        Err(SocketError::Terminated(context)) => {
                            warn!(%exchange, %context, "venue closed the stream");
                            return DispatchEnd::Reconnect;
                        }
                        Err(error) => {
                            debug!(%exchange, ?error, "failed to parse frame");
                        }
                    },
                }
            }
        }
    }

    async fn handle_command(
        &mut self,
        sink: &mut WsSink,
        command: SessionCommand,
    ) -> Result<(), SocketError> {
        match command {
            SessionCommand::Subscribe(subscriptions) => {
                let added = self.subscriptions.add(subscriptions);
                if !added.is_empty() {
                    for request in self.connector.subscribe_requests(&added)? {
                        sink.send(request).await?;
                    }
                    self.set_state(SessionState::Subscribed);
                }
            }
            SessionCommand::Unsubscribe(subscriptions) => {
                let removed = self.subscriptions.remove(subscriptions);
                if !removed.is_empty() {
                    for request in self.connector.unsubscribe_requests(&removed)? {
                        sink.send(request).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn handle_frame(
        &mut self,
        parsed: ParsedFrame,
        awaiting_pong: &mut Option<tokio::time::Instant>,
    ) -> Result<(), ()> {
        let exchange = self.connector.id();
        match parsed {
            ParsedFrame::Market(events) => {
                for event in events {
                    self.bus.publish(event).await;
                }
            }
            ParsedFrame::Account(events) => {
                if let Some(tx) = &self.account_tx {
                    for event in events {
                        if tx.send(event).is_err() {
                            error!(%exchange, "account event receiver dropped");
                            return Err(());
                        }
                    }
                }
            }
            ParsedFrame::Pong => *awaiting_pong = None,
            ParsedFrame::SubAck { success: true, context } => {
                debug!(%exchange, %context, "subscription acknowledged");
            }
            ParsedFrame::SubAck { success: false, context } => {
                warn!(%exchange, %context, "subscription rejected by venue");
            }
            ParsedFrame::AuthAck { success: false, context } => {
                error!(%exchange, %context, "authentication rejected mid-session");
                self.drop_private_subscriptions();
            }
            ParsedFrame::AuthAck { success: true, .. } | ParsedFrame::Ignore => {}
        }
        Ok(())
    }

    /// Orderly teardown: unsubscribe the active set and close the socket.
    async fn close(&mut self, sink: &mut WsSink) {
        let active: Vec<Subscription> = self.subscriptions.iter().cloned().collect();
        if !active.is_empty()
            && let Ok(requests) = self.connector.unsubscribe_requests(&active)
        {
            for request in requests {
                if sink.send(request).await.is_err() {
                    break;
                }
            }
        }
        let _ = sink.send(WsMessage::Close(None)).await;
        let _ = sink.close().await;
    }
}

enum DispatchEnd {
    Cancelled,
    Reconnect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_jitter_within_bounds() {
        let policy = ReconnectionBackoffPolicy::default();
        let state = ReconnectionState::from(policy.clone());
        for _ in 0..32 {
            let sleep = state.generate_sleep_duration();
            assert!(sleep >= Duration::from_millis(800));
            assert!(sleep <= Duration::from_millis(1200));
        }
    }

    #[test]
    fn test_backoff_multiplies_and_caps() {
        let mut state = ReconnectionState::from(ReconnectionBackoffPolicy::default());
        let mut expected = 1_000u64;
        for _ in 0..8 {
            assert_eq!(state.backoff_ms_current, expected);
            state.multiply_backoff();
            expected = (expected * 2).min(30_000);
        }
        assert_eq!(state.backoff_ms_current, 30_000);
        state.reset_backoff();
        assert_eq!(state.backoff_ms_current, 1_000);
    }
}
