//! Stream session lifecycle against a local mock venue: after a forced disconnect the
//! session reconnects, re-sends the full subscription set, and emits a missed-window
//! notification per channel before any new data.

use chrono::Utc;
use quantra_data::{
    bus::MarketBus,
    connector::{ParsedFrame, StreamConnector, StreamCredentials},
    event::{DataKind, MarketEvent, Ticker},
    session::{ReconnectionBackoffPolicy, StreamSession},
    subscription::{ChannelKind, Subscription},
};
use quantra_instrument::{exchange::ExchangeId, symbol::Symbol};
use quantra_integration::{error::SocketError, protocol::websocket::WsMessage};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Minimal wire protocol for the mock venue.
#[derive(Debug)]
struct MockConnector {
    url: String,
}

#[derive(Debug, Deserialize)]
struct MockTickerFrame {
    symbol: String,
    ts: u64,
    bid: Decimal,
    ask: Decimal,
}

impl StreamConnector for MockConnector {
    fn id(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    fn url(&self) -> Result<Url, SocketError> {
        Url::parse(&self.url).map_err(SocketError::UrlParse)
    }

    fn subscribe_requests(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Vec<WsMessage>, SocketError> {
        let channels: Vec<String> = subscriptions
            .iter()
            .map(|subscription| subscription.id().to_string())
            .collect();
        Ok(vec![WsMessage::text(
            serde_json::json!({"op": "subscribe", "channels": channels}).to_string(),
        )])
    }

    fn unsubscribe_requests(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Vec<WsMessage>, SocketError> {
        let channels: Vec<String> = subscriptions
            .iter()
            .map(|subscription| subscription.id().to_string())
            .collect();
        Ok(vec![WsMessage::text(
            serde_json::json!({"op": "unsubscribe", "channels": channels}).to_string(),
        )])
    }

    fn auth_request(&self, _: &StreamCredentials) -> Result<Option<WsMessage>, SocketError> {
        Ok(None)
    }

    fn parse(&self, message: WsMessage) -> Result<ParsedFrame, SocketError> {
        let WsMessage::Text(payload) = message else {
            return Ok(ParsedFrame::Ignore);
        };
        let Ok(frame) = serde_json::from_str::<MockTickerFrame>(&payload) else {
            return Ok(ParsedFrame::Ignore);
        };
        let symbol: Symbol = frame.symbol.parse().unwrap();
        Ok(ParsedFrame::Market(vec![MarketEvent::new(
            chrono::DateTime::from_timestamp_millis(frame.ts as i64).unwrap(),
            Utc::now(),
            ExchangeId::Binance,
            symbol,
            DataKind::Ticker(Ticker::new(
                frame.bid,
                frame.ask,
                frame.bid,
                Decimal::ONE,
                Decimal::ONE,
            )),
        )]))
    }
}

/// Accepts two connections: the first is killed after one ticker, the second stays up.
async fn run_mock_venue(
    listener: TcpListener,
    subscribe_payloads: Arc<Mutex<Vec<String>>>,
) {
    for connection in 0..2u64 {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut websocket) = tokio_tungstenite::accept_async(stream).await else {
            return;
        };

        use futures_util::{SinkExt, StreamExt};

        // Record the subscribe request this connection receives.
        while let Some(Ok(message)) = websocket.next().await {
            if let WsMessage::Text(payload) = message {
                if payload.contains("subscribe") {
                    subscribe_payloads.lock().await.push(payload.to_string());
                    break;
                }
            }
        }

        let ticker = serde_json::json!({
            "symbol": "BTC/USDT",
            "ts": 1_700_000_000_000u64 + connection * 1_000,
            "bid": "42000.1",
            "ask": "42000.9",
        })
        .to_string();
        let _ = websocket.send(WsMessage::text(ticker)).await;

        if connection == 0 {
            // Force a disconnect without a close handshake.
            drop(websocket);
        } else {
            // Hold the second connection open until the test finishes.
            while let Some(Ok(_)) = websocket.next().await {}
        }
    }
}

#[tokio::test]
async fn test_reconnect_resubscribes_and_emits_gap() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let subscribe_payloads = Arc::new(Mutex::new(Vec::new()));
    tokio::spawn(run_mock_venue(listener, Arc::clone(&subscribe_payloads)));

    let connector = Arc::new(MockConnector {
        url: format!("ws://{addr}"),
    });
    let bus = MarketBus::new();
    let symbol: Symbol = "BTC/USDT".parse().unwrap();
    let subscriber = bus.subscribe_default(ChannelKind::Ticker, symbol.clone());

    let backoff = ReconnectionBackoffPolicy {
        backoff_ms_initial: 50,
        backoff_multiplier: 1,
        backoff_ms_max: 100,
        jitter_pct: 0,
    };
    let (session, handle) = StreamSession::new(connector, bus, None, None, backoff);
    let cancel = CancellationToken::new();
    let session_task = tokio::spawn(session.run(cancel.clone()));

    handle.subscribe(vec![
        Subscription::new(ChannelKind::Ticker, symbol.clone()),
        Subscription::new(ChannelKind::Trade, symbol.clone()),
    ]);

    let received = tokio::time::timeout(Duration::from_secs(10), async {
        let mut events = Vec::new();
        // First ticker, gap notification, post-reconnect ticker.
        while events.len() < 3 {
            events.push(subscriber.recv().await.unwrap());
        }
        events
    })
    .await
    .expect("session did not deliver events in time");

    assert!(matches!(received[0].kind, DataKind::Ticker(_)));
    assert!(matches!(received[1].kind, DataKind::Gap(ChannelKind::Ticker)));
    assert!(matches!(received[2].kind, DataKind::Ticker(_)));

    // The second connection received the same subscription set as the first.
    let payloads = subscribe_payloads.lock().await;
    assert_eq!(payloads.len(), 2);
    let parse_channels = |payload: &str| -> Vec<String> {
        let value: serde_json::Value = serde_json::from_str(payload).unwrap();
        value["channels"]
            .as_array()
            .unwrap()
            .iter()
            .map(|channel| channel.as_str().unwrap().to_string())
            .collect()
    };
    let mut first = parse_channels(&payloads[0]);
    let mut second = parse_channels(&payloads[1]);
    first.sort();
    second.sort();
    assert_eq!(first, second);

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), session_task).await;
}
