//! Bybit stream connector (v5).
//!
//! Public market data and the authenticated private stream live on different
//! endpoints, so a session is constructed for one or the other. Private topics
//! (`execution`, `order`, `wallet`) are account-scoped: one wire subscription
//! covers every symbol.

use super::SymbolTable;
use crate::{
    account::{
        AccountEvent, AccountEventKind, BalanceUpdateEvent, FillEvent, OrderStatus,
        OrderUpdateEvent,
    },
    connector::{ParsedFrame, StreamConnector, StreamCredentials},
    event::{DataKind, Level, MarketEvent, OrderBookDelta, OrderBookSnapshot, PublicTrade, Ticker},
    subscription::{ChannelKind, Subscription},
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use quantra_instrument::{Side, asset::AssetName, exchange::ExchangeId, symbol::Symbol};
use quantra_integration::{
    de::datetime_utc_from_epoch_duration,
    error::SocketError,
    protocol::websocket::WsMessage,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use url::Url;

const BASE_URL_PUBLIC: &str = "wss://stream.bybit.com/v5/public/spot";
const BASE_URL_PRIVATE: &str = "wss://stream.bybit.com/v5/private";

/// [`StreamConnector`] for Bybit spot.
#[derive(Debug, Default)]
pub struct BybitStream {
    symbols: SymbolTable,
    private: bool,
}

impl BybitStream {
    /// Connector for the public market data endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector for the authenticated private endpoint.
    pub fn private() -> Self {
        Self {
            symbols: SymbolTable::default(),
            private: true,
        }
    }

    fn native(symbol: &Symbol) -> String {
        format!("{}{}", symbol.base(), symbol.quote())
    }

    fn topics(&self, subscriptions: &[Subscription]) -> Vec<String> {
        let mut topics = Vec::new();
        for subscription in subscriptions {
            let native = Self::native(&subscription.symbol);
            self.symbols.insert(&native, subscription.symbol.clone());
            match subscription.channel {
                ChannelKind::Ticker => topics.push(format!("tickers.{native}")),
                ChannelKind::Trade => topics.push(format!("publicTrade.{native}")),
                ChannelKind::OrderBook => topics.push(format!("orderbook.50.{native}")),
                ChannelKind::User => {
                    // Account-scoped: subscribe the private topics once.
                    for topic in ["execution", "order", "wallet"] {
                        if !topics.iter().any(|existing| existing == topic) {
                            topics.push(topic.to_string());
                        }
                    }
                }
            }
        }
        topics
    }

    fn op_request(&self, op: &str, subscriptions: &[Subscription]) -> Vec<WsMessage> {
        let topics = self.topics(subscriptions);
        if topics.is_empty() {
            return Vec::new();
        }
        vec![WsMessage::text(
            serde_json::json!({ "op": op, "args": topics }).to_string(),
        )]
    }

    fn resolve(&self, native: &str) -> Result<Symbol, SocketError> {
        self.symbols
            .get(native)
            .ok_or_else(|| SocketError::Unidentifiable(native.to_string()))
    }
}

impl StreamConnector for BybitStream {
    fn id(&self) -> ExchangeId {
        ExchangeId::Bybit
    }

    fn url(&self) -> Result<Url, SocketError> {
        let url = if self.private {
            BASE_URL_PRIVATE
        } else {
            BASE_URL_PUBLIC
        };
        Url::parse(url).map_err(SocketError::UrlParse)
    }

    fn ping_message(&self) -> WsMessage {
        WsMessage::text(r#"{"op":"ping"}"#)
    }

    fn subscribe_requests(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Vec<WsMessage>, SocketError> {
        Ok(self.op_request("subscribe", subscriptions))
    }

    fn unsubscribe_requests(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Vec<WsMessage>, SocketError> {
        Ok(self.op_request("unsubscribe", subscriptions))
    }

    fn auth_request(
        &self,
        credentials: &StreamCredentials,
    ) -> Result<Option<WsMessage>, SocketError> {
        let expires = Utc::now().timestamp_millis() + 5_000;
        let mut mac = Hmac::<Sha256>::new_from_slice(credentials.secret.as_bytes())
            .map_err(|error| SocketError::Subscribe(format!("invalid api secret: {error}")))?;
        mac.update(format!("GET/realtime{expires}").as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(Some(WsMessage::text(
            serde_json::json!({
                "op": "auth",
                "args": [credentials.api_key, expires, signature]
            })
            .to_string(),
        )))
    }

    fn parse(&self, message: WsMessage) -> Result<ParsedFrame, SocketError> {
        let WsMessage::Text(payload) = message else {
            return Ok(ParsedFrame::Ignore);
        };

        if let Ok(response) = serde_json::from_str::<BybitOpResponse>(&payload) {
            return Ok(match response.op.as_str() {
                "pong" => ParsedFrame::Pong,
                "ping" => ParsedFrame::Pong,
                "auth" => ParsedFrame::AuthAck {
                    success: response.success,
                    context: response.ret_msg.unwrap_or_default(),
                },
                _ => ParsedFrame::SubAck {
                    success: response.success,
                    context: response.ret_msg.unwrap_or_default(),
                },
            });
        }

        let Ok(frame) = serde_json::from_str::<BybitTopicFrame>(&payload) else {
            return Ok(ParsedFrame::Ignore);
        };
        let time_exchange = datetime_utc_from_epoch_duration(Duration::from_millis(frame.ts));

        if let Some(native) = frame.topic.strip_prefix("tickers.") {
            let symbol = self.resolve(native)?;
            let ticker: BybitTicker = serde_json::from_value(frame.data)
                .map_err(|error| SocketError::Deserialise {
                    error,
                    payload: payload.to_string(),
                })?;
            let last = ticker.last_price;
            return Ok(ParsedFrame::Market(vec![MarketEvent::new(
                time_exchange,
                Utc::now(),
                ExchangeId::Bybit,
                symbol,
                DataKind::Ticker(Ticker::new(
                    ticker.bid_price.unwrap_or(last),
                    ticker.ask_price.unwrap_or(last),
                    last,
                    ticker.volume_24h,
                    ticker.turnover_24h,
                )),
            )]));
        }

        if frame.topic.starts_with("publicTrade.") {
            let trades: Vec<BybitTrade> = serde_json::from_value(frame.data)
                .map_err(|error| SocketError::Deserialise {
                    error,
                    payload: payload.to_string(),
                })?;
            let events = trades
                .into_iter()
                .map(|trade| {
                    let symbol = self.resolve(&trade.market)?;
                    Ok(MarketEvent::new(
                        datetime_utc_from_epoch_duration(Duration::from_millis(trade.time_ms)),
                        Utc::now(),
                        ExchangeId::Bybit,
                        symbol,
                        DataKind::Trade(PublicTrade::new(
                            trade.id,
                            trade.price,
                            trade.quantity,
                            trade.side,
                        )),
                    ))
                })
                .collect::<Result<Vec<_>, SocketError>>()?;
            return Ok(ParsedFrame::Market(events));
        }

        if frame.topic.starts_with("orderbook.") {
            let book: BybitOrderBook = serde_json::from_value(frame.data)
                .map_err(|error| SocketError::Deserialise {
                    error,
                    payload: payload.to_string(),
                })?;
            let symbol = self.resolve(&book.market)?;
            let bids = book.bids.into_iter().map(Level::from).collect();
            let asks = book.asks.into_iter().map(Level::from).collect();
            let kind = match frame.frame_type.as_deref() {
                Some("snapshot") => {
                    DataKind::OrderBookSnapshot(OrderBookSnapshot::new(book.update_id, bids, asks))
                }
                _ => DataKind::OrderBookDelta(OrderBookDelta::new(
                    book.update_id,
                    book.update_id,
                    bids,
                    asks,
                )),
            };
            return Ok(ParsedFrame::Market(vec![MarketEvent::new(
                time_exchange,
                Utc::now(),
                ExchangeId::Bybit,
                symbol,
                kind,
            )]));
        }

        match frame.topic.as_str() {
            "execution" => {
                let executions: Vec<BybitExecution> = serde_json::from_value(frame.data)
                    .map_err(|error| SocketError::Deserialise {
                        error,
                        payload: payload.to_string(),
                    })?;
                let events = executions
                    .into_iter()
                    .map(|execution| {
                        let symbol = self.resolve(&execution.market)?;
                        Ok(AccountEvent::new(
                            ExchangeId::Bybit,
                            datetime_utc_from_epoch_duration(Duration::from_millis(
                                execution.exec_time_ms,
                            )),
                            AccountEventKind::Fill(FillEvent::new(
                                symbol,
                                execution.order_id,
                                Some(execution.order_link_id).filter(|id| !id.is_empty()),
                                execution.exec_id,
                                execution.side,
                                execution.exec_price,
                                execution.exec_qty,
                                execution.exec_fee,
                                None,
                            )),
                        ))
                    })
                    .collect::<Result<Vec<_>, SocketError>>()?;
                Ok(ParsedFrame::Account(events))
            }
            "order" => {
                let orders: Vec<BybitOrderUpdate> = serde_json::from_value(frame.data)
                    .map_err(|error| SocketError::Deserialise {
                        error,
                        payload: payload.to_string(),
                    })?;
                let events = orders
                    .into_iter()
                    .map(|order| {
                        let symbol = self.resolve(&order.market)?;
                        Ok(AccountEvent::new(
                            ExchangeId::Bybit,
                            time_exchange,
                            AccountEventKind::OrderUpdate(OrderUpdateEvent::new(
                                symbol,
                                order.order_id,
                                Some(order.order_link_id).filter(|id| !id.is_empty()),
                                order.order_status.into(),
                                order.cum_exec_qty,
                            )),
                        ))
                    })
                    .collect::<Result<Vec<_>, SocketError>>()?;
                Ok(ParsedFrame::Account(events))
            }
            "wallet" => {
                let wallets: Vec<BybitWallet> = serde_json::from_value(frame.data)
                    .map_err(|error| SocketError::Deserialise {
                        error,
                        payload: payload.to_string(),
                    })?;
                let events = wallets
                    .into_iter()
                    .flat_map(|wallet| wallet.coin)
                    .map(|coin| {
                        AccountEvent::new(
                            ExchangeId::Bybit,
                            time_exchange,
                            AccountEventKind::BalanceUpdate(BalanceUpdateEvent::new(
                                AssetName::new(&coin.coin),
                                coin.wallet_balance - coin.locked,
                                coin.locked,
                            )),
                        )
                    })
                    .collect();
                Ok(ParsedFrame::Account(events))
            }
            _ => Ok(ParsedFrame::Ignore),
        }
    }
}

/// Price/amount pair encoded as a two-element string array.
#[derive(Debug, Deserialize)]
struct BybitLevel(
    #[serde(with = "rust_decimal::serde::str")] Decimal,
    #[serde(with = "rust_decimal::serde::str")] Decimal,
);

impl From<BybitLevel> for Level {
    fn from(level: BybitLevel) -> Self {
        Level::new(level.0, level.1)
    }
}

#[derive(Debug, Deserialize)]
struct BybitOpResponse {
    op: String,
    #[serde(default)]
    success: bool,
    #[serde(default)]
    ret_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BybitTopicFrame {
    topic: String,
    #[serde(rename = "type", default)]
    frame_type: Option<String>,
    #[serde(default, alias = "creationTime")]
    ts: u64,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BybitTicker {
    #[serde(rename = "lastPrice", with = "rust_decimal::serde::str")]
    last_price: Decimal,
    #[serde(rename = "bid1Price", default, with = "rust_decimal::serde::str_option")]
    bid_price: Option<Decimal>,
    #[serde(rename = "ask1Price", default, with = "rust_decimal::serde::str_option")]
    ask_price: Option<Decimal>,
    #[serde(rename = "volume24h", with = "rust_decimal::serde::str")]
    volume_24h: Decimal,
    #[serde(rename = "turnover24h", with = "rust_decimal::serde::str")]
    turnover_24h: Decimal,
}

#[derive(Debug, Deserialize)]
struct BybitTrade {
    #[serde(rename = "T")]
    time_ms: u64,
    #[serde(rename = "s")]
    market: String,
    #[serde(rename = "S")]
    side: Side,
    #[serde(rename = "v", with = "rust_decimal::serde::str")]
    quantity: Decimal,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(rename = "i")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct BybitOrderBook {
    #[serde(rename = "s")]
    market: String,
    #[serde(rename = "b")]
    bids: Vec<BybitLevel>,
    #[serde(rename = "a")]
    asks: Vec<BybitLevel>,
    #[serde(rename = "u")]
    update_id: u64,
}

#[derive(Debug, Deserialize)]
struct BybitExecution {
    #[serde(rename = "symbol")]
    market: String,
    #[serde(rename = "orderId")]
    order_id: String,
    #[serde(rename = "orderLinkId", default)]
    order_link_id: String,
    #[serde(rename = "execId")]
    exec_id: String,
    side: Side,
    #[serde(rename = "execPrice", with = "rust_decimal::serde::str")]
    exec_price: Decimal,
    #[serde(rename = "execQty", with = "rust_decimal::serde::str")]
    exec_qty: Decimal,
    #[serde(rename = "execFee", with = "rust_decimal::serde::str")]
    exec_fee: Decimal,
    #[serde(rename = "execTime", deserialize_with = "quantra_integration::de::de_str")]
    exec_time_ms: u64,
}

#[derive(Debug, Deserialize)]
struct BybitOrderUpdate {
    #[serde(rename = "symbol")]
    market: String,
    #[serde(rename = "orderId")]
    order_id: String,
    #[serde(rename = "orderLinkId", default)]
    order_link_id: String,
    #[serde(rename = "orderStatus")]
    order_status: BybitOrderStatus,
    #[serde(rename = "cumExecQty", with = "rust_decimal::serde::str")]
    cum_exec_qty: Decimal,
}

#[derive(Debug, Deserialize)]
enum BybitOrderStatus {
    #[serde(rename = "New", alias = "Created", alias = "Untriggered", alias = "Triggered")]
    New,
    #[serde(rename = "PartiallyFilled")]
    PartiallyFilled,
    #[serde(rename = "Filled")]
    Filled,
    #[serde(rename = "Cancelled", alias = "PartiallyFilledCanceled")]
    Cancelled,
    #[serde(rename = "Rejected")]
    Rejected,
    #[serde(rename = "Expired", alias = "Deactivated")]
    Expired,
}

impl From<BybitOrderStatus> for OrderStatus {
    fn from(status: BybitOrderStatus) -> Self {
        match status {
            BybitOrderStatus::New => OrderStatus::New,
            BybitOrderStatus::PartiallyFilled => OrderStatus::PartiallyFilled,
            BybitOrderStatus::Filled => OrderStatus::Filled,
            BybitOrderStatus::Cancelled => OrderStatus::Canceled,
            BybitOrderStatus::Rejected => OrderStatus::Rejected,
            BybitOrderStatus::Expired => OrderStatus::Expired,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BybitWallet {
    coin: Vec<BybitWalletCoin>,
}

#[derive(Debug, Deserialize)]
struct BybitWalletCoin {
    coin: String,
    #[serde(rename = "walletBalance", with = "rust_decimal::serde::str")]
    wallet_balance: Decimal,
    #[serde(default, with = "rust_decimal::serde::str")]
    locked: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn connector_with_symbol() -> BybitStream {
        let connector = BybitStream::new();
        let subscriptions = vec![
            Subscription::new(ChannelKind::Ticker, "BTC/USDT".parse().unwrap()),
            Subscription::new(ChannelKind::Trade, "BTC/USDT".parse().unwrap()),
        ];
        let _ = connector.subscribe_requests(&subscriptions);
        connector
    }

    #[test]
    fn test_subscribe_request_topics() {
        let connector = BybitStream::new();
        let subscriptions = vec![
            Subscription::new(ChannelKind::Ticker, "BTC/USDT".parse().unwrap()),
            Subscription::new(ChannelKind::OrderBook, "ETH/USDT".parse().unwrap()),
        ];
        let requests = connector.subscribe_requests(&subscriptions).unwrap();
        let WsMessage::Text(payload) = &requests[0] else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(payload).unwrap();
        assert_eq!(value["op"], "subscribe");
        assert_eq!(value["args"][0], "tickers.BTCUSDT");
        assert_eq!(value["args"][1], "orderbook.50.ETHUSDT");
    }

    #[test]
    fn test_user_subscription_is_account_scoped() {
        let connector = BybitStream::private();
        let subscriptions = vec![
            Subscription::new(ChannelKind::User, "BTC/USDT".parse().unwrap()),
            Subscription::new(ChannelKind::User, "ETH/USDT".parse().unwrap()),
        ];
        let requests = connector.subscribe_requests(&subscriptions).unwrap();
        let WsMessage::Text(payload) = &requests[0] else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(payload).unwrap();
        // Deduplicated: one execution/order/wallet trio regardless of symbols.
        assert_eq!(value["args"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn test_parse_trade_frame() {
        let connector = connector_with_symbol();
        let payload = r#"{"topic":"publicTrade.BTCUSDT","type":"snapshot","ts":1672304486868,"data":[{"T":1672304486865,"s":"BTCUSDT","S":"Buy","v":"0.001","p":"16578.50","i":"20f43950-d8dd-5b31-9112-a178eb6023af"}]}"#;
        let ParsedFrame::Market(events) = connector.parse(WsMessage::text(payload)).unwrap()
        else {
            panic!("expected market events");
        };
        let DataKind::Trade(trade) = &events[0].kind else {
            panic!("expected trade");
        };
        assert_eq!(trade.price, dec!(16578.50));
        assert_eq!(trade.side, Side::Buy);
    }

    #[test]
    fn test_parse_orderbook_snapshot_then_delta() {
        let connector = connector_with_symbol();
        let snapshot = r#"{"topic":"orderbook.50.BTCUSDT","type":"snapshot","ts":1672304484978,"data":{"s":"BTCUSDT","b":[["16493.50","0.006"]],"a":[["16611.00","0.029"]],"u":18521288,"seq":7961638724}}"#;
        let ParsedFrame::Market(events) = connector.parse(WsMessage::text(snapshot)).unwrap()
        else {
            panic!("expected market events");
        };
        assert!(matches!(events[0].kind, DataKind::OrderBookSnapshot(_)));

        let delta = r#"{"topic":"orderbook.50.BTCUSDT","type":"delta","ts":1672304484988,"data":{"s":"BTCUSDT","b":[],"a":[["16611.00","0"]],"u":18521289,"seq":7961638725}}"#;
        let ParsedFrame::Market(events) = connector.parse(WsMessage::text(delta)).unwrap() else {
            panic!("expected market events");
        };
        assert!(matches!(events[0].kind, DataKind::OrderBookDelta(_)));
    }

    #[test]
    fn test_parse_pong_and_auth_ack() {
        let connector = BybitStream::private();
        assert!(matches!(
            connector
                .parse(WsMessage::text(r#"{"op":"pong","success":true}"#))
                .unwrap(),
            ParsedFrame::Pong
        ));
        assert!(matches!(
            connector
                .parse(WsMessage::text(r#"{"op":"auth","success":true}"#))
                .unwrap(),
            ParsedFrame::AuthAck { success: true, .. }
        ));
    }

    #[test]
    fn test_parse_execution_fill() {
        let connector = connector_with_symbol();
        let payload = r#"{"topic":"execution","creationTime":1672364174455,"data":[{"symbol":"BTCUSDT","orderId":"ord-1","orderLinkId":"cid-1","execId":"exec-1","side":"Sell","execPrice":"16578.50","execQty":"0.01","execFee":"0.16","execTime":"1672364174443"}]}"#;
        let ParsedFrame::Account(events) = connector.parse(WsMessage::text(payload)).unwrap()
        else {
            panic!("expected account events");
        };
        let AccountEventKind::Fill(fill) = &events[0].kind else {
            panic!("expected fill");
        };
        assert_eq!(fill.client_id.as_deref(), Some("cid-1"));
        assert_eq!(fill.quantity, dec!(0.01));
        assert_eq!(fill.side, Side::Sell);
    }
}
