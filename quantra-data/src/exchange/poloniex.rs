//! Poloniex stream connector.
//!
//! Poloniex encodes pairs with an underscore (`BTC_USDT`), which maps onto the
//! canonical form without a translation table. Channels are subscribed by name with
//! a symbol list, and the private session authenticates via the `auth` channel.

use crate::{
    account::{
        AccountEvent, AccountEventKind, BalanceUpdateEvent, FillEvent, OrderStatus,
        OrderUpdateEvent,
    },
    connector::{ParsedFrame, StreamConnector, StreamCredentials},
    event::{DataKind, Level, MarketEvent, OrderBookSnapshot, PublicTrade, Ticker},
    subscription::{ChannelKind, Subscription},
};
use chrono::Utc;
use hmac::{Hmac, Mac};
use itertools::Itertools;
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

const BASE_URL_PUBLIC: &str = "wss://ws.poloniex.com/ws/public";
const BASE_URL_PRIVATE: &str = "wss://ws.poloniex.com/ws/private";

/// [`StreamConnector`] for Poloniex spot.
#[derive(Debug, Default)]
pub struct PoloniexStream {
    private: bool,
}

impl PoloniexStream {
    /// Connector for the public market data endpoint.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector for the authenticated private endpoint.
    pub fn private() -> Self {
        Self { private: true }
    }

    fn native(symbol: &Symbol) -> String {
        format!("{}_{}", symbol.base(), symbol.quote())
    }

    fn canonical(native: &str) -> Result<Symbol, SocketError> {
        native
            .replace('_', "/")
            .parse()
            .map_err(|_| SocketError::Unidentifiable(native.to_string()))
    }

    fn channel_name(channel: ChannelKind) -> &'static str {
        match channel {
            ChannelKind::Ticker => "ticker",
            ChannelKind::Trade => "trades",
            ChannelKind::OrderBook => "book",
            ChannelKind::User => "orders",
        }
    }

    fn event_requests(&self, event: &str, subscriptions: &[Subscription]) -> Vec<WsMessage> {
        // One request per channel, carrying every symbol for that channel.
        subscriptions
            .iter()
            .into_group_map_by(|subscription| subscription.channel)
            .into_iter()
            .map(|(channel, group)| {
                let symbols: Vec<String> = group
                    .iter()
                    .map(|subscription| Self::native(&subscription.symbol))
                    .unique()
                    .collect();
                WsMessage::text(
                    serde_json::json!({
                        "event": event,
                        "channel": [Self::channel_name(channel)],
                        "symbols": symbols,
                    })
                    .to_string(),
                )
            })
            .collect()
    }
}

impl StreamConnector for PoloniexStream {
    fn id(&self) -> ExchangeId {
        ExchangeId::Poloniex
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
        WsMessage::text(r#"{"event":"ping"}"#)
    }

    fn subscribe_requests(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Vec<WsMessage>, SocketError> {
        Ok(self.event_requests("subscribe", subscriptions))
    }

    fn unsubscribe_requests(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Vec<WsMessage>, SocketError> {
        Ok(self.event_requests("unsubscribe", subscriptions))
    }

    fn auth_request(
        &self,
        credentials: &StreamCredentials,
    ) -> Result<Option<WsMessage>, SocketError> {
        let timestamp = Utc::now().timestamp_millis().to_string();
        let payload = serde_json::json!({
            "key": credentials.api_key,
            "signatureTimestamp": timestamp,
        });
        let mut mac = Hmac::<Sha256>::new_from_slice(credentials.secret.as_bytes())
            .map_err(|error| SocketError::Subscribe(format!("invalid api secret: {error}")))?;
        mac.update(payload.to_string().as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(Some(WsMessage::text(
            serde_json::json!({
                "event": "subscribe",
                "channel": ["auth"],
                "data": {
                    "key": credentials.api_key,
                    "signature": signature,
                    "signatureTimestamp": timestamp,
                }
            })
            .to_string(),
        )))
    }

    fn parse(&self, message: WsMessage) -> Result<ParsedFrame, SocketError> {
        let WsMessage::Text(payload) = message else {
            return Ok(ParsedFrame::Ignore);
        };

        if let Ok(event) = serde_json::from_str::<PoloniexEvent>(&payload) {
            return Ok(match event.event.as_str() {
                "pong" => ParsedFrame::Pong,
                "subscribe" if event.channel.as_deref() == Some("auth") => ParsedFrame::AuthAck {
                    success: event.success.unwrap_or(true),
                    context: event.message.unwrap_or_default(),
                },
                "subscribed" | "subscribe" | "unsubscribe" | "unsubscribed" => {
                    ParsedFrame::SubAck {
                        success: true,
                        context: event.channel.unwrap_or_default(),
                    }
                }
                "error" => ParsedFrame::SubAck {
                    success: false,
                    context: event.message.unwrap_or_default(),
                },
                _ => ParsedFrame::Ignore,
            });
        }

        let Ok(frame) = serde_json::from_str::<PoloniexDataFrame>(&payload) else {
            return Ok(ParsedFrame::Ignore);
        };

        match frame.channel.as_str() {
            "ticker" => {
                let tickers: Vec<PoloniexTicker> = serde_json::from_value(frame.data)
                    .map_err(|error| SocketError::Deserialise {
                        error,
                        payload: payload.to_string(),
                    })?;
                let events = tickers
                    .into_iter()
                    .map(|ticker| {
                        let symbol = Self::canonical(&ticker.market)?;
                        Ok(MarketEvent::new(
                            datetime_utc_from_epoch_duration(Duration::from_millis(ticker.ts)),
                            Utc::now(),
                            ExchangeId::Poloniex,
                            symbol,
                            DataKind::Ticker(Ticker::new(
                                ticker.bid,
                                ticker.ask,
                                ticker.last,
                                ticker.base_volume,
                                ticker.quote_volume,
                            )),
                        ))
                    })
                    .collect::<Result<Vec<_>, SocketError>>()?;
                Ok(ParsedFrame::Market(events))
            }
            "trades" => {
                let trades: Vec<PoloniexTrade> = serde_json::from_value(frame.data)
                    .map_err(|error| SocketError::Deserialise {
                        error,
                        payload: payload.to_string(),
                    })?;
                let events = trades
                    .into_iter()
                    .map(|trade| {
                        let symbol = Self::canonical(&trade.market)?;
                        Ok(MarketEvent::new(
                            datetime_utc_from_epoch_duration(Duration::from_millis(trade.ts)),
                            Utc::now(),
                            ExchangeId::Poloniex,
                            symbol,
                            DataKind::Trade(PublicTrade::new(
                                trade.id,
                                trade.price,
                                trade.quantity,
                                trade.taker_side,
                            )),
                        ))
                    })
                    .collect::<Result<Vec<_>, SocketError>>()?;
                Ok(ParsedFrame::Market(events))
            }
            "book" => {
                let books: Vec<PoloniexBook> = serde_json::from_value(frame.data)
                    .map_err(|error| SocketError::Deserialise {
                        error,
                        payload: payload.to_string(),
                    })?;
                let events = books
                    .into_iter()
                    .map(|book| {
                        let symbol = Self::canonical(&book.market)?;
                        Ok(MarketEvent::new(
                            datetime_utc_from_epoch_duration(Duration::from_millis(book.ts)),
                            Utc::now(),
                            ExchangeId::Poloniex,
                            symbol,
                            // The book channel delivers periodic full snapshots.
                            DataKind::OrderBookSnapshot(OrderBookSnapshot::new(
                                book.id,
                                book.bids.into_iter().map(Level::from).collect(),
                                book.asks.into_iter().map(Level::from).collect(),
                            )),
                        ))
                    })
                    .collect::<Result<Vec<_>, SocketError>>()?;
                Ok(ParsedFrame::Market(events))
            }
            "orders" => {
                let orders: Vec<PoloniexOrderUpdate> = serde_json::from_value(frame.data)
                    .map_err(|error| SocketError::Deserialise {
                        error,
                        payload: payload.to_string(),
                    })?;
                let mut events = Vec::new();
                for order in orders {
                    let symbol = Self::canonical(&order.market)?;
                    let time = datetime_utc_from_epoch_duration(Duration::from_millis(order.ts));
                    events.push(AccountEvent::new(
                        ExchangeId::Poloniex,
                        time,
                        AccountEventKind::OrderUpdate(OrderUpdateEvent::new(
                            symbol.clone(),
                            order.order_id.clone(),
                            order.client_order_id.clone().filter(|id| !id.is_empty()),
                            order.state.into(),
                            order.filled_quantity.unwrap_or_default(),
                        )),
                    ));
                    if let Some(trade_id) = order.trade_id.filter(|id| !id.is_empty())
                        && let (Some(price), Some(quantity)) = (order.trade_price, order.trade_qty)
                        && !quantity.is_zero()
                    {
                        events.push(AccountEvent::new(
                            ExchangeId::Poloniex,
                            time,
                            AccountEventKind::Fill(FillEvent::new(
                                symbol,
                                order.order_id,
                                order.client_order_id.filter(|id| !id.is_empty()),
                                trade_id,
                                order.side,
                                price,
                                quantity,
                                order.trade_fee.unwrap_or_default(),
                                order.fee_currency.map(AssetName::new),
                            )),
                        ));
                    }
                }
                Ok(ParsedFrame::Account(events))
            }
            "balances" => {
                let balances: Vec<PoloniexBalance> = serde_json::from_value(frame.data)
                    .map_err(|error| SocketError::Deserialise {
                        error,
                        payload: payload.to_string(),
                    })?;
                let events = balances
                    .into_iter()
                    .map(|balance| {
                        AccountEvent::new(
                            ExchangeId::Poloniex,
                            datetime_utc_from_epoch_duration(Duration::from_millis(balance.ts)),
                            AccountEventKind::BalanceUpdate(BalanceUpdateEvent::new(
                                AssetName::new(&balance.currency),
                                balance.available,
                                balance.hold,
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
struct PoloniexLevel(
    #[serde(with = "rust_decimal::serde::str")] Decimal,
    #[serde(with = "rust_decimal::serde::str")] Decimal,
);

impl From<PoloniexLevel> for Level {
    fn from(level: PoloniexLevel) -> Self {
        Level::new(level.0, level.1)
    }
}

#[derive(Debug, Deserialize)]
struct PoloniexEvent {
    event: String,
    #[serde(default, deserialize_with = "de_channel")]
    channel: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
}

/// The venue acks with either `"channel": "ticker"` or `"channel": ["ticker"]`.
fn de_channel<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        Some(OneOrMany::One(channel)) => Some(channel),
        Some(OneOrMany::Many(channels)) => channels.into_iter().next(),
        None => None,
    })
}

#[derive(Debug, Deserialize)]
struct PoloniexDataFrame {
    channel: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PoloniexTicker {
    #[serde(rename = "symbol")]
    market: String,
    #[serde(with = "rust_decimal::serde::str")]
    bid: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    ask: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    last: Decimal,
    #[serde(rename = "baseVolume", with = "rust_decimal::serde::str")]
    base_volume: Decimal,
    #[serde(rename = "quoteVolume", with = "rust_decimal::serde::str")]
    quote_volume: Decimal,
    ts: u64,
}

#[derive(Debug, Deserialize)]
struct PoloniexTrade {
    #[serde(rename = "symbol")]
    market: String,
    id: String,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    quantity: Decimal,
    #[serde(rename = "takerSide")]
    taker_side: Side,
    ts: u64,
}

#[derive(Debug, Deserialize)]
struct PoloniexBook {
    #[serde(rename = "symbol")]
    market: String,
    #[serde(default)]
    bids: Vec<PoloniexLevel>,
    #[serde(default)]
    asks: Vec<PoloniexLevel>,
    id: u64,
    ts: u64,
}

#[derive(Debug, Deserialize)]
struct PoloniexOrderUpdate {
    #[serde(rename = "symbol")]
    market: String,
    #[serde(rename = "orderId")]
    order_id: String,
    #[serde(rename = "clientOrderId", default)]
    client_order_id: Option<String>,
    side: Side,
    state: PoloniexOrderState,
    #[serde(rename = "filledQuantity", default, with = "rust_decimal::serde::str_option")]
    filled_quantity: Option<Decimal>,
    #[serde(rename = "tradeId", default)]
    trade_id: Option<String>,
    #[serde(rename = "tradePrice", default, with = "rust_decimal::serde::str_option")]
    trade_price: Option<Decimal>,
    #[serde(rename = "tradeQty", default, with = "rust_decimal::serde::str_option")]
    trade_qty: Option<Decimal>,
    #[serde(rename = "tradeFee", default, with = "rust_decimal::serde::str_option")]
    trade_fee: Option<Decimal>,
    #[serde(rename = "feeCurrency", default)]
    fee_currency: Option<String>,
    ts: u64,
}

#[derive(Debug, Deserialize)]
enum PoloniexOrderState {
    #[serde(rename = "NEW", alias = "PENDING_NEW")]
    New,
    #[serde(rename = "PARTIALLY_FILLED")]
    PartiallyFilled,
    #[serde(rename = "FILLED")]
    Filled,
    #[serde(rename = "CANCELED", alias = "PENDING_CANCEL", alias = "CANCELLED")]
    Canceled,
    #[serde(rename = "REJECTED", alias = "FAILED")]
    Rejected,
}

impl From<PoloniexOrderState> for OrderStatus {
    fn from(state: PoloniexOrderState) -> Self {
        match state {
            PoloniexOrderState::New => OrderStatus::New,
            PoloniexOrderState::PartiallyFilled => OrderStatus::PartiallyFilled,
            PoloniexOrderState::Filled => OrderStatus::Filled,
            PoloniexOrderState::Canceled => OrderStatus::Canceled,
            PoloniexOrderState::Rejected => OrderStatus::Rejected,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PoloniexBalance {
    currency: String,
    #[serde(with = "rust_decimal::serde::str")]
    available: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    hold: Decimal,
    ts: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_subscribe_groups_by_channel() {
        let connector = PoloniexStream::new();
        let subscriptions = vec![
            Subscription::new(ChannelKind::Ticker, "BTC/USDT".parse().unwrap()),
            Subscription::new(ChannelKind::Ticker, "ETH/USDT".parse().unwrap()),
            Subscription::new(ChannelKind::Trade, "BTC/USDT".parse().unwrap()),
        ];
        let requests = connector.subscribe_requests(&subscriptions).unwrap();
        assert_eq!(requests.len(), 2);
    }

    #[test]
    fn test_parse_ticker() {
        let connector = PoloniexStream::new();
        let payload = r#"{"channel":"ticker","data":[{"symbol":"BTC_USDT","bid":"42000.1","ask":"42000.9","last":"42000.5","baseVolume":"100","quoteVolume":"4200000","ts":1700000000000}]}"#;
        let ParsedFrame::Market(events) = connector.parse(WsMessage::text(payload)).unwrap()
        else {
            panic!("expected market events");
        };
        assert_eq!(events[0].symbol, "BTC/USDT".parse().unwrap());
        let DataKind::Ticker(ticker) = &events[0].kind else {
            panic!("expected ticker");
        };
        assert_eq!(ticker.last, dec!(42000.5));
    }

    #[test]
    fn test_parse_trade() {
        let connector = PoloniexStream::new();
        let payload = r#"{"channel":"trades","data":[{"symbol":"BTC_USDT","id":"194","price":"42000.5","quantity":"0.1","takerSide":"sell","ts":1700000000000}]}"#;
        let ParsedFrame::Market(events) = connector.parse(WsMessage::text(payload)).unwrap()
        else {
            panic!("expected market events");
        };
        let DataKind::Trade(trade) = &events[0].kind else {
            panic!("expected trade");
        };
        assert_eq!(trade.side, Side::Sell);
    }

    #[test]
    fn test_parse_book_snapshot() {
        let connector = PoloniexStream::new();
        let payload = r#"{"channel":"book","data":[{"symbol":"BTC_USDT","bids":[["42000.1","1"]],"asks":[["42000.9","2"]],"id":1077,"ts":1700000000000}]}"#;
        let ParsedFrame::Market(events) = connector.parse(WsMessage::text(payload)).unwrap()
        else {
            panic!("expected market events");
        };
        assert!(matches!(events[0].kind, DataKind::OrderBookSnapshot(_)));
    }

    #[test]
    fn test_parse_pong() {
        let connector = PoloniexStream::new();
        assert!(matches!(
            connector
                .parse(WsMessage::text(r#"{"event":"pong"}"#))
                .unwrap(),
            ParsedFrame::Pong
        ));
    }

    #[test]
    fn test_parse_order_update_with_fill() {
        let connector = PoloniexStream::new();
        let payload = r#"{"channel":"orders","data":[{"symbol":"BTC_USDT","orderId":"ord-3","clientOrderId":"cid-3","side":"BUY","state":"PARTIALLY_FILLED","filledQuantity":"0.3","tradeId":"t-7","tradePrice":"42000.5","tradeQty":"0.3","tradeFee":"0.0003","feeCurrency":"BTC","ts":1700000000000}]}"#;
        let ParsedFrame::Account(events) = connector.parse(WsMessage::text(payload)).unwrap()
        else {
            panic!("expected account events");
        };
        assert_eq!(events.len(), 2);
        let AccountEventKind::Fill(fill) = &events[1].kind else {
            panic!("expected fill");
        };
        assert_eq!(fill.trade_id, "t-7");
        assert_eq!(fill.quantity, dec!(0.3));
    }
}
