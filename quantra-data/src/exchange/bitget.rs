//! Bitget stream connector (v2).
//!
//! Subscriptions are argument objects keyed by `instType`/`channel`/`instId`. The
//! venue heartbeat is the literal text frame `ping`/`pong`, and private channels
//! require a `login` operation signed with the account passphrase.

use super::SymbolTable;
use crate::{
    account::{AccountEvent, AccountEventKind, FillEvent, OrderStatus, OrderUpdateEvent},
    connector::{ParsedFrame, StreamConnector, StreamCredentials},
    event::{DataKind, Level, MarketEvent, OrderBookDelta, OrderBookSnapshot, PublicTrade, Ticker},
    subscription::{ChannelKind, Subscription},
};
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use quantra_instrument::{Side, asset::AssetName, exchange::ExchangeId, symbol::Symbol};
use quantra_integration::{
    de::{datetime_utc_from_epoch_duration, de_str},
    error::SocketError,
    protocol::websocket::WsMessage,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use url::Url;

const BASE_URL_PUBLIC: &str = "wss://ws.bitget.com/v2/ws/public";
const BASE_URL_PRIVATE: &str = "wss://ws.bitget.com/v2/ws/private";
const INST_TYPE_SPOT: &str = "SPOT";

/// [`StreamConnector`] for Bitget spot.
#[derive(Debug, Default)]
pub struct BitgetStream {
    symbols: SymbolTable,
    private: bool,
}

impl BitgetStream {
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

    fn channel_name(channel: ChannelKind) -> &'static str {
        match channel {
            ChannelKind::Ticker => "ticker",
            ChannelKind::Trade => "trade",
            ChannelKind::OrderBook => "books",
            ChannelKind::User => "orders",
        }
    }

    fn op_request(&self, op: &str, subscriptions: &[Subscription]) -> Vec<WsMessage> {
        let mut args = Vec::new();
        for subscription in subscriptions {
            let native = Self::native(&subscription.symbol);
            self.symbols.insert(&native, subscription.symbol.clone());
            let inst_id = if subscription.channel == ChannelKind::User {
                // The orders channel is account-scoped.
                "default".to_string()
            } else {
                native
            };
            let arg = serde_json::json!({
                "instType": INST_TYPE_SPOT,
                "channel": Self::channel_name(subscription.channel),
                "instId": inst_id,
            });
            if !args.contains(&arg) {
                args.push(arg);
            }
        }
        if args.is_empty() {
            return Vec::new();
        }
        vec![WsMessage::text(
            serde_json::json!({ "op": op, "args": args }).to_string(),
        )]
    }

    fn resolve(&self, native: &str) -> Result<Symbol, SocketError> {
        self.symbols
            .get(native)
            .ok_or_else(|| SocketError::Unidentifiable(native.to_string()))
    }
}

impl StreamConnector for BitgetStream {
    fn id(&self) -> ExchangeId {
        ExchangeId::Bitget
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
        WsMessage::text("ping")
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
        let passphrase = credentials.passphrase.as_deref().ok_or_else(|| {
            SocketError::Subscribe("bitget private stream requires a passphrase".to_string())
        })?;
        let timestamp = Utc::now().timestamp().to_string();
        let mut mac = Hmac::<Sha256>::new_from_slice(credentials.secret.as_bytes())
            .map_err(|error| SocketError::Subscribe(format!("invalid api secret: {error}")))?;
        mac.update(format!("{timestamp}GET/user/verify").as_bytes());
        let sign = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

        Ok(Some(WsMessage::text(
            serde_json::json!({
                "op": "login",
                "args": [{
                    "apiKey": credentials.api_key,
                    "passphrase": passphrase,
                    "timestamp": timestamp,
                    "sign": sign,
                }]
            })
            .to_string(),
        )))
    }

    fn parse(&self, message: WsMessage) -> Result<ParsedFrame, SocketError> {
        let WsMessage::Text(payload) = message else {
            return Ok(ParsedFrame::Ignore);
        };
        if payload.as_str() == "pong" {
            return Ok(ParsedFrame::Pong);
        }

        if let Ok(event) = serde_json::from_str::<BitgetEventResponse>(&payload) {
            return Ok(match event.event.as_str() {
                "login" => ParsedFrame::AuthAck {
                    success: event.code.unwrap_or_default() == 0,
                    context: event.msg.unwrap_or_default(),
                },
                "error" => ParsedFrame::SubAck {
                    success: false,
                    context: event.msg.unwrap_or_default(),
                },
                _ => ParsedFrame::SubAck {
                    success: true,
                    context: event.event,
                },
            });
        }

        let Ok(frame) = serde_json::from_str::<BitgetDataFrame>(&payload) else {
            return Ok(ParsedFrame::Ignore);
        };
        let time_exchange = datetime_utc_from_epoch_duration(Duration::from_millis(frame.ts));
        let is_snapshot = frame.action.as_deref() == Some("snapshot");

        match frame.arg.channel.as_str() {
            "ticker" => {
                let tickers: Vec<BitgetTicker> = serde_json::from_value(frame.data)
                    .map_err(|error| SocketError::Deserialise {
                        error,
                        payload: payload.to_string(),
                    })?;
                let events = tickers
                    .into_iter()
                    .map(|ticker| {
                        let symbol = self.resolve(&ticker.inst_id)?;
                        Ok(MarketEvent::new(
                            datetime_utc_from_epoch_duration(Duration::from_millis(ticker.ts)),
                            Utc::now(),
                            ExchangeId::Bitget,
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
            "trade" => {
                let symbol = self.resolve(&frame.arg.inst_id)?;
                let trades: Vec<BitgetTrade> = serde_json::from_value(frame.data)
                    .map_err(|error| SocketError::Deserialise {
                        error,
                        payload: payload.to_string(),
                    })?;
                let events = trades
                    .into_iter()
                    .map(|trade| {
                        MarketEvent::new(
                            datetime_utc_from_epoch_duration(Duration::from_millis(trade.ts)),
                            Utc::now(),
                            ExchangeId::Bitget,
                            symbol.clone(),
                            DataKind::Trade(PublicTrade::new(
                                trade.trade_id,
                                trade.price,
                                trade.size,
                                trade.side,
                            )),
                        )
                    })
                    .collect();
                Ok(ParsedFrame::Market(events))
            }
            "books" => {
                let symbol = self.resolve(&frame.arg.inst_id)?;
                let books: Vec<BitgetBook> = serde_json::from_value(frame.data)
                    .map_err(|error| SocketError::Deserialise {
                        error,
                        payload: payload.to_string(),
                    })?;
                let events = books
                    .into_iter()
                    .map(|book| {
                        let bids = book.bids.into_iter().map(Level::from).collect();
                        let asks = book.asks.into_iter().map(Level::from).collect();
                        let kind = if is_snapshot {
                            DataKind::OrderBookSnapshot(OrderBookSnapshot::new(
                                book.seq, bids, asks,
                            ))
                        } else {
                            DataKind::OrderBookDelta(OrderBookDelta::new(
                                book.seq, book.seq, bids, asks,
                            ))
                        };
                        MarketEvent::new(
                            time_exchange,
                            Utc::now(),
                            ExchangeId::Bitget,
                            symbol.clone(),
                            kind,
                        )
                    })
                    .collect();
                Ok(ParsedFrame::Market(events))
            }
            "orders" => {
                let orders: Vec<BitgetOrderUpdate> = serde_json::from_value(frame.data)
                    .map_err(|error| SocketError::Deserialise {
                        error,
                        payload: payload.to_string(),
                    })?;
                let mut events = Vec::new();
                for order in orders {
                    let symbol = self.resolve(&order.inst_id)?;
                    events.push(AccountEvent::new(
                        ExchangeId::Bitget,
                        time_exchange,
                        AccountEventKind::OrderUpdate(OrderUpdateEvent::new(
                            symbol.clone(),
                            order.order_id.clone(),
                            order.client_oid.clone(),
                            order.status.into(),
                            order.accumulated_filled.unwrap_or_default(),
                        )),
                    ));
                    // A trade id on the update means this event carries a fill.
                    if let (Some(trade_id), Some(fill_price), Some(fill_size)) =
                        (order.trade_id, order.fill_price, order.base_volume)
                        && !fill_size.is_zero()
                    {
                        events.push(AccountEvent::new(
                            ExchangeId::Bitget,
                            time_exchange,
                            AccountEventKind::Fill(FillEvent::new(
                                symbol,
                                order.order_id,
                                order.client_oid,
                                trade_id,
                                order.side,
                                fill_price,
                                fill_size,
                                order.fill_fee.unwrap_or_default().abs(),
                                order.fill_fee_coin.map(AssetName::new),
                            )),
                        ));
                    }
                }
                Ok(ParsedFrame::Account(events))
            }
            _ => Ok(ParsedFrame::Ignore),
        }
    }
}

/// Price/amount pair encoded as a two-element string array.
#[derive(Debug, Deserialize)]
struct BitgetLevel(
    #[serde(with = "rust_decimal::serde::str")] Decimal,
    #[serde(with = "rust_decimal::serde::str")] Decimal,
);

impl From<BitgetLevel> for Level {
    fn from(level: BitgetLevel) -> Self {
        Level::new(level.0, level.1)
    }
}

#[derive(Debug, Deserialize)]
struct BitgetEventResponse {
    event: String,
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BitgetArg {
    channel: String,
    #[serde(rename = "instId", default)]
    inst_id: String,
}

#[derive(Debug, Deserialize)]
struct BitgetDataFrame {
    #[serde(default)]
    action: Option<String>,
    arg: BitgetArg,
    data: serde_json::Value,
    #[serde(default)]
    ts: u64,
}

#[derive(Debug, Deserialize)]
struct BitgetTicker {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "lastPr", with = "rust_decimal::serde::str")]
    last: Decimal,
    #[serde(rename = "bidPr", with = "rust_decimal::serde::str")]
    bid: Decimal,
    #[serde(rename = "askPr", with = "rust_decimal::serde::str")]
    ask: Decimal,
    #[serde(rename = "baseVolume", with = "rust_decimal::serde::str")]
    base_volume: Decimal,
    #[serde(rename = "quoteVolume", with = "rust_decimal::serde::str")]
    quote_volume: Decimal,
    #[serde(deserialize_with = "de_str")]
    ts: u64,
}

#[derive(Debug, Deserialize)]
struct BitgetTrade {
    #[serde(deserialize_with = "de_str")]
    ts: u64,
    #[serde(with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    size: Decimal,
    side: Side,
    #[serde(rename = "tradeId")]
    trade_id: String,
}

#[derive(Debug, Deserialize)]
struct BitgetBook {
    #[serde(default)]
    bids: Vec<BitgetLevel>,
    #[serde(default)]
    asks: Vec<BitgetLevel>,
    #[serde(default)]
    seq: u64,
}

#[derive(Debug, Deserialize)]
struct BitgetOrderUpdate {
    #[serde(rename = "instId")]
    inst_id: String,
    #[serde(rename = "orderId")]
    order_id: String,
    #[serde(rename = "clientOid", default)]
    client_oid: Option<String>,
    side: Side,
    status: BitgetOrderStatus,
    #[serde(rename = "accBaseVolume", default, with = "rust_decimal::serde::str_option")]
    accumulated_filled: Option<Decimal>,
    #[serde(rename = "tradeId", default)]
    trade_id: Option<String>,
    #[serde(rename = "fillPrice", default, with = "rust_decimal::serde::str_option")]
    fill_price: Option<Decimal>,
    #[serde(rename = "baseVolume", default, with = "rust_decimal::serde::str_option")]
    base_volume: Option<Decimal>,
    #[serde(rename = "fillFee", default, with = "rust_decimal::serde::str_option")]
    fill_fee: Option<Decimal>,
    #[serde(rename = "fillFeeCoin", default)]
    fill_fee_coin: Option<String>,
}

#[derive(Debug, Deserialize)]
enum BitgetOrderStatus {
    #[serde(rename = "live", alias = "init", alias = "new")]
    Live,
    #[serde(rename = "partially_filled")]
    PartiallyFilled,
    #[serde(rename = "filled")]
    Filled,
    #[serde(rename = "cancelled", alias = "canceled")]
    Cancelled,
    #[serde(rename = "rejected")]
    Rejected,
}

impl From<BitgetOrderStatus> for OrderStatus {
    fn from(status: BitgetOrderStatus) -> Self {
        match status {
            BitgetOrderStatus::Live => OrderStatus::New,
            BitgetOrderStatus::PartiallyFilled => OrderStatus::PartiallyFilled,
            BitgetOrderStatus::Filled => OrderStatus::Filled,
            BitgetOrderStatus::Cancelled => OrderStatus::Canceled,
            BitgetOrderStatus::Rejected => OrderStatus::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn connector_with_symbol() -> BitgetStream {
        let connector = BitgetStream::new();
        let subscriptions = vec![
            Subscription::new(ChannelKind::Ticker, "BTC/USDT".parse().unwrap()),
            Subscription::new(ChannelKind::Trade, "BTC/USDT".parse().unwrap()),
        ];
        let _ = connector.subscribe_requests(&subscriptions);
        connector
    }

    #[test]
    fn test_subscribe_request_args() {
        let connector = BitgetStream::new();
        let subscriptions = vec![Subscription::new(
            ChannelKind::Ticker,
            "BTC/USDT".parse().unwrap(),
        )];
        let requests = connector.subscribe_requests(&subscriptions).unwrap();
        let WsMessage::Text(payload) = &requests[0] else {
            panic!("expected text frame");
        };
        let value: serde_json::Value = serde_json::from_str(payload).unwrap();
        assert_eq!(value["op"], "subscribe");
        assert_eq!(value["args"][0]["instType"], "SPOT");
        assert_eq!(value["args"][0]["channel"], "ticker");
        assert_eq!(value["args"][0]["instId"], "BTCUSDT");
    }

    #[test]
    fn test_parse_pong_literal() {
        let connector = BitgetStream::new();
        assert!(matches!(
            connector.parse(WsMessage::text("pong")).unwrap(),
            ParsedFrame::Pong
        ));
    }

    #[test]
    fn test_parse_ticker() {
        let connector = connector_with_symbol();
        let payload = r#"{"action":"snapshot","arg":{"instType":"SPOT","channel":"ticker","instId":"BTCUSDT"},"data":[{"instId":"BTCUSDT","lastPr":"27000.5","bidPr":"26999","askPr":"27000","baseVolume":"2.591","quoteVolume":"4.453","ts":"1695715383021"}],"ts":1695715383039}"#;
        let ParsedFrame::Market(events) = connector.parse(WsMessage::text(payload)).unwrap()
        else {
            panic!("expected market events");
        };
        let DataKind::Ticker(ticker) = &events[0].kind else {
            panic!("expected ticker");
        };
        assert_eq!(ticker.bid, dec!(26999));
        assert_eq!(ticker.ask, dec!(27000));
        assert!(ticker.is_coherent());
    }

    #[test]
    fn test_parse_trades() {
        let connector = connector_with_symbol();
        let payload = r#"{"action":"update","arg":{"instType":"SPOT","channel":"trade","instId":"BTCUSDT"},"data":[{"ts":"1695716760565","price":"27000.5","size":"0.001","side":"buy","tradeId":"1111111111"}],"ts":1695716760570}"#;
        let ParsedFrame::Market(events) = connector.parse(WsMessage::text(payload)).unwrap()
        else {
            panic!("expected market events");
        };
        let DataKind::Trade(trade) = &events[0].kind else {
            panic!("expected trade");
        };
        assert_eq!(trade.side, Side::Buy);
        assert_eq!(trade.amount, dec!(0.001));
    }

    #[test]
    fn test_parse_login_ack() {
        let connector = BitgetStream::private();
        let parsed = connector
            .parse(WsMessage::text(r#"{"event":"login","code":0}"#))
            .unwrap();
        assert!(matches!(parsed, ParsedFrame::AuthAck { success: true, .. }));
    }

    #[test]
    fn test_parse_order_update_with_fill() {
        let connector = connector_with_symbol();
        let payload = r#"{"action":"snapshot","arg":{"instType":"SPOT","channel":"orders","instId":"default"},"data":[{"instId":"BTCUSDT","orderId":"ord-9","clientOid":"cid-9","side":"buy","status":"partially_filled","accBaseVolume":"0.5","tradeId":"t-1","fillPrice":"27000.5","baseVolume":"0.5","fillFee":"-0.0005","fillFeeCoin":"BTC"}],"ts":1695718781129}"#;
        let ParsedFrame::Account(events) = connector.parse(WsMessage::text(payload)).unwrap()
        else {
            panic!("expected account events");
        };
        assert_eq!(events.len(), 2);
        let AccountEventKind::Fill(fill) = &events[1].kind else {
            panic!("expected fill");
        };
        assert_eq!(fill.fee, dec!(0.0005));
        assert_eq!(fill.price, dec!(27000.5));
    }
}
