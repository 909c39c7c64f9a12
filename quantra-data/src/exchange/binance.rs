//! Binance stream connector.
//!
//! Public streams use the combined `SUBSCRIBE` method over a single socket. The user
//! data stream is authenticated out-of-band: a listen key obtained over REST selects
//! the account stream via the connection url.

use super::SymbolTable;
use crate::{
    account::{
        AccountEvent, AccountEventKind, BalanceUpdateEvent, FillEvent, OrderStatus,
        OrderUpdateEvent,
    },
    connector::{ParsedFrame, StreamConnector, StreamCredentials},
    event::{DataKind, Level, MarketEvent, OrderBookDelta, PublicTrade, Ticker},
    subscription::{ChannelKind, Subscription},
};
use chrono::Utc;
use quantra_instrument::{Side, asset::AssetName, exchange::ExchangeId, symbol::Symbol};
use quantra_integration::{
    de::datetime_utc_from_epoch_duration,
    error::SocketError,
    protocol::websocket::WsMessage,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const BASE_URL_WEBSOCKET: &str = "wss://stream.binance.com:9443/ws";

/// [`StreamConnector`] for Binance spot.
#[derive(Debug, Default)]
pub struct BinanceStream {
    symbols: SymbolTable,
    listen_key: Option<String>,
}

impl BinanceStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connector for the user data stream, routed via the provided listen key.
    pub fn with_listen_key(listen_key: String) -> Self {
        Self {
            symbols: SymbolTable::default(),
            listen_key: Some(listen_key),
        }
    }

    fn native(symbol: &Symbol) -> String {
        format!("{}{}", symbol.base(), symbol.quote())
    }

    fn stream_name(&self, subscription: &Subscription) -> Option<String> {
        let native = Self::native(&subscription.symbol).to_lowercase();
        // Market must be lowercase when subscribing, but Binance sends messages with
        // uppercase market (eg/ BTCUSDT).
        self.symbols.insert(
            Self::native(&subscription.symbol),
            subscription.symbol.clone(),
        );
        match subscription.channel {
            ChannelKind::Ticker => Some(format!("{native}@ticker")),
            ChannelKind::Trade => Some(format!("{native}@trade")),
            ChannelKind::OrderBook => Some(format!("{native}@depth@100ms")),
            // The user stream is selected by the listen-key url, not a stream name.
            ChannelKind::User => None,
        }
    }

    fn method_request(&self, method: &str, subscriptions: &[Subscription]) -> Vec<WsMessage> {
        let stream_names: Vec<String> = subscriptions
            .iter()
            .filter_map(|subscription| self.stream_name(subscription))
            .collect();
        if stream_names.is_empty() {
            return Vec::new();
        }
        vec![WsMessage::text(
            serde_json::json!({
                "method": method,
                "params": stream_names,
                "id": 1
            })
            .to_string(),
        )]
    }

    fn parse_event(&self, event: BinanceEvent) -> Result<ParsedFrame, SocketError> {
        match event {
            BinanceEvent::Ticker(ticker) => {
                let Some(symbol) = self.symbols.get(&ticker.market) else {
                    return Err(SocketError::Unidentifiable(ticker.market));
                };
                Ok(ParsedFrame::Market(vec![MarketEvent::new(
                    datetime_utc_from_epoch_duration(Duration::from_millis(ticker.time_ms)),
                    Utc::now(),
                    ExchangeId::Binance,
                    symbol,
                    DataKind::Ticker(Ticker::new(
                        ticker.bid,
                        ticker.ask,
                        ticker.last,
                        ticker.base_volume,
                        ticker.quote_volume,
                    )),
                )]))
            }
            BinanceEvent::Trade(trade) => {
                let Some(symbol) = self.symbols.get(&trade.market) else {
                    return Err(SocketError::Unidentifiable(trade.market));
                };
                // `buyer_is_maker == true` means the aggressor sold into the bid.
                let side = if trade.buyer_is_maker {
                    Side::Sell
                } else {
                    Side::Buy
                };
                Ok(ParsedFrame::Market(vec![MarketEvent::new(
                    datetime_utc_from_epoch_duration(Duration::from_millis(trade.time_ms)),
                    Utc::now(),
                    ExchangeId::Binance,
                    symbol,
                    DataKind::Trade(PublicTrade::new(
                        trade.id.to_string(),
                        trade.price,
                        trade.quantity,
                        side,
                    )),
                )]))
            }
            BinanceEvent::DepthUpdate(depth) => {
                let Some(symbol) = self.symbols.get(&depth.market) else {
                    return Err(SocketError::Unidentifiable(depth.market));
                };
                Ok(ParsedFrame::Market(vec![MarketEvent::new(
                    datetime_utc_from_epoch_duration(Duration::from_millis(depth.time_ms)),
                    Utc::now(),
                    ExchangeId::Binance,
                    symbol,
                    DataKind::OrderBookDelta(OrderBookDelta::new(
                        depth.first_update_id,
                        depth.last_update_id,
                        depth.bids.into_iter().map(Level::from).collect(),
                        depth.asks.into_iter().map(Level::from).collect(),
                    )),
                )]))
            }
            BinanceEvent::ExecutionReport(report) => {
                let Some(symbol) = self.symbols.get(&report.market) else {
                    return Err(SocketError::Unidentifiable(report.market));
                };
                let mut events = vec![AccountEvent::new(
                    ExchangeId::Binance,
                    datetime_utc_from_epoch_duration(Duration::from_millis(report.time_ms)),
                    AccountEventKind::OrderUpdate(OrderUpdateEvent::new(
                        symbol.clone(),
                        report.order_id.to_string(),
                        Some(report.client_id.clone()),
                        report.status.into(),
                        report.cumulative_filled,
                    )),
                )];
                if report.execution_type == "TRADE" && !report.last_executed_qty.is_zero() {
                    events.push(AccountEvent::new(
                        ExchangeId::Binance,
                        datetime_utc_from_epoch_duration(Duration::from_millis(report.time_ms)),
                        AccountEventKind::Fill(FillEvent::new(
                            symbol,
                            report.order_id.to_string(),
                            Some(report.client_id),
                            report.trade_id.to_string(),
                            report.side,
                            report.last_executed_price,
                            report.last_executed_qty,
                            report.commission,
                            report.commission_asset.map(AssetName::new),
                        )),
                    ));
                }
                Ok(ParsedFrame::Account(events))
            }
            BinanceEvent::AccountPosition(update) => Ok(ParsedFrame::Account(
                update
                    .balances
                    .into_iter()
                    .map(|balance| {
                        AccountEvent::new(
                            ExchangeId::Binance,
                            datetime_utc_from_epoch_duration(Duration::from_millis(
                                update.time_ms,
                            )),
                            AccountEventKind::BalanceUpdate(BalanceUpdateEvent::new(
                                AssetName::new(&balance.asset),
                                balance.free,
                                balance.locked,
                            )),
                        )
                    })
                    .collect(),
            )),
        }
    }
}

impl StreamConnector for BinanceStream {
    fn id(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    fn url(&self) -> Result<Url, SocketError> {
        let url = match &self.listen_key {
            Some(listen_key) => format!("{BASE_URL_WEBSOCKET}/{listen_key}"),
            None => BASE_URL_WEBSOCKET.to_string(),
        };
        Url::parse(&url).map_err(SocketError::UrlParse)
    }

    fn subscribe_requests(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Vec<WsMessage>, SocketError> {
        Ok(self.method_request("SUBSCRIBE", subscriptions))
    }

    fn unsubscribe_requests(
        &self,
        subscriptions: &[Subscription],
    ) -> Result<Vec<WsMessage>, SocketError> {
        Ok(self.method_request("UNSUBSCRIBE", subscriptions))
    }

    fn auth_request(&self, _: &StreamCredentials) -> Result<Option<WsMessage>, SocketError> {
        // Authentication is the listen-key url itself.
        Ok(None)
    }

    fn parse(&self, message: WsMessage) -> Result<ParsedFrame, SocketError> {
        let WsMessage::Text(payload) = message else {
            return Ok(ParsedFrame::Ignore);
        };

        if let Ok(event) = serde_json::from_str::<BinanceEvent>(&payload) {
            return self.parse_event(event);
        }
        if let Ok(ack) = serde_json::from_str::<BinanceSubResponse>(&payload) {
            return Ok(ParsedFrame::SubAck {
                success: ack.error.is_none(),
                context: format!("id={}", ack.id),
            });
        }
        Ok(ParsedFrame::Ignore)
    }
}

/// Price/amount pair encoded as a two-element string array.
#[derive(Debug, Deserialize)]
struct BinanceLevel(
    #[serde(with = "rust_decimal::serde::str")] Decimal,
    #[serde(with = "rust_decimal::serde::str")] Decimal,
);

impl From<BinanceLevel> for Level {
    fn from(level: BinanceLevel) -> Self {
        Level::new(level.0, level.1)
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "e")]
enum BinanceEvent {
    #[serde(rename = "24hrTicker")]
    Ticker(BinanceTicker),
    #[serde(rename = "trade")]
    Trade(BinanceTrade),
    #[serde(rename = "depthUpdate")]
    DepthUpdate(BinanceDepthUpdate),
    #[serde(rename = "executionReport")]
    ExecutionReport(BinanceExecutionReport),
    #[serde(rename = "outboundAccountPosition")]
    AccountPosition(BinanceAccountPosition),
}

#[derive(Debug, Deserialize)]
struct BinanceTicker {
    #[serde(rename = "E")]
    time_ms: u64,
    #[serde(rename = "s")]
    market: String,
    #[serde(rename = "b", with = "rust_decimal::serde::str")]
    bid: Decimal,
    #[serde(rename = "a", with = "rust_decimal::serde::str")]
    ask: Decimal,
    #[serde(rename = "c", with = "rust_decimal::serde::str")]
    last: Decimal,
    #[serde(rename = "v", with = "rust_decimal::serde::str")]
    base_volume: Decimal,
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    quote_volume: Decimal,
}

#[derive(Debug, Deserialize)]
struct BinanceTrade {
    #[serde(rename = "T")]
    time_ms: u64,
    #[serde(rename = "s")]
    market: String,
    #[serde(rename = "t")]
    id: u64,
    #[serde(rename = "p", with = "rust_decimal::serde::str")]
    price: Decimal,
    #[serde(rename = "q", with = "rust_decimal::serde::str")]
    quantity: Decimal,
    #[serde(rename = "m")]
    buyer_is_maker: bool,
}

#[derive(Debug, Deserialize)]
struct BinanceDepthUpdate {
    #[serde(rename = "E")]
    time_ms: u64,
    #[serde(rename = "s")]
    market: String,
    #[serde(rename = "U")]
    first_update_id: u64,
    #[serde(rename = "u")]
    last_update_id: u64,
    #[serde(rename = "b")]
    bids: Vec<BinanceLevel>,
    #[serde(rename = "a")]
    asks: Vec<BinanceLevel>,
}

#[derive(Debug, Deserialize)]
struct BinanceExecutionReport {
    #[serde(rename = "E")]
    time_ms: u64,
    #[serde(rename = "s")]
    market: String,
    #[serde(rename = "c")]
    client_id: String,
    #[serde(rename = "S")]
    side: Side,
    #[serde(rename = "x")]
    execution_type: String,
    #[serde(rename = "X")]
    status: BinanceOrderStatus,
    #[serde(rename = "i")]
    order_id: u64,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    last_executed_qty: Decimal,
    #[serde(rename = "L", with = "rust_decimal::serde::str")]
    last_executed_price: Decimal,
    #[serde(rename = "z", with = "rust_decimal::serde::str")]
    cumulative_filled: Decimal,
    #[serde(rename = "n", with = "rust_decimal::serde::str")]
    commission: Decimal,
    #[serde(rename = "N")]
    commission_asset: Option<String>,
    #[serde(rename = "t", default)]
    trade_id: i64,
}

#[derive(Debug, Deserialize)]
enum BinanceOrderStatus {
    #[serde(rename = "NEW")]
    New,
    #[serde(rename = "PARTIALLY_FILLED")]
    PartiallyFilled,
    #[serde(rename = "FILLED")]
    Filled,
    #[serde(rename = "CANCELED")]
    Canceled,
    #[serde(rename = "REJECTED")]
    Rejected,
    #[serde(rename = "EXPIRED", alias = "EXPIRED_IN_MATCH")]
    Expired,
}

impl From<BinanceOrderStatus> for OrderStatus {
    fn from(status: BinanceOrderStatus) -> Self {
        match status {
            BinanceOrderStatus::New => OrderStatus::New,
            BinanceOrderStatus::PartiallyFilled => OrderStatus::PartiallyFilled,
            BinanceOrderStatus::Filled => OrderStatus::Filled,
            BinanceOrderStatus::Canceled => OrderStatus::Canceled,
            BinanceOrderStatus::Rejected => OrderStatus::Rejected,
            BinanceOrderStatus::Expired => OrderStatus::Expired,
        }
    }
}

#[derive(Debug, Deserialize)]
struct BinanceAccountPosition {
    #[serde(rename = "E")]
    time_ms: u64,
    #[serde(rename = "B")]
    balances: Vec<BinanceBalance>,
}

#[derive(Debug, Deserialize)]
struct BinanceBalance {
    #[serde(rename = "a")]
    asset: String,
    #[serde(rename = "f", with = "rust_decimal::serde::str")]
    free: Decimal,
    #[serde(rename = "l", with = "rust_decimal::serde::str")]
    locked: Decimal,
}

#[derive(Debug, Deserialize)]
struct BinanceSubResponse {
    #[serde(default)]
    error: Option<serde_json::Value>,
    id: u64,
}
