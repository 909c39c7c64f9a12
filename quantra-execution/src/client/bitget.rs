//! Bitget spot REST adapter (v2).
//!
//! Application results arrive in a `code`/`msg`/`data` envelope with `"00000"` as the
//! success code. Signed requests carry `ACCESS-*` headers with a base64 HMAC-SHA256
//! over `{timestamp}{METHOD}{path}{?query}{body}`; the account passphrase is
//! mandatory for private endpoints.

use crate::{
    ApiCredentials,
    balance::{AssetBalance, Balance},
    capability::Capabilities,
    client::ExchangeApi,
    order::{
        ClientOrderId, Order, OrderId, OrderKind, OrderRequest, OrderStatus, TimeInForce,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use parking_lot::RwLock;
use quantra_data::event::{Level, OrderBookSnapshot, Ticker};
use quantra_instrument::{
    Side, asset::AssetName, exchange::ExchangeId, market::Market, symbol::Symbol,
};
use quantra_integration::{
    error::{ExchangeError, SocketError},
    protocol::http::{
        HttpParser,
        private::{RequestSigner, Signer, encoder::Base64Encoder},
        rest::{RestRequest, client::RestClient},
    },
    rate_limit::RateLimiter,
};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::borrow::Cow;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

const HTTP_BASE_URL: &str = "https://api.bitget.com";
const SUCCESS_CODE: &str = "00000";

pub type BitgetRequestSigner = RequestSigner<BitgetSigner, Hmac<Sha256>, Base64Encoder>;

/// [`ExchangeApi`] implementation for Bitget spot.
pub struct BitgetExecution {
    client: RestClient<'static, BitgetRequestSigner, BitgetParser>,
    public_bucket: RateLimiter,
    private_bucket: RateLimiter,
    order_bucket: RateLimiter,
    cancel: CancellationToken,
    symbols: RwLock<HashMap<String, Symbol>>,
}

impl std::fmt::Debug for BitgetExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BitgetExecution").finish_non_exhaustive()
    }
}

impl BitgetExecution {
    pub fn new(credentials: ApiCredentials, cancel: CancellationToken) -> Self {
        let mac = Hmac::<Sha256>::new_from_slice(credentials.secret.as_bytes())
            .unwrap_or_else(|_| Hmac::<Sha256>::new_from_slice(&[0u8; 32]).expect("fixed length"));
        let signer = RequestSigner::new(
            BitgetSigner {
                api_key: credentials.api_key,
                passphrase: credentials.passphrase.unwrap_or_default(),
            },
            mac,
            Base64Encoder,
        );
        Self {
            client: RestClient::new(HTTP_BASE_URL, signer, BitgetParser),
            public_bucket: RateLimiter::new(20.0, 40),
            private_bucket: RateLimiter::new(10.0, 20),
            order_bucket: RateLimiter::new(10.0, 10),
            cancel,
            symbols: RwLock::new(HashMap::new()),
        }
    }

    fn remember(&self, symbol: &Symbol) -> String {
        let native = format!("{}{}", symbol.base(), symbol.quote());
        self.symbols.write().insert(native.clone(), symbol.clone());
        native
    }

    fn resolve(&self, native: &str) -> Option<Symbol> {
        self.symbols.read().get(native).cloned()
    }

    fn map_order(&self, order: BitgetOrder) -> Option<Order> {
        let symbol = self.resolve(&order.symbol)?;
        let created_at = order
            .c_time
            .as_deref()
            .and_then(|time| time.parse::<i64>().ok())
            .and_then(chrono::DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        Some(Order {
            order_id: OrderId::new(&order.order_id),
            client_id: order
                .client_oid
                .filter(|id| !id.is_empty())
                .map(ClientOrderId::new),
            symbol,
            side: order.side,
            kind: match order.order_type.as_str() {
                "limit" => OrderKind::Limit,
                _ => OrderKind::Market,
            },
            price: order.price.filter(|price| !price.is_zero()),
            quantity: order.size,
            filled_quantity: order.base_volume.unwrap_or_default(),
            status: match order.status.as_str() {
                "partially_filled" => OrderStatus::PartiallyFilled,
                "filled" => OrderStatus::Filled,
                "cancelled" | "canceled" => OrderStatus::Canceled,
                "rejected" => OrderStatus::Rejected,
                _ => OrderStatus::New,
            },
            time_in_force: match order.force.as_deref() {
                Some("ioc") => TimeInForce::ImmediateOrCancel,
                Some("fok") => TimeInForce::FillOrKill,
                _ => TimeInForce::GoodTilCancelled,
            },
            created_at,
            updated_at: created_at,
        })
    }
}

#[async_trait]
impl ExchangeApi for BitgetExecution {
    fn id(&self) -> ExchangeId {
        ExchangeId::Bitget
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            order_kinds: vec![OrderKind::Market, OrderKind::Limit],
            time_in_force: vec![
                TimeInForce::GoodTilCancelled,
                TimeInForce::ImmediateOrCancel,
                TimeInForce::FillOrKill,
            ],
            client_id_lookup: true,
            user_stream: true,
        }
    }

    async fn connect(&self) -> Result<(), ExchangeError> {
        self.client
            .execute(ServerTimeRequest, &self.public_bucket, &self.cancel)
            .await?
            .into_data()
            .map(|_| ())
    }

    async fn disconnect(&self) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn get_markets(&self) -> Result<Vec<Market>, ExchangeError> {
        let data = self
            .client
            .execute(SymbolsRequest, &self.public_bucket, &self.cancel)
            .await?
            .into_data()?;
        Ok(data
            .into_iter()
            .filter(|market| market.status == "online")
            .map(|market| {
                let symbol = Symbol::new(&market.base_coin, &market.quote_coin);
                self.symbols.write().insert(market.symbol, symbol.clone());
                Market::new(
                    symbol,
                    AssetName::new(&market.base_coin),
                    AssetName::new(&market.quote_coin),
                    market.price_precision,
                    market.quantity_precision,
                    market.min_trade_amount.unwrap_or_default(),
                    market.min_trade_usdt.unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExchangeError> {
        let request = TickersRequest {
            query: SymbolQuery {
                symbol: self.remember(symbol),
            },
        };
        let data = self
            .client
            .execute(request, &self.public_bucket, &self.cancel)
            .await?
            .into_data()?;
        let ticker = data.into_iter().next().ok_or_else(|| {
            ExchangeError::InvalidOrder(format!("no ticker returned for {symbol}"))
        })?;
        Ok(Ticker::new(
            ticker.bid,
            ticker.ask,
            ticker.last,
            ticker.base_volume,
            ticker.quote_volume,
        ))
    }

    async fn get_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> Result<OrderBookSnapshot, ExchangeError> {
        let request = OrderBookRequest {
            query: OrderBookQuery {
                symbol: self.remember(symbol),
                limit: depth.min(150) as u32,
            },
        };
        let data = self
            .client
            .execute(request, &self.public_bucket, &self.cancel)
            .await?
            .into_data()?;
        let last_update_id = data.ts.parse::<u64>().unwrap_or_default();
        Ok(OrderBookSnapshot::new(
            last_update_id,
            data.bids.into_iter().map(|level| Level::new(level.0, level.1)).collect(),
            data.asks.into_iter().map(|level| Level::new(level.0, level.1)).collect(),
        ))
    }

    async fn get_balances(&self) -> Result<Vec<AssetBalance>, ExchangeError> {
        let data = self
            .client
            .execute(AssetsRequest, &self.private_bucket, &self.cancel)
            .await?
            .into_data()?;
        Ok(data
            .into_iter()
            .map(|asset| {
                AssetBalance::new(
                    AssetName::new(&asset.coin),
                    Balance::new(asset.available, asset.frozen + asset.locked),
                )
            })
            .collect())
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<Order, ExchangeError> {
        let order_type = match request.kind {
            OrderKind::Market => "market",
            OrderKind::Limit => "limit",
            unsupported => {
                return Err(ExchangeError::Unsupported {
                    venue: self.id().as_str(),
                    item: format!("order kind {unsupported}"),
                });
            }
        };
        if request.kind.requires_price() && request.price.is_none() {
            return Err(ExchangeError::InvalidOrder(format!(
                "{} order requires a price",
                request.kind
            )));
        }

        let place = PlaceOrderRequest {
            client_id: request.client_id.to_string(),
            body: PlaceOrderBody {
                symbol: self.remember(&request.symbol),
                side: match request.side {
                    Side::Buy => "buy",
                    Side::Sell => "sell",
                },
                order_type,
                force: match request.time_in_force {
                    TimeInForce::GoodTilCancelled => "gtc",
                    TimeInForce::ImmediateOrCancel => "ioc",
                    TimeInForce::FillOrKill => "fok",
                    TimeInForce::GoodTilDate => {
                        return Err(ExchangeError::Unsupported {
                            venue: self.id().as_str(),
                            item: "time in force GTD".to_string(),
                        });
                    }
                },
                size: request.quantity,
                price: request.price,
                client_oid: request.client_id.to_string(),
            },
        };

        let ack = self
            .client
            .execute(place, &self.order_bucket, &self.cancel)
            .await?
            .into_data()?;
        let now = Utc::now();
        Ok(Order {
            order_id: OrderId::new(&ack.order_id),
            client_id: Some(ClientOrderId::new(
                ack.client_oid.as_deref().unwrap_or_default(),
            )),
            symbol: request.symbol.clone(),
            side: request.side,
            kind: request.kind,
            price: request.price,
            quantity: request.quantity,
            filled_quantity: Decimal::ZERO,
            status: OrderStatus::New,
            time_in_force: request.time_in_force,
            created_at: now,
            updated_at: now,
        })
    }

    async fn cancel_order(
        &self,
        order_id: &OrderId,
        symbol: &Symbol,
    ) -> Result<Option<Order>, ExchangeError> {
        let request = CancelOrderRequest {
            body: CancelOrderBody {
                symbol: self.remember(symbol),
                order_id: order_id.to_string(),
            },
        };
        let response = self
            .client
            .execute(request, &self.order_bucket, &self.cancel)
            .await?;
        match response.into_data() {
            Ok(_ack) => match self.get_order(order_id, symbol).await {
                Ok(order) => Ok(Some(order)),
                Err(ExchangeError::InvalidOrder(_)) => Ok(None),
                Err(error) => Err(error),
            },
            Err(ExchangeError::InvalidOrder(message)) if message.contains("order not found") => {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>, ExchangeError> {
        let request = UnfilledOrdersRequest {
            query: OptionalSymbolQuery {
                symbol: symbol.map(|symbol| self.remember(symbol)),
            },
        };
        let data = self
            .client
            .execute(request, &self.private_bucket, &self.cancel)
            .await?
            .into_data()?;
        Ok(data
            .into_iter()
            .filter_map(|order| self.map_order(order))
            .collect())
    }

    async fn get_order(&self, order_id: &OrderId, symbol: &Symbol) -> Result<Order, ExchangeError> {
        // orderInfo ignores the symbol; remember it so the response can resolve.
        self.remember(symbol);
        let request = OrderInfoRequest {
            query: OrderInfoQuery {
                order_id: Some(order_id.to_string()),
                client_oid: None,
            },
        };
        let data = self
            .client
            .execute(request, &self.private_bucket, &self.cancel)
            .await?
            .into_data()?;
        data.into_iter()
            .filter_map(|order| self.map_order(order))
            .next()
            .ok_or_else(|| ExchangeError::InvalidOrder(format!("order not found: {order_id}")))
    }

    async fn get_order_by_client_id(
        &self,
        client_id: &str,
        symbol: &Symbol,
    ) -> Result<Option<Order>, ExchangeError> {
        self.remember(symbol);
        let request = OrderInfoRequest {
            query: OrderInfoQuery {
                order_id: None,
                client_oid: Some(client_id.to_string()),
            },
        };
        match self
            .client
            .execute(request, &self.private_bucket, &self.cancel)
            .await?
            .into_data()
        {
            Ok(data) => Ok(data
                .into_iter()
                .filter_map(|order| self.map_order(order))
                .next()),
            Err(ExchangeError::InvalidOrder(_)) => Ok(None),
            Err(error) => Err(error),
        }
    }
}

pub struct BitgetSignConfig<'a> {
    api_key: &'a str,
    passphrase: &'a str,
    timestamp: i64,
    method: reqwest::Method,
    path: String,
    body_to_sign: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BitgetSigner {
    pub api_key: String,
    pub passphrase: String,
}

impl Signer for BitgetSigner {
    type Config<'a>
        = BitgetSignConfig<'a>
    where
        Self: 'a;

    fn config<'a, Request>(
        &'a self,
        request: &Request,
        _: &reqwest::RequestBuilder,
    ) -> Result<Self::Config<'a>, SocketError>
    where
        Request: RestRequest,
    {
        let query = match request.query_params() {
            Some(params) => serde_urlencoded::to_string(params)?,
            None => String::default(),
        };
        let path = if query.is_empty() {
            request.path().to_string()
        } else {
            format!("{}?{query}", request.path())
        };
        let body_to_sign = request
            .body()
            .map(serde_json::to_string)
            .transpose()
            .map_err(SocketError::Serialise)?;

        Ok(Self::Config {
            api_key: self.api_key.as_str(),
            passphrase: self.passphrase.as_str(),
            timestamp: Utc::now().timestamp_millis(),
            method: Request::method(),
            path,
            body_to_sign,
        })
    }

    fn add_bytes_to_sign<M>(mac: &mut M, config: &Self::Config<'_>)
    where
        M: Mac,
    {
        // The message being signed is "{timestamp}{METHOD}{path}{body}"
        mac.update(config.timestamp.to_string().as_bytes());
        mac.update(config.method.as_str().as_bytes());
        mac.update(config.path.as_bytes());
        if let Some(body) = &config.body_to_sign {
            mac.update(body.as_bytes());
        }
    }

    fn build_signed_request<'a>(
        config: Self::Config<'a>,
        builder: reqwest::RequestBuilder,
        signature: String,
    ) -> Result<reqwest::Request, SocketError> {
        builder
            .header("ACCESS-KEY", config.api_key)
            .header("ACCESS-SIGN", signature)
            .header("ACCESS-TIMESTAMP", config.timestamp)
            .header("ACCESS-PASSPHRASE", config.passphrase)
            .header("Content-Type", "application/json")
            .header("locale", "en-US")
            .build()
            .map_err(SocketError::from)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct BitgetParser;

#[derive(Debug, Deserialize)]
pub struct BitgetApiError {
    pub code: String,
    pub msg: String,
}

impl HttpParser for BitgetParser {
    type ApiError = BitgetApiError;
    type OutputError = ExchangeError;

    fn parse_api_error(&self, status: StatusCode, error: Self::ApiError) -> Self::OutputError {
        map_bitget_code(status.as_u16(), &error.code, error.msg)
    }
}

fn map_bitget_code(status: u16, code: &str, msg: String) -> ExchangeError {
    match (status, code) {
        (429, _) | (_, "30007") | (_, "429") => ExchangeError::RateLimited {
            retry_after_ms: None,
        },
        (401, _) | (403, _) | (_, "40006") | (_, "40037") | (_, "40012") => {
            ExchangeError::Auth(msg)
        }
        (_, "43001") | (_, "43025") => {
            ExchangeError::InvalidOrder(format!("order not found: {msg}"))
        }
        (status, _) if status >= 500 => ExchangeError::Network(format!("status={status}")),
        _ => ExchangeError::InvalidOrder(format!("code={code} msg={msg}")),
    }
}

/// Bitget wraps every payload in a `code`/`msg`/`data` envelope.
#[derive(Debug, Deserialize)]
struct BitgetResponse<T> {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default = "Option::default")]
    data: Option<T>,
}

impl<T> BitgetResponse<T> {
    fn into_data(self) -> Result<T, ExchangeError> {
        if self.code != SUCCESS_CODE {
            return Err(map_bitget_code(
                200,
                &self.code,
                self.msg.unwrap_or_default(),
            ));
        }
        self.data
            .ok_or_else(|| ExchangeError::Internal("missing data in success envelope".into()))
    }
}

struct ServerTimeRequest;

impl RestRequest for ServerTimeRequest {
    type Response = BitgetResponse<serde_json::Value>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/public/time")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }
}

struct SymbolsRequest;

impl RestRequest for SymbolsRequest {
    type Response = BitgetResponse<Vec<BitgetMarket>>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/spot/public/symbols")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }
}

#[derive(Debug, Serialize)]
struct SymbolQuery {
    symbol: String,
}

#[derive(Debug, Serialize)]
struct OptionalSymbolQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<String>,
}

struct TickersRequest {
    query: SymbolQuery,
}

impl RestRequest for TickersRequest {
    type Response = BitgetResponse<Vec<BitgetTickerItem>>;
    type QueryParams = SymbolQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/spot/market/tickers")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }
}

#[derive(Debug, Serialize)]
struct OrderBookQuery {
    symbol: String,
    limit: u32,
}

struct OrderBookRequest {
    query: OrderBookQuery,
}

impl RestRequest for OrderBookRequest {
    type Response = BitgetResponse<BitgetOrderBook>;
    type QueryParams = OrderBookQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/spot/market/orderbook")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }
}

struct AssetsRequest;

impl RestRequest for AssetsRequest {
    type Response = BitgetResponse<Vec<BitgetAsset>>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/spot/account/assets")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderBody {
    symbol: String,
    side: &'static str,
    order_type: &'static str,
    force: &'static str,
    #[serde(with = "rust_decimal::serde::str")]
    size: Decimal,
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::str_option")]
    price: Option<Decimal>,
    client_oid: String,
}

struct PlaceOrderRequest {
    client_id: String,
    body: PlaceOrderBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitgetOrderAck {
    order_id: String,
    #[serde(default)]
    client_oid: Option<String>,
}

impl RestRequest for PlaceOrderRequest {
    type Response = BitgetResponse<BitgetOrderAck>;
    type QueryParams = ();
    type Body = PlaceOrderBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/spot/trade/place-order")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }

    fn idempotent() -> bool {
        false
    }

    fn client_id(&self) -> Option<&str> {
        Some(&self.client_id)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CancelOrderBody {
    symbol: String,
    order_id: String,
}

struct CancelOrderRequest {
    body: CancelOrderBody,
}

impl RestRequest for CancelOrderRequest {
    type Response = BitgetResponse<BitgetOrderAck>;
    type QueryParams = ();
    type Body = CancelOrderBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/spot/trade/cancel-order")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::POST
    }

    fn body(&self) -> Option<&Self::Body> {
        Some(&self.body)
    }

    fn idempotent() -> bool {
        false
    }
}

struct UnfilledOrdersRequest {
    query: OptionalSymbolQuery,
}

impl RestRequest for UnfilledOrdersRequest {
    type Response = BitgetResponse<Vec<BitgetOrder>>;
    type QueryParams = OptionalSymbolQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/spot/trade/unfilled-orders")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderInfoQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_oid: Option<String>,
}

struct OrderInfoRequest {
    query: OrderInfoQuery,
}

impl RestRequest for OrderInfoRequest {
    type Response = BitgetResponse<Vec<BitgetOrder>>;
    type QueryParams = OrderInfoQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v2/spot/trade/orderInfo")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }
}

#[derive(Debug, Deserialize)]
struct BitgetDepthLevel(
    #[serde(with = "rust_decimal::serde::str")] Decimal,
    #[serde(with = "rust_decimal::serde::str")] Decimal,
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitgetMarket {
    symbol: String,
    base_coin: String,
    quote_coin: String,
    status: String,
    #[serde(deserialize_with = "quantra_integration::de::de_str")]
    price_precision: u32,
    #[serde(deserialize_with = "quantra_integration::de::de_str")]
    quantity_precision: u32,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    min_trade_amount: Option<Decimal>,
    #[serde(rename = "minTradeUSDT", default, with = "rust_decimal::serde::str_option")]
    min_trade_usdt: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct BitgetTickerItem {
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
}

#[derive(Debug, Deserialize)]
struct BitgetOrderBook {
    #[serde(default)]
    bids: Vec<BitgetDepthLevel>,
    #[serde(default)]
    asks: Vec<BitgetDepthLevel>,
    ts: String,
}

#[derive(Debug, Deserialize)]
struct BitgetAsset {
    coin: String,
    #[serde(with = "rust_decimal::serde::str")]
    available: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    frozen: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    locked: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BitgetOrder {
    symbol: String,
    order_id: String,
    #[serde(default)]
    client_oid: Option<String>,
    side: Side,
    order_type: String,
    #[serde(default, alias = "priceAvg", with = "rust_decimal::serde::str_option")]
    price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    size: Decimal,
    #[serde(default, alias = "accBaseVolume", with = "rust_decimal::serde::str_option")]
    base_volume: Option<Decimal>,
    status: String,
    #[serde(default)]
    force: Option<String>,
    #[serde(default, rename = "cTime")]
    c_time: Option<String>,
}
