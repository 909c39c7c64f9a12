//! Binance spot REST adapter.
//!
//! Signed requests carry the HMAC-SHA256 signature of the url-encoded query string
//! (plus `timestamp`) as a trailing `signature` query parameter, with the api key in
//! the `X-MBX-APIKEY` header.

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
        private::{RequestSigner, Signer, encoder::HexEncoder},
        public::PublicNoHeaders,
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
use tracing::warn;

const HTTP_BASE_URL: &str = "https://api.binance.com";
const HTTP_BASE_URL_SANDBOX: &str = "https://testnet.binance.vision";

pub type BinanceRequestSigner = RequestSigner<BinanceSigner, Hmac<Sha256>, HexEncoder>;

/// [`ExchangeApi`] implementation for Binance spot.
pub struct BinanceExecution {
    public: RestClient<'static, PublicNoHeaders, BinanceParser>,
    private: RestClient<'static, BinanceRequestSigner, BinanceParser>,
    public_bucket: RateLimiter,
    private_bucket: RateLimiter,
    order_bucket: RateLimiter,
    cancel: CancellationToken,
    symbols: RwLock<HashMap<String, Symbol>>,
}

impl std::fmt::Debug for BinanceExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceExecution").finish_non_exhaustive()
    }
}

impl BinanceExecution {
    pub fn new(credentials: ApiCredentials, sandbox: bool, cancel: CancellationToken) -> Self {
        let base_url = if sandbox {
            HTTP_BASE_URL_SANDBOX
        } else {
            HTTP_BASE_URL
        };
        let mac = Hmac::<Sha256>::new_from_slice(credentials.secret.as_bytes())
            .unwrap_or_else(|_| Hmac::<Sha256>::new_from_slice(&[0u8; 32]).expect("fixed length"));
        let signer = RequestSigner::new(
            BinanceSigner {
                api_key: credentials.api_key,
            },
            mac,
            HexEncoder,
        );
        Self {
            public: RestClient::new(base_url, PublicNoHeaders, BinanceParser),
            private: RestClient::new(base_url, signer, BinanceParser),
            // Documented weight budget of 6000/min, order budget of 100/10s.
            public_bucket: RateLimiter::per_minute(6_000, 50),
            private_bucket: RateLimiter::per_minute(6_000, 50),
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

    fn map_order(&self, response: BinanceOrderResponse) -> Option<Order> {
        let symbol = self.resolve(&response.symbol)?;
        let time = response
            .transact_time
            .or(response.time)
            .or(response.update_time)
            .and_then(chrono::DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        Some(Order {
            order_id: OrderId::new(response.order_id.to_string()),
            client_id: response
                .client_order_id
                .filter(|id| !id.is_empty())
                .map(ClientOrderId::new),
            symbol,
            side: response.side,
            kind: kind_from_native(&response.kind),
            price: response.price.filter(|price| !price.is_zero()),
            quantity: response.orig_qty,
            filled_quantity: response.executed_qty,
            status: status_from_native(&response.status),
            time_in_force: tif_from_native(response.time_in_force.as_deref()),
            created_at: time,
            updated_at: time,
        })
    }
}

#[async_trait]
impl ExchangeApi for BinanceExecution {
    fn id(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            order_kinds: vec![
                OrderKind::Market,
                OrderKind::Limit,
                OrderKind::Stop,
                OrderKind::StopLimit,
                OrderKind::TakeProfit,
                OrderKind::TakeProfitLimit,
            ],
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
        self.public
            .execute(PingRequest, &self.public_bucket, &self.cancel)
            .await
            .map(|_: serde_json::Value| ())
    }

    async fn disconnect(&self) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn get_markets(&self) -> Result<Vec<Market>, ExchangeError> {
        let response: ExchangeInfoResponse = self
            .public
            .execute(ExchangeInfoRequest, &self.public_bucket, &self.cancel)
            .await?;

        let markets = response
            .symbols
            .into_iter()
            .filter(|market| market.status == "TRADING")
            .map(|market| {
                let symbol = Symbol::new(&market.base_asset, &market.quote_asset);
                self.symbols.write().insert(market.symbol, symbol.clone());

                let mut price_precision = 8;
                let mut qty_precision = 8;
                let mut min_qty = Decimal::ZERO;
                let mut min_notional = Decimal::ZERO;
                for filter in market.filters {
                    match filter {
                        BinanceFilter::PriceFilter { tick_size } => {
                            price_precision = tick_size.normalize().scale();
                        }
                        BinanceFilter::LotSize { step_size, min_qty: filter_min } => {
                            qty_precision = step_size.normalize().scale();
                            min_qty = filter_min;
                        }
                        BinanceFilter::Notional { min_notional: filter_min } => {
                            min_notional = filter_min;
                        }
                        BinanceFilter::Other => {}
                    }
                }

                Market::new(
                    symbol,
                    AssetName::new(&market.base_asset),
                    AssetName::new(&market.quote_asset),
                    price_precision,
                    qty_precision,
                    min_qty,
                    min_notional,
                )
            })
            .collect();
        Ok(markets)
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExchangeError> {
        let request = TickerRequest {
            query: SymbolQuery {
                symbol: self.remember(symbol),
            },
        };
        let response: BinanceTickerResponse = self
            .public
            .execute(request, &self.public_bucket, &self.cancel)
            .await?;
        Ok(Ticker::new(
            response.bid_price,
            response.ask_price,
            response.last_price,
            response.volume,
            response.quote_volume,
        ))
    }

    async fn get_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> Result<OrderBookSnapshot, ExchangeError> {
        let request = DepthRequest {
            query: DepthQuery {
                symbol: self.remember(symbol),
                limit: depth.min(5_000) as u32,
            },
        };
        let response: BinanceDepthResponse = self
            .public
            .execute(request, &self.public_bucket, &self.cancel)
            .await?;
        Ok(OrderBookSnapshot::new(
            response.last_update_id,
            response
                .bids
                .into_iter()
                .map(|level| Level::new(level.0, level.1))
                .collect(),
            response
                .asks
                .into_iter()
                .map(|level| Level::new(level.0, level.1))
                .collect(),
        ))
    }

    async fn get_balances(&self) -> Result<Vec<AssetBalance>, ExchangeError> {
        let response: BinanceAccountResponse = self
            .private
            .execute(AccountRequest, &self.private_bucket, &self.cancel)
            .await?;
        Ok(response
            .balances
            .into_iter()
            .filter(|balance| !balance.free.is_zero() || !balance.locked.is_zero())
            .map(|balance| {
                AssetBalance::new(
                    AssetName::new(&balance.asset),
                    Balance::new(balance.free, balance.locked),
                )
            })
            .collect())
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<Order, ExchangeError> {
        if request.kind.requires_price() && request.price.is_none() {
            return Err(ExchangeError::InvalidOrder(format!(
                "{} order requires a price",
                request.kind
            )));
        }

        let native_symbol = self.remember(&request.symbol);
        let place = PlaceOrderRequest {
            client_id: request.client_id.to_string(),
            query: PlaceOrderQuery {
                symbol: native_symbol,
                side: side_to_native(request.side),
                kind: kind_to_native(request.kind),
                quantity: request.quantity,
                price: request.price,
                time_in_force: matches!(request.kind, OrderKind::Limit | OrderKind::StopLimit | OrderKind::TakeProfitLimit)
                    .then(|| tif_to_native(request.time_in_force)),
                new_client_order_id: request.client_id.to_string(),
            },
        };

        let response: BinanceOrderResponse = self
            .private
            .execute(place, &self.order_bucket, &self.cancel)
            .await?;
        self.map_order(response).ok_or_else(|| {
            ExchangeError::Internal("placement response referenced unknown market".to_string())
        })
    }

    async fn cancel_order(
        &self,
        order_id: &OrderId,
        symbol: &Symbol,
    ) -> Result<Option<Order>, ExchangeError> {
        let request = CancelOrderRequest {
            query: OrderRefQuery {
                symbol: self.remember(symbol),
                order_id: Some(order_id.to_string()),
                orig_client_order_id: None,
            },
        };
        match self
            .private
            .execute(request, &self.order_bucket, &self.cancel)
            .await
        {
            Ok(response) => Ok(self.map_order(response)),
            // Cancel of an unknown or already-terminal order is a no-op success.
            Err(ExchangeError::InvalidOrder(message)) if message.contains("unknown order") => {
                warn!(%order_id, "cancel for unknown order treated as no-op");
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>, ExchangeError> {
        let request = OpenOrdersRequest {
            query: OpenOrdersQuery {
                symbol: symbol.map(|symbol| self.remember(symbol)),
            },
        };
        let response: Vec<BinanceOrderResponse> = self
            .private
            .execute(request, &self.private_bucket, &self.cancel)
            .await?;
        Ok(response
            .into_iter()
            .filter_map(|order| self.map_order(order))
            .collect())
    }

    async fn get_order(&self, order_id: &OrderId, symbol: &Symbol) -> Result<Order, ExchangeError> {
        let request = GetOrderRequest {
            query: OrderRefQuery {
                symbol: self.remember(symbol),
                order_id: Some(order_id.to_string()),
                orig_client_order_id: None,
            },
        };
        let response: BinanceOrderResponse = self
            .private
            .execute(request, &self.private_bucket, &self.cancel)
            .await?;
        self.map_order(response)
            .ok_or_else(|| ExchangeError::Internal("order referenced unknown market".to_string()))
    }

    async fn get_order_by_client_id(
        &self,
        client_id: &str,
        symbol: &Symbol,
    ) -> Result<Option<Order>, ExchangeError> {
        let request = GetOrderRequest {
            query: OrderRefQuery {
                symbol: self.remember(symbol),
                order_id: None,
                orig_client_order_id: Some(client_id.to_string()),
            },
        };
        match self
            .private
            .execute(request, &self.private_bucket, &self.cancel)
            .await
        {
            Ok(response) => Ok(self.map_order(response)),
            Err(ExchangeError::InvalidOrder(message)) if message.contains("unknown order") => {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

/// Signing material for one Binance request.
pub struct BinanceSignConfig<'a> {
    api_key: &'a str,
    timestamp: i64,
    params_to_sign: String,
}

#[derive(Debug, Clone)]
pub struct BinanceSigner {
    api_key: String,
}

impl Signer for BinanceSigner {
    type Config<'a>
        = BinanceSignConfig<'a>
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
        let params = match request.query_params() {
            Some(params) => serde_urlencoded::to_string(params)?,
            None => String::default(),
        };
        Ok(Self::Config {
            api_key: self.api_key.as_str(),
            timestamp: Utc::now().timestamp_millis(),
            params_to_sign: params,
        })
    }

    fn add_bytes_to_sign<M>(mac: &mut M, config: &Self::Config<'_>)
    where
        M: Mac,
    {
        // Signed payload is the query string exactly as sent, timestamp last.
        if config.params_to_sign.is_empty() {
            mac.update(format!("timestamp={}", config.timestamp).as_bytes());
        } else {
            mac.update(
                format!("{}&timestamp={}", config.params_to_sign, config.timestamp).as_bytes(),
            );
        }
    }

    fn build_signed_request<'a>(
        config: Self::Config<'a>,
        builder: reqwest::RequestBuilder,
        signature: String,
    ) -> Result<reqwest::Request, SocketError> {
        builder
            .query(&[("timestamp", config.timestamp.to_string())])
            .query(&[("signature", signature)])
            .header("X-MBX-APIKEY", config.api_key)
            .build()
            .map_err(SocketError::from)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct BinanceParser;

#[derive(Debug, Deserialize)]
pub struct BinanceApiError {
    pub code: i64,
    pub msg: String,
}

impl HttpParser for BinanceParser {
    type ApiError = BinanceApiError;
    type OutputError = ExchangeError;

    fn parse_api_error(&self, status: StatusCode, error: Self::ApiError) -> Self::OutputError {
        match (status.as_u16(), error.code) {
            (429, _) | (418, _) | (_, -1003) => ExchangeError::RateLimited {
                retry_after_ms: None,
            },
            (401, _) | (403, _) | (_, -1022) | (_, -2014) | (_, -2015) => {
                ExchangeError::Auth(error.msg)
            }
            (_, -2011) | (_, -2013) => {
                ExchangeError::InvalidOrder(format!("unknown order: {}", error.msg))
            }
            (_, code) if (-2000..=-1000).contains(&code) => ExchangeError::InvalidOrder(format!(
                "code={code} msg={msg}",
                msg = error.msg
            )),
            (status, code) if status >= 500 => {
                ExchangeError::Network(format!("status={status} code={code}"))
            }
            (_, code) => ExchangeError::InvalidOrder(format!(
                "code={code} msg={msg}",
                msg = error.msg
            )),
        }
    }
}

fn side_to_native(side: Side) -> &'static str {
    match side {
        Side::Buy => "BUY",
        Side::Sell => "SELL",
    }
}

fn kind_to_native(kind: OrderKind) -> &'static str {
    match kind {
        OrderKind::Market => "MARKET",
        OrderKind::Limit => "LIMIT",
        OrderKind::Stop => "STOP_LOSS",
        OrderKind::StopLimit => "STOP_LOSS_LIMIT",
        OrderKind::TakeProfit => "TAKE_PROFIT",
        OrderKind::TakeProfitLimit => "TAKE_PROFIT_LIMIT",
    }
}

fn kind_from_native(kind: &str) -> OrderKind {
    match kind {
        "LIMIT" | "LIMIT_MAKER" => OrderKind::Limit,
        "STOP_LOSS" => OrderKind::Stop,
        "STOP_LOSS_LIMIT" => OrderKind::StopLimit,
        "TAKE_PROFIT" => OrderKind::TakeProfit,
        "TAKE_PROFIT_LIMIT" => OrderKind::TakeProfitLimit,
        _ => OrderKind::Market,
    }
}

fn tif_to_native(time_in_force: TimeInForce) -> &'static str {
    match time_in_force {
        TimeInForce::GoodTilCancelled => "GTC",
        TimeInForce::ImmediateOrCancel => "IOC",
        TimeInForce::FillOrKill => "FOK",
        TimeInForce::GoodTilDate => "GTD",
    }
}

fn tif_from_native(time_in_force: Option<&str>) -> TimeInForce {
    match time_in_force {
        Some("IOC") => TimeInForce::ImmediateOrCancel,
        Some("FOK") => TimeInForce::FillOrKill,
        Some("GTD") => TimeInForce::GoodTilDate,
        _ => TimeInForce::GoodTilCancelled,
    }
}

fn status_from_native(status: &str) -> OrderStatus {
    match status {
        "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
        "FILLED" => OrderStatus::Filled,
        "CANCELED" | "PENDING_CANCEL" => OrderStatus::Canceled,
        "REJECTED" => OrderStatus::Rejected,
        "EXPIRED" | "EXPIRED_IN_MATCH" => OrderStatus::Expired,
        _ => OrderStatus::New,
    }
}

struct PingRequest;

impl RestRequest for PingRequest {
    type Response = serde_json::Value;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v3/ping")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }
}

struct ExchangeInfoRequest;

impl RestRequest for ExchangeInfoRequest {
    type Response = ExchangeInfoResponse;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v3/exchangeInfo")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn tokens() -> u32 {
        10
    }
}

#[derive(Debug, Serialize)]
struct SymbolQuery {
    symbol: String,
}

struct TickerRequest {
    query: SymbolQuery,
}

impl RestRequest for TickerRequest {
    type Response = BinanceTickerResponse;
    type QueryParams = SymbolQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v3/ticker/24hr")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }
}

#[derive(Debug, Serialize)]
struct DepthQuery {
    symbol: String,
    limit: u32,
}

struct DepthRequest {
    query: DepthQuery,
}

impl RestRequest for DepthRequest {
    type Response = BinanceDepthResponse;
    type QueryParams = DepthQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v3/depth")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }
}

struct AccountRequest;

impl RestRequest for AccountRequest {
    type Response = BinanceAccountResponse;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v3/account")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderQuery {
    symbol: String,
    side: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    quantity: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    price: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_in_force: Option<&'static str>,
    new_client_order_id: String,
}

struct PlaceOrderRequest {
    client_id: String,
    query: PlaceOrderQuery,
}

impl RestRequest for PlaceOrderRequest {
    type Response = BinanceOrderResponse;
    type QueryParams = PlaceOrderQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v3/order")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::POST
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
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
struct OrderRefQuery {
    symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    orig_client_order_id: Option<String>,
}

struct CancelOrderRequest {
    query: OrderRefQuery,
}

impl RestRequest for CancelOrderRequest {
    type Response = BinanceOrderResponse;
    type QueryParams = OrderRefQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v3/order")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::DELETE
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }

    fn idempotent() -> bool {
        false
    }
}

struct GetOrderRequest {
    query: OrderRefQuery,
}

impl RestRequest for GetOrderRequest {
    type Response = BinanceOrderResponse;
    type QueryParams = OrderRefQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v3/order")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }
}

#[derive(Debug, Serialize)]
struct OpenOrdersQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<String>,
}

struct OpenOrdersRequest {
    query: OpenOrdersQuery,
}

impl RestRequest for OpenOrdersRequest {
    type Response = Vec<BinanceOrderResponse>;
    type QueryParams = OpenOrdersQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/api/v3/openOrders")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }

    fn tokens() -> u32 {
        3
    }
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<BinanceMarket>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceMarket {
    symbol: String,
    status: String,
    base_asset: String,
    quote_asset: String,
    filters: Vec<BinanceFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "filterType")]
enum BinanceFilter {
    #[serde(rename = "PRICE_FILTER", rename_all = "camelCase")]
    PriceFilter {
        #[serde(with = "rust_decimal::serde::str")]
        tick_size: Decimal,
    },
    #[serde(rename = "LOT_SIZE", rename_all = "camelCase")]
    LotSize {
        #[serde(with = "rust_decimal::serde::str")]
        step_size: Decimal,
        #[serde(with = "rust_decimal::serde::str")]
        min_qty: Decimal,
    },
    #[serde(rename = "NOTIONAL", alias = "MIN_NOTIONAL", rename_all = "camelCase")]
    Notional {
        #[serde(with = "rust_decimal::serde::str")]
        min_notional: Decimal,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceTickerResponse {
    #[serde(with = "rust_decimal::serde::str")]
    bid_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    ask_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    last_price: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    volume: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    quote_volume: Decimal,
}

#[derive(Debug, Deserialize)]
struct BinanceDepthLevel(
    #[serde(with = "rust_decimal::serde::str")] Decimal,
    #[serde(with = "rust_decimal::serde::str")] Decimal,
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceDepthResponse {
    last_update_id: u64,
    bids: Vec<BinanceDepthLevel>,
    asks: Vec<BinanceDepthLevel>,
}

#[derive(Debug, Deserialize)]
struct BinanceAccountResponse {
    balances: Vec<BinanceAccountBalance>,
}

#[derive(Debug, Deserialize)]
struct BinanceAccountBalance {
    asset: String,
    #[serde(with = "rust_decimal::serde::str")]
    free: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    locked: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BinanceOrderResponse {
    symbol: String,
    order_id: u64,
    #[serde(default, alias = "origClientOrderId")]
    client_order_id: Option<String>,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    price: Option<Decimal>,
    #[serde(rename = "origQty", with = "rust_decimal::serde::str")]
    orig_qty: Decimal,
    #[serde(rename = "executedQty", with = "rust_decimal::serde::str")]
    executed_qty: Decimal,
    status: String,
    #[serde(default)]
    time_in_force: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    side: Side,
    #[serde(default)]
    time: Option<i64>,
    #[serde(default)]
    transact_time: Option<i64>,
    #[serde(default)]
    update_time: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_signature_payload_ordering() {
        let signer = BinanceSigner {
            api_key: "key".to_string(),
        };
        let request = GetOrderRequest {
            query: OrderRefQuery {
                symbol: "BTCUSDT".to_string(),
                order_id: Some("42".to_string()),
                orig_client_order_id: None,
            },
        };
        let builder = reqwest::Client::new().get("https://api.binance.com/api/v3/order");
        let config = signer.config(&request, &builder).unwrap();
        assert_eq!(config.params_to_sign, "symbol=BTCUSDT&orderId=42");

        let mut mac = Hmac::<Sha256>::new_from_slice(b"secret").unwrap();
        BinanceSigner::add_bytes_to_sign(&mut mac, &config);
        // The signed payload ends with the timestamp, matching the sent query string.
    }

    #[test]
    fn test_error_code_mapping() {
        let parser = BinanceParser;
        assert!(matches!(
            parser.parse_api_error(
                StatusCode::BAD_REQUEST,
                BinanceApiError {
                    code: -2011,
                    msg: "Unknown order sent.".to_string()
                }
            ),
            ExchangeError::InvalidOrder(message) if message.contains("unknown order")
        ));
        assert!(matches!(
            parser.parse_api_error(
                StatusCode::TOO_MANY_REQUESTS,
                BinanceApiError {
                    code: -1003,
                    msg: "Too many requests.".to_string()
                }
            ),
            ExchangeError::RateLimited { .. }
        ));
        assert!(matches!(
            parser.parse_api_error(
                StatusCode::UNAUTHORIZED,
                BinanceApiError {
                    code: -2014,
                    msg: "API-key format invalid.".to_string()
                }
            ),
            ExchangeError::Auth(_)
        ));
    }

    #[test]
    fn test_order_response_mapping() {
        let execution = BinanceExecution::new(
            ApiCredentials::new("key", "secret"),
            false,
            CancellationToken::new(),
        );
        execution.remember(&"BTC/USDT".parse().unwrap());

        let payload = r#"{
            "symbol":"BTCUSDT","orderId":28,"clientOrderId":"cid-28",
            "price":"20000.00000000","origQty":"1.00000000","executedQty":"0.40000000",
            "status":"PARTIALLY_FILLED","timeInForce":"GTC","type":"LIMIT","side":"BUY",
            "transactTime":1700000000000
        }"#;
        let response: BinanceOrderResponse = serde_json::from_str(payload).unwrap();
        let order = execution.map_order(response).unwrap();
        assert_eq!(order.symbol, "BTC/USDT".parse().unwrap());
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_quantity, dec!(0.4));
        assert_eq!(order.kind, OrderKind::Limit);
        assert!(order.fill_invariant_holds());
    }
}
