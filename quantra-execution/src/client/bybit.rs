//! Bybit spot REST adapter (v5).
//!
//! Bybit returns application errors inside HTTP 200 envelopes (`retCode != 0`), so
//! every response is unwrapped through the shared envelope before use. Signed requests
//! carry `X-BAPI-*` headers with an HMAC-SHA256 over
//! `{timestamp}{api_key}{recv_window}{payload}`.

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

const HTTP_BASE_URL: &str = "https://api.bybit.com";
const HTTP_BASE_URL_SANDBOX: &str = "https://api-testnet.bybit.com";
const RECV_WINDOW: &str = "5000";
const CATEGORY_SPOT: &str = "spot";

pub type BybitRequestSigner = RequestSigner<BybitSigner, Hmac<Sha256>, HexEncoder>;

/// [`ExchangeApi`] implementation for Bybit spot.
pub struct BybitExecution {
    client: RestClient<'static, BybitRequestSigner, BybitParser>,
    public_bucket: RateLimiter,
    private_bucket: RateLimiter,
    order_bucket: RateLimiter,
    cancel: CancellationToken,
    symbols: RwLock<HashMap<String, Symbol>>,
}

impl std::fmt::Debug for BybitExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BybitExecution").finish_non_exhaustive()
    }
}

impl BybitExecution {
    pub fn new(credentials: ApiCredentials, sandbox: bool, cancel: CancellationToken) -> Self {
        let base_url = if sandbox {
            HTTP_BASE_URL_SANDBOX
        } else {
            HTTP_BASE_URL
        };
        let mac = Hmac::<Sha256>::new_from_slice(credentials.secret.as_bytes())
            .unwrap_or_else(|_| Hmac::<Sha256>::new_from_slice(&[0u8; 32]).expect("fixed length"));
        let signer = RequestSigner::new(
            BybitSigner {
                api_key: credentials.api_key,
            },
            mac,
            HexEncoder,
        );
        Self {
            client: RestClient::new(base_url, signer, BybitParser),
            public_bucket: RateLimiter::new(10.0, 20),
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

    async fn execute<Request>(
        &self,
        request: Request,
        bucket: &RateLimiter,
    ) -> Result<Request::Response, ExchangeError>
    where
        Request: RestRequest,
    {
        self.client.execute(request, bucket, &self.cancel).await
    }

    fn map_order(&self, order: BybitOrder) -> Option<Order> {
        let symbol = self.resolve(&order.symbol)?;
        let created_at = order
            .created_time
            .as_deref()
            .and_then(|time| time.parse::<i64>().ok())
            .and_then(chrono::DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        let updated_at = order
            .updated_time
            .as_deref()
            .and_then(|time| time.parse::<i64>().ok())
            .and_then(chrono::DateTime::from_timestamp_millis)
            .unwrap_or(created_at);
        Some(Order {
            order_id: OrderId::new(&order.order_id),
            client_id: order
                .order_link_id
                .filter(|id| !id.is_empty())
                .map(ClientOrderId::new),
            symbol,
            side: order.side,
            kind: match order.order_type.as_str() {
                "Limit" => OrderKind::Limit,
                _ => OrderKind::Market,
            },
            price: order.price.filter(|price| !price.is_zero()),
            quantity: order.qty,
            filled_quantity: order.cum_exec_qty.unwrap_or_default(),
            status: match order.order_status.as_str() {
                "PartiallyFilled" => OrderStatus::PartiallyFilled,
                "Filled" => OrderStatus::Filled,
                "Cancelled" | "PartiallyFilledCanceled" => OrderStatus::Canceled,
                "Rejected" => OrderStatus::Rejected,
                "Expired" | "Deactivated" => OrderStatus::Expired,
                _ => OrderStatus::New,
            },
            time_in_force: match order.time_in_force.as_deref() {
                Some("IOC") => TimeInForce::ImmediateOrCancel,
                Some("FOK") => TimeInForce::FillOrKill,
                _ => TimeInForce::GoodTilCancelled,
            },
            created_at,
            updated_at,
        })
    }
}

#[async_trait]
impl ExchangeApi for BybitExecution {
    fn id(&self) -> ExchangeId {
        ExchangeId::Bybit
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
        let response = self
            .execute(ServerTimeRequest, &self.public_bucket)
            .await?;
        response.into_result().map(|_| ())
    }

    async fn disconnect(&self) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn get_markets(&self) -> Result<Vec<Market>, ExchangeError> {
        let response = self
            .execute(InstrumentsInfoRequest, &self.public_bucket)
            .await?;
        let result = response.into_result()?;
        Ok(result
            .list
            .into_iter()
            .filter(|instrument| instrument.status == "Trading")
            .map(|instrument| {
                let symbol = Symbol::new(&instrument.base_coin, &instrument.quote_coin);
                self.symbols
                    .write()
                    .insert(instrument.symbol, symbol.clone());
                Market::new(
                    symbol,
                    AssetName::new(&instrument.base_coin),
                    AssetName::new(&instrument.quote_coin),
                    instrument.price_filter.tick_size.normalize().scale(),
                    instrument.lot_size_filter.base_precision.normalize().scale(),
                    instrument.lot_size_filter.min_order_qty,
                    instrument.lot_size_filter.min_order_amt.unwrap_or_default(),
                )
            })
            .collect())
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExchangeError> {
        let request = TickersRequest {
            query: CategorySymbolQuery {
                category: CATEGORY_SPOT,
                symbol: Some(self.remember(symbol)),
            },
        };
        let result = self
            .execute(request, &self.public_bucket)
            .await?
            .into_result()?;
        let ticker = result.list.into_iter().next().ok_or_else(|| {
            ExchangeError::InvalidOrder(format!("no ticker returned for {symbol}"))
        })?;
        let last = ticker.last_price;
        Ok(Ticker::new(
            ticker.bid_price.unwrap_or(last),
            ticker.ask_price.unwrap_or(last),
            last,
            ticker.volume_24h,
            ticker.turnover_24h,
        ))
    }

    async fn get_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> Result<OrderBookSnapshot, ExchangeError> {
        let request = OrderBookRequest {
            query: OrderBookQuery {
                category: CATEGORY_SPOT,
                symbol: self.remember(symbol),
                limit: depth.min(200) as u32,
            },
        };
        let result = self
            .execute(request, &self.public_bucket)
            .await?
            .into_result()?;
        Ok(OrderBookSnapshot::new(
            result.update_id,
            result.bids.into_iter().map(|level| Level::new(level.0, level.1)).collect(),
            result.asks.into_iter().map(|level| Level::new(level.0, level.1)).collect(),
        ))
    }

    async fn get_balances(&self) -> Result<Vec<AssetBalance>, ExchangeError> {
        let result = self
            .execute(WalletBalanceRequest, &self.private_bucket)
            .await?
            .into_result()?;
        Ok(result
            .list
            .into_iter()
            .flat_map(|account| account.coin)
            .map(|coin| {
                let locked = coin.locked.unwrap_or_default();
                AssetBalance::new(
                    AssetName::new(&coin.coin),
                    Balance::new(coin.wallet_balance - locked, locked),
                )
            })
            .collect())
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<Order, ExchangeError> {
        let kind = match request.kind {
            OrderKind::Market => "Market",
            OrderKind::Limit => "Limit",
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
                category: CATEGORY_SPOT,
                symbol: self.remember(&request.symbol),
                side: match request.side {
                    Side::Buy => "Buy",
                    Side::Sell => "Sell",
                },
                order_type: kind,
                qty: request.quantity,
                price: request.price,
                time_in_force: match request.time_in_force {
                    TimeInForce::GoodTilCancelled => "GTC",
                    TimeInForce::ImmediateOrCancel => "IOC",
                    TimeInForce::FillOrKill => "FOK",
                    TimeInForce::GoodTilDate => {
                        return Err(ExchangeError::Unsupported {
                            venue: self.id().as_str(),
                            item: "time in force GTD".to_string(),
                        });
                    }
                },
                order_link_id: request.client_id.to_string(),
            },
        };

        let ack = self
            .execute(place, &self.order_bucket)
            .await?
            .into_result()?;
        let now = Utc::now();
        Ok(Order {
            order_id: OrderId::new(&ack.order_id),
            client_id: Some(ClientOrderId::new(&ack.order_link_id)),
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
                category: CATEGORY_SPOT,
                symbol: self.remember(symbol),
                order_id: order_id.to_string(),
            },
        };
        match self.execute(request, &self.order_bucket).await?.into_result() {
            Ok(_ack) => self.get_order(order_id, symbol).await.map(Some),
            Err(ExchangeError::InvalidOrder(message)) if message.contains("order not found") => {
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>, ExchangeError> {
        let request = OpenOrdersRequest {
            query: OpenOrdersQuery {
                category: CATEGORY_SPOT,
                symbol: symbol.map(|symbol| self.remember(symbol)),
                open_only: 0,
                order_id: None,
                order_link_id: None,
            },
        };
        let result = self
            .execute(request, &self.private_bucket)
            .await?
            .into_result()?;
        Ok(result
            .list
            .into_iter()
            .filter_map(|order| self.map_order(order))
            .collect())
    }

    async fn get_order(&self, order_id: &OrderId, symbol: &Symbol) -> Result<Order, ExchangeError> {
        let request = OpenOrdersRequest {
            query: OpenOrdersQuery {
                category: CATEGORY_SPOT,
                symbol: Some(self.remember(symbol)),
                open_only: 0,
                order_id: Some(order_id.to_string()),
                order_link_id: None,
            },
        };
        let result = self
            .execute(request, &self.private_bucket)
            .await?
            .into_result()?;
        result
            .list
            .into_iter()
            .filter_map(|order| self.map_order(order))
            .next()
            .ok_or_else(|| {
                ExchangeError::InvalidOrder(format!("order not found: {order_id}"))
            })
    }

    async fn get_order_by_client_id(
        &self,
        client_id: &str,
        symbol: &Symbol,
    ) -> Result<Option<Order>, ExchangeError> {
        let request = OpenOrdersRequest {
            query: OpenOrdersQuery {
                category: CATEGORY_SPOT,
                symbol: Some(self.remember(symbol)),
                open_only: 0,
                order_id: None,
                order_link_id: Some(client_id.to_string()),
            },
        };
        let result = self
            .execute(request, &self.private_bucket)
            .await?
            .into_result()?;
        Ok(result
            .list
            .into_iter()
            .filter_map(|order| self.map_order(order))
            .next())
    }
}

pub struct BybitSignConfig<'a> {
    api_key: &'a str,
    timestamp: i64,
    params_to_sign: String,
    body_to_sign: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BybitSigner {
    pub api_key: String,
}

impl Signer for BybitSigner {
    type Config<'a>
        = BybitSignConfig<'a>
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
        let params_to_sign = match request.query_params() {
            Some(params) => serde_urlencoded::to_string(params)?,
            None => String::default(),
        };

        let body_to_sign = request
            .body()
            .map(serde_json::to_string)
            .transpose()
            .map_err(SocketError::Serialise)?;

        Ok(Self::Config {
            api_key: self.api_key.as_str(),
            timestamp: Utc::now().timestamp_millis(),
            params_to_sign,
            body_to_sign,
        })
    }

    fn add_bytes_to_sign<M>(mac: &mut M, config: &Self::Config<'_>)
    where
        M: Mac,
    {
        // The message being signed is "{timestamp}{api_key}{recv_window}{query}{body}"
        mac.update(config.timestamp.to_string().as_bytes());
        mac.update(config.api_key.as_bytes());
        mac.update(RECV_WINDOW.as_bytes());
        mac.update(config.params_to_sign.as_bytes());
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
            .header("X-BAPI-API-KEY", config.api_key)
            .header("X-BAPI-TIMESTAMP", config.timestamp)
            .header("X-BAPI-SIGN", signature)
            .header("x-bapi-recv-window", RECV_WINDOW)
            .build()
            .map_err(SocketError::from)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct BybitParser;

#[derive(Debug, Deserialize)]
pub struct BybitHttpApiError {
    #[serde(rename = "retCode")]
    pub ret_code: i64,
    #[serde(rename = "retMsg")]
    pub ret_msg: String,
}

impl HttpParser for BybitParser {
    type ApiError = BybitHttpApiError;
    type OutputError = ExchangeError;

    fn parse_api_error(&self, status: StatusCode, error: Self::ApiError) -> Self::OutputError {
        map_ret_code(status.as_u16(), error.ret_code, error.ret_msg)
    }
}

fn map_ret_code(status: u16, ret_code: i64, ret_msg: String) -> ExchangeError {
    match (status, ret_code) {
        (429, _) | (_, 10006) | (_, 10018) => ExchangeError::RateLimited {
            retry_after_ms: None,
        },
        (401, _) | (403, _) | (_, 10003) | (_, 10004) | (_, 10007) | (_, 33004) => {
            ExchangeError::Auth(ret_msg)
        }
        (_, 110001) | (_, 170213) => {
            ExchangeError::InvalidOrder(format!("order not found: {ret_msg}"))
        }
        (status, _) if status >= 500 => ExchangeError::Network(format!("status={status}")),
        _ => ExchangeError::InvalidOrder(format!("retCode={ret_code} retMsg={ret_msg}")),
    }
}

/// Bybit wraps every payload in a `retCode`/`retMsg` envelope, errors included.
#[derive(Debug, Deserialize)]
pub struct BybitResponse<T> {
    #[serde(rename = "retCode")]
    ret_code: i64,
    #[serde(rename = "retMsg")]
    ret_msg: String,
    #[serde(default = "Option::default")]
    result: Option<T>,
}

impl<T> BybitResponse<T> {
    fn into_result(self) -> Result<T, ExchangeError> {
        if self.ret_code != 0 {
            return Err(map_ret_code(200, self.ret_code, self.ret_msg));
        }
        self.result
            .ok_or_else(|| ExchangeError::Internal("missing result in success envelope".into()))
    }
}

struct ServerTimeRequest;

impl RestRequest for ServerTimeRequest {
    type Response = BybitResponse<serde_json::Value>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/time")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }
}

struct InstrumentsInfoRequest;

#[derive(Debug, Deserialize)]
struct InstrumentsInfoResult {
    list: Vec<BybitInstrument>,
}

impl RestRequest for InstrumentsInfoRequest {
    type Response = BybitResponse<InstrumentsInfoResult>;
    type QueryParams = CategorySymbolQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/instruments-info")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        const QUERY: &CategorySymbolQuery = &CategorySymbolQuery {
            category: CATEGORY_SPOT,
            symbol: None,
        };
        Some(QUERY)
    }
}

#[derive(Debug, Serialize)]
struct CategorySymbolQuery {
    category: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<String>,
}

struct TickersRequest {
    query: CategorySymbolQuery,
}

#[derive(Debug, Deserialize)]
struct TickersResult {
    list: Vec<BybitTickerItem>,
}

impl RestRequest for TickersRequest {
    type Response = BybitResponse<TickersResult>;
    type QueryParams = CategorySymbolQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/tickers")
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
    category: &'static str,
    symbol: String,
    limit: u32,
}

struct OrderBookRequest {
    query: OrderBookQuery,
}

#[derive(Debug, Deserialize)]
struct OrderBookResult {
    #[serde(rename = "u")]
    update_id: u64,
    #[serde(rename = "b")]
    bids: Vec<BybitDepthLevel>,
    #[serde(rename = "a")]
    asks: Vec<BybitDepthLevel>,
}

impl RestRequest for OrderBookRequest {
    type Response = BybitResponse<OrderBookResult>;
    type QueryParams = OrderBookQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/market/orderbook")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }
}

struct WalletBalanceRequest;

#[derive(Debug, Serialize)]
struct WalletBalanceQuery {
    #[serde(rename = "accountType")]
    account_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct WalletBalanceResult {
    list: Vec<BybitWalletAccount>,
}

impl RestRequest for WalletBalanceRequest {
    type Response = BybitResponse<WalletBalanceResult>;
    type QueryParams = WalletBalanceQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/account/wallet-balance")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        const QUERY: &WalletBalanceQuery = &WalletBalanceQuery {
            account_type: "UNIFIED",
        };
        Some(QUERY)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderBody {
    category: &'static str,
    symbol: String,
    side: &'static str,
    order_type: &'static str,
    #[serde(with = "rust_decimal::serde::str")]
    qty: Decimal,
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::str_option")]
    price: Option<Decimal>,
    time_in_force: &'static str,
    order_link_id: String,
}

struct PlaceOrderRequest {
    client_id: String,
    body: PlaceOrderBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceOrderAck {
    order_id: String,
    order_link_id: String,
}

impl RestRequest for PlaceOrderRequest {
    type Response = BybitResponse<PlaceOrderAck>;
    type QueryParams = ();
    type Body = PlaceOrderBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/order/create")
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
    category: &'static str,
    symbol: String,
    order_id: String,
}

struct CancelOrderRequest {
    body: CancelOrderBody,
}

impl RestRequest for CancelOrderRequest {
    type Response = BybitResponse<PlaceOrderAck>;
    type QueryParams = ();
    type Body = CancelOrderBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/order/cancel")
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

#[derive(Debug, Serialize)]
struct OpenOrdersQuery {
    category: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    symbol: Option<String>,
    #[serde(rename = "openOnly")]
    open_only: u8,
    #[serde(rename = "orderId", skip_serializing_if = "Option::is_none")]
    order_id: Option<String>,
    #[serde(rename = "orderLinkId", skip_serializing_if = "Option::is_none")]
    order_link_id: Option<String>,
}

struct OpenOrdersRequest {
    query: OpenOrdersQuery,
}

#[derive(Debug, Deserialize)]
struct OpenOrdersResult {
    list: Vec<BybitOrder>,
}

impl RestRequest for OpenOrdersRequest {
    type Response = BybitResponse<OpenOrdersResult>;
    type QueryParams = OpenOrdersQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/v5/order/realtime")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }
}

#[derive(Debug, Deserialize)]
struct BybitDepthLevel(
    #[serde(with = "rust_decimal::serde::str")] Decimal,
    #[serde(with = "rust_decimal::serde::str")] Decimal,
);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitInstrument {
    symbol: String,
    status: String,
    base_coin: String,
    quote_coin: String,
    price_filter: BybitPriceFilter,
    lot_size_filter: BybitLotSizeFilter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitPriceFilter {
    #[serde(with = "rust_decimal::serde::str")]
    tick_size: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitLotSizeFilter {
    #[serde(with = "rust_decimal::serde::str")]
    base_precision: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    min_order_qty: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    min_order_amt: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitTickerItem {
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
#[serde(rename_all = "camelCase")]
struct BybitWalletAccount {
    coin: Vec<BybitWalletCoin>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitWalletCoin {
    coin: String,
    #[serde(with = "rust_decimal::serde::str")]
    wallet_balance: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    locked: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitOrder {
    symbol: String,
    order_id: String,
    #[serde(default)]
    order_link_id: Option<String>,
    side: Side,
    order_type: String,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    qty: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    cum_exec_qty: Option<Decimal>,
    order_status: String,
    #[serde(default)]
    time_in_force: Option<String>,
    #[serde(default)]
    created_time: Option<String>,
    #[serde(default)]
    updated_time: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_envelope_unwrap_success() {
        let payload = r#"{"retCode":0,"retMsg":"OK","result":{"orderId":"o-1","orderLinkId":"c-1"}}"#;
        let response: BybitResponse<PlaceOrderAck> = serde_json::from_str(payload).unwrap();
        let ack = response.into_result().unwrap();
        assert_eq!(ack.order_id, "o-1");
    }

    #[test]
    fn test_envelope_unwrap_error_codes() {
        let payload = r#"{"retCode":10006,"retMsg":"rate limit","result":null}"#;
        let response: BybitResponse<PlaceOrderAck> = serde_json::from_str(payload).unwrap();
        assert!(matches!(
            response.into_result(),
            Err(ExchangeError::RateLimited { .. })
        ));

        let payload = r#"{"retCode":110001,"retMsg":"order does not exist","result":null}"#;
        let response: BybitResponse<PlaceOrderAck> = serde_json::from_str(payload).unwrap();
        assert!(matches!(
            response.into_result(),
            Err(ExchangeError::InvalidOrder(message)) if message.contains("order not found")
        ));
    }

    #[test]
    fn test_order_mapping() {
        let execution = BybitExecution::new(
            ApiCredentials::new("key", "secret"),
            false,
            CancellationToken::new(),
        );
        execution.remember(&"BTC/USDT".parse().unwrap());

        let payload = r#"{
            "symbol":"BTCUSDT","orderId":"o-9","orderLinkId":"c-9","side":"Buy",
            "orderType":"Limit","price":"20000","qty":"1","cumExecQty":"0.25",
            "orderStatus":"PartiallyFilled","timeInForce":"GTC",
            "createdTime":"1700000000000","updatedTime":"1700000001000"
        }"#;
        let order: BybitOrder = serde_json::from_str(payload).unwrap();
        let order = execution.map_order(order).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_quantity, dec!(0.25));
        assert_eq!(order.time_in_force, TimeInForce::GoodTilCancelled);
    }
}
