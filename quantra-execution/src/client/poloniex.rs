//! Poloniex spot REST adapter (v3).
//!
//! Pairs are underscore-encoded (`BTC_USDT`), so no translation table is needed.
//! Signed requests carry `key`/`signTimestamp`/`signature` headers; the signature is a
//! base64 HMAC-SHA256 over `"{METHOD}\n{path}\n{sorted_params}"`. The 24h ticker
//! endpoint carries no bid/ask, so the adapter tops it up from the order book.

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
use tokio_util::sync::CancellationToken;

const HTTP_BASE_URL: &str = "https://api.poloniex.com";

pub type PoloniexRequestSigner = RequestSigner<PoloniexSigner, Hmac<Sha256>, Base64Encoder>;

/// [`ExchangeApi`] implementation for Poloniex spot.
pub struct PoloniexExecution {
    client: RestClient<'static, PoloniexRequestSigner, PoloniexParser>,
    public_bucket: RateLimiter,
    private_bucket: RateLimiter,
    order_bucket: RateLimiter,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PoloniexExecution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoloniexExecution").finish_non_exhaustive()
    }
}

impl PoloniexExecution {
    pub fn new(credentials: ApiCredentials, cancel: CancellationToken) -> Self {
        let mac = Hmac::<Sha256>::new_from_slice(credentials.secret.as_bytes())
            .unwrap_or_else(|_| Hmac::<Sha256>::new_from_slice(&[0u8; 32]).expect("fixed length"));
        let signer = RequestSigner::new(
            PoloniexSigner {
                api_key: credentials.api_key,
            },
            mac,
            Base64Encoder,
        );
        Self {
            client: RestClient::new(HTTP_BASE_URL, signer, PoloniexParser),
            public_bucket: RateLimiter::new(10.0, 20),
            private_bucket: RateLimiter::new(10.0, 20),
            order_bucket: RateLimiter::new(5.0, 10),
            cancel,
        }
    }

    fn native(symbol: &Symbol) -> String {
        format!("{}_{}", symbol.base(), symbol.quote())
    }

    fn canonical(native: &str) -> Result<Symbol, ExchangeError> {
        native
            .replace('_', "/")
            .parse()
            .map_err(|_| ExchangeError::Internal(format!("unparseable venue symbol: {native}")))
    }

    fn map_order(order: PoloniexOrder) -> Result<Order, ExchangeError> {
        let symbol = Self::canonical(&order.symbol)?;
        let created_at = order
            .create_time
            .and_then(chrono::DateTime::from_timestamp_millis)
            .unwrap_or_else(Utc::now);
        let updated_at = order
            .update_time
            .and_then(chrono::DateTime::from_timestamp_millis)
            .unwrap_or(created_at);
        Ok(Order {
            order_id: OrderId::new(&order.id),
            client_id: order
                .client_order_id
                .filter(|id| !id.is_empty())
                .map(ClientOrderId::new),
            symbol,
            side: order.side,
            kind: match order.kind.as_str() {
                "LIMIT" | "LIMIT_MAKER" => OrderKind::Limit,
                _ => OrderKind::Market,
            },
            price: order.price.filter(|price| !price.is_zero()),
            quantity: order.quantity,
            filled_quantity: order.filled_quantity.unwrap_or_default(),
            status: match order.state.as_str() {
                "PARTIALLY_FILLED" => OrderStatus::PartiallyFilled,
                "FILLED" => OrderStatus::Filled,
                "CANCELED" | "CANCELLED" | "PENDING_CANCEL" => OrderStatus::Canceled,
                "REJECTED" | "FAILED" => OrderStatus::Rejected,
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
impl ExchangeApi for PoloniexExecution {
    fn id(&self) -> ExchangeId {
        ExchangeId::Poloniex
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            order_kinds: vec![OrderKind::Market, OrderKind::Limit],
            time_in_force: vec![
                TimeInForce::GoodTilCancelled,
                TimeInForce::ImmediateOrCancel,
                TimeInForce::FillOrKill,
            ],
            client_id_lookup: false,
            user_stream: true,
        }
    }

    async fn connect(&self) -> Result<(), ExchangeError> {
        self.client
            .execute(TimestampRequest, &self.public_bucket, &self.cancel)
            .await
            .map(|_: serde_json::Value| ())
    }

    async fn disconnect(&self) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn get_markets(&self) -> Result<Vec<Market>, ExchangeError> {
        let markets: Vec<PoloniexMarket> = self
            .client
            .execute(MarketsRequest, &self.public_bucket, &self.cancel)
            .await?;
        markets
            .into_iter()
            .filter(|market| market.state == "NORMAL")
            .map(|market| {
                let symbol = Self::canonical(&market.symbol)?;
                Ok(Market::new(
                    symbol,
                    AssetName::new(&market.base_currency_name),
                    AssetName::new(&market.quote_currency_name),
                    market.symbol_trade_limit.price_scale,
                    market.symbol_trade_limit.quantity_scale,
                    market.symbol_trade_limit.min_quantity,
                    market.symbol_trade_limit.min_amount,
                ))
            })
            .collect()
    }

    async fn get_ticker(&self, symbol: &Symbol) -> Result<Ticker, ExchangeError> {
        let native = Self::native(symbol);
        let ticker: PoloniexTicker24h = self
            .client
            .execute(
                Ticker24hRequest {
                    path: format!("/markets/{native}/ticker24h"),
                },
                &self.public_bucket,
                &self.cancel,
            )
            .await?;
        // ticker24h has no bid/ask; top of book supplies them.
        let book = self.get_order_book(symbol, 5).await?;
        let best_bid = book.bids.first().map(|level| level.price);
        let best_ask = book.asks.first().map(|level| level.price);
        Ok(Ticker::new(
            best_bid.unwrap_or(ticker.close),
            best_ask.unwrap_or(ticker.close),
            ticker.close,
            ticker.quantity,
            ticker.amount,
        ))
    }

    async fn get_order_book(
        &self,
        symbol: &Symbol,
        depth: usize,
    ) -> Result<OrderBookSnapshot, ExchangeError> {
        let native = Self::native(symbol);
        let book: PoloniexOrderBook = self
            .client
            .execute(
                OrderBookRequest {
                    path: format!("/markets/{native}/orderBook"),
                    query: DepthQuery {
                        limit: depth.min(100) as u32,
                    },
                },
                &self.public_bucket,
                &self.cancel,
            )
            .await?;
        Ok(OrderBookSnapshot::new(
            book.time,
            unflatten_levels(&book.bids)?,
            unflatten_levels(&book.asks)?,
        ))
    }

    async fn get_balances(&self) -> Result<Vec<AssetBalance>, ExchangeError> {
        let accounts: Vec<PoloniexAccount> = self
            .client
            .execute(BalancesRequest, &self.private_bucket, &self.cancel)
            .await?;
        Ok(accounts
            .into_iter()
            .flat_map(|account| account.balances)
            .map(|balance| {
                AssetBalance::new(
                    AssetName::new(&balance.currency),
                    Balance::new(balance.available, balance.hold),
                )
            })
            .collect())
    }

    async fn create_order(&self, request: &OrderRequest) -> Result<Order, ExchangeError> {
        let kind = match request.kind {
            OrderKind::Market => "MARKET",
            OrderKind::Limit => "LIMIT",
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
                symbol: Self::native(&request.symbol),
                side: match request.side {
                    Side::Buy => "BUY",
                    Side::Sell => "SELL",
                },
                kind,
                quantity: request.quantity,
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
                client_order_id: request.client_id.to_string(),
            },
        };

        let ack: PoloniexOrderAck = self
            .client
            .execute(place, &self.order_bucket, &self.cancel)
            .await?;
        let now = Utc::now();
        Ok(Order {
            order_id: OrderId::new(&ack.id),
            client_id: Some(request.client_id.clone()),
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
            path: format!("/orders/{order_id}"),
        };
        match self
            .client
            .execute(request, &self.order_bucket, &self.cancel)
            .await
        {
            Ok(_ack) => match self.get_order(order_id, symbol).await {
                Ok(order) => Ok(Some(order)),
                Err(ExchangeError::InvalidOrder(_)) => Ok(None),
                Err(error) => Err(error),
            },
            Err(ExchangeError::InvalidOrder(message)) if message.contains("not found") => Ok(None),
            Err(error) => Err(error),
        }
    }

    async fn get_open_orders(&self, symbol: Option<&Symbol>) -> Result<Vec<Order>, ExchangeError> {
        let request = OpenOrdersRequest {
            query: OpenOrdersQuery {
                symbol: symbol.map(Self::native),
            },
        };
        let orders: Vec<PoloniexOrder> = self
            .client
            .execute(request, &self.private_bucket, &self.cancel)
            .await?;
        orders.into_iter().map(Self::map_order).collect()
    }

    async fn get_order(&self, order_id: &OrderId, _: &Symbol) -> Result<Order, ExchangeError> {
        let request = GetOrderRequest {
            path: format!("/orders/{order_id}"),
        };
        let order: PoloniexOrder = self
            .client
            .execute(request, &self.private_bucket, &self.cancel)
            .await?;
        Self::map_order(order)
    }
}

pub struct PoloniexSignConfig<'a> {
    api_key: &'a str,
    timestamp: i64,
    method: reqwest::Method,
    path: Cow<'static, str>,
    params_to_sign: String,
}

#[derive(Debug, Clone)]
pub struct PoloniexSigner {
    pub api_key: String,
}

impl Signer for PoloniexSigner {
    type Config<'a>
        = PoloniexSignConfig<'a>
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
        let timestamp = Utc::now().timestamp_millis();

        // GET: sorted query params including signTimestamp.
        // Otherwise: "requestBody={json}&signTimestamp={ts}".
        let params_to_sign = if let Some(body) = request.body() {
            let body = serde_json::to_string(body).map_err(SocketError::Serialise)?;
            format!("requestBody={body}&signTimestamp={timestamp}")
        } else {
            let query = match request.query_params() {
                Some(params) => serde_urlencoded::to_string(params)?,
                None => String::default(),
            };
            let mut params: Vec<&str> = query.split('&').filter(|kv| !kv.is_empty()).collect();
            let sign_timestamp = format!("signTimestamp={timestamp}");
            params.push(&sign_timestamp);
            params.sort_unstable();
            params.join("&")
        };

        Ok(Self::Config {
            api_key: self.api_key.as_str(),
            timestamp,
            method: Request::method(),
            path: request.path(),
            params_to_sign,
        })
    }

    fn add_bytes_to_sign<M>(mac: &mut M, config: &Self::Config<'_>)
    where
        M: Mac,
    {
        // The message being signed is "{METHOD}\n{path}\n{params}"
        mac.update(config.method.as_str().as_bytes());
        mac.update(b"\n");
        mac.update(config.path.as_bytes());
        mac.update(b"\n");
        mac.update(config.params_to_sign.as_bytes());
    }

    fn build_signed_request<'a>(
        config: Self::Config<'a>,
        builder: reqwest::RequestBuilder,
        signature: String,
    ) -> Result<reqwest::Request, SocketError> {
        builder
            .header("key", config.api_key)
            .header("signTimestamp", config.timestamp)
            .header("signatureMethod", "HmacSHA256")
            .header("signature", signature)
            .build()
            .map_err(SocketError::from)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct PoloniexParser;

#[derive(Debug, Deserialize)]
pub struct PoloniexApiError {
    pub code: i64,
    pub message: String,
}

impl HttpParser for PoloniexParser {
    type ApiError = PoloniexApiError;
    type OutputError = ExchangeError;

    fn parse_api_error(&self, status: StatusCode, error: Self::ApiError) -> Self::OutputError {
        match status.as_u16() {
            429 => ExchangeError::RateLimited {
                retry_after_ms: None,
            },
            401 | 403 => ExchangeError::Auth(error.message),
            404 => ExchangeError::InvalidOrder(format!("not found: {}", error.message)),
            status if status >= 500 => ExchangeError::Network(format!("status={status}")),
            _ => ExchangeError::InvalidOrder(format!(
                "code={code} message={message}",
                code = error.code,
                message = error.message
            )),
        }
    }
}

/// Poloniex flattens book levels into `["price","qty","price","qty",...]`.
fn unflatten_levels(flat: &[String]) -> Result<Vec<Level>, ExchangeError> {
    flat.chunks(2)
        .map(|pair| match pair {
            [price, amount] => {
                let price = price.parse::<Decimal>().map_err(|error| {
                    ExchangeError::Internal(format!("bad book price {price}: {error}"))
                })?;
                let amount = amount.parse::<Decimal>().map_err(|error| {
                    ExchangeError::Internal(format!("bad book amount {amount}: {error}"))
                })?;
                Ok(Level::new(price, amount))
            }
            _ => Err(ExchangeError::Internal(
                "odd number of book level elements".to_string(),
            )),
        })
        .collect()
}

struct TimestampRequest;

impl RestRequest for TimestampRequest {
    type Response = serde_json::Value;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/timestamp")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }
}

struct MarketsRequest;

impl RestRequest for MarketsRequest {
    type Response = Vec<PoloniexMarket>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/markets")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }
}

struct Ticker24hRequest {
    path: String,
}

impl RestRequest for Ticker24hRequest {
    type Response = PoloniexTicker24h;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Owned(self.path.clone())
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }
}

#[derive(Debug, Serialize)]
struct DepthQuery {
    limit: u32,
}

struct OrderBookRequest {
    path: String,
    query: DepthQuery,
}

impl RestRequest for OrderBookRequest {
    type Response = PoloniexOrderBook;
    type QueryParams = DepthQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Owned(self.path.clone())
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }
}

struct BalancesRequest;

impl RestRequest for BalancesRequest {
    type Response = Vec<PoloniexAccount>;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/accounts/balances")
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
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(with = "rust_decimal::serde::str")]
    quantity: Decimal,
    #[serde(skip_serializing_if = "Option::is_none", with = "rust_decimal::serde::str_option")]
    price: Option<Decimal>,
    time_in_force: &'static str,
    client_order_id: String,
}

struct PlaceOrderRequest {
    client_id: String,
    body: PlaceOrderBody,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoloniexOrderAck {
    id: String,
}

impl RestRequest for PlaceOrderRequest {
    type Response = PoloniexOrderAck;
    type QueryParams = ();
    type Body = PlaceOrderBody;

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/orders")
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

struct CancelOrderRequest {
    path: String,
}

impl RestRequest for CancelOrderRequest {
    type Response = serde_json::Value;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Owned(self.path.clone())
    }

    fn method() -> reqwest::Method {
        reqwest::Method::DELETE
    }

    fn idempotent() -> bool {
        false
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
    type Response = Vec<PoloniexOrder>;
    type QueryParams = OpenOrdersQuery;
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Borrowed("/orders")
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }

    fn query_params(&self) -> Option<&Self::QueryParams> {
        Some(&self.query)
    }
}

struct GetOrderRequest {
    path: String,
}

impl RestRequest for GetOrderRequest {
    type Response = PoloniexOrder;
    type QueryParams = ();
    type Body = ();

    fn path(&self) -> Cow<'static, str> {
        Cow::Owned(self.path.clone())
    }

    fn method() -> reqwest::Method {
        reqwest::Method::GET
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoloniexMarket {
    symbol: String,
    base_currency_name: String,
    quote_currency_name: String,
    state: String,
    symbol_trade_limit: PoloniexTradeLimit,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoloniexTradeLimit {
    price_scale: u32,
    quantity_scale: u32,
    #[serde(with = "rust_decimal::serde::str")]
    min_quantity: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    min_amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct PoloniexTicker24h {
    #[serde(with = "rust_decimal::serde::str")]
    close: Decimal,
    /// 24h volume in base units.
    #[serde(with = "rust_decimal::serde::str")]
    quantity: Decimal,
    /// 24h volume in quote units.
    #[serde(with = "rust_decimal::serde::str")]
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct PoloniexOrderBook {
    time: u64,
    #[serde(default)]
    bids: Vec<String>,
    #[serde(default)]
    asks: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PoloniexAccount {
    balances: Vec<PoloniexAccountBalance>,
}

#[derive(Debug, Deserialize)]
struct PoloniexAccountBalance {
    currency: String,
    #[serde(with = "rust_decimal::serde::str")]
    available: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    hold: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoloniexOrder {
    id: String,
    #[serde(default)]
    client_order_id: Option<String>,
    symbol: String,
    side: Side,
    #[serde(rename = "type")]
    kind: String,
    state: String,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    price: Option<Decimal>,
    #[serde(with = "rust_decimal::serde::str")]
    quantity: Decimal,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    filled_quantity: Option<Decimal>,
    #[serde(default)]
    time_in_force: Option<String>,
    #[serde(default)]
    create_time: Option<i64>,
    #[serde(default)]
    update_time: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_unflatten_levels() {
        let flat = vec![
            "42000.1".to_string(),
            "1.5".to_string(),
            "42000.0".to_string(),
            "2".to_string(),
        ];
        let levels = unflatten_levels(&flat).unwrap();
        assert_eq!(levels.len(), 2);
        assert_eq!(levels[0], Level::new(dec!(42000.1), dec!(1.5)));

        let odd = vec!["42000.1".to_string()];
        assert!(unflatten_levels(&odd).is_err());
    }

    #[test]
    fn test_get_signature_params_sorted() {
        let signer = PoloniexSigner {
            api_key: "key".to_string(),
        };
        let request = OpenOrdersRequest {
            query: OpenOrdersQuery {
                symbol: Some("BTC_USDT".to_string()),
            },
        };
        let builder = reqwest::Client::new().get("https://api.poloniex.com/orders");
        let config = signer.config(&request, &builder).unwrap();
        // signTimestamp sorts after symbol=... alphabetically? "signTimestamp" < "symbol".
        assert!(config.params_to_sign.starts_with("signTimestamp="));
        assert!(config.params_to_sign.ends_with("symbol=BTC_USDT"));
    }

    #[test]
    fn test_order_mapping() {
        let payload = r#"{
            "id":"ord-11","clientOrderId":"cid-11","symbol":"BTC_USDT","side":"BUY",
            "type":"LIMIT","state":"PARTIALLY_FILLED","price":"42000.5","quantity":"1",
            "filledQuantity":"0.6","timeInForce":"GTC",
            "createTime":1700000000000,"updateTime":1700000001000
        }"#;
        let order: PoloniexOrder = serde_json::from_str(payload).unwrap();
        let order = PoloniexExecution::map_order(order).unwrap();
        assert_eq!(order.symbol, "BTC/USDT".parse().unwrap());
        assert_eq!(order.filled_quantity, dec!(0.6));
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
    }
}
