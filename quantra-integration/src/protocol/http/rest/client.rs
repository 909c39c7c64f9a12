use crate::{
    error::{ExchangeError, SocketError},
    protocol::http::{BuildStrategy, HttpParser, rest::RestRequest},
    rate_limit::RateLimiter,
};
use bytes::Bytes;
use std::{borrow::Cow, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Retry behaviour for errors the [`RestClient`] judges retryable.
pub trait RetryableError {
    /// Whether a retry within the client's budget is worthwhile.
    fn is_transient(&self) -> bool;

    /// Venue-signalled pause before the next attempt, if any.
    fn retry_after(&self) -> Option<Duration>;

    /// Construct the error representing a request whose outcome is unknown.
    fn uncertain_placement(client_id: String) -> Self;
}

impl RetryableError for ExchangeError {
    fn is_transient(&self) -> bool {
        ExchangeError::is_transient(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        ExchangeError::retry_after(self)
    }

    fn uncertain_placement(client_id: String) -> Self {
        ExchangeError::UncertainPlacement { client_id }
    }
}

/// Exponential backoff budget applied to transient request failures.
#[derive(Debug, Copy, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_initial: Duration,
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_initial: Duration::from_secs(1),
            backoff_multiplier: 2,
        }
    }
}

/// Configurable REST client capable of executing signed [`RestRequest`]s. Use this when
/// integrating APIs that require Http in order to interact with resources. Each API will require
/// a specific combination of [`Signer`](super::super::private::Signer), [`Mac`](hmac::Mac),
/// signature [`Encoder`](super::super::private::encoder::Encoder), and [`HttpParser`].
///
/// The client acquires its endpoint-class rate bucket before every attempt, retries transient
/// failures with exponential backoff, and refuses to re-send non-idempotent requests whose
/// previous outcome is unknown.
#[derive(Debug)]
pub struct RestClient<'a, Strategy, Parser> {
    /// HTTP [`reqwest::Client`] for executing signed [`reqwest::Request`]s.
    pub http_client: reqwest::Client,

    /// Base Url of the API being interacted with.
    pub base_url: Cow<'a, str>,

    /// [`RestRequest`] build strategy for the API being interacted with that implements
    /// [`BuildStrategy`].
    pub strategy: Strategy,

    /// [`HttpParser`] that deserialises [`RestRequest::Response`]s, and upon failure parses
    /// API errors returned from the server.
    pub parser: Parser,

    /// Retry/backoff budget for transient failures.
    pub retry: RetryPolicy,
}

impl<Strategy, Parser> RestClient<'_, Strategy, Parser>
where
    Strategy: BuildStrategy,
    Parser: HttpParser,
    Parser::OutputError: RetryableError,
{
    /// Execute the provided [`RestRequest`], retrying transient failures within the
    /// [`RetryPolicy`] budget.
    ///
    /// Non-idempotent requests (order placement, cancel) are never re-sent after a timeout:
    /// the venue may already have acted, so the caller receives an uncertain-placement error
    /// to reconcile via order lookup.
    pub async fn execute<Request>(
        &self,
        request: Request,
        bucket: &RateLimiter,
        cancel: &CancellationToken,
    ) -> Result<Request::Response, Parser::OutputError>
    where
        Request: RestRequest,
    {
        let mut backoff = self.retry.backoff_initial;
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            bucket.acquire(Request::tokens(), cancel).await;

            let built = self.build(&request)?;
            let mut header_retry_after = None;

            let error = match self.measured_execution::<Request>(built).await {
                Ok((status, retry_after, payload)) => {
                    match self.parser.parse::<Request::Response>(status, &payload) {
                        Ok(response) => return Ok(response),
                        Err(error) => {
                            header_retry_after = retry_after;
                            error
                        }
                    }
                }
                Err(error @ SocketError::HttpTimeout(_)) if !Request::idempotent() => {
                    warn!(
                        path = %request.path(),
                        %error,
                        "non-idempotent request timed out - outcome unknown"
                    );
                    let client_id = request.client_id().unwrap_or_default().to_string();
                    return Err(Parser::OutputError::uncertain_placement(client_id));
                }
                Err(socket_error) => Parser::OutputError::from(socket_error),
            };

            if !error.is_transient() || attempt > self.retry.max_retries {
                return Err(error);
            }

            let sleep = error
                .retry_after()
                .or(header_retry_after)
                .unwrap_or(backoff);
            warn!(
                path = %request.path(),
                attempt,
                sleep_ms = sleep.as_millis() as u64,
                "transient request failure - backing off before retry"
            );
            tokio::select! {
                _ = tokio::time::sleep(sleep) => {}
                _ = cancel.cancelled() => return Err(error),
            }
            backoff *= self.retry.backoff_multiplier;
        }
    }

    /// Use the provided [`RestRequest`] to construct a signed Http [`reqwest::Request`].
    pub fn build<Request>(&self, request: &Request) -> Result<reqwest::Request, SocketError>
    where
        Request: RestRequest,
    {
        // Construct url
        let url = format!("{}{}", self.base_url, request.path());

        // Construct RequestBuilder with method & url
        let mut builder = self
            .http_client
            .request(Request::method(), url)
            .timeout(Request::timeout());

        // Add optional query parameters
        if let Some(query_params) = request.query_params() {
            builder = builder.query(query_params);
        }

        // Add optional Body
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        // Use RequestBuilder (public or private strategy) to build reqwest::Request
        self.strategy.build(request, builder)
    }

    /// Execute the built [`reqwest::Request`] using the [`reqwest::Client`].
    ///
    /// Surfaces the response status, any `Retry-After` header, and the payload bytes.
    pub async fn measured_execution<Request>(
        &self,
        request: reqwest::Request,
    ) -> Result<(reqwest::StatusCode, Option<Duration>, Bytes), SocketError>
    where
        Request: RestRequest,
    {
        let start = std::time::Instant::now();
        let response = self.http_client.execute(request).await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .map(Duration::from_secs);

        debug!(
            method = %Request::method(),
            base_url = %self.base_url,
            ?status,
            duration_ms,
            "http request round trip"
        );

        let payload = response.bytes().await?;
        Ok((status, retry_after, payload))
    }
}

impl<'a, Strategy, Parser> RestClient<'a, Strategy, Parser> {
    /// Construct a new [`Self`] using the provided configuration.
    pub fn new<Url: Into<Cow<'a, str>>>(base_url: Url, strategy: Strategy, parser: Parser) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into(),
            strategy,
            parser,
            retry: RetryPolicy::default(),
        }
    }
}
