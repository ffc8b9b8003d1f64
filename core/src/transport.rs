//! HTTP transport for the PCE API.
//!
//! # Design
//! `Transport::execute` is the single entry point every API wrapper goes
//! through: it validates the action, attaches basic auth and the JSON
//! content type, dispatches the request, optionally drives the async job
//! protocol (see `polling`), and turns a non-2xx final status into
//! `ApiError::HttpStatus` while keeping the response.
//!
//! The network round-trip sits behind the `Exchange` trait. `UreqExchange`
//! is the production implementation; tests swap in a scripted one.

use tracing::{debug, warn};
use ureq::tls::TlsConfig;

use crate::config::TransportConfig;
use crate::endpoint::PceEndpoint;
use crate::error::{ApiError, ApiResult};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

/// Cap on a single response body; traffic query results can be large.
const MAX_BODY_BYTES: u64 = 512 * 1024 * 1024;

/// Certificate verification mode for one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsPolicy {
    Verify,
    SkipVerification,
}

impl TlsPolicy {
    pub fn for_endpoint(endpoint: &PceEndpoint) -> Self {
        if endpoint.disable_tls_checking {
            TlsPolicy::SkipVerification
        } else {
            TlsPolicy::Verify
        }
    }
}

/// Performs one HTTP round-trip.
///
/// Implementations must return non-2xx responses as data, not as errors;
/// status interpretation belongs to `Transport`.
pub trait Exchange {
    fn send(&self, request: HttpRequest, tls: TlsPolicy) -> ApiResult<HttpResponse>;
}

/// Blocking `ureq` exchange with one agent per TLS policy.
pub struct UreqExchange {
    strict: ureq::Agent,
    permissive: ureq::Agent,
}

impl UreqExchange {
    pub fn new() -> Self {
        Self {
            strict: build_agent(false),
            permissive: build_agent(true),
        }
    }

    fn agent(&self, tls: TlsPolicy) -> &ureq::Agent {
        match tls {
            TlsPolicy::Verify => &self.strict,
            TlsPolicy::SkipVerification => &self.permissive,
        }
    }
}

impl Default for UreqExchange {
    fn default() -> Self {
        Self::new()
    }
}

fn build_agent(skip_verification: bool) -> ureq::Agent {
    ureq::Agent::config_builder()
        .http_status_as_error(false)
        .tls_config(
            TlsConfig::builder()
                .disable_verification(skip_verification)
                .build(),
        )
        .build()
        .new_agent()
}

fn with_headers<B>(
    mut builder: ureq::RequestBuilder<B>,
    headers: &[(String, String)],
) -> ureq::RequestBuilder<B> {
    for (name, value) in headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    builder
}

impl Exchange for UreqExchange {
    fn send(&self, request: HttpRequest, tls: TlsPolicy) -> ApiResult<HttpResponse> {
        let agent = self.agent(tls);
        let url = request.url.as_str();
        let headers = request.headers.as_slice();

        let mut response = match (request.method, request.body.as_deref()) {
            (HttpMethod::Get, None) => with_headers(agent.get(url), headers).call(),
            (HttpMethod::Get, Some(body)) => with_headers(agent.get(url), headers)
                .force_send_body()
                .send(body),
            (HttpMethod::Delete, None) => with_headers(agent.delete(url), headers).call(),
            (HttpMethod::Delete, Some(body)) => with_headers(agent.delete(url), headers)
                .force_send_body()
                .send(body),
            (HttpMethod::Post, Some(body)) => with_headers(agent.post(url), headers).send(body),
            (HttpMethod::Post, None) => with_headers(agent.post(url), headers).send_empty(),
            (HttpMethod::Put, Some(body)) => with_headers(agent.put(url), headers).send(body),
            (HttpMethod::Put, None) => with_headers(agent.put(url), headers).send_empty(),
        }?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        // Non-UTF-8 bodies are still a valid exchange; decode lossily.
        let raw = response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()?;
        let body = String::from_utf8_lossy(&raw).into_owned();

        Ok(HttpResponse {
            status,
            headers,
            body,
            request,
        })
    }
}

/// Issues PCE API calls, including the async job protocol.
pub struct Transport<E = UreqExchange> {
    pub(crate) exchange: E,
    pub(crate) config: TransportConfig,
}

impl Transport<UreqExchange> {
    pub fn new() -> Self {
        Self::with_config(TransportConfig::default())
    }

    pub fn with_config(config: TransportConfig) -> Self {
        Self::with_exchange(UreqExchange::new(), config)
    }
}

impl Default for Transport<UreqExchange> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Exchange> Transport<E> {
    pub fn with_exchange(exchange: E, config: TransportConfig) -> Self {
        Self { exchange, config }
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    pub fn exchange(&self) -> &E {
        &self.exchange
    }

    /// Issue `method url` against `endpoint`.
    ///
    /// With `respond_async` set, the request carries `Prefer: respond-async`
    /// and the returned response is the job's result fetch, not the
    /// submission acknowledgment. A final status not starting with 2 yields
    /// `ApiError::HttpStatus`, which still owns the response.
    pub fn execute(
        &self,
        method: &str,
        url: &str,
        endpoint: &PceEndpoint,
        body: Option<&[u8]>,
        respond_async: bool,
    ) -> ApiResult<HttpResponse> {
        let method: HttpMethod = method.parse()?;
        let tls = TlsPolicy::for_endpoint(endpoint);
        let request = self.prepare(method, url, endpoint, body, respond_async);

        debug!(%method, url, respond_async, ?tls, "dispatching PCE request");
        let response = self.exchange.send(request, tls)?;

        let response = if respond_async {
            self.run_job(response, endpoint, tls)?
        } else {
            response
        };
        check_status(response)
    }

    pub(crate) fn prepare(
        &self,
        method: HttpMethod,
        url: &str,
        endpoint: &PceEndpoint,
        body: Option<&[u8]>,
        respond_async: bool,
    ) -> HttpRequest {
        let mut headers = vec![
            ("Authorization".to_string(), endpoint.basic_auth()),
            ("Content-Type".to_string(), "application/json".to_string()),
            ("User-Agent".to_string(), self.config.user_agent.clone()),
        ];
        if respond_async {
            headers.push(("Prefer".to_string(), "respond-async".to_string()));
        }
        HttpRequest {
            method,
            url: url.to_string(),
            headers,
            body: body.map(<[u8]>::to_vec),
        }
    }
}

/// One-shot call using a default `Transport`.
pub fn execute(
    method: &str,
    url: &str,
    endpoint: &PceEndpoint,
    body: Option<&[u8]>,
    respond_async: bool,
) -> ApiResult<HttpResponse> {
    Transport::new().execute(method, url, endpoint, body, respond_async)
}

pub(crate) fn status_error(response: HttpResponse) -> ApiError {
    warn!(
        status = response.status,
        url = %response.request.url,
        "PCE returned non-success status"
    );
    ApiError::HttpStatus {
        status: response.status,
        response: Box::new(response),
    }
}

fn check_status(response: HttpResponse) -> ApiResult<HttpResponse> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(status_error(response))
    }
}
