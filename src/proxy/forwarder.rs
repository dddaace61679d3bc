//! Upstream request forwarding
//!
//! This module rewrites an inbound request for the Wallet Provider, sends it
//! and turns the answer into a response for the original caller.
//!
//! The pure steps ([`upstream_url`], [`prepare`], [`relay_response`]) are kept
//! separate from the network call so they can be checked without an upstream.

use std::time::Instant;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use thiserror::Error;
use url::Url;

use crate::config::UpstreamConfig;
use crate::http::headers::{Headers, decode_latin1, encode_latin1};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, ResponseBuilder, StatusCode};

/// Header carrying the authenticated user's identifier.
pub const USER_ID_HEADER: &str = "x-iowallet-user-id";

/// Header carrying the application key.
pub const APP_KEY_HEADER: &str = "x-functions-key";

/// Upstream response headers that are never relayed. The serving layer
/// frames a fresh response, so stale framing values must not leak through
/// (RFC 2616 §13.5.1).
pub const EXCLUDED_RESPONSE_HEADERS: [&str; 4] = [
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
];

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),

    #[error("upstream timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    #[error("upstream unreachable: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("malformed upstream response: {0}")]
    Protocol(String),

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl ForwardError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ForwardError::Timeout(err)
        } else if err.is_builder() {
            ForwardError::InvalidRequest(err.to_string())
        } else {
            ForwardError::Transport(err)
        }
    }

    /// Status returned to the caller when relaying fails.
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ForwardError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::Transport(_) | ForwardError::Protocol(_) => StatusCode::BAD_GATEWAY,
            ForwardError::Client(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Plain-text response describing the failure to the caller.
    pub fn to_response(&self) -> Response {
        match self.status() {
            StatusCode::GATEWAY_TIMEOUT => Response::gateway_timeout(),
            StatusCode::BAD_GATEWAY => Response::bad_gateway(),
            StatusCode::BAD_REQUEST => Response::bad_request(&self.to_string()),
            status => Response::error(status, "The relay could not process the request."),
        }
    }
}

/// The request sent to the upstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// What the upstream answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: Headers,
    pub body: Vec<u8>,
}

/// Joins the request target's path and query onto `base`.
///
/// Origin-form targets (`/a?b`) are appended as they are. Absolute-form
/// targets (`http://host/a?b`) lose their scheme and authority first. A path
/// prefix on `base` is kept.
pub fn upstream_url(base: &Url, target: &str) -> Result<Url, ForwardError> {
    let path_and_query = if target.starts_with('/') {
        target
    } else if let Some((_, rest)) = target.split_once("://") {
        match rest.find(['/', '?']) {
            Some(idx) => &rest[idx..],
            None => "",
        }
    } else if target == "*" {
        ""
    } else {
        return Err(ForwardError::InvalidRequest(format!(
            "unsupported request target `{target}`"
        )));
    };

    let base = base.as_str().trim_end_matches('/');
    let joined = if path_and_query.starts_with('?') {
        format!("{base}/{path_and_query}")
    } else {
        format!("{base}{path_and_query}")
    };

    Url::parse(&joined).map_err(|e| ForwardError::InvalidRequest(format!("{joined}: {e}")))
}

/// Builds the outbound request: every inbound header except `Host` is
/// appended in order, then the identity headers are set over any inbound
/// value. The body is copied untouched.
pub fn prepare(request: &Request, upstream: &UpstreamConfig) -> Result<OutboundRequest, ForwardError> {
    let url = upstream_url(&upstream.base_url, &request.path)?;

    let mut headers = Headers::new();
    for (name, value) in &request.headers {
        if !name.eq_ignore_ascii_case("host") {
            headers.append(name, value);
        }
    }

    headers.set(USER_ID_HEADER, upstream.user_id.as_str());
    if let Some(app_key) = &upstream.app_key {
        headers.set(APP_KEY_HEADER, app_key.as_str());
    }

    Ok(OutboundRequest {
        method: request.method,
        url,
        headers,
        body: request.body.clone(),
    })
}

/// Turns the upstream answer into the caller's response: status and body
/// verbatim, headers minus [`EXCLUDED_RESPONSE_HEADERS`]. `method` is the
/// inbound method; a HEAD answer gets no Content-Length of its own.
pub fn relay_response(upstream: UpstreamResponse, method: Method) -> Response {
    let mut headers = upstream.headers;
    headers.retain(|name, _| {
        !EXCLUDED_RESPONSE_HEADERS
            .iter()
            .any(|excluded| name.eq_ignore_ascii_case(excluded))
    });

    let builder = ResponseBuilder::new(upstream.status)
        .headers(headers)
        .body(upstream.body);
    if method == Method::HEAD {
        builder.for_head().build()
    } else {
        builder.build()
    }
}

/// Relays requests to the configured upstream.
///
/// Holds only read-only state, so one instance is shared by every
/// connection.
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: reqwest::Client,
    upstream: UpstreamConfig,
}

impl Forwarder {
    /// Creates a forwarder whose client never follows redirects and keeps
    /// no idle connections.
    pub fn new(upstream: UpstreamConfig) -> Result<Self, ForwardError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .pool_max_idle_per_host(0)
            .build()
            .map_err(ForwardError::Client)?;

        Ok(Self { client, upstream })
    }

    pub fn upstream(&self) -> &UpstreamConfig {
        &self.upstream
    }

    /// Forwards one request and returns the relayed response.
    ///
    /// Exactly one upstream attempt is made.
    pub async fn relay(&self, request: &Request) -> Result<Response, ForwardError> {
        let started = Instant::now();
        let outbound = prepare(request, &self.upstream)?;

        tracing::debug!(
            method = %request.method,
            target = %request.path,
            upstream = %outbound.url,
            "Forwarding request to upstream"
        );

        match self.send(outbound).await {
            Ok(upstream) => {
                tracing::info!(
                    method = %request.method,
                    target = %request.path,
                    status = upstream.status.as_u16(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Request relayed"
                );
                Ok(relay_response(upstream, request.method))
            }
            Err(e) => {
                tracing::warn!(
                    method = %request.method,
                    target = %request.path,
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Failed to relay request"
                );
                Err(e)
            }
        }
    }

    /// Relays a request, turning failures into 4xx/5xx responses.
    pub async fn relay_or_error(&self, request: &Request) -> Response {
        match self.relay(request).await {
            Ok(response) => response,
            Err(e) => e.to_response(),
        }
    }

    async fn send(&self, outbound: OutboundRequest) -> Result<UpstreamResponse, ForwardError> {
        let headers = to_header_map(&outbound.headers)?;

        let mut builder = self
            .client
            .request(to_reqwest_method(outbound.method), outbound.url)
            .headers(headers);
        if !outbound.body.is_empty() {
            builder = builder.body(outbound.body);
        }

        let mut response = builder.send().await.map_err(ForwardError::from_reqwest)?;

        let status = StatusCode::from_u16(response.status().as_u16()).ok_or_else(|| {
            ForwardError::Protocol(format!("status {}", response.status().as_u16()))
        })?;

        let headers: Headers = response
            .headers()
            .iter()
            .map(|(name, value)| (name.as_str().to_string(), decode_latin1(value.as_bytes())))
            .collect();

        let mut body = Vec::new();
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => body.extend_from_slice(&chunk),
                Ok(None) => break,
                Err(e) if body.is_empty() => {
                    return Err(if e.is_timeout() {
                        ForwardError::Timeout(e)
                    } else {
                        ForwardError::Protocol(format!("unreadable body: {e}"))
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        received = body.len(),
                        "Upstream body ended early, relaying what arrived"
                    );
                    break;
                }
            }
        }

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::GET => reqwest::Method::GET,
        Method::POST => reqwest::Method::POST,
        Method::PUT => reqwest::Method::PUT,
        Method::DELETE => reqwest::Method::DELETE,
        Method::HEAD => reqwest::Method::HEAD,
        Method::OPTIONS => reqwest::Method::OPTIONS,
        Method::PATCH => reqwest::Method::PATCH,
    }
}

fn to_header_map(headers: &Headers) -> Result<HeaderMap, ForwardError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| ForwardError::InvalidRequest(format!("header name `{name}`")))?;
        let value = encode_latin1(value)
            .and_then(|bytes| HeaderValue::from_bytes(&bytes).ok())
            .ok_or_else(|| ForwardError::InvalidRequest(format!("value of header `{name}`")))?;
        map.append(name, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_header_map_keeps_duplicates() {
        let headers: Headers = [("Cookie", "a=1"), ("Cookie", "b=2")].into_iter().collect();

        let map = to_header_map(&headers).unwrap();

        let values: Vec<_> = map.get_all("cookie").iter().collect();
        assert_eq!(values, vec!["a=1", "b=2"]);
    }

    #[test]
    fn to_header_map_rejects_control_characters() {
        let headers: Headers = [("X-Bad", "line\nbreak")].into_iter().collect();

        assert!(matches!(
            to_header_map(&headers),
            Err(ForwardError::InvalidRequest(_))
        ));
    }

    #[test]
    fn to_header_map_sends_latin1_bytes() {
        let headers: Headers = [("X-Note", "caf\u{e9}")].into_iter().collect();

        let map = to_header_map(&headers).unwrap();

        assert_eq!(map["x-note"].as_bytes(), b"caf\xe9");
    }
}
