//! Transparent request forwarding to the backend
//!
//! Replays an inbound request against the configured backend, preserving
//! method and body, rewriting the connection-management headers, and
//! streaming the response back without buffering.

use futures::TryStreamExt;
use http_body_util::{BodyDataStream, BodyExt, StreamBody};
use hyper::body::{Body, Frame, Incoming};
use hyper::header::{HeaderValue, HOST};
use hyper::{Request, Response};
use std::io;
use std::net::SocketAddr;
use tracing::debug;

use crate::config::Config;
use crate::error::{GatewayErrorCode, ResponseBody};

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";
const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Inbound headers never replayed to the backend. Host is rewritten to the
/// backend authority; the framing headers are re-derived by the client for
/// the streamed body.
const SKIPPED_REQUEST_HEADERS: &[&str] = &[
    "host",
    "connection",
    "keep-alive",
    "content-length",
    "transfer-encoding",
];

/// Backend headers never relayed to the client. Framing is re-derived for the
/// streamed body; Server and Date belong to the gateway's own hop.
const SKIPPED_RESPONSE_HEADERS: &[&str] = &[
    "content-encoding",
    "content-length",
    "transfer-encoding",
    "connection",
    "server",
    "date",
];

/// Typed failure for the forwarding path, translated by the dispatcher into
/// the corresponding gateway error response.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("connection error while forwarding to the backend: {0}")]
    Connect(#[source] reqwest::Error),
    #[error("timeout while forwarding to the backend: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("transport error while forwarding to the backend: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("failed to build the upstream request: {0}")]
    Request(String),
}

impl UpstreamError {
    pub fn code(&self) -> GatewayErrorCode {
        match self {
            UpstreamError::Connect(_) => GatewayErrorCode::UpstreamConnectFailed,
            UpstreamError::Timeout(_) => GatewayErrorCode::UpstreamTimeout,
            UpstreamError::Transport(_) => GatewayErrorCode::UpstreamError,
            UpstreamError::Request(_) => GatewayErrorCode::InternalError,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout(err)
        } else if err.is_connect() {
            UpstreamError::Connect(err)
        } else {
            UpstreamError::Transport(err)
        }
    }
}

/// HTTP client for the single configured backend. Connections are pooled by
/// the underlying client; the target never changes at runtime.
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: String,
    authority: String,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .redirect(reqwest::redirect::Policy::none())
            // Certificate verification only means anything for https targets.
            .danger_accept_invalid_certs(
                config.target.scheme.is_secure() && !config.gateway.verify_tls,
            )
            .build()?;

        Ok(Self {
            client,
            base_url: config.target_base_url(),
            authority: config.target_authority(),
        })
    }

    /// Replay `req` against the backend. The inbound body is streamed to the
    /// backend and the backend's body is streamed back; neither is buffered.
    pub async fn forward(
        &self,
        req: Request<Incoming>,
        client_addr: SocketAddr,
        request_id: &str,
    ) -> Result<Response<ResponseBody>, UpstreamError> {
        let (parts, body) = req.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.base_url, path_and_query);

        let mut headers = hyper::HeaderMap::new();
        for (name, value) in parts.headers.iter() {
            if SKIPPED_REQUEST_HEADERS.contains(&name.as_str()) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }

        headers.insert(
            HOST,
            HeaderValue::from_str(&self.authority)
                .map_err(|e| UpstreamError::Request(e.to_string()))?,
        );

        // The client may already sit behind another proxy; keep its
        // X-Forwarded-For when present, otherwise record the socket address.
        let forwarded_for = parts
            .headers
            .get(X_FORWARDED_FOR)
            .cloned()
            .or_else(|| HeaderValue::from_str(&client_addr.ip().to_string()).ok());
        if let Some(value) = forwarded_for {
            headers.insert(X_FORWARDED_FOR, value);
        }
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
        if let Some(original_host) = parts.headers.get(HOST) {
            headers.insert(X_FORWARDED_HOST, original_host.clone());
        }

        debug!(request_id, method = %parts.method, url = %url, "Forwarding request to backend");

        // Only attach a streamed body when the inbound request carries one;
        // an unconditional chunked body would confuse backends on GET/HEAD.
        // The body stream itself decides: an HTTP/2 request can carry DATA
        // frames without any framing header.
        let has_body = !body.is_end_stream();

        let mut request_builder = self.client.request(parts.method, &url).headers(headers);
        if has_body {
            request_builder =
                request_builder.body(reqwest::Body::wrap_stream(BodyDataStream::new(body)));
        }

        let upstream_response = request_builder.send().await?;

        let status = upstream_response.status();
        debug!(request_id, status = %status, "Backend responded");

        let mut builder = Response::builder().status(status);
        if let Some(response_headers) = builder.headers_mut() {
            for (name, value) in upstream_response.headers() {
                if SKIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
                    continue;
                }
                response_headers.append(name.clone(), value.clone());
            }
        }

        let body_stream = upstream_response
            .bytes_stream()
            .map_ok(Frame::data)
            .map_err(io::Error::other);

        builder
            .body(StreamBody::new(body_stream).boxed_unsync())
            .map_err(|e| UpstreamError::Request(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_lists_are_lowercase() {
        // HeaderName::as_str is always lowercase, so the lists must be too.
        for name in SKIPPED_REQUEST_HEADERS.iter().chain(SKIPPED_RESPONSE_HEADERS) {
            assert_eq!(*name, name.to_lowercase());
        }
    }

    #[test]
    fn test_error_codes() {
        let err = UpstreamError::Request("bad header".to_string());
        assert!(matches!(err.code(), GatewayErrorCode::InternalError));
    }

    #[tokio::test]
    async fn test_client_construction() {
        let toml = r#"
[target]
host = "10.0.0.5"
port = 5000
scheme = "https"
mac = "aa:bb:cc:dd:ee:ff"

[gateway]
verify_tls = false
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let client = UpstreamClient::new(&config).unwrap();
        assert_eq!(client.base_url, "https://10.0.0.5:5000");
        assert_eq!(client.authority, "10.0.0.5:5000");
    }

    #[tokio::test]
    async fn test_client_construction_plain_http() {
        // verify_tls has no effect on an http target; construction still works.
        let toml = r#"
[target]
host = "10.0.0.5"
port = 5000
mac = "aa:bb:cc:dd:ee:ff"

[gateway]
verify_tls = false
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let client = UpstreamClient::new(&config).unwrap();
        assert_eq!(client.base_url, "http://10.0.0.5:5000");
    }
}
