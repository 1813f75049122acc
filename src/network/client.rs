//! HTTP client forwarding requests to the upstream API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue as ReqwestHeaderValue};
use reqwest::{Client, Method};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{UpstreamFetcher, CONNECT_TIMEOUT_MS};
use crate::fingerprint::ProxyRequest;
use crate::response::{CachedResponse, HeaderValue, Headers};
use crate::{MirraError, Result};

/// Status used when the upstream gave none
pub const FALLBACK_ERROR_STATUS: u16 = 500;

/// Request headers not copied to the upstream request
const SKIPPED_REQUEST_HEADERS: [&str; 5] = [
    "host",
    "content-length",
    "connection",
    "transfer-encoding",
    "accept-encoding",
];

/// Response headers not recorded, since the body is re-serialized on replay
const SKIPPED_RESPONSE_HEADERS: [&str; 4] = [
    "content-length",
    "content-encoding",
    "transfer-encoding",
    "connection",
];

/// Upstream fetcher backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Create a new fetcher
    ///
    /// # Errors
    ///
    /// Returns error if the TLS backend cannot be initialised
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_millis(CONNECT_TIMEOUT_MS))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| MirraError::Other(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    async fn try_fetch(
        &self,
        request: &ProxyRequest,
        host: &str,
        port: u16,
    ) -> std::result::Result<CachedResponse, FetchFailure> {
        let url = build_url(host, port, &request.url);
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| FetchFailure::new(None, format!("Invalid HTTP method: {e}")))?;

        debug!("Forwarding {} to {}", request.method, url);

        let mut builder = self
            .client
            .request(method, &url)
            .headers(upstream_headers(&request.headers, host, port));
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FetchFailure::new(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = response.status().as_u16();
        let headers = recorded_headers(response.headers());
        let text = response
            .text()
            .await
            .map_err(|e| FetchFailure::new(Some(status), format!("Failed to read body: {e}")))?;
        let body = parse_body(text);

        if !(200..300).contains(&status) {
            return Err(FetchFailure {
                status: Some(status),
                message: format!("Request failed with status code {status}"),
                body: Some(body),
            });
        }

        Ok(CachedResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl UpstreamFetcher for HttpFetcher {
    async fn fetch(&self, request: &ProxyRequest, host: &str, port: u16) -> CachedResponse {
        match self.try_fetch(request, host, port).await {
            Ok(response) => response,
            Err(failure) => {
                warn!("Upstream error for {}: {}", request.id, failure.message);
                failure.into_response(host)
            }
        }
    }
}

/// Why the upstream produced no usable response
#[derive(Debug)]
struct FetchFailure {
    status: Option<u16>,
    message: String,
    body: Option<Value>,
}

impl FetchFailure {
    fn new(status: Option<u16>, message: String) -> Self {
        Self {
            status,
            message,
            body: None,
        }
    }

    fn into_response(self, host: &str) -> CachedResponse {
        let status = self.status.unwrap_or(FALLBACK_ERROR_STATUS);
        let mut detail = json!({
            "message": self.message,
            "status": status,
        });
        if let Some(body) = self.body {
            detail["response"] = body;
        }

        CachedResponse::new(
            status,
            json!({
                "errors": [
                    { "message": format!("[mirra] No successful response from {host}") },
                    detail,
                ]
            }),
        )
    }
}

/// Upstream URL; port 443 selects https
fn build_url(host: &str, port: u16, path: &str) -> String {
    match port {
        443 => format!("https://{host}{path}"),
        80 => format!("http://{host}{path}"),
        _ => format!("http://{host}:{port}{path}"),
    }
}

fn upstream_headers(headers: &[(String, String)], host: &str, port: u16) -> HeaderMap {
    let mut map = HeaderMap::new();

    for (name, value) in headers {
        if SKIPPED_REQUEST_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        match (
            HeaderName::from_bytes(name.as_bytes()),
            ReqwestHeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                map.append(name, value);
            }
            _ => debug!("Dropping unforwardable header {}", name),
        }
    }

    // host and port are needed for the TLS handshake on some upstreams
    if let Ok(value) = ReqwestHeaderValue::from_str(host) {
        map.insert(reqwest::header::HOST, value);
    }
    map.insert("port", ReqwestHeaderValue::from(port));

    // accept-encoding is left to the client, which only negotiates gzip
    map
}

fn recorded_headers(headers: &HeaderMap) -> Headers {
    let mut recorded = Headers::new();

    for name in headers.keys() {
        if SKIPPED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        let mut values: Vec<String> = headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect();

        let value = match values.len() {
            0 => continue,
            1 => HeaderValue::Single(values.remove(0)),
            _ => HeaderValue::Multi(values),
        };
        recorded.insert(name.as_str().to_string(), value);
    }

    recorded
}

/// JSON body, or the raw text as a JSON string
fn parse_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}
