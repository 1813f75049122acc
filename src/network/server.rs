//! Inbound HTTP server handing requests to the resolution engine

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_LENGTH, CONTENT_TYPE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use super::SHUTDOWN_TIMEOUT_MS;
use crate::fingerprint::ProxyRequest;
use crate::proxy::ResolutionEngine;
use crate::response::CachedResponse;
use crate::{MirraError, Result};

/// Headers always set by the server itself
const SERVER_HEADERS: [&str; 3] = ["content-type", "content-length", "access-control-allow-origin"];

/// HTTP/1 server in front of a [`ResolutionEngine`]
pub struct ProxyServer {
    listener: TcpListener,
    engine: Arc<ResolutionEngine>,
    shutdown_tx: broadcast::Sender<()>,
}

impl ProxyServer {
    /// Bind the listening socket
    ///
    /// # Errors
    ///
    /// Returns error if the address cannot be bound
    pub async fn bind(addr: SocketAddr, engine: Arc<ResolutionEngine>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            MirraError::Other(format!("Proxy server failed to start on {addr}: {e}"))
        })?;
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            listener,
            engine,
            shutdown_tx,
        })
    }

    /// Address actually bound
    ///
    /// # Errors
    ///
    /// Returns error if the socket has no local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Sender that stops [`ProxyServer::run`] when a message is sent
    #[must_use]
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    /// Serve until Ctrl-C or a shutdown message
    ///
    /// # Errors
    ///
    /// Returns error if the listener fails irrecoverably
    pub async fn run(self) -> Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let graceful = GracefulShutdown::new();

        info!(
            "Listening on {} (proxy to upstream)",
            self.listener.local_addr()?
        );

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            debug!("Accepted connection from {}", peer_addr);
                            let engine = Arc::clone(&self.engine);
                            let service = service_fn(move |req| {
                                handle(Arc::clone(&engine), req)
                            });
                            let connection = graceful.watch(
                                http1::Builder::new()
                                    .serve_connection(TokioIo::new(stream), service),
                            );
                            tokio::spawn(async move {
                                if let Err(e) = connection.await {
                                    warn!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received SIGINT, shutting down");
                    break;
                }
                _ = shutdown_rx.recv() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        let open = graceful.count();
        let shutdown_timeout = Duration::from_millis(SHUTDOWN_TIMEOUT_MS);
        if tokio::time::timeout(shutdown_timeout, graceful.shutdown())
            .await
            .is_err()
        {
            warn!("{} connection(s) still open after {:?}", open, shutdown_timeout);
        }

        info!("Shutdown complete");
        Ok(())
    }
}

async fn handle(
    engine: Arc<ResolutionEngine>,
    req: Request<Incoming>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    let response = match into_proxy_request(&engine, req).await {
        Ok(request) => match engine.handle(&request).await {
            Ok(cached) => reply(&cached),
            Err(e) => error_response(&e),
        },
        Err(e) => error_response(&e),
    };
    Ok(response)
}

/// Normalize an incoming request; only POST bodies take part in fingerprinting
async fn into_proxy_request(
    engine: &ResolutionEngine,
    req: Request<Incoming>,
) -> Result<ProxyRequest> {
    let (parts, body) = req.into_parts();

    let url = parts.uri.path_and_query().map(|pq| pq.as_str().to_string());
    let headers = parts
        .headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect();

    let body = if parts.method == Method::POST {
        let max_size = engine.settings().await.max_request_size;
        check_content_length(&parts.headers, max_size)?;
        let bytes = read_body(body, max_size).await?;
        Some(String::from_utf8_lossy(&bytes).into_owned())
    } else {
        None
    };

    ProxyRequest::new(parts.method.as_str(), url, headers, body)
}

/// Reject bodies whose declared length exceeds `max_size`
fn check_content_length(headers: &HeaderMap, max_size: usize) -> Result<()> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<usize>().ok());

    match declared {
        Some(size) if size > max_size => Err(MirraError::DataTooLarge {
            size,
            limit: max_size,
        }),
        _ => Ok(()),
    }
}

/// Read request body, stopping once `max_size` bytes are exceeded
async fn read_body<B>(body: B, max_size: usize) -> Result<Bytes>
where
    B: hyper::body::Body,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    match Limited::new(body, max_size).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(MirraError::DataTooLarge {
            size: max_size.saturating_add(1),
            limit: max_size,
        }),
        Err(e) => Err(MirraError::Other(format!("Failed to read body: {e}"))),
    }
}

/// Client response for a resolved request
fn reply(cached: &CachedResponse) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(cached.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = serde_json::to_vec(&cached.body).unwrap_or_default();
    let mut response = json_response(status, body);

    let headers = response.headers_mut();
    for (name, value) in &cached.headers {
        if SERVER_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
            continue;
        }
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            continue;
        };
        for value in value.values() {
            if let Ok(value) = HeaderValue::from_str(value) {
                headers.append(name.clone(), value);
            }
        }
    }

    response
}

/// Error response for failures that produced no cached response
fn error_response(error: &MirraError) -> Response<Full<Bytes>> {
    let status = match error {
        MirraError::NoCachedResponse { .. } => StatusCode::NOT_FOUND,
        MirraError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        MirraError::DataTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!("Request failed ({}): {}", status, error);

    let body = json!({ "errors": [{ "message": error.to_string() }] });
    json_response(status, body.to_string().into_bytes())
}

fn json_response(status: StatusCode, body: Vec<u8>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::BehaviorMode;
    use crate::fingerprint::RequestFingerprint;
    use crate::response::HeaderValue as CachedHeaderValue;

    async fn body_json(response: Response<Full<Bytes>>) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_reply_uses_cached_status_and_headers() {
        let mut cached = CachedResponse::new(201, json!({"data": {"ok": true}}));
        cached.headers.insert(
            "x-request-id".to_string(),
            CachedHeaderValue::Single("abc".to_string()),
        );
        cached.headers.insert(
            "content-type".to_string(),
            CachedHeaderValue::Single("text/html".to_string()),
        );

        let response = reply(&cached);

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-request-id"], "abc");
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(body_json(response).await, json!({"data": {"ok": true}}));
    }

    #[tokio::test]
    async fn test_no_cached_response_is_not_found() {
        let error = MirraError::NoCachedResponse {
            id: RequestFingerprint::parse("responseFor77").unwrap(),
            mode: BehaviorMode::NoRequestForwarding,
        };

        let response = error_response(&error);

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let message = body_json(response).await["errors"][0]["message"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(message.contains("responseFor77"));
        assert!(message.contains("NO_REQUEST_FORWARDING"));
    }

    #[test]
    fn test_error_status_mapping() {
        let too_large = MirraError::DataTooLarge { size: 10, limit: 5 };
        assert_eq!(
            error_response(&too_large).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );

        let invalid = MirraError::InvalidRequest("missing URL".to_string());
        assert_eq!(error_response(&invalid).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_declared_length_over_limit() {
        let mut headers = HeaderMap::new();
        assert!(check_content_length(&headers, 5).is_ok());

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("5"));
        assert!(check_content_length(&headers, 5).is_ok());

        headers.insert(CONTENT_LENGTH, HeaderValue::from_static("6"));
        assert!(matches!(
            check_content_length(&headers, 5),
            Err(MirraError::DataTooLarge { size: 6, limit: 5 })
        ));
    }

    #[tokio::test]
    async fn test_read_body_limit() {
        let body = Full::new(Bytes::from("test data that is too long"));
        assert!(matches!(
            read_body(body, 5).await,
            Err(MirraError::DataTooLarge { limit: 5, .. })
        ));

        let body = Full::new(Bytes::from("ok"));
        assert_eq!(read_body(body, 5).await.unwrap(), Bytes::from("ok"));
    }
}
