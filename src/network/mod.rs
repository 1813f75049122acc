//! Network layer for Mirra
//!
//! The inbound HTTP server and the upstream client. Neither makes caching
//! decisions; both talk to the resolution engine only.

mod client;
mod server;

use async_trait::async_trait;

pub use client::{HttpFetcher, FALLBACK_ERROR_STATUS};
pub use server::ProxyServer;

use crate::fingerprint::ProxyRequest;
use crate::response::CachedResponse;

/// Connection setup timeout towards the upstream
pub const CONNECT_TIMEOUT_MS: u64 = 1000;

/// Graceful shutdown timeout
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;

/// Source of live responses
///
/// Implementations never fail: transport and protocol errors are turned
/// into an error-shaped [`CachedResponse`].
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// Perform `request` against `host:port`
    async fn fetch(&self, request: &ProxyRequest, host: &str, port: u16) -> CachedResponse;
}
