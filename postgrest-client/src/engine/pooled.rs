//! Hyper-based pooled engine.
//!
//! This module provides [`PooledEngine`], a high-throughput engine using
//! hyper_util's legacy client. It supports:
//!
//! - HTTP/1.1 and HTTP/2 with automatic protocol negotiation
//! - TLS with rustls (feature-gated)
//! - Persistent connection pooling
//! - A per-host cap on concurrently open connections (default 30)
//! - Tower service integration for middleware
//!
//! # Example
//!
//! ```ignore
//! use postgrest_client::engine::PooledEngine;
//! use std::time::Duration;
//!
//! let engine = PooledEngine::builder()
//!     .max_conns_per_host(100)
//!     .pool_idle_timeout(Duration::from_secs(60))
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Builder, Client, ResponseFuture, connect::HttpConnector};
use hyper_util::rt::{TokioExecutor, TokioTimer};
use rustls::ClientConfig;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tower_service::Service;

use super::connector::{build_http_connector, build_https_connector, default_tls_config};
use super::{BoxFuture, Engine, EngineKind};
use crate::ClientError;

/// Default per-host connection cap.
pub const DEFAULT_MAX_CONNS_PER_HOST: usize = 30;

/// Largest accepted per-host connection cap. Larger values are clamped.
pub const MAX_CONNS_PER_HOST_LIMIT: usize = Semaphore::MAX_PERMITS;

/// Zero selects the default; anything above the limit is clamped.
fn normalize_cap(max: usize) -> usize {
    match max {
        0 => DEFAULT_MAX_CONNS_PER_HOST,
        max => max.min(MAX_CONNS_PER_HOST_LIMIT),
    }
}

/// Connection pool, with or without TLS.
#[derive(Clone)]
enum Pool {
    Tls(Client<HttpsConnector<HttpConnector>, Full<Bytes>>),
    Plain(Client<HttpConnector, Full<Bytes>>),
}

impl Pool {
    fn request(&self, request: http::Request<Full<Bytes>>) -> ResponseFuture {
        match self {
            Pool::Tls(client) => client.request(request),
            Pool::Plain(client) => client.request(request),
        }
    }

    fn has_tls(&self) -> bool {
        matches!(self, Pool::Tls(_))
    }
}

/// One host's admission state.
///
/// `debt` counts permits that must be retired as soon as they come back,
/// after the cap shrank below the number of requests in flight.
#[derive(Debug)]
struct HostSlot {
    semaphore: Arc<Semaphore>,
    debt: usize,
}

impl HostSlot {
    fn grow(&mut self, by: usize) {
        let repaid = by.min(self.debt);
        self.debt -= repaid;
        self.semaphore.add_permits(by - repaid);
    }

    fn shrink(&mut self, by: usize) {
        let forgotten = self.semaphore.forget_permits(by);
        self.debt += by - forgotten;
    }
}

#[derive(Debug)]
struct LimiterState {
    max: usize,
    hosts: HashMap<String, HostSlot>,
}

/// Per-host admission control.
///
/// Each host gets one semaphore for the life of the engine. A permit is held
/// for the lifetime of one request, so at most `max` connections per host are
/// in use at any moment, including across cap changes.
#[derive(Debug)]
struct HostLimiter {
    state: Mutex<LimiterState>,
}

impl HostLimiter {
    fn new(max: usize) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                max: normalize_cap(max),
                hosts: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LimiterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn semaphore(&self, host: &str) -> Arc<Semaphore> {
        let mut state = self.lock();
        let max = state.max;
        state
            .hosts
            .entry(host.to_string())
            .or_insert_with(|| HostSlot {
                semaphore: Arc::new(Semaphore::new(max)),
                debt: 0,
            })
            .semaphore
            .clone()
    }

    /// Retire one permit of `host` if the cap shrank under it.
    fn settle_debt(&self, host: &str) -> bool {
        match self.lock().hosts.get_mut(host) {
            Some(slot) if slot.debt > 0 => {
                slot.debt -= 1;
                true
            }
            _ => false,
        }
    }

    async fn acquire(&self, host: &str) -> Result<OwnedSemaphorePermit, ClientError> {
        let semaphore = self.semaphore(host);
        loop {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ClientError::Transport(format!("connection pool closed: {e}")))?;
            if !self.settle_debt(host) {
                return Ok(permit);
            }
            permit.forget();
        }
    }

    /// Resize every host in place. Requests in flight keep their permits and
    /// count against the new cap.
    fn resize(&self, max: usize) {
        let max = normalize_cap(max);
        let mut state = self.lock();
        let old = state.max;
        if max == old {
            return;
        }
        state.max = max;
        for slot in state.hosts.values_mut() {
            if max > old {
                slot.grow(max - old);
            } else {
                slot.shrink(old - max);
            }
        }
    }

    fn max(&self) -> usize {
        self.lock().max
    }
}

/// Pooled engine using hyper_util's legacy client.
///
/// Clones share the same connection pool and per-host limits.
#[derive(Clone)]
pub struct PooledEngine {
    pool: Pool,
    limiter: Arc<HostLimiter>,
    /// Whether HTTP/2 only mode is enabled.
    http2_only: bool,
}

impl std::fmt::Debug for PooledEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledEngine")
            .field("max_conns_per_host", &self.limiter.max())
            .field("http2_only", &self.http2_only)
            .field("tls", &self.pool.has_tls())
            .finish_non_exhaustive()
    }
}

impl PooledEngine {
    /// Create a new engine builder.
    pub fn builder() -> PooledEngineBuilder {
        PooledEngineBuilder::new()
    }

    /// Create a new engine with default settings.
    pub fn new() -> Result<Self, ClientError> {
        Self::builder().build()
    }

    /// Current per-host connection cap.
    pub fn max_conns_per_host(&self) -> usize {
        self.limiter.max()
    }

    /// Check if this engine is configured for HTTP/2 only.
    pub fn is_http2_only(&self) -> bool {
        self.http2_only
    }

    /// Send an HTTP request and buffer the response.
    ///
    /// The connection permit and the response body are released when this
    /// future completes, on success and failure alike.
    pub async fn request(
        &self,
        request: http::Request<Bytes>,
    ) -> Result<http::Response<Bytes>, ClientError> {
        dispatch(self.pool.clone(), self.limiter.clone(), request).await
    }
}

async fn dispatch(
    pool: Pool,
    limiter: Arc<HostLimiter>,
    request: http::Request<Bytes>,
) -> Result<http::Response<Bytes>, ClientError> {
    let host = request
        .uri()
        .authority()
        .map(|authority| authority.as_str().to_ascii_lowercase())
        .unwrap_or_default();
    let _permit = limiter.acquire(&host).await?;

    let response = pool
        .request(request.map(Full::new))
        .await
        .map_err(|e| ClientError::Transport(format!("request failed: {e}")))?;

    let (parts, body) = response.into_parts();
    let body = body
        .collect()
        .await
        .map_err(|e| ClientError::Transport(format!("failed to read response body: {e}")))?
        .to_bytes();

    Ok(http::Response::from_parts(parts, body))
}

impl Engine for PooledEngine {
    fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> BoxFuture<'static, Result<http::Response<Bytes>, ClientError>> {
        Box::pin(dispatch(self.pool.clone(), self.limiter.clone(), request))
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Pooled
    }

    fn set_max_conns_per_host(&self, max: usize) {
        self.limiter.resize(max);
    }
}

/// Builder for [`PooledEngine`].
///
/// # Example
///
/// ```ignore
/// use postgrest_client::engine::PooledEngineBuilder;
/// use std::time::Duration;
///
/// let engine = PooledEngineBuilder::new()
///     .max_conns_per_host(64)
///     .pool_idle_timeout(Duration::from_secs(90))
///     .build()?;
/// ```
pub struct PooledEngineBuilder {
    /// Custom TLS configuration.
    tls_config: Option<ClientConfig>,
    /// Force HTTP/2 only (h2c or when HTTP/2 is required).
    http2_only: bool,
    /// Connection pool idle timeout.
    pool_idle_timeout: Option<Duration>,
    /// Maximum concurrently used connections per host.
    max_conns_per_host: usize,
}

impl Default for PooledEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PooledEngineBuilder {
    /// Create a new engine builder with default settings.
    pub fn new() -> Self {
        Self {
            tls_config: None,
            http2_only: false,
            pool_idle_timeout: Some(Duration::from_secs(90)),
            max_conns_per_host: DEFAULT_MAX_CONNS_PER_HOST,
        }
    }

    /// Set a custom TLS configuration.
    pub fn tls_config(mut self, config: ClientConfig) -> Self {
        self.tls_config = Some(config);
        self
    }

    /// Enable HTTP/2 only mode.
    pub fn http2_only(mut self, enabled: bool) -> Self {
        self.http2_only = enabled;
        self
    }

    /// Set the connection pool idle timeout.
    ///
    /// Default: 90 seconds.
    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = Some(timeout);
        self
    }

    /// Disable connection pool idle timeout.
    pub fn pool_idle_timeout_none(mut self) -> Self {
        self.pool_idle_timeout = None;
        self
    }

    /// Set the per-host connection cap. Zero selects the default of 30 and
    /// values above [`MAX_CONNS_PER_HOST_LIMIT`] are clamped.
    pub fn max_conns_per_host(mut self, max: usize) -> Self {
        self.max_conns_per_host = normalize_cap(max);
        self
    }

    /// Build the engine.
    ///
    /// Without a TLS configuration, either supplied here or from an available
    /// crypto provider, the engine dials plain `http://` only.
    pub fn build(mut self) -> Result<PooledEngine, ClientError> {
        let tls_config = self.tls_config.take().or_else(default_tls_config);
        Ok(self.build_with(tls_config))
    }

    fn build_with(self, tls_config: Option<ClientConfig>) -> PooledEngine {
        let mut builder = Builder::new(TokioExecutor::new());

        // required for pool_idle_timeout to work
        builder.pool_timer(TokioTimer::new());

        if let Some(timeout) = self.pool_idle_timeout {
            builder.pool_idle_timeout(timeout);
        }
        builder.pool_max_idle_per_host(self.max_conns_per_host);

        if self.http2_only {
            builder.http2_only(true);
        }

        let pool = match tls_config {
            Some(config) => Pool::Tls(builder.build(build_https_connector(config))),
            None => {
                #[cfg(feature = "tracing")]
                tracing::debug!("no TLS crypto provider, pooled engine limited to http://");
                Pool::Plain(builder.build(build_http_connector()))
            }
        };

        PooledEngine {
            pool,
            limiter: Arc::new(HostLimiter::new(self.max_conns_per_host)),
            http2_only: self.http2_only,
        }
    }
}

impl std::fmt::Debug for PooledEngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledEngineBuilder")
            .field("tls_config", &self.tls_config.is_some())
            .field("http2_only", &self.http2_only)
            .field("pool_idle_timeout", &self.pool_idle_timeout)
            .field("max_conns_per_host", &self.max_conns_per_host)
            .finish()
    }
}

impl Service<http::Request<Bytes>> for PooledEngine {
    type Response = http::Response<Bytes>;
    type Error = ClientError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        // admission happens per host inside the call
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<Bytes>) -> Self::Future {
        Box::pin(dispatch(self.pool.clone(), self.limiter.clone(), req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = PooledEngineBuilder::new();
        assert!(!builder.http2_only);
        assert_eq!(builder.max_conns_per_host, DEFAULT_MAX_CONNS_PER_HOST);
        assert!(builder.pool_idle_timeout.is_some());
    }

    #[test]
    fn test_builder_zero_max_conns_resets_to_default() {
        let builder = PooledEngineBuilder::new().max_conns_per_host(0);
        assert_eq!(builder.max_conns_per_host, 30);
    }

    #[test]
    fn test_builder_pool_settings() {
        let builder = PooledEngineBuilder::new()
            .pool_idle_timeout(Duration::from_secs(60))
            .max_conns_per_host(10);
        assert_eq!(builder.pool_idle_timeout, Some(Duration::from_secs(60)));
        assert_eq!(builder.max_conns_per_host, 10);
    }

    #[test]
    fn test_builder_clamps_huge_cap() {
        let builder = PooledEngineBuilder::new().max_conns_per_host(usize::MAX);
        assert_eq!(builder.max_conns_per_host, MAX_CONNS_PER_HOST_LIMIT);
    }

    #[test]
    fn test_host_limiter_grows_in_place() {
        let limiter = HostLimiter::new(2);
        let semaphore = limiter.semaphore("db:3000");
        assert_eq!(semaphore.available_permits(), 2);

        limiter.resize(7);
        assert_eq!(limiter.max(), 7);
        assert!(Arc::ptr_eq(&semaphore, &limiter.semaphore("db:3000")));
        assert_eq!(semaphore.available_permits(), 7);
    }

    #[test]
    fn test_host_limiter_clamps_huge_cap() {
        let limiter = HostLimiter::new(usize::MAX);
        assert_eq!(limiter.max(), MAX_CONNS_PER_HOST_LIMIT);
        assert_eq!(
            limiter.semaphore("db:3000").available_permits(),
            MAX_CONNS_PER_HOST_LIMIT
        );

        limiter.resize(1);
        assert_eq!(limiter.semaphore("db:3000").available_permits(), 1);
        limiter.resize(usize::MAX);
        assert_eq!(limiter.max(), MAX_CONNS_PER_HOST_LIMIT);
    }

    #[test]
    fn test_host_limiter_shares_semaphore_per_host() {
        let limiter = HostLimiter::new(3);
        let a = limiter.semaphore("a:1");
        let again = limiter.semaphore("a:1");
        let b = limiter.semaphore("b:1");
        assert!(Arc::ptr_eq(&a, &again));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_host_limiter_same_cap_keeps_permits_held() {
        let limiter = HostLimiter::new(1);
        let held = limiter.acquire("db:3000").await.unwrap();

        limiter.resize(1);

        let waiting = tokio::time::timeout(Duration::from_millis(50), limiter.acquire("db:3000"));
        assert!(waiting.await.is_err());

        drop(held);
        assert!(limiter.acquire("db:3000").await.is_ok());
    }

    #[tokio::test]
    async fn test_host_limiter_shrinks_below_in_flight() {
        let limiter = HostLimiter::new(3);
        let first = limiter.acquire("db:3000").await.unwrap();
        let second = limiter.acquire("db:3000").await.unwrap();

        // one permit is free, the other must be retired when it comes back
        limiter.resize(1);
        let semaphore = limiter.semaphore("db:3000");
        assert_eq!(semaphore.available_permits(), 0);

        drop(first);
        let waiting = tokio::time::timeout(Duration::from_millis(50), limiter.acquire("db:3000"));
        assert!(waiting.await.is_err());
        assert_eq!(semaphore.available_permits(), 0);

        drop(second);
        let only = limiter.acquire("db:3000").await.unwrap();
        let waiting = tokio::time::timeout(Duration::from_millis(50), limiter.acquire("db:3000"));
        assert!(waiting.await.is_err());

        drop(only);
        limiter.resize(2);
        let _a = limiter.acquire("db:3000").await.unwrap();
        let _b = limiter.acquire("db:3000").await.unwrap();
        assert_eq!(semaphore.available_permits(), 0);
    }

    #[tokio::test]
    async fn test_host_limiter_grow_repays_debt_first() {
        let limiter = HostLimiter::new(2);
        let first = limiter.acquire("db:3000").await.unwrap();
        let second = limiter.acquire("db:3000").await.unwrap();

        limiter.resize(1);
        limiter.resize(3);

        let semaphore = limiter.semaphore("db:3000");
        assert_eq!(semaphore.available_permits(), 1);
        drop(first);
        drop(second);
        assert_eq!(semaphore.available_permits(), 3);
    }

    #[tokio::test]
    async fn test_set_max_conns_per_host() {
        let engine = PooledEngine::builder().max_conns_per_host(5).build().unwrap();
        assert_eq!(engine.kind(), EngineKind::Pooled);
        assert_eq!(engine.max_conns_per_host(), 5);

        engine.set_max_conns_per_host(100);
        assert_eq!(engine.max_conns_per_host(), 100);

        engine.set_max_conns_per_host(0);
        assert_eq!(engine.max_conns_per_host(), DEFAULT_MAX_CONNS_PER_HOST);

        engine.set_max_conns_per_host(usize::MAX);
        assert_eq!(engine.max_conns_per_host(), MAX_CONNS_PER_HOST_LIMIT);
    }

    #[tokio::test]
    async fn test_plain_pool_dials_http() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = axum::Router::new().fallback(|| async { "[]" });
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let engine = PooledEngineBuilder::new().build_with(None);
        assert!(!engine.pool.has_tls());

        let request = http::Request::get(format!("http://{addr}/actor"))
            .body(Bytes::new())
            .unwrap();
        let response = engine.request(request).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.body().as_ref(), b"[]");
    }

    #[tokio::test]
    async fn test_plain_pool_rejects_https() {
        let engine = PooledEngineBuilder::new().build_with(None);
        let request = http::Request::get("https://localhost:1/actor")
            .body(Bytes::new())
            .unwrap();
        let err = engine.request(request).await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err:?}");
    }
}
