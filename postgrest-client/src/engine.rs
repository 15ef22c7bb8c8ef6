//! HTTP engines.
//!
//! An [`Engine`] performs the network I/O for a fully prepared request. The
//! [`Transport`](crate::Transport) resolves URLs and stamps default headers
//! before handing the request over, so engines stay protocol-agnostic.
//!
//! Two engines ship with the crate:
//!
//! - [`StandardEngine`]: a `reqwest` client with the platform's default
//!   connection reuse policy
//! - [`PooledEngine`]: a `hyper_util` client with a bounded number of
//!   in-flight connections per host, for high-throughput workloads
//!
//! [`FnEngine`] wraps a closure and is the hook for interception and mocking.
//!
//! # Example
//!
//! ```ignore
//! use postgrest_client::{Client, FnEngine};
//! use std::sync::Arc;
//!
//! let engine = FnEngine::new(|request: http::Request<bytes::Bytes>| {
//!     Box::pin(async move {
//!         println!("{} {}", request.method(), request.uri());
//!         Ok(http::Response::new(bytes::Bytes::from_static(b"[]")))
//!     })
//! });
//!
//! let client = Client::builder("http://localhost:3000")
//!     .with_engine(Arc::new(engine))
//!     .build()?;
//! ```

mod connector;
mod pooled;
mod standard;

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::ClientError;

pub use connector::{build_http_connector, build_https_connector, default_tls_config, has_tls_support};
pub use pooled::{
    DEFAULT_MAX_CONNS_PER_HOST, MAX_CONNS_PER_HOST_LIMIT, PooledEngine, PooledEngineBuilder,
};
pub use standard::StandardEngine;

/// Type alias for a boxed future returning a result.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which engine a client dispatches through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EngineKind {
    /// Connection-reusing standard client.
    #[default]
    Standard,
    /// Pooled high-throughput client.
    Pooled,
    /// A caller-supplied engine.
    Custom,
}

/// Sends one prepared HTTP request and collects the full response.
///
/// Implementations must not retry: every call is a single delivery attempt.
pub trait Engine: Send + Sync {
    /// Send the request and buffer the response body.
    fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> BoxFuture<'static, Result<http::Response<Bytes>, ClientError>>;

    /// The kind of engine, for diagnostics.
    fn kind(&self) -> EngineKind {
        EngineKind::Custom
    }

    /// Cap the number of concurrent connections per host.
    ///
    /// Engines without a connection cap ignore this.
    fn set_max_conns_per_host(&self, max: usize) {
        let _ = max;
    }
}

/// A closure-backed engine.
///
/// Useful for intercepting requests in tests or routing them through a
/// custom stack.
pub struct FnEngine<F> {
    func: F,
}

impl<F> FnEngine<F> {
    /// Create a new function-based engine.
    pub fn new(func: F) -> Self
    where
        F: Fn(http::Request<Bytes>) -> BoxFuture<'static, Result<http::Response<Bytes>, ClientError>>
            + Send
            + Sync,
    {
        Self { func }
    }
}

impl<F> Engine for FnEngine<F>
where
    F: Fn(http::Request<Bytes>) -> BoxFuture<'static, Result<http::Response<Bytes>, ClientError>>
        + Send
        + Sync,
{
    fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> BoxFuture<'static, Result<http::Response<Bytes>, ClientError>> {
        (self.func)(request)
    }
}

impl<F> std::fmt::Debug for FnEngine<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnEngine").finish_non_exhaustive()
    }
}
