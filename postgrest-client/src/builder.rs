//! Client builder for PostgREST clients.
//!
//! Provides a fluent API for configuring and building a [`Client`].

use std::sync::Arc;

use url::Url;

use crate::ClientError;
use crate::client::Client;
use crate::engine::{DEFAULT_MAX_CONNS_PER_HOST, Engine, EngineKind, PooledEngine, StandardEngine};
use crate::headers::{DEFAULT_SCHEMA, HeaderSet};
use crate::transport::Transport;

/// Builder for creating a [`Client`].
///
/// # Example
///
/// ```ignore
/// use postgrest_client::{ClientBuilder, EngineKind};
///
/// let client = ClientBuilder::new("http://localhost:3000")
///     .schema("analytics")
///     .header("apikey", "secret")
///     .engine(EngineKind::Pooled)
///     .max_conns_per_host(64)
///     .build()?;
/// ```
pub struct ClientBuilder {
    /// Base URL of the PostgREST root (e.g., "http://localhost:3000").
    base_url: String,
    /// Schema selected through the profile headers.
    schema: String,
    /// Extra default headers, applied over the baseline.
    headers: Vec<(String, String)>,
    /// Which built-in engine to construct.
    engine: EngineKind,
    /// Per-host connection cap for the pooled engine.
    max_conns_per_host: usize,
    /// Caller-supplied engine, replacing the built-in ones.
    custom_engine: Option<Arc<dyn Engine>>,
}

impl std::fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("base_url", &self.base_url)
            .field("schema", &self.schema)
            .field("header_count", &self.headers.len())
            .field("engine", &self.engine)
            .field("max_conns_per_host", &self.max_conns_per_host)
            .field("custom_engine", &self.custom_engine.is_some())
            .finish()
    }
}

impl ClientBuilder {
    /// Create a new ClientBuilder with the given base URL.
    ///
    /// The URL must be absolute; any path it carries is kept, so
    /// `http://host/v1` sends table requests to `http://host/v1/<table>`.
    pub fn new<S: Into<String>>(base_url: S) -> Self {
        Self {
            base_url: base_url.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            headers: Vec::new(),
            engine: EngineKind::Standard,
            max_conns_per_host: DEFAULT_MAX_CONNS_PER_HOST,
            custom_engine: None,
        }
    }

    /// Set the schema. An empty name selects `public`.
    pub fn schema<S: Into<String>>(mut self, schema: S) -> Self {
        self.schema = schema.into();
        self
    }

    /// Add a default header. Later headers with the same name replace
    /// earlier ones, including the baseline headers.
    pub fn header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Add several default headers.
    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Choose the built-in engine.
    ///
    /// Default: [`EngineKind::Standard`].
    pub fn engine(mut self, engine: EngineKind) -> Self {
        self.engine = engine;
        self
    }

    /// Cap the pooled engine's concurrent connections per host.
    /// Zero selects the default of 30; values above
    /// [`MAX_CONNS_PER_HOST_LIMIT`](crate::engine::MAX_CONNS_PER_HOST_LIMIT)
    /// are clamped when the engine is built.
    pub fn max_conns_per_host(mut self, max: usize) -> Self {
        self.max_conns_per_host = if max == 0 {
            DEFAULT_MAX_CONNS_PER_HOST
        } else {
            max
        };
        self
    }

    /// Send requests through a caller-supplied engine.
    ///
    /// Used for interception and mocking; overrides [`engine`](Self::engine).
    pub fn with_engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.custom_engine = Some(engine);
        self
    }

    /// Build the client.
    ///
    /// Fails on an unparsable or relative base URL, an invalid header, or
    /// when the engine cannot be constructed.
    pub fn build(self) -> Result<Client, ClientError> {
        let base_url = Url::parse(&self.base_url)
            .map_err(|e| ClientError::InvalidUrl(format!("{:?}: {e}", self.base_url)))?;

        let mut headers = HeaderSet::baseline(&self.schema)?;
        for (name, value) in &self.headers {
            headers.set(name, value)?;
        }

        let engine: Arc<dyn Engine> = match (self.custom_engine, self.engine) {
            (Some(engine), _) => engine,
            (None, EngineKind::Standard) => Arc::new(StandardEngine::new()?),
            (None, EngineKind::Pooled) => Arc::new(
                PooledEngine::builder()
                    .max_conns_per_host(self.max_conns_per_host)
                    .build()?,
            ),
            (None, EngineKind::Custom) => {
                return Err(ClientError::Unavailable(
                    "custom engine selected but none was supplied".to_string(),
                ));
            }
        };

        let transport = Transport::new(base_url, headers, engine)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            base_url = %transport.base_url(),
            engine = ?transport.engine_kind(),
            "postgrest client built"
        );

        Ok(Client::from_transport(transport))
    }
}
