//! PostgREST client.
//!
//! [`Client`] owns the transport (base URL, default headers, engine) and is
//! the factory for queries. It is cheap to clone; clones share the same
//! headers, engine and last-error slot.
//!
//! # Example
//!
//! ```ignore
//! use postgrest_client::Client;
//!
//! let client = Client::new("http://localhost:3000", "", &[]);
//! client.set_api_key("secret")?;
//!
//! if client.ping().await {
//!     let actors = client
//!         .from("actor")
//!         .select("actor_id,first_name", "", false)
//!         .execute_string()
//!         .await?;
//!     println!("{}", actors.into_inner());
//! }
//! ```

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use http::{Method, StatusCode};
use serde::Serialize;
use url::Url;

use crate::ClientError;
use crate::builder::ClientBuilder;
use crate::engine::{DEFAULT_MAX_CONNS_PER_HOST, EngineKind, MAX_CONNS_PER_HOST_LIMIT};
use crate::error_parser::parse_error_response;
use crate::filter::FilterBuilder;
use crate::headers::HeaderSet;
use crate::query::{Count, QueryBuilder, QueryState};
use crate::request::ApiRequest;
use crate::transport::Transport;

/// Deadline applied to [`Client::ping`].
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// PostgREST client.
///
/// A client whose construction failed has no transport: every request
/// operation fails with [`ClientError::Unavailable`] and
/// [`client_error`](Self::client_error) returns the construction error.
#[derive(Clone)]
pub struct Client {
    transport: Option<Transport>,
    /// Most recent failure of an operation that reports through the slot.
    last_error: Arc<Mutex<Option<ClientError>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("transport", &self.transport)
            .field("client_error", &self.client_error())
            .finish()
    }
}

impl Client {
    /// Create a client on the standard engine.
    ///
    /// Never fails: on a bad URL or header the returned client is broken and
    /// [`client_error`](Self::client_error) holds the reason. Use
    /// [`Client::builder`] to get the error as a `Result` instead.
    pub fn new(url: &str, schema: &str, headers: &[(&str, &str)]) -> Self {
        Self::build_or_broken(url, schema, headers, EngineKind::Standard)
    }

    /// Create a client on the pooled engine (30 connections per host).
    ///
    /// Built without a TLS crypto provider, the pooled engine reaches
    /// `http://` URLs only.
    pub fn new_fast(url: &str, schema: &str, headers: &[(&str, &str)]) -> Self {
        Self::build_or_broken(url, schema, headers, EngineKind::Pooled)
    }

    /// Create a builder for configuring a client.
    pub fn builder<S: Into<String>>(base_url: S) -> ClientBuilder {
        ClientBuilder::new(base_url)
    }

    fn build_or_broken(url: &str, schema: &str, headers: &[(&str, &str)], engine: EngineKind) -> Self {
        let result = ClientBuilder::new(url)
            .schema(schema)
            .headers(headers.iter().copied())
            .engine(engine)
            .build();
        match result {
            Ok(client) => client,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(url, error = %err, "postgrest client construction failed");
                Self {
                    transport: None,
                    last_error: Arc::new(Mutex::new(Some(err))),
                }
            }
        }
    }

    pub(crate) fn from_transport(transport: Transport) -> Self {
        Self {
            transport: Some(transport),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn transport(&self) -> Result<&Transport, ClientError> {
        self.transport.as_ref().ok_or_else(|| {
            let reason = self
                .client_error()
                .map_or_else(|| "client has no transport".to_string(), |e| e.to_string());
            ClientError::Unavailable(reason)
        })
    }

    /// The error recorded by the last failing [`ping`](Self::ping),
    /// [`rpc`](Self::rpc) or construction.
    pub fn client_error(&self) -> Option<ClientError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reset the last-error slot. A construction error is cleared too, but the
    /// client stays broken.
    pub fn clear_error(&self) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn record(&self, err: &ClientError) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.clone());
    }

    /// The base URL, or `None` for a broken client.
    pub fn base_url(&self) -> Option<&Url> {
        self.transport.as_ref().map(Transport::base_url)
    }

    /// The engine requests go through, or `None` for a broken client.
    pub fn engine_kind(&self) -> Option<EngineKind> {
        self.transport.as_ref().map(Transport::engine_kind)
    }

    /// The schema selected by `Accept-Profile`.
    pub fn schema(&self) -> Option<String> {
        self.headers()
            .and_then(|headers| headers.schema().map(str::to_string))
    }

    /// A snapshot of the default headers.
    pub fn headers(&self) -> Option<HeaderSet> {
        self.transport.as_ref().map(Transport::headers)
    }

    /// Set the pooled engine's per-host connection cap. Values `<= 0` select
    /// the default of 30 and very large values are clamped to
    /// [`MAX_CONNS_PER_HOST_LIMIT`]. Requests already in flight count against
    /// the new cap. Ignored by the standard engine and broken clients.
    pub fn set_fast_http_max_conns(&self, max: i64) -> &Self {
        let max = if max <= 0 {
            DEFAULT_MAX_CONNS_PER_HOST
        } else {
            usize::try_from(max).unwrap_or(MAX_CONNS_PER_HOST_LIMIT)
        };
        if let Some(transport) = &self.transport {
            transport.engine().set_max_conns_per_host(max);
        }
        self
    }

    /// Send `apikey: <key>` on every request.
    pub fn set_api_key(&self, api_key: &str) -> Result<&Self, ClientError> {
        self.transport()?
            .update_headers(|headers| headers.set_api_key(api_key))?;
        Ok(self)
    }

    /// Send `Authorization: Bearer <token>` on every request.
    pub fn set_auth_token(&self, token: &str) -> Result<&Self, ClientError> {
        self.transport()?
            .update_headers(|headers| headers.set_auth_token(token))?;
        Ok(self)
    }

    /// Target `schema` for reads and writes. An empty name selects `public`.
    pub fn change_schema(&self, schema: &str) -> Result<&Self, ClientError> {
        self.transport()?
            .update_headers(|headers| headers.set_schema(schema))?;
        Ok(self)
    }

    /// Set an arbitrary default header, replacing previous values.
    pub fn set_header(&self, name: &str, value: &str) -> Result<&Self, ClientError> {
        self.transport()?
            .update_headers(|headers| headers.set(name, value))?;
        Ok(self)
    }

    /// Liveness probe: `GET` the base URL within [`PING_TIMEOUT`].
    ///
    /// Returns true only on `200 OK`. Any other outcome is recorded in the
    /// last-error slot.
    pub async fn ping(&self) -> bool {
        match self.try_ping().await {
            Ok(()) => true,
            Err(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %err, "ping failed");
                self.record(&err);
                false
            }
        }
    }

    /// Like [`ping`](Self::ping), returning the failure instead of recording
    /// it.
    pub async fn try_ping(&self) -> Result<(), ClientError> {
        let request = ApiRequest::new(Method::GET, Vec::<String>::new()).with_timeout(PING_TIMEOUT);
        let response = self.transport()?.round_trip(request).await?;
        if response.status() != StatusCode::OK {
            return Err(parse_error_response(response.status(), response.body()));
        }
        Ok(())
    }

    /// Call a database function: `POST {base}/rpc/{name}` with `body` as JSON.
    ///
    /// `count` of `exact`, `planned` or `estimated` adds
    /// `Prefer: count=<count>`; other values are ignored. `None` sends an
    /// empty body. Failures are returned and also recorded in the last-error
    /// slot.
    ///
    /// ```ignore
    /// let sum = client.rpc("add_them", "", Some(&json!({"a": 1, "b": 2}))).await?;
    /// let all = client.rpc("list_all", "exact", None::<&()>).await?;
    /// ```
    pub async fn rpc<B>(&self, name: &str, count: &str, body: Option<&B>) -> Result<String, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let result = self.call_rpc(name, count, body).await;
        if let Err(err) = &result {
            self.record(err);
        }
        result
    }

    async fn call_rpc<B>(&self, name: &str, count: &str, body: Option<&B>) -> Result<String, ClientError>
    where
        B: Serialize + ?Sized,
    {
        let mut state = QueryState::new(self.clone(), Method::POST, vec!["rpc".into(), name.into()]);
        if let Some(body) = body {
            state.set_json_body(body);
        }
        if let Some(count) = Count::parse(count) {
            state.prefer(format!("count={}", count.as_str()));
        }
        state.execute().await?.into_text().map(|response| response.into_inner())
    }

    /// A filterable call to a database function.
    ///
    /// The function's result can be narrowed and shaped like a table:
    ///
    /// ```ignore
    /// let rows = client
    ///     .rpc_query("search_films", Some(&json!({"term": "dog"})))
    ///     .lt("length", 100)
    ///     .order("title", OrderOptions::ascending())
    ///     .execute_string()
    ///     .await?;
    /// ```
    pub fn rpc_query<B>(&self, name: &str, body: Option<&B>) -> FilterBuilder
    where
        B: Serialize + ?Sized,
    {
        let mut state = QueryState::new(self.clone(), Method::POST, vec!["rpc".into(), name.into()]);
        if let Some(body) = body {
            state.set_json_body(body);
        }
        FilterBuilder::new(state)
    }

    /// Start a query against `table`.
    ///
    /// Always succeeds; an empty name is rejected when the query executes.
    pub fn from(&self, table: &str) -> QueryBuilder {
        QueryBuilder::new(self.clone(), table)
    }
}
