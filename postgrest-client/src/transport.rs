//! Request transport.
//!
//! [`Transport`] applies a client's defaults to every outgoing request, no
//! matter which [`Engine`] performs the I/O:
//!
//! - path segments are appended to the base URL's path (`/actor` against
//!   `http://host/v1` becomes `http://host/v1/actor`)
//! - the shared [`HeaderSet`] is stamped onto the request, with
//!   request-level headers taking precedence
//! - an optional per-request deadline bounds the round trip
//!
//! Each request is resolved, stamped and dispatched exactly once; the
//! transport never retries.

use std::sync::{Arc, PoisonError, RwLock};

use bytes::Bytes;
#[cfg(feature = "tracing")]
use tracing::Instrument;
use url::Url;

use crate::ClientError;
use crate::engine::{Engine, EngineKind};
use crate::headers::HeaderSet;
use crate::request::ApiRequest;

/// Base URL, default headers and the engine that carries requests.
#[derive(Clone)]
pub struct Transport {
    base_url: Url,
    headers: Arc<RwLock<HeaderSet>>,
    engine: Arc<dyn Engine>,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url.as_str())
            .field("engine", &self.engine.kind())
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Create a transport for `base_url`.
    ///
    /// Fails if the URL cannot carry path segments (e.g. `mailto:`).
    pub fn new(
        base_url: Url,
        headers: HeaderSet,
        engine: Arc<dyn Engine>,
    ) -> Result<Self, ClientError> {
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(format!(
                "{base_url} cannot be used as a base URL"
            )));
        }
        Ok(Self {
            base_url,
            headers: Arc::new(RwLock::new(headers)),
            engine,
        })
    }

    /// The base URL every request is resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The kind of engine requests are dispatched through.
    pub fn engine_kind(&self) -> EngineKind {
        self.engine.kind()
    }

    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }

    /// A snapshot of the current default headers.
    pub fn headers(&self) -> HeaderSet {
        self.headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mutate the shared default headers.
    pub(crate) fn update_headers<F>(&self, update: F) -> Result<(), ClientError>
    where
        F: FnOnce(&mut HeaderSet) -> Result<(), ClientError>,
    {
        let mut headers = self.headers.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut headers)
    }

    /// Resolve path segments and query pairs against the base URL.
    ///
    /// Segments are percent-encoded individually; an empty segment list
    /// yields the base URL itself.
    pub fn resolve(&self, path: &[String], query: &[(String, String)]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.set_fragment(None);
        url.set_query(None);

        if !path.is_empty() {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ClientError::InvalidUrl(format!("{} cannot be used as a base URL", self.base_url))
            })?;
            segments.pop_if_empty();
            segments.extend(path);
        }

        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }

        Ok(url)
    }

    /// Build the final HTTP request: absolute URL plus stamped defaults.
    pub fn prepare(&self, request: &ApiRequest) -> Result<http::Request<Bytes>, ClientError> {
        let url = self.resolve(&request.path, &request.query)?;

        let mut headers = request.headers.clone();
        self.headers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .apply_to(&mut headers);

        let mut prepared = http::Request::builder()
            .method(request.method.clone())
            .uri(url.as_str())
            .body(request.body.clone().unwrap_or_default())
            .map_err(|e| ClientError::Protocol(format!("failed to build request: {e}")))?;
        *prepared.headers_mut() = headers;

        Ok(prepared)
    }

    /// Send a request through the engine and buffer the response.
    pub async fn round_trip(
        &self,
        request: ApiRequest,
    ) -> Result<http::Response<Bytes>, ClientError> {
        let prepared = self.prepare(&request)?;

        #[cfg(feature = "tracing")]
        let span = tracing::debug_span!(
            "postgrest.request",
            http.method = %prepared.method(),
            url.full = %prepared.uri(),
            engine = ?self.engine.kind(),
            otel.kind = "client",
        );

        let dispatch = async move {
            let response = match request.timeout {
                Some(limit) => tokio::time::timeout(limit, self.engine.send(prepared))
                    .await
                    .map_err(|_| ClientError::Timeout(limit))??,
                None => self.engine.send(prepared).await?,
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(http.status_code = response.status().as_u16(), "response received");

            Ok::<_, ClientError>(response)
        };

        #[cfg(feature = "tracing")]
        let dispatch = dispatch.instrument(span);

        dispatch.await
    }
}
