//! Response types for query execution.
//!
//! This module provides [`QueryResponse`], which pairs a decoded payload with
//! the total row count PostgREST reports in `Content-Range`, plus the status
//! and headers of the HTTP response.

use std::ops::Deref;

use bytes::Bytes;
use http::header::CONTENT_RANGE;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;

use crate::ClientError;
use crate::error_parser::parse_error_response;

/// Response wrapper for executed queries.
///
/// # Example
///
/// ```ignore
/// let response = client
///     .from("actor")
///     .select("*", "exact", false)
///     .limit(10)
///     .execute_to::<Vec<Actor>>()
///     .await?;
///
/// println!("{} of {:?} actors", response.len(), response.count());
/// let actors = response.into_inner();
/// ```
#[derive(Debug, Clone)]
pub struct QueryResponse<T> {
    inner: T,
    count: Option<u64>,
    status: StatusCode,
    headers: HeaderMap,
}

impl<T> QueryResponse<T> {
    /// Create a new QueryResponse.
    pub fn new(inner: T, count: Option<u64>, status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            inner,
            count,
            status,
            headers,
        }
    }

    /// Extract the inner value, discarding metadata.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Total number of rows matching the query.
    ///
    /// `None` means unknown: no count was requested, or the server did not
    /// report one.
    pub fn count(&self) -> Option<u64> {
        self.count
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Transform the inner value, preserving metadata.
    pub fn map<U, F>(self, f: F) -> QueryResponse<U>
    where
        F: FnOnce(T) -> U,
    {
        QueryResponse {
            inner: f(self.inner),
            count: self.count,
            status: self.status,
            headers: self.headers,
        }
    }

    /// Get a reference to the inner value.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Decompose into the inner value and the total count.
    pub fn into_parts(self) -> (T, Option<u64>) {
        (self.inner, self.count)
    }
}

impl<T> Deref for QueryResponse<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl<T> AsRef<T> for QueryResponse<T> {
    fn as_ref(&self) -> &T {
        &self.inner
    }
}

impl QueryResponse<Bytes> {
    /// Interpret the body as UTF-8 text.
    pub fn into_text(self) -> Result<QueryResponse<String>, ClientError> {
        let QueryResponse {
            inner,
            count,
            status,
            headers,
        } = self;
        let text = String::from_utf8(inner.to_vec())
            .map_err(|e| ClientError::Decode(format!("response body is not UTF-8: {e}")))?;
        Ok(QueryResponse::new(text, count, status, headers))
    }

    /// Deserialize the JSON body.
    ///
    /// An empty body (e.g. `Prefer: return=minimal`) decodes as JSON `null`,
    /// so `Option<T>` and `()` targets accept it.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<QueryResponse<T>, ClientError> {
        let QueryResponse {
            inner,
            count,
            status,
            headers,
        } = self;
        let value = decode_json(&inner)?;
        Ok(QueryResponse::new(value, count, status, headers))
    }
}

/// Turn a buffered HTTP response into a [`QueryResponse`].
///
/// Non-2xx statuses become [`ClientError::Status`].
pub(crate) fn from_http(response: http::Response<Bytes>) -> Result<QueryResponse<Bytes>, ClientError> {
    let (parts, body) = response.into_parts();

    if !parts.status.is_success() {
        let err = parse_error_response(parts.status, &body);
        #[cfg(feature = "tracing")]
        tracing::warn!(http.status_code = parts.status.as_u16(), error = %err, "request rejected");
        return Err(err);
    }

    let count = parts
        .headers
        .get(CONTENT_RANGE)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_content_range_total);

    Ok(QueryResponse::new(body, count, parts.status, parts.headers))
}

/// Parse the total from a `Content-Range` value.
///
/// Accepts `0-24/3573`, `*/3573` and the `items` unit prefix; returns `None`
/// for an unknown total (`0-24/*`) or anything malformed.
pub fn parse_content_range_total(value: &str) -> Option<u64> {
    let value = value.trim();
    let value = value.strip_prefix("items ").unwrap_or(value);
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse().ok()
}

pub(crate) fn decode_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ClientError> {
    let body = if body.iter().all(u8::is_ascii_whitespace) {
        b"null".as_slice()
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| {
        ClientError::Decode(format!(
            "invalid JSON response: {e}; body: {}",
            snippet(body)
        ))
    })
}

fn snippet(body: &[u8]) -> String {
    const LIMIT: usize = 256;
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= LIMIT {
        return text.into_owned();
    }
    let mut cut: String = text.chars().take(LIMIT).collect();
    cut.push_str("...");
    cut
}
