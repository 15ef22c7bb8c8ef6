//! Error response parsing for PostgREST.
//!
//! Turns a non-2xx response into a [`ClientError::Status`] that keeps both the
//! raw body and, when present, the parsed PostgREST error envelope.

use bytes::Bytes;
use http::StatusCode;

use crate::error::{ClientError, PostgrestError};

/// Parse an error response from the server.
///
/// PostgREST error responses have the format:
/// ```json
/// {
///   "code": "PGRST116",
///   "details": "The result contains 0 rows",
///   "hint": null,
///   "message": "JSON object requested, multiple (or no) rows returned"
/// }
/// ```
///
/// Bodies that are not an envelope (proxies, load balancers, plain text) are
/// kept verbatim in `body` with `error` left empty.
pub(crate) fn parse_error_response(status: StatusCode, body: &Bytes) -> ClientError {
    let text = String::from_utf8_lossy(body).into_owned();

    let error = serde_json::from_slice::<PostgrestError>(body)
        .ok()
        .filter(|envelope| envelope.code.is_some() || !envelope.message.is_empty());

    ClientError::Status {
        status: status.as_u16(),
        body: text,
        error,
    }
}
