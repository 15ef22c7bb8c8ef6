//! Client-side error types.
//!
//! This module provides [`ClientError`], the error type for every PostgREST
//! client operation, and [`PostgrestError`], the JSON error envelope PostgREST
//! places in the body of non-2xx responses.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The JSON error envelope returned by PostgREST.
///
/// ```json
/// {"code": "42P01", "details": null, "hint": null, "message": "relation \"public.x\" does not exist"}
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostgrestError {
    /// PostgreSQL SQLSTATE or PostgREST `PGRST*` code.
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub hint: Option<String>,
}

/// Client error variants.
///
/// Variants are grouped so callers can tell "the server is unreachable"
/// ([`Transport`](Self::Transport), [`Timeout`](Self::Timeout)) apart from
/// "the server responded but the payload was unusable"
/// ([`Encode`](Self::Encode), [`Decode`](Self::Decode)) and from
/// "the server rejected the request" ([`Status`](Self::Status)).
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// The base URL could not be parsed or cannot carry path segments.
    #[error("invalid base URL: {0}")]
    InvalidUrl(String),

    /// A header name or value is not valid HTTP.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// Transport-level error (DNS, connection refused, reset, etc.).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete before its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The server answered with a non-2xx status.
    ///
    /// `body` always carries the raw response text; `error` is populated when
    /// the body parsed as a PostgREST error envelope.
    #[error("server responded with status {status}: {}", describe_status(.error, .body))]
    Status {
        status: u16,
        body: String,
        error: Option<PostgrestError>,
    },

    /// Request body serialization error.
    #[error("encode error: {0}")]
    Encode(String),

    /// Response body decoding error.
    #[error("decode error: {0}")]
    Decode(String),

    /// Malformed request or response framing.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The client was never constructed successfully.
    #[error("client unavailable: {0}")]
    Unavailable(String),
}

fn describe_status(error: &Option<PostgrestError>, body: &str) -> String {
    match error {
        Some(envelope) => match &envelope.code {
            Some(code) => format!("{} ({})", envelope.message, code),
            None => envelope.message.clone(),
        },
        None if body.is_empty() => "<empty body>".to_string(),
        None => body.to_string(),
    }
}

impl ClientError {
    /// Get the HTTP status for [`Status`](Self::Status) errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get the parsed PostgREST error envelope, if the server sent one.
    pub fn postgrest_error(&self) -> Option<&PostgrestError> {
        match self {
            ClientError::Status { error, .. } => error.as_ref(),
            _ => None,
        }
    }

    /// Get the raw response body for [`Status`](Self::Status) errors.
    pub fn body(&self) -> Option<&str> {
        match self {
            ClientError::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    /// Get the error message.
    pub fn message(&self) -> Option<&str> {
        match self {
            ClientError::Status { error, body, .. } => match error {
                Some(envelope) => Some(&envelope.message),
                None if body.is_empty() => None,
                None => Some(body),
            },
            ClientError::Timeout(_) => None,
            ClientError::InvalidUrl(msg)
            | ClientError::InvalidHeader(msg)
            | ClientError::Transport(msg)
            | ClientError::Encode(msg)
            | ClientError::Decode(msg)
            | ClientError::Protocol(msg)
            | ClientError::Unavailable(msg) => Some(msg),
        }
    }

    /// Returns true when the server could not be reached in time.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Timeout(_))
    }

    /// Returns true when a payload could not be encoded or decoded.
    pub fn is_serialization(&self) -> bool {
        matches!(self, ClientError::Encode(_) | ClientError::Decode(_))
    }
}
