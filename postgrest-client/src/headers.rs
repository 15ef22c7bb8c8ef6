//! Default request headers shared by a client and its transport.
//!
//! [`HeaderSet`] is the single source of truth for the headers stamped on
//! every request a [`Client`](crate::Client) issues. Every setter replaces the
//! previous value for its header name.

use http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderName, HeaderValue};

use crate::ClientError;

/// Header carrying the API key for gateways such as Supabase.
pub const API_KEY_HEADER: &str = "apikey";

/// Header selecting the schema for reads.
pub const ACCEPT_PROFILE_HEADER: &str = "accept-profile";

/// Header selecting the schema for writes.
pub const CONTENT_PROFILE_HEADER: &str = "content-profile";

/// Header identifying this library to the server.
pub const CLIENT_INFO_HEADER: &str = "x-client-info";

/// Value sent in [`CLIENT_INFO_HEADER`].
pub const CLIENT_INFO: &str = concat!("postgrest-rs/", env!("CARGO_PKG_VERSION"));

/// Schema used when none is given.
pub const DEFAULT_SCHEMA: &str = "public";

/// Ordered set of default request headers.
#[derive(Debug, Clone, Default)]
pub struct HeaderSet {
    map: HeaderMap,
}

impl HeaderSet {
    /// Create an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the baseline header set for `schema`.
    ///
    /// Contains `Accept` and `Content-Type` set to JSON, both profile headers
    /// and `X-Client-Info`. An empty schema selects [`DEFAULT_SCHEMA`].
    pub fn baseline(schema: &str) -> Result<Self, ClientError> {
        let mut set = Self::new();
        set.map
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        set.map
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        set.set_schema(schema)?;
        set.map.insert(
            HeaderName::from_static(CLIENT_INFO_HEADER),
            HeaderValue::from_static(CLIENT_INFO),
        );
        Ok(set)
    }

    /// Set a header, replacing any previous values for that name.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), ClientError> {
        let name = parse_name(name)?;
        let value = parse_value(name.as_str(), value)?;
        self.map.insert(name, value);
        Ok(())
    }

    /// Set the `apikey` header.
    pub fn set_api_key(&mut self, api_key: &str) -> Result<(), ClientError> {
        self.set(API_KEY_HEADER, api_key)
    }

    /// Set `Authorization: Bearer <token>`.
    pub fn set_auth_token(&mut self, token: &str) -> Result<(), ClientError> {
        let value = parse_value(AUTHORIZATION.as_str(), &format!("Bearer {token}"))?;
        self.map.insert(AUTHORIZATION, value);
        Ok(())
    }

    /// Point both profile headers at `schema`.
    pub fn set_schema(&mut self, schema: &str) -> Result<(), ClientError> {
        let schema = if schema.is_empty() { DEFAULT_SCHEMA } else { schema };
        let value = parse_value(ACCEPT_PROFILE_HEADER, schema)?;
        self.map
            .insert(HeaderName::from_static(ACCEPT_PROFILE_HEADER), value.clone());
        self.map
            .insert(HeaderName::from_static(CONTENT_PROFILE_HEADER), value);
        Ok(())
    }

    /// Get a header value as a string.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).and_then(|v| v.to_str().ok())
    }

    /// Schema currently selected by `Accept-Profile`.
    pub fn schema(&self) -> Option<&str> {
        self.get(ACCEPT_PROFILE_HEADER)
    }

    /// Check if a header exists.
    pub fn contains(&self, name: &str) -> bool {
        self.map.contains_key(name)
    }

    /// Returns the number of header values.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if there are no headers.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Get an iterator over all header names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&HeaderName, &HeaderValue)> {
        self.map.iter()
    }

    /// Get the underlying HeaderMap.
    pub fn as_header_map(&self) -> &HeaderMap {
        &self.map
    }

    /// Stamp these defaults onto an outgoing request's headers.
    ///
    /// Names already present on the request are left untouched, so
    /// request-level headers take precedence over the defaults.
    pub fn apply_to(&self, target: &mut HeaderMap) {
        for name in self.map.keys() {
            if target.contains_key(name) {
                continue;
            }
            for value in self.map.get_all(name) {
                target.append(name.clone(), value.clone());
            }
        }
    }
}

pub(crate) fn parse_name(name: &str) -> Result<HeaderName, ClientError> {
    HeaderName::try_from(name)
        .map_err(|e| ClientError::InvalidHeader(format!("invalid header name {name:?}: {e}")))
}

pub(crate) fn parse_value(name: &str, value: &str) -> Result<HeaderValue, ClientError> {
    HeaderValue::try_from(value)
        .map_err(|e| ClientError::InvalidHeader(format!("invalid value for header {name}: {e}")))
}
