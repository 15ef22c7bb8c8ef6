//! `reqwest`-based engine with the platform's default connection reuse.

use bytes::Bytes;

use super::{BoxFuture, Engine, EngineKind};
use crate::ClientError;

/// Connection-reusing standard engine.
///
/// Wraps a [`reqwest::Client`]; pooling, keep-alive and protocol negotiation
/// follow reqwest's defaults. No request timeout is configured here, deadlines
/// are applied per request by the transport.
#[derive(Debug, Clone)]
pub struct StandardEngine {
    client: reqwest::Client,
}

impl StandardEngine {
    /// Create a new engine with default settings.
    pub fn new() -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ClientError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Use a pre-configured reqwest client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Engine for StandardEngine {
    fn send(
        &self,
        request: http::Request<Bytes>,
    ) -> BoxFuture<'static, Result<http::Response<Bytes>, ClientError>> {
        let client = self.client.clone();
        Box::pin(async move {
            let request = reqwest::Request::try_from(request)
                .map_err(|e| ClientError::Protocol(format!("failed to build request: {e}")))?;

            let response = client
                .execute(request)
                .await
                .map_err(|e| ClientError::Transport(format!("request failed: {e}")))?;

            let status = response.status();
            let version = response.version();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|e| ClientError::Transport(format!("failed to read response body: {e}")))?;

            let mut converted = http::Response::new(body);
            *converted.status_mut() = status;
            *converted.version_mut() = version;
            *converted.headers_mut() = headers;
            Ok(converted)
        })
    }

    fn kind(&self) -> EngineKind {
        EngineKind::Standard
    }
}
