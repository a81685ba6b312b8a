//! HTTP transport abstraction, so the API client can be exercised without a
//! network socket.

use async_trait::async_trait;
use std::time::Duration;

/// An HTTP method the client issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// A fully-formed outgoing request: an absolute URL with query string already
/// appended, an optional JSON body, and a timeout.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection error: {0}")]
    Connection(String),
    #[error("response body was not valid JSON: {0}")]
    Decode(String),
}

/// Abstracts the wire transport so `ShopeeClient` can be driven by either a
/// real `reqwest::Client` or, in tests, a canned in-memory responder.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RawRequest) -> Result<RawResponse, TransportError>;
}

/// Production transport: one shared `reqwest::Client`, cloned cheaply per
/// call (connection pooling, rustls TLS) rather than reconnecting per
/// request.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .build()?;
        Ok(Self { client })
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new().expect("failed to build default reqwest client")
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: RawRequest) -> Result<RawResponse, TransportError> {
        let builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };

        let builder = builder.timeout(request.timeout).header(
            reqwest::header::CONTENT_TYPE,
            "application/json",
        );
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(request.timeout)
            } else {
                TransportError::Connection(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| TransportError::Decode(e.to_string()))?;

        Ok(RawResponse { status, body })
    }
}

/// Exposed unconditionally (not `#[cfg(test)]`) so both the crate's own unit
/// tests and the `tests/` integration suite can drive the API client without
/// a network socket.
pub mod fake {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    /// A transport that returns a pre-registered canned response keyed by
    /// the request's path (the part of the URL after the host, query
    /// string excluded), recording every request it sees for assertions.
    pub struct FakeTransport {
        responses: HashMap<String, serde_json::Value>,
        pub seen: Mutex<Vec<RawRequest>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self {
                responses: HashMap::new(),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn with_response(mut self, path: &str, body: serde_json::Value) -> Self {
            self.responses.insert(path.to_string(), body);
            self
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&self, request: RawRequest) -> Result<RawResponse, TransportError> {
            self.seen.lock().await.push(request.clone());
            let key = request
                .url
                .split_once("://")
                .and_then(|(_, rest)| rest.split_once('/'))
                .map(|(_, path)| format!("/{path}"))
                .unwrap_or_default();
            let key = key.split('?').next().unwrap_or(&key).to_string();

            match self.responses.get(&key) {
                Some(body) => Ok(RawResponse { status: 200, body: body.clone() }),
                None => Err(TransportError::Connection(format!("no canned response for {key}"))),
            }
        }
    }
}
