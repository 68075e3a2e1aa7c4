//! reqwest-backed transports.
//!
//! `HttpRpcTransport` POSTs JSON-RPC 2.0 envelopes to the current endpoint;
//! `HttpStreamFetcher` GETs the message stream. Both are created once per
//! client and reuse the `reqwest::Client` connection pool.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mage_domain::config::HttpConfig;
use mage_domain::error::{Error, Result};
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use uuid::Uuid;

use crate::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::{RpcTransport, StreamFetcher, TransportError};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// JSON-RPC over HTTP
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// JSON-RPC 2.0 over HTTP POST.
///
/// Endpoint and headers are interior-mutable so the owning client can
/// retarget the transport (protocol/domain/application changes) and arm or
/// disarm the session header without rebuilding it.
#[derive(Debug)]
pub struct HttpRpcTransport {
    http: Client,
    endpoint: RwLock<String>,
    headers: RwLock<BTreeMap<String, String>>,
    next_id: AtomicU64,
}

impl HttpRpcTransport {
    pub fn new(endpoint: impl Into<String>, cfg: &HttpConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: RwLock::new(endpoint.into()),
            headers: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        })
    }

    /// The URL calls are currently sent to.
    pub fn endpoint(&self) -> String {
        self.endpoint.read().clone()
    }

    /// Value of a configured header, if set.
    pub fn header(&self, name: &str) -> Option<String> {
        self.headers.read().get(&name.to_ascii_lowercase()).cloned()
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

#[async_trait]
impl RpcTransport for HttpRpcTransport {
    async fn call_method(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<Value, TransportError> {
        let id = self.next_request_id();
        let req = JsonRpcRequest::new(id, method, params);

        let url = self.endpoint();
        let headers: Vec<(String, String)> = self
            .headers
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mut rb = self
            .http
            .post(&url)
            .header("X-Trace-Id", Uuid::new_v4().to_string())
            .json(&req);
        for (name, value) in &headers {
            rb = rb.header(name, value);
        }

        tracing::debug!(id, method, url = %url, "sending JSON-RPC request");
        let resp = rb.send().await.map_err(from_reqwest)?;
        let status = resp.status();
        let body = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: JsonRpcResponse = serde_json::from_str(&body)
            .map_err(|e| TransportError::InvalidResponse(format!("{e}: {body}")))?;

        if let Some(resp_id) = parsed.id {
            if resp_id != id {
                return Err(TransportError::InvalidResponse(format!(
                    "response id {resp_id} does not match request id {id}"
                )));
            }
        }

        parsed.into_result().map_err(TransportError::Server)
    }

    fn set_endpoint(&self, url: &str) {
        *self.endpoint.write() = url.to_owned();
    }

    fn set_header(&self, name: &str, value: &str) {
        self.headers
            .write()
            .insert(name.to_ascii_lowercase(), value.to_owned());
    }

    fn remove_header(&self, name: &str) {
        self.headers.write().remove(&name.to_ascii_lowercase());
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message stream fetch
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Plain HTTP GET returning the body as text.
#[derive(Debug, Clone)]
pub struct HttpStreamFetcher {
    http: Client,
    timeout: Duration,
}

impl HttpStreamFetcher {
    pub fn new(cfg: &HttpConfig) -> Result<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            http,
            timeout: Duration::from_millis(cfg.poll_timeout_ms),
        })
    }

    /// The per-fetch timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl StreamFetcher for HttpStreamFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<String, TransportError> {
        let resp = self
            .http
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(String::new());
        }

        let body = resp.text().await.map_err(from_reqwest)?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Error conversion helper
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Convert a `reqwest::Error` into a [`TransportError`].
///
/// Timeout errors become `TransportError::Timeout`; everything else
/// becomes `TransportError::Connection`.
pub fn from_reqwest(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else {
        TransportError::Connection(e.to_string())
    }
}
