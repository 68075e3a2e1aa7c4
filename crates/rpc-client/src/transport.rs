//! Transport seams.
//!
//! The client never speaks HTTP directly; it goes through two traits so
//! tests (and embedders with their own networking) can substitute them:
//! - [`RpcTransport`]: one JSON-RPC round-trip, plus the mutable endpoint
//!   and header set the connection settings are pushed into.
//! - [`StreamFetcher`]: one blocking text fetch of the message stream.
//!
//! The reqwest-backed implementations live in [`crate::http`].

use async_trait::async_trait;
use mage_domain::error::Error;
use serde_json::Value;

use crate::protocol::{JsonRpcError, ERROR_CLIENT_CONNECTOR, ERROR_CLIENT_INVALID_RESPONSE};

/// Performs remote procedure calls against the current endpoint.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Send `method(params)` and wait for the `result` value.
    async fn call_method(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Point subsequent calls at `url`.
    fn set_endpoint(&self, url: &str);

    /// Add (or replace) a header sent with every subsequent call.
    fn set_header(&self, name: &str, value: &str);

    /// Stop sending `name` with subsequent calls.
    fn remove_header(&self, name: &str);
}

/// Fetches the raw message stream body for a fully-built URL.
#[async_trait]
pub trait StreamFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, TransportError>;
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The server answered with a JSON-RPC error object.
    #[error(transparent)]
    Server(#[from] JsonRpcError),
}

impl TransportError {
    /// JSON-RPC error code reported for this failure.
    pub fn code(&self) -> i64 {
        match self {
            TransportError::Connection(_)
            | TransportError::Timeout(_)
            | TransportError::Status { .. } => ERROR_CLIENT_CONNECTOR,
            TransportError::InvalidResponse(_) => ERROR_CLIENT_INVALID_RESPONSE,
            TransportError::Server(e) => e.code,
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Server(err) => Error::Rpc {
                code: err.code,
                message: err.message,
            },
            other => Error::Rpc {
                code: other.code(),
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_keeps_code_and_message() {
        let err: Error = TransportError::Server(JsonRpcError {
            code: -32601,
            message: "Method not found".into(),
            data: None,
        })
        .into();
        match err {
            Error::Rpc { code, message } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
            }
            other => panic!("expected Rpc, got {other:?}"),
        }
    }

    #[test]
    fn connection_failures_use_connector_code() {
        let err: Error = TransportError::Connection("refused".into()).into();
        assert!(matches!(err, Error::Rpc { code: ERROR_CLIENT_CONNECTOR, .. }));

        let err: Error = TransportError::Status {
            status: 502,
            body: "bad gateway".into(),
        }
        .into();
        assert!(matches!(err, Error::Rpc { code: ERROR_CLIENT_CONNECTOR, .. }));
    }

    #[test]
    fn invalid_response_code() {
        let err = TransportError::InvalidResponse("not json".into());
        assert_eq!(err.code(), ERROR_CLIENT_INVALID_RESPONSE);
    }
}
