/// Shared error type used across all MAGE client crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Transport or JSON-RPC protocol fault (connection refused, invalid
    /// response, server-side JSON-RPC error object).
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// The server answered, but the payload carried an `errorCode` field.
    #[error("application error: {code}")]
    Application { code: String },

    #[error("decode: {0}")]
    Decode(String),

    /// The operation was attempted in a state that cannot succeed
    /// (no session key, unknown transport mode, poller already running).
    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// `true` for failures reported by the application itself (`errorCode`).
    pub fn is_application(&self) -> bool {
        matches!(self, Error::Application { .. })
    }

    /// `true` for transport-level and JSON-RPC protocol failures.
    pub fn is_rpc(&self) -> bool {
        matches!(self, Error::Rpc { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_display() {
        let err = Error::Rpc {
            code: -32003,
            message: "connection refused".into(),
        };
        assert_eq!(err.to_string(), "RPC error -32003: connection refused");
        assert!(err.is_rpc());
        assert!(!err.is_application());
    }

    #[test]
    fn application_error_display() {
        let err = Error::Application {
            code: "notLoggedIn".into(),
        };
        assert_eq!(err.to_string(), "application error: notLoggedIn");
        assert!(err.is_application());
    }
}
