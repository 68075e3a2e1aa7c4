//! Builder pattern for constructing a [`MageClient`].

use std::sync::Arc;
use std::time::Duration;

use mage_domain::config::{ConnectionSettings, HttpConfig, MageConfig, PollTransport, PollingConfig};
use mage_domain::error::{Error, Result};

use crate::client::MageClient;
use crate::connection::ConnectionConfig;
use crate::http::{HttpRpcTransport, HttpStreamFetcher};
use crate::poller::PollerSettings;
use crate::transport::{RpcTransport, StreamFetcher};

/// Fluent builder for [`MageClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use mage_rpc::MageClientBuilder;
/// let client = MageClientBuilder::new()
///     .protocol("https")
///     .domain("mage.example.com")
///     .application("game")
///     .session_key("3f1c9a")
///     .build()
///     .unwrap();
/// ```
pub struct MageClientBuilder {
    connection: ConnectionSettings,
    polling: PollingConfig,
    http: HttpConfig,
    rpc: Option<Arc<dyn RpcTransport>>,
    fetcher: Option<Arc<dyn StreamFetcher>>,
}

impl MageClientBuilder {
    pub fn new() -> Self {
        Self {
            connection: ConnectionSettings::default(),
            polling: PollingConfig::default(),
            http: HttpConfig::default(),
            rpc: None,
            fetcher: None,
        }
    }

    /// Start from a loaded config file.
    pub fn from_config(cfg: &MageConfig) -> Self {
        Self {
            connection: cfg.connection.clone(),
            polling: cfg.polling.clone(),
            http: cfg.http.clone(),
            rpc: None,
            fetcher: None,
        }
    }

    // ── Endpoint ─────────────────────────────────────────────────────

    /// URL scheme, e.g. `http` or `https`.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.connection.protocol = protocol.into();
        self
    }

    /// Host, optionally with a port (`localhost:8080`).
    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.connection.domain = domain.into();
        self
    }

    /// Application path segment.
    pub fn application(mut self, application: impl Into<String>) -> Self {
        self.connection.application = application.into();
        self
    }

    /// Start with a session already registered.
    pub fn session_key(mut self, key: impl Into<String>) -> Self {
        self.connection.session_key = Some(key.into());
        self
    }

    // ── Polling ──────────────────────────────────────────────────────

    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Default transport used when the poller is started from config.
    pub fn poll_transport(mut self, transport: PollTransport) -> Self {
        self.polling.transport = transport;
        self
    }

    /// Pause after a failed stream fetch (default 1s).
    pub fn error_delay(mut self, delay: Duration) -> Self {
        self.polling.error_delay_ms = delay.as_millis() as u64;
        self
    }

    // ── Transports ───────────────────────────────────────────────────

    pub fn http(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Use a custom RPC transport instead of the reqwest one.
    pub fn rpc_transport(mut self, transport: Arc<dyn RpcTransport>) -> Self {
        self.rpc = Some(transport);
        self
    }

    /// Use a custom stream fetcher instead of the reqwest one.
    pub fn stream_fetcher(mut self, fetcher: Arc<dyn StreamFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    /// Build the [`MageClient`].
    pub fn build(self) -> Result<MageClient> {
        for (field, value) in [
            ("protocol", &self.connection.protocol),
            ("domain", &self.connection.domain),
            ("application", &self.connection.application),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Config(format!("{field} is required")));
            }
        }

        let connection = ConnectionConfig::from_settings(&self.connection);

        let rpc: Arc<dyn RpcTransport> = match self.rpc {
            Some(rpc) => rpc,
            None => Arc::new(HttpRpcTransport::new(connection.url(), &self.http)?),
        };
        let fetcher: Arc<dyn StreamFetcher> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => Arc::new(HttpStreamFetcher::new(&self.http)?),
        };

        Ok(MageClient::from_parts(
            connection,
            rpc,
            fetcher,
            PollerSettings::from_config(&self.polling),
        ))
    }
}

impl Default for MageClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
