//! Connection settings and the URLs derived from them.

use mage_domain::config::{ConnectionSettings, PollTransport};
use mage_domain::error::{Error, Result};

use crate::protocol::SESSION_HEADER;

/// Identity of the MAGE endpoint plus the active session.
///
/// The RPC URL is cached and recomputed by every identifier setter. The
/// session key and the session header are tracked separately: clearing
/// the session disarms the header but keeps the key, which is still used
/// to build message stream URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    protocol: String,
    domain: String,
    application: String,
    session_key: Option<String>,
    header_armed: bool,
    rpc_url: String,
}

impl ConnectionConfig {
    pub fn new(
        protocol: impl Into<String>,
        domain: impl Into<String>,
        application: impl Into<String>,
    ) -> Self {
        let mut cfg = Self {
            protocol: protocol.into(),
            domain: domain.into(),
            application: application.into(),
            session_key: None,
            header_armed: false,
            rpc_url: String::new(),
        };
        cfg.recompute_url();
        cfg
    }

    /// Build from the `[connection]` config section, installing its
    /// session key when present.
    pub fn from_settings(settings: &ConnectionSettings) -> Self {
        let mut cfg = Self::new(
            settings.protocol.clone(),
            settings.domain.clone(),
            settings.application.clone(),
        );
        if let Some(key) = &settings.session_key {
            cfg.set_session(key.clone());
        }
        cfg
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn application(&self) -> &str {
        &self.application
    }

    pub fn set_protocol(&mut self, protocol: impl Into<String>) {
        self.protocol = protocol.into();
        self.recompute_url();
    }

    pub fn set_domain(&mut self, domain: impl Into<String>) {
        self.domain = domain.into();
        self.recompute_url();
    }

    pub fn set_application(&mut self, application: impl Into<String>) {
        self.application = application.into();
        self.recompute_url();
    }

    /// Store the session key and arm the session header.
    pub fn set_session(&mut self, key: impl Into<String>) {
        self.session_key = Some(key.into());
        self.header_armed = true;
    }

    /// Disarm the session header. The stored key is kept.
    pub fn clear_session(&mut self) {
        self.header_armed = false;
    }

    /// The stored session key, if any. Empty keys count as unset.
    pub fn session_key(&self) -> Option<&str> {
        self.session_key.as_deref().filter(|k| !k.is_empty())
    }

    pub fn has_session(&self) -> bool {
        self.session_key().is_some()
    }

    /// The `(name, value)` header to send with RPC calls, if armed.
    pub fn session_header(&self) -> Option<(&'static str, &str)> {
        if !self.header_armed {
            return None;
        }
        self.session_key.as_deref().map(|k| (SESSION_HEADER, k))
    }

    /// `protocol://domain/application/jsonrpc`
    pub fn url(&self) -> &str {
        &self.rpc_url
    }

    /// Build the message stream URL, acknowledging `confirm_ids` when any.
    ///
    /// Fails when no session key is stored.
    pub fn stream_url(&self, transport: PollTransport, confirm_ids: &[String]) -> Result<String> {
        let key = self
            .session_key()
            .ok_or_else(|| Error::Precondition("no session key registered".into()))?;

        let mut url = format!(
            "{}://{}/msgstream?transport={}&sessionKey={}",
            self.protocol,
            self.domain,
            transport.as_str(),
            key
        );
        if !confirm_ids.is_empty() {
            url.push_str("&confirmIds=");
            url.push_str(&confirm_ids.join(","));
        }
        Ok(url)
    }

    fn recompute_url(&mut self) {
        self.rpc_url = format!(
            "{}://{}/{}/jsonrpc",
            self.protocol, self.domain, self.application
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> ConnectionConfig {
        ConnectionConfig::new("http", "localhost:8080", "game")
    }

    #[test]
    fn builds_rpc_url() {
        assert_eq!(cfg().url(), "http://localhost:8080/game/jsonrpc");
    }

    #[test]
    fn setters_recompute_url() {
        let mut c = cfg();
        c.set_protocol("https");
        assert_eq!(c.url(), "https://localhost:8080/game/jsonrpc");
        c.set_domain("mage.example.com");
        assert_eq!(c.url(), "https://mage.example.com/game/jsonrpc");
        c.set_application("lobby");
        assert_eq!(c.url(), "https://mage.example.com/lobby/jsonrpc");
    }

    #[test]
    fn stream_url_requires_session() {
        let err = cfg()
            .stream_url(PollTransport::LongPolling, &[])
            .unwrap_err();
        assert!(matches!(err, Error::Precondition(_)));
    }

    #[test]
    fn empty_session_key_counts_as_unset() {
        let mut c = cfg();
        c.set_session("");
        assert!(!c.has_session());
        assert!(c.stream_url(PollTransport::ShortPolling, &[]).is_err());
    }

    #[test]
    fn stream_url_without_confirm_ids() {
        let mut c = cfg();
        c.set_session("abc");
        assert_eq!(
            c.stream_url(PollTransport::ShortPolling, &[]).unwrap(),
            "http://localhost:8080/msgstream?transport=shortpolling&sessionKey=abc"
        );
    }

    #[test]
    fn stream_url_with_confirm_ids() {
        let mut c = cfg();
        c.set_session("abc");
        let ids = vec!["m1".to_string(), "m2".to_string()];
        assert_eq!(
            c.stream_url(PollTransport::LongPolling, &ids).unwrap(),
            "http://localhost:8080/msgstream?transport=longpolling&sessionKey=abc&confirmIds=m1,m2"
        );
    }

    #[test]
    fn clear_session_keeps_key_for_polling() {
        let mut c = cfg();
        c.set_session("abc");
        assert_eq!(c.session_header(), Some((SESSION_HEADER, "abc")));

        c.clear_session();
        assert!(c.session_header().is_none());
        assert_eq!(c.session_key(), Some("abc"));
        assert!(c.stream_url(PollTransport::LongPolling, &[]).is_ok());
    }

    #[test]
    fn from_settings_installs_session() {
        let settings = ConnectionSettings {
            session_key: Some("k".into()),
            ..ConnectionSettings::default()
        };
        let c = ConnectionConfig::from_settings(&settings);
        assert_eq!(c.session_header(), Some((SESSION_HEADER, "k")));
        assert_eq!(c.url(), "http://localhost:8080/game/jsonrpc");
    }
}
