use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// MAGE endpoint identity
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Where the MAGE server lives and which application to talk to.
///
/// The RPC endpoint is `{protocol}://{domain}/{application}/jsonrpc`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "d_protocol")]
    pub protocol: String,
    /// Host, optionally with a port (`localhost:8080`).
    #[serde(default = "d_domain")]
    pub domain: String,
    #[serde(default = "d_application")]
    pub application: String,
    /// Session key to install at startup. Normally obtained at runtime
    /// from a login call instead.
    #[serde(default)]
    pub session_key: Option<String>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            protocol: d_protocol(),
            domain: d_domain(),
            application: d_application(),
            session_key: None,
        }
    }
}

fn d_protocol() -> String {
    "http".into()
}
fn d_domain() -> String {
    "localhost:8080".into()
}
fn d_application() -> String {
    "game".into()
}
