use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTTP transport tuning
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Timeout applied to JSON-RPC calls.
    #[serde(default = "d_30000")]
    pub request_timeout_ms: u64,
    /// Timeout applied to message stream fetches. Long-polling holds the
    /// request open server-side, so this must exceed the server's hold time.
    #[serde(default = "d_65000")]
    pub poll_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: d_30000(),
            poll_timeout_ms: d_65000(),
        }
    }
}

fn d_30000() -> u64 {
    30_000
}
fn d_65000() -> u64 {
    65_000
}
