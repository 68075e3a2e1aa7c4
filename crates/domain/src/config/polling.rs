use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message stream polling
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the message stream is pulled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PollTransport {
    /// Fixed-interval fetches; the server answers immediately.
    #[serde(rename = "shortpolling")]
    ShortPolling,
    /// The server holds each fetch open until data arrives or it times out.
    #[default]
    #[serde(rename = "longpolling")]
    LongPolling,
}

impl PollTransport {
    /// Value of the `transport` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            PollTransport::ShortPolling => "shortpolling",
            PollTransport::LongPolling => "longpolling",
        }
    }
}

impl fmt::Display for PollTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PollTransport {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shortpolling" | "short" => Ok(PollTransport::ShortPolling),
            "longpolling" | "long" => Ok(PollTransport::LongPolling),
            other => Err(Error::Precondition(format!(
                "unsupported message stream transport: {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default)]
    pub transport: PollTransport,
    /// Pause between short-polling fetches.
    #[serde(default = "d_5")]
    pub short_interval_secs: u64,
    /// Pause after a failed fetch before trying again.
    #[serde(default = "d_1000")]
    pub error_delay_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            transport: PollTransport::default(),
            short_interval_secs: d_5(),
            error_delay_ms: d_1000(),
        }
    }
}

fn d_5() -> u64 {
    5
}
fn d_1000() -> u64 {
    1000
}
