use serde::Serialize;

/// Where a dispatched event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    /// Embedded in a call response (`myEvents`).
    Inline,
    /// Delivered by the message stream poller.
    Stream,
    /// Dispatched directly by the application.
    Local,
}

/// Structured trace events emitted across all MAGE client crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RpcCall {
        method: String,
        ok: bool,
        duration_ms: u64,
    },
    InlineEventsExtracted {
        method: String,
        entries: usize,
        dispatched: usize,
    },
    EventDispatched {
        name: String,
        origin: EventOrigin,
        observers: usize,
    },
    CallbackSuppressed {
        task_id: u64,
        method: String,
    },
    StreamPulled {
        transport: String,
        messages: usize,
        confirmed: usize,
    },
    PollerStarted {
        transport: String,
    },
    PollerStopped {
        iterations: u64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "mage_event");
    }
}
