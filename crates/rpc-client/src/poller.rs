//! Background message stream poller.
//!
//! One loop per client. Each iteration:
//! 1. builds the stream URL from the *current* connection settings and the
//!    ids decoded by the previous successful fetch (`confirmIds`),
//! 2. performs one fetch,
//! 3. on success forgets the confirmed ids, then ignores empty/heartbeat
//!    bodies or decodes `{messageId: [entry, ...]}`, dispatching every
//!    entry and remembering each message id for the next fetch,
//! 4. pauses: short-polling waits a fixed interval, long-polling goes
//!    straight back (the server holds the fetch open).
//!
//! A failed fetch keeps the pending ids so they are sent again. A body that
//! cannot be decoded costs only that iteration. Nothing but cancellation
//! ends the loop.

use std::sync::Arc;
use std::time::Duration;

use mage_domain::config::{PollTransport, PollingConfig};
use mage_domain::error::{Error, Result};
use mage_domain::trace::{EventOrigin, TraceEvent};
use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::connection::ConnectionConfig;
use crate::events::EventDispatcher;
use crate::protocol::HEARTBEAT;
use crate::transport::StreamFetcher;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Settings
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pacing for the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    pub transport: PollTransport,
    /// Pause between short-polling fetches.
    pub short_interval: Duration,
    /// Pause after a failed fetch.
    pub error_delay: Duration,
}

impl PollerSettings {
    pub fn from_config(cfg: &PollingConfig) -> Self {
        Self {
            transport: cfg.transport,
            short_interval: Duration::from_secs(cfg.short_interval_secs),
            error_delay: Duration::from_millis(cfg.error_delay_ms),
        }
    }

    /// Same pacing, different transport.
    pub fn with_transport(self, transport: PollTransport) -> Self {
        Self { transport, ..self }
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Acknowledgment state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Message ids awaiting acknowledgment on the next fetch, in the order
/// they were consumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmSet {
    ids: Vec<String>,
}

impl ConfirmSet {
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    fn push(&mut self, id: String) {
        if !self.ids.contains(&id) {
            self.ids.push(id);
        }
    }

    fn clear(&mut self) {
        self.ids.clear();
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Batch decoding
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One message from a stream batch, with its raw event entries.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub id: String,
    pub entries: Vec<Value>,
}

/// Decode a non-empty, non-heartbeat stream body.
///
/// The body must be a JSON object. A message whose value is not a list
/// yields no entries; it is still returned so it gets acknowledged.
pub fn decode_batch(body: &str) -> Result<Vec<PendingMessage>> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| Error::Decode(format!("unreadable message stream body: {e}")))?;

    let messages = match value {
        Value::Object(messages) => messages,
        other => {
            return Err(Error::Decode(format!(
                "message stream body is not an object: {other}"
            )))
        }
    };

    Ok(messages
        .into_iter()
        .map(|(id, entries)| {
            let entries = match entries {
                Value::Array(items) => items,
                other => {
                    tracing::warn!(message_id = %id, body = %other, "message has no event list");
                    Vec::new()
                }
            };
            PendingMessage { id, entries }
        })
        .collect())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Poller
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What a single fetch produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Empty body or heartbeat.
    Idle,
    /// The body could not be decoded; nothing was dispatched.
    Malformed,
    Delivered { messages: usize, events: usize },
}

/// The poll loop state: shared handles plus the pending [`ConfirmSet`].
pub struct EventPoller {
    connection: Arc<RwLock<ConnectionConfig>>,
    fetcher: Arc<dyn StreamFetcher>,
    dispatcher: Arc<EventDispatcher>,
    settings: PollerSettings,
    confirm: ConfirmSet,
}

impl EventPoller {
    pub fn new(
        connection: Arc<RwLock<ConnectionConfig>>,
        fetcher: Arc<dyn StreamFetcher>,
        dispatcher: Arc<EventDispatcher>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            connection,
            fetcher,
            dispatcher,
            settings,
            confirm: ConfirmSet::default(),
        }
    }

    pub fn settings(&self) -> PollerSettings {
        self.settings
    }

    /// Ids that the next fetch will acknowledge.
    pub fn pending_confirmations(&self) -> &ConfirmSet {
        &self.confirm
    }

    /// Perform one fetch and dispatch whatever it carried.
    ///
    /// Errors are a missing session key or a failed fetch; in both cases
    /// the pending confirmations are left untouched.
    pub async fn pull_events(&mut self) -> Result<PullOutcome> {
        let url = self
            .connection
            .read()
            .stream_url(self.settings.transport, self.confirm.ids())?;

        tracing::debug!(url = %url, pending = self.confirm.len(), "fetching message stream");
        let body = self.fetcher.fetch(&url).await.map_err(Error::from)?;

        // The fetch carried the pending ids, so they are acknowledged now.
        let confirmed = self.confirm.len();
        self.confirm.clear();

        let body = body.trim();
        if body.is_empty() || body == HEARTBEAT {
            tracing::trace!(confirmed, "message stream idle");
            return Ok(PullOutcome::Idle);
        }

        let batch = match decode_batch(body) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable message stream batch");
                return Ok(PullOutcome::Malformed);
            }
        };

        let messages = batch.len();
        let mut events = 0;
        for message in batch {
            events += self
                .dispatcher
                .extract_and_dispatch(&message.entries, EventOrigin::Stream);
            self.confirm.push(message.id);
        }

        TraceEvent::StreamPulled {
            transport: self.settings.transport.to_string(),
            messages,
            confirmed,
        }
        .emit();

        Ok(PullOutcome::Delivered { messages, events })
    }

    /// Loop until `shutdown` is cancelled. Returns the number of fetches
    /// attempted.
    pub async fn run(mut self, shutdown: CancellationToken) -> u64 {
        TraceEvent::PollerStarted {
            transport: self.settings.transport.to_string(),
        }
        .emit();

        let mut iterations: u64 = 0;
        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let outcome = tokio::select! {
                r = self.pull_events() => r,
                _ = shutdown.cancelled() => break,
            };
            iterations += 1;

            let pause = match outcome {
                Ok(_) => match self.settings.transport {
                    PollTransport::ShortPolling => Some(self.settings.short_interval),
                    PollTransport::LongPolling => None,
                },
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        pending = self.confirm.len(),
                        "message stream fetch failed"
                    );
                    Some(self.settings.error_delay)
                }
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = tokio::time::sleep(pause) => {}
                    _ = shutdown.cancelled() => break,
                }
            } else {
                // Let other tasks run even if the fetcher resolves instantly.
                tokio::task::yield_now().await;
            }
        }

        tracing::info!(iterations, "message stream poller stopped");
        TraceEvent::PollerStopped { iterations }.emit();
        iterations
    }

    /// Spawn [`run`](Self::run) on the Tokio runtime.
    pub fn spawn(self, shutdown: CancellationToken) -> PollerHandle {
        let transport = self.settings.transport;
        let join = tokio::spawn(self.run(shutdown.clone()));
        PollerHandle {
            transport,
            shutdown,
            join,
        }
    }
}

/// Control handle for a spawned poll loop.
#[derive(Debug)]
pub struct PollerHandle {
    transport: PollTransport,
    shutdown: CancellationToken,
    join: JoinHandle<u64>,
}

impl PollerHandle {
    pub fn transport(&self) -> PollTransport {
        self.transport
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Request termination without waiting for it.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    /// Request termination and wait for the loop to exit. An in-flight
    /// fetch is abandoned.
    pub async fn stop(self) -> u64 {
        self.shutdown.cancel();
        match self.join.await {
            Ok(iterations) => iterations,
            Err(e) => {
                tracing::error!(error = %e, "message stream poller task failed");
                0
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
