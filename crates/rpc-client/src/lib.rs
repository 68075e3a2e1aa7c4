//! `mage-rpc` — client runtime for MAGE application servers.
//!
//! A MAGE server exposes JSON-RPC 2.0 at `<protocol>://<domain>/<app>/jsonrpc`
//! and pushes asynchronous events two ways: inline, in the `myEvents` field
//! of a call response, and through a separate polled message stream at
//! `<protocol>://<domain>/msgstream`. This crate wraps both behind one
//! [`MageClient`].
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  MageClient                                                │
//! │                                                            │
//! │   call / call_async / call_with_callback / call_detached   │
//! │        │                                                   │
//! │        ▼                                                   │
//! │   RpcTransport ──► response ──► myEvents ─┐                │
//! │                                           ▼                │
//! │   EventPoller ──► StreamFetcher ──► EventDispatcher ──►    │
//! │   (task)          (msgstream)       observers, in order    │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Acknowledgment
//!
//! Message ids decoded from one stream fetch are sent back as `confirmIds`
//! on the next fetch and forgotten once that fetch succeeds. A failed fetch
//! keeps them, so the server may redeliver: delivery is at-least-once.
//!
//! # Cancellation
//!
//! Every submitted call gets a [`TaskId`]. Cancelling its [`CallHandle`]
//! never aborts the network round-trip; it only guarantees the completion
//! callback is not invoked.

pub mod builder;
pub mod cancel;
pub mod client;
pub mod connection;
pub mod events;
pub mod http;
pub mod poller;
pub mod protocol;
pub mod transport;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::MageClientBuilder;
pub use cancel::{CancellationTracker, TaskId};
pub use client::{CallHandle, CallMode, MageClient};
pub use connection::ConnectionConfig;
pub use events::{Event, EventDispatcher, EventObserver, ObserverId};
pub use http::{HttpRpcTransport, HttpStreamFetcher};
pub use poller::{EventPoller, PollerHandle, PollerSettings, PullOutcome};
pub use transport::{RpcTransport, StreamFetcher, TransportError};

// Re-export the shared domain types so callers need only this crate.
pub use mage_domain::config::{MageConfig, PollTransport};
pub use mage_domain::error::{Error, Result};
