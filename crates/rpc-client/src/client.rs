//! The MAGE client: call engine, connection control, observer registry
//! and message stream poller behind one cloneable handle.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use futures_util::future::BoxFuture;
use mage_domain::config::PollTransport;
use mage_domain::error::{Error, Result};
use mage_domain::trace::{EventOrigin, TraceEvent};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::builder::MageClientBuilder;
use crate::cancel::{CancellationTracker, TaskId};
use crate::connection::ConnectionConfig;
use crate::events::{EventDispatcher, EventObserver, ObserverId};
use crate::poller::{EventPoller, PollerHandle, PollerSettings};
use crate::protocol::{ERROR_CODE_FIELD, INLINE_EVENTS_FIELD, SESSION_HEADER};
use crate::transport::{RpcTransport, StreamFetcher};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Call handles
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// When a future-style call starts running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallMode {
    /// Spawned on the runtime immediately; runs whether or not it is awaited.
    #[default]
    Eager,
    /// Runs only when the handle is awaited, on the awaiting task.
    Lazy,
}

enum HandleState<T> {
    Spawned(JoinHandle<Result<T>>),
    Deferred(BoxFuture<'static, Result<T>>),
}

/// Handle to a submitted call.
///
/// Await it once with [`wait`](Self::wait), or give it up with
/// [`cancel`](Self::cancel). Dropping an eager handle detaches the call;
/// dropping a lazy one means it never runs.
pub struct CallHandle<T> {
    id: TaskId,
    tracker: Arc<CancellationTracker>,
    state: HandleState<T>,
}

/// Releases the tracker entry however the call future ends: completed,
/// dropped before running, or dropped mid-flight.
struct CompletionGuard {
    tracker: Arc<CancellationTracker>,
    id: TaskId,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.tracker.forget(self.id);
    }
}

impl<T: Send + 'static> CallHandle<T> {
    fn launch<F, Fut>(tracker: Arc<CancellationTracker>, mode: CallMode, make: F) -> Self
    where
        F: FnOnce(TaskId) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let id = tracker.register();
        let guard = CompletionGuard {
            tracker: Arc::clone(&tracker),
            id,
        };
        let call = make(id);
        let fut = async move {
            let _guard = guard;
            call.await
        };

        let state = match mode {
            CallMode::Eager => HandleState::Spawned(tokio::spawn(fut)),
            CallMode::Lazy => HandleState::Deferred(Box::pin(fut)),
        };
        Self { id, tracker, state }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn mode(&self) -> CallMode {
        match self.state {
            HandleState::Spawned(_) => CallMode::Eager,
            HandleState::Deferred(_) => CallMode::Lazy,
        }
    }

    /// `true` once an eager call has run to completion. Lazy calls only
    /// run inside [`wait`](Self::wait), so this is always `false` for them.
    pub fn is_finished(&self) -> bool {
        match &self.state {
            HandleState::Spawned(join) => join.is_finished(),
            HandleState::Deferred(_) => false,
        }
    }

    /// Wait for the call to resolve.
    pub async fn wait(self) -> Result<T> {
        match self.state {
            HandleState::Spawned(join) => join
                .await
                .map_err(|e| Error::Other(format!("call task {} failed: {e}", self.id)))?,
            HandleState::Deferred(fut) => fut.await,
        }
    }

    /// Give up on the call.
    ///
    /// An eager call that is still running keeps running to completion,
    /// but its completion callback (if any) is suppressed. A lazy call is
    /// discarded without ever running. Returns `false` when the call had
    /// already finished, so nothing was suppressed.
    pub fn cancel(self) -> bool {
        match self.state {
            HandleState::Spawned(join) => {
                if join.is_finished() {
                    return false;
                }
                let recorded = self.tracker.cancel(self.id);
                tracing::debug!(task = %self.id, recorded, "detached cancelled call");
                recorded
            }
            HandleState::Deferred(_) => true,
        }
    }
}

impl<T> std::fmt::Debug for CallHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mode = match self.state {
            HandleState::Spawned(_) => "eager",
            HandleState::Deferred(_) => "lazy",
        };
        f.debug_struct("CallHandle")
            .field("id", &self.id)
            .field("mode", &mode)
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Client
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Client for one MAGE application.
///
/// Cheap to clone; clones share connection settings, observers, the
/// cancellation tracker and the poller. When the last clone is dropped the
/// poller is asked to stop.
#[derive(Clone)]
pub struct MageClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    connection: Arc<RwLock<ConnectionConfig>>,
    rpc: Arc<dyn RpcTransport>,
    fetcher: Arc<dyn StreamFetcher>,
    dispatcher: Arc<EventDispatcher>,
    tracker: Arc<CancellationTracker>,
    poller_settings: PollerSettings,
    poller: Mutex<Option<PollerHandle>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if let Some(handle) = self.poller.get_mut().take() {
            handle.cancel();
        }
    }
}

impl MageClient {
    /// Start a new builder.
    pub fn builder() -> MageClientBuilder {
        MageClientBuilder::new()
    }

    /// HTTP client for `protocol://domain/application/jsonrpc` with default
    /// settings.
    pub fn new(
        protocol: impl Into<String>,
        domain: impl Into<String>,
        application: impl Into<String>,
    ) -> Result<Self> {
        MageClientBuilder::new()
            .protocol(protocol)
            .domain(domain)
            .application(application)
            .build()
    }

    pub(crate) fn from_parts(
        connection: ConnectionConfig,
        rpc: Arc<dyn RpcTransport>,
        fetcher: Arc<dyn StreamFetcher>,
        poller_settings: PollerSettings,
    ) -> Self {
        rpc.set_endpoint(connection.url());
        if let Some((name, value)) = connection.session_header() {
            rpc.set_header(name, value);
        }

        Self {
            inner: Arc::new(ClientInner {
                connection: Arc::new(RwLock::new(connection)),
                rpc,
                fetcher,
                dispatcher: Arc::new(EventDispatcher::new()),
                tracker: Arc::new(CancellationTracker::new()),
                poller_settings,
                poller: Mutex::new(None),
            }),
        }
    }

    // ── connection ───────────────────────────────────────────────────

    /// Snapshot of the current connection settings.
    pub fn connection(&self) -> ConnectionConfig {
        self.inner.connection.read().clone()
    }

    /// The RPC endpoint URL.
    pub fn url(&self) -> String {
        self.inner.connection.read().url().to_owned()
    }

    pub fn set_protocol(&self, protocol: impl Into<String>) {
        self.update_endpoint(|c| c.set_protocol(protocol));
    }

    pub fn set_domain(&self, domain: impl Into<String>) {
        self.update_endpoint(|c| c.set_domain(domain));
    }

    pub fn set_application(&self, application: impl Into<String>) {
        self.update_endpoint(|c| c.set_application(application));
    }

    fn update_endpoint(&self, apply: impl FnOnce(&mut ConnectionConfig)) {
        let url = {
            let mut conn = self.inner.connection.write();
            apply(&mut conn);
            conn.url().to_owned()
        };
        tracing::debug!(url = %url, "RPC endpoint changed");
        self.inner.rpc.set_endpoint(&url);
    }

    /// Store the session key and send it as `X-MAGE-SESSION` from now on.
    /// A running poller picks the new key up on its next fetch.
    pub fn set_session(&self, key: impl Into<String>) {
        let key = key.into();
        self.inner.connection.write().set_session(key.clone());
        self.inner.rpc.set_header(SESSION_HEADER, &key);
    }

    /// Stop sending the session header. The key is kept for polling.
    pub fn clear_session(&self) {
        self.inner.connection.write().clear_session();
        self.inner.rpc.remove_header(SESSION_HEADER);
    }

    pub fn session_key(&self) -> Option<String> {
        self.inner.connection.read().session_key().map(str::to_owned)
    }

    // ── observers ────────────────────────────────────────────────────

    pub fn add_observer(&self, observer: Arc<dyn EventObserver>) -> ObserverId {
        self.inner.dispatcher.add_observer(observer)
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.inner.dispatcher.remove_observer(id)
    }

    pub fn dispatcher(&self) -> &Arc<EventDispatcher> {
        &self.inner.dispatcher
    }

    pub fn cancellation_tracker(&self) -> &Arc<CancellationTracker> {
        &self.inner.tracker
    }

    // ── calls ────────────────────────────────────────────────────────

    /// Call `name(params)` and wait for the outcome.
    ///
    /// Inline events carried by a successful response are dispatched to
    /// every observer before this returns, and the `myEvents` field is
    /// removed from the returned payload.
    pub async fn call(&self, name: &str, params: Value) -> Result<Value> {
        let start = Instant::now();
        let outcome = self.inner.rpc.call_method(name, params).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = outcome
            .map_err(Error::from)
            .and_then(|res| self.process_response(name, res));

        if let Err(e) = &result {
            tracing::debug!(method = name, error = %e, "call failed");
        }
        TraceEvent::RpcCall {
            method: name.to_owned(),
            ok: result.is_ok(),
            duration_ms,
        }
        .emit();

        result
    }

    fn process_response(&self, method: &str, mut res: Value) -> Result<Value> {
        if let Some(code) = res.get(ERROR_CODE_FIELD) {
            return Err(Error::Application {
                code: error_code_string(code),
            });
        }

        let inline = match res.as_object_mut() {
            Some(obj) if obj.get(INLINE_EVENTS_FIELD).is_some_and(Value::is_array) => {
                obj.remove(INLINE_EVENTS_FIELD)
            }
            _ => None,
        };

        if let Some(Value::Array(entries)) = inline {
            let dispatched = self
                .inner
                .dispatcher
                .extract_and_dispatch(&entries, EventOrigin::Inline);
            TraceEvent::InlineEventsExtracted {
                method: method.to_owned(),
                entries: entries.len(),
                dispatched,
            }
            .emit();
        }

        Ok(res)
    }

    /// Future-style call. See [`CallMode`] for when it runs.
    pub fn call_async(&self, name: &str, params: Value, mode: CallMode) -> CallHandle<Value> {
        let client = self.clone();
        let method = name.to_owned();
        CallHandle::launch(Arc::clone(&self.inner.tracker), mode, move |_| async move {
            client.call(&method, params).await
        })
    }

    /// Call and hand the outcome to `on_complete`, exactly once, from the
    /// executing task. If the handle is cancelled before the call
    /// completes, `on_complete` is never invoked.
    pub fn call_with_callback<F>(
        &self,
        name: &str,
        params: Value,
        on_complete: F,
        mode: CallMode,
    ) -> CallHandle<()>
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        let client = self.clone();
        let method = name.to_owned();
        let tracker = Arc::clone(&self.inner.tracker);
        CallHandle::launch(Arc::clone(&tracker), mode, move |id| async move {
            let result = client.call(&method, params).await;
            if tracker.is_cancelled_and_consume(id) {
                tracing::debug!(task = %id, method = %method, "suppressing cancelled callback");
                TraceEvent::CallbackSuppressed {
                    task_id: id.as_u64(),
                    method,
                }
                .emit();
                return Ok(());
            }
            on_complete(result);
            Ok(())
        })
    }

    /// Fire-and-forget callback call, spawned immediately. Keep the handle
    /// only to cancel it; dropping it lets the call finish on its own.
    pub fn call_detached<F>(&self, name: &str, params: Value, on_complete: F) -> CallHandle<()>
    where
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        self.call_with_callback(name, params, on_complete, CallMode::Eager)
    }

    // ── message stream ───────────────────────────────────────────────

    /// Spawn the message stream poller.
    ///
    /// Fails when no session key is stored or a poller is already running.
    pub fn start_polling(&self, transport: PollTransport) -> Result<()> {
        let mut slot = self.inner.poller.lock();
        if slot.as_ref().is_some_and(|h| !h.is_finished()) {
            return Err(Error::Precondition(
                "message stream poller already running".into(),
            ));
        }
        if !self.inner.connection.read().has_session() {
            return Err(Error::Precondition("no session key registered".into()));
        }

        let poller = EventPoller::new(
            Arc::clone(&self.inner.connection),
            Arc::clone(&self.inner.fetcher),
            Arc::clone(&self.inner.dispatcher),
            self.inner.poller_settings.with_transport(transport),
        );
        tracing::info!(%transport, "starting message stream poller");
        *slot = Some(poller.spawn(CancellationToken::new()));
        Ok(())
    }

    /// Stop the poller and wait for it to exit. Returns `false` when no
    /// poller was running.
    pub async fn stop_polling(&self) -> bool {
        let handle = self.inner.poller.lock().take();
        match handle {
            Some(handle) => {
                handle.stop().await;
                true
            }
            None => false,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.inner
            .poller
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl std::fmt::Debug for MageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MageClient")
            .field("url", &self.url())
            .field("observers", &self.inner.dispatcher.observer_count())
            .field("polling", &self.is_polling())
            .finish()
    }
}

fn error_code_string(code: &Value) -> String {
    match code {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
