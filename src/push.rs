//! Reconnecting push channel carrying server-initiated game events.
//!
//! [`PushChannel`] owns a background tokio task that dials the server
//! through its [`Connector`], reads JSON text messages, and dispatches them
//! to registered handlers. When the connection drops it redials after a
//! fixed delay, up to a bounded number of attempts; a successful open
//! resets the counter. [`disconnect`](PushChannel::disconnect) tears the
//! task down and cancels any pending reconnect.
//!
//! Handlers run on the channel task in registration order. A panicking
//! handler is isolated so the remaining handlers and the read loop keep
//! going.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::BingoConfig;
use crate::protocol::{PushEventKind, PushMessage};
use crate::transport::{Connector, Transport};

/// Lifecycle state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Never connected.
    Idle,
    /// A connect attempt is in flight.
    Connecting,
    /// Connected; messages are flowing.
    Open,
    /// Disconnected: waiting to reconnect, out of attempts, or shut down.
    Closed,
}

/// Opaque handle for unregistering a handler via [`PushChannel::off`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type Handler = Arc<dyn Fn(&PushMessage) + Send + Sync>;
type HandlerRegistry = Mutex<HashMap<PushEventKind, Vec<(HandlerId, Handler)>>>;

/// The push channel: a self-healing subscription to server game events.
pub struct PushChannel {
    connector: Arc<dyn Connector>,
    reconnect_delay: Duration,
    max_reconnect_attempts: u32,
    handlers: Arc<HandlerRegistry>,
    next_handler_id: AtomicU64,
    state_tx: watch::Sender<ChannelState>,
    task: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: Mutex<Option<watch::Sender<bool>>>,
}

impl PushChannel {
    pub fn new(connector: Arc<dyn Connector>, config: &BingoConfig) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Idle);
        Self {
            connector,
            reconnect_delay: config.reconnect_delay,
            max_reconnect_attempts: config.max_reconnect_attempts,
            handlers: Arc::new(Mutex::new(HashMap::new())),
            next_handler_id: AtomicU64::new(1),
            state_tx,
            task: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
        }
    }

    /// The current channel state.
    pub fn state(&self) -> ChannelState {
        *self.state_tx.borrow()
    }

    /// Subscribes to channel state transitions.
    pub fn state_watch(&self) -> watch::Receiver<ChannelState> {
        self.state_tx.subscribe()
    }

    /// Registers a handler for one event kind. Handlers for the same kind
    /// run in registration order.
    pub fn on(
        &self,
        kind: PushEventKind,
        handler: impl Fn(&PushMessage) + Send + Sync + 'static,
    ) -> HandlerId {
        let id = HandlerId(self.next_handler_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Unregisters a handler. Unknown ids are ignored.
    pub fn off(&self, kind: PushEventKind, id: HandlerId) {
        if let Some(handlers) = self.handlers.lock().get_mut(&kind) {
            handlers.retain(|(handler_id, _)| *handler_id != id);
        }
    }

    /// Starts the channel task. A no-op while a task is already running, so
    /// repeated calls never stack connections.
    pub fn connect(&self) {
        let mut task_slot = self.task.lock();
        if let Some(task) = task_slot.as_ref() {
            if !task.is_finished() {
                debug!("push channel already running");
                return;
            }
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let connector = Arc::clone(&self.connector);
        let handlers = Arc::clone(&self.handlers);
        let state_tx = self.state_tx.clone();
        let delay = self.reconnect_delay;
        let max_attempts = self.max_reconnect_attempts;
        *task_slot = Some(tokio::spawn(run_loop(
            connector,
            handlers,
            state_tx,
            shutdown_rx,
            delay,
            max_attempts,
        )));
    }

    /// Stops the channel task and cancels any pending reconnect. The state
    /// becomes [`ChannelState::Closed`] and stays there until the next
    /// [`connect`](Self::connect).
    pub fn disconnect(&self) {
        debug!("push channel disconnect requested");
        if let Some(shutdown_tx) = self.shutdown_tx.lock().take() {
            let _ = shutdown_tx.send(true);
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        if self.state() != ChannelState::Idle {
            let _ = self.state_tx.send(ChannelState::Closed);
        }
    }
}

impl Drop for PushChannel {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for PushChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushChannel")
            .field("state", &self.state())
            .finish()
    }
}

enum SessionEnd {
    /// Shutdown was requested while reading.
    Shutdown,
    /// The server closed the connection or the transport failed.
    Dropped,
}

async fn run_loop(
    connector: Arc<dyn Connector>,
    handlers: Arc<HandlerRegistry>,
    state_tx: watch::Sender<ChannelState>,
    mut shutdown_rx: watch::Receiver<bool>,
    delay: Duration,
    max_attempts: u32,
) {
    // Reconnects performed since the last successful open. The initial
    // connect is not counted.
    let mut attempts: u32 = 0;
    loop {
        let _ = state_tx.send(ChannelState::Connecting);
        match connector.connect().await {
            Ok(mut transport) => {
                info!("push channel open");
                let _ = state_tx.send(ChannelState::Open);
                attempts = 0;
                let end = read_until_closed(transport.as_mut(), &handlers, &mut shutdown_rx).await;
                let _ = transport.close().await;
                if matches!(end, SessionEnd::Shutdown) {
                    let _ = state_tx.send(ChannelState::Closed);
                    return;
                }
            }
            Err(err) => {
                warn!(error = %err, "push channel connect failed");
            }
        }

        let _ = state_tx.send(ChannelState::Closed);
        if *shutdown_rx.borrow() {
            return;
        }
        if attempts >= max_attempts {
            warn!(attempts, "push channel out of reconnect attempts, staying closed");
            return;
        }
        attempts += 1;
        debug!(attempt = attempts, max = max_attempts, "push channel reconnecting after delay");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown_rx.changed() => return,
        }
    }
}

async fn read_until_closed(
    transport: &mut dyn Transport,
    handlers: &HandlerRegistry,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionEnd {
    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => return SessionEnd::Shutdown,
            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => dispatch(handlers, &text),
                Some(Err(err)) => {
                    warn!(error = %err, "push channel transport error");
                    return SessionEnd::Dropped;
                }
                None => {
                    debug!("push channel closed by server");
                    return SessionEnd::Dropped;
                }
            }
        }
    }
}

fn dispatch(handlers: &HandlerRegistry, text: &str) {
    let message: PushMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "dropping unparseable push message");
            return;
        }
    };
    let Some(kind) = message.event_kind() else {
        warn!(kind = %message.kind, "dropping push message of unknown kind");
        return;
    };

    // Snapshot under the lock, run without it, so handlers may register or
    // unregister handlers themselves.
    let snapshot: Vec<Handler> = handlers
        .lock()
        .get(&kind)
        .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
        .unwrap_or_default();

    debug!(kind = kind.name(), handlers = snapshot.len(), "dispatching push message");
    for handler in snapshot {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&message)));
        if outcome.is_err() {
            error!(kind = kind.name(), "push handler panicked, continuing with remaining handlers");
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn registry_with(
        kind: PushEventKind,
        handler: impl Fn(&PushMessage) + Send + Sync + 'static,
    ) -> Arc<HandlerRegistry> {
        let registry: Arc<HandlerRegistry> = Arc::new(Mutex::new(HashMap::new()));
        registry
            .lock()
            .entry(kind)
            .or_default()
            .push((HandlerId(1), Arc::new(handler)));
        registry
    }

    #[test]
    fn dispatch_routes_by_kind() {
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let registry = registry_with(PushEventKind::ItemMarked, move |msg| {
            seen_clone.lock().push(msg.item_id());
        });

        dispatch(&registry, r#"{"type":"item_marked","item":"First blood"}"#);
        dispatch(&registry, r#"{"type":"item_unmarked","item":"ignored"}"#);

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].as_deref(), Some("First blood"));
    }

    #[test]
    fn dispatch_drops_unknown_kinds_and_bad_json() {
        let count = Arc::new(AtomicU64::new(0));
        let count_clone = Arc::clone(&count);
        let registry = registry_with(PushEventKind::ItemMarked, move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        dispatch(&registry, r#"{"type":"brand_new_event"}"#);
        dispatch(&registry, "not json at all");
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_handler_does_not_stop_later_handlers() {
        let registry: Arc<HandlerRegistry> = Arc::new(Mutex::new(HashMap::new()));
        let count = Arc::new(AtomicU64::new(0));
        {
            let mut handlers = registry.lock();
            let list = handlers.entry(PushEventKind::InitialState).or_default();
            list.push((
                HandlerId(1),
                Arc::new(|_: &PushMessage| panic!("handler bug")),
            ));
            let count_clone = Arc::clone(&count);
            list.push((
                HandlerId(2),
                Arc::new(move |_: &PushMessage| {
                    count_clone.fetch_add(1, Ordering::SeqCst);
                }),
            ));
        }

        dispatch(&registry, r#"{"type":"initial_state","marked_items":[]}"#);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handlers_run_in_registration_order_and_off_removes() {
        let order = Arc::new(PlMutex::new(Vec::new()));
        let connector = Arc::new(NeverConnector);
        let channel = PushChannel::new(connector, &BingoConfig::default());

        let order_a = Arc::clone(&order);
        let _a = channel.on(PushEventKind::ItemMarked, move |_| order_a.lock().push("a"));
        let order_b = Arc::clone(&order);
        let b = channel.on(PushEventKind::ItemMarked, move |_| order_b.lock().push("b"));

        dispatch(&channel.handlers, r#"{"type":"item_marked","item":"x"}"#);
        assert_eq!(*order.lock(), vec!["a", "b"]);

        channel.off(PushEventKind::ItemMarked, b);
        dispatch(&channel.handlers, r#"{"type":"item_marked","item":"y"}"#);
        assert_eq!(*order.lock(), vec!["a", "b", "a"]);
    }

    struct NeverConnector;

    #[async_trait::async_trait]
    impl Connector for NeverConnector {
        async fn connect(
            &self,
        ) -> Result<Box<dyn Transport>, crate::error::BingoClientError> {
            Err(crate::error::BingoClientError::TransportFailure(
                "unreachable".into(),
            ))
        }
    }
}
