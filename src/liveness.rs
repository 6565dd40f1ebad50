//! Periodic health probe reflecting server reachability.
//!
//! [`LivenessMonitor`] polls `GET /api/health` on a fixed interval with a
//! per-probe timeout and publishes a tri-state [`Connectivity`] value.
//! Transitions are edge-triggered: one notification when the connection is
//! lost, one when it comes back. On recovery it refetches the user if a
//! token is held but the user is missing, healing sessions that started
//! while the server was down.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::BingoConfig;
use crate::http::HttpClient;
use crate::notify::{Notifier, Severity};
use crate::session::SessionManager;

/// Server reachability as seen by the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    /// No probe has completed yet.
    Checking,
    /// The last probe succeeded.
    Connected,
    /// The last probe failed.
    Disconnected,
}

/// Background health probe. One probe runs at a time; a slow probe delays
/// the next tick rather than overlapping it.
pub struct LivenessMonitor {
    http: HttpClient,
    // Weak: the session holds this monitor for teardown, so a strong
    // reference here would cycle.
    session: Weak<SessionManager>,
    notifier: Notifier,
    probe_interval: Duration,
    probe_timeout: Duration,
    state_tx: watch::Sender<Connectivity>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LivenessMonitor {
    pub fn new(
        http: HttpClient,
        session: Weak<SessionManager>,
        notifier: Notifier,
        config: &BingoConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(Connectivity::Checking);
        Self {
            http,
            session,
            notifier,
            probe_interval: config.probe_interval,
            probe_timeout: config.probe_timeout,
            state_tx,
            task: Mutex::new(None),
        }
    }

    /// The current connectivity value.
    pub fn connectivity(&self) -> Connectivity {
        *self.state_tx.borrow()
    }

    /// Subscribes to connectivity transitions.
    pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
        self.state_tx.subscribe()
    }

    /// Starts probing. Idempotent: a running timer is replaced, never
    /// doubled.
    pub fn start(self: &Arc<Self>) {
        let mut task_slot = self.task.lock();
        if let Some(task) = task_slot.take() {
            debug!("restarting liveness probe");
            task.abort();
        }
        let monitor = Arc::clone(self);
        *task_slot = Some(tokio::spawn(async move {
            monitor.probe_loop().await;
        }));
    }

    /// Stops probing. The last published connectivity value remains.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            debug!("stopping liveness probe");
            task.abort();
        }
    }

    async fn probe_loop(&self) {
        let mut interval = tokio::time::interval(self.probe_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let up = self.probe_once().await;
            self.apply(up).await;
        }
    }

    async fn probe_once(&self) -> bool {
        match self
            .http
            .get_with_timeout::<serde_json::Value>("/api/health", self.probe_timeout)
            .await
        {
            Ok(_) => true,
            Err(err) => {
                debug!(error = %err, "health probe failed");
                false
            }
        }
    }

    async fn apply(&self, up: bool) {
        let previous = self.connectivity();
        let next = if up {
            Connectivity::Connected
        } else {
            Connectivity::Disconnected
        };
        if previous == next {
            return;
        }
        let _ = self.state_tx.send(next);

        match (previous, next) {
            (Connectivity::Connected, Connectivity::Disconnected) => {
                info!("lost connection to server");
                self.notifier
                    .show("Lost connection to server", Severity::Error);
            }
            (Connectivity::Disconnected, Connectivity::Connected) => {
                info!("connection to server restored");
                self.notifier
                    .show("Connected to server", Severity::Success);
                self.heal_session().await;
            }
            // The first verdict after start is silent either way.
            _ => {}
        }
    }

    /// A session that rehydrated while the server was down has a token but
    /// no confirmed user; complete it now that the server is back.
    async fn heal_session(&self) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        if session.token().is_some() && session.user().is_none() {
            if let Err(err) = session.refresh_user().await {
                warn!(error = %err, "user refetch after reconnect failed");
            }
        }
    }
}

impl Drop for LivenessMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for LivenessMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LivenessMonitor")
            .field("connectivity", &self.connectivity())
            .finish()
    }
}
