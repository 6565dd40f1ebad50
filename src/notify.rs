//! User-facing notification state.
//!
//! The crate never renders anything; it publishes the latest snackbar on a
//! watch channel and the shell decides how to show it. Later notifications
//! replace earlier ones, matching the single-slot snackbar behavior.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// The current snackbar contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snackbar {
    pub visible: bool,
    pub message: String,
    pub severity: Severity,
}

impl Default for Snackbar {
    fn default() -> Self {
        Self {
            visible: false,
            message: String::new(),
            severity: Severity::Info,
        }
    }
}

/// Publishes snackbar updates to the shell. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: Arc<watch::Sender<Snackbar>>,
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Snackbar::default());
        Self { tx: Arc::new(tx) }
    }

    /// Shows a notification, replacing any currently visible one.
    pub fn show(&self, message: impl Into<String>, severity: Severity) {
        let message = message.into();
        debug!(%message, ?severity, "showing notification");
        let _ = self.tx.send(Snackbar {
            visible: true,
            message,
            severity,
        });
    }

    /// Hides the current notification.
    pub fn hide(&self) {
        self.tx.send_modify(|snackbar| snackbar.visible = false);
    }

    /// The latest snackbar value.
    pub fn current(&self) -> Snackbar {
        self.tx.borrow().clone()
    }

    /// Subscribes to snackbar updates.
    pub fn subscribe(&self) -> watch::Receiver<Snackbar> {
        self.tx.subscribe()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
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

    #[test]
    fn show_replaces_and_hide_keeps_message() {
        let notifier = Notifier::new();
        assert!(!notifier.current().visible);

        notifier.show("first", Severity::Info);
        notifier.show("second", Severity::Error);
        let current = notifier.current();
        assert!(current.visible);
        assert_eq!(current.message, "second");
        assert_eq!(current.severity, Severity::Error);

        notifier.hide();
        let current = notifier.current();
        assert!(!current.visible);
        assert_eq!(current.message, "second");
    }

    #[tokio::test]
    async fn subscribers_observe_updates() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();
        notifier.show("hello", Severity::Success);
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().message, "hello");
    }
}
