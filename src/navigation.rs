//! Route gatekeeping interlocked with session readiness.
//!
//! [`NavigationGate::decide`] is consulted before every navigation. It
//! never decides on a session that is still resolving: it waits for the
//! readiness signal, bounded so a hung rehydration cannot freeze
//! navigation forever. Once the session is ready the fast path applies and
//! no decision ever waits again.
//!
//! The gate also owns the reload-once recovery for stale dynamic imports
//! after a deployment, keyed by a storage flag.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::BingoConfig;
use crate::session::{url_has_token_param, SessionManager, LOGIN_PATH};
use crate::storage::{Storage, RELOAD_FLAG_KEY};

/// The home route.
pub const HOME_PATH: &str = "/";

/// The admin route.
pub const ADMIN_PATH: &str = "/admin";

/// The OAuth callback route; always allowed so the provider redirect can
/// land.
pub const AUTH_CALLBACK_PATH: &str = "/auth/callback";

/// Verdict for a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Proceed to the requested route.
    Allow,
    /// Go to this route instead.
    Redirect(String),
}

/// Recovery action for a route-loading error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteErrorAction {
    /// Reload the app at this path, once.
    Reload(String),
    /// Already reloaded once; surface the failure instead of looping.
    GiveUp,
}

/// Decides navigations against the session state.
pub struct NavigationGate {
    session: Arc<SessionManager>,
    storage: Arc<dyn Storage>,
    ready_wait_timeout: Duration,
}

impl NavigationGate {
    pub fn new(session: Arc<SessionManager>, storage: Arc<dyn Storage>, config: &BingoConfig) -> Self {
        Self {
            session,
            storage,
            ready_wait_timeout: config.ready_wait_timeout,
        }
    }

    /// Decides whether the navigation from `from` to `to` may proceed.
    ///
    /// Policy:
    /// - the OAuth callback is always allowed;
    /// - the login route is allowed while signed out (and always when it
    ///   carries a token to consume), but redirects home when a session
    ///   exists;
    /// - everything else requires a session and redirects to login
    ///   without one. The admin route additionally triggers the lazy
    ///   admin probe; the page renders its own access-denied state.
    pub async fn decide(&self, to: &str, from: &str) -> RouteDecision {
        let path = path_of(to);
        debug!(%to, %from, "deciding navigation");

        if path == AUTH_CALLBACK_PATH {
            return RouteDecision::Allow;
        }

        if path == LOGIN_PATH {
            if url_has_token_param(to) {
                // The login view consumes the token; deciding before the
                // session resolves would drop it.
                return RouteDecision::Allow;
            }
            self.await_ready().await;
            return if self.session.is_authenticated() {
                RouteDecision::Redirect(HOME_PATH.to_owned())
            } else {
                RouteDecision::Allow
            };
        }

        self.await_ready().await;
        if !self.session.is_authenticated() {
            info!(%to, "redirecting unauthenticated navigation to login");
            return RouteDecision::Redirect(LOGIN_PATH.to_owned());
        }
        if path == ADMIN_PATH {
            self.session.ensure_admin_probed().await;
        }
        RouteDecision::Allow
    }

    async fn await_ready(&self) {
        if self.session.is_ready() {
            return;
        }
        let wait = self.session.wait_ready();
        if tokio::time::timeout(self.ready_wait_timeout, wait).await.is_err() {
            warn!(
                timeout = ?self.ready_wait_timeout,
                "session readiness wait timed out, deciding with current state"
            );
        }
    }

    /// Reacts to a route component failing to load, which after a
    /// deployment usually means the running bundle references assets that
    /// no longer exist. Reload once; a second failure right after a reload
    /// is a real error.
    pub fn on_route_error(&self, to: &str) -> RouteErrorAction {
        if self.storage.get(RELOAD_FLAG_KEY).is_some() {
            warn!(%to, "route still failing after reload, giving up");
            RouteErrorAction::GiveUp
        } else {
            info!(%to, "reloading once to recover from stale route assets");
            self.storage.set(RELOAD_FLAG_KEY, "true");
            RouteErrorAction::Reload(to.to_owned())
        }
    }

    /// Clears the reload flag after any successful navigation, re-arming
    /// the recovery for the next deployment.
    pub fn on_route_resolved(&self) {
        self.storage.remove(RELOAD_FLAG_KEY);
    }
}

impl std::fmt::Debug for NavigationGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NavigationGate")
            .field("ready_wait_timeout", &self.ready_wait_timeout)
            .finish()
    }
}

/// The path portion of a URL: everything before the query or fragment.
fn path_of(url: &str) -> &str {
    url.split(['?', '#']).next().unwrap_or(url)
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
    fn path_extraction() {
        assert_eq!(path_of("/login?token=abc"), "/login");
        assert_eq!(path_of("/admin#section"), "/admin");
        assert_eq!(path_of("/"), "/");
    }
}
