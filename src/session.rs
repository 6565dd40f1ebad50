//! Session lifecycle: token acquisition, persistence, readiness, and the
//! logout cascade.
//!
//! [`SessionManager`] owns the single source of truth for the credential
//! and the signed-in user. It resolves the session exactly once per process
//! start ([`rehydrate`](SessionManager::rehydrate)), emits a one-shot
//! readiness signal the navigation gate waits on, and tears the whole
//! client down in a fixed order when the session ends, however it ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::error::{BingoClientError, Result};
use crate::http::HttpClient;
use crate::liveness::LivenessMonitor;
use crate::notify::{Notifier, Severity};
use crate::protocol::{AdminCheck, User};
use crate::push::PushChannel;
use crate::storage::{Storage, TOKEN_KEY, USER_KEY};

/// Path the client navigates to when the session ends.
pub const LOGIN_PATH: &str = "/login";

/// Why a logout happened. Logged, never surfaced verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to sign out.
    UserRequest,
    /// A stored token failed validation during rehydration.
    InvalidToken,
    /// The server rejected the credential mid-session.
    AuthFailure,
}

impl LogoutReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::UserRequest => "user-request",
            Self::InvalidToken => "invalid-token",
            Self::AuthFailure => "auth-failure",
        }
    }
}

#[derive(Default)]
struct SessionState {
    token: Option<String>,
    user: Option<User>,
    token_from_url: bool,
}

/// Components the session tears down on logout. Attached after
/// construction because they hold the session themselves.
struct RuntimeHandles {
    liveness: Arc<LivenessMonitor>,
    push: Arc<PushChannel>,
}

/// Owns the credential, the user, and the session lifecycle.
pub struct SessionManager {
    api_base_url: String,
    http: HttpClient,
    storage: Arc<dyn Storage>,
    notifier: Notifier,
    nav_tx: mpsc::UnboundedSender<String>,
    state: Mutex<SessionState>,
    ready_tx: watch::Sender<bool>,
    ready_emitted: AtomicBool,
    in_teardown: AtomicBool,
    is_admin: AtomicBool,
    admin_probed: AtomicBool,
    runtime: Mutex<Option<RuntimeHandles>>,
}

impl SessionManager {
    pub fn new(
        api_base_url: impl Into<String>,
        http: HttpClient,
        storage: Arc<dyn Storage>,
        notifier: Notifier,
        nav_tx: mpsc::UnboundedSender<String>,
    ) -> Self {
        let (ready_tx, _) = watch::channel(false);
        Self {
            api_base_url: api_base_url.into(),
            http,
            storage,
            notifier,
            nav_tx,
            state: Mutex::new(SessionState::default()),
            ready_tx,
            ready_emitted: AtomicBool::new(false),
            in_teardown: AtomicBool::new(false),
            is_admin: AtomicBool::new(false),
            admin_probed: AtomicBool::new(false),
            runtime: Mutex::new(None),
        }
    }

    /// Attaches the components the logout cascade tears down.
    pub fn attach_runtime(&self, liveness: Arc<LivenessMonitor>, push: Arc<PushChannel>) {
        *self.runtime.lock() = Some(RuntimeHandles { liveness, push });
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// The current bearer token.
    pub fn token(&self) -> Option<String> {
        self.state.lock().token.clone()
    }

    /// The signed-in user, if known.
    pub fn user(&self) -> Option<User> {
        self.state.lock().user.clone()
    }

    /// Authenticated means both a token and a user are present.
    pub fn is_authenticated(&self) -> bool {
        let state = self.state.lock();
        state.token.is_some() && state.user.is_some()
    }

    /// Whether the admin probe has run and reported admin rights.
    pub fn is_admin(&self) -> bool {
        self.is_admin.load(Ordering::Acquire)
    }

    /// Whether the session has been resolved (successfully or not).
    pub fn is_ready(&self) -> bool {
        self.ready_emitted.load(Ordering::Acquire)
    }

    /// Resolves once the session becomes ready. Returns immediately if it
    /// already is.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// The URL the shell should navigate to for Discord OAuth.
    pub fn begin_oauth(&self) -> String {
        format!("{}/auth/discord", self.api_base_url)
    }

    // ── Token and user updates ──────────────────────────────────────

    /// Sets or clears the token, keeping memory, storage, and the HTTP
    /// client in lockstep. Setting the token it already holds is a no-op.
    pub fn set_token(&self, token: Option<String>) {
        {
            let mut state = self.state.lock();
            if state.token == token {
                return;
            }
            state.token = token.clone();
            if token.is_none() {
                state.user = None;
                state.token_from_url = false;
            }
        }
        match &token {
            Some(token_value) => self.storage.set(TOKEN_KEY, token_value),
            None => {
                self.storage.remove(TOKEN_KEY);
                self.storage.remove(USER_KEY);
            }
        }
        self.http.set_token(token);
    }

    /// Sets or clears the user, mirroring the snapshot into storage.
    pub fn set_user(&self, user: Option<User>) {
        match &user {
            Some(user_value) => match serde_json::to_string(user_value) {
                Ok(raw) => self.storage.set(USER_KEY, &raw),
                Err(err) => warn!(error = %err, "failed to serialize user snapshot"),
            },
            None => self.storage.remove(USER_KEY),
        }
        self.state.lock().user = user;
    }

    /// Captures a `token` query parameter from `url`, if present: stores
    /// it and returns the URL with the parameter stripped, for the shell
    /// to apply via history replacement. Capturing twice stores once and
    /// strips once, since the cleaned URL no longer carries the parameter.
    pub fn handle_callback(&self, url: &str) -> Option<String> {
        let (token, cleaned) = capture_token(url)?;
        info!("captured session token from URL");
        self.set_token(Some(token));
        self.state.lock().token_from_url = true;
        Some(cleaned)
    }

    // ── Rehydration ─────────────────────────────────────────────────

    /// Resolves the session on cold start.
    ///
    /// Order: a token in `current_url` wins over a stored one; with a
    /// token in hand the persisted user snapshot is loaded first, then a
    /// fresh `GET /api/user` confirms it. An auth failure triggers the
    /// logout cascade; a transport failure keeps the token and snapshot
    /// (degraded session). Always ends with the one-shot readiness signal.
    ///
    /// Returns the cleaned URL when a token was stripped from the current
    /// one.
    pub async fn rehydrate(&self, current_url: &str) -> Option<String> {
        if self.is_ready() {
            debug!("session already resolved, skipping rehydration");
            return None;
        }

        let cleaned = self.handle_callback(current_url);

        if self.token().is_none() {
            if let Some(stored) = self.storage.get(TOKEN_KEY) {
                debug!("found stored session token");
                self.set_token(Some(stored));
            }
        }

        if self.token().is_some() {
            self.load_user_snapshot();
            match self.refresh_user().await {
                Ok(user) => {
                    info!(username = %user.username, "session rehydrated");
                }
                Err(err) if err.is_auth_failure() => {
                    // The auth-failure sink may already have run the
                    // cascade; logout is idempotent either way.
                    warn!("stored token rejected by server");
                    self.logout(LogoutReason::InvalidToken);
                }
                Err(err) if err.is_transport_failure() => {
                    warn!(error = %err, "server unreachable, keeping stored session");
                }
                Err(err) => {
                    warn!(error = %err, "user fetch failed during rehydration");
                }
            }
        } else {
            debug!("no session token found");
        }

        self.mark_ready();
        cleaned
    }

    fn load_user_snapshot(&self) {
        let Some(raw) = self.storage.get(USER_KEY) else {
            return;
        };
        match serde_json::from_str::<User>(&raw) {
            Ok(user) => {
                debug!(username = %user.username, "loaded persisted user snapshot");
                self.state.lock().user = Some(user);
            }
            Err(err) => {
                warn!(error = %err, "discarding corrupt user snapshot");
                self.storage.remove(USER_KEY);
            }
        }
    }

    /// Fetches the current user from the server and stores the result.
    pub async fn refresh_user(&self) -> Result<User> {
        let user: User = self.http.get("/api/user").await?;
        self.set_user(Some(user.clone()));
        Ok(user)
    }

    fn mark_ready(&self) {
        if self
            .ready_emitted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!(authenticated = self.is_authenticated(), "session ready");
            let _ = self.ready_tx.send(true);
        }
    }

    // ── Admin probe ─────────────────────────────────────────────────

    /// Probes `GET /api/admin/check` once per session. Later calls return
    /// the cached answer; a failed probe reads as not-admin.
    pub async fn ensure_admin_probed(&self) {
        if self.admin_probed.load(Ordering::Acquire) {
            return;
        }
        match self.http.get::<AdminCheck>("/api/admin/check").await {
            Ok(check) => {
                debug!(is_admin = check.is_admin, "admin probe completed");
                self.is_admin.store(check.is_admin, Ordering::Release);
                self.admin_probed.store(true, Ordering::Release);
            }
            Err(err) if err.is_auth_failure() => {
                // The sink is already tearing the session down.
            }
            Err(err) => {
                warn!(error = %err, "admin probe failed, assuming not admin");
                self.is_admin.store(false, Ordering::Release);
                self.admin_probed.store(true, Ordering::Release);
            }
        }
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Ends the session. Idempotent; a logout with nothing to tear down is
    /// a no-op.
    ///
    /// Order matters: the push channel goes first so no further events
    /// mutate state, then the liveness timer, then the credential, and the
    /// forced navigation to the login route last.
    pub fn logout(&self, reason: LogoutReason) {
        {
            let state = self.state.lock();
            if state.token.is_none() && state.user.is_none() {
                debug!("logout requested with no active session");
                return;
            }
        }
        info!(reason = reason.as_str(), "logging out");
        self.in_teardown.store(true, Ordering::Release);

        if let Some(runtime) = self.runtime.lock().as_ref() {
            runtime.push.disconnect();
            runtime.liveness.stop();
        }

        self.is_admin.store(false, Ordering::Release);
        self.admin_probed.store(false, Ordering::Release);
        self.set_token(None);

        self.in_teardown.store(false, Ordering::Release);
        let _ = self.nav_tx.send(LOGIN_PATH.to_owned());
    }

    /// Global reaction to an authentication failure observed on any
    /// request. Surfaces the server's message once and runs the logout
    /// cascade. Failures arriving with no credential held (including the
    /// unauthenticated requests a teardown itself can produce) are
    /// ignored, so the handler can never loop.
    pub fn on_auth_failure(&self, err: &BingoClientError) {
        if self.in_teardown.load(Ordering::Acquire) {
            return;
        }
        if self.token().is_none() {
            debug!("ignoring auth failure with no session token held");
            return;
        }
        let message = match err {
            BingoClientError::AuthFailure { message } => message.clone(),
            other => other.to_string(),
        };
        self.notifier
            .show(format!("Session expired: {message}"), Severity::Error);
        self.logout(LogoutReason::AuthFailure);
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("ready", &self.is_ready())
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

// ── URL helpers ─────────────────────────────────────────────────────

/// Extracts the `token` query parameter from a URL (absolute or
/// path-relative) and returns it together with the URL with the parameter
/// removed. Other query parameters and the fragment survive.
pub(crate) fn capture_token(url: &str) -> Option<(String, String)> {
    let (without_fragment, fragment) = match url.split_once('#') {
        Some((head, frag)) => (head, Some(frag)),
        None => (url, None),
    };
    let (base, query) = without_fragment.split_once('?')?;

    let mut token = None;
    let mut kept: Vec<(String, String)> = Vec::new();
    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        if key == "token" && token.is_none() {
            token = Some(value.into_owned());
        } else {
            kept.push((key.into_owned(), value.into_owned()));
        }
    }
    let token = token?;

    let mut cleaned = base.to_owned();
    if !kept.is_empty() {
        let rebuilt = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(kept)
            .finish();
        cleaned.push('?');
        cleaned.push_str(&rebuilt);
    }
    if let Some(frag) = fragment {
        cleaned.push('#');
        cleaned.push_str(frag);
    }
    Some((token, cleaned))
}

/// Whether a URL carries a `token` query parameter.
pub fn url_has_token_param(url: &str) -> bool {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let Some((_, query)) = without_fragment.split_once('?') else {
        return false;
    };
    url::form_urlencoded::parse(query.as_bytes()).any(|(key, _)| key == "token")
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
    fn capture_token_strips_only_the_token() {
        let (token, cleaned) =
            capture_token("https://bingo.example.com/login?token=abc123&tab=cards#top").unwrap();
        assert_eq!(token, "abc123");
        assert_eq!(cleaned, "https://bingo.example.com/login?tab=cards#top");
    }

    #[test]
    fn capture_token_on_relative_url() {
        let (token, cleaned) = capture_token("/login?token=abc").unwrap();
        assert_eq!(token, "abc");
        assert_eq!(cleaned, "/login");
    }

    #[test]
    fn capture_token_without_token_returns_none() {
        assert!(capture_token("/login").is_none());
        assert!(capture_token("/login?tab=cards").is_none());
    }

    #[test]
    fn capture_token_is_idempotent_via_cleaned_url() {
        let (_, cleaned) = capture_token("/login?token=abc").unwrap();
        assert!(capture_token(&cleaned).is_none());
    }

    #[test]
    fn token_param_detection() {
        assert!(url_has_token_param("/login?token=abc"));
        assert!(url_has_token_param("/login?a=1&token=abc"));
        assert!(!url_has_token_param("/login"));
        assert!(!url_has_token_param("/login#token=abc"));
    }

    #[test]
    fn percent_encoded_tokens_are_decoded() {
        let (token, _) = capture_token("/login?token=a%2Bb%20c").unwrap();
        assert_eq!(token, "a+b c");
    }
}
