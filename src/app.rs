//! Composition root wiring the client components together.
//!
//! [`BingoApp`] constructs the six components in dependency order,
//! installs the auth-failure sink, and runs the boot sequence. The shell
//! drives it: feed it the start URL, drain the navigation channel, render
//! from the store and notifier.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use crate::config::BingoConfig;
use crate::http::HttpClient;
use crate::liveness::LivenessMonitor;
use crate::navigation::NavigationGate;
use crate::notify::Notifier;
use crate::push::PushChannel;
use crate::session::SessionManager;
use crate::storage::Storage;
use crate::store::GameStateStore;
use crate::transport::Connector;

/// Result of the boot sequence.
#[derive(Debug)]
pub struct BootOutcome {
    /// The current URL with the captured token stripped, when one was
    /// captured. The shell applies it via history replacement.
    pub cleaned_url: Option<String>,
    /// Whether boot ended with an authenticated session.
    pub authenticated: bool,
}

/// The assembled client.
pub struct BingoApp {
    config: BingoConfig,
    notifier: Notifier,
    http: HttpClient,
    session: Arc<SessionManager>,
    liveness: Arc<LivenessMonitor>,
    push: Arc<PushChannel>,
    store: GameStateStore,
    gate: NavigationGate,
}

impl BingoApp {
    /// Assembles the client against the given storage and push connector.
    ///
    /// Returns the app and the navigation channel receiver: forced
    /// navigations (logout) arrive there as route strings the shell must
    /// apply.
    pub fn new(
        config: BingoConfig,
        storage: Arc<dyn Storage>,
        connector: Arc<dyn Connector>,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let notifier = Notifier::new();
        let http = HttpClient::new(&config);
        let (nav_tx, nav_rx) = mpsc::unbounded_channel();

        let session = Arc::new(SessionManager::new(
            config.api_base_url.clone(),
            http.clone(),
            Arc::clone(&storage),
            notifier.clone(),
            nav_tx,
        ));
        let liveness = Arc::new(LivenessMonitor::new(
            http.clone(),
            Arc::downgrade(&session),
            notifier.clone(),
            &config,
        ));
        let push = Arc::new(PushChannel::new(connector, &config));
        session.attach_runtime(Arc::clone(&liveness), Arc::clone(&push));

        // Every component issues requests through this client, so one sink
        // catches every expired token.
        {
            let session = Arc::clone(&session);
            http.set_auth_failure_sink(move |err| session.on_auth_failure(err));
        }

        let store = GameStateStore::new(
            http.clone(),
            Arc::clone(&session),
            Arc::clone(&liveness),
            notifier.clone(),
        );
        store.attach_push(&push);

        let gate = NavigationGate::new(Arc::clone(&session), storage, &config);

        let app = Self {
            config,
            notifier,
            http,
            session,
            liveness,
            push,
            store,
            gate,
        };
        (app, nav_rx)
    }

    /// Assembles the client with the built-in WebSocket connector, dialing
    /// the `/ws` endpoint derived from the API base URL.
    #[cfg(feature = "transport-websocket")]
    pub fn with_websocket(
        config: BingoConfig,
        storage: Arc<dyn Storage>,
    ) -> (Self, mpsc::UnboundedReceiver<String>) {
        let connector = Arc::new(crate::transports::WebSocketConnector::from_config(&config));
        Self::new(config, storage, connector)
    }

    /// Runs the boot sequence: resolve the session from `current_url` and
    /// storage, open the push channel if a session exists, start the
    /// liveness probe.
    pub async fn boot(&self, current_url: &str) -> BootOutcome {
        info!(api_base_url = %self.config.api_base_url, "booting bingo client");
        let cleaned_url = self.session.rehydrate(current_url).await;
        let authenticated = self.session.is_authenticated();
        if authenticated {
            self.push.connect();
        }
        self.liveness.start();
        BootOutcome {
            cleaned_url,
            authenticated,
        }
    }

    /// Stops the background tasks without touching the stored session.
    pub fn shutdown(&self) {
        self.push.disconnect();
        self.liveness.stop();
    }

    pub fn config(&self) -> &BingoConfig {
        &self.config
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn http(&self) -> &HttpClient {
        &self.http
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn liveness(&self) -> &Arc<LivenessMonitor> {
        &self.liveness
    }

    pub fn push(&self) -> &Arc<PushChannel> {
        &self.push
    }

    pub fn store(&self) -> &GameStateStore {
        &self.store
    }

    pub fn gate(&self) -> &NavigationGate {
        &self.gate
    }
}

impl std::fmt::Debug for BingoApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BingoApp")
            .field("api_base_url", &self.config.api_base_url)
            .field("session", &self.session)
            .finish()
    }
}
