//! # Bingo Client
//!
//! Headless async client for the multi-user bingo game server.
//!
//! This crate owns everything below the UI: the session lifecycle, the
//! authenticated HTTP surface, the self-healing push channel, the shared
//! game-state replica, the liveness probe, and the navigation policy. The
//! embedding shell renders and routes; it never talks to the server
//! directly.
//!
//! ## Features
//!
//! - **Single session source of truth** — [`SessionManager`] resolves the
//!   session once per start and runs the logout cascade on every exit path
//! - **Self-healing push channel** — [`PushChannel`] redials with a fixed
//!   delay and bounded attempts; handlers are panic-isolated
//! - **Replica, not a model** — [`GameStateStore`] applies server
//!   responses and push events verbatim, computing nothing the server
//!   already sends
//! - **WebSocket built-in** — the default `transport-websocket` feature
//!   provides [`WebSocketTransport`]; any [`Transport`]/[`Connector`] pair
//!   plugs in
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # async fn example() {
//! use std::sync::Arc;
//! use bingo_client::{BingoApp, BingoConfig, FileStorage, RouteDecision};
//!
//! let config = BingoConfig::from_env();
//! let storage = Arc::new(FileStorage::open("bingo-state.json"));
//! let (app, mut navigations) = BingoApp::with_websocket(config, storage);
//!
//! let outcome = app.boot("https://bingo.example.com/login?token=abc").await;
//! if let Some(url) = outcome.cleaned_url {
//!     // replace the browser/history URL with `url`
//! }
//!
//! match app.gate().decide("/", "/login").await {
//!     RouteDecision::Allow => { /* render home */ }
//!     RouteDecision::Redirect(to) => { /* go to `to` */ }
//! }
//!
//! while let Some(route) = navigations.recv().await {
//!     // forced navigation, e.g. "/login" after logout
//! }
//! # }
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod http;
pub mod liveness;
pub mod navigation;
pub mod notify;
pub mod protocol;
pub mod push;
pub mod session;
pub mod storage;
pub mod store;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use app::{BingoApp, BootOutcome};
pub use config::BingoConfig;
pub use error::{BingoClientError, Result};
pub use http::HttpClient;
pub use liveness::{Connectivity, LivenessMonitor};
pub use navigation::{NavigationGate, RouteDecision, RouteErrorAction};
pub use notify::{Notifier, Severity, Snackbar};
pub use protocol::{Card, PushEventKind, PushMessage, Theme, ThemeCatalog, User};
pub use push::{ChannelState, HandlerId, PushChannel};
pub use session::{LogoutReason, SessionManager};
pub use storage::{FileStorage, MemoryStorage, Storage};
pub use store::GameStateStore;
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
