#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for bingo client integration tests.
//!
//! Provides a scripted [`MockTransport`]/[`ScriptedConnector`] pair for
//! push channel tests and an in-process axum mock of the bingo HTTP API.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use bingo_client::{BingoClientError, BingoConfig, Connector, Transport};

// ── MockTransport ───────────────────────────────────────────────────

/// A scripted mock transport for push channel testing.
///
/// Scripted server messages are consumed in order by `recv()`; once the
/// script runs out the transport hangs until shutdown, like a quiet but
/// healthy connection. Script a trailing `None` to simulate the server
/// closing.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, BingoClientError>>>,
    /// Recorded outgoing messages from the client.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a new mock transport with the given scripted incoming
    /// messages. Returns the transport plus shared handles for inspecting
    /// sent messages and whether close was called.
    pub fn new(
        incoming: Vec<Option<Result<String, BingoClientError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), BingoClientError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, BingoClientError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // No more scripted messages — hang so the channel stays open
            // until disconnect.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), BingoClientError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── ScriptedConnector ───────────────────────────────────────────────

/// One scripted connect attempt.
pub enum ConnectOutcome {
    /// The connect fails, as if the server refused the connection.
    Refuse,
    /// The connect succeeds and serves these messages (see
    /// [`MockTransport`] for `None` semantics).
    Serve(Vec<Option<Result<String, BingoClientError>>>),
}

/// A [`Connector`] that replays scripted connect outcomes and counts
/// attempts. Once the script is exhausted every further attempt refuses.
pub struct ScriptedConnector {
    outcomes: StdMutex<VecDeque<ConnectOutcome>>,
    pub attempts: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new(outcomes: Vec<ConnectOutcome>) -> Arc<Self> {
        Arc::new(Self {
            outcomes: StdMutex::new(VecDeque::from(outcomes)),
            attempts: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// A connector whose every attempt is refused.
    pub fn always_refuse() -> Arc<Self> {
        Self::new(Vec::new())
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, BingoClientError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        match self.outcomes.lock().unwrap().pop_front() {
            Some(ConnectOutcome::Serve(messages)) => {
                let (transport, _, _) = MockTransport::new(messages);
                Ok(Box::new(transport))
            }
            Some(ConnectOutcome::Refuse) | None => Err(BingoClientError::TransportFailure(
                "connection refused".into(),
            )),
        }
    }
}

// ── Mock API server ─────────────────────────────────────────────────

/// Mutable behavior of the mock bingo API.
pub struct ApiState {
    /// Bearer token the server accepts; everything else gets 401.
    pub token: StdMutex<String>,
    pub user: StdMutex<Value>,
    pub is_admin: AtomicBool,
    pub health_ok: AtomicBool,
    /// Raw JSON for `GET /api/bingo/cards` (may be `null`).
    pub cards: StdMutex<Value>,
    /// When set, `GET /api/bingo/cards` answers 500.
    pub fail_cards: AtomicBool,
    pub new_card: StdMutex<Value>,
    pub themes: StdMutex<Value>,
    /// Number of `GET /api/user` requests served (successfully or not).
    pub user_requests: AtomicUsize,
}

impl ApiState {
    pub fn new(token: &str) -> Arc<Self> {
        Arc::new(Self {
            token: StdMutex::new(token.to_owned()),
            user: StdMutex::new(sample_user_json()),
            is_admin: AtomicBool::new(false),
            health_ok: AtomicBool::new(true),
            cards: StdMutex::new(json!([])),
            fail_cards: AtomicBool::new(false),
            new_card: StdMutex::new(sample_card_json("card-new")),
            themes: StdMutex::new(json!({"themes": [], "active_theme_id": ""})),
            user_requests: AtomicUsize::new(0),
        })
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let expected = format!("Bearer {}", self.token.lock().unwrap());
        headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(|value| value == expected)
            .unwrap_or(false)
    }
}

fn unauthorized() -> (StatusCode, Json<Value>) {
    (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad token"})))
}

async fn health(State(state): State<Arc<ApiState>>) -> (StatusCode, Json<Value>) {
    if state.health_ok.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(json!({"status": "ok"})))
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "unhealthy"})),
        )
    }
}

async fn get_user(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    state.user_requests.fetch_add(1, Ordering::SeqCst);
    if !state.authorized(&headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(state.user.lock().unwrap().clone()))
}

async fn admin_check(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    (
        StatusCode::OK,
        Json(json!({"is_admin": state.is_admin.load(Ordering::SeqCst)})),
    )
}

async fn new_card(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let card = state.new_card.lock().unwrap().clone();
    {
        // The generated card also shows up in the list, newest last.
        let mut cards = state.cards.lock().unwrap();
        if let Value::Array(list) = &mut *cards {
            list.push(card.clone());
        } else {
            *cards = json!([card]);
        }
    }
    (StatusCode::OK, Json(card))
}

async fn get_cards(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    if state.fail_cards.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "database unavailable"})),
        );
    }
    (StatusCode::OK, Json(state.cards.lock().unwrap().clone()))
}

async fn mark_card(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let card_id = body["card_id"].as_str().unwrap_or_default().to_owned();
    let row = body["row"].as_u64().unwrap_or_default() as usize;
    let col = body["col"].as_u64().unwrap_or_default() as usize;

    let mut cards = state.cards.lock().unwrap();
    let Some(card) = cards
        .as_array_mut()
        .and_then(|list| list.iter_mut().find(|card| card["id"] == card_id.as_str()))
    else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "card not found"})),
        );
    };
    let cell = &mut card["marked_items"][row][col];
    *cell = Value::Bool(!cell.as_bool().unwrap_or(false));
    (StatusCode::OK, Json(card.clone()))
}

async fn get_themes(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    (StatusCode::OK, Json(state.themes.lock().unwrap().clone()))
}

async fn create_theme(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let theme = json!({
        "id": "theme-created",
        "name": body["name"],
        "description": body["description"],
        "items": body["items"],
        "is_complete": false,
    });
    if let Value::Array(themes) = &mut state.themes.lock().unwrap()["themes"] {
        themes.push(theme.clone());
    }
    (StatusCode::OK, Json(theme))
}

async fn update_theme(
    State(state): State<Arc<ApiState>>,
    Path(theme_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let theme = json!({
        "id": theme_id,
        "name": body["name"],
        "description": body["description"],
        "items": body["items"],
        "is_complete": false,
    });
    (StatusCode::OK, Json(theme))
}

async fn delete_theme(
    State(state): State<Arc<ApiState>>,
    Path(theme_id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    if let Value::Array(themes) = &mut state.themes.lock().unwrap()["themes"] {
        themes.retain(|theme| theme["id"] != theme_id.as_str());
    }
    (StatusCode::OK, Json(json!({})))
}

async fn set_theme_complete(
    State(state): State<Arc<ApiState>>,
    Path(theme_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    let mut themes = state.themes.lock().unwrap();
    let Some(theme) = themes["themes"]
        .as_array_mut()
        .and_then(|list| list.iter_mut().find(|theme| theme["id"] == theme_id.as_str()))
    else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "theme not found"})),
        );
    };
    theme["is_complete"] = body["is_complete"].clone();
    (StatusCode::OK, Json(theme.clone()))
}

async fn set_active_theme(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !state.authorized(&headers) {
        return unauthorized();
    }
    state.themes.lock().unwrap()["active_theme_id"] = body["theme_id"].clone();
    (StatusCode::OK, Json(json!({})))
}

/// Spawns the mock API server, returning its base URL.
pub async fn spawn_api(state: Arc<ApiState>) -> String {
    let router = Router::new()
        .route("/api/health", get(health))
        .route("/api/user", get(get_user))
        .route("/api/admin/check", get(admin_check))
        .route("/api/bingo/new", get(new_card))
        .route("/api/bingo/cards", get(get_cards))
        .route("/api/bingo/mark", post(mark_card))
        .route("/api/themes", get(get_themes))
        .route("/api/admin/themes", post(create_theme))
        .route("/api/admin/themes/active", post(set_active_theme))
        .route(
            "/api/admin/themes/:id",
            put(update_theme).delete(delete_theme),
        )
        .route("/api/admin/themes/:id/complete", post(set_theme_complete))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// ── Fixtures ────────────────────────────────────────────────────────

/// Installs a tracing subscriber honoring `RUST_LOG`, once per process.
pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A config with timers short enough for tests.
pub fn test_config(api_base_url: &str) -> BingoConfig {
    BingoConfig::new(api_base_url)
        .with_probe_interval(Duration::from_millis(50))
        .with_probe_timeout(Duration::from_millis(500))
        .with_reconnect_delay(Duration::from_millis(10))
        .with_ready_wait_timeout(Duration::from_millis(200))
}

pub fn sample_user_json() -> Value {
    json!({
        "id": "user-1",
        "discord_id": "123456789",
        "username": "streamfan",
        "avatar": "abc",
        "created_at": "2026-01-01T00:00:00Z",
    })
}

/// A card with a 5x5 grid and no marks.
pub fn sample_card_json(id: &str) -> Value {
    json!({
        "id": id,
        "user_id": "user-1",
        "theme_id": "theme-1",
        "items": vec![vec!["item"; 5]; 5],
        "marked_items": vec![vec![false; 5]; 5],
        "created_at": "2026-01-01T00:00:00Z",
        "is_winner": false,
    })
}

pub fn sample_theme_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": "",
        "items": vec!["item"; 25],
        "is_complete": false,
        "created_at": "2026-01-01T00:00:00Z",
    })
}

/// Polls `predicate` until it holds or the deadline passes.
pub async fn wait_until(deadline: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    loop {
        if predicate() {
            return true;
        }
        if start.elapsed() > deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
