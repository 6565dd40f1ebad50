//! In-memory replica of the shared game state.
//!
//! [`GameStateStore`] holds the player's cards, the global mark set, and
//! the theme catalog. Two writers feed it: API responses (explicit
//! operations) and push channel events (everyone's concurrent activity).
//! Server responses and push payloads are authoritative; the store never
//! computes state the server also sends.
//!
//! Error policy: authentication failures propagate untouched (the session
//! manager owns those); every other failure is recorded on the store and
//! surfaced as an error notification, preferring the server's message over
//! a generic one.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{BingoClientError, Result};
use crate::http::HttpClient;
use crate::liveness::{Connectivity, LivenessMonitor};
use crate::notify::{Notifier, Severity};
use crate::protocol::{
    Card, MarkCellRequest, PushEventKind, PushMessage, SetActiveThemeRequest,
    SetThemeCompleteRequest, Theme, ThemeCatalog, ThemeDraft, GRID_SIZE, MIN_THEME_ITEMS,
};
use crate::push::PushChannel;
use crate::session::SessionManager;

#[derive(Default)]
struct StoreState {
    cards: Vec<Card>,
    current_card_id: Option<String>,
    global_marks: HashSet<String>,
    themes: Vec<Theme>,
    active_theme_id: Option<String>,
    loading: bool,
    error: Option<String>,
}

impl StoreState {
    /// Replaces the card list, keeping `current_card_id` valid: a vanished
    /// current card is dropped, and an unset one falls back to the newest
    /// (last) card.
    fn replace_cards(&mut self, cards: Vec<Card>) {
        self.cards = cards;
        if let Some(current) = &self.current_card_id {
            if !self.cards.iter().any(|card| &card.id == current) {
                self.current_card_id = None;
            }
        }
        if self.current_card_id.is_none() {
            self.current_card_id = self.cards.last().map(|card| card.id.clone());
        }
    }

    fn upsert_card(&mut self, card: Card) {
        match self.cards.iter_mut().find(|existing| existing.id == card.id) {
            Some(slot) => *slot = card,
            None => self.cards.push(card),
        }
    }

    /// Inserts a freshly generated card at the front of the list, or
    /// replaces it in place when the id already exists.
    fn prepend_card(&mut self, card: Card) {
        match self.cards.iter_mut().find(|existing| existing.id == card.id) {
            Some(slot) => *slot = card,
            None => self.cards.insert(0, card),
        }
    }

    fn upsert_theme(&mut self, theme: Theme) {
        match self
            .themes
            .iter_mut()
            .find(|existing| existing.id == theme.id)
        {
            Some(slot) => *slot = theme,
            None => self.themes.push(theme),
        }
    }

    fn remove_theme(&mut self, theme_id: &str) {
        self.themes.retain(|theme| theme.id != theme_id);
        if self.active_theme_id.as_deref() == Some(theme_id) {
            self.active_theme_id = None;
        }
    }

    /// Applies one push message. Returns a notification to surface, if
    /// the event warrants one.
    fn apply_push(&mut self, kind: PushEventKind, message: &PushMessage) -> Option<String> {
        match kind {
            PushEventKind::InitialState => {
                // Authoritative snapshot: replaces whatever accumulated,
                // on first connect and on every reconnect alike.
                self.global_marks = message
                    .marked_items
                    .clone()
                    .unwrap_or_default()
                    .into_iter()
                    .collect();
                None
            }
            PushEventKind::ItemMarked => {
                if let Some(item) = message.item_id() {
                    // HashSet insert: marking twice is naturally idempotent.
                    self.global_marks.insert(item);
                }
                if let Some(cards) = &message.cards {
                    self.replace_cards(cards.clone());
                }
                None
            }
            PushEventKind::ItemUnmarked => {
                if let Some(item) = message.item_id() {
                    self.global_marks.remove(&item);
                }
                if let Some(cards) = &message.cards {
                    self.replace_cards(cards.clone());
                }
                None
            }
            PushEventKind::ThemeChanged => {
                let active = message.item_id().filter(|id| !id.is_empty());
                let name = active.as_ref().and_then(|id| {
                    self.themes
                        .iter()
                        .find(|theme| &theme.id == id)
                        .map(|theme| theme.name.clone())
                });
                self.active_theme_id = active;
                Some(match name {
                    Some(name) => format!("Active theme changed to \"{name}\""),
                    None => "Active theme changed".to_owned(),
                })
            }
            PushEventKind::ThemeCreated | PushEventKind::ThemeUpdated => {
                if let Some(theme) = message.item_theme() {
                    self.upsert_theme(theme);
                }
                None
            }
            PushEventKind::ThemeDeleted => {
                if let Some(id) = message.item_id() {
                    self.remove_theme(&id);
                }
                None
            }
        }
    }
}

struct StoreInner {
    http: HttpClient,
    session: Arc<SessionManager>,
    liveness: Arc<LivenessMonitor>,
    notifier: Notifier,
    state: RwLock<StoreState>,
}

impl StoreInner {
    fn handle_push(&self, kind: PushEventKind, message: &PushMessage) {
        debug!(kind = kind.name(), "applying push event");
        let notice = self.state.write().apply_push(kind, message);
        if let Some(notice) = notice {
            self.notifier.show(notice, Severity::Info);
        }
    }
}

/// Replica of cards, global marks, and themes. Cheap to clone; clones
/// share state.
#[derive(Clone)]
pub struct GameStateStore {
    inner: Arc<StoreInner>,
}

impl GameStateStore {
    pub fn new(
        http: HttpClient,
        session: Arc<SessionManager>,
        liveness: Arc<LivenessMonitor>,
        notifier: Notifier,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                http,
                session,
                liveness,
                notifier,
                state: RwLock::new(StoreState::default()),
            }),
        }
    }

    /// Registers this store's handlers on the push channel, one per event
    /// kind.
    pub fn attach_push(&self, push: &PushChannel) {
        for kind in PushEventKind::ALL {
            let inner = Arc::clone(&self.inner);
            push.on(kind, move |message| inner.handle_push(kind, message));
        }
    }

    // ── Card operations ─────────────────────────────────────────────

    /// Requests a fresh card, prepends it, makes it current, then
    /// refetches the full list so ordering matches the server.
    pub async fn generate_new_card(&self) -> Result<Card> {
        self.begin_operation();
        let result = self.inner.http.get::<Card>("/api/bingo/new").await;
        let card = match result {
            Ok(card) => card,
            Err(err) => {
                self.end_operation();
                return self.fail("Failed to generate bingo card", err);
            }
        };
        {
            let mut state = self.inner.state.write();
            state.prepend_card(card.clone());
            state.current_card_id = Some(card.id.clone());
        }
        if let Err(err) = self.fetch_cards().await {
            warn!(error = %err, "card list refresh after generation failed");
        }
        self.end_operation();
        Ok(card)
    }

    /// Replaces the card list from the server. A `null` body reads as an
    /// empty list. When no card is current and the list is non-empty, the
    /// newest (last) card becomes current.
    pub async fn fetch_cards(&self) -> Result<()> {
        match self
            .inner
            .http
            .get::<Option<Vec<Card>>>("/api/bingo/cards")
            .await
        {
            Ok(cards) => {
                self.inner
                    .state
                    .write()
                    .replace_cards(cards.unwrap_or_default());
                Ok(())
            }
            Err(err) => self.fail("Failed to fetch bingo cards", err),
        }
    }

    /// Toggles a cell mark. Validates locally (known card, in-grid
    /// coordinates) before issuing the request; the server's returned card
    /// replaces the local one wholesale.
    pub async fn mark_cell(&self, card_id: &str, row: usize, col: usize) -> Result<Card> {
        if row >= GRID_SIZE || col >= GRID_SIZE {
            return Err(BingoClientError::ValidationFailure(format!(
                "cell ({row}, {col}) is outside the {GRID_SIZE}x{GRID_SIZE} grid"
            )));
        }
        if !self
            .inner
            .state
            .read()
            .cards
            .iter()
            .any(|card| card.id == card_id)
        {
            return Err(BingoClientError::ValidationFailure(format!(
                "no card with id {card_id}"
            )));
        }

        let request = MarkCellRequest {
            card_id: card_id.to_owned(),
            row,
            col,
        };
        match self.inner.http.post::<Card>("/api/bingo/mark", &request).await {
            Ok(card) => {
                self.inner.state.write().upsert_card(card.clone());
                Ok(card)
            }
            Err(err) => self.fail("Failed to mark bingo item", err),
        }
    }

    /// Makes an already-fetched card current. Returns `false` when the id
    /// is unknown.
    pub fn set_current_card(&self, card_id: &str) -> bool {
        let mut state = self.inner.state.write();
        if state.cards.iter().any(|card| card.id == card_id) {
            state.current_card_id = Some(card_id.to_owned());
            true
        } else {
            false
        }
    }

    // ── Theme operations ────────────────────────────────────────────

    /// Replaces the theme catalog from the server.
    pub async fn fetch_themes(&self) -> Result<()> {
        match self.inner.http.get::<ThemeCatalog>("/api/themes").await {
            Ok(catalog) => {
                let active = catalog.active_theme_id().map(str::to_owned);
                let mut state = self.inner.state.write();
                state.themes = catalog.themes;
                state.active_theme_id = active;
                Ok(())
            }
            Err(err) => self.fail("Failed to fetch themes", err),
        }
    }

    /// Creates a theme (admin). Drafts with fewer than 25 items are
    /// rejected locally, since they could never fill a card.
    pub async fn create_theme(&self, draft: &ThemeDraft) -> Result<Theme> {
        validate_draft(draft)?;
        match self
            .inner
            .http
            .post::<Theme>("/api/admin/themes", draft)
            .await
        {
            Ok(theme) => {
                self.inner.state.write().upsert_theme(theme.clone());
                Ok(theme)
            }
            Err(err) => self.fail("Failed to create theme", err),
        }
    }

    /// Updates a theme (admin).
    pub async fn update_theme(&self, theme_id: &str, draft: &ThemeDraft) -> Result<Theme> {
        validate_draft(draft)?;
        match self
            .inner
            .http
            .put::<Theme>(&format!("/api/admin/themes/{theme_id}"), draft)
            .await
        {
            Ok(theme) => {
                self.inner.state.write().upsert_theme(theme.clone());
                Ok(theme)
            }
            Err(err) => self.fail("Failed to update theme", err),
        }
    }

    /// Deletes a theme (admin). Deleting the active theme clears the
    /// active id.
    pub async fn delete_theme(&self, theme_id: &str) -> Result<()> {
        match self
            .inner
            .http
            .delete::<serde_json::Value>(&format!("/api/admin/themes/{theme_id}"))
            .await
        {
            Ok(_) => {
                self.inner.state.write().remove_theme(theme_id);
                Ok(())
            }
            Err(err) => self.fail("Failed to delete theme", err),
        }
    }

    /// Sets or clears the active theme (admin). `None` clears.
    pub async fn set_active_theme(&self, theme_id: Option<&str>) -> Result<()> {
        let request = SetActiveThemeRequest {
            theme_id: theme_id.unwrap_or_default().to_owned(),
        };
        match self
            .inner
            .http
            .post::<serde_json::Value>("/api/admin/themes/active", &request)
            .await
        {
            Ok(_) => {
                self.inner.state.write().active_theme_id =
                    theme_id.filter(|id| !id.is_empty()).map(str::to_owned);
                Ok(())
            }
            Err(err) => self.fail("Failed to set active theme", err),
        }
    }

    /// Marks a theme complete or incomplete (admin).
    pub async fn set_theme_complete(&self, theme_id: &str, is_complete: bool) -> Result<Theme> {
        let request = SetThemeCompleteRequest { is_complete };
        match self
            .inner
            .http
            .post::<Theme>(&format!("/api/admin/themes/{theme_id}/complete"), &request)
            .await
        {
            Ok(theme) => {
                self.inner.state.write().upsert_theme(theme.clone());
                Ok(theme)
            }
            Err(err) => self.fail("Failed to update theme", err),
        }
    }

    // ── Derived views ───────────────────────────────────────────────

    pub fn cards(&self) -> Vec<Card> {
        self.inner.state.read().cards.clone()
    }

    pub fn current_card_id(&self) -> Option<String> {
        self.inner.state.read().current_card_id.clone()
    }

    pub fn current_card(&self) -> Option<Card> {
        let state = self.inner.state.read();
        let current = state.current_card_id.as_ref()?;
        state.cards.iter().find(|card| &card.id == current).cloned()
    }

    pub fn has_current_card(&self) -> bool {
        self.current_card().is_some()
    }

    /// Whether any player has globally marked this item.
    pub fn is_item_globally_marked(&self, item: &str) -> bool {
        self.inner.state.read().global_marks.contains(item)
    }

    pub fn global_marks(&self) -> HashSet<String> {
        self.inner.state.read().global_marks.clone()
    }

    pub fn themes(&self) -> Vec<Theme> {
        self.inner.state.read().themes.clone()
    }

    pub fn active_theme_id(&self) -> Option<String> {
        self.inner.state.read().active_theme_id.clone()
    }

    pub fn active_theme(&self) -> Option<Theme> {
        let state = self.inner.state.read();
        let active = state.active_theme_id.as_ref()?;
        state.themes.iter().find(|theme| &theme.id == active).cloned()
    }

    /// Session passthrough.
    pub fn is_authenticated(&self) -> bool {
        self.inner.session.is_authenticated()
    }

    /// Session passthrough.
    pub fn is_admin(&self) -> bool {
        self.inner.session.is_admin()
    }

    /// Liveness passthrough.
    pub fn connection_status(&self) -> Connectivity {
        self.inner.liveness.connectivity()
    }

    /// Ready to play: the server is reachable and a credential is held.
    pub fn is_app_ready(&self) -> bool {
        self.connection_status() == Connectivity::Connected
            && self.inner.session.token().is_some()
    }

    pub fn loading(&self) -> bool {
        self.inner.state.read().loading
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.read().error.clone()
    }

    pub fn clear_error(&self) {
        self.inner.state.write().error = None;
    }

    /// Drops all replicated state, for a shell that wants a clean slate
    /// after logout.
    pub fn reset(&self) {
        *self.inner.state.write() = StoreState::default();
    }

    // ── Error policy ────────────────────────────────────────────────

    fn begin_operation(&self) {
        let mut state = self.inner.state.write();
        state.loading = true;
        state.error = None;
    }

    fn end_operation(&self) {
        self.inner.state.write().loading = false;
    }

    /// Records and surfaces a failure, except auth failures, which belong
    /// to the session manager and pass through untouched.
    fn fail<T>(&self, fallback: &str, err: BingoClientError) -> Result<T> {
        if !err.is_auth_failure() {
            let message = user_message(&err, fallback);
            self.inner.state.write().error = Some(message.clone());
            self.inner.notifier.show(message, Severity::Error);
        }
        Err(err)
    }
}

impl std::fmt::Debug for GameStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("GameStateStore")
            .field("cards", &state.cards.len())
            .field("themes", &state.themes.len())
            .field("global_marks", &state.global_marks.len())
            .finish()
    }
}

fn validate_draft(draft: &ThemeDraft) -> Result<()> {
    if draft.name.trim().is_empty() {
        return Err(BingoClientError::ValidationFailure(
            "theme name must not be empty".to_owned(),
        ));
    }
    if draft.items.len() < MIN_THEME_ITEMS {
        return Err(BingoClientError::ValidationFailure(format!(
            "a theme needs at least {MIN_THEME_ITEMS} items to fill a card, got {}",
            draft.items.len()
        )));
    }
    Ok(())
}

/// Prefers the server's message; falls back to the generic one for
/// failures that never produced a server message.
fn user_message(err: &BingoClientError, fallback: &str) -> String {
    match err {
        BingoClientError::ServerFailure { message }
        | BingoClientError::RequestFailure { message, .. }
            if !message.trim().is_empty() =>
        {
            message.clone()
        }
        BingoClientError::ValidationFailure(message) => message.clone(),
        _ => fallback.to_owned(),
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

    fn card(id: &str) -> Card {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "items": [["a"]],
            "marked_items": [[false]],
        }))
        .unwrap()
    }

    fn theme(id: &str, name: &str) -> Theme {
        Theme {
            id: id.to_owned(),
            name: name.to_owned(),
            description: String::new(),
            items: Vec::new(),
            is_complete: false,
            created_at: String::new(),
        }
    }

    fn push(kind: PushEventKind, raw: serde_json::Value) -> (PushEventKind, PushMessage) {
        let mut object = raw;
        object["type"] = serde_json::Value::String(kind.name().to_owned());
        (kind, serde_json::from_value(object).unwrap())
    }

    #[test]
    fn initial_state_replaces_accumulated_marks() {
        let mut state = StoreState::default();
        state.global_marks.insert("stale".to_owned());

        let (kind, msg) = push(
            PushEventKind::InitialState,
            serde_json::json!({"marked_items": ["a", "b"]}),
        );
        state.apply_push(kind, &msg);

        assert_eq!(state.global_marks.len(), 2);
        assert!(state.global_marks.contains("a"));
        assert!(!state.global_marks.contains("stale"));
    }

    #[test]
    fn mark_and_unmark_are_idempotent() {
        let mut state = StoreState::default();
        let (kind, msg) = push(
            PushEventKind::ItemMarked,
            serde_json::json!({"item": "Lag spike"}),
        );
        state.apply_push(kind, &msg);
        state.apply_push(kind, &msg);
        assert_eq!(state.global_marks.len(), 1);

        let (kind, msg) = push(
            PushEventKind::ItemUnmarked,
            serde_json::json!({"item": "Lag spike"}),
        );
        state.apply_push(kind, &msg);
        state.apply_push(kind, &msg);
        assert!(state.global_marks.is_empty());
    }

    #[test]
    fn marked_event_with_cards_replaces_card_list() {
        let mut state = StoreState::default();
        state.replace_cards(vec![card("c1")]);
        assert_eq!(state.current_card_id.as_deref(), Some("c1"));

        let (kind, msg) = push(
            PushEventKind::ItemMarked,
            serde_json::json!({
                "item": "x",
                "cards": [
                    {"id": "c1", "items": [["a"]], "marked_items": [[true]]},
                    {"id": "c2", "items": [["b"]], "marked_items": [[false]]},
                ],
            }),
        );
        state.apply_push(kind, &msg);

        assert_eq!(state.cards.len(), 2);
        assert!(state.cards[0].marked_items[0][0]);
        // The current card survived the replacement.
        assert_eq!(state.current_card_id.as_deref(), Some("c1"));
    }

    #[test]
    fn generated_card_goes_to_the_front() {
        let mut state = StoreState::default();
        state.replace_cards(vec![card("c1"), card("c2")]);

        state.prepend_card(card("c3"));
        assert_eq!(state.cards[0].id, "c3");
        assert_eq!(state.cards.len(), 3);

        // Prepending a known id replaces it in place instead.
        state.prepend_card(card("c2"));
        assert_eq!(state.cards[0].id, "c3");
        assert_eq!(state.cards.len(), 3);
    }

    #[test]
    fn vanished_current_card_falls_back_to_newest() {
        let mut state = StoreState::default();
        state.replace_cards(vec![card("c1"), card("c2")]);
        state.current_card_id = Some("c1".to_owned());

        state.replace_cards(vec![card("c2"), card("c3")]);
        assert_eq!(state.current_card_id.as_deref(), Some("c3"));
    }

    #[test]
    fn theme_changed_accepts_id_or_object_and_notifies() {
        let mut state = StoreState::default();
        state.upsert_theme(theme("t1", "Streams"));

        let (kind, msg) = push(PushEventKind::ThemeChanged, serde_json::json!({"item": "t1"}));
        let notice = state.apply_push(kind, &msg);
        assert_eq!(state.active_theme_id.as_deref(), Some("t1"));
        assert_eq!(notice.as_deref(), Some("Active theme changed to \"Streams\""));

        let (kind, msg) = push(
            PushEventKind::ThemeChanged,
            serde_json::json!({"item": {"id": "t2", "name": "Unknown"}}),
        );
        let notice = state.apply_push(kind, &msg);
        assert_eq!(state.active_theme_id.as_deref(), Some("t2"));
        // Not in the catalog yet, so the generic wording is used.
        assert_eq!(notice.as_deref(), Some("Active theme changed"));
    }

    #[test]
    fn theme_changed_with_empty_id_clears_active() {
        let mut state = StoreState::default();
        state.active_theme_id = Some("t1".to_owned());
        let (kind, msg) = push(PushEventKind::ThemeChanged, serde_json::json!({"item": ""}));
        state.apply_push(kind, &msg);
        assert_eq!(state.active_theme_id, None);
    }

    #[test]
    fn theme_created_and_updated_upsert_by_id() {
        let mut state = StoreState::default();
        let (kind, msg) = push(
            PushEventKind::ThemeCreated,
            serde_json::json!({"item": {"id": "t1", "name": "First", "items": []}}),
        );
        state.apply_push(kind, &msg);
        assert_eq!(state.themes.len(), 1);

        let (kind, msg) = push(
            PushEventKind::ThemeUpdated,
            serde_json::json!({"item": {"id": "t1", "name": "Renamed", "items": []}}),
        );
        state.apply_push(kind, &msg);
        assert_eq!(state.themes.len(), 1);
        assert_eq!(state.themes[0].name, "Renamed");
    }

    #[test]
    fn theme_deleted_clears_active_when_it_was_active() {
        let mut state = StoreState::default();
        state.upsert_theme(theme("t1", "Doomed"));
        state.active_theme_id = Some("t1".to_owned());

        let (kind, msg) = push(
            PushEventKind::ThemeDeleted,
            serde_json::json!({"item": {"id": "t1", "name": "Doomed"}}),
        );
        state.apply_push(kind, &msg);
        assert!(state.themes.is_empty());
        assert_eq!(state.active_theme_id, None);
    }

    #[test]
    fn draft_validation() {
        let short = ThemeDraft {
            name: "Too small".to_owned(),
            description: String::new(),
            items: vec!["one".to_owned(); 24],
        };
        assert!(matches!(
            validate_draft(&short),
            Err(BingoClientError::ValidationFailure(_))
        ));

        let ok = ThemeDraft {
            name: "Big enough".to_owned(),
            description: String::new(),
            items: vec!["item".to_owned(); 25],
        };
        assert!(validate_draft(&ok).is_ok());
    }

    #[test]
    fn user_message_prefers_server_text() {
        let err = BingoClientError::ServerFailure {
            message: "database unavailable".to_owned(),
        };
        assert_eq!(user_message(&err, "fallback"), "database unavailable");

        let err = BingoClientError::TransportFailure("connection refused".to_owned());
        assert_eq!(user_message(&err, "fallback"), "fallback");
    }
}
