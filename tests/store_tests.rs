#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Game state store integration tests: the API write path, local
//! validation, theme administration, and push event application.

mod common;

use std::sync::Arc;
use std::time::Duration;

use bingo_client::storage::TOKEN_KEY;
use bingo_client::{BingoApp, BingoClientError, MemoryStorage, Storage};
use common::{
    sample_card_json, sample_theme_json, spawn_api, test_config, wait_until, ApiState,
    ConnectOutcome, ScriptedConnector,
};
use serde_json::json;

async fn booted_app(
    state: Arc<ApiState>,
    connector: Arc<ScriptedConnector>,
) -> (BingoApp, tokio::sync::mpsc::UnboundedReceiver<String>) {
    let base = spawn_api(state).await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set(TOKEN_KEY, "tok-store");
    let (app, nav) = BingoApp::new(test_config(&base), storage, connector);
    app.boot("https://app.example.com/").await;
    (app, nav)
}

#[tokio::test]
async fn generate_new_card_becomes_current() {
    let state = ApiState::new("tok-store");
    let (app, _nav) = booted_app(state, ScriptedConnector::always_refuse()).await;

    let card = app.store().generate_new_card().await.unwrap();
    assert_eq!(card.id, "card-new");
    assert_eq!(app.store().current_card_id().as_deref(), Some("card-new"));
    // The refetched list contains the new card.
    assert!(app.store().cards().iter().any(|c| c.id == "card-new"));
    assert!(app.store().has_current_card());
    assert!(!app.store().loading());
}

#[tokio::test]
async fn fetch_cards_defaults_current_to_newest() {
    let state = ApiState::new("tok-store");
    *state.cards.lock().unwrap() =
        json!([sample_card_json("card-old"), sample_card_json("card-new")]);
    let (app, _nav) = booted_app(state, ScriptedConnector::always_refuse()).await;

    app.store().fetch_cards().await.unwrap();
    assert_eq!(app.store().cards().len(), 2);
    assert_eq!(app.store().current_card_id().as_deref(), Some("card-new"));
}

#[tokio::test]
async fn fetch_cards_treats_null_as_empty() {
    let state = ApiState::new("tok-store");
    *state.cards.lock().unwrap() = json!(null);
    let (app, _nav) = booted_app(state, ScriptedConnector::always_refuse()).await;

    app.store().fetch_cards().await.unwrap();
    assert!(app.store().cards().is_empty());
    assert_eq!(app.store().current_card_id(), None);
}

#[tokio::test]
async fn mark_cell_validates_locally() {
    let state = ApiState::new("tok-store");
    *state.cards.lock().unwrap() = json!([sample_card_json("card-1")]);
    let (app, _nav) = booted_app(state, ScriptedConnector::always_refuse()).await;
    app.store().fetch_cards().await.unwrap();

    let err = app.store().mark_cell("card-1", 5, 0).await.unwrap_err();
    assert!(matches!(err, BingoClientError::ValidationFailure(_)));

    let err = app.store().mark_cell("no-such-card", 0, 0).await.unwrap_err();
    assert!(matches!(err, BingoClientError::ValidationFailure(_)));
}

#[tokio::test]
async fn mark_cell_applies_the_server_card() {
    let state = ApiState::new("tok-store");
    *state.cards.lock().unwrap() = json!([sample_card_json("card-1")]);
    let (app, _nav) = booted_app(state, ScriptedConnector::always_refuse()).await;
    app.store().fetch_cards().await.unwrap();

    let card = app.store().mark_cell("card-1", 2, 3).await.unwrap();
    assert!(card.is_marked(2, 3));
    let stored = app.store().current_card().unwrap();
    assert!(stored.is_marked(2, 3));

    // Toggling the same cell again unmarks it.
    let card = app.store().mark_cell("card-1", 2, 3).await.unwrap();
    assert!(!card.is_marked(2, 3));
}

#[tokio::test]
async fn fetch_themes_maps_the_empty_active_sentinel() {
    let state = ApiState::new("tok-store");
    *state.themes.lock().unwrap() = json!({
        "themes": [sample_theme_json("t1", "Streams"), sample_theme_json("t2", "Deploys")],
        "active_theme_id": "t2",
    });
    let (app, _nav) = booted_app(Arc::clone(&state), ScriptedConnector::always_refuse()).await;

    app.store().fetch_themes().await.unwrap();
    assert_eq!(app.store().themes().len(), 2);
    assert_eq!(app.store().active_theme().unwrap().name, "Deploys");

    *state.themes.lock().unwrap() = json!({"themes": [], "active_theme_id": ""});
    app.store().fetch_themes().await.unwrap();
    assert_eq!(app.store().active_theme_id(), None);
}

#[tokio::test]
async fn create_theme_rejects_short_drafts_locally() {
    let state = ApiState::new("tok-store");
    let (app, _nav) = booted_app(state, ScriptedConnector::always_refuse()).await;

    let draft = bingo_client::protocol::ThemeDraft {
        name: "Too small".to_owned(),
        description: String::new(),
        items: vec!["item".to_owned(); 24],
    };
    let err = app.store().create_theme(&draft).await.unwrap_err();
    assert!(matches!(err, BingoClientError::ValidationFailure(_)));
    // Nothing was sent, so nothing was created server-side.
    assert_eq!(app.store().themes().len(), 0);
}

#[tokio::test]
async fn create_theme_upserts_the_result() {
    let state = ApiState::new("tok-store");
    let (app, _nav) = booted_app(state, ScriptedConnector::always_refuse()).await;

    let draft = bingo_client::protocol::ThemeDraft {
        name: "Launch day".to_owned(),
        description: "Things that happen on launch day".to_owned(),
        items: vec!["item".to_owned(); 25],
    };
    let theme = app.store().create_theme(&draft).await.unwrap();
    assert_eq!(theme.name, "Launch day");
    assert!(app.store().themes().iter().any(|t| t.id == theme.id));
}

#[tokio::test]
async fn delete_theme_clears_active_when_needed() {
    let state = ApiState::new("tok-store");
    *state.themes.lock().unwrap() = json!({
        "themes": [sample_theme_json("t1", "Doomed")],
        "active_theme_id": "t1",
    });
    let (app, _nav) = booted_app(state, ScriptedConnector::always_refuse()).await;
    app.store().fetch_themes().await.unwrap();

    app.store().delete_theme("t1").await.unwrap();
    assert!(app.store().themes().is_empty());
    assert_eq!(app.store().active_theme_id(), None);
}

#[tokio::test]
async fn set_active_theme_round_trips() {
    let state = ApiState::new("tok-store");
    *state.themes.lock().unwrap() = json!({
        "themes": [sample_theme_json("t1", "Streams")],
        "active_theme_id": "",
    });
    let (app, _nav) = booted_app(state, ScriptedConnector::always_refuse()).await;
    app.store().fetch_themes().await.unwrap();

    app.store().set_active_theme(Some("t1")).await.unwrap();
    assert_eq!(app.store().active_theme_id().as_deref(), Some("t1"));

    app.store().set_active_theme(None).await.unwrap();
    assert_eq!(app.store().active_theme_id(), None);
}

#[tokio::test]
async fn set_theme_complete_updates_the_catalog() {
    let state = ApiState::new("tok-store");
    *state.themes.lock().unwrap() = json!({
        "themes": [sample_theme_json("t1", "Streams")],
        "active_theme_id": "",
    });
    let (app, _nav) = booted_app(state, ScriptedConnector::always_refuse()).await;
    app.store().fetch_themes().await.unwrap();

    let theme = app.store().set_theme_complete("t1", true).await.unwrap();
    assert!(theme.is_complete);
    assert!(app.store().themes()[0].is_complete);
}

#[tokio::test]
async fn server_errors_surface_with_the_server_message() {
    let state = ApiState::new("tok-store");
    state
        .fail_cards
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let (app, _nav) = booted_app(state, ScriptedConnector::always_refuse()).await;

    let err = app.store().fetch_cards().await.unwrap_err();
    assert!(matches!(err, BingoClientError::ServerFailure { .. }));
    assert_eq!(app.store().error().as_deref(), Some("database unavailable"));
    assert_eq!(app.notifier().current().message, "database unavailable");

    app.store().clear_error();
    assert_eq!(app.store().error(), None);
}

#[tokio::test]
async fn push_events_flow_into_the_store() {
    let state = ApiState::new("tok-store");
    *state.themes.lock().unwrap() = json!({
        "themes": [sample_theme_json("t1", "Streams")],
        "active_theme_id": "",
    });

    let mut marked_card = sample_card_json("card-1");
    marked_card["marked_items"][0][0] = json!(true);
    let connector = ScriptedConnector::new(vec![ConnectOutcome::Serve(vec![
        Some(Ok(
            json!({"type": "initial_state", "marked_items": ["Already marked"]}).to_string(),
        )),
        Some(Ok(json!({
            "type": "item_marked",
            "item": "Fresh mark",
            "cards": [marked_card],
        })
        .to_string())),
        Some(Ok(json!({"type": "item_unmarked", "item": "Already marked"}).to_string())),
        Some(Ok(json!({"type": "theme_changed", "item": "t1"}).to_string())),
    ])]);

    // Load themes before the push channel opens so the theme change can
    // resolve its name.
    let base = spawn_api(state).await;
    let storage = Arc::new(MemoryStorage::new());
    let (app, _nav) = BingoApp::new(test_config(&base), storage, connector);
    app.session().set_token(Some("tok-store".to_owned()));
    app.store().fetch_themes().await.unwrap();
    app.boot("https://app.example.com/").await;

    assert!(
        wait_until(Duration::from_secs(2), || {
            app.store().active_theme_id().as_deref() == Some("t1")
        })
        .await
    );

    // The snapshot seeded the set, then the deltas applied in order.
    assert!(app.store().is_item_globally_marked("Fresh mark"));
    assert!(!app.store().is_item_globally_marked("Already marked"));
    // The cards payload replaced the list and kept a current card.
    let card = app.store().current_card().unwrap();
    assert_eq!(card.id, "card-1");
    assert!(card.is_marked(0, 0));
    // The theme change was surfaced to the user.
    assert_eq!(
        app.notifier().current().message,
        "Active theme changed to \"Streams\""
    );
}

#[tokio::test]
async fn is_app_ready_requires_connectivity_and_a_token() {
    let state = ApiState::new("tok-store");
    let (app, _nav) = booted_app(state, ScriptedConnector::always_refuse()).await;

    assert!(
        wait_until(Duration::from_secs(2), || app.store().is_app_ready()).await,
        "expected readiness once the probe connects"
    );

    app.session().logout(bingo_client::LogoutReason::UserRequest);
    assert!(!app.store().is_app_ready());
}
