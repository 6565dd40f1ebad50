#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Liveness monitor tests: outage detection, recovery, and the user
//! refetch that heals a degraded session.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use bingo_client::storage::TOKEN_KEY;
use bingo_client::{BingoApp, Connectivity, MemoryStorage, Severity, Storage};
use common::{spawn_api, test_config, wait_until, ApiState, ScriptedConnector};

#[tokio::test]
async fn outage_and_recovery_notify_once_each() {
    let state = ApiState::new("tok-live");
    let base = spawn_api(Arc::clone(&state)).await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set(TOKEN_KEY, "tok-live");
    let (app, _nav) = BingoApp::new(
        test_config(&base),
        storage,
        ScriptedConnector::always_refuse(),
    );
    app.boot("https://app.example.com/").await;

    assert!(
        wait_until(Duration::from_secs(2), || {
            app.liveness().connectivity() == Connectivity::Connected
        })
        .await
    );
    // The first verdict is silent.
    assert!(!app.notifier().current().visible);

    state.health_ok.store(false, Ordering::SeqCst);
    assert!(
        wait_until(Duration::from_secs(2), || {
            app.liveness().connectivity() == Connectivity::Disconnected
        })
        .await
    );
    let snackbar = app.notifier().current();
    assert_eq!(snackbar.message, "Lost connection to server");
    assert_eq!(snackbar.severity, Severity::Error);

    state.health_ok.store(true, Ordering::SeqCst);
    assert!(
        wait_until(Duration::from_secs(2), || {
            app.liveness().connectivity() == Connectivity::Connected
        })
        .await
    );
    let snackbar = app.notifier().current();
    assert_eq!(snackbar.message, "Connected to server");
    assert_eq!(snackbar.severity, Severity::Success);
}

#[tokio::test]
async fn recovery_refetches_the_missing_user() {
    let state = ApiState::new("tok-heal");
    let base = spawn_api(Arc::clone(&state)).await;
    let storage = Arc::new(MemoryStorage::new());
    storage.set(TOKEN_KEY, "tok-heal");
    let (app, _nav) = BingoApp::new(
        test_config(&base),
        storage,
        ScriptedConnector::always_refuse(),
    );
    app.boot("https://app.example.com/").await;
    assert!(
        wait_until(Duration::from_secs(2), || {
            app.liveness().connectivity() == Connectivity::Connected
        })
        .await
    );

    // Simulate a session that rehydrated without reaching the server:
    // token held, user unknown.
    app.session().set_user(None);
    state.health_ok.store(false, Ordering::SeqCst);
    assert!(
        wait_until(Duration::from_secs(2), || {
            app.liveness().connectivity() == Connectivity::Disconnected
        })
        .await
    );

    state.health_ok.store(true, Ordering::SeqCst);
    assert!(
        wait_until(Duration::from_secs(2), || {
            app.session().user().is_some()
        })
        .await
    );
    assert!(app.session().is_authenticated());
}

#[tokio::test]
async fn stop_halts_probing() {
    let state = ApiState::new("tok-stop");
    let base = spawn_api(Arc::clone(&state)).await;
    let (app, _nav) = BingoApp::new(
        test_config(&base),
        Arc::new(MemoryStorage::new()),
        ScriptedConnector::always_refuse(),
    );
    app.boot("https://app.example.com/").await;
    assert!(
        wait_until(Duration::from_secs(2), || {
            app.liveness().connectivity() == Connectivity::Connected
        })
        .await
    );

    app.liveness().stop();
    state.health_ok.store(false, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(200)).await;
    // No probe ran, so the stale verdict stands.
    assert_eq!(app.liveness().connectivity(), Connectivity::Connected);
}

#[tokio::test]
async fn start_is_idempotent() {
    let state = ApiState::new("tok-restart");
    let base = spawn_api(Arc::clone(&state)).await;
    let (app, _nav) = BingoApp::new(
        test_config(&base),
        Arc::new(MemoryStorage::new()),
        ScriptedConnector::always_refuse(),
    );
    app.boot("https://app.example.com/").await;
    app.liveness().start();
    app.liveness().start();
    assert!(
        wait_until(Duration::from_secs(2), || {
            app.liveness().connectivity() == Connectivity::Connected
        })
        .await
    );
}
