//! Authenticated HTTP client for the bingo API.
//!
//! [`HttpClient`] wraps `reqwest`, injects the bearer token on every
//! request, and classifies every failure into the crate's error taxonomy:
//!
//! - send errors and timeouts → [`BingoClientError::TransportFailure`] /
//!   [`BingoClientError::Timeout`]
//! - 401/403, or an error body naming a token problem →
//!   [`BingoClientError::AuthFailure`]
//! - 5xx → [`BingoClientError::ServerFailure`]
//! - any other non-2xx → [`BingoClientError::RequestFailure`]
//!
//! Authentication failures are additionally reported to a single-slot
//! sink, so the session manager observes every expired token no matter
//! which component issued the request.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::BingoConfig;
use crate::error::{BingoClientError, Result};

/// Error-body phrases that mean the credential is no longer valid, matched
/// case-insensitively against the `error`/`message` fields.
const AUTH_ERROR_PHRASES: &[&str] = &["bad token", "invalid token", "token expired", "unauthorized"];

type AuthFailureSink = Arc<dyn Fn(&BingoClientError) + Send + Sync>;

struct Inner {
    base_url: String,
    http: reqwest::Client,
    token: RwLock<Option<String>>,
    auth_sink: RwLock<Option<AuthFailureSink>>,
}

/// HTTP client for the bingo API. Cheap to clone; clones share the token
/// slot and the auth-failure sink.
#[derive(Clone)]
pub struct HttpClient {
    inner: Arc<Inner>,
}

impl HttpClient {
    pub fn new(config: &BingoConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                base_url: config.api_base_url.clone(),
                http: reqwest::Client::new(),
                token: RwLock::new(None),
                auth_sink: RwLock::new(None),
            }),
        }
    }

    /// Sets or clears the bearer token attached to subsequent requests.
    pub fn set_token(&self, token: Option<String>) {
        *self.inner.token.write() = token;
    }

    /// The currently attached bearer token.
    pub fn token(&self) -> Option<String> {
        self.inner.token.read().clone()
    }

    /// Whether requests currently carry an `Authorization` header.
    pub fn has_authorization(&self) -> bool {
        self.inner.token.read().is_some()
    }

    /// Installs the auth-failure sink. Single slot: installing a second
    /// sink replaces the first.
    pub fn set_auth_failure_sink(&self, sink: impl Fn(&BingoClientError) + Send + Sync + 'static) {
        let mut slot = self.inner.auth_sink.write();
        if slot.is_some() {
            warn!("replacing previously installed auth-failure sink");
        }
        *slot = Some(Arc::new(sink));
    }

    /// `GET` an endpoint and decode the JSON response.
    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let value = self.send(Method::GET, endpoint, None, None).await?;
        decode(value)
    }

    /// `GET` with a per-request timeout, for the liveness probe.
    pub async fn get_with_timeout<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<T> {
        let value = self.send(Method::GET, endpoint, None, Some(timeout)).await?;
        decode(value)
    }

    /// `POST` a JSON body and decode the JSON response.
    pub async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let value = self.send(Method::POST, endpoint, Some(body), None).await?;
        decode(value)
    }

    /// `PUT` a JSON body and decode the JSON response.
    pub async fn put<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &impl Serialize,
    ) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let value = self.send(Method::PUT, endpoint, Some(body), None).await?;
        decode(value)
    }

    /// `DELETE` an endpoint and decode the JSON response.
    pub async fn delete<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let value = self.send(Method::DELETE, endpoint, None, None).await?;
        decode(value)
    }

    async fn send(
        &self,
        method: Method,
        endpoint: &str,
        body: Option<Value>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let url = format!("{}{endpoint}", self.inner.base_url);
        debug!(%method, %url, "sending API request");

        let mut request = self.inner.http.request(method, &url);
        if let Some(token) = self.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                BingoClientError::Timeout
            } else {
                BingoClientError::TransportFailure(err.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| BingoClientError::TransportFailure(err.to_string()))?;
        let value = parse_body(&text);

        match classify(status, value, &text) {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_auth_failure() {
                    warn!(%url, error = %err, "authentication failure");
                    let sink = self.inner.auth_sink.read().clone();
                    if let Some(sink) = sink {
                        sink(&err);
                    }
                }
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("base_url", &self.inner.base_url)
            .field("has_token", &self.has_authorization())
            .finish()
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

/// Parses a response body, treating an empty or non-JSON body as `null`.
fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or(Value::Null)
}

/// The server puts error details under `error` or `message`.
fn body_error_text(value: &Value) -> Option<&str> {
    value
        .get("error")
        .and_then(Value::as_str)
        .or_else(|| value.get("message").and_then(Value::as_str))
}

fn is_auth_error_body(value: &Value) -> bool {
    let Some(text) = body_error_text(value) else {
        return false;
    };
    let text = text.to_lowercase();
    AUTH_ERROR_PHRASES.iter().any(|phrase| text.contains(phrase))
}

/// Classifies a completed HTTP exchange into the error taxonomy.
fn classify(status: StatusCode, value: Value, raw: &str) -> Result<Value> {
    let auth = status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || is_auth_error_body(&value);

    if auth {
        return Err(BingoClientError::AuthFailure {
            message: error_message(&value, status, raw),
        });
    }
    if status.is_success() {
        return Ok(value);
    }
    if status.is_server_error() {
        return Err(BingoClientError::ServerFailure {
            message: error_message(&value, status, raw),
        });
    }
    Err(BingoClientError::RequestFailure {
        status: status.as_u16(),
        message: error_message(&value, status, raw),
    })
}

fn error_message(value: &Value, status: StatusCode, raw: &str) -> String {
    if let Some(text) = body_error_text(value) {
        return text.to_owned();
    }
    let raw = raw.trim();
    if !raw.is_empty() && raw.len() <= 200 {
        return raw.to_owned();
    }
    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_owned()
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
    use serde_json::json;

    #[test]
    fn success_passes_body_through() {
        let value = classify(StatusCode::OK, json!({"ok": true}), "").unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[test]
    fn unauthorized_status_is_auth_failure() {
        let err = classify(StatusCode::UNAUTHORIZED, Value::Null, "").unwrap_err();
        assert!(err.is_auth_failure());
        let err = classify(StatusCode::FORBIDDEN, Value::Null, "").unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn token_phrases_in_body_are_auth_failures_regardless_of_status() {
        for phrase in ["Bad Token", "invalid token", "Token Expired", "UNAUTHORIZED"] {
            let err = classify(
                StatusCode::BAD_REQUEST,
                json!({"error": format!("request rejected: {phrase}")}),
                "",
            )
            .unwrap_err();
            assert!(err.is_auth_failure(), "phrase {phrase:?} not classified");
        }
    }

    #[test]
    fn message_field_is_also_checked() {
        let err = classify(
            StatusCode::OK,
            json!({"message": "token expired, please sign in again"}),
            "",
        )
        .unwrap_err();
        assert!(err.is_auth_failure());
    }

    #[test]
    fn server_errors_are_server_failures() {
        let err = classify(
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({"error": "database unavailable"}),
            "",
        )
        .unwrap_err();
        match err {
            BingoClientError::ServerFailure { message } => {
                assert_eq!(message, "database unavailable");
            }
            other => panic!("expected ServerFailure, got {other:?}"),
        }
    }

    #[test]
    fn other_statuses_are_request_failures() {
        let err = classify(StatusCode::NOT_FOUND, Value::Null, "").unwrap_err();
        match err {
            BingoClientError::RequestFailure { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "Not Found");
            }
            other => panic!("expected RequestFailure, got {other:?}"),
        }
    }

    #[test]
    fn plain_text_error_bodies_are_carried() {
        let err = classify(StatusCode::BAD_REQUEST, Value::Null, "row out of range").unwrap_err();
        match err {
            BingoClientError::RequestFailure { message, .. } => {
                assert_eq!(message, "row out of range");
            }
            other => panic!("expected RequestFailure, got {other:?}"),
        }
    }

    #[test]
    fn empty_body_parses_as_null() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("  "), Value::Null);
        assert_eq!(parse_body("{\"a\":1}"), json!({"a": 1}));
        assert_eq!(parse_body("<html>oops</html>"), Value::Null);
    }
}
