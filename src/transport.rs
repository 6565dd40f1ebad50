//! Transport abstraction for the push channel.
//!
//! The [`Transport`] trait defines a bidirectional text message channel
//! between the client and server. The push channel speaks JSON text
//! messages, so every transport implementation must handle framing
//! internally (e.g., WebSocket frames).
//!
//! Because the push channel redials on its own after a drop, connection
//! setup lives behind the separate [`Connector`] trait rather than on the
//! transport itself: the channel holds a connector and asks it for a fresh
//! transport on every (re)connect attempt.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use bingo_client::error::BingoClientError;
//! use bingo_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), BingoClientError> {
//!         // Send the JSON text message over your transport
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, BingoClientError>> {
//!         // Receive the next JSON text message
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), BingoClientError> {
//!         // Gracefully shut down the connection
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector { /* ... */ }
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self) -> Result<Box<dyn Transport>, BingoClientError> {
//!         Ok(Box::new(MyTransport { /* ... */ }))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::BingoClientError;

/// A bidirectional text message transport for the push channel.
///
/// Implementors shuttle serialized JSON strings between the client and
/// server. Each call to [`send`](Transport::send) transmits one complete
/// JSON message; each call to [`recv`](Transport::recv) returns one.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it
/// is used inside `tokio::select!`. If `recv` is cancelled before
/// completion, calling it again must not lose data. Channel-based
/// implementations (e.g., wrapping `mpsc::Receiver`) are naturally
/// cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`BingoClientError::TransportSend`] if the message could not
    /// be sent (e.g., connection broken, write buffer full).
    async fn send(&mut self, message: String) -> Result<(), BingoClientError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed cleanly by the server
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see [trait documentation](Transport)).
    async fn recv(&mut self) -> Option<Result<String, BingoClientError>>;

    /// Close the transport connection gracefully.
    ///
    /// After calling this method, subsequent calls to
    /// [`send`](Transport::send) and [`recv`](Transport::recv) may return
    /// errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations
    /// should still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), BingoClientError>;
}

/// Dials a fresh [`Transport`].
///
/// The push channel calls [`connect`](Connector::connect) once per
/// (re)connect attempt, so the connector must be reusable and carry
/// everything needed to establish a connection (URL, TLS config, etc.).
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Establish a new connection to the server.
    ///
    /// # Errors
    ///
    /// Returns [`BingoClientError::TransportFailure`] (or a more specific
    /// variant) when the connection cannot be established; the push channel
    /// treats any error here as a failed attempt and schedules a reconnect.
    async fn connect(&self) -> Result<Box<dyn Transport>, BingoClientError>;
}
