//! Error types for the bingo client.

use thiserror::Error;

/// Errors that can occur when using the bingo client.
///
/// The first five variants form the classification assigned by
/// [`HttpClient`](crate::http::HttpClient) when a request fails; the rest
/// cover the push channel transport and local machinery.
#[derive(Debug, Error)]
pub enum BingoClientError {
    /// The server rejected the credential: 401, 403, or a token-related
    /// error body. Observed globally by the session manager.
    #[error("authentication failure: {message}")]
    AuthFailure {
        /// Human-readable error message from the server.
        message: String,
    },

    /// The server answered with a 5xx status.
    #[error("server failure: {message}")]
    ServerFailure {
        /// Server-provided error message, or the status reason.
        message: String,
    },

    /// The request never completed: connection refused, DNS failure, or the
    /// exchange was cut short.
    #[error("transport failure: {0}")]
    TransportFailure(String),

    /// Any other non-2xx response.
    #[error("request failed ({status}): {message}")]
    RequestFailure {
        /// HTTP status code.
        status: u16,
        /// Server-provided error message.
        message: String,
    },

    /// A client-side precondition was violated; no request was issued.
    #[error("validation failure: {0}")]
    ValidationFailure(String),

    /// Failed to serialize or deserialize a wire message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to send a message through the push channel transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the push channel transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The push channel transport was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl BingoClientError {
    /// Returns `true` for [`AuthFailure`](Self::AuthFailure).
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::AuthFailure { .. })
    }

    /// Returns `true` when the request never reached the server or the
    /// exchange was cut short, as opposed to the server answering with an
    /// error status.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::TransportFailure(_)
                | Self::Timeout
                | Self::TransportSend(_)
                | Self::TransportReceive(_)
                | Self::TransportClosed
                | Self::Io(_)
        )
    }
}

/// A specialized [`Result`] type for bingo client operations.
pub type Result<T> = std::result::Result<T, BingoClientError>;
