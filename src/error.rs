use thiserror::Error;

/// WebSocket connection timeout for provider handshakes, in seconds
pub const WS_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Errors that can occur inside one relay session
///
/// Every variant is fatal to at most one session: failures are converted
/// to client-visible `error`/`disconnected` messages at the relay boundary
/// and never escape the per-connection task. Malformed reconstruction
/// linkage is deliberately absent from this taxonomy - the transcript
/// graph's cycle guard absorbs it and returns partial ordered text.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Missing or unusable credentials. Reported once, no retry; the user
    /// must reinitiate the session.
    #[error("configuration error: {0}")]
    Config(String),

    /// Network or protocol failure on the provider connection. The
    /// session is torn down; there is no automatic reconnect.
    #[error("upstream connection error: {0}")]
    Upstream(String),

    /// Malformed message from the client or the provider. The message is
    /// dropped and the session continues where possible.
    #[error("protocol error: {0}")]
    Protocol(String),
}
