//! Errors surfaced while assembling or running the proxy.

use thiserror::Error;

/// Top-level error type for the proxy orchestrator.
///
/// Transport-level failures inside individual HTTP requests are reported to
/// the HTTP caller directly (status code or stream close) and never surface
/// here; this type only covers configuration, backend startup, and the
/// lifetime of the HTTP server itself.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Neither a default nor any named stdio server was supplied.
    #[error("no stdio servers configured to run")]
    NoServersConfigured,

    /// Launching a stdio child process failed.
    #[error("failed to spawn stdio server `{command}`: {source}")]
    Spawn {
        /// The executable that could not be spawned.
        command: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The child spawned but the MCP initialize handshake did not complete.
    #[error("MCP handshake with `{command}` failed: {source}")]
    Handshake {
        /// The executable the handshake was attempted with.
        command: String,
        /// The SDK-level initialization error.
        #[source]
        source: rmcp::service::ClientInitializeError,
    },

    /// Binding the listen socket failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: String,
        /// The underlying OS error.
        #[source]
        source: std::io::Error,
    },

    /// The HTTP server terminated abnormally.
    #[error("http server error: {0}")]
    Serve(#[source] std::io::Error),
}
