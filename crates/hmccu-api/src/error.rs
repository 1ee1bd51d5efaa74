use std::net::SocketAddr;

use thiserror::Error;

use crate::xmlrpc::CodecError;

/// Top-level error type for the `hmccu-api` crate.
///
/// Covers every failure mode of the hub transport: outbound HTTP,
/// XML-RPC encoding and faults, the callback listener, and the
/// device-list endpoint. `hmccu-core` maps these into domain errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    /// TLS handshake or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The hub answered with a non-success HTTP status.
    #[error("Hub returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    // ── XML-RPC ─────────────────────────────────────────────────────
    /// The hub answered a call with an XML-RPC fault.
    #[error("XML-RPC fault {code}: {message}")]
    Fault { code: i32, message: String },

    /// A request or response body could not be encoded or decoded.
    #[error("XML-RPC codec error: {0}")]
    Codec(#[from] CodecError),

    // ── Callback listener ───────────────────────────────────────────
    /// The callback listener could not bind its socket.
    #[error("Cannot bind callback listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The local callback address could not be determined.
    #[error("Callback address discovery failed: {0}")]
    Discovery(String),

    // ── Device list ─────────────────────────────────────────────────
    /// The device-list document did not have the expected shape.
    #[error("Malformed device list: {message}")]
    DeviceList { message: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Timeout { .. } => true,
            _ => false,
        }
    }

    /// Returns `true` if the hub itself rejected the call.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault { .. })
    }
}
