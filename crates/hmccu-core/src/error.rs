// ── Core error types ──
//
// User-facing errors from hmccu-core. These are NOT transport-specific:
// consumers never see HTTP status codes or XML parse failures directly.
// The `From<hmccu_api::Error>` impl translates transport-layer errors
// into domain-appropriate variants.

use thiserror::Error;

use hmccu_api::ProtocolViolation;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach hub at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Hub call timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("Not connected to the hub")]
    NotConnected,

    // ── Hub-side errors ──────────────────────────────────────────────
    #[error("Hub rejected call with fault {code}: {message}")]
    Fault { code: i32, message: String },

    #[error("Hub sent a malformed call: {0}")]
    ProtocolViolation(#[from] ProtocolViolation),

    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Invalid value {value:?} for {attribute}")]
    InvalidValue { attribute: String, value: String },

    #[error("Event handler failed: {message}")]
    Handler { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// `true` for failures of the hub connection itself (as opposed to
    /// state or data errors).
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::Timeout { .. } | Self::Fault { .. } | Self::Api { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hmccu_api::Error> for CoreError {
    fn from(err: hmccu_api::Error) -> Self {
        match err {
            hmccu_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout { timeout_secs: 0 }
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            hmccu_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            hmccu_api::Error::Timeout { timeout_secs } => CoreError::Timeout { timeout_secs },
            hmccu_api::Error::Tls(msg) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            hmccu_api::Error::Http { status, body } => CoreError::Api {
                message: body,
                status: Some(status),
            },
            hmccu_api::Error::Fault { code, message } => CoreError::Fault { code, message },
            hmccu_api::Error::Codec(e) => CoreError::Api {
                message: format!("Undecodable hub response: {e}"),
                status: None,
            },
            hmccu_api::Error::Bind { addr, source } => CoreError::ConnectionFailed {
                url: format!("http://{addr}"),
                reason: format!("callback listener: {source}"),
            },
            hmccu_api::Error::Discovery(reason) => CoreError::Config {
                message: format!("Cannot determine callback address: {reason}"),
            },
            hmccu_api::Error::DeviceList { message } => CoreError::Api {
                message: format!("Device list: {message}"),
                status: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_keep_code_and_message() {
        let err = CoreError::from(hmccu_api::Error::Fault {
            code: -2,
            message: "Unknown instance".into(),
        });
        assert!(matches!(err, CoreError::Fault { code: -2, .. }));
        assert!(err.is_transport());
    }

    #[test]
    fn discovery_failure_is_a_config_error() {
        let err = CoreError::from(hmccu_api::Error::Discovery("no route".into()));
        assert!(matches!(err, CoreError::Config { .. }));
        assert!(!err.is_transport());
        assert!(!CoreError::NotConnected.is_transport());
    }
}
