// ── Core error types ──
//
// User-facing errors from indygo-core. Consumers never see HTTP status
// codes or serde detail directly; the `From<indygo_api::Error>` impl
// translates transport-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Cannot reach the portal: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Portal returned an unexpected response: {message}")]
    UpstreamFormat { message: String },

    #[error("Failed to parse portal data: {message}")]
    ParseFailed { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    /// True for authentication-class failures. The coordinator counts
    /// these separately so repeated ones surface as a persistent
    /// needs-reauthentication state rather than endless silent retries.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthenticationFailed { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<indygo_api::Error> for CoreError {
    fn from(err: indygo_api::Error) -> Self {
        match err {
            indygo_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            indygo_api::Error::SessionExpired => CoreError::AuthenticationFailed {
                message: "session expired -- re-authentication required".into(),
            },
            indygo_api::Error::Network(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else {
                    CoreError::ConnectionFailed {
                        reason: e.to_string(),
                    }
                }
            }
            indygo_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid URL: {e}"),
            },
            indygo_api::Error::UpstreamFormat { status, context } => CoreError::UpstreamFormat {
                message: format!("HTTP {status}: {context}"),
            },
            indygo_api::Error::Parse { fragment, message } => CoreError::ParseFailed {
                message: format!("{fragment}: {message}"),
            },
        }
    }
}
