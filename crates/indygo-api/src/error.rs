use thiserror::Error;

/// Top-level error type for the `indygo-api` crate.
///
/// Covers every failure mode of the login + fetch + parse pipeline.
/// `indygo-core` maps these into user-facing diagnostics; consumers of
/// the coordinator never see raw HTTP or serde detail.
#[derive(Debug, Error)]
pub enum Error {
    // ── Authentication ──────────────────────────────────────────────
    /// Login failed: wrong credentials, or the portal bounced the login
    /// POST through more redirects than the configured bound (it is known
    /// to redirect-loop on rejected sessions).
    #[error("Authentication failed: {message}")]
    Authentication { message: String },

    /// An established session was rejected mid-fetch (401/403, or the
    /// portal answered with its login page where data was expected).
    /// The client clears the session and retries once before surfacing
    /// this as fatal.
    #[error("Session expired -- re-authentication required")]
    SessionExpired,

    // ── Transport ───────────────────────────────────────────────────
    /// Network-level failure: connection refused, DNS, TLS, timeout.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// URL construction error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── Upstream shape ──────────────────────────────────────────────
    /// The portal answered with a shape we can't hand to the parser:
    /// non-success non-redirect status, or HTML where JSON was expected.
    #[error("Unexpected upstream response (HTTP {status}): {context}")]
    UpstreamFormat { status: u16, context: String },

    // ── Parsing ─────────────────────────────────────────────────────
    /// A required payload fragment could not be interpreted. `fragment`
    /// names the block (root sensors, a module id, the discovery page)
    /// so failures are attributable.
    #[error("Parse error in {fragment}: {message}")]
    Parse { fragment: String, message: String },
}

impl Error {
    pub(crate) fn parse(fragment: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            fragment: fragment.into(),
            message: message.into(),
        }
    }

    /// True if clearing the session and logging in again might resolve
    /// this error. Drives the client's single fetch retry.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }

    /// True for any authentication-class failure, expired or outright
    /// rejected. The coordinator uses this to surface a persistent
    /// needs-reauthentication state instead of retrying silently forever.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::SessionExpired)
    }

    /// True if this is a transient error worth retrying on the normal
    /// polling interval.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
