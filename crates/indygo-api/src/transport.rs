// Transport configuration for building the portal HTTP client.
//
// Timeout, redirect bound, and cookie-jar settings live here so the
// client module stays focused on request mechanics. The redirect bound
// is the guard against the portal's redirect-loop-on-bad-session
// behaviour: reqwest aborts the chain once the bound is exceeded and
// the session layer classifies that as an authentication failure.

use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::Jar;
use reqwest::redirect;

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout. Every network operation in a refresh cycle
    /// (login pre-fetch, login POST, discovery fetch, status fetch) is
    /// individually bounded by this.
    pub timeout: Duration,
    /// Maximum redirects to follow before a request is abandoned.
    pub redirect_limit: usize,
    pub cookie_jar: Option<Arc<Jar>>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            redirect_limit: 5,
            cookie_jar: None,
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, crate::error::Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .redirect(redirect::Policy::limited(self.redirect_limit))
            .user_agent("indygo-api/0.1.0");

        if let Some(ref jar) = self.cookie_jar {
            builder = builder.cookie_provider(Arc::clone(jar));
        }

        builder.build().map_err(crate::error::Error::Network)
    }

    /// Create a config with a fresh cookie jar (session auth requires one).
    pub fn with_cookie_jar(mut self) -> Self {
        self.cookie_jar = Some(Arc::new(Jar::default()));
        self
    }
}
