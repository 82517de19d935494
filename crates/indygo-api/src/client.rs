// Portal HTTP client.
//
// Wraps `reqwest::Client` with MyIndygo URL construction, response
// classification, and the fetch-parse cycle. The login flow lives in
// `session.rs` and the command surface in `commands.rs`, both as
// inherent methods, to keep this module focused on transport mechanics.

use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use secrecy::SecretString;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::model::PoolData;
use crate::parser;
use crate::session::is_login_page;
use crate::transport::TransportConfig;

/// Production portal root.
pub const PORTAL_BASE_URL: &str = "https://myindygo.com";

/// Authenticated client for one pool on the MyIndygo portal.
///
/// Scoped to a single (email, password, pool id) triple. The cookie jar
/// is private to this instance -- one pool's credentials never share a
/// session with another. Session state is only mutated from within a
/// refresh cycle, which the coordinator serialises, so the flags here
/// need no locking beyond atomics.
pub struct IndygoClient {
    http: reqwest::Client,
    base_url: Url,
    email: String,
    password: SecretString,
    pool_id: String,
    /// Whether we believe the session cookie is still accepted.
    authenticated: AtomicBool,
    /// Relay identifier learned from the last successful discovery parse.
    /// The remote-sync command path needs it.
    relay_id: RwLock<Option<String>>,
}

impl IndygoClient {
    /// Create a client against an explicit portal root (tests point this
    /// at a mock server).
    ///
    /// If the transport config doesn't already carry a cookie jar, one is
    /// created -- the portal's session auth requires cookies.
    pub fn new(
        base_url: Url,
        email: impl Into<String>,
        password: SecretString,
        pool_id: impl Into<String>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let config = if transport.cookie_jar.is_some() {
            transport.clone()
        } else {
            transport.clone().with_cookie_jar()
        };
        let http = config.build_client()?;
        Ok(Self {
            http,
            base_url,
            email: email.into(),
            password,
            pool_id: pool_id.into(),
            authenticated: AtomicBool::new(false),
            relay_id: RwLock::new(None),
        })
    }

    /// Create a client against the production portal.
    pub fn portal(
        email: impl Into<String>,
        password: SecretString,
        pool_id: impl Into<String>,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let base_url = Url::parse(PORTAL_BASE_URL)?;
        Self::new(base_url, email, password, pool_id, transport)
    }

    /// The pool this client is scoped to.
    pub fn pool_id(&self) -> &str {
        &self.pool_id
    }

    /// The portal root URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The relay id learned from the last successful fetch, if any.
    pub fn relay_id(&self) -> Option<String> {
        self.relay_id.read().expect("relay lock poisoned").clone()
    }

    // ── Session flags (mutated by session.rs) ────────────────────────

    pub(crate) fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub(crate) fn set_authenticated(&self, value: bool) {
        self.authenticated.store(value, Ordering::Release);
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn credentials(&self) -> (&str, &SecretString) {
        (&self.email, &self.password)
    }

    // ── URL builders ─────────────────────────────────────────────────

    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    fn pool_url(&self, suffix: &str) -> Result<Url, Error> {
        self.url(&format!("/pools/{}/{suffix}", self.pool_id))
    }

    // ── Fetch pipeline ───────────────────────────────────────────────

    /// Fetch and parse the pool's current state.
    ///
    /// Ensures a valid session first. If the portal rejects the session
    /// mid-fetch (401/403, redirect chain back to login, or a login page
    /// where data was expected), the session is cleared and the whole
    /// sequence retried exactly once before the failure is surfaced as
    /// an authentication error.
    pub async fn fetch_pool_data(&self) -> Result<PoolData, Error> {
        self.ensure_session().await?;

        match self.fetch_cycle().await {
            Err(e) if e.is_session_expired() => {
                debug!("session rejected mid-fetch -- re-authenticating once");
                self.invalidate_session();
                self.ensure_session().await?;
                match self.fetch_cycle().await {
                    Err(e) if e.is_session_expired() => Err(Error::Authentication {
                        message: "session rejected again after a fresh login".into(),
                    }),
                    result => result,
                }
            }
            result => result,
        }
    }

    /// One discovery + status + parse pass.
    async fn fetch_cycle(&self) -> Result<PoolData, Error> {
        let discovery_html = self.fetch_discovery().await?;
        let status_body = self.fetch_status().await?;

        let data = parser::parse_pool_data(&self.pool_id, &discovery_html, &status_body, Utc::now())?;

        *self.relay_id.write().expect("relay lock poisoned") = data.relay_id.clone();

        Ok(data)
    }

    /// `GET /pools/{id}/devices` -- the discovery page (HTML).
    async fn fetch_discovery(&self) -> Result<String, Error> {
        let url = self.pool_url("devices")?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(classify_fetch_error)?;

        let body = classify_data_response(resp, "discovery page").await?;
        if is_login_page(&body) {
            debug!("discovery fetch answered with the login page");
            return Err(Error::SessionExpired);
        }
        Ok(body)
    }

    /// `GET /pools/{id}/status` -- the status endpoint (JSON).
    async fn fetch_status(&self) -> Result<String, Error> {
        let url = self.pool_url("status")?;
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(classify_fetch_error)?;

        let body = classify_data_response(resp, "status endpoint").await?;
        if looks_like_html(&body) {
            if is_login_page(&body) {
                debug!("status fetch answered with the login page");
                return Err(Error::SessionExpired);
            }
            return Err(Error::UpstreamFormat {
                status: 200,
                context: "status endpoint returned HTML where JSON was expected".into(),
            });
        }
        Ok(body)
    }
}

/// Shared status-code classification for data fetches.
async fn classify_data_response(resp: reqwest::Response, context: &str) -> Result<String, Error> {
    let status = resp.status();

    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(Error::SessionExpired);
    }

    if !status.is_success() {
        return Err(Error::UpstreamFormat {
            status: status.as_u16(),
            context: format!("{context} fetch failed"),
        });
    }

    resp.text().await.map_err(Error::Network)
}

/// A redirect chain that exhausts the transport bound during a data fetch
/// means the portal is bouncing us back to login: treat it as session
/// expiry so the retry-once path kicks in.
fn classify_fetch_error(e: reqwest::Error) -> Error {
    if e.is_redirect() {
        Error::SessionExpired
    } else {
        Error::Network(e)
    }
}

fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start();
    head.starts_with('<')
}
