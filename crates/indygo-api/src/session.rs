// Cookie-session login flow.
//
// The portal uses a plain form login: GET /login seeds the session
// cookie, POST /login with the credentials promotes it. On a rejected
// session the portal does not answer 401 -- it redirects back to /login,
// and on some failure modes it redirect-loops. The transport's redirect
// bound turns that loop into an error we classify here.

use secrecy::ExposeSecret;
use tracing::debug;

use crate::client::IndygoClient;
use crate::error::Error;

impl IndygoClient {
    /// Make sure a login session exists, performing the login flow if the
    /// current session is missing or was invalidated.
    ///
    /// Called at the start of every fetch cycle; a no-op while the
    /// session is believed valid.
    pub async fn ensure_session(&self) -> Result<(), Error> {
        if self.is_authenticated() {
            return Ok(());
        }
        self.login().await
    }

    /// Drop the current session so the next [`ensure_session`] call logs
    /// in again.
    ///
    /// [`ensure_session`]: Self::ensure_session
    pub fn invalidate_session(&self) {
        self.set_authenticated(false);
    }

    /// Perform the full login flow.
    async fn login(&self) -> Result<(), Error> {
        let login_url = self.url("/login")?;

        // Pre-fetch the login page to seed the session cookie.
        debug!("GET {}", login_url);
        let resp = self
            .http()
            .get(login_url.clone())
            .send()
            .await
            .map_err(classify_login_error)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::UpstreamFormat {
                status: status.as_u16(),
                context: "login page fetch failed".into(),
            });
        }

        // POST the credentials, form-encoded as the portal's login form does.
        let (email, password) = self.credentials();
        let form = [("email", email), ("password", password.expose_secret())];

        debug!("POST {}", login_url);
        let resp = self
            .http()
            .post(login_url)
            .form(&form)
            .send()
            .await
            .map_err(classify_login_error)?;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(Error::Authentication {
                message: format!("login rejected (HTTP {status})"),
            });
        }
        if !status.is_success() {
            return Err(Error::UpstreamFormat {
                status: status.as_u16(),
                context: "login POST failed".into(),
            });
        }

        // The portal answers a failed login with HTTP 200 and the login
        // form again. A body still presenting the password field means the
        // credentials were rejected.
        let body = resp.text().await.map_err(Error::Network)?;
        if is_login_page(&body) {
            return Err(Error::Authentication {
                message: "portal returned the login form -- credentials rejected".into(),
            });
        }

        debug!("login successful");
        self.set_authenticated(true);
        Ok(())
    }
}

/// A redirect chain that exhausts the transport bound during login is the
/// portal's rejected-session loop, not a transport fault.
fn classify_login_error(e: reqwest::Error) -> Error {
    if e.is_redirect() {
        Error::Authentication {
            message: "redirect limit exceeded during login -- session rejected by the portal"
                .into(),
        }
    } else {
        Error::Network(e)
    }
}

/// Detect the portal's login form in a response body.
///
/// Matches on the password input element, which every variant of the
/// login page carries and no data page does.
pub(crate) fn is_login_page(body: &str) -> bool {
    body.contains("name=\"password\"") || body.contains("name='password'")
}
