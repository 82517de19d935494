// ── Runtime connection configuration ──
//
// These types describe *which* pool to poll and how often. They carry
// credential data and tuning, but never touch disk -- the host
// constructs them and hands them in.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use indygo_api::{IndygoClient, TransportConfig};

use crate::error::CoreError;

/// Portal account credentials plus the pool they are scoped to.
///
/// Opaque and immutable for the lifetime of one client/coordinator pair.
#[derive(Debug, Clone)]
pub struct PoolCredentials {
    pub email: String,
    pub password: SecretString,
    pub pool_id: String,
}

impl PoolCredentials {
    /// Build an API client against the production portal.
    pub fn client(&self, transport: &TransportConfig) -> Result<IndygoClient, CoreError> {
        IndygoClient::portal(
            self.email.clone(),
            self.password.clone(),
            self.pool_id.clone(),
            transport,
        )
        .map_err(CoreError::from)
    }

    /// Build an API client against an explicit portal root (tests point
    /// this at a mock server).
    pub fn client_at(
        &self,
        base_url: Url,
        transport: &TransportConfig,
    ) -> Result<IndygoClient, CoreError> {
        IndygoClient::new(
            base_url,
            self.email.clone(),
            self.password.clone(),
            self.pool_id.clone(),
            transport,
        )
        .map_err(CoreError::from)
    }
}

/// Tuning for the polling coordinator.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// How often the background task refreshes.
    pub refresh_interval: Duration,
    /// Consecutive failures tolerated before cached data stops being
    /// served (stale-but-available window).
    pub failure_threshold: u32,
    /// Consecutive authentication failures before the coordinator flags
    /// that credential re-entry is needed.
    pub reauth_threshold: u32,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            // The portal's measurements move slowly; five minutes matches
            // the hardware's own reporting cadence.
            refresh_interval: Duration::from_secs(300),
            failure_threshold: 3,
            reauth_threshold: 2,
        }
    }
}
