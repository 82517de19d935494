// ── Polling coordinator ──
//
// Single authority for "what is the pool's current known state".
// Owns the refresh cadence, deduplicates concurrent refresh requests,
// caches the last good snapshot, and notifies listeners after every
// cycle. Consumers only ever see `Arc<PoolData>` clones; the coordinator
// is the sole writer.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use indygo_api::{IndygoClient, PoolData};

use crate::config::CoordinatorConfig;
use crate::error::CoreError;

// ── Observable state ─────────────────────────────────────────────────

/// Refresh state machine: one `Refreshing` at most per coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

/// What a refresh cycle ended as. Attached callers observe the same
/// outcome as the caller that actually drove the fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Success,
    Failed,
    /// The host cancelled mid-flight: cached state untouched, no
    /// listener notification.
    Cancelled,
}

/// Snapshot of the coordinator's health, handed to listeners and
/// returned by [`PoolCoordinator::status`].
#[derive(Debug, Clone)]
pub struct CoordinatorStatus {
    pub state: RefreshState,
    /// False until the first success, and again once consecutive
    /// failures exceed the configured threshold.
    pub available: bool,
    pub consecutive_failures: u32,
    /// Repeated authentication failures: the host should prompt for
    /// credential re-entry instead of waiting out the retry schedule.
    pub needs_reauth: bool,
    pub last_error: Option<CoreError>,
    pub last_success: Option<DateTime<Utc>>,
}

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type Listener = Box<dyn Fn(&CoordinatorStatus) + Send + Sync>;

// ── Coordinator ──────────────────────────────────────────────────────

/// The consumer-facing entry point.
///
/// Cheaply cloneable via `Arc`; all clones share one cache, one refresh
/// pipeline, and one listener registry.
#[derive(Clone)]
pub struct PoolCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    client: IndygoClient,
    config: CoordinatorConfig,
    /// Coordinator state. Guarded by a std mutex: touched only at cycle
    /// boundaries and never held across an await.
    state: Mutex<State>,
    /// Completion channel of the in-flight refresh, when one is running.
    /// Requests arriving while it is set attach instead of fetching.
    inflight: Mutex<Option<watch::Receiver<Option<RefreshOutcome>>>>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener_id: AtomicU64,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

struct State {
    data: Option<Arc<PoolData>>,
    refresh_state: RefreshState,
    consecutive_failures: u32,
    consecutive_auth_failures: u32,
    last_error: Option<CoreError>,
    last_success: Option<DateTime<Utc>>,
}

impl PoolCoordinator {
    /// Create a coordinator around an API client. Does NOT start
    /// polling -- call [`start`](Self::start), or drive refreshes
    /// manually with [`request_refresh`](Self::request_refresh).
    pub fn new(client: IndygoClient, config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                config,
                state: Mutex::new(State {
                    data: None,
                    refresh_state: RefreshState::Idle,
                    consecutive_failures: 0,
                    consecutive_auth_failures: 0,
                    last_error: None,
                    last_success: None,
                }),
                inflight: Mutex::new(None),
                listeners: Mutex::new(HashMap::new()),
                next_listener_id: AtomicU64::new(1),
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// The underlying API client. Command paths (e.g. changing the
    /// filtration mode) go through it directly, then request a refresh.
    pub fn client(&self) -> &IndygoClient {
        &self.inner.client
    }

    // ── Data access ──────────────────────────────────────────────────

    /// The current known pool state.
    ///
    /// Serves the cached snapshot while it is fresh or within the
    /// stale-tolerance window; `None` before the first success and once
    /// consecutive failures exceed the threshold.
    pub fn data(&self) -> Option<Arc<PoolData>> {
        let state = self.lock_state();
        if state.consecutive_failures > self.inner.config.failure_threshold {
            return None;
        }
        state.data.clone()
    }

    /// Current coordinator health.
    pub fn status(&self) -> CoordinatorStatus {
        let state = self.lock_state();
        self.status_from(&state)
    }

    /// How long ago the last successful refresh was, or `None` if none
    /// has succeeded yet.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.lock_state().last_success.map(|t| Utc::now() - t)
    }

    // ── Listeners ────────────────────────────────────────────────────

    /// Register a callback invoked synchronously after every refresh
    /// cycle, success or failure.
    ///
    /// The registry lock is held during notification, so callbacks must
    /// not register or remove listeners from inside the callback.
    pub fn add_listener(
        &self,
        listener: impl Fn(&CoordinatorStatus) + Send + Sync + 'static,
    ) -> ListenerId {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .insert(id, Box::new(listener));
        ListenerId(id)
    }

    /// Remove a previously registered listener. Returns `false` when the
    /// id was already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner
            .listeners
            .lock()
            .expect("listener lock poisoned")
            .remove(&id.0)
            .is_some()
    }

    // ── Refresh pipeline ─────────────────────────────────────────────

    /// Refresh now, or attach to the refresh already in flight.
    ///
    /// At most one fetch runs per coordinator at any time; concurrent
    /// callers all observe the outcome of that single fetch.
    pub async fn request_refresh(&self) -> RefreshOutcome {
        enum Role {
            Leader(watch::Sender<Option<RefreshOutcome>>),
            Follower(watch::Receiver<Option<RefreshOutcome>>),
        }

        let role = {
            let mut inflight = self.inner.inflight.lock().expect("inflight lock poisoned");
            match inflight.as_ref() {
                Some(rx) => Role::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    *inflight = Some(rx);
                    Role::Leader(tx)
                }
            }
        };

        match role {
            Role::Leader(tx) => {
                let outcome = self.run_refresh().await;
                *self.inner.inflight.lock().expect("inflight lock poisoned") = None;
                let _ = tx.send(Some(outcome));
                outcome
            }
            Role::Follower(mut rx) => {
                debug!("refresh already in flight -- attaching");
                match rx.wait_for(Option::is_some).await {
                    Ok(outcome) => (*outcome).unwrap_or(RefreshOutcome::Cancelled),
                    // Leader dropped without completing (shutdown).
                    Err(_) => RefreshOutcome::Cancelled,
                }
            }
        }
    }

    /// One full refresh cycle: fetch, apply, notify.
    async fn run_refresh(&self) -> RefreshOutcome {
        self.lock_state().refresh_state = RefreshState::Refreshing;

        let result = tokio::select! {
            biased;
            () = self.inner.cancel.cancelled() => None,
            result = self.inner.client.fetch_pool_data() => Some(result),
        };

        let outcome = match result {
            None => {
                debug!("refresh cancelled -- cached state untouched");
                self.lock_state().refresh_state = RefreshState::Idle;
                return RefreshOutcome::Cancelled;
            }
            Some(Ok(data)) => {
                self.apply_success(data);
                RefreshOutcome::Success
            }
            Some(Err(e)) => {
                self.apply_failure(e.into());
                RefreshOutcome::Failed
            }
        };

        self.notify_listeners();
        outcome
    }

    fn apply_success(&self, data: PoolData) {
        let mut state = self.lock_state();
        info!(
            pool_id = %data.pool_id,
            sensors = data.sensors.len(),
            modules = data.modules.len(),
            "refresh complete"
        );
        state.data = Some(Arc::new(data));
        state.refresh_state = RefreshState::Idle;
        state.consecutive_failures = 0;
        state.consecutive_auth_failures = 0;
        state.last_error = None;
        state.last_success = Some(Utc::now());
    }

    fn apply_failure(&self, error: CoreError) {
        let mut state = self.lock_state();
        state.refresh_state = RefreshState::Idle;
        state.consecutive_failures += 1;
        if error.is_auth() {
            state.consecutive_auth_failures += 1;
        } else {
            state.consecutive_auth_failures = 0;
        }

        if state.consecutive_failures > self.inner.config.failure_threshold {
            warn!(
                failures = state.consecutive_failures,
                error = %error,
                "refresh failed -- data now unavailable"
            );
        } else {
            warn!(
                failures = state.consecutive_failures,
                error = %error,
                "refresh failed -- serving cached data"
            );
        }

        state.last_error = Some(error);
    }

    fn notify_listeners(&self) {
        let status = self.status();
        let listeners = self.inner.listeners.lock().expect("listener lock poisoned");
        for listener in listeners.values() {
            listener(&status);
        }
    }

    // ── Background polling ───────────────────────────────────────────

    /// Start the periodic refresh task. The first refresh fires
    /// immediately; later ones follow the configured interval. Calling
    /// this twice is a no-op.
    pub fn start(&self) {
        let mut task = self.inner.task.lock().expect("task lock poisoned");
        if task.is_some() {
            return;
        }

        let coordinator = self.clone();
        let cancel = self.inner.cancel.clone();
        let interval = self.inner.config.refresh_interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let _ = coordinator.request_refresh().await;
                    }
                }
            }
            debug!("refresh task stopped");
        }));
    }

    /// Stop polling and cancel any refresh in flight. Cached state is
    /// left untouched and listeners are not notified for the aborted
    /// cycle.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let task = self
            .inner
            .task
            .lock()
            .expect("task lock poisoned")
            .take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.inner.state.lock().expect("state lock poisoned")
    }

    fn status_from(&self, state: &State) -> CoordinatorStatus {
        CoordinatorStatus {
            state: state.refresh_state,
            available: state.data.is_some()
                && state.consecutive_failures <= self.inner.config.failure_threshold,
            consecutive_failures: state.consecutive_failures,
            needs_reauth: state.consecutive_auth_failures >= self.inner.config.reauth_threshold,
            last_error: state.last_error.clone(),
            last_success: state.last_success,
        }
    }
}
