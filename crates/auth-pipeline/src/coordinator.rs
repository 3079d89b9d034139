//! Refresh coordinator
//!
//! Every logical request goes through `RefreshCoordinator::execute`, which
//! attaches the stored bearer credential, sends the request, and absorbs
//! expired-credential failures. On a recoverable 401 exactly one refresh call
//! is in flight at a time: the first failing request leads the refresh, every
//! other request that fails meanwhile is queued as a waiter, and when the
//! refresh settles the waiters are released in arrival order. Each logical
//! request is replayed at most once.
//!
//! Refresh state lives behind a `std::sync::Mutex` that is never held across
//! an await point, so check-and-set of the in-progress flag is atomic even on
//! a multi-threaded runtime. The same state holds the coordinator's view of
//! both credentials: writes land there before storage, so requests see a
//! refreshed credential even when persisting it fails or is still running.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use common::Secret;
use serde_json::Value;
use session_auth::{
    CredentialStorage, LOGIN_PATH, REFRESH_PATH, REFRESH_TOKEN_KEY, TOKEN_KEY,
    VERIFY_2FA_LOGIN_PATH,
};
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, info, instrument, warn};
use transport::{Failure, Outcome, RequestDescriptor, Transport};

use crate::attacher::attach;
use crate::classify;
use crate::error::{Error, Result};
use crate::metrics;
use crate::session::{InvalidationReason, SessionEvent};

pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Paths whose 401 means "bad login", never "expired credential"
    pub login_paths: Vec<String>,
    pub refresh_path: String,
    /// Upper bound on one refresh call; hitting it counts as refresh failure
    pub refresh_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            login_paths: vec![LOGIN_PATH.to_string(), VERIFY_2FA_LOGIN_PATH.to_string()],
            refresh_path: REFRESH_PATH.to_string(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }
}

/// What a queued request receives when the refresh settles: the new
/// credential, or the reason the refresh failed.
type Settlement = std::result::Result<Secret<String>, String>;

/// In-memory view of one stored credential.
#[derive(Default, Clone)]
enum Cached {
    /// Not written or cleared since startup; storage is authoritative
    #[default]
    Unknown,
    Cleared,
    Known(Secret<String>),
}

#[derive(Default)]
struct RefreshState {
    in_progress: bool,
    waiters: Vec<oneshot::Sender<Settlement>>,
    /// The session-invalid signal already fired for the current session
    invalidated: bool,
    token: Cached,
    refresh: Cached,
}

impl RefreshState {
    fn slot(&mut self, key: &str) -> &mut Cached {
        if key == TOKEN_KEY {
            &mut self.token
        } else {
            &mut self.refresh
        }
    }

    fn remember(&mut self, token: Secret<String>, refresh: Option<Secret<String>>) {
        self.token = Cached::Known(token);
        if let Some(refresh) = refresh {
            self.refresh = Cached::Known(refresh);
        }
    }
}

enum Role {
    Leader,
    Waiter(oneshot::Receiver<Settlement>),
}

enum Triage {
    Done(Result<Value>),
    Recover(Failure),
}

pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    storage: Arc<dyn CredentialStorage>,
    config: CoordinatorConfig,
    state: Mutex<RefreshState>,
    events: broadcast::Sender<SessionEvent>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        storage: Arc<dyn CredentialStorage>,
        config: CoordinatorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            transport,
            storage,
            config,
            state: Mutex::new(RefreshState::default()),
            events,
        }
    }

    /// Receive session-invalid signals raised after subscribing.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Send one logical request with the stored credential attached.
    #[instrument(skip_all, fields(request_id = %descriptor.id, method = %descriptor.method, path = %descriptor.path))]
    pub async fn execute(&self, descriptor: RequestDescriptor) -> Result<Value> {
        let credential = self.current_credential().await;
        let descriptor = attach(descriptor, credential.as_ref());
        let outcome = self.transport.send(&descriptor).await;
        let result = self.handle_response(descriptor, outcome).await;
        metrics::record_request(result.as_ref().err().map(Error::kind));
        result
    }

    /// Resolve the outcome of a sent descriptor.
    ///
    /// Success and non-auth failures pass straight through. A 401 either
    /// starts recovery or, for login calls, the refresh call, and already
    /// replayed requests, ends the session.
    pub async fn handle_response(&self, descriptor: RequestDescriptor, outcome: Outcome) -> Result<Value> {
        match self.triage(&descriptor, outcome).await {
            Triage::Done(result) => result,
            Triage::Recover(failure) => self.recover(descriptor, failure).await,
        }
    }

    /// Adopt credentials from a completed login and re-arm the
    /// session-invalid signal. They are in use from this call on; the
    /// returned error only reports that persisting them failed.
    pub async fn install_credentials(&self, token: String, refresh: Option<String>) -> session_auth::Result<()> {
        {
            let mut state = self.lock_state();
            state.remember(token.clone().into(), refresh.clone().map(Secret::new));
            state.invalidated = false;
        }
        self.persist(token, refresh).await
    }

    /// Forget both credentials. Storage errors are logged, not returned.
    pub async fn clear_credentials(&self) {
        {
            let mut state = self.lock_state();
            state.token = Cached::Cleared;
            state.refresh = Cached::Cleared;
        }
        for key in [TOKEN_KEY, REFRESH_TOKEN_KEY] {
            if let Err(e) = self.storage.remove(key).await {
                warn!(key, error = %e, "failed to remove stored credential");
            }
        }
    }

    pub async fn current_credential(&self) -> Option<Secret<String>> {
        self.credential(TOKEN_KEY).await
    }

    pub fn refresh_in_progress(&self) -> bool {
        self.lock_state().in_progress
    }

    /// Requests currently queued behind the in-flight refresh.
    pub fn pending_waiters(&self) -> usize {
        self.lock_state().waiters.len()
    }

    async fn triage(&self, descriptor: &RequestDescriptor, outcome: Outcome) -> Triage {
        let failure = match outcome {
            Ok(payload) => return Triage::Done(Ok(payload)),
            Err(failure) => failure,
        };

        if !failure.is_unauthorized() {
            debug!(status = ?failure.status, error = %failure.message, "request failed");
            return Triage::Done(Err(classify::into_error(failure)));
        }

        match self.unrecoverable_reason(descriptor) {
            Some(reason) => Triage::Done(Err(self.invalidate(reason, failure.message).await)),
            None => Triage::Recover(failure),
        }
    }

    fn unrecoverable_reason(&self, descriptor: &RequestDescriptor) -> Option<InvalidationReason> {
        if descriptor.targets(&self.config.refresh_path) {
            Some(InvalidationReason::RefreshRejected)
        } else if self.config.login_paths.iter().any(|p| descriptor.targets(p)) {
            Some(InvalidationReason::LoginRejected)
        } else if descriptor.retried {
            Some(InvalidationReason::RetryRejected)
        } else {
            None
        }
    }

    async fn recover(&self, descriptor: RequestDescriptor, failure: Failure) -> Result<Value> {
        let Some(refresh) = self.credential(REFRESH_TOKEN_KEY).await else {
            return Err(self
                .invalidate(InvalidationReason::MissingRefreshCredential, failure.message)
                .await);
        };

        // A refresh finished after this request was sent; the current
        // credential is already newer than the one that was rejected. A
        // request that went out without a bearer proves nothing here.
        if let Some(sent) = descriptor.bearer() {
            if let Some(current) = self.current_credential().await {
                if sent != current.expose().as_str() {
                    debug!(request_id = %descriptor.id, "credential changed since send, replaying without refresh");
                    return self.replay(descriptor, &current).await;
                }
            }
        }

        let role = {
            let mut state = self.lock_state();
            if state.in_progress {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Role::Waiter(rx)
            } else {
                state.in_progress = true;
                Role::Leader
            }
        };

        match role {
            Role::Leader => self.lead_refresh(descriptor, refresh).await,
            Role::Waiter(rx) => self.await_refresh(descriptor, rx).await,
        }
    }

    async fn lead_refresh(&self, descriptor: RequestDescriptor, refresh: Secret<String>) -> Result<Value> {
        let mut leader = LeaderGuard {
            coordinator: self,
            settled: false,
        };
        info!(request_id = %descriptor.id, "bearer credential rejected, refreshing");

        let exchanged = match tokio::time::timeout(
            self.config.refresh_timeout,
            session_auth::refresh_token(
                self.transport.as_ref(),
                &self.config.refresh_path,
                refresh.expose(),
            ),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(session_auth::Error::Http(format!(
                "token refresh timed out after {:?}",
                self.config.refresh_timeout
            ))),
        };

        match exchanged {
            Ok(response) => {
                let credential: Secret<String> = response.token.into();
                // Visible to new requests before waiters resume, and before
                // the leader can be cancelled in the storage write.
                self.lock_state().remember(
                    credential.clone(),
                    response.refresh_token.clone().map(Secret::new),
                );
                let released = leader.settle(Ok(credential.clone()));
                metrics::record_refresh("success");
                info!(released, "token refresh succeeded");

                if let Err(e) = self
                    .persist(credential.expose().clone(), response.refresh_token)
                    .await
                {
                    warn!(error = %e, "failed to persist refreshed credentials, continuing in memory");
                }
                self.replay(descriptor, &credential).await
            }
            Err(e) => {
                let message = e.to_string();
                // Invalidate while still in progress so a 401 landing
                // meanwhile queues instead of refreshing with the rejected
                // credential.
                let error = self
                    .invalidate(InvalidationReason::RefreshRejected, message.clone())
                    .await;
                let released = leader.settle(Err(message));
                metrics::record_refresh("failure");
                warn!(error = %e, released, "token refresh failed");
                Err(error)
            }
        }
    }

    async fn await_refresh(&self, descriptor: RequestDescriptor, rx: oneshot::Receiver<Settlement>) -> Result<Value> {
        metrics::record_waiter_queued();
        debug!(request_id = %descriptor.id, "refresh in flight, queued");
        match rx.await {
            Ok(Ok(credential)) => self.replay(descriptor, &credential).await,
            // The leader already cleared storage and raised the signal
            Ok(Err(message)) => Err(Error::SessionExpired(message)),
            Err(_) => Err(Error::RefreshAborted),
        }
    }

    /// Resubmit `descriptor` once with `credential`.
    async fn replay(&self, mut descriptor: RequestDescriptor, credential: &Secret<String>) -> Result<Value> {
        descriptor.retried = true;
        let descriptor = attach(descriptor, Some(credential));
        debug!(request_id = %descriptor.id, "replaying with refreshed credential");
        let outcome = self.transport.send(&descriptor).await;
        match self.triage(&descriptor, outcome).await {
            Triage::Done(result) => result,
            Triage::Recover(failure) => Err(self
                .invalidate(InvalidationReason::RetryRejected, failure.message)
                .await),
        }
    }

    /// Release every waiter with `settlement`, in arrival order.
    fn settle(&self, settlement: Settlement) -> usize {
        let mut state = self.lock_state();
        state.in_progress = false;
        if settlement.is_ok() {
            state.invalidated = false;
        }
        let waiters = std::mem::take(&mut state.waiters);
        let released = waiters.len();
        for waiter in waiters {
            // A waiter whose caller went away has nothing to resume
            let _ = waiter.send(settlement.clone());
        }
        released
    }

    /// End the session: clear credentials, signal once, and build the
    /// caller-facing error.
    async fn invalidate(&self, reason: InvalidationReason, message: String) -> Error {
        self.clear_credentials().await;

        let first = {
            let mut state = self.lock_state();
            !std::mem::replace(&mut state.invalidated, true)
        };
        if first {
            metrics::record_invalidation(reason);
            warn!(reason = reason.label(), error = %message, "session invalidated");
            // No subscribers is fine
            let _ = self.events.send(SessionEvent::Invalidated { reason });
        } else {
            debug!(reason = reason.label(), "session already invalidated, signal suppressed");
        }

        Error::SessionExpired(message)
    }

    async fn persist(&self, token: String, refresh: Option<String>) -> session_auth::Result<()> {
        self.storage.set(TOKEN_KEY, token).await?;
        if let Some(refresh) = refresh {
            self.storage.set(REFRESH_TOKEN_KEY, refresh).await?;
        }
        Ok(())
    }

    /// The in-memory credential when there is one, storage otherwise.
    async fn credential(&self, key: &str) -> Option<Secret<String>> {
        let cached = self.lock_state().slot(key).clone();
        match cached {
            Cached::Known(secret) => Some(secret),
            Cached::Cleared => None,
            Cached::Unknown => self.read_secret(key).await,
        }
    }

    async fn read_secret(&self, key: &str) -> Option<Secret<String>> {
        match self.storage.get(key).await {
            Ok(value) => value.map(Secret::new),
            Err(e) => {
                warn!(key, error = %e, "credential storage read failed, treating as absent");
                None
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks the refresh leader. Dropped without settling (the leading request
/// was cancelled mid-refresh), it clears the in-progress flag and closes
/// every waiter channel so the queue never wedges.
struct LeaderGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    settled: bool,
}

impl LeaderGuard<'_> {
    fn settle(&mut self, settlement: Settlement) -> usize {
        self.settled = true;
        self.coordinator.settle(settlement)
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let abandoned = {
            let mut state = self.coordinator.lock_state();
            state.in_progress = false;
            std::mem::take(&mut state.waiters)
        };
        metrics::record_refresh("aborted");
        warn!(waiters = abandoned.len(), "token refresh abandoned before it settled");
    }
}
