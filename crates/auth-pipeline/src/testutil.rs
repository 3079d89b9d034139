//! Scripted transport shared by the pipeline tests

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::json;
use session_auth::{CredentialStorage, MemoryStorage, REFRESH_PATH};
use tokio::sync::{Notify, Semaphore};
use transport::{Failure, Outcome, RequestDescriptor, Transport};

pub(crate) fn unauthorized() -> Failure {
    Failure::from_status(
        401,
        Some(json!({"success": false, "error": "token expired"})),
    )
}

/// Transport standing in for the console API.
///
/// Requests carrying the accepted bearer credential succeed and echo their
/// path and credential back; everything else gets 401. A refresh call answers
/// with `refresh_outcome` and, when it succeeds, the issued credential
/// becomes the accepted one. With a gate, the refresh answer is held until
/// the gate is notified.
pub(crate) struct ScriptedTransport {
    accepted: Mutex<Option<String>>,
    refresh_outcome: Outcome,
    refresh_gate: Option<Arc<Notify>>,
    refresh_calls: AtomicUsize,
    reject_all: AtomicBool,
    fixed: HashMap<String, Outcome>,
    sent: Mutex<Vec<RequestDescriptor>>,
}

impl ScriptedTransport {
    /// Accepts nothing until a refresh issues `at_new`.
    pub fn new() -> Self {
        Self {
            accepted: Mutex::new(None),
            refresh_outcome: Ok(json!({"token": "at_new", "refresh_token": "rt_new"})),
            refresh_gate: None,
            refresh_calls: AtomicUsize::new(0),
            reject_all: AtomicBool::new(false),
            fixed: HashMap::new(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn accepting(self, token: &str) -> Self {
        *self.accepted.lock().unwrap() = Some(token.to_string());
        self
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.refresh_gate = Some(gate);
        self
    }

    pub fn refresh_answers(mut self, outcome: Outcome) -> Self {
        self.refresh_outcome = outcome;
        self
    }

    /// Reject every non-refresh request, even with a fresh credential.
    pub fn reject_everything(self) -> Self {
        self.reject_all.store(true, Ordering::SeqCst);
        self
    }

    /// Fixed answer for `path`, regardless of credentials.
    pub fn answer(mut self, path: &str, outcome: Outcome) -> Self {
        self.fixed.insert(path.to_string(), outcome);
        self
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<RequestDescriptor> {
        self.sent.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send<'a>(
        &'a self,
        descriptor: &'a RequestDescriptor,
    ) -> Pin<Box<dyn Future<Output = Outcome> + Send + 'a>> {
        self.sent.lock().unwrap().push(descriptor.clone());

        if descriptor.targets(REFRESH_PATH) {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            let gate = self.refresh_gate.clone();
            let outcome = self.refresh_outcome.clone();
            return Box::pin(async move {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                if let Ok(payload) = &outcome {
                    let issued = payload["token"].as_str().map(str::to_owned);
                    *self.accepted.lock().unwrap() = issued;
                }
                outcome
            });
        }

        let outcome = if let Some(fixed) = self.fixed.get(&descriptor.path) {
            fixed.clone()
        } else {
            let accepted = self.accepted.lock().unwrap().clone();
            let authorized = !self.reject_all.load(Ordering::SeqCst)
                && accepted.is_some()
                && descriptor.bearer() == accepted.as_deref();
            if authorized {
                Ok(json!({"path": descriptor.path, "token": descriptor.bearer()}))
            } else {
                Err(unauthorized())
            }
        };
        Box::pin(async move { outcome })
    }
}

/// Memory storage with unreliable writes.
///
/// `failing_writes` makes every `set` fail; `stalled_writes` makes every
/// `set` hang. With `held_removals`, each `remove` waits for a permit.
pub(crate) struct FlakyStorage {
    inner: MemoryStorage,
    failing_writes: bool,
    stalled_writes: bool,
    removals: Option<Arc<Semaphore>>,
}

impl FlakyStorage {
    pub fn signed_in() -> Self {
        Self {
            inner: MemoryStorage::with_entries([
                (session_auth::TOKEN_KEY, "at_old"),
                (session_auth::REFRESH_TOKEN_KEY, "rt_1"),
            ]),
            failing_writes: false,
            stalled_writes: false,
            removals: None,
        }
    }

    pub fn failing_writes(mut self) -> Self {
        self.failing_writes = true;
        self
    }

    pub fn stalled_writes(mut self) -> Self {
        self.stalled_writes = true;
        self
    }

    pub fn held_removals(mut self, permits: Arc<Semaphore>) -> Self {
        self.removals = Some(permits);
        self
    }
}

impl CredentialStorage for FlakyStorage {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<Option<String>>> + Send + 'a>> {
        self.inner.get(key)
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: String,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<()>> + Send + 'a>> {
        if self.stalled_writes {
            return Box::pin(std::future::pending());
        }
        if self.failing_writes {
            return Box::pin(async { Err(session_auth::Error::Io("disk full".into())) });
        }
        self.inner.set(key, value)
    }

    fn remove<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = session_auth::Result<()>> + Send + 'a>> {
        Box::pin(async move {
            if let Some(permits) = &self.removals {
                permits.acquire().await.unwrap().forget();
            }
            self.inner.remove(key).await
        })
    }
}
