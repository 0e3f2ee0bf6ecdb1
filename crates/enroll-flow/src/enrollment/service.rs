use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{Local, NaiveDate};
use tracing::info;

use super::household::{CoordinatorError, HouseholdCoordinator};
use super::steps::UnknownStep;
use super::store::SessionStore;
use super::validate::AgePolicy;

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> String {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("session-{id:06}")
}

/// Errors crossing the service boundary, mapped to HTTP statuses by the
/// router.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("unknown enrollment session '{0}'")]
    UnknownSession(String),
    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),
    #[error(transparent)]
    UnknownStep(#[from] UnknownStep),
}

/// Session registry: one coordinator per active enrollment session, all
/// persisting through the same [`SessionStore`].
pub struct EnrollmentService<S> {
    store: Arc<S>,
    policy: AgePolicy,
    today: fn() -> NaiveDate,
    sessions: Mutex<BTreeMap<String, HouseholdCoordinator<S>>>,
}

impl<S: SessionStore> EnrollmentService<S> {
    pub fn new(store: Arc<S>, policy: AgePolicy) -> Self {
        Self {
            store,
            policy,
            today: || Local::now().date_naive(),
            sessions: Mutex::new(BTreeMap::new()),
        }
    }

    /// Pin "today" for deterministic tests and demos.
    pub fn with_today(mut self, today: fn() -> NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn today(&self) -> NaiveDate {
        (self.today)()
    }

    /// Start a session and return its id. The coordinator reopens any state
    /// already persisted under that session key.
    pub fn create_session(&self) -> String {
        let session_id = next_session_id();
        let coordinator =
            HouseholdCoordinator::open(Arc::clone(&self.store), &session_id, self.policy);
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session_id.clone(), coordinator);
        info!(%session_id, "enrollment session started");
        session_id
    }

    /// Run a closure against one session's coordinator.
    pub fn with_session<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut HouseholdCoordinator<S>) -> Result<T, CoordinatorError>,
    ) -> Result<T, ServiceError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let coordinator = sessions
            .get_mut(session_id)
            .ok_or_else(|| ServiceError::UnknownSession(session_id.to_string()))?;
        f(coordinator).map_err(ServiceError::from)
    }

    /// Drop a session from the registry, simulating the end of a browser
    /// session. Persisted state survives; reopening the same session id
    /// reloads it.
    pub fn close_session(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(session_id).is_some()
    }

    /// Reopen a previously created session id from persisted state, e.g.
    /// after a page reload.
    pub fn reopen_session(&self, session_id: &str) {
        let coordinator =
            HouseholdCoordinator::open(Arc::clone(&self.store), session_id, self.policy);
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(session_id.to_string(), coordinator);
    }
}
