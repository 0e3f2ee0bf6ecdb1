//! External lookup collaborators: address search, doctor/medication search,
//! and the assistant chat. The engine consumes these behind traits; real
//! backends live elsewhere. Only this module is asynchronous; every core
//! operation in the store, validator, and resolver is synchronous.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A lookup that did not produce usable results. Always recoverable: the UI
/// shows "no results" or a retry affordance and the form keeps working.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    #[error("lookup timed out after {0:?}")]
    TimedOut(Duration),
    #[error("lookup failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressCandidate {
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
}

/// Doctor or medication candidate with a stable identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderCandidate {
    pub id: String,
    pub name: String,
}

pub trait AddressSearch: Send + Sync {
    fn search(
        &self,
        partial: &str,
    ) -> impl Future<Output = Result<Vec<AddressCandidate>, LookupError>> + Send;
}

pub trait ProviderSearch: Send + Sync {
    fn search(
        &self,
        query: &str,
    ) -> impl Future<Output = Result<Vec<ProviderCandidate>, LookupError>> + Send;
}

/// The AI assistant. Opaque Q&A: one message in, one message out.
pub trait AssistantChat: Send + Sync {
    fn ask(
        &self,
        session_id: &str,
        message: &str,
    ) -> impl Future<Output = Result<String, LookupError>> + Send;
}

/// Address search only fires once the user has typed this many characters.
pub const MIN_ADDRESS_QUERY_CHARS: usize = 3;

/// What a wrapped lookup produced.
///
/// `Superseded` means a newer request for the same field started while this
/// one was in flight; the stale result has been dropped and must not be
/// applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupOutcome<T> {
    Fresh(Vec<T>),
    Superseded,
}

/// Wraps a lookup backend with the client-side semantics the flow needs:
/// a timeout after which the call is a recoverable failure, and
/// last-request-wins supersession per field.
pub struct DebouncedLookup<L> {
    inner: L,
    timeout: Duration,
    generation: AtomicU64,
}

impl<L> DebouncedLookup<L> {
    pub fn new(inner: L, timeout: Duration) -> Self {
        Self {
            inner,
            timeout,
            generation: AtomicU64::new(0),
        }
    }

    fn take_ticket(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }
}

impl<L: AddressSearch> DebouncedLookup<L> {
    /// Search street addresses. Queries below the character minimum resolve
    /// to an empty candidate list without hitting the backend.
    pub async fn search_addresses(
        &self,
        partial: &str,
    ) -> Result<LookupOutcome<AddressCandidate>, LookupError> {
        if partial.trim().chars().count() < MIN_ADDRESS_QUERY_CHARS {
            return Ok(LookupOutcome::Fresh(Vec::new()));
        }

        let ticket = self.take_ticket();
        let result = tokio::time::timeout(self.timeout, self.inner.search(partial)).await;
        if !self.is_current(ticket) {
            return Ok(LookupOutcome::Superseded);
        }
        match result {
            Err(_) => Err(LookupError::TimedOut(self.timeout)),
            Ok(candidates) => Ok(LookupOutcome::Fresh(candidates?)),
        }
    }
}

impl<L: AssistantChat> DebouncedLookup<L> {
    /// One question, one answer. Chat responses are never superseded; every
    /// answer is shown in order, so only the timeout applies.
    pub async fn ask_assistant(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<String, LookupError> {
        match tokio::time::timeout(self.timeout, self.inner.ask(session_id, message)).await {
            Err(_) => Err(LookupError::TimedOut(self.timeout)),
            Ok(answer) => answer,
        }
    }
}

impl<L: ProviderSearch> DebouncedLookup<L> {
    pub async fn search_providers(
        &self,
        query: &str,
    ) -> Result<LookupOutcome<ProviderCandidate>, LookupError> {
        let ticket = self.take_ticket();
        let result = tokio::time::timeout(self.timeout, ProviderSearch::search(&self.inner, query))
            .await;
        if !self.is_current(ticket) {
            return Ok(LookupOutcome::Superseded);
        }
        match result {
            Err(_) => Err(LookupError::TimedOut(self.timeout)),
            Ok(candidates) => Ok(LookupOutcome::Fresh(candidates?)),
        }
    }
}
