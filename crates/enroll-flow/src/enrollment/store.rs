use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::warn;

use super::domain::{
    ApplicantRecord, HouseholdContext, MemberId, MemberRole, PlanId, RecordPatch, Ssn,
};
use super::steps::StepId;
use super::validate;

/// Session-scoped key/value persistence, the browser session-storage
/// analogue. String entries only; structured data is JSON-encoded by the
/// caller.
pub trait SessionStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// Failures at the persistence boundary. All recoverable: the in-memory
/// household stays authoritative for the rest of the session.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StorageError {
    #[error("session storage quota exceeded")]
    QuotaExceeded,
    #[error("session storage unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt session payload: {0}")]
    Corrupt(String),
}

/// In-process [`SessionStore`]. The optional byte quota exists so the
/// quota-exceeded path can be exercised in tests and demos.
#[derive(Default)]
pub struct InMemorySessionStore {
    entries: Mutex<BTreeMap<String, String>>,
    quota_bytes: Option<usize>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, StorageError> {
        self.entries
            .lock()
            .map_err(|_| StorageError::Unavailable("storage lock poisoned".to_string()))
    }
}

impl SessionStore for InMemorySessionStore {
    fn read(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut entries = self.lock()?;
        if let Some(quota) = self.quota_bytes {
            let projected: usize = entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
                + key.len()
                + value.len();
            if projected > quota {
                return Err(StorageError::QuotaExceeded);
            }
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Record-level failures surfaced to callers, distinct from the storage
/// failures the store absorbs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("no applicant record for member '{0}'")]
    NotFound(MemberId),
    #[error("the primary applicant record cannot be removed")]
    PrimaryImmutable,
}

/// Filters for [`RecordStore::list_members`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberFilter {
    All,
    IncludedInCoverage,
    MissingStep(StepId),
}

static MEMBER_SEQUENCE: AtomicU64 = AtomicU64::new(1);

pub fn fresh_member_id() -> MemberId {
    let id = MEMBER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    MemberId(format!("member-{id:06}"))
}

const PRIMARY_ID: &str = "primary";

pub fn primary_member_id() -> MemberId {
    MemberId(PRIMARY_ID.to_string())
}

fn household_key(session_id: &str) -> String {
    format!("household:{session_id}")
}

/// Single read/write surface for the household. Holds the authoritative
/// in-memory copy and mirrors every mutation to the session store as one
/// JSON blob; a failed mirror write degrades to a warning, never an error.
pub struct RecordStore<S> {
    store: Arc<S>,
    session_key: String,
    household: HouseholdContext,
    last_storage_error: Option<StorageError>,
}

impl<S: SessionStore> RecordStore<S> {
    /// Open (or start) the household for a session. A missing blob falls
    /// back to the legacy flat keys the per-field pages used to write; a
    /// corrupt or unreadable blob starts fresh rather than failing the
    /// session.
    pub fn open(store: Arc<S>, session_id: &str) -> Self {
        let session_key = household_key(session_id);
        let mut last_storage_error = None;

        let household = match store.read(&session_key) {
            Ok(Some(raw)) => match serde_json::from_str::<HouseholdContext>(&raw) {
                Ok(household) => household,
                Err(source) => {
                    warn!(%session_id, error = %source, "discarding corrupt household blob");
                    last_storage_error = Some(StorageError::Corrupt(source.to_string()));
                    HouseholdContext::new(primary_member_id())
                }
            },
            Ok(None) => seed_from_legacy_keys(store.as_ref()),
            Err(error) => {
                warn!(%session_id, %error, "session storage unreadable, starting in-memory");
                last_storage_error = Some(error);
                HouseholdContext::new(primary_member_id())
            }
        };

        Self {
            store,
            session_key,
            household,
            last_storage_error,
        }
    }

    pub fn household(&self) -> &HouseholdContext {
        &self.household
    }

    /// The most recent persistence failure, if any. Non-fatal; shown to the
    /// user as a warning while the in-memory state carries the session.
    pub fn persistence_warning(&self) -> Option<&StorageError> {
        self.last_storage_error.as_ref()
    }

    pub fn get_record(&self, id: &MemberId) -> Result<&ApplicantRecord, StoreError> {
        self.household
            .record(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Merge `patch` into the record, creating it when absent. Previously
    /// set fields not named by the patch are preserved. Writes are visible
    /// to reads immediately.
    pub fn upsert_record(&mut self, id: &MemberId, patch: RecordPatch) -> &ApplicantRecord {
        let role = patch.role.unwrap_or(MemberRole::Dependent);
        if self.household.primary.id == *id {
            self.household.primary.apply(patch);
            self.persist();
            &self.household.primary
        } else {
            self.household
                .members
                .entry(id.clone())
                .or_insert_with(|| ApplicantRecord::new(id.clone(), role))
                .apply(patch);
            self.persist();
            &self.household.members[id]
        }
    }

    pub fn delete_record(&mut self, id: &MemberId) -> Result<(), StoreError> {
        if self.household.primary.id == *id {
            return Err(StoreError::PrimaryImmutable);
        }
        if self.household.members.remove(id).is_none() {
            return Err(StoreError::NotFound(id.clone()));
        }
        self.household.not_applying.remove(id);
        self.persist();
        Ok(())
    }

    /// Spouse and dependent records, optionally filtered.
    pub fn list_members(&self, filter: MemberFilter) -> Vec<&ApplicantRecord> {
        self.household
            .members
            .values()
            .filter(|member| match filter {
                MemberFilter::All => true,
                MemberFilter::IncludedInCoverage => member.included_in_coverage,
                MemberFilter::MissingStep(step) => {
                    member.step_status(step) != super::domain::StepStatus::Completed
                }
            })
            .collect()
    }

    pub fn set_not_applying(&mut self, id: &MemberId, not_applying: bool) -> Result<(), StoreError> {
        self.get_record(id)?;
        if not_applying {
            self.household.not_applying.insert(id.clone());
        } else {
            self.household.not_applying.remove(id);
        }
        self.persist();
        Ok(())
    }

    pub fn set_agreements_accepted(&mut self, accepted: bool) {
        self.household.agreements_accepted = accepted;
        self.persist();
    }

    pub fn set_session_fields(&mut self, zip_code: Option<String>, plan_id: Option<PlanId>) {
        if zip_code.is_some() {
            self.household.zip_code = zip_code;
        }
        if plan_id.is_some() {
            self.household.plan_id = plan_id;
        }
        self.persist();
    }

    /// Run a closure against the mutable household and mirror the result.
    /// Kept crate-private so presentation code cannot bypass the API.
    pub(crate) fn mutate<T>(&mut self, f: impl FnOnce(&mut HouseholdContext) -> T) -> T {
        let value = f(&mut self.household);
        self.persist();
        value
    }

    fn persist(&mut self) {
        match serde_json::to_string(&self.household) {
            Ok(raw) => {
                if let Err(error) = self.store.write(&self.session_key, &raw) {
                    warn!(%error, "household write failed, in-memory copy remains authoritative");
                    self.last_storage_error = Some(error);
                } else {
                    self.last_storage_error = None;
                }
            }
            Err(source) => {
                warn!(error = %source, "household serialization failed");
                self.last_storage_error = Some(StorageError::Corrupt(source.to_string()));
            }
        }
    }
}

/// Compat read path for the flat per-field entries the legacy pages wrote
/// (`firstName`, `zipCode`, ...). Read-only: the consolidated blob is the
/// only thing this store ever writes.
fn seed_from_legacy_keys<S: SessionStore>(store: &S) -> HouseholdContext {
    let mut household = HouseholdContext::new(primary_member_id());

    let read = |key: &str| store.read(key).ok().flatten();

    if let Some(first_name) = read("firstName") {
        household.primary.first_name = Some(first_name);
    }
    if let Some(last_name) = read("lastName") {
        household.primary.last_name = Some(last_name);
    }
    if let Some(raw) = read("dateOfBirth") {
        if let Ok(date) = validate::parse_date_of_birth(&raw) {
            household.primary.date_of_birth = Some(date);
        }
    }
    if let Some(raw) = read("ssn") {
        if let Ok(ssn) = Ssn::parse(&raw) {
            household.primary.ssn = Some(ssn);
        }
    }
    if let Some(zip_code) = read("zipCode") {
        household.zip_code = Some(zip_code);
    }
    if let Some(plan_id) = read("planId") {
        household.plan_id = Some(PlanId(plan_id));
    }

    household
}
