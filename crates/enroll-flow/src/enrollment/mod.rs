//! The enrollment flow engine: applicant records, field validation, step
//! resolution, and household coordination.
//!
//! The dependency order runs leaves-first: [`validate`] is pure and knows
//! nothing about persistence, [`store`] owns the household and its session
//! mirror, [`steps`] resolves transitions from current answers, and
//! [`household`] composes the three for multi-member flows. [`router`]
//! exposes the whole thing over HTTP for the page layer.

pub mod domain;
pub mod household;
pub mod lookup;
pub mod router;
pub mod service;
pub mod steps;
pub mod store;
pub mod validate;
pub mod views;

#[cfg(test)]
mod tests;

pub use domain::{
    ApplicantRecord, Citizenship, Gender, HouseholdContext, Incarceration, IncomeSource,
    MailingAddress, MemberId, MemberRole, PayFrequency, PlanId, RecordPatch, Ssn, StepStatus,
    TobaccoUsage, NO_DOCUMENT_SENTINEL,
};
pub use household::{
    AgeWarning, AgeWarningReason, CoordinatorError, HouseholdCoordinator, HouseholdEligibility,
    StepOutcome, SubmissionPayload,
};
pub use lookup::{
    AddressCandidate, AddressSearch, AssistantChat, DebouncedLookup, LookupError, LookupOutcome,
    ProviderCandidate, ProviderSearch, MIN_ADDRESS_QUERY_CHARS,
};
pub use router::enrollment_router;
pub use service::{EnrollmentService, ServiceError};
pub use steps::{StepId, UnknownStep};
pub use store::{
    InMemorySessionStore, MemberFilter, RecordStore, SessionStore, StorageError, StoreError,
};
pub use validate::{AgePolicy, AgeProfile, FieldError};
pub use views::{HouseholdView, MemberView, StepTransitionView};
