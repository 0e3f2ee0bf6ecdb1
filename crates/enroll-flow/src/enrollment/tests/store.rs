use std::sync::Arc;

use crate::enrollment::domain::{MemberId, MemberRole, RecordPatch, StepStatus};
use crate::enrollment::steps::StepId;
use crate::enrollment::store::{
    primary_member_id, InMemorySessionStore, MemberFilter, RecordStore, SessionStore, StorageError,
    StoreError,
};

use super::common::{address_patch, primary_personal_info, ssn_patch};

fn open_store() -> RecordStore<InMemorySessionStore> {
    RecordStore::open(Arc::new(InMemorySessionStore::new()), "store-tests")
}

#[test]
fn upsert_merges_partials_without_dropping_fields() {
    let mut store = open_store();
    let primary = primary_member_id();

    store.upsert_record(&primary, primary_personal_info());
    store.upsert_record(&primary, address_patch());

    let record = store.get_record(&primary).expect("primary exists");
    assert_eq!(record.first_name.as_deref(), Some("Jane"));
    assert!(record.address.is_some());

    // Re-applying the same patch is a no-op on the merged result.
    let before = record.clone();
    store.upsert_record(&primary, address_patch());
    assert_eq!(store.get_record(&primary).expect("primary"), &before);
}

#[test]
fn upsert_creates_members_with_the_patch_role() {
    let mut store = open_store();
    let spouse_id = MemberId("member-spouse".to_string());

    store.upsert_record(
        &spouse_id,
        RecordPatch {
            role: Some(MemberRole::Spouse),
            first_name: Some("Alex".to_string()),
            ..RecordPatch::default()
        },
    );

    let spouse = store.get_record(&spouse_id).expect("spouse exists");
    assert_eq!(spouse.role, MemberRole::Spouse);
    assert!(spouse.included_in_coverage);
    assert!(spouse.step_progress.is_empty());
}

#[test]
fn digits_are_stripped_from_name_input() {
    let mut store = open_store();
    let primary = primary_member_id();

    store.upsert_record(
        &primary,
        RecordPatch {
            first_name: Some("J4ne55".to_string()),
            ..RecordPatch::default()
        },
    );

    assert_eq!(
        store.get_record(&primary).expect("primary").first_name.as_deref(),
        Some("Jne")
    );
}

#[test]
fn get_record_signals_not_found_for_unknown_ids() {
    let store = open_store();
    let ghost = MemberId("member-ghost".to_string());
    assert_eq!(
        store.get_record(&ghost),
        Err(StoreError::NotFound(ghost.clone()))
    );
}

#[test]
fn delete_removes_members_but_never_the_primary() {
    let mut store = open_store();
    let dependent = MemberId("member-dep".to_string());
    store.upsert_record(&dependent, RecordPatch::default());

    store.delete_record(&dependent).expect("member removed");
    assert!(store.get_record(&dependent).is_err());

    assert_eq!(
        store.delete_record(&primary_member_id()),
        Err(StoreError::PrimaryImmutable)
    );
}

#[test]
fn list_members_filters_by_coverage_and_missing_steps() {
    let mut store = open_store();
    let spouse = MemberId("member-a".to_string());
    let dependent = MemberId("member-b".to_string());

    store.upsert_record(
        &spouse,
        RecordPatch {
            role: Some(MemberRole::Spouse),
            ..RecordPatch::default()
        },
    );
    store.upsert_record(
        &dependent,
        RecordPatch {
            included_in_coverage: Some(false),
            ..RecordPatch::default()
        },
    );
    store.mutate(|household| {
        if let Some(record) = household.record_mut(&spouse) {
            record
                .step_progress
                .insert(StepId::PersonalInformation, StepStatus::Completed);
        }
    });

    assert_eq!(store.list_members(MemberFilter::All).len(), 2);
    assert_eq!(store.list_members(MemberFilter::IncludedInCoverage).len(), 1);

    let needing_personal_info =
        store.list_members(MemberFilter::MissingStep(StepId::PersonalInformation));
    assert_eq!(needing_personal_info.len(), 1);
    assert_eq!(needing_personal_info[0].id, dependent);
}

#[test]
fn household_survives_a_reopen_through_the_same_store() {
    let session_store = Arc::new(InMemorySessionStore::new());
    let primary = primary_member_id();

    {
        let mut store = RecordStore::open(Arc::clone(&session_store), "reload");
        store.upsert_record(&primary, primary_personal_info());
        store.upsert_record(&primary, ssn_patch());
    }

    let reopened = RecordStore::open(session_store, "reload");
    let record = reopened.get_record(&primary).expect("primary persisted");
    assert_eq!(record.last_name.as_deref(), Some("Doe"));
    assert_eq!(
        record.ssn.as_ref().map(|ssn| ssn.masked()),
        Some("***-**-6789".to_string())
    );
}

#[test]
fn quota_failures_warn_but_keep_memory_authoritative() {
    let mut store = RecordStore::open(Arc::new(InMemorySessionStore::with_quota(64)), "tiny");
    let primary = primary_member_id();

    store.upsert_record(&primary, primary_personal_info());

    assert!(matches!(
        store.persistence_warning(),
        Some(StorageError::QuotaExceeded)
    ));
    // The write failed, but reads still see the data for this session.
    assert_eq!(
        store.get_record(&primary).expect("in-memory").first_name.as_deref(),
        Some("Jane")
    );
}

#[test]
fn corrupt_blob_starts_fresh_instead_of_failing() {
    let session_store = Arc::new(InMemorySessionStore::new());
    session_store
        .write("household:broken", "{not json")
        .expect("seed");

    let store = RecordStore::open(session_store, "broken");
    assert!(store.get_record(&primary_member_id()).is_ok());
    assert!(matches!(
        store.persistence_warning(),
        Some(StorageError::Corrupt(_))
    ));
}

#[test]
fn legacy_flat_keys_seed_a_new_household() {
    let session_store = Arc::new(InMemorySessionStore::new());
    for (key, value) in [
        ("firstName", "Jane"),
        ("lastName", "Doe"),
        ("dateOfBirth", "05/14/1990"),
        ("ssn", "123456789"),
        ("zipCode", "50309"),
        ("planId", "plan-77"),
    ] {
        session_store.write(key, value).expect("seed");
    }

    let store = RecordStore::open(session_store, "legacy");
    let household = store.household();
    assert_eq!(household.primary.first_name.as_deref(), Some("Jane"));
    assert_eq!(household.zip_code.as_deref(), Some("50309"));
    assert_eq!(
        household.plan_id.as_ref().map(|plan| plan.0.as_str()),
        Some("plan-77")
    );
    assert!(household.primary.date_of_birth.is_some());
}
