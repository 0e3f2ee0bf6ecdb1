use std::sync::Arc;

use chrono::NaiveDate;

use crate::enrollment::domain::{
    Gender, IncomeSource, MemberRole, PayFrequency, RecordPatch, StepStatus, TobaccoUsage,
};
use crate::enrollment::household::{AgeWarningReason, CoordinatorError};
use crate::enrollment::steps::StepId;
use crate::enrollment::store::{primary_member_id, InMemorySessionStore};
use crate::enrollment::validate::FieldError;

use super::common::*;

fn spouse_personal_info(birth_year: i32) -> RecordPatch {
    RecordPatch {
        first_name: Some("Alex".to_string()),
        last_name: Some("Doe".to_string()),
        date_of_birth: NaiveDate::from_ymd_opt(birth_year, 6, 1),
        gender: Some(Gender::Male),
        tobacco_usage: Some(TobaccoUsage::NonSmoker),
        ..RecordPatch::default()
    }
}

#[test]
fn only_one_spouse_per_household() {
    let mut coordinator = coordinator();
    coordinator.add_member(MemberRole::Spouse).expect("first spouse");

    match coordinator.add_member(MemberRole::Spouse) {
        Err(CoordinatorError::SpouseAlreadyPresent) => {}
        other => panic!("expected spouse conflict, got {other:?}"),
    }

    // Dependents are unbounded.
    coordinator.add_member(MemberRole::Dependent).expect("dependent one");
    coordinator.add_member(MemberRole::Dependent).expect("dependent two");
}

#[test]
fn primary_under_nineteen_is_hard_blocked() {
    let mut coordinator = coordinator();
    let primary = primary_member_id();
    let today = fixed_today();

    let mut patch = primary_personal_info();
    patch.date_of_birth = NaiveDate::from_ymd_opt(2008, 3, 10); // 16 years old
    coordinator.update_member(&primary, patch, today).expect("patch applies");

    match coordinator.complete_step(&primary, StepId::PersonalInformation, today) {
        Err(CoordinatorError::StepValidation { step, errors }) => {
            assert_eq!(step, StepId::PersonalInformation);
            assert!(errors.contains(&FieldError::UnderMinimumAge { minimum: 19 }));
        }
        other => panic!("expected a hard stop, got {other:?}"),
    }

    // The step never completes, so the applicant cannot advance.
    let record = coordinator.record(&primary).expect("primary");
    assert_ne!(
        record.step_status(StepId::PersonalInformation),
        StepStatus::Completed
    );
}

#[test]
fn over_age_spouse_warns_and_defaults_out_of_coverage() {
    let mut coordinator = coordinator();
    let today = fixed_today();

    let spouse = coordinator.add_member(MemberRole::Spouse).expect("spouse");
    coordinator
        .update_member(&spouse.id, spouse_personal_info(1955), today) // 69 years old
        .expect("patch applies");

    // Soft rule: the step still completes, with an advisory.
    let outcome = coordinator
        .complete_step(&spouse.id, StepId::PersonalInformation, today)
        .expect("member step completes despite age");
    assert!(!outcome.advisories.is_empty());

    let record = coordinator.record(&spouse.id).expect("spouse");
    assert!(!record.included_in_coverage);
    assert!(!record.skip_age_validation);

    let eligibility = coordinator.recompute_household_eligibility(today);
    assert_eq!(eligibility.age_warnings.len(), 1);
    assert!(matches!(
        eligibility.age_warnings[0].reason,
        AgeWarningReason::OverMaximum { age: 69, maximum: 65 }
    ));
}

#[test]
fn coverage_override_persists_across_a_reload() {
    let session_store = Arc::new(InMemorySessionStore::new());
    let today = fixed_today();
    let spouse_id;

    {
        let mut coordinator = coordinator_on(Arc::clone(&session_store), "override");
        let spouse = coordinator.add_member(MemberRole::Spouse).expect("spouse");
        spouse_id = spouse.id.clone();
        coordinator
            .update_member(&spouse_id, spouse_personal_info(1955), today)
            .expect("patch applies");
        assert!(!coordinator.record(&spouse_id).expect("spouse").included_in_coverage);

        // The user re-checks inclusion; the override must stick.
        coordinator
            .set_included_in_coverage(&spouse_id, true, today)
            .expect("override applies");
    }

    let coordinator = coordinator_on(session_store, "override");
    let spouse = coordinator.record(&spouse_id).expect("spouse reloaded");
    assert!(spouse.included_in_coverage);
    assert!(spouse.skip_age_validation);

    // No warning for an explicitly overridden member.
    let eligibility = coordinator.recompute_household_eligibility(today);
    assert!(eligibility.age_warnings.is_empty());
}

#[test]
fn income_normalization_sums_across_frequencies() {
    let mut coordinator = coordinator();
    let primary = primary_member_id();
    let today = fixed_today();

    coordinator
        .update_member(
            &primary,
            RecordPatch {
                income_sources: Some(vec![
                    IncomeSource::SelfEmployed {
                        job_type: "Photographer".to_string(),
                        amount: 1000,
                        frequency: PayFrequency::Weekly,
                    },
                    IncomeSource::Job {
                        employer: "Prairie Light Studio".to_string(),
                        phone: "515-555-0142".to_string(),
                        amount: 2000,
                        frequency: PayFrequency::Monthly,
                    },
                ]),
                ..RecordPatch::default()
            },
            today,
        )
        .expect("income applies");

    assert_eq!(
        coordinator.total_annual_income(&primary).expect("income"),
        1000 * 52 + 2000 * 12
    );
    assert_eq!(coordinator.household_annual_income(), 76_000);
}

#[test]
fn unemployed_income_passes_with_zero_total() {
    let mut coordinator = coordinator();
    let primary = primary_member_id();
    let today = fixed_today();

    coordinator
        .update_member(
            &primary,
            RecordPatch {
                income_sources: Some(vec![IncomeSource::Unemployed]),
                ..RecordPatch::default()
            },
            today,
        )
        .expect("income applies");

    assert_eq!(coordinator.total_annual_income(&primary).expect("income"), 0);
    coordinator
        .complete_step(&primary, StepId::Income, today)
        .expect("unemployed income is submittable");
}

#[test]
fn short_phone_blocks_income_until_corrected() {
    let mut coordinator = coordinator();
    let primary = primary_member_id();
    let today = fixed_today();

    coordinator
        .update_member(
            &primary,
            RecordPatch {
                income_sources: Some(vec![IncomeSource::Job {
                    employer: "Prairie Light Studio".to_string(),
                    phone: "555-123".to_string(),
                    amount: 2000,
                    frequency: PayFrequency::Monthly,
                }]),
                ..RecordPatch::default()
            },
            today,
        )
        .expect("income applies");

    match coordinator.complete_step(&primary, StepId::Income, today) {
        Err(CoordinatorError::StepValidation { errors, .. }) => {
            assert!(errors.iter().any(|error| matches!(error, FieldError::PhoneTooShort { .. })));
        }
        other => panic!("expected phone validation failure, got {other:?}"),
    }

    coordinator
        .update_member(&primary, job_income_patch(), today)
        .expect("corrected income applies");
    coordinator
        .complete_step(&primary, StepId::Income, today)
        .expect("nine digits satisfy the phone rule");
}

#[test]
fn skip_advances_progress_without_validation() {
    let mut coordinator = coordinator();
    let dependent = coordinator.add_member(MemberRole::Dependent).expect("dependent");

    // Skipping is only offered to not-applying members.
    match coordinator.skip_step(&dependent.id, StepId::PersonalInformation) {
        Err(CoordinatorError::NotMarkedNotApplying(id)) => assert_eq!(id, dependent.id),
        other => panic!("expected skip refusal, got {other:?}"),
    }

    coordinator.mark_not_applying(&dependent.id).expect("marked");
    let outcome = coordinator
        .skip_step(&dependent.id, StepId::PersonalInformation)
        .expect("skip succeeds with no data at all");

    let record = coordinator.record(&dependent.id).expect("dependent");
    assert_eq!(
        record.step_status(StepId::PersonalInformation),
        StepStatus::Completed
    );
    assert_eq!(outcome.next, Some(StepId::Review));
}

#[test]
fn unmarking_restores_normal_validation() {
    let mut coordinator = coordinator();
    let dependent = coordinator.add_member(MemberRole::Dependent).expect("dependent");

    coordinator.mark_not_applying(&dependent.id).expect("marked");
    coordinator.unmark_not_applying(&dependent.id).expect("unmarked");

    assert!(coordinator
        .skip_step(&dependent.id, StepId::PersonalInformation)
        .is_err());
}

#[test]
fn stale_completed_steps_flag_edits_that_break_earlier_answers() {
    let mut coordinator = coordinator();
    let primary = primary_member_id();
    let today = fixed_today();

    coordinator
        .update_member(&primary, job_income_patch(), today)
        .expect("income applies");
    coordinator
        .complete_step(&primary, StepId::Income, today)
        .expect("income completes");
    assert!(coordinator
        .stale_completed_steps(&primary, today)
        .expect("query")
        .is_empty());

    // Replacing the sources with an incomplete one leaves the completed
    // flag in place but surfaces the step as stale.
    coordinator
        .update_member(
            &primary,
            RecordPatch {
                income_sources: Some(vec![IncomeSource::Job {
                    employer: String::new(),
                    phone: "515-555-0142".to_string(),
                    amount: 2000,
                    frequency: PayFrequency::Monthly,
                }]),
                ..RecordPatch::default()
            },
            today,
        )
        .expect("edit applies");
    assert_eq!(
        coordinator.stale_completed_steps(&primary, today).expect("query"),
        vec![StepId::Income]
    );
}

#[test]
fn primary_walks_the_default_path_to_confirmation() {
    let mut coordinator = coordinator();
    let primary = primary_member_id();
    let today = fixed_today();

    for patch in [
        primary_personal_info(),
        address_patch(),
        ssn_patch(),
        citizen_patch(),
        not_incarcerated_patch(),
        job_income_patch(),
    ] {
        coordinator.update_member(&primary, patch, today).expect("patch applies");
    }

    let mut step = StepId::PersonalInformation;
    let mut visited = vec![step];
    loop {
        coordinator.begin_step(&primary, step).expect("begin");
        if step == StepId::Agreements {
            coordinator.accept_agreements();
        }
        if step == StepId::Signature {
            coordinator
                .update_member(
                    &primary,
                    RecordPatch {
                        signature: Some("Jane Doe".to_string()),
                        ..RecordPatch::default()
                    },
                    today,
                )
                .expect("signature applies");
        }
        let outcome = coordinator.complete_step(&primary, step, today).expect("step completes");
        match outcome.next {
            Some(next) => {
                visited.push(next);
                step = next;
            }
            None => break,
        }
    }

    // Non-smoker: the tobacco detail page is bypassed.
    assert!(!visited.contains(&StepId::TobaccoUsage));
    assert_eq!(visited.last(), Some(&StepId::Confirmation));
    assert_eq!(
        coordinator.record(&primary).expect("primary").step_status(StepId::Review),
        StepStatus::Completed
    );
}

#[test]
fn submission_requires_matching_signature_and_agreements() {
    let mut coordinator = coordinator();
    let primary = primary_member_id();
    let today = fixed_today();

    coordinator
        .update_member(&primary, primary_personal_info(), today)
        .expect("personal info applies");

    match coordinator.submission_payload(today) {
        Err(CoordinatorError::SubmissionBlocked { errors }) => {
            assert!(errors.contains(&FieldError::AgreementsNotAccepted));
        }
        other => panic!("expected submission block, got {other:?}"),
    }

    coordinator.accept_agreements();
    coordinator
        .update_member(
            &primary,
            RecordPatch {
                signature: Some(" Jane Doe ".to_string()),
                ..RecordPatch::default()
            },
            today,
        )
        .expect("signature applies");

    let payload = coordinator.submission_payload(today).expect("payload");
    assert_eq!(payload.submitted_on, today);
    assert_eq!(payload.household.primary.first_name.as_deref(), Some("Jane"));

    // Case mismatch invalidates the signature again; validity is always
    // re-derived, never cached.
    coordinator
        .update_member(
            &primary,
            RecordPatch {
                signature: Some("jane doe".to_string()),
                ..RecordPatch::default()
            },
            today,
        )
        .expect("signature applies");
    assert!(coordinator.submission_payload(today).is_err());
}
