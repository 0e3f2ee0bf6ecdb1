use chrono::{Datelike, Local, NaiveDate};
use clap::Args;
use std::sync::Arc;

use enroll_flow::enrollment::{
    AgePolicy, Citizenship, CoordinatorError, Gender, HouseholdCoordinator, Incarceration,
    IncomeSource, InMemorySessionStore, MailingAddress, MemberId, MemberRole, PayFrequency,
    PlanId, RecordPatch, ServiceError, Ssn, StepId, StepOutcome, TobaccoUsage,
};
use enroll_flow::enrollment::store::primary_member_id;
use enroll_flow::error::AppError;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Override the reporting date (YYYY-MM-DD, defaults to today).
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Skip the family member portion of the walkthrough.
    #[arg(long)]
    pub(crate) primary_only: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { today, primary_only } = args;
    let today = today.unwrap_or_else(|| Local::now().date_naive());

    println!("Enrollment flow demo ({today})");

    let store = Arc::new(InMemorySessionStore::new());
    let mut coordinator = HouseholdCoordinator::open(store, "demo", AgePolicy::default());
    coordinator.set_session_fields(Some("50309".to_string()), Some(PlanId("plan-42".to_string())));
    let primary = primary_member_id();

    // The first submit runs against an empty record so the validators speak.
    println!("\n-- Primary applicant --");
    attempt_step(&mut coordinator, &primary, StepId::PersonalInformation, today);

    apply(
        &mut coordinator,
        &primary,
        RecordPatch {
            first_name: Some("Avery".to_string()),
            last_name: Some("Jordan".to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(1987, 3, 22),
            gender: Some(Gender::Female),
            tobacco_usage: Some(TobaccoUsage::NonSmoker),
            ..RecordPatch::default()
        },
        today,
    )?;
    attempt_step(&mut coordinator, &primary, StepId::PersonalInformation, today);

    apply(
        &mut coordinator,
        &primary,
        RecordPatch {
            address: Some(MailingAddress {
                street: "612 Maple Court".to_string(),
                unit: Some("Apt 3".to_string()),
                city: "Des Moines".to_string(),
                state: "IA".to_string(),
                zip: "50309".to_string(),
            }),
            ssn: Some(Ssn::parse("123456789").map_err(demo_error)?),
            citizenship: Some(Citizenship {
                us_citizen: true,
                immigration_document: None,
            }),
            incarceration: Some(Incarceration {
                incarcerated: false,
                pending_disposition: None,
            }),
            income_sources: Some(vec![
                IncomeSource::Job {
                    employer: "Prairie Light Studio".to_string(),
                    phone: "515-555-0142".to_string(),
                    amount: 1850,
                    frequency: PayFrequency::Biweekly,
                },
                IncomeSource::SelfEmployed {
                    job_type: "Illustration".to_string(),
                    amount: 400,
                    frequency: PayFrequency::Monthly,
                },
            ]),
            ..RecordPatch::default()
        },
        today,
    )?;

    for step in [
        StepId::Address,
        StepId::Ssn,
        StepId::Citizenship,
        StepId::Incarceration,
        StepId::FamilyMembers,
        StepId::Income,
    ] {
        attempt_step(&mut coordinator, &primary, step, today);
    }

    if !primary_only {
        walk_family_members(&mut coordinator, today)?;
    }

    println!("\n-- Household eligibility --");
    let eligibility = coordinator.recompute_household_eligibility(today);
    println!("  members included in coverage: {}", eligibility.total_included_members);
    for warning in &eligibility.age_warnings {
        println!("  warning for {}: {}", warning.member_id, warning.reason);
    }
    println!(
        "  household annual income: ${}",
        coordinator.household_annual_income()
    );

    println!("\n-- Review and submission --");
    attempt_step(&mut coordinator, &primary, StepId::Review, today);
    coordinator.accept_agreements();
    attempt_step(&mut coordinator, &primary, StepId::Agreements, today);
    apply(
        &mut coordinator,
        &primary,
        RecordPatch {
            signature: Some("Avery Jordan".to_string()),
            ..RecordPatch::default()
        },
        today,
    )?;
    attempt_step(&mut coordinator, &primary, StepId::Signature, today);

    let payload = coordinator
        .submission_payload(today)
        .map_err(ServiceError::from)?;
    let rendered = serde_json::to_string_pretty(
        &enroll_flow::enrollment::HouseholdView::from_context(&payload.household),
    )
    .map_err(demo_error)?;
    println!("submission accepted on {}:\n{rendered}", payload.submitted_on);

    Ok(())
}

fn walk_family_members(
    coordinator: &mut HouseholdCoordinator<InMemorySessionStore>,
    today: NaiveDate,
) -> Result<(), AppError> {
    println!("\n-- Family members --");

    let spouse = coordinator
        .add_member(MemberRole::Spouse)
        .map_err(ServiceError::from)?;
    let spouse_id = spouse.id.clone();
    println!("added spouse {spouse_id}");

    apply(
        coordinator,
        &spouse_id,
        RecordPatch {
            first_name: Some("Marion".to_string()),
            last_name: Some("Jordan".to_string()),
            date_of_birth: NaiveDate::from_ymd_opt(today.year() - 69, 6, 2),
            gender: Some(Gender::Male),
            tobacco_usage: Some(TobaccoUsage::NonSmoker),
            ..RecordPatch::default()
        },
        today,
    )?;
    attempt_step(coordinator, &spouse_id, StepId::PersonalInformation, today);
    let record = coordinator.record(&spouse_id).map_err(ServiceError::from)?;
    println!(
        "  spouse included in coverage: {} (age outside the window)",
        record.included_in_coverage
    );
    coordinator
        .set_included_in_coverage(&spouse_id, true, today)
        .map_err(ServiceError::from)?;
    println!("  spouse re-included by explicit choice");

    let dependent = coordinator
        .add_member(MemberRole::Dependent)
        .map_err(ServiceError::from)?;
    let dependent_id = dependent.id.clone();
    println!("added dependent {dependent_id}, applying for coverage: no");
    coordinator
        .mark_not_applying(&dependent_id)
        .map_err(ServiceError::from)?;
    let outcome = coordinator
        .skip_step(&dependent_id, StepId::PersonalInformation)
        .map_err(ServiceError::from)?;
    render_outcome(&outcome);

    Ok(())
}

fn apply(
    coordinator: &mut HouseholdCoordinator<InMemorySessionStore>,
    id: &MemberId,
    patch: RecordPatch,
    today: NaiveDate,
) -> Result<(), AppError> {
    coordinator
        .update_member(id, patch, today)
        .map_err(ServiceError::from)?;
    Ok(())
}

fn attempt_step(
    coordinator: &mut HouseholdCoordinator<InMemorySessionStore>,
    id: &MemberId,
    step: StepId,
    today: NaiveDate,
) {
    match coordinator.complete_step(id, step, today) {
        Ok(outcome) => render_outcome(&outcome),
        Err(CoordinatorError::StepValidation { step, errors }) => {
            println!("step {step} rejected:");
            for error in errors {
                println!("    {error}");
            }
        }
        Err(other) => println!("step {step} failed: {other}"),
    }
}

fn demo_error<E: std::fmt::Display>(err: E) -> AppError {
    AppError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidInput,
        err.to_string(),
    ))
}

fn render_outcome(outcome: &StepOutcome) {
    match outcome.next {
        Some(next) => println!("step {} completed, next: {next}", outcome.step),
        None => println!("step {} completed, flow finished", outcome.step),
    }
    for advisory in &outcome.advisories {
        println!("    advisory: {advisory}");
    }
}
