//! The enrollment step graph.
//!
//! One graph definition serves every role. Most edges are linear; the
//! branches (tobacco detail page, not-applying bypass) are resolved from the
//! record and household context so that identical inputs always produce the
//! same next step.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicantRecord, HouseholdContext, MemberRole, PlanId, TobaccoUsage,
};
use super::validate::{self, AgePolicy, FieldError};

/// Every addressable page of the wizard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepId {
    PersonalInformation,
    Address,
    Ssn,
    Citizenship,
    Incarceration,
    FamilyMembers,
    Income,
    TobaccoUsage,
    Review,
    Agreements,
    Signature,
    Confirmation,
}

impl StepId {
    pub const fn slug(self) -> &'static str {
        match self {
            StepId::PersonalInformation => "personal-information",
            StepId::Address => "address",
            StepId::Ssn => "ssn",
            StepId::Citizenship => "citizenship",
            StepId::Incarceration => "incarceration",
            StepId::FamilyMembers => "family-members",
            StepId::Income => "income",
            StepId::TobaccoUsage => "tobacco-usage",
            StepId::Review => "review",
            StepId::Agreements => "agreements",
            StepId::Signature => "signature",
            StepId::Confirmation => "confirmation",
        }
    }

    /// Resolve a URL slug. Stale bookmarks produce [`UnknownStep`], which the
    /// caller turns into a redirect to a safe entry point.
    pub fn from_slug(value: &str) -> Result<Self, UnknownStep> {
        ALL_STEPS
            .iter()
            .copied()
            .find(|step| step.slug() == value)
            .ok_or_else(|| UnknownStep(value.to_string()))
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

/// Sentinel for an unresolvable step id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown enrollment step '{0}'")]
pub struct UnknownStep(pub String);

const ALL_STEPS: [StepId; 12] = [
    StepId::PersonalInformation,
    StepId::Address,
    StepId::Ssn,
    StepId::Citizenship,
    StepId::Incarceration,
    StepId::FamilyMembers,
    StepId::Income,
    StepId::TobaccoUsage,
    StepId::Review,
    StepId::Agreements,
    StepId::Signature,
    StepId::Confirmation,
];

/// Default (no-branch) order for the primary applicant.
const PRIMARY_SEQUENCE: &[StepId] = &[
    StepId::PersonalInformation,
    StepId::Address,
    StepId::Ssn,
    StepId::Citizenship,
    StepId::Incarceration,
    StepId::FamilyMembers,
    StepId::Income,
    StepId::TobaccoUsage,
    StepId::Review,
    StepId::Agreements,
    StepId::Signature,
    StepId::Confirmation,
];

/// Default order for spouse/dependent records. Address, agreements, and
/// signature belong to the household's primary flow; a member's flow ends at
/// their review step.
const MEMBER_SEQUENCE: &[StepId] = &[
    StepId::PersonalInformation,
    StepId::Ssn,
    StepId::Citizenship,
    StepId::Incarceration,
    StepId::Income,
    StepId::TobaccoUsage,
    StepId::Review,
];

pub fn sequence_for(role: MemberRole) -> &'static [StepId] {
    match role {
        MemberRole::Primary => PRIMARY_SEQUENCE,
        MemberRole::Spouse | MemberRole::Dependent => MEMBER_SEQUENCE,
    }
}

pub fn first_step(role: MemberRole) -> StepId {
    sequence_for(role)[0]
}

/// Compute the step after `current` for this record.
///
/// Deterministic in `(current, record, context)`. Returns `None` at the
/// terminal step, or when `current` does not apply to the record's role.
pub fn next_step(
    current: StepId,
    record: &ApplicantRecord,
    context: &HouseholdContext,
) -> Option<StepId> {
    let sequence = sequence_for(record.role);
    let position = sequence.iter().position(|step| *step == current)?;

    // A member who is not applying bypasses the remaining data-collection
    // steps and lands straight on their review page.
    if record.role != MemberRole::Primary
        && context.is_not_applying(&record.id)
        && current != StepId::Review
    {
        return Some(StepId::Review);
    }

    let mut position = position + 1;
    let mut next = *sequence.get(position)?;

    // The tobacco detail page only exists for smokers.
    if next == StepId::TobaccoUsage && record.tobacco_usage != Some(TobaccoUsage::Smoker) {
        position += 1;
        next = *sequence.get(position)?;
    }

    Some(next)
}

/// Structural inverse of the default linear order, for back-navigation.
/// Branch edges are not reversed: back from `review` lands on the step that
/// precedes it on the default path.
pub fn previous_step(current: StepId, role: MemberRole) -> Option<StepId> {
    let sequence = sequence_for(role);
    let position = sequence.iter().position(|step| *step == current)?;
    position.checked_sub(1).map(|index| sequence[index])
}

/// Render a step as the URL contract the pages address it by.
pub fn step_url(step: StepId, plan_id: Option<&PlanId>, member: Option<&ApplicantRecord>) -> String {
    let mut query: Vec<String> = Vec::new();
    if let Some(plan) = plan_id {
        query.push(format!("planId={}", plan.0));
    }
    if let Some(member) = member {
        if member.role != MemberRole::Primary {
            query.push(format!("familyMemberId={}", member.id));
            query.push(format!("type={}", member.role.label()));
        }
    }

    if query.is_empty() {
        format!("/enrollment/{}", step.slug())
    } else {
        format!("/enrollment/{}?{}", step.slug(), query.join("&"))
    }
}

/// The entry point unresolvable URLs fall back to.
pub fn fallback_url(plan_id: Option<&PlanId>) -> String {
    step_url(StepId::PersonalInformation, plan_id, None)
}

/// Required-field check for one step, over the fields that step actually
/// shows. Conditional fields (pending disposition, immigration document)
/// are validated only when their controlling answer makes them visible.
///
/// A primary applicant outside the age window fails here, a hard stop.
/// Family members do not; their age handling is advisory and happens in the
/// coordinator.
pub fn step_field_errors(
    step: StepId,
    record: &ApplicantRecord,
    context: &HouseholdContext,
    policy: &AgePolicy,
    today: NaiveDate,
) -> Vec<FieldError> {
    let mut errors = Vec::new();

    match step {
        StepId::PersonalInformation => {
            check_name(record.first_name.as_deref(), &mut errors);
            check_name(record.last_name.as_deref(), &mut errors);
            match record.date_of_birth {
                None => errors.push(FieldError::Required),
                Some(date_of_birth) => {
                    if record.role == MemberRole::Primary {
                        let profile = policy.profile(date_of_birth, today);
                        if profile.under_minimum {
                            errors.push(FieldError::UnderMinimumAge {
                                minimum: policy.minimum_age,
                            });
                        } else if profile.over_maximum {
                            errors.push(FieldError::OverMaximumAge {
                                maximum: policy.maximum_age,
                            });
                        }
                    }
                }
            }
            if record.gender.is_none() {
                errors.push(FieldError::Required);
            }
            if record.tobacco_usage.is_none() {
                errors.push(FieldError::Required);
            }
        }
        StepId::Address => match &record.address {
            None => errors.push(FieldError::Required),
            Some(address) => {
                push_err(validate::required_text(&address.street), &mut errors);
                push_err(validate::required_text(&address.city), &mut errors);
                push_err(validate::required_text(&address.state), &mut errors);
                push_err(validate::zip5(&address.zip), &mut errors);
            }
        },
        StepId::Ssn => {
            // Ssn values are format-checked at construction; presence is all
            // that is left to verify here.
            if record.ssn.is_none() {
                errors.push(FieldError::Required);
            }
        }
        StepId::Citizenship => match &record.citizenship {
            None => errors.push(FieldError::Required),
            Some(citizenship) => {
                push_err(validate::citizenship_document(citizenship), &mut errors);
            }
        },
        StepId::Incarceration => match &record.incarceration {
            None => errors.push(FieldError::Required),
            Some(incarceration) => {
                push_err(
                    validate::incarceration_disposition(incarceration),
                    &mut errors,
                );
            }
        },
        StepId::FamilyMembers => {
            // List page; adding members is optional.
        }
        StepId::Income => {
            if record.income_sources.is_empty() {
                errors.push(FieldError::MissingIncomeSource);
            }
            for source in &record.income_sources {
                push_err(validate::income_source_complete(source), &mut errors);
            }
        }
        StepId::TobaccoUsage | StepId::Review | StepId::Confirmation => {
            // Informational pages; nothing required.
        }
        StepId::Agreements => {
            if !context.agreements_accepted {
                errors.push(FieldError::AgreementsNotAccepted);
            }
        }
        StepId::Signature => match (&record.signature, record.full_name()) {
            (Some(signature), Some(full_name)) => {
                push_err(validate::signature_match(signature, &full_name), &mut errors);
            }
            _ => errors.push(FieldError::Required),
        },
    }

    errors
}

fn check_name(value: Option<&str>, errors: &mut Vec<FieldError>) {
    match value {
        None => errors.push(FieldError::Required),
        Some(name) => push_err(validate::name_characters(name), errors),
    }
}

fn push_err(result: Result<(), FieldError>, errors: &mut Vec<FieldError>) {
    if let Err(error) = result {
        errors.push(error);
    }
}
