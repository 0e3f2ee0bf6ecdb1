use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use super::domain::{
    ApplicantRecord, HouseholdContext, MemberId, MemberRole, RecordPatch, StepStatus,
};
use super::steps::{self, StepId};
use super::store::{fresh_member_id, RecordStore, SessionStore, StoreError};
use super::validate::{self, AgePolicy, FieldError};

/// Failures surfaced by the coordinator. Validation failures carry the full
/// field-error list so the page can render them inline.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("a spouse is already part of this household")]
    SpouseAlreadyPresent,
    #[error("the household already has a primary applicant")]
    PrimaryAlreadyPresent,
    #[error("step '{step}' failed validation: {}", DisplayErrors(.errors))]
    StepValidation {
        step: StepId,
        errors: Vec<FieldError>,
    },
    #[error("member '{0}' is not marked as not applying; steps cannot be skipped")]
    NotMarkedNotApplying(MemberId),
    #[error("household is not ready for submission: {}", DisplayErrors(.errors))]
    SubmissionBlocked { errors: Vec<FieldError> },
}

struct DisplayErrors<'a>(&'a [FieldError]);

impl fmt::Display for DisplayErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, error) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

/// Advisory produced when a member's age falls outside the coverage window.
/// Never blocks; the applicant may acknowledge and continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeWarning {
    pub member_id: MemberId,
    pub reason: AgeWarningReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum AgeWarningReason {
    #[error("member is {age}, under the minimum coverage age of {minimum}")]
    UnderMinimum { age: u8, minimum: u8 },
    #[error("member is {age}, over the maximum coverage age of {maximum}")]
    OverMaximum { age: u8, maximum: u8 },
}

/// Household-wide eligibility snapshot shown before final progression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdEligibility {
    pub total_included_members: usize,
    pub age_warnings: Vec<AgeWarning>,
}

/// Result of completing or skipping a step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step: StepId,
    pub next: Option<StepId>,
    /// Non-blocking notices to display alongside the transition.
    pub advisories: Vec<String>,
}

/// The terminal contract: everything collected, handed to the (external)
/// submission service. This engine's responsibility ends here.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPayload {
    pub household: HouseholdContext,
    pub submitted_on: NaiveDate,
}

/// Tracks N applicant records through one shared step graph: the primary
/// applicant plus spouse/dependents, each with independent step progress.
pub struct HouseholdCoordinator<S> {
    records: RecordStore<S>,
    policy: AgePolicy,
}

impl<S: SessionStore> HouseholdCoordinator<S> {
    pub fn open(store: Arc<S>, session_id: &str, policy: AgePolicy) -> Self {
        Self {
            records: RecordStore::open(store, session_id),
            policy,
        }
    }

    pub fn household(&self) -> &HouseholdContext {
        self.records.household()
    }

    pub fn policy(&self) -> &AgePolicy {
        &self.policy
    }

    pub fn records(&self) -> &RecordStore<S> {
        &self.records
    }

    pub fn record(&self, id: &MemberId) -> Result<&ApplicantRecord, CoordinatorError> {
        Ok(self.records.get_record(id)?)
    }

    /// Merge a partial update into a member's record, then re-establish the
    /// coverage-inclusion invariant for non-primary members.
    pub fn update_member(
        &mut self,
        id: &MemberId,
        patch: RecordPatch,
        today: NaiveDate,
    ) -> Result<ApplicantRecord, CoordinatorError> {
        self.records.upsert_record(id, patch);
        self.repair_coverage_invariant(id, today);
        Ok(self.records.get_record(id)?.clone())
    }

    /// Create a new spouse or dependent with a fresh id, included in
    /// coverage, with empty step progress. At most one spouse per household.
    pub fn add_member(&mut self, role: MemberRole) -> Result<ApplicantRecord, CoordinatorError> {
        match role {
            MemberRole::Primary => return Err(CoordinatorError::PrimaryAlreadyPresent),
            MemberRole::Spouse if self.household().spouse().is_some() => {
                return Err(CoordinatorError::SpouseAlreadyPresent)
            }
            _ => {}
        }

        let id = fresh_member_id();
        let record = self
            .records
            .upsert_record(
                &id,
                RecordPatch {
                    role: Some(role),
                    ..RecordPatch::default()
                },
            )
            .clone();
        info!(member = %id, role = role.label(), "family member added");
        Ok(record)
    }

    pub fn remove_member(&mut self, id: &MemberId) -> Result<(), CoordinatorError> {
        self.records.delete_record(id)?;
        info!(member = %id, "family member removed");
        Ok(())
    }

    /// Flag a member as not applying for coverage. Their remaining steps can
    /// be skipped; already-collected data stays put.
    pub fn mark_not_applying(&mut self, id: &MemberId) -> Result<(), CoordinatorError> {
        Ok(self.records.set_not_applying(id, true)?)
    }

    pub fn unmark_not_applying(&mut self, id: &MemberId) -> Result<(), CoordinatorError> {
        Ok(self.records.set_not_applying(id, false)?)
    }

    /// Toggle a member's coverage inclusion. Re-including a member whose age
    /// falls outside the window records the explicit override so a later
    /// reload does not silently re-apply the restriction.
    pub fn set_included_in_coverage(
        &mut self,
        id: &MemberId,
        included: bool,
        today: NaiveDate,
    ) -> Result<ApplicantRecord, CoordinatorError> {
        let record = self.records.get_record(id)?;
        let out_of_range = record
            .date_of_birth
            .map(|dob| self.policy.profile(dob, today).out_of_range())
            .unwrap_or(false);

        let patch = RecordPatch {
            included_in_coverage: Some(included),
            skip_age_validation: Some(included && out_of_range),
            ..RecordPatch::default()
        };
        Ok(self.records.upsert_record(id, patch).clone())
    }

    /// Scan every family member and report age-based coverage advisories.
    /// Members with an explicit override, or flagged as not applying, are
    /// left alone.
    pub fn recompute_household_eligibility(&self, today: NaiveDate) -> HouseholdEligibility {
        let household = self.household();
        let mut age_warnings = Vec::new();

        for member in household.members.values() {
            if member.skip_age_validation || household.is_not_applying(&member.id) {
                continue;
            }
            let Some(date_of_birth) = member.date_of_birth else {
                continue;
            };
            let profile = self.policy.profile(date_of_birth, today);
            if profile.under_minimum {
                age_warnings.push(AgeWarning {
                    member_id: member.id.clone(),
                    reason: AgeWarningReason::UnderMinimum {
                        age: profile.age,
                        minimum: self.policy.minimum_age,
                    },
                });
            } else if profile.over_maximum {
                age_warnings.push(AgeWarning {
                    member_id: member.id.clone(),
                    reason: AgeWarningReason::OverMaximum {
                        age: profile.age,
                        maximum: self.policy.maximum_age,
                    },
                });
            }
        }

        let total_included_members = usize::from(household.primary.included_in_coverage)
            + household
                .members
                .values()
                .filter(|member| member.included_in_coverage)
                .count();

        HouseholdEligibility {
            total_included_members,
            age_warnings,
        }
    }

    /// Annualized income for one member: `weekly x52`, `biweekly x26`,
    /// `monthly x12`, `yearly x1`; an unemployed source contributes 0.
    pub fn total_annual_income(&self, id: &MemberId) -> Result<u64, CoordinatorError> {
        let record = self.records.get_record(id)?;
        Ok(record
            .income_sources
            .iter()
            .map(|source| source.annual_amount())
            .sum())
    }

    /// Household-wide annual income across the primary and every member
    /// included in coverage.
    pub fn household_annual_income(&self) -> u64 {
        let household = self.household();
        let member_income: u64 = household
            .members
            .values()
            .filter(|member| member.included_in_coverage)
            .flat_map(|member| member.income_sources.iter())
            .map(|source| source.annual_amount())
            .sum();
        let primary_income: u64 = household
            .primary
            .income_sources
            .iter()
            .map(|source| source.annual_amount())
            .sum();
        primary_income + member_income
    }

    /// Mark a step as started. Completed steps stay completed; the flow's
    /// navigation model is permissive about revisiting.
    pub fn begin_step(&mut self, id: &MemberId, step: StepId) -> Result<(), CoordinatorError> {
        self.records.get_record(id)?;
        self.records.mutate(|household| {
            if let Some(record) = household.record_mut(id) {
                let entry = record.step_progress.entry(step).or_insert(StepStatus::Pending);
                if *entry == StepStatus::Pending {
                    *entry = StepStatus::InProgress;
                }
            }
        });
        Ok(())
    }

    /// Complete a step: the step's visible-field validators must pass, then
    /// progress is recorded and the next step resolved. For the primary
    /// applicant an out-of-window age fails validation here (hard stop);
    /// family members instead get an advisory and a coverage default.
    pub fn complete_step(
        &mut self,
        id: &MemberId,
        step: StepId,
        today: NaiveDate,
    ) -> Result<StepOutcome, CoordinatorError> {
        let record = self.records.get_record(id)?;
        let errors =
            steps::step_field_errors(step, record, self.household(), &self.policy, today);
        if !errors.is_empty() {
            return Err(CoordinatorError::StepValidation { step, errors });
        }

        let mut advisories = Vec::new();
        if step == StepId::Citizenship {
            if let Some(citizenship) = &record.citizenship {
                if validate::document_followup_needed(citizenship) {
                    advisories.push(
                        "No matching immigration document was selected; eligibility may require a followup."
                            .to_string(),
                    );
                }
            }
        }

        self.records.mutate(|household| {
            if let Some(record) = household.record_mut(id) {
                record.step_progress.insert(step, StepStatus::Completed);
            }
        });
        self.repair_coverage_invariant(id, today);

        let record = self.records.get_record(id)?;
        if step == StepId::PersonalInformation && record.role != MemberRole::Primary {
            if let Some(date_of_birth) = record.date_of_birth {
                let profile = self.policy.profile(date_of_birth, today);
                if profile.out_of_range() && !record.skip_age_validation {
                    advisories.push(format!(
                        "This member is {} and outside the {}-{} coverage window; they are excluded from coverage by default.",
                        profile.age, self.policy.minimum_age, self.policy.maximum_age
                    ));
                }
            }
        }

        let next = steps::next_step(step, record, self.household());
        Ok(StepOutcome {
            step,
            next,
            advisories,
        })
    }

    /// Skip a step for a member flagged as not applying. Progress advances
    /// without running the step's validators.
    pub fn skip_step(
        &mut self,
        id: &MemberId,
        step: StepId,
    ) -> Result<StepOutcome, CoordinatorError> {
        let record = self.records.get_record(id)?;
        if record.role == MemberRole::Primary || !self.household().is_not_applying(id) {
            return Err(CoordinatorError::NotMarkedNotApplying(id.clone()));
        }

        self.records.mutate(|household| {
            if let Some(record) = household.record_mut(id) {
                record.step_progress.insert(step, StepStatus::Completed);
            }
        });

        let record = self.records.get_record(id)?;
        let next = steps::next_step(step, record, self.household());
        Ok(StepOutcome {
            step,
            next,
            advisories: Vec::new(),
        })
    }

    /// Steps marked completed whose validators no longer pass against the
    /// current data. Editing an earlier step never clears later completion
    /// flags automatically; callers may use this to prompt re-confirmation.
    pub fn stale_completed_steps(
        &self,
        id: &MemberId,
        today: NaiveDate,
    ) -> Result<Vec<StepId>, CoordinatorError> {
        let record = self.records.get_record(id)?;
        let household = self.household();
        Ok(record
            .step_progress
            .iter()
            .filter(|(_, status)| **status == StepStatus::Completed)
            .filter(|(step, _)| {
                !steps::step_field_errors(**step, record, household, &self.policy, today).is_empty()
            })
            .map(|(step, _)| *step)
            .collect())
    }

    pub fn accept_agreements(&mut self) {
        self.records.set_agreements_accepted(true);
    }

    /// Session-wide context carried by the flow rather than any one record.
    pub fn set_session_fields(
        &mut self,
        zip_code: Option<String>,
        plan_id: Option<super::domain::PlanId>,
    ) {
        self.records.set_session_fields(zip_code, plan_id);
    }

    /// Assemble the terminal submission payload. The signature must match
    /// the primary applicant's name and agreements must be accepted; both
    /// are re-derived here, never trusted from an earlier page.
    pub fn submission_payload(
        &self,
        today: NaiveDate,
    ) -> Result<SubmissionPayload, CoordinatorError> {
        let household = self.household();
        let mut errors = Vec::new();

        if !household.agreements_accepted {
            errors.push(FieldError::AgreementsNotAccepted);
        }
        match (&household.primary.signature, household.primary.full_name()) {
            (Some(signature), Some(full_name)) => {
                if let Err(error) = validate::signature_match(signature, &full_name) {
                    errors.push(error);
                }
            }
            _ => errors.push(FieldError::Required),
        }

        if !errors.is_empty() {
            return Err(CoordinatorError::SubmissionBlocked { errors });
        }

        Ok(SubmissionPayload {
            household: household.clone(),
            submitted_on: today,
        })
    }

    /// Reset a non-primary record that claims coverage inclusion while out
    /// of the age window without the explicit override. Fixed in place and
    /// logged, never propagated as an error.
    fn repair_coverage_invariant(&mut self, id: &MemberId, today: NaiveDate) {
        let Ok(record) = self.records.get_record(id) else {
            return;
        };
        if record.role == MemberRole::Primary
            || !record.included_in_coverage
            || record.skip_age_validation
        {
            return;
        }
        let Some(date_of_birth) = record.date_of_birth else {
            return;
        };
        let profile = self.policy.profile(date_of_birth, today);
        if profile.out_of_range() {
            warn!(
                member = %id,
                age = profile.age,
                "coverage inclusion reset for member outside the age window"
            );
            self.records.mutate(|household| {
                if let Some(record) = household.record_mut(id) {
                    record.included_in_coverage = false;
                }
            });
        }
    }
}
