//! Sanitized representations for API responses and the CLI demo.
//! SSNs never leave the process unmasked through these types.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{
    ApplicantRecord, Gender, HouseholdContext, MemberId, MemberRole, StepStatus, TobaccoUsage,
};
use super::steps::{self, StepId};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberView {
    pub id: MemberId,
    pub role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tobacco_usage: Option<TobaccoUsage>,
    /// Masked, e.g. `***-**-6789`; the full value stays inside the engine.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssn: Option<String>,
    pub included_in_coverage: bool,
    pub skip_age_validation: bool,
    pub not_applying: bool,
    pub annual_income: u64,
    pub step_progress: BTreeMap<&'static str, &'static str>,
}

impl MemberView {
    pub fn from_record(record: &ApplicantRecord, context: &HouseholdContext) -> Self {
        Self {
            id: record.id.clone(),
            role: record.role.label(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            date_of_birth: record.date_of_birth,
            gender: record.gender,
            tobacco_usage: record.tobacco_usage,
            ssn: record.ssn.as_ref().map(|ssn| ssn.masked()),
            included_in_coverage: record.included_in_coverage,
            skip_age_validation: record.skip_age_validation,
            not_applying: context.is_not_applying(&record.id),
            annual_income: record
                .income_sources
                .iter()
                .map(|source| source.annual_amount())
                .sum(),
            step_progress: record
                .step_progress
                .iter()
                .map(|(step, status)| (step.slug(), status.label()))
                .collect(),
        }
    }

    pub fn completed_steps(&self) -> usize {
        self.step_progress
            .values()
            .filter(|status| **status == StepStatus::Completed.label())
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdView {
    pub primary: MemberView,
    pub members: Vec<MemberView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    pub agreements_accepted: bool,
}

impl HouseholdView {
    pub fn from_context(context: &HouseholdContext) -> Self {
        Self {
            primary: MemberView::from_record(&context.primary, context),
            members: context
                .members
                .values()
                .map(|member| MemberView::from_record(member, context))
                .collect(),
            zip_code: context.zip_code.clone(),
            plan_id: context.plan_id.as_ref().map(|plan| plan.0.clone()),
            agreements_accepted: context.agreements_accepted,
        }
    }
}

/// A resolved step transition, ready for the page layer to follow.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTransitionView {
    pub step: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_url: Option<String>,
    pub advisories: Vec<String>,
}

impl StepTransitionView {
    pub fn from_outcome(
        outcome: &super::household::StepOutcome,
        context: &HouseholdContext,
        record: &ApplicantRecord,
    ) -> Self {
        let member = (record.role != MemberRole::Primary).then_some(record);
        Self {
            step: outcome.step.slug(),
            next: outcome.next.map(StepId::slug),
            next_url: outcome
                .next
                .map(|next| steps::step_url(next, context.plan_id.as_ref(), member)),
            advisories: outcome.advisories.clone(),
        }
    }
}
