use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::steps::StepId;
use super::validate::{self, FieldError};

/// Identifier wrapper for household members. Generated once, never reused.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(pub String);

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque plan identifier carried through the whole flow as query context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanId(pub String);

/// Who a record belongs to within the household.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Primary,
    Spouse,
    Dependent,
}

impl MemberRole {
    pub const fn label(self) -> &'static str {
        match self {
            MemberRole::Primary => "primary",
            MemberRole::Spouse => "spouse",
            MemberRole::Dependent => "dependent",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TobaccoUsage {
    Smoker,
    NonSmoker,
}

/// Nine-digit Social Security number. Never rendered in full outside the
/// persisted blob and the final submission payload; `Debug` and views go
/// through [`Ssn::masked`].
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ssn(String);

impl Ssn {
    pub fn parse(value: &str) -> Result<Self, FieldError> {
        validate::ssn9(value)?;
        Ok(Self(value.to_string()))
    }

    /// All but the last four digits obscured, e.g. `***-**-6789`.
    pub fn masked(&self) -> String {
        format!("***-**-{}", &self.0[5..])
    }

    pub fn digits(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Ssn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ssn({})", self.masked())
    }
}

impl TryFrom<String> for Ssn {
    type Error = FieldError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ssn::parse(&value)
    }
}

impl From<Ssn> for String {
    fn from(value: Ssn) -> Self {
        value.0
    }
}

/// Mailing address as collected on the address step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MailingAddress {
    pub street: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub city: String,
    pub state: String,
    pub zip: String,
}

/// Sentinel the citizenship page offers when none of the listed immigration
/// documents apply. Valid for progression, but flagged as a followup.
pub const NO_DOCUMENT_SENTINEL: &str = "None of these";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citizenship {
    pub us_citizen: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immigration_document: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Incarceration {
    pub incarcerated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_disposition: Option<bool>,
}

/// How often an income amount arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayFrequency {
    Weekly,
    Biweekly,
    Monthly,
    Yearly,
}

impl PayFrequency {
    pub const fn periods_per_year(self) -> u64 {
        match self {
            PayFrequency::Weekly => 52,
            PayFrequency::Biweekly => 26,
            PayFrequency::Monthly => 12,
            PayFrequency::Yearly => 1,
        }
    }
}

/// One income source. A closed set; the legacy flow compared free-form type
/// strings and drifted, so each kind carries exactly the fields it needs.
/// `Unemployed` deliberately carries no amount or frequency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum IncomeSource {
    Job {
        employer: String,
        phone: String,
        amount: u32,
        frequency: PayFrequency,
    },
    SelfEmployed {
        job_type: String,
        amount: u32,
        frequency: PayFrequency,
    },
    Unemployment {
        expires_on: Option<NaiveDate>,
        amount: u32,
        frequency: PayFrequency,
    },
    Unemployed,
}

impl IncomeSource {
    pub const fn kind_label(&self) -> &'static str {
        match self {
            IncomeSource::Job { .. } => "job",
            IncomeSource::SelfEmployed { .. } => "self-employed",
            IncomeSource::Unemployment { .. } => "unemployment",
            IncomeSource::Unemployed => "unemployed",
        }
    }

    /// Amount normalized to a yearly figure.
    pub fn annual_amount(&self) -> u64 {
        match self {
            IncomeSource::Job {
                amount, frequency, ..
            }
            | IncomeSource::SelfEmployed {
                amount, frequency, ..
            }
            | IncomeSource::Unemployment {
                amount, frequency, ..
            } => u64::from(*amount) * frequency.periods_per_year(),
            IncomeSource::Unemployed => 0,
        }
    }
}

/// Per-step completion state for one member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
}

impl StepStatus {
    pub const fn label(self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::InProgress => "in_progress",
            StepStatus::Completed => "completed",
        }
    }
}

/// Everything collected for one household member across the wizard.
///
/// Fields are optional until the corresponding step has been visited; the
/// step validators decide what must be present before a step completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantRecord {
    pub id: MemberId,
    pub role: MemberRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tobacco_usage: Option<TobaccoUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssn: Option<Ssn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<MailingAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citizenship: Option<Citizenship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incarceration: Option<Incarceration>,
    #[serde(default)]
    pub income_sources: Vec<IncomeSource>,
    pub included_in_coverage: bool,
    /// Explicit user override of the age-derived coverage restriction.
    /// Persisted so a reload does not silently re-apply the restriction.
    #[serde(default)]
    pub skip_age_validation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default)]
    pub step_progress: BTreeMap<StepId, StepStatus>,
}

impl ApplicantRecord {
    pub fn new(id: MemberId, role: MemberRole) -> Self {
        Self {
            id,
            role,
            first_name: None,
            last_name: None,
            date_of_birth: None,
            gender: None,
            tobacco_usage: None,
            ssn: None,
            address: None,
            citizenship: None,
            incarceration: None,
            income_sources: Vec::new(),
            included_in_coverage: true,
            skip_age_validation: false,
            signature: None,
            step_progress: BTreeMap::new(),
        }
    }

    /// `"First Last"`, once both names are on file. Signature matching runs
    /// against this exact string.
    pub fn full_name(&self) -> Option<String> {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => Some(format!("{first} {last}")),
            _ => None,
        }
    }

    pub fn step_status(&self, step: StepId) -> StepStatus {
        self.step_progress
            .get(&step)
            .copied()
            .unwrap_or(StepStatus::Pending)
    }

    /// Merge a partial update into the record. Fields absent from the patch
    /// are left untouched, so repeated patches accumulate rather than reset.
    pub fn apply(&mut self, patch: RecordPatch) {
        if let Some(first_name) = patch.first_name {
            self.first_name = Some(strip_digits(&first_name));
        }
        if let Some(last_name) = patch.last_name {
            self.last_name = Some(strip_digits(&last_name));
        }
        if let Some(date_of_birth) = patch.date_of_birth {
            self.date_of_birth = Some(date_of_birth);
        }
        if let Some(gender) = patch.gender {
            self.gender = Some(gender);
        }
        if let Some(tobacco_usage) = patch.tobacco_usage {
            self.tobacco_usage = Some(tobacco_usage);
        }
        if let Some(ssn) = patch.ssn {
            self.ssn = Some(ssn);
        }
        if let Some(address) = patch.address {
            self.address = Some(address);
        }
        if let Some(citizenship) = patch.citizenship {
            self.citizenship = Some(citizenship);
        }
        if let Some(incarceration) = patch.incarceration {
            self.incarceration = Some(incarceration);
        }
        if let Some(income_sources) = patch.income_sources {
            self.income_sources = income_sources;
        }
        if let Some(included) = patch.included_in_coverage {
            self.included_in_coverage = included;
        }
        if let Some(skip) = patch.skip_age_validation {
            self.skip_age_validation = skip;
        }
        if let Some(signature) = patch.signature {
            self.signature = Some(signature);
        }
    }
}

// The name inputs strip digits as the user types; everything else the
// character rule rejects is reported instead of silently dropped.
fn strip_digits(value: &str) -> String {
    value.chars().filter(|ch| !ch.is_ascii_digit()).collect()
}

/// Partial update for an [`ApplicantRecord`]. Only `Some` fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RecordPatch {
    pub role: Option<MemberRole>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub tobacco_usage: Option<TobaccoUsage>,
    pub ssn: Option<Ssn>,
    pub address: Option<MailingAddress>,
    pub citizenship: Option<Citizenship>,
    pub incarceration: Option<Incarceration>,
    pub income_sources: Option<Vec<IncomeSource>>,
    pub included_in_coverage: Option<bool>,
    pub skip_age_validation: Option<bool>,
    pub signature: Option<String>,
}

/// The whole session: primary applicant, family members, and the context
/// that belongs to the flow rather than to any one person.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HouseholdContext {
    pub primary: ApplicantRecord,
    #[serde(default)]
    pub members: BTreeMap<MemberId, ApplicantRecord>,
    /// Members explicitly flagged as not applying for coverage. Their
    /// remaining steps gain a skip affordance; collected data is retained.
    #[serde(default)]
    pub not_applying: BTreeSet<MemberId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,
    #[serde(default)]
    pub agreements_accepted: bool,
}

impl HouseholdContext {
    pub fn new(primary_id: MemberId) -> Self {
        Self {
            primary: ApplicantRecord::new(primary_id, MemberRole::Primary),
            members: BTreeMap::new(),
            not_applying: BTreeSet::new(),
            zip_code: None,
            plan_id: None,
            agreements_accepted: false,
        }
    }

    pub fn record(&self, id: &MemberId) -> Option<&ApplicantRecord> {
        if self.primary.id == *id {
            Some(&self.primary)
        } else {
            self.members.get(id)
        }
    }

    pub fn record_mut(&mut self, id: &MemberId) -> Option<&mut ApplicantRecord> {
        if self.primary.id == *id {
            Some(&mut self.primary)
        } else {
            self.members.get_mut(id)
        }
    }

    pub fn is_not_applying(&self, id: &MemberId) -> bool {
        self.not_applying.contains(id)
    }

    pub fn spouse(&self) -> Option<&ApplicantRecord> {
        self.members
            .values()
            .find(|member| member.role == MemberRole::Spouse)
    }
}
