//! Pure per-field validation rules.
//!
//! Every function here is side-effect free and takes `today` explicitly when
//! it needs a date, so results are reproducible in tests. Form-level validity
//! is the conjunction of the rules for the fields a step actually shows; the
//! per-step wiring lives in [`super::steps`].

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::domain::{Citizenship, Incarceration, IncomeSource, NO_DOCUMENT_SENTINEL};

/// Why a single field failed validation. Rendered inline next to the field;
/// never treated as an application error.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum FieldError {
    #[error("value is required")]
    Required,
    #[error("not a valid email address")]
    InvalidEmail,
    #[error("password must be at least {minimum} characters")]
    PasswordTooShort { minimum: usize },
    #[error("ZIP code must be exactly 5 digits")]
    InvalidZip,
    #[error("SSN must be exactly 9 digits")]
    InvalidSsn,
    #[error("date must use MM/DD/YYYY")]
    UnparseableDate,
    #[error("{month:02}/{day:02} is not a real calendar date")]
    ImpossibleDate { month: u32, day: u32 },
    #[error("only letters, spaces, hyphens, and apostrophes are allowed")]
    InvalidNameCharacters,
    #[error("signature must exactly match the applicant's full name")]
    SignatureMismatch,
    #[error("applicant must be at least {minimum} years old to apply")]
    UnderMinimumAge { minimum: u8 },
    #[error("applicant must be {maximum} or younger to apply")]
    OverMaximumAge { maximum: u8 },
    #[error("immigration document type is required")]
    MissingImmigrationDocument,
    #[error("pending disposition answer is required")]
    MissingDisposition,
    #[error("employer name is required")]
    MissingEmployer,
    #[error("phone number must contain at least {minimum} digits")]
    PhoneTooShort { minimum: usize },
    #[error("job type description is required")]
    MissingJobType,
    #[error("benefit expiration date is required")]
    MissingExpirationDate,
    #[error("at least one income source is required")]
    MissingIncomeSource,
    #[error("all agreements must be accepted before continuing")]
    AgreementsNotAccepted,
}

pub fn required_text(value: &str) -> Result<(), FieldError> {
    if value.trim().is_empty() {
        return Err(FieldError::Required);
    }
    Ok(())
}

/// Basic `local@domain.tld` shape, nothing more.
pub fn email_format(value: &str) -> Result<(), FieldError> {
    let value = value.trim();
    let Some((local, domain)) = value.split_once('@') else {
        return Err(FieldError::InvalidEmail);
    };
    if local.is_empty() || domain.contains('@') {
        return Err(FieldError::InvalidEmail);
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return Err(FieldError::InvalidEmail);
    };
    if host.is_empty() || tld.is_empty() {
        return Err(FieldError::InvalidEmail);
    }
    Ok(())
}

pub const PASSWORD_MINIMUM_LENGTH: usize = 8;

pub fn password_strength(value: &str) -> Result<(), FieldError> {
    if value.chars().count() < PASSWORD_MINIMUM_LENGTH {
        return Err(FieldError::PasswordTooShort {
            minimum: PASSWORD_MINIMUM_LENGTH,
        });
    }
    Ok(())
}

pub fn zip5(value: &str) -> Result<(), FieldError> {
    if value.len() == 5 && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(FieldError::InvalidZip)
    }
}

pub fn ssn9(value: &str) -> Result<(), FieldError> {
    if value.len() == 9 && value.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(FieldError::InvalidSsn)
    }
}

pub const PHONE_MINIMUM_DIGITS: usize = 9;

/// Phone inputs arrive with arbitrary punctuation; only the digits count.
pub fn phone_digits(value: &str) -> Result<(), FieldError> {
    let digits = value.chars().filter(char::is_ascii_digit).count();
    if digits < PHONE_MINIMUM_DIGITS {
        return Err(FieldError::PhoneTooShort {
            minimum: PHONE_MINIMUM_DIGITS,
        });
    }
    Ok(())
}

/// Parse a `MM/DD/YYYY` form value into a calendar date.
///
/// Impossible month/day combinations are rejected outright; the legacy flow
/// let `Date` roll `02/30` over into March and accepted it.
pub fn parse_date_of_birth(value: &str) -> Result<NaiveDate, FieldError> {
    let parts: Vec<&str> = value.trim().split('/').collect();
    let [month, day, year] = parts.as_slice() else {
        return Err(FieldError::UnparseableDate);
    };
    if year.len() != 4 {
        return Err(FieldError::UnparseableDate);
    }

    let month: u32 = month.parse().map_err(|_| FieldError::UnparseableDate)?;
    let day: u32 = day.parse().map_err(|_| FieldError::UnparseableDate)?;
    let year: i32 = year.parse().map_err(|_| FieldError::UnparseableDate)?;

    NaiveDate::from_ymd_opt(year, month, day).ok_or(FieldError::ImpossibleDate { month, day })
}

/// Inverse of [`parse_date_of_birth`]; the two round-trip.
pub fn format_date_of_birth(date: NaiveDate) -> String {
    format!("{:02}/{:02}/{:04}", date.month(), date.day(), date.year())
}

/// Names and signatures admit letters, spaces, hyphens, and apostrophes.
/// Digits are stripped at input before this rule ever sees them.
pub fn name_characters(value: &str) -> Result<(), FieldError> {
    if value.trim().is_empty() {
        return Err(FieldError::Required);
    }
    if value
        .chars()
        .all(|ch| ch.is_alphabetic() || matches!(ch, ' ' | '-' | '\''))
    {
        Ok(())
    } else {
        Err(FieldError::InvalidNameCharacters)
    }
}

/// Trimmed, case-sensitive equality against the applicant's full name.
pub fn signature_match(signature: &str, full_name: &str) -> Result<(), FieldError> {
    name_characters(signature)?;
    if signature.trim() == full_name.trim() {
        Ok(())
    } else {
        Err(FieldError::SignatureMismatch)
    }
}

pub fn citizenship_document(citizenship: &Citizenship) -> Result<(), FieldError> {
    if citizenship.us_citizen {
        return Ok(());
    }
    match citizenship.immigration_document.as_deref() {
        Some(document) if !document.trim().is_empty() => Ok(()),
        _ => Err(FieldError::MissingImmigrationDocument),
    }
}

/// The "None of these" document choice is valid for progression but should
/// surface a non-blocking advisory to the applicant.
pub fn document_followup_needed(citizenship: &Citizenship) -> bool {
    !citizenship.us_citizen
        && citizenship.immigration_document.as_deref() == Some(NO_DOCUMENT_SENTINEL)
}

pub fn incarceration_disposition(incarceration: &Incarceration) -> Result<(), FieldError> {
    if incarceration.incarcerated && incarceration.pending_disposition.is_none() {
        return Err(FieldError::MissingDisposition);
    }
    Ok(())
}

/// Per-kind completeness check for one income source.
pub fn income_source_complete(source: &IncomeSource) -> Result<(), FieldError> {
    match source {
        IncomeSource::Job {
            employer, phone, ..
        } => {
            if employer.trim().is_empty() {
                return Err(FieldError::MissingEmployer);
            }
            phone_digits(phone)
        }
        IncomeSource::SelfEmployed { job_type, .. } => {
            if job_type.trim().is_empty() {
                return Err(FieldError::MissingJobType);
            }
            Ok(())
        }
        IncomeSource::Unemployment { expires_on, .. } => {
            if expires_on.is_none() {
                return Err(FieldError::MissingExpirationDate);
            }
            Ok(())
        }
        IncomeSource::Unemployed => Ok(()),
    }
}

/// Age thresholds for coverage eligibility. One source of truth; the legacy
/// wizard re-typed 19/65 per page and the copies drifted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgePolicy {
    pub minimum_age: u8,
    pub maximum_age: u8,
}

impl Default for AgePolicy {
    fn default() -> Self {
        Self {
            minimum_age: 19,
            maximum_age: 65,
        }
    }
}

impl AgePolicy {
    /// Derive the age picture for a date of birth. Not itself an error:
    /// a primary applicant out of range hard-blocks, a family member only
    /// warns and defaults out of coverage.
    pub fn profile(&self, date_of_birth: NaiveDate, today: NaiveDate) -> AgeProfile {
        let mut age = today.year() - date_of_birth.year();
        if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
            age -= 1;
        }
        let age = age.clamp(0, i32::from(u8::MAX)) as u8;

        AgeProfile {
            age,
            under_minimum: age < self.minimum_age,
            over_maximum: age > self.maximum_age,
        }
    }

    pub fn eligible(&self, date_of_birth: NaiveDate, today: NaiveDate) -> bool {
        let profile = self.profile(date_of_birth, today);
        !profile.under_minimum && !profile.over_maximum
    }
}

/// Derived age facts for one member on a given day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgeProfile {
    pub age: u8,
    pub under_minimum: bool,
    pub over_maximum: bool,
}

impl AgeProfile {
    pub fn out_of_range(&self) -> bool {
        self.under_minimum || self.over_maximum
    }
}
