use std::sync::Arc;

use chrono::NaiveDate;

use crate::enrollment::domain::{
    Citizenship, Gender, Incarceration, IncomeSource, MailingAddress, PayFrequency, RecordPatch,
    Ssn, TobaccoUsage,
};
use crate::enrollment::household::HouseholdCoordinator;
use crate::enrollment::store::InMemorySessionStore;
use crate::enrollment::validate::AgePolicy;

pub(super) fn fixed_today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).expect("valid date")
}

pub(super) fn coordinator() -> HouseholdCoordinator<InMemorySessionStore> {
    HouseholdCoordinator::open(
        Arc::new(InMemorySessionStore::new()),
        "test-session",
        AgePolicy::default(),
    )
}

pub(super) fn coordinator_on(
    store: Arc<InMemorySessionStore>,
    session_id: &str,
) -> HouseholdCoordinator<InMemorySessionStore> {
    HouseholdCoordinator::open(store, session_id, AgePolicy::default())
}

/// Complete personal information for a 34-year-old primary applicant.
pub(super) fn primary_personal_info() -> RecordPatch {
    RecordPatch {
        first_name: Some("Jane".to_string()),
        last_name: Some("Doe".to_string()),
        date_of_birth: NaiveDate::from_ymd_opt(1990, 5, 14),
        gender: Some(Gender::Female),
        tobacco_usage: Some(TobaccoUsage::NonSmoker),
        ..RecordPatch::default()
    }
}

pub(super) fn mailing_address() -> MailingAddress {
    MailingAddress {
        street: "612 Maple Court".to_string(),
        unit: Some("Apt 4".to_string()),
        city: "Des Moines".to_string(),
        state: "IA".to_string(),
        zip: "50309".to_string(),
    }
}

pub(super) fn address_patch() -> RecordPatch {
    RecordPatch {
        address: Some(mailing_address()),
        ..RecordPatch::default()
    }
}

pub(super) fn ssn_patch() -> RecordPatch {
    RecordPatch {
        ssn: Some(Ssn::parse("123456789").expect("valid ssn")),
        ..RecordPatch::default()
    }
}

pub(super) fn citizen_patch() -> RecordPatch {
    RecordPatch {
        citizenship: Some(Citizenship {
            us_citizen: true,
            immigration_document: None,
        }),
        ..RecordPatch::default()
    }
}

pub(super) fn not_incarcerated_patch() -> RecordPatch {
    RecordPatch {
        incarceration: Some(Incarceration {
            incarcerated: false,
            pending_disposition: None,
        }),
        ..RecordPatch::default()
    }
}

pub(super) fn job_source() -> IncomeSource {
    IncomeSource::Job {
        employer: "Prairie Light Studio".to_string(),
        phone: "515-555-0142".to_string(),
        amount: 2000,
        frequency: PayFrequency::Monthly,
    }
}

pub(super) fn job_income_patch() -> RecordPatch {
    RecordPatch {
        income_sources: Some(vec![job_source()]),
        ..RecordPatch::default()
    }
}
