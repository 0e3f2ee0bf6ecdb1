//! Core engine for the health plan enrollment wizard.
//!
//! The crate owns the parts of the wizard that carry actual business rules:
//! the applicant record store, the pure field validators, the step graph
//! resolver, and the household coordinator that tracks each family member's
//! progress through the flow. Page rendering, plan browsing, and the chat
//! assistant live outside this crate and consume it through the router in
//! [`enrollment::router`] or directly through [`enrollment::HouseholdCoordinator`].

pub mod config;
pub mod enrollment;
pub mod error;
pub mod telemetry;
