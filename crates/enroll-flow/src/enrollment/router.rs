use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{MemberId, MemberRole, PlanId, RecordPatch};
use super::household::CoordinatorError;
use super::service::{EnrollmentService, ServiceError};
use super::steps::{self, StepId};
use super::store::{SessionStore, StoreError};
use super::views::{HouseholdView, MemberView, StepTransitionView};

/// Router builder exposing the enrollment flow over HTTP.
pub fn enrollment_router<S>(service: Arc<EnrollmentService<S>>) -> Router
where
    S: SessionStore + 'static,
{
    Router::new()
        .route(
            "/api/v1/enrollment/sessions",
            post(create_session_handler::<S>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id",
            get(household_handler::<S>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/members",
            post(add_member_handler::<S>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/members/:member_id",
            axum::routing::patch(patch_member_handler::<S>)
                .delete(remove_member_handler::<S>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/members/:member_id/not-applying",
            post(mark_not_applying_handler::<S>).delete(unmark_not_applying_handler::<S>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/members/:member_id/steps/:step/complete",
            post(complete_step_handler::<S>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/members/:member_id/steps/:step/skip",
            post(skip_step_handler::<S>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/eligibility",
            get(eligibility_handler::<S>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/agreements",
            post(accept_agreements_handler::<S>),
        )
        .route(
            "/api/v1/enrollment/sessions/:session_id/submission",
            post(submission_handler::<S>),
        )
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub(crate) struct CreateSessionRequest {
    zip_code: Option<String>,
    plan_id: Option<String>,
}

async fn create_session_handler<S: SessionStore + 'static>(
    State(service): State<Arc<EnrollmentService<S>>>,
    Json(request): Json<CreateSessionRequest>,
) -> Response {
    let session_id = service.create_session();
    let result = service.with_session(&session_id, |coordinator| {
        coordinator
            .set_session_fields(request.zip_code.clone(), request.plan_id.clone().map(PlanId));
        let context = coordinator.household();
        let first = steps::first_step(MemberRole::Primary);
        Ok(json!({
            "sessionId": session_id.clone(),
            "household": HouseholdView::from_context(context),
            "firstStepUrl": steps::step_url(first, context.plan_id.as_ref(), None),
        }))
    });

    match result {
        Ok(body) => (StatusCode::CREATED, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn household_handler<S: SessionStore + 'static>(
    State(service): State<Arc<EnrollmentService<S>>>,
    Path(session_id): Path<String>,
) -> Response {
    let result = service.with_session(&session_id, |coordinator| {
        let view = HouseholdView::from_context(coordinator.household());
        let warning = coordinator
            .records()
            .persistence_warning()
            .map(|error| error.to_string());
        Ok(json!({ "household": view, "storageWarning": warning }))
    });

    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddMemberRequest {
    role: MemberRole,
}

async fn add_member_handler<S: SessionStore + 'static>(
    State(service): State<Arc<EnrollmentService<S>>>,
    Path(session_id): Path<String>,
    Json(request): Json<AddMemberRequest>,
) -> Response {
    let result = service.with_session(&session_id, |coordinator| {
        let record = coordinator.add_member(request.role)?;
        Ok(MemberView::from_record(&record, coordinator.household()))
    });

    match result {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn patch_member_handler<S: SessionStore + 'static>(
    State(service): State<Arc<EnrollmentService<S>>>,
    Path((session_id, member_id)): Path<(String, String)>,
    Json(patch): Json<RecordPatch>,
) -> Response {
    let member_id = MemberId(member_id);
    let today = service.today();
    let result = service.with_session(&session_id, |coordinator| {
        let record = coordinator.update_member(&member_id, patch, today)?;
        Ok(MemberView::from_record(&record, coordinator.household()))
    });

    match result {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn remove_member_handler<S: SessionStore + 'static>(
    State(service): State<Arc<EnrollmentService<S>>>,
    Path((session_id, member_id)): Path<(String, String)>,
) -> Response {
    let member_id = MemberId(member_id);
    let result =
        service.with_session(&session_id, |coordinator| coordinator.remove_member(&member_id));

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

async fn mark_not_applying_handler<S: SessionStore + 'static>(
    State(service): State<Arc<EnrollmentService<S>>>,
    Path((session_id, member_id)): Path<(String, String)>,
) -> Response {
    let member_id = MemberId(member_id);
    let result = service.with_session(&session_id, |coordinator| {
        coordinator.mark_not_applying(&member_id)
    });

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

async fn unmark_not_applying_handler<S: SessionStore + 'static>(
    State(service): State<Arc<EnrollmentService<S>>>,
    Path((session_id, member_id)): Path<(String, String)>,
) -> Response {
    let member_id = MemberId(member_id);
    let result = service.with_session(&session_id, |coordinator| {
        coordinator.unmark_not_applying(&member_id)
    });

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

async fn complete_step_handler<S: SessionStore + 'static>(
    State(service): State<Arc<EnrollmentService<S>>>,
    Path((session_id, member_id, step)): Path<(String, String, String)>,
) -> Response {
    let member_id = MemberId(member_id);
    let step = match resolve_step(&service, &session_id, &step) {
        Ok(step) => step,
        Err(response) => return response,
    };

    let today = service.today();
    let result = service.with_session(&session_id, |coordinator| {
        let outcome = coordinator.complete_step(&member_id, step, today)?;
        let record = coordinator.record(&member_id)?;
        Ok(StepTransitionView::from_outcome(
            &outcome,
            coordinator.household(),
            record,
        ))
    });

    match result {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn skip_step_handler<S: SessionStore + 'static>(
    State(service): State<Arc<EnrollmentService<S>>>,
    Path((session_id, member_id, step)): Path<(String, String, String)>,
) -> Response {
    let member_id = MemberId(member_id);
    let step = match resolve_step(&service, &session_id, &step) {
        Ok(step) => step,
        Err(response) => return response,
    };

    let result = service.with_session(&session_id, |coordinator| {
        let outcome = coordinator.skip_step(&member_id, step)?;
        let record = coordinator.record(&member_id)?;
        Ok(StepTransitionView::from_outcome(
            &outcome,
            coordinator.household(),
            record,
        ))
    });

    match result {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn eligibility_handler<S: SessionStore + 'static>(
    State(service): State<Arc<EnrollmentService<S>>>,
    Path(session_id): Path<String>,
) -> Response {
    let today = service.today();
    let result = service.with_session(&session_id, |coordinator| {
        Ok(json!({
            "eligibility": coordinator.recompute_household_eligibility(today),
            "householdAnnualIncome": coordinator.household_annual_income(),
        }))
    });

    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(error) => error_response(error),
    }
}

async fn accept_agreements_handler<S: SessionStore + 'static>(
    State(service): State<Arc<EnrollmentService<S>>>,
    Path(session_id): Path<String>,
) -> Response {
    let result = service.with_session(&session_id, |coordinator| {
        coordinator.accept_agreements();
        Ok(())
    });

    match result {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

async fn submission_handler<S: SessionStore + 'static>(
    State(service): State<Arc<EnrollmentService<S>>>,
    Path(session_id): Path<String>,
) -> Response {
    let today = service.today();
    let result =
        service.with_session(&session_id, |coordinator| coordinator.submission_payload(today));

    match result {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(error) => error_response(error),
    }
}

/// Resolve a step slug from the URL. Stale or mistyped slugs get a 404 with
/// a safe fallback URL instead of an opaque failure.
fn resolve_step<S: SessionStore + 'static>(
    service: &EnrollmentService<S>,
    session_id: &str,
    slug: &str,
) -> Result<StepId, Response> {
    StepId::from_slug(slug).map_err(|unknown| {
        let fallback = service
            .with_session(session_id, |coordinator| {
                Ok(steps::fallback_url(coordinator.household().plan_id.as_ref()))
            })
            .unwrap_or_else(|_| steps::fallback_url(None));
        let body = json!({ "error": unknown.to_string(), "fallbackUrl": fallback });
        (StatusCode::NOT_FOUND, Json(body)).into_response()
    })
}

fn error_response(error: ServiceError) -> Response {
    let status = match &error {
        ServiceError::UnknownSession(_) | ServiceError::UnknownStep(_) => StatusCode::NOT_FOUND,
        ServiceError::Coordinator(coordinator) => match coordinator {
            CoordinatorError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            CoordinatorError::Store(StoreError::PrimaryImmutable) => StatusCode::CONFLICT,
            CoordinatorError::SpouseAlreadyPresent | CoordinatorError::PrimaryAlreadyPresent => {
                StatusCode::CONFLICT
            }
            CoordinatorError::StepValidation { .. }
            | CoordinatorError::SubmissionBlocked { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoordinatorError::NotMarkedNotApplying(_) => StatusCode::BAD_REQUEST,
        },
    };

    let body = match &error {
        ServiceError::Coordinator(CoordinatorError::StepValidation { step, errors }) => json!({
            "error": error.to_string(),
            "step": step.slug(),
            "fieldErrors": errors,
        }),
        ServiceError::Coordinator(CoordinatorError::SubmissionBlocked { errors }) => json!({
            "error": error.to_string(),
            "fieldErrors": errors,
        }),
        other => json!({ "error": other.to_string() }),
    };

    (status, Json(body)).into_response()
}
