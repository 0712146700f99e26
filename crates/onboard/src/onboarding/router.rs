use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use super::access::{AccessDenied, Caller};
use super::domain::{ApplicationId, ManagerId, OnboardingStep, SessionId, SignatureData};
use super::orchestrator::{
    CreateSessionOptions, OnboardingOrchestrator, TransitionAction, WorkflowError,
};
use super::repository::{NotificationPublisher, SessionRepository};
use super::token::TokenError;

/// Router builder exposing the onboarding endpoints over a shared
/// orchestrator. Caller identity is read from headers here; every decision
/// stays inside the access controller and the orchestrator.
pub fn onboarding_router<R, N>(orchestrator: Arc<OnboardingOrchestrator<R, N>>) -> Router
where
    R: SessionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route(
            "/api/v1/onboarding/sessions",
            post(create_session_handler::<R, N>),
        )
        .route(
            "/api/v1/onboarding/sessions/:session_id",
            get(open_session_handler::<R, N>),
        )
        .route(
            "/api/v1/onboarding/sessions/:session_id/steps/:step",
            post(submit_step_handler::<R, N>),
        )
        .route(
            "/api/v1/onboarding/sessions/:session_id/steps/:step/autosave",
            post(autosave_step_handler::<R, N>),
        )
        .route(
            "/api/v1/onboarding/sessions/:session_id/transition",
            post(transition_handler::<R, N>),
        )
        .route(
            "/api/v1/onboarding/sessions/:session_id/revoke-token",
            post(revoke_token_handler::<R, N>),
        )
        .with_state(orchestrator)
}

/// `Authorization: Bearer <token>` marks the employee actor; staff identify
/// with `X-Actor-Role` (`hr` or `manager`) plus `X-Actor-Id`.
pub(crate) fn caller_from_headers(headers: &HeaderMap) -> Caller {
    if let Some(value) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Caller::EmployeeToken {
                token: token.trim().to_string(),
            };
        }
    }

    let role = headers
        .get("x-actor-role")
        .and_then(|v| v.to_str().ok())
        .map(str::to_ascii_lowercase);
    let actor_id = headers
        .get("x-actor-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match (role.as_deref(), actor_id) {
        (Some("hr"), Some(actor_id)) => Caller::Hr { actor_id },
        (Some("manager"), Some(actor_id)) => Caller::Manager {
            manager_id: ManagerId(actor_id),
        },
        _ => Caller::Anonymous,
    }
}

fn error_response(err: WorkflowError) -> Response {
    let status = match &err {
        WorkflowError::Denied(denied) => {
            if denied.is_unauthenticated() {
                StatusCode::UNAUTHORIZED
            } else {
                StatusCode::FORBIDDEN
            }
        }
        WorkflowError::SessionNotFound | WorkflowError::ApplicationNotFound => {
            StatusCode::NOT_FOUND
        }
        WorkflowError::RoleNotPermitted | WorkflowError::ForbiddenField { .. } => {
            StatusCode::FORBIDDEN
        }
        WorkflowError::StepNotEditable { .. }
        | WorkflowError::InvalidTransition { .. }
        | WorkflowError::SessionExpired => StatusCode::CONFLICT,
        WorkflowError::StepRequiresSignature { .. }
        | WorkflowError::RejectionReasonRequired
        | WorkflowError::ChangeTargetsRequired
        | WorkflowError::ManagerRequired
        | WorkflowError::DeadlineOutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        WorkflowError::Token(TokenError::TokenExpired | TokenError::TokenInvalid) => {
            StatusCode::UNAUTHORIZED
        }
        WorkflowError::Token(TokenError::InvalidSession) => StatusCode::CONFLICT,
        WorkflowError::Token(TokenError::SessionNotFound) => StatusCode::NOT_FOUND,
        WorkflowError::Token(_) | WorkflowError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(code = err.code(), %err, "request failed");
    }

    let payload = json!({
        "code": err.code(),
        "error": err.to_string(),
    });
    (status, Json(payload)).into_response()
}

fn unknown_step_response(raw: &str) -> Response {
    let payload = json!({
        "code": "unknown_step",
        "error": format!("'{raw}' is not an onboarding step"),
    });
    (StatusCode::NOT_FOUND, Json(payload)).into_response()
}

fn unauthenticated_response() -> Response {
    let denied = AccessDenied::Unauthenticated;
    let payload = json!({
        "code": denied.code(),
        "error": denied.to_string(),
    });
    (StatusCode::UNAUTHORIZED, Json(payload)).into_response()
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateSessionRequest {
    pub(crate) application_id: String,
    #[serde(default)]
    pub(crate) manager_id: Option<String>,
    #[serde(default)]
    pub(crate) language_preference: Option<String>,
    #[serde(default)]
    pub(crate) expires_in_days: Option<i64>,
}

pub(crate) async fn create_session_handler<R, N>(
    State(orchestrator): State<Arc<OnboardingOrchestrator<R, N>>>,
    headers: HeaderMap,
    Json(request): Json<CreateSessionRequest>,
) -> Response
where
    R: SessionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let caller = caller_from_headers(&headers);
    if caller == Caller::Anonymous {
        return unauthenticated_response();
    }

    let options = CreateSessionOptions {
        manager_id: request.manager_id.map(ManagerId),
        language_preference: request.language_preference,
        expires_in_days: request.expires_in_days,
    };

    match orchestrator.create_session(
        &caller,
        &ApplicationId(request.application_id),
        options,
    ) {
        Ok(created) => {
            let payload = json!({
                "session_id": created.session.id,
                "token": created.token,
                "expires_at": created.session.expires_at,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub(crate) async fn open_session_handler<R, N>(
    State(orchestrator): State<Arc<OnboardingOrchestrator<R, N>>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
) -> Response
where
    R: SessionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let caller = caller_from_headers(&headers);
    match orchestrator.open_session(&caller, &SessionId(session_id)) {
        Ok(session) => (StatusCode::OK, Json(session.view())).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmitStepRequest {
    #[serde(default)]
    pub(crate) form_data: Map<String, Value>,
    #[serde(default)]
    pub(crate) signature: Option<SignatureData>,
}

pub(crate) async fn submit_step_handler<R, N>(
    State(orchestrator): State<Arc<OnboardingOrchestrator<R, N>>>,
    headers: HeaderMap,
    Path((session_id, step)): Path<(String, String)>,
    Json(request): Json<SubmitStepRequest>,
) -> Response
where
    R: SessionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let caller = caller_from_headers(&headers);
    let Some(step) = OnboardingStep::parse(&step) else {
        return unknown_step_response(&step);
    };

    match orchestrator.submit_step(
        &caller,
        &SessionId(session_id),
        step,
        request.form_data,
        request.signature,
    ) {
        Ok(session) => (StatusCode::OK, Json(session.view())).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct AutosaveStepRequest {
    #[serde(default)]
    pub(crate) form_data: Map<String, Value>,
}

pub(crate) async fn autosave_step_handler<R, N>(
    State(orchestrator): State<Arc<OnboardingOrchestrator<R, N>>>,
    headers: HeaderMap,
    Path((session_id, step)): Path<(String, String)>,
    Json(request): Json<AutosaveStepRequest>,
) -> Response
where
    R: SessionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let caller = caller_from_headers(&headers);
    let Some(step) = OnboardingStep::parse(&step) else {
        return unknown_step_response(&step);
    };

    match orchestrator.autosave_step(&caller, &SessionId(session_id), step, request.form_data) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "status": "draft_saved" }))).into_response(),
        Err(err) => error_response(err),
    }
}

pub(crate) async fn transition_handler<R, N>(
    State(orchestrator): State<Arc<OnboardingOrchestrator<R, N>>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    Json(action): Json<TransitionAction>,
) -> Response
where
    R: SessionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let caller = caller_from_headers(&headers);
    match orchestrator.transition(&caller, &SessionId(session_id), action) {
        Ok(session) => (StatusCode::OK, Json(session.view())).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RevokeTokenRequest {
    #[serde(default)]
    pub(crate) extend_days: Option<i64>,
}

pub(crate) async fn revoke_token_handler<R, N>(
    State(orchestrator): State<Arc<OnboardingOrchestrator<R, N>>>,
    headers: HeaderMap,
    Path(session_id): Path<String>,
    request: Option<Json<RevokeTokenRequest>>,
) -> Response
where
    R: SessionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    let caller = caller_from_headers(&headers);
    let request = request.map(|Json(request)| request).unwrap_or_default();

    match orchestrator.revoke_token(&caller, &SessionId(session_id), request.extend_days) {
        Ok(reissued) => {
            let payload = json!({
                "token": reissued.token,
                "expires_at": reissued.expires_at,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => error_response(err),
    }
}
