use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use super::access::{AccessController, AccessDenied, AccessError, Action, Actor, Caller, Resource};
use super::compliance::ComplianceGate;
use super::domain::{
    ApplicationId, ManagerId, OnboardingSession, OnboardingStatus, OnboardingStep, SessionId,
    SignatureData, StepRecord,
};
use super::repository::{
    retry_read, NotificationPublisher, PhaseCompleted, SessionRepository, StorageError,
};
use super::token::{TokenError, TokenService};

static SESSION_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_session_id() -> SessionId {
    let id = SESSION_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SessionId(format!("ob-{id:06}"))
}

/// Upper bound on caller-supplied deadline overrides and extensions.
pub const MAX_DEADLINE_DAYS: i64 = 365;

fn deadline_days(days: i64) -> Result<Duration, WorkflowError> {
    if !(1..=MAX_DEADLINE_DAYS).contains(&days) {
        return Err(WorkflowError::DeadlineOutOfRange { days });
    }
    Ok(Duration::days(days))
}

/// Errors surfaced by the workflow engine. Authorization denials are folded in
/// so each operation exposes a single error surface; the router maps the
/// variants back onto 401/403/404/409/422/500.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Denied(#[from] AccessDenied),
    #[error("onboarding session not found")]
    SessionNotFound,
    #[error("application not found or not approved")]
    ApplicationNotFound,
    #[error("a manager assignment is required to create a session")]
    ManagerRequired,
    #[error("this operation is restricted to managers and HR")]
    RoleNotPermitted,
    #[error("step '{step}' is not editable in the current session state")]
    StepNotEditable { step: &'static str },
    #[error("step '{step}' requires a signature before completion")]
    StepRequiresSignature { step: &'static str },
    #[error("form data field '{field}' is outside the caller's permitted group")]
    ForbiddenField { field: String },
    #[error("invalid transition '{action}' from state '{from}'")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
    #[error("rejection requires a reason")]
    RejectionReasonRequired,
    #[error("change requests must name at least one step")]
    ChangeTargetsRequired,
    #[error("deadline of {days} days is outside the accepted range")]
    DeadlineOutOfRange { days: i64 },
    #[error("onboarding session deadline has passed")]
    SessionExpired,
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<AccessError> for WorkflowError {
    fn from(value: AccessError) -> Self {
        match value {
            AccessError::Denied(denied) => WorkflowError::Denied(denied),
            AccessError::Storage(storage) => WorkflowError::Storage(storage),
        }
    }
}

impl WorkflowError {
    /// Stable reason code carried on every error response so the calling UI
    /// never parses free text.
    pub fn code(&self) -> &'static str {
        match self {
            WorkflowError::Denied(denied) => denied.code(),
            WorkflowError::SessionNotFound => "session_not_found",
            WorkflowError::ApplicationNotFound => "application_not_found",
            WorkflowError::ManagerRequired => "manager_required",
            WorkflowError::RoleNotPermitted => "role_not_permitted",
            WorkflowError::StepNotEditable { .. } => "step_not_editable",
            WorkflowError::StepRequiresSignature { .. } => "step_requires_signature",
            WorkflowError::ForbiddenField { .. } => "forbidden_field",
            WorkflowError::InvalidTransition { .. } => "invalid_transition",
            WorkflowError::RejectionReasonRequired => "rejection_reason_required",
            WorkflowError::ChangeTargetsRequired => "change_targets_required",
            WorkflowError::DeadlineOutOfRange { .. } => "deadline_out_of_range",
            WorkflowError::SessionExpired => "session_expired",
            WorkflowError::Token(TokenError::InvalidSession) => "invalid_session",
            WorkflowError::Token(TokenError::TokenExpired) => "token_expired",
            WorkflowError::Token(TokenError::SessionNotFound) => "session_not_found",
            WorkflowError::Token(_) => "token_invalid",
            WorkflowError::Storage(_) => "storage",
        }
    }
}

/// Explicit phase-advance actions for the transition endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum TransitionAction {
    SubmitForApproval,
    Approve,
    Reject {
        #[serde(default)]
        reason: Option<String>,
    },
    RequestChanges {
        #[serde(default)]
        steps: Vec<OnboardingStep>,
    },
}

impl TransitionAction {
    pub const fn label(&self) -> &'static str {
        match self {
            TransitionAction::SubmitForApproval => "submit_for_approval",
            TransitionAction::Approve => "approve",
            TransitionAction::Reject { .. } => "reject",
            TransitionAction::RequestChanges { .. } => "request_changes",
        }
    }
}

/// Inputs for session creation beyond the application id.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSessionOptions {
    pub manager_id: Option<ManagerId>,
    pub language_preference: Option<String>,
    pub expires_in_days: Option<i64>,
}

/// Session plus the freshly issued employee link token.
#[derive(Debug)]
pub struct CreatedSession {
    pub session: OnboardingSession,
    pub token: String,
}

/// Result of a token revocation: the replacement link.
#[derive(Debug)]
pub struct ReissuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Lock map serializing mutations per session. Cross-session operations never
/// contend; the guard is held around the read-modify-write and persistence
/// only, never across notification dispatch.
#[derive(Default)]
pub(super) struct SessionLocks {
    inner: Mutex<HashMap<SessionId, Arc<Mutex<()>>>>,
}

impl SessionLocks {
    pub(super) fn acquire(&self, id: &SessionId) -> Arc<Mutex<()>> {
        let mut map = self.inner.lock().expect("session lock map poisoned");
        // Entries nobody holds are recreated on demand; drop them so the map
        // tracks in-flight sessions, not every session ever touched.
        map.retain(|_, lock| Arc::strong_count(lock) > 1);
        map.entry(id.clone()).or_default().clone()
    }

    #[cfg(test)]
    pub(super) fn tracked(&self) -> usize {
        self.inner.lock().expect("session lock map poisoned").len()
    }
}

/// Timing knobs injected from configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub token_ttl: Duration,
    pub session_deadline: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            token_ttl: Duration::hours(72),
            session_deadline: Duration::days(14),
        }
    }
}

/// Owns the onboarding-session state machine: phase transitions, per-step
/// progress, field-mutability rules, and the notification trigger on phase
/// completion. Every operation authorizes through the access controller
/// before touching workflow state.
pub struct OnboardingOrchestrator<R, N> {
    repository: Arc<R>,
    notifications: Arc<N>,
    access: Arc<AccessController<R>>,
    tokens: Arc<TokenService<R>>,
    gate: ComplianceGate,
    locks: SessionLocks,
    settings: OrchestratorSettings,
}

impl<R, N> OnboardingOrchestrator<R, N>
where
    R: SessionRepository + 'static,
    N: NotificationPublisher + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifications: Arc<N>,
        access: Arc<AccessController<R>>,
        tokens: Arc<TokenService<R>>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            repository,
            notifications,
            access,
            tokens,
            gate: ComplianceGate::default(),
            locks: SessionLocks::default(),
            settings,
        }
    }

    /// Convert an approved application into a `not_started` session and issue
    /// the first employee link token.
    pub fn create_session(
        &self,
        caller: &Caller,
        application_id: &ApplicationId,
        options: CreateSessionOptions,
    ) -> Result<CreatedSession, WorkflowError> {
        let application = retry_read(|| self.repository.load_application(application_id))?
            .ok_or(WorkflowError::ApplicationNotFound)?;

        let actor = self.access.authorize(
            caller,
            Action::Write,
            &Resource::Property {
                property_id: application.property_id.clone(),
            },
        )?;

        let manager_id = match (&actor, options.manager_id) {
            (_, Some(manager_id)) => manager_id,
            (Actor::Manager { manager_id }, None) => manager_id.clone(),
            _ => return Err(WorkflowError::ManagerRequired),
        };

        let now = Utc::now();
        let deadline = match options.expires_in_days {
            Some(days) => deadline_days(days)?,
            None => self.settings.session_deadline,
        };

        let session = OnboardingSession {
            id: next_session_id(),
            employee_id: application.employee_id,
            application_id: application.id,
            property_id: application.property_id,
            manager_id,
            status: OnboardingStatus::NotStarted,
            completed_steps: Vec::new(),
            reopened_steps: Vec::new(),
            return_status: None,
            token_version: 0,
            language_preference: options
                .language_preference
                .unwrap_or_else(|| "en".to_string()),
            start_date: application.start_date,
            expires_at: now + deadline,
            rejection_reason: None,
            retention_until: None,
            created_at: now,
            updated_at: now,
        };

        self.repository.save_session(session.clone())?;
        let token = self.tokens.issue(&session.id, self.settings.token_ttl)?;

        info!(
            session = %session.id.0,
            property = %session.property_id.0,
            "onboarding session created"
        );

        Ok(CreatedSession { session, token })
    }

    /// Read the session, advancing the phase when the read itself is a
    /// workflow trigger: an employee opening a fresh link starts the session,
    /// and a manager opening a submitted session begins the review.
    pub fn open_session(
        &self,
        caller: &Caller,
        session_id: &SessionId,
    ) -> Result<OnboardingSession, WorkflowError> {
        let snapshot = self.load_session(session_id)?;
        let actor = self.authorize_session(caller, Action::Read, &snapshot)?;

        let lock = self.locks.acquire(session_id);
        let (session, new_phase) = {
            let _guard = lock.lock().expect("session lock poisoned");
            let mut session = self.load_session(session_id)?;

            let new_phase = match (&actor, session.status) {
                (Actor::Employee { .. }, OnboardingStatus::NotStarted) => {
                    if session.is_expired(Utc::now()) {
                        return Err(WorkflowError::SessionExpired);
                    }
                    Some(OnboardingStatus::InProgress)
                }
                (Actor::Manager { .. } | Actor::Hr { .. }, OnboardingStatus::EmployeeCompleted) => {
                    Some(OnboardingStatus::ManagerReview)
                }
                _ => None,
            };

            if let Some(phase) = new_phase {
                session.status = phase;
                session.updated_at = Utc::now();
                self.repository.save_session(session.clone())?;
            }
            (session, new_phase)
        };

        if let Some(phase) = new_phase {
            self.notify(session_id, phase);
        }
        Ok(session)
    }

    /// Submit a step: persists the record, appends to `completed_steps`
    /// idempotently, recomputes progress, and fires any phase transition the
    /// completion satisfies.
    pub fn submit_step(
        &self,
        caller: &Caller,
        session_id: &SessionId,
        step: OnboardingStep,
        form_data: Map<String, Value>,
        signature: Option<SignatureData>,
    ) -> Result<OnboardingSession, WorkflowError> {
        let snapshot = self.load_session(session_id)?;
        let actor = self.authorize_session(caller, Action::Write, &snapshot)?;

        if !self.gate.can_access_section(&actor, step) {
            return Err(WorkflowError::ForbiddenField {
                field: step.label().to_string(),
            });
        }
        if let Some(field) = self.gate.forbidden_field(&actor, &form_data) {
            return Err(WorkflowError::ForbiddenField {
                field: field.to_string(),
            });
        }
        if step.requires_signature() && signature.is_none() {
            return Err(WorkflowError::StepRequiresSignature { step: step.label() });
        }

        let lock = self.locks.acquire(session_id);
        let (session, new_phase) = {
            let _guard = lock.lock().expect("session lock poisoned");
            let mut session = self.load_session(session_id)?;
            let now = Utc::now();

            // An employee submitting against a fresh link counts as opening it.
            if actor.is_employee() && session.status == OnboardingStatus::NotStarted {
                if session.is_expired(now) {
                    return Err(WorkflowError::SessionExpired);
                }
                session.status = OnboardingStatus::InProgress;
            }

            self.check_step_editable(&actor, &session, step, now)?;

            let record = StepRecord {
                session_id: session_id.clone(),
                step,
                form_data,
                signature,
                completed_at: Some(now),
                autosaved_at: None,
            };
            self.repository.save_step_record(record)?;

            // Idempotent: resubmission overwrites in place, no duplicate append.
            if !session.completed_steps.contains(&step) {
                session.completed_steps.push(step);
            }
            session.reopened_steps.retain(|reopened| *reopened != step);

            let new_phase = self.evaluate_phase(&mut session);
            session.updated_at = now;
            self.repository.save_session(session.clone())?;
            (session, new_phase)
        };

        if let Some(phase) = new_phase {
            self.notify(session_id, phase);
        }
        Ok(session)
    }

    /// Persist partial, unvalidated draft data without advancing
    /// `completed_steps` or `current_step`. Never requires a signature and
    /// never triggers a phase transition.
    pub fn autosave_step(
        &self,
        caller: &Caller,
        session_id: &SessionId,
        step: OnboardingStep,
        partial: Map<String, Value>,
    ) -> Result<(), WorkflowError> {
        let snapshot = self.load_session(session_id)?;
        let actor = self.authorize_session(caller, Action::Write, &snapshot)?;

        if !self.gate.can_access_section(&actor, step) {
            return Err(WorkflowError::ForbiddenField {
                field: step.label().to_string(),
            });
        }
        if let Some(field) = self.gate.forbidden_field(&actor, &partial) {
            return Err(WorkflowError::ForbiddenField {
                field: field.to_string(),
            });
        }

        let lock = self.locks.acquire(session_id);
        let _guard = lock.lock().expect("session lock poisoned");
        let session = self.load_session(session_id)?;
        let now = Utc::now();

        if session.status.is_terminal() {
            return Err(WorkflowError::StepNotEditable { step: step.label() });
        }
        if actor.is_employee() && session.is_expired(now) {
            return Err(WorkflowError::SessionExpired);
        }
        // Employee-phase drafts belong to the employee; staff reach them only
        // through a change request that reopened the step.
        if !step.is_manager_step()
            && !actor.is_employee()
            && !(session.status == OnboardingStatus::ChangesRequested
                && session.reopened_steps.contains(&step))
        {
            return Err(WorkflowError::StepNotEditable { step: step.label() });
        }
        // Drafting ahead is fine; a completed step only reopens via
        // changes_requested.
        if session.completed_steps.contains(&step) && !session.reopened_steps.contains(&step) {
            return Err(WorkflowError::StepNotEditable { step: step.label() });
        }

        let signature = retry_read(|| self.repository.load_step_record(session_id, step))?
            .and_then(|record| record.signature);
        self.repository.save_step_record(StepRecord {
            session_id: session_id.clone(),
            step,
            form_data: partial,
            signature,
            completed_at: None,
            autosaved_at: Some(now),
        })?;
        Ok(())
    }

    /// Explicit phase-advance actions: approval recommendation, HR decision,
    /// and change requests.
    pub fn transition(
        &self,
        caller: &Caller,
        session_id: &SessionId,
        action: TransitionAction,
    ) -> Result<OnboardingSession, WorkflowError> {
        let snapshot = self.load_session(session_id)?;
        let actor = self.authorize_session(caller, Action::Write, &snapshot)?;
        if actor.is_employee() {
            return Err(WorkflowError::RoleNotPermitted);
        }

        let lock = self.locks.acquire(session_id);
        let (session, new_phase) = {
            let _guard = lock.lock().expect("session lock poisoned");
            let mut session = self.load_session(session_id)?;
            let from = session.status.label();

            let new_phase = match (&action, session.status) {
                (TransitionAction::SubmitForApproval, OnboardingStatus::ManagerCompleted) => {
                    OnboardingStatus::HrApproval
                }
                (TransitionAction::Approve, OnboardingStatus::HrApproval) => {
                    if !matches!(actor, Actor::Hr { .. }) {
                        return Err(WorkflowError::RoleNotPermitted);
                    }
                    session.retention_until = self.gate.compute_retention(&session);
                    OnboardingStatus::Approved
                }
                (TransitionAction::Reject { reason }, OnboardingStatus::HrApproval) => {
                    if !matches!(actor, Actor::Hr { .. }) {
                        return Err(WorkflowError::RoleNotPermitted);
                    }
                    let reason = reason
                        .as_deref()
                        .map(str::trim)
                        .filter(|reason| !reason.is_empty())
                        .ok_or(WorkflowError::RejectionReasonRequired)?;
                    session.rejection_reason = Some(reason.to_string());
                    OnboardingStatus::Rejected
                }
                (
                    TransitionAction::RequestChanges { steps },
                    OnboardingStatus::EmployeeCompleted
                    | OnboardingStatus::ManagerReview
                    | OnboardingStatus::ManagerCompleted
                    | OnboardingStatus::HrApproval,
                ) => {
                    if steps.is_empty() {
                        return Err(WorkflowError::ChangeTargetsRequired);
                    }
                    self.reopen_steps(&mut session, steps)?;
                    OnboardingStatus::ChangesRequested
                }
                _ => {
                    return Err(WorkflowError::InvalidTransition {
                        from,
                        action: action.label(),
                    })
                }
            };

            session.status = new_phase;
            session.updated_at = Utc::now();
            self.repository.save_session(session.clone())?;
            (session, new_phase)
        };

        self.notify(session_id, new_phase);
        Ok(session)
    }

    /// Invalidate outstanding employee tokens and hand back a fresh link,
    /// optionally pushing the session deadline out.
    pub fn revoke_token(
        &self,
        caller: &Caller,
        session_id: &SessionId,
        extend_days: Option<i64>,
    ) -> Result<ReissuedToken, WorkflowError> {
        let snapshot = self.load_session(session_id)?;
        let actor = self.authorize_session(caller, Action::Write, &snapshot)?;
        if actor.is_employee() {
            return Err(WorkflowError::RoleNotPermitted);
        }

        let lock = self.locks.acquire(session_id);
        let _guard = lock.lock().expect("session lock poisoned");

        let expires_at = if let Some(days) = extend_days {
            let extension = deadline_days(days)?;
            let mut session = self.load_session(session_id)?;
            session.expires_at = Utc::now() + extension;
            session.updated_at = Utc::now();
            let expires_at = session.expires_at;
            self.repository.save_session(session)?;
            expires_at
        } else {
            snapshot.expires_at
        };

        self.tokens.revoke(session_id)?;
        let token = self.tokens.issue(session_id, self.settings.token_ttl)?;

        info!(session = %session_id.0, "employee token revoked and reissued");
        Ok(ReissuedToken { token, expires_at })
    }

    /// Reassign the responsible manager; HR only.
    pub fn reassign_manager(
        &self,
        caller: &Caller,
        session_id: &SessionId,
        manager_id: ManagerId,
    ) -> Result<OnboardingSession, WorkflowError> {
        let snapshot = self.load_session(session_id)?;
        let actor = self.authorize_session(caller, Action::Write, &snapshot)?;
        if !matches!(actor, Actor::Hr { .. }) {
            return Err(WorkflowError::RoleNotPermitted);
        }

        let lock = self.locks.acquire(session_id);
        let _guard = lock.lock().expect("session lock poisoned");
        let mut session = self.load_session(session_id)?;
        session.manager_id = manager_id;
        session.updated_at = Utc::now();
        self.repository.save_session(session.clone())?;
        Ok(session)
    }

    fn load_session(&self, session_id: &SessionId) -> Result<OnboardingSession, WorkflowError> {
        retry_read(|| self.repository.load_session(session_id))?
            .ok_or(WorkflowError::SessionNotFound)
    }

    fn authorize_session(
        &self,
        caller: &Caller,
        action: Action,
        session: &OnboardingSession,
    ) -> Result<Actor, WorkflowError> {
        let actor = self.access.authorize(
            caller,
            action,
            &Resource::Session {
                session_id: session.id.clone(),
                property_id: session.property_id.clone(),
            },
        )?;
        Ok(actor)
    }

    fn check_step_editable(
        &self,
        actor: &Actor,
        session: &OnboardingSession,
        step: OnboardingStep,
        now: DateTime<Utc>,
    ) -> Result<(), WorkflowError> {
        let not_editable = WorkflowError::StepNotEditable { step: step.label() };

        if session.status.is_terminal() {
            return Err(not_editable);
        }
        if actor.is_employee() && session.is_expired(now) {
            return Err(WorkflowError::SessionExpired);
        }

        match session.status {
            OnboardingStatus::ChangesRequested => {
                if !session.reopened_steps.contains(&step) {
                    return Err(not_editable);
                }
            }
            OnboardingStatus::InProgress => {
                // Employee phase: managers review, they do not silently
                // rewrite employee steps outside changes_requested.
                if step.is_manager_step() || !actor.is_employee() {
                    return Err(not_editable);
                }
                // The current step, or a rewrite of an already-completed
                // employee step before the phase closes.
                let editable = session.current_step() == Some(step)
                    || session.completed_steps.contains(&step);
                if !editable {
                    return Err(not_editable);
                }
            }
            OnboardingStatus::ManagerReview => {
                if actor.is_employee() || !step.is_manager_step() {
                    return Err(not_editable);
                }
                let editable = session.current_step() == Some(step)
                    || session.completed_steps.contains(&step);
                if !editable {
                    return Err(not_editable);
                }
            }
            _ => return Err(not_editable),
        }
        Ok(())
    }

    /// Applies the automatic entries of the transition table after a step
    /// completion: phase closes when its last step lands, and a resolved
    /// change request returns to the phase it interrupted.
    fn evaluate_phase(&self, session: &mut OnboardingSession) -> Option<OnboardingStatus> {
        let next = match session.status {
            OnboardingStatus::ChangesRequested if session.reopened_steps.is_empty() => Some(
                session
                    .return_status
                    .take()
                    .unwrap_or(OnboardingStatus::InProgress),
            ),
            OnboardingStatus::InProgress if session.employee_steps_complete() => {
                Some(OnboardingStatus::EmployeeCompleted)
            }
            OnboardingStatus::ManagerReview if session.all_steps_complete() => {
                Some(OnboardingStatus::ManagerCompleted)
            }
            _ => None,
        };

        if let Some(phase) = next {
            session.status = phase;
        }
        next
    }

    fn reopen_steps(
        &self,
        session: &mut OnboardingSession,
        steps: &[OnboardingStep],
    ) -> Result<(), WorkflowError> {
        session.return_status = Some(session.status);
        session.reopened_steps = steps.to_vec();
        session.reopened_steps.dedup();

        for step in steps {
            session.completed_steps.retain(|completed| completed != step);
            // Only the named step's completion marker is cleared.
            if let Some(mut record) =
                retry_read(|| self.repository.load_step_record(&session.id, *step))?
            {
                record.completed_at = None;
                self.repository.save_step_record(record)?;
            }
        }
        Ok(())
    }

    /// Best-effort; emission failure never rolls back the state transition.
    fn notify(&self, session_id: &SessionId, phase: OnboardingStatus) {
        let event = PhaseCompleted {
            session_id: session_id.clone(),
            phase,
        };
        match self.notifications.publish(event) {
            Ok(()) => info!(session = %session_id.0, phase = phase.label(), "phase completed"),
            Err(err) => {
                warn!(session = %session_id.0, phase = phase.label(), %err, "phase notification failed")
            }
        }
    }
}
