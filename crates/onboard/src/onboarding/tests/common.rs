use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Map, Value};

use crate::onboarding::access::{AccessController, Caller};
use crate::onboarding::domain::{
    ApplicationId, ApprovedApplication, EmployeeId, ManagerId, OnboardingSession, OnboardingStep,
    PropertyAssignment, PropertyId, SessionId, SignatureData, StepRecord,
};
use crate::onboarding::orchestrator::{
    CreateSessionOptions, OnboardingOrchestrator, OrchestratorSettings, TransitionAction,
};
use crate::onboarding::property_cache::PropertyAccessCache;
use crate::onboarding::repository::{
    NotificationError, NotificationPublisher, PhaseCompleted, SessionRepository, StorageError,
};
use crate::onboarding::token::TokenService;

pub(super) const SECRET: &str = "unit-test-signing-secret";
pub(super) const APPLICATION: &str = "app-901";
pub(super) const PROPERTY: &str = "prop-riverside";
pub(super) const MANAGER: &str = "mgr-ortiz";

#[derive(Default)]
pub(super) struct MemoryRepository {
    sessions: Mutex<HashMap<SessionId, OnboardingSession>>,
    steps: Mutex<HashMap<(SessionId, OnboardingStep), StepRecord>>,
    applications: Mutex<HashMap<ApplicationId, ApprovedApplication>>,
    assignments: Mutex<Vec<PropertyAssignment>>,
    pub(super) assignment_loads: AtomicUsize,
    pub(super) session_load_failures: AtomicUsize,
    pub(super) fail_session_saves: AtomicBool,
}

impl MemoryRepository {
    pub(super) fn seed_application(&self, application: ApprovedApplication) {
        self.applications
            .lock()
            .expect("application mutex poisoned")
            .insert(application.id.clone(), application);
    }

    pub(super) fn assign(&self, manager_id: &str, property_id: &str) {
        self.assignments
            .lock()
            .expect("assignment mutex poisoned")
            .push(PropertyAssignment {
                manager_id: ManagerId(manager_id.to_string()),
                property_id: PropertyId(property_id.to_string()),
            });
    }

    pub(super) fn unassign(&self, manager_id: &str, property_id: &str) {
        self.assignments
            .lock()
            .expect("assignment mutex poisoned")
            .retain(|assignment| {
                assignment.manager_id.0 != manager_id || assignment.property_id.0 != property_id
            });
    }

    pub(super) fn session(&self, id: &SessionId) -> Option<OnboardingSession> {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .get(id)
            .cloned()
    }

    pub(super) fn put_session(&self, session: OnboardingSession) {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .insert(session.id.clone(), session);
    }

    pub(super) fn remove_session(&self, id: &SessionId) {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .remove(id);
    }

    pub(super) fn step(&self, id: &SessionId, step: OnboardingStep) -> Option<StepRecord> {
        self.steps
            .lock()
            .expect("step mutex poisoned")
            .get(&(id.clone(), step))
            .cloned()
    }
}

impl SessionRepository for MemoryRepository {
    fn load_session(&self, id: &SessionId) -> Result<Option<OnboardingSession>, StorageError> {
        let pending_failures = self.session_load_failures.load(Ordering::SeqCst);
        if pending_failures > 0
            && self
                .session_load_failures
                .compare_exchange(
                    pending_failures,
                    pending_failures - 1,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
        {
            return Err(StorageError::Unavailable("injected read fault".to_string()));
        }
        Ok(self
            .sessions
            .lock()
            .expect("session mutex poisoned")
            .get(id)
            .cloned())
    }

    fn save_session(&self, session: OnboardingSession) -> Result<(), StorageError> {
        if self.fail_session_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "injected write fault".to_string(),
            ));
        }
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .insert(session.id.clone(), session);
        Ok(())
    }

    fn load_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApprovedApplication>, StorageError> {
        Ok(self
            .applications
            .lock()
            .expect("application mutex poisoned")
            .get(id)
            .cloned())
    }

    fn load_property_assignments(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<PropertyAssignment>, StorageError> {
        self.assignment_loads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .assignments
            .lock()
            .expect("assignment mutex poisoned")
            .iter()
            .filter(|assignment| assignment.manager_id == *manager_id)
            .cloned()
            .collect())
    }

    fn save_step_record(&self, record: StepRecord) -> Result<(), StorageError> {
        self.steps
            .lock()
            .expect("step mutex poisoned")
            .insert((record.session_id.clone(), record.step), record);
        Ok(())
    }

    fn load_step_record(
        &self,
        id: &SessionId,
        step: OnboardingStep,
    ) -> Result<Option<StepRecord>, StorageError> {
        Ok(self
            .steps
            .lock()
            .expect("step mutex poisoned")
            .get(&(id.clone(), step))
            .cloned())
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifications {
    events: Mutex<Vec<PhaseCompleted>>,
    pub(super) fail: AtomicBool,
}

impl MemoryNotifications {
    pub(super) fn events(&self) -> Vec<PhaseCompleted> {
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .clone()
    }
}

impl NotificationPublisher for MemoryNotifications {
    fn publish(&self, event: PhaseCompleted) -> Result<(), NotificationError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::Transport(
                "smtp relay offline".to_string(),
            ));
        }
        self.events
            .lock()
            .expect("notification mutex poisoned")
            .push(event);
        Ok(())
    }
}

pub(super) struct Stack {
    pub(super) repository: Arc<MemoryRepository>,
    pub(super) notifications: Arc<MemoryNotifications>,
    pub(super) tokens: Arc<TokenService<MemoryRepository>>,
    pub(super) cache: Arc<PropertyAccessCache<MemoryRepository>>,
    pub(super) access: Arc<AccessController<MemoryRepository>>,
    pub(super) orchestrator: Arc<OnboardingOrchestrator<MemoryRepository, MemoryNotifications>>,
}

pub(super) fn stack() -> Stack {
    stack_with_cache_ttl(StdDuration::from_secs(300))
}

pub(super) fn stack_with_cache_ttl(ttl: StdDuration) -> Stack {
    let repository = Arc::new(MemoryRepository::default());
    repository.seed_application(application());
    repository.assign(MANAGER, PROPERTY);

    let notifications = Arc::new(MemoryNotifications::default());
    let tokens = Arc::new(TokenService::new(repository.clone(), SECRET));
    let cache = Arc::new(PropertyAccessCache::with_ttl(repository.clone(), ttl));
    let access = Arc::new(AccessController::new(cache.clone(), tokens.clone()));
    let orchestrator = Arc::new(OnboardingOrchestrator::new(
        repository.clone(),
        notifications.clone(),
        access.clone(),
        tokens.clone(),
        OrchestratorSettings::default(),
    ));

    Stack {
        repository,
        notifications,
        tokens,
        cache,
        access,
        orchestrator,
    }
}

pub(super) fn application() -> ApprovedApplication {
    ApprovedApplication {
        id: ApplicationId(APPLICATION.to_string()),
        property_id: PropertyId(PROPERTY.to_string()),
        employee_id: EmployeeId("emp-017".to_string()),
        full_name: "Dana Whitfield".to_string(),
        position: "Front Desk Agent".to_string(),
        start_date: NaiveDate::from_ymd_opt(2026, 9, 14).expect("valid date"),
    }
}

pub(super) fn hr() -> Caller {
    Caller::Hr {
        actor_id: "hr-ops".to_string(),
    }
}

pub(super) fn manager(id: &str) -> Caller {
    Caller::Manager {
        manager_id: ManagerId(id.to_string()),
    }
}

pub(super) fn employee(token: &str) -> Caller {
    Caller::EmployeeToken {
        token: token.to_string(),
    }
}

pub(super) fn form(step: OnboardingStep) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("section".to_string(), json!(step.label()));
    data.insert("filled_by".to_string(), json!("fixture"));
    data
}

pub(super) fn signature() -> SignatureData {
    SignatureData {
        image_ref: "s3://onboard/signatures/sig-1.png".to_string(),
        signed_at: Utc::now(),
        ip_address: Some("203.0.113.7".to_string()),
    }
}

pub(super) fn maybe_signature(step: OnboardingStep) -> Option<SignatureData> {
    step.requires_signature().then(signature)
}

pub(super) fn create_session(stack: &Stack) -> (SessionId, String) {
    let created = stack
        .orchestrator
        .create_session(
            &hr(),
            &ApplicationId(APPLICATION.to_string()),
            CreateSessionOptions {
                manager_id: Some(ManagerId(MANAGER.to_string())),
                ..Default::default()
            },
        )
        .expect("session created");
    (created.session.id, created.token)
}

pub(super) const EMPLOYEE_STEPS: [OnboardingStep; 6] = [
    OnboardingStep::PersonalInfo,
    OnboardingStep::I9Section1,
    OnboardingStep::W4,
    OnboardingStep::DirectDeposit,
    OnboardingStep::EmergencyContacts,
    OnboardingStep::PolicyAcknowledgment,
];

pub(super) const MANAGER_STEPS: [OnboardingStep; 2] =
    [OnboardingStep::I9Section2, OnboardingStep::FinalReview];

pub(super) fn complete_employee_steps(stack: &Stack, session_id: &SessionId, token: &str) {
    for step in EMPLOYEE_STEPS {
        stack
            .orchestrator
            .submit_step(
                &employee(token),
                session_id,
                step,
                form(step),
                maybe_signature(step),
            )
            .unwrap_or_else(|err| panic!("employee step {step:?} submits: {err}"));
    }
}

pub(super) fn complete_manager_steps(stack: &Stack, session_id: &SessionId) {
    for step in MANAGER_STEPS {
        stack
            .orchestrator
            .submit_step(
                &manager(MANAGER),
                session_id,
                step,
                form(step),
                maybe_signature(step),
            )
            .unwrap_or_else(|err| panic!("manager step {step:?} submits: {err}"));
    }
}

/// Walk a fresh session all the way to `hr_approval`.
pub(super) fn drive_to_hr_approval(stack: &Stack) -> (SessionId, String) {
    let (session_id, token) = create_session(stack);
    complete_employee_steps(stack, &session_id, &token);
    stack
        .orchestrator
        .open_session(&manager(MANAGER), &session_id)
        .expect("manager opens review");
    complete_manager_steps(stack, &session_id);
    stack
        .orchestrator
        .transition(
            &manager(MANAGER),
            &session_id,
            TransitionAction::SubmitForApproval,
        )
        .expect("submitted for approval");
    (session_id, token)
}

pub(super) fn expire_session(stack: &Stack, session_id: &SessionId) {
    let mut session = stack
        .repository
        .session(session_id)
        .expect("session present");
    session.expires_at = Utc::now() - Duration::hours(1);
    stack.repository.put_session(session);
}
