use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use onboard::onboarding::domain::{
    ApplicationId, ApprovedApplication, EmployeeId, ManagerId, OnboardingSession, OnboardingStep,
    PropertyAssignment, PropertyId, SessionId, StepRecord,
};
use onboard::onboarding::repository::{
    NotificationError, NotificationPublisher, PhaseCompleted, SessionRepository, StorageError,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Process-local persistence for the service. A database-backed repository
/// slots in behind the same trait without touching the engine.
#[derive(Default)]
pub(crate) struct InMemorySessionRepository {
    sessions: Mutex<HashMap<SessionId, OnboardingSession>>,
    steps: Mutex<HashMap<(SessionId, OnboardingStep), StepRecord>>,
    applications: Mutex<HashMap<ApplicationId, ApprovedApplication>>,
    assignments: Mutex<Vec<PropertyAssignment>>,
}

impl InMemorySessionRepository {
    pub(crate) fn insert_application(&self, application: ApprovedApplication) {
        self.applications
            .lock()
            .expect("application mutex poisoned")
            .insert(application.id.clone(), application);
    }

    pub(crate) fn insert_assignment(&self, assignment: PropertyAssignment) {
        self.assignments
            .lock()
            .expect("assignment mutex poisoned")
            .push(assignment);
    }
}

impl SessionRepository for InMemorySessionRepository {
    fn load_session(&self, id: &SessionId) -> Result<Option<OnboardingSession>, StorageError> {
        Ok(self
            .sessions
            .lock()
            .expect("session mutex poisoned")
            .get(id)
            .cloned())
    }

    fn save_session(&self, session: OnboardingSession) -> Result<(), StorageError> {
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

/// Logs phase-completion events in place of the outbound email/SMS relay.
#[derive(Default)]
pub(crate) struct LoggingNotificationPublisher;

impl NotificationPublisher for LoggingNotificationPublisher {
    fn publish(&self, event: PhaseCompleted) -> Result<(), NotificationError> {
        tracing::info!(
            session = %event.session_id.0,
            phase = event.phase.label(),
            "phase notification dispatched"
        );
        Ok(())
    }
}

/// Approved applications and manager assignments the service starts with
/// until the hiring pipeline integration lands.
pub(crate) fn seed_demo_data(repository: &InMemorySessionRepository) -> Vec<ApplicationId> {
    let seeds = [
        (
            "app-1001",
            "prop-harborview",
            "mgr-ellison",
            "emp-204",
            "Marisol Vega",
            "Night Auditor",
            NaiveDate::from_ymd_opt(2026, 9, 14),
        ),
        (
            "app-1002",
            "prop-riverside",
            "mgr-ortiz",
            "emp-311",
            "Theo Lindqvist",
            "Housekeeping Supervisor",
            NaiveDate::from_ymd_opt(2026, 9, 28),
        ),
    ];

    let mut ids = Vec::new();
    for (application, property, manager, employee, name, position, start_date) in seeds {
        let Some(start_date) = start_date else {
            continue;
        };
        repository.insert_application(ApprovedApplication {
            id: ApplicationId(application.to_string()),
            property_id: PropertyId(property.to_string()),
            employee_id: EmployeeId(employee.to_string()),
            full_name: name.to_string(),
            position: position.to_string(),
            start_date,
        });
        repository.insert_assignment(PropertyAssignment {
            manager_id: ManagerId(manager.to_string()),
            property_id: PropertyId(property.to_string()),
        });
        ids.push(ApplicationId(application.to_string()));
    }
    ids
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
