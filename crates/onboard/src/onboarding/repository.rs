use serde::{Deserialize, Serialize};

use super::domain::{
    ApplicationId, ApprovedApplication, ManagerId, OnboardingSession, OnboardingStatus,
    OnboardingStep, PropertyAssignment, SessionId, StepRecord,
};

/// Storage abstraction so the engine can be exercised in isolation. The
/// relational store behind it is reached elsewhere; failures surface as
/// [`StorageError`] and are treated as retryable-never-partial.
pub trait SessionRepository: Send + Sync {
    fn load_session(&self, id: &SessionId) -> Result<Option<OnboardingSession>, StorageError>;
    fn save_session(&self, session: OnboardingSession) -> Result<(), StorageError>;
    fn load_application(
        &self,
        id: &ApplicationId,
    ) -> Result<Option<ApprovedApplication>, StorageError>;
    fn load_property_assignments(
        &self,
        manager_id: &ManagerId,
    ) -> Result<Vec<PropertyAssignment>, StorageError>;
    fn save_step_record(&self, record: StepRecord) -> Result<(), StorageError>;
    fn load_step_record(
        &self,
        id: &SessionId,
        step: OnboardingStep,
    ) -> Result<Option<StepRecord>, StorageError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("record not found")]
    NotFound,
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Idempotent reads are retried at most once when storage reports itself
/// unavailable; writes are never retried.
pub(crate) fn retry_read<T>(
    mut load: impl FnMut() -> Result<T, StorageError>,
) -> Result<T, StorageError> {
    match load() {
        Err(StorageError::Unavailable(_)) => load(),
        other => other,
    }
}

/// Trait describing the outbound notification hook (e-mail adapter lives
/// behind it). Dispatch is best-effort; failures never roll back a transition.
pub trait NotificationPublisher: Send + Sync {
    fn publish(&self, event: PhaseCompleted) -> Result<(), NotificationError>;
}

/// Emitted once per successful phase transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseCompleted {
    pub session_id: SessionId,
    pub phase: OnboardingStatus,
}

/// Notification dispatch error.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
