//! Onboarding workflow engine and property-scoped access control.
//!
//! Every inbound request passes through [`AccessController`] first (consulting
//! [`TokenService`] for employee-token callers and [`PropertyAccessCache`] for
//! manager callers); authorized mutations are handed to
//! [`OnboardingOrchestrator`], which validates the requested change against the
//! session state machine, applies [`ComplianceGate`] restrictions to the fields
//! being written, persists through the repository trait, and returns the
//! updated session view.

pub mod access;
pub mod compliance;
pub mod domain;
pub mod orchestrator;
pub mod property_cache;
pub mod repository;
pub mod router;
pub mod token;

#[cfg(test)]
mod tests;

pub use access::{AccessController, AccessDenied, AccessError, Action, Actor, Caller, Resource};
pub use compliance::{ComplianceGate, FieldGroup};
pub use domain::{
    ApplicationId, ApprovedApplication, EmployeeId, ManagerId, OnboardingSession,
    OnboardingStatus, OnboardingStep, PropertyAssignment, PropertyId, SessionId, SessionView,
    SignatureData, StepRecord,
};
pub use orchestrator::{
    CreateSessionOptions, CreatedSession, OnboardingOrchestrator, OrchestratorSettings,
    ReissuedToken, TransitionAction, WorkflowError,
};
pub use property_cache::PropertyAccessCache;
pub use repository::{
    NotificationError, NotificationPublisher, PhaseCompleted, SessionRepository, StorageError,
};
pub use router::onboarding_router;
pub use token::{TokenError, TokenService};
