use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier wrapper for onboarding sessions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Identifier wrapper for the hired employee.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub String);

/// Identifier wrapper for the approved hiring application a session was built from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationId(pub String);

/// Identifier wrapper for a single hotel location, the unit of manager-scoped authorization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyId(pub String);

/// Identifier wrapper for a property manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ManagerId(pub String);

/// Coarse workflow phase tracked on every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStatus {
    NotStarted,
    InProgress,
    EmployeeCompleted,
    ManagerReview,
    ManagerCompleted,
    HrApproval,
    Approved,
    Rejected,
    ChangesRequested,
}

impl OnboardingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            OnboardingStatus::NotStarted => "not_started",
            OnboardingStatus::InProgress => "in_progress",
            OnboardingStatus::EmployeeCompleted => "employee_completed",
            OnboardingStatus::ManagerReview => "manager_review",
            OnboardingStatus::ManagerCompleted => "manager_completed",
            OnboardingStatus::HrApproval => "hr_approval",
            OnboardingStatus::Approved => "approved",
            OnboardingStatus::Rejected => "rejected",
            OnboardingStatus::ChangesRequested => "changes_requested",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, OnboardingStatus::Approved | OnboardingStatus::Rejected)
    }
}

/// One discrete form/screen within the workflow, in canonical completion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OnboardingStep {
    #[serde(rename = "personal_info")]
    PersonalInfo,
    #[serde(rename = "i9_section1")]
    I9Section1,
    #[serde(rename = "w4")]
    W4,
    #[serde(rename = "direct_deposit")]
    DirectDeposit,
    #[serde(rename = "emergency_contacts")]
    EmergencyContacts,
    #[serde(rename = "policy_acknowledgment")]
    PolicyAcknowledgment,
    #[serde(rename = "i9_section2")]
    I9Section2,
    #[serde(rename = "final_review")]
    FinalReview,
}

impl OnboardingStep {
    /// Canonical ordering; `current_step` is always the first entry absent
    /// from `completed_steps`.
    pub const ALL: [OnboardingStep; 8] = [
        OnboardingStep::PersonalInfo,
        OnboardingStep::I9Section1,
        OnboardingStep::W4,
        OnboardingStep::DirectDeposit,
        OnboardingStep::EmergencyContacts,
        OnboardingStep::PolicyAcknowledgment,
        OnboardingStep::I9Section2,
        OnboardingStep::FinalReview,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            OnboardingStep::PersonalInfo => "personal_info",
            OnboardingStep::I9Section1 => "i9_section1",
            OnboardingStep::W4 => "w4",
            OnboardingStep::DirectDeposit => "direct_deposit",
            OnboardingStep::EmergencyContacts => "emergency_contacts",
            OnboardingStep::PolicyAcknowledgment => "policy_acknowledgment",
            OnboardingStep::I9Section2 => "i9_section2",
            OnboardingStep::FinalReview => "final_review",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|step| step.label() == raw)
    }

    /// Steps completed during the manager's turn; everything else belongs to
    /// the employee phase.
    pub const fn is_manager_step(self) -> bool {
        matches!(self, OnboardingStep::I9Section2 | OnboardingStep::FinalReview)
    }

    /// Federal forms and acknowledgments cannot be marked complete unsigned.
    pub const fn requires_signature(self) -> bool {
        matches!(
            self,
            OnboardingStep::I9Section1
                | OnboardingStep::W4
                | OnboardingStep::PolicyAcknowledgment
                | OnboardingStep::I9Section2
                | OnboardingStep::FinalReview
        )
    }
}

/// Captured signature evidence for signature-bearing steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureData {
    pub image_ref: String,
    pub signed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
}

/// Per-step payload, keyed by `(session_id, step)`. The form layer owns the
/// shape of `form_data`; this core only decides whether the write is allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub session_id: SessionId,
    pub step: OnboardingStep,
    pub form_data: Map<String, Value>,
    pub signature: Option<SignatureData>,
    pub completed_at: Option<DateTime<Utc>>,
    pub autosaved_at: Option<DateTime<Utc>>,
}

/// One onboarding run for one hired employee at one property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OnboardingSession {
    pub id: SessionId,
    pub employee_id: EmployeeId,
    pub application_id: ApplicationId,
    pub property_id: PropertyId,
    pub manager_id: ManagerId,
    pub status: OnboardingStatus,
    /// Insertion order significant; drives resumption.
    pub completed_steps: Vec<OnboardingStep>,
    /// Steps reopened by a `changes_requested` transition.
    pub reopened_steps: Vec<OnboardingStep>,
    /// Phase to restore once every reopened step is resubmitted.
    pub return_status: Option<OnboardingStatus>,
    /// Incremented on explicit revocation; invalidates all outstanding tokens.
    pub token_version: u32,
    pub language_preference: String,
    pub start_date: NaiveDate,
    pub expires_at: DateTime<Utc>,
    pub rejection_reason: Option<String>,
    pub retention_until: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OnboardingSession {
    /// First canonical step absent from `completed_steps`; `None` once a
    /// terminal state is reached.
    pub fn current_step(&self) -> Option<OnboardingStep> {
        if self.status.is_terminal() {
            return None;
        }
        OnboardingStep::ALL
            .into_iter()
            .find(|step| !self.completed_steps.contains(step))
    }

    pub fn progress_percentage(&self) -> u8 {
        let total = OnboardingStep::ALL.len();
        (self.completed_steps.len() * 100 / total) as u8
    }

    pub fn employee_steps_complete(&self) -> bool {
        OnboardingStep::ALL
            .into_iter()
            .filter(|step| !step.is_manager_step())
            .all(|step| self.completed_steps.contains(&step))
    }

    pub fn all_steps_complete(&self) -> bool {
        OnboardingStep::ALL
            .into_iter()
            .all(|step| self.completed_steps.contains(&step))
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            session_id: self.id.clone(),
            status: self.status.label(),
            current_step: self.current_step().map(OnboardingStep::label),
            completed_steps: self
                .completed_steps
                .iter()
                .map(|step| step.label())
                .collect(),
            reopened_steps: self
                .reopened_steps
                .iter()
                .map(|step| step.label())
                .collect(),
            progress_percentage: self.progress_percentage(),
            property_id: self.property_id.clone(),
            manager_id: self.manager_id.clone(),
            language_preference: self.language_preference.clone(),
            expires_at: self.expires_at,
            rejection_reason: self.rejection_reason.clone(),
            retention_until: self.retention_until,
        }
    }
}

/// Read-only snapshot of the approved hiring application a session starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovedApplication {
    pub id: ApplicationId,
    pub property_id: PropertyId,
    pub employee_id: EmployeeId,
    pub full_name: String,
    pub position: String,
    pub start_date: NaiveDate,
}

/// `(manager, property)` assignment pair; the repository is the source of truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyAssignment {
    pub manager_id: ManagerId,
    pub property_id: PropertyId,
}

/// Wire-ready state snapshot returned by the GET endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionView {
    pub session_id: SessionId,
    pub status: &'static str,
    pub current_step: Option<&'static str>,
    pub completed_steps: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reopened_steps: Vec<&'static str>,
    pub progress_percentage: u8,
    pub property_id: PropertyId,
    pub manager_id: ManagerId,
    pub language_preference: String,
    pub expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_until: Option<NaiveDate>,
}
