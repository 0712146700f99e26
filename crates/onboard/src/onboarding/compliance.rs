use chrono::{Months, NaiveDate};
use serde_json::{Map, Value};

use super::access::Actor;
use super::domain::{OnboardingSession, OnboardingStep};

/// Classification of form fields as employee-writable or manager/HR-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldGroup {
    EmployeeWritable,
    ManagerOrHrOnly,
}

const DEFAULT_RETENTION_YEARS: u32 = 3;

/// Form-data key prefixes reserved for the employer's certification sections.
/// An employee-token submission carrying any of these is rejected outright.
const MANAGER_ONLY_PREFIXES: [&str; 3] = ["i9_section2", "employer_certification", "final_review"];

/// Compliance-driven restrictions layered on top of the access controller:
/// employee callers never touch manager/HR-only sections, and retention
/// deadlines are computed once a session terminalizes as approved.
#[derive(Debug, Clone)]
pub struct ComplianceGate {
    retention_years: u32,
}

impl Default for ComplianceGate {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_YEARS)
    }
}

impl ComplianceGate {
    pub fn new(retention_years: u32) -> Self {
        let retention_years = if retention_years == 0 {
            DEFAULT_RETENTION_YEARS
        } else {
            retention_years
        };
        Self { retention_years }
    }

    /// Static mapping; I-9 Section 2 and the final review are the employer's
    /// certification sections.
    pub fn field_group(step: OnboardingStep) -> FieldGroup {
        if step.is_manager_step() {
            FieldGroup::ManagerOrHrOnly
        } else {
            FieldGroup::EmployeeWritable
        }
    }

    /// Employee-token callers are denied for any manager/HR-only step,
    /// independent of session state.
    pub fn can_access_section(&self, actor: &Actor, step: OnboardingStep) -> bool {
        match Self::field_group(step) {
            FieldGroup::EmployeeWritable => true,
            FieldGroup::ManagerOrHrOnly => !actor.is_employee(),
        }
    }

    /// Returns the first form-data key outside the actor's permitted field
    /// group, if any.
    pub fn forbidden_field<'a>(
        &self,
        actor: &Actor,
        form_data: &'a Map<String, Value>,
    ) -> Option<&'a str> {
        if !actor.is_employee() {
            return None;
        }
        form_data.keys().map(String::as_str).find(|key| {
            MANAGER_ONLY_PREFIXES
                .iter()
                .any(|prefix| key == prefix || key.starts_with(&format!("{prefix}.")))
        })
    }

    /// Statutory retention deadline, a pure function of the hire date and a
    /// fixed offset. Invoked once when a session reaches `approved` and never
    /// recomputed.
    pub fn compute_retention(&self, session: &OnboardingSession) -> Option<NaiveDate> {
        session
            .start_date
            .checked_add_months(Months::new(self.retention_years * 12))
    }
}
