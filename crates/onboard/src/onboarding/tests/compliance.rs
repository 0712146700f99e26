use chrono::NaiveDate;
use serde_json::json;

use super::common::*;
use crate::onboarding::access::Actor;
use crate::onboarding::compliance::{ComplianceGate, FieldGroup};
use crate::onboarding::domain::{ManagerId, OnboardingStep, SessionId};

fn employee_actor() -> Actor {
    Actor::Employee {
        session_id: SessionId("ob-000001".to_string()),
    }
}

#[test]
fn employer_sections_are_manager_or_hr_only() {
    for step in OnboardingStep::ALL {
        let expected = if step.is_manager_step() {
            FieldGroup::ManagerOrHrOnly
        } else {
            FieldGroup::EmployeeWritable
        };
        assert_eq!(ComplianceGate::field_group(step), expected, "{step:?}");
    }
}

#[test]
fn employee_tokens_never_reach_manager_sections() {
    let gate = ComplianceGate::default();
    for step in MANAGER_STEPS {
        assert!(!gate.can_access_section(&employee_actor(), step));
    }
    for step in EMPLOYEE_STEPS {
        assert!(gate.can_access_section(&employee_actor(), step));
    }
}

#[test]
fn managers_and_hr_reach_every_section() {
    let gate = ComplianceGate::default();
    let manager = Actor::Manager {
        manager_id: ManagerId(MANAGER.to_string()),
    };
    let hr = Actor::Hr {
        actor_id: "hr-ops".to_string(),
    };
    for step in OnboardingStep::ALL {
        assert!(gate.can_access_section(&manager, step));
        assert!(gate.can_access_section(&hr, step));
    }
}

#[test]
fn employer_certification_keys_are_flagged_for_employees() {
    let gate = ComplianceGate::default();

    let mut data = form(OnboardingStep::PersonalInfo);
    data.insert("i9_section2.employer_name".to_string(), json!("Riverside"));
    assert_eq!(
        gate.forbidden_field(&employee_actor(), &data),
        Some("i9_section2.employer_name")
    );

    let manager = Actor::Manager {
        manager_id: ManagerId(MANAGER.to_string()),
    };
    assert_eq!(gate.forbidden_field(&manager, &data), None);

    let clean = form(OnboardingStep::PersonalInfo);
    assert_eq!(gate.forbidden_field(&employee_actor(), &clean), None);
}

#[test]
fn retention_is_hire_date_plus_statutory_offset() {
    let stack = stack();
    let (session_id, _) = create_session(&stack);
    let session = stack
        .repository
        .session(&session_id)
        .expect("session present");

    let gate = ComplianceGate::default();
    assert_eq!(
        gate.compute_retention(&session),
        NaiveDate::from_ymd_opt(2029, 9, 14)
    );
}

#[test]
fn zero_year_policy_falls_back_to_default() {
    let stack = stack();
    let (session_id, _) = create_session(&stack);
    let session = stack
        .repository
        .session(&session_id)
        .expect("session present");

    assert_eq!(
        ComplianceGate::new(0).compute_retention(&session),
        ComplianceGate::default().compute_retention(&session)
    );
}
