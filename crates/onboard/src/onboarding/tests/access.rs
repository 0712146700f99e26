use std::sync::atomic::Ordering;

use super::common::*;
use crate::onboarding::access::{AccessDenied, AccessError, Action, Actor, Caller, Resource};
use crate::onboarding::domain::{PropertyId, SessionId};

fn property_resource() -> Resource {
    Resource::Property {
        property_id: PropertyId(PROPERTY.to_string()),
    }
}

#[test]
fn hr_bypass_skips_property_lookups() {
    let stack = stack();

    let actor = stack
        .access
        .authorize(&hr(), Action::Write, &property_resource())
        .expect("hr allowed");

    assert!(matches!(actor, Actor::Hr { .. }));
    assert_eq!(stack.repository.assignment_loads.load(Ordering::SeqCst), 0);
}

#[test]
fn manager_allowed_only_for_owned_properties() {
    let stack = stack();

    let actor = stack
        .access
        .authorize(&manager(MANAGER), Action::Read, &property_resource())
        .expect("assigned manager allowed");
    assert!(matches!(actor, Actor::Manager { .. }));

    let foreign = Resource::Property {
        property_id: PropertyId("prop-elsewhere".to_string()),
    };
    match stack.access.authorize(&manager(MANAGER), Action::Read, &foreign) {
        Err(AccessError::Denied(AccessDenied::NotAssignedToProperty)) => {}
        other => panic!("expected property denial, got {other:?}"),
    }
}

#[test]
fn employee_token_is_scoped_to_its_own_session() {
    let stack = stack();
    let (session_id, token) = create_session(&stack);

    let own = Resource::Session {
        session_id: session_id.clone(),
        property_id: PropertyId(PROPERTY.to_string()),
    };
    let actor = stack
        .access
        .authorize(&employee(&token), Action::Write, &own)
        .expect("own session allowed");
    assert_eq!(
        actor,
        Actor::Employee {
            session_id: session_id.clone()
        }
    );

    let foreign = Resource::Session {
        session_id: SessionId("ob-999999".to_string()),
        property_id: PropertyId(PROPERTY.to_string()),
    };
    match stack.access.authorize(&employee(&token), Action::Write, &foreign) {
        Err(AccessError::Denied(AccessDenied::InvalidOrForeignToken)) => {}
        other => panic!("expected foreign token denial, got {other:?}"),
    }

    // A token never reaches past session scope, property resources included.
    match stack
        .access
        .authorize(&employee(&token), Action::Write, &property_resource())
    {
        Err(AccessError::Denied(AccessDenied::InvalidOrForeignToken)) => {}
        other => panic!("expected scope denial, got {other:?}"),
    }
}

#[test]
fn anonymous_callers_are_rejected() {
    let stack = stack();
    match stack
        .access
        .authorize(&Caller::Anonymous, Action::Read, &property_resource())
    {
        Err(AccessError::Denied(AccessDenied::Unauthenticated)) => {}
        other => panic!("expected unauthenticated denial, got {other:?}"),
    }
}

#[test]
fn garbage_token_is_denied_as_invalid() {
    let stack = stack();
    let (session_id, _) = create_session(&stack);
    let resource = Resource::Session {
        session_id,
        property_id: PropertyId(PROPERTY.to_string()),
    };

    match stack
        .access
        .authorize(&employee("not-a-jwt"), Action::Read, &resource)
    {
        Err(AccessError::Denied(AccessDenied::TokenInvalid)) => {}
        other => panic!("expected invalid token denial, got {other:?}"),
    }
}

#[test]
fn unassignment_takes_effect_after_invalidation() {
    let stack = stack();
    let manager_id = crate::onboarding::domain::ManagerId(MANAGER.to_string());

    stack
        .access
        .authorize(&manager(MANAGER), Action::Write, &property_resource())
        .expect("assigned manager allowed");

    stack.repository.unassign(MANAGER, PROPERTY);

    // Within the TTL window the stale grant persists by design.
    stack
        .access
        .authorize(&manager(MANAGER), Action::Write, &property_resource())
        .expect("stale cache still allows");

    stack.cache.invalidate(&manager_id);
    match stack
        .access
        .authorize(&manager(MANAGER), Action::Write, &property_resource())
    {
        Err(AccessError::Denied(AccessDenied::NotAssignedToProperty)) => {}
        other => panic!("expected denial after invalidation, got {other:?}"),
    }
}

#[test]
fn denial_codes_distinguish_identity_from_permission() {
    assert!(AccessDenied::Unauthenticated.is_unauthenticated());
    assert!(AccessDenied::TokenExpired.is_unauthenticated());
    assert!(AccessDenied::TokenInvalid.is_unauthenticated());
    assert!(AccessDenied::InvalidOrForeignToken.is_unauthenticated());
    assert!(!AccessDenied::NotAssignedToProperty.is_unauthenticated());
    assert_eq!(AccessDenied::NotAssignedToProperty.code(), "not_assigned_to_property");
}
