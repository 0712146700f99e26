use chrono::Duration;

use super::common::*;
use crate::onboarding::domain::OnboardingStatus;
use crate::onboarding::token::{TokenError, TokenService};

#[test]
fn round_trip_verifies_before_expiry() {
    let stack = stack();
    let (session_id, _) = create_session(&stack);

    let token = stack
        .tokens
        .issue(&session_id, Duration::hours(1))
        .expect("token issued");
    let verified = stack.tokens.verify(&token).expect("token verifies");
    assert_eq!(verified, session_id);
}

#[test]
fn expired_token_reports_token_expired() {
    let stack = stack();
    let (session_id, _) = create_session(&stack);

    let token = stack
        .tokens
        .issue(&session_id, Duration::seconds(-5))
        .expect("token issued");
    match stack.tokens.verify(&token) {
        Err(TokenError::TokenExpired) => {}
        other => panic!("expected expired token, got {other:?}"),
    }
}

#[test]
fn tampered_token_reports_invalid() {
    let stack = stack();
    let (session_id, _) = create_session(&stack);

    let foreign_service = TokenService::new(stack.repository.clone(), "some-other-secret");
    let forged = foreign_service
        .issue(&session_id, Duration::hours(1))
        .expect("forged token issued");

    match stack.tokens.verify(&forged) {
        Err(TokenError::TokenInvalid) => {}
        other => panic!("expected invalid token, got {other:?}"),
    }
}

#[test]
fn revocation_invalidates_old_tokens_and_fresh_ones_verify() {
    let stack = stack();
    let (session_id, first_token) = create_session(&stack);

    stack.tokens.revoke(&session_id).expect("revoke succeeds");

    match stack.tokens.verify(&first_token) {
        Err(TokenError::TokenInvalid) => {}
        other => panic!("expected version mismatch, got {other:?}"),
    }

    let fresh = stack
        .tokens
        .issue(&session_id, Duration::hours(1))
        .expect("fresh token issued");
    assert_eq!(stack.tokens.verify(&fresh).expect("verifies"), session_id);
}

#[test]
fn issue_rejects_missing_or_terminal_sessions() {
    let stack = stack();
    let (session_id, _) = create_session(&stack);

    let mut session = stack
        .repository
        .session(&session_id)
        .expect("session present");
    session.status = OnboardingStatus::Rejected;
    stack.repository.put_session(session);

    match stack.tokens.issue(&session_id, Duration::hours(1)) {
        Err(TokenError::InvalidSession) => {}
        other => panic!("expected invalid session, got {other:?}"),
    }

    stack.repository.remove_session(&session_id);
    match stack.tokens.issue(&session_id, Duration::hours(1)) {
        Err(TokenError::InvalidSession) => {}
        other => panic!("expected invalid session, got {other:?}"),
    }
}

#[test]
fn verify_reports_session_not_found_after_deletion() {
    let stack = stack();
    let (session_id, token) = create_session(&stack);

    stack.repository.remove_session(&session_id);
    match stack.tokens.verify(&token) {
        Err(TokenError::SessionNotFound) => {}
        other => panic!("expected session not found, got {other:?}"),
    }
}
