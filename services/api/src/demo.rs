use crate::infra::{InMemorySessionRepository, LoggingNotificationPublisher};
use chrono::{Local, NaiveDate, Utc};
use clap::Args;
use serde_json::{json, Map, Value};
use std::sync::Arc;

use onboard::error::AppError;
use onboard::onboarding::access::{AccessController, Caller};
use onboard::onboarding::domain::{
    ApplicationId, ApprovedApplication, EmployeeId, ManagerId, OnboardingStep, PropertyAssignment,
    PropertyId, SignatureData,
};
use onboard::onboarding::orchestrator::{
    CreateSessionOptions, OnboardingOrchestrator, OrchestratorSettings, TransitionAction,
};
use onboard::onboarding::property_cache::PropertyAccessCache;
use onboard::onboarding::token::TokenService;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// First working day of the demo hire (YYYY-MM-DD). Defaults to three weeks out.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start_date: Option<NaiveDate>,
    /// Language preference recorded on the session
    #[arg(long)]
    pub(crate) language: Option<String>,
    /// Stop after the manager recommendation instead of approving
    #[arg(long)]
    pub(crate) skip_hr_decision: bool,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        start_date,
        language,
        skip_hr_decision,
    } = args;

    let start_date =
        start_date.unwrap_or_else(|| Local::now().date_naive() + chrono::Duration::days(21));

    let repository = Arc::new(InMemorySessionRepository::default());
    repository.insert_application(ApprovedApplication {
        id: ApplicationId("app-demo".to_string()),
        property_id: PropertyId("prop-harborview".to_string()),
        employee_id: EmployeeId("emp-demo".to_string()),
        full_name: "Marisol Vega".to_string(),
        position: "Night Auditor".to_string(),
        start_date,
    });
    repository.insert_assignment(PropertyAssignment {
        manager_id: ManagerId("mgr-ellison".to_string()),
        property_id: PropertyId("prop-harborview".to_string()),
    });

    let tokens = Arc::new(TokenService::new(repository.clone(), "demo-signing-secret"));
    let cache = Arc::new(PropertyAccessCache::new(repository.clone()));
    let access = Arc::new(AccessController::new(cache, tokens.clone()));
    let orchestrator = OnboardingOrchestrator::new(
        repository,
        Arc::new(LoggingNotificationPublisher),
        access,
        tokens,
        OrchestratorSettings::default(),
    );

    let hr = Caller::Hr {
        actor_id: "hr-demo".to_string(),
    };
    let manager = Caller::Manager {
        manager_id: ManagerId("mgr-ellison".to_string()),
    };

    println!("Onboarding workflow demo");
    println!("- Hire: Marisol Vega, Night Auditor at prop-harborview, starting {start_date}");

    let created = orchestrator.create_session(
        &hr,
        &ApplicationId("app-demo".to_string()),
        CreateSessionOptions {
            manager_id: Some(ManagerId("mgr-ellison".to_string())),
            language_preference: language,
            expires_in_days: None,
        },
    )?;
    let session_id = created.session.id.clone();
    let employee = Caller::EmployeeToken {
        token: created.token.clone(),
    };
    println!("- Session {} created; employee link token issued", session_id.0);

    let opened = orchestrator.open_session(&employee, &session_id)?;
    println!("- Employee opened the link -> {}", opened.status.label());

    for step in OnboardingStep::ALL {
        if step.is_manager_step() {
            continue;
        }
        let session =
            orchestrator.submit_step(&employee, &session_id, step, demo_form(step), demo_signature(step))?;
        println!(
            "- Employee completed {} ({}% done, phase {})",
            step.label(),
            session.progress_percentage(),
            session.status.label()
        );
    }

    let review = orchestrator.open_session(&manager, &session_id)?;
    println!("- Manager opened the review -> {}", review.status.label());

    for step in OnboardingStep::ALL {
        if !step.is_manager_step() {
            continue;
        }
        let session =
            orchestrator.submit_step(&manager, &session_id, step, demo_form(step), demo_signature(step))?;
        println!(
            "- Manager completed {} ({}% done, phase {})",
            step.label(),
            session.progress_percentage(),
            session.status.label()
        );
    }

    let recommended =
        orchestrator.transition(&manager, &session_id, TransitionAction::SubmitForApproval)?;
    println!("- Manager recommendation recorded -> {}", recommended.status.label());

    if skip_hr_decision {
        println!("- Stopping before the HR decision as requested");
        return Ok(());
    }

    let approved = orchestrator.transition(&hr, &session_id, TransitionAction::Approve)?;
    println!("- HR approved -> {}", approved.status.label());
    if let Some(retention_until) = approved.retention_until {
        println!("- Records retained until {retention_until}");
    }

    match serde_json::to_string_pretty(&approved.view()) {
        Ok(view) => println!("Final session view:\n{view}"),
        Err(err) => println!("Final session view unavailable: {err}"),
    }

    Ok(())
}

fn demo_form(step: OnboardingStep) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert("section".to_string(), json!(step.label()));
    data.insert("completed_via".to_string(), json!("cli-demo"));
    data
}

fn demo_signature(step: OnboardingStep) -> Option<SignatureData> {
    step.requires_signature().then(|| SignatureData {
        image_ref: format!("s3://onboard/signatures/demo-{}.png", step.label()),
        signed_at: Utc::now(),
        ip_address: None,
    })
}
