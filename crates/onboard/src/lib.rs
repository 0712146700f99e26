//! Onboarding workflow and property-scoped access control for hotel staffing.
//!
//! The [`onboarding`] module owns the session state machine, the access token
//! lifecycle, and the authorization gate consulted by every inbound request.
//! Storage and outbound notifications stay behind traits so the engine can be
//! exercised in isolation.

pub mod config;
pub mod error;
pub mod onboarding;
pub mod telemetry;
