use std::sync::Arc;

use super::domain::{ManagerId, PropertyId, SessionId};
use super::property_cache::PropertyAccessCache;
use super::repository::{SessionRepository, StorageError};
use super::token::{TokenError, TokenService};

/// Caller identity as presented by the transport layer, before any decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Caller {
    Hr { actor_id: String },
    Manager { manager_id: ManagerId },
    EmployeeToken { token: String },
    Anonymous,
}

/// Whether the request reads or mutates the target; recorded on the decision
/// trace. Field-group write restrictions layer on top via the compliance gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Read,
    Write,
}

/// Target of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Property {
        property_id: PropertyId,
    },
    Session {
        session_id: SessionId,
        property_id: PropertyId,
    },
}

impl Resource {
    fn property_id(&self) -> &PropertyId {
        match self {
            Resource::Property { property_id } => property_id,
            Resource::Session { property_id, .. } => property_id,
        }
    }
}

/// Identity that survived authorization; downstream code trusts this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    Hr { actor_id: String },
    Manager { manager_id: ManagerId },
    Employee { session_id: SessionId },
}

impl Actor {
    pub const fn is_employee(&self) -> bool {
        matches!(self, Actor::Employee { .. })
    }

    pub const fn role_label(&self) -> &'static str {
        match self {
            Actor::Hr { .. } => "hr",
            Actor::Manager { .. } => "manager",
            Actor::Employee { .. } => "employee",
        }
    }
}

/// Machine-readable denial reasons; the code selects the HTTP status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AccessDenied {
    #[error("caller presented no identity")]
    Unauthenticated,
    #[error("access token expired")]
    TokenExpired,
    #[error("access token invalid")]
    TokenInvalid,
    #[error("manager is not assigned to this property")]
    NotAssignedToProperty,
    #[error("token does not grant access to this session")]
    InvalidOrForeignToken,
}

impl AccessDenied {
    pub const fn code(self) -> &'static str {
        match self {
            AccessDenied::Unauthenticated => "unauthenticated",
            AccessDenied::TokenExpired => "token_expired",
            AccessDenied::TokenInvalid => "token_invalid",
            AccessDenied::NotAssignedToProperty => "not_assigned_to_property",
            AccessDenied::InvalidOrForeignToken => "invalid_or_foreign_token",
        }
    }

    /// True for identity failures (401); false for authenticated-but-not-
    /// authorized (403).
    pub const fn is_unauthenticated(self) -> bool {
        !matches!(self, AccessDenied::NotAssignedToProperty)
    }
}

/// Authorization outcome: either a denial or a storage fault during the
/// manager/token lookup.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error(transparent)]
    Denied(#[from] AccessDenied),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The single authorization gate every inbound request passes through.
///
/// HR short-circuits to allow before any lookup; managers are checked against
/// the property cache; employee tokens are verified and then pinned to the
/// one session they were issued for. Decisions are pure and recomputed per
/// request; the property cache is the only caching layer.
pub struct AccessController<R> {
    cache: Arc<PropertyAccessCache<R>>,
    tokens: Arc<TokenService<R>>,
}

impl<R: SessionRepository> AccessController<R> {
    pub fn new(cache: Arc<PropertyAccessCache<R>>, tokens: Arc<TokenService<R>>) -> Self {
        Self { cache, tokens }
    }

    pub fn authorize(
        &self,
        caller: &Caller,
        action: Action,
        resource: &Resource,
    ) -> Result<Actor, AccessError> {
        let actor = match caller {
            // HR bypass is evaluated first to avoid cache/repo calls.
            Caller::Hr { actor_id } => Actor::Hr {
                actor_id: actor_id.clone(),
            },
            Caller::Manager { manager_id } => {
                let owned = self.cache.owned_properties(manager_id)?;
                if !owned.contains(resource.property_id()) {
                    return Err(AccessDenied::NotAssignedToProperty.into());
                }
                Actor::Manager {
                    manager_id: manager_id.clone(),
                }
            }
            Caller::EmployeeToken { token } => {
                let session_id = self.tokens.verify(token).map_err(|err| match err {
                    TokenError::TokenExpired => AccessError::Denied(AccessDenied::TokenExpired),
                    TokenError::Storage(storage) => AccessError::Storage(storage),
                    _ => AccessError::Denied(AccessDenied::TokenInvalid),
                })?;
                match resource {
                    Resource::Session {
                        session_id: target, ..
                    } if *target == session_id => Actor::Employee { session_id },
                    // A token never grants access to any resource but its own session.
                    _ => return Err(AccessDenied::InvalidOrForeignToken.into()),
                }
            }
            Caller::Anonymous => return Err(AccessDenied::Unauthenticated.into()),
        };

        tracing::debug!(role = actor.role_label(), ?action, "request authorized");
        Ok(actor)
    }
}
