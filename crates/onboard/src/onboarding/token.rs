use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use super::domain::SessionId;
use super::repository::{retry_read, SessionRepository, StorageError};

/// Errors raised while issuing or verifying employee access tokens.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("session does not exist or is already terminal")]
    InvalidSession,
    #[error("access token expired")]
    TokenExpired,
    #[error("access token invalid")]
    TokenInvalid,
    #[error("referenced session no longer exists")]
    SessionNotFound,
    #[error("token signing failed: {0}")]
    Signing(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sid: String,
    iat: i64,
    exp: i64,
    ver: u32,
}

/// Issues and verifies the opaque, signed, time-bounded tokens that stand in
/// for a login for the employee actor. Signature verification is
/// self-contained; revocation works through the session's version counter,
/// compared here against the version embedded at issuance.
pub struct TokenService<R> {
    repository: Arc<R>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl<R: SessionRepository> TokenService<R> {
    pub fn new(repository: Arc<R>, secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            repository,
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Create a signed token binding `session_id` and an expiry. Fails with
    /// `InvalidSession` if the session does not exist or is already terminal.
    pub fn issue(&self, session_id: &SessionId, ttl: Duration) -> Result<String, TokenError> {
        let session = retry_read(|| self.repository.load_session(session_id))?
            .ok_or(TokenError::InvalidSession)?;
        if session.status.is_terminal() {
            return Err(TokenError::InvalidSession);
        }

        let now = Utc::now();
        let claims = Claims {
            sid: session_id.0.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            ver: session.token_version,
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| TokenError::Signing(err.to_string()))
    }

    /// Verify signature and expiry, then check the embedded version against
    /// the session's current `token_version`.
    pub fn verify(&self, token: &str) -> Result<SessionId, TokenError> {
        let data =
            decode::<Claims>(token, &self.decoding, &self.validation).map_err(|err| {
                match err.kind() {
                    ErrorKind::ExpiredSignature => TokenError::TokenExpired,
                    _ => TokenError::TokenInvalid,
                }
            })?;

        let session_id = SessionId(data.claims.sid);
        let session = retry_read(|| self.repository.load_session(&session_id))?
            .ok_or(TokenError::SessionNotFound)?;
        if session.token_version != data.claims.ver {
            return Err(TokenError::TokenInvalid);
        }

        Ok(session_id)
    }

    /// Increment the session's `token_version`, invalidating every
    /// outstanding token for that session.
    pub fn revoke(&self, session_id: &SessionId) -> Result<(), TokenError> {
        let mut session = retry_read(|| self.repository.load_session(session_id))?
            .ok_or(TokenError::SessionNotFound)?;
        session.token_version += 1;
        session.updated_at = Utc::now();
        self.repository.save_session(session)?;
        Ok(())
    }
}
