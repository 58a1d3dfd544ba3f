//! Token verification.

use serde_json::{json, Value};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Malformed token")]
    Malformed,

    #[error("Token is missing `{0}`")]
    MissingField(&'static str),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        "auth_failed"
    }
}

/// Who a connection authenticated as
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: String,
    pub client_id: String,
    pub claims: Value,
}

pub trait TokenVerifier: Send + Sync {
    fn verify_token(&self, token: &str) -> Result<Identity, AuthError>;
}

/// Accepts `user:<userId>:client:<clientId>`
#[derive(Debug, Clone, Copy, Default)]
pub struct ConventionTokenVerifier;

impl TokenVerifier for ConventionTokenVerifier {
    fn verify_token(&self, token: &str) -> Result<Identity, AuthError> {
        let parts: Vec<&str> = token.split(':').collect();
        let ["user", user_id, "client", client_id] = parts.as_slice() else {
            return Err(AuthError::Malformed);
        };

        if user_id.is_empty() {
            return Err(AuthError::MissingField("userId"));
        }
        if client_id.is_empty() {
            return Err(AuthError::MissingField("clientId"));
        }

        Ok(Identity {
            user_id: user_id.to_string(),
            client_id: client_id.to_string(),
            claims: json!({ "sub": user_id }),
        })
    }
}
