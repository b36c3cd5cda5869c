//! Error types for the Zinic engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ZinicError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Entity already exists: {entity} {id}")]
    AlreadyExists { entity: String, id: String },

    #[error("Unauthorized: {reason}")]
    Unauthorized { reason: String },

    #[error("Permission denied: {action}")]
    PermissionDenied { action: String },

    #[error("Invalid quantity: {message}")]
    InvalidQuantity { message: String },

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Tenant limit exceeded: {message}")]
    LimitExceeded { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Malformed record in {entity}: {message}")]
    MalformedRecord { entity: String, message: String },

    #[error("Remote store unavailable: {0}")]
    RemoteUnavailable(String),

    #[error("Sandbox {code} has expired")]
    SandboxExpired { code: String },

    #[error("Local storage error: {0}")]
    Storage(String),
}

impl ZinicError {
    pub fn not_found(entity: &str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn malformed(entity: &str, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            entity: entity.into(),
            message: message.into(),
        }
    }

    pub fn invalid_quantity(message: impl Into<String>) -> Self {
        Self::InvalidQuantity {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }
}

pub type ZinicResult<T> = Result<T, ZinicError>;
