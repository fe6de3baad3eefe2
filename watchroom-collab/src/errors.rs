use thiserror::Error;

use crate::{DatabaseError, RoleParseError};

pub type CollabResult<T> = Result<T, CollabError>;

/// Errors surfaced to callers of the collab system. Nothing here is retried internally.
#[derive(Debug, Error)]
pub enum CollabError {
    /// A required field is missing or malformed
    #[error("Invalid {field}: {reason}")]
    Validation {
        field: &'static str,
        reason: String,
    },
    #[error("{resource} with {field} of value {value} already exists")]
    UniquenessViolation {
        resource: &'static str,
        field: &'static str,
        value: String,
    },
    #[error("{resource}:{identifier} not found")]
    NotFound {
        resource: &'static str,
        identifier: &'static str,
    },
    #[error("Store is unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Unknown internal error: {0}")]
    Internal(String),
}

impl CollabError {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<DatabaseError> for CollabError {
    fn from(value: DatabaseError) -> Self {
        match value {
            DatabaseError::NotFound {
                resource,
                identifier,
            } => Self::NotFound {
                resource,
                identifier,
            },
            DatabaseError::Conflict {
                resource,
                field,
                value,
            } => Self::UniquenessViolation {
                resource,
                field,
                value,
            },
            DatabaseError::Unavailable(reason) => Self::StoreUnavailable(reason),
            e => Self::Internal(e.to_string()),
        }
    }
}

impl From<RoleParseError> for CollabError {
    fn from(value: RoleParseError) -> Self {
        Self::Validation {
            field: "role",
            reason: value.to_string(),
        }
    }
}
