//! Domain error types for authorization enforcement.

use thiserror::Error;

use crate::policy::PermType;

/// Domain-specific errors for authorization enforcement.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The permission backend or persistence layer could not be reached.
    ///
    /// Never downgraded to an empty permission set: an empty set means total
    /// denial and would be indistinguishable from "no policy granted".
    #[error("permission backend unavailable: {message}")]
    BackendUnavailable { message: String },

    /// An existence-or-policy check failed.
    ///
    /// Deliberately conflates "no such row" with "row exists but the policy
    /// forbids it" so that callers cannot probe for row existence.
    #[error("the item/s not exist or you don't have permission to {perm_type} it")]
    PermissionOrNotFound { perm_type: PermType },

    /// A permission record or catalog entry is malformed.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// An incoming filter, selector, or write payload could not be parsed.
    #[error("invalid payload: {message}")]
    InvalidPayload { message: String },
}

impl DomainError {
    pub(crate) fn invalid_payload(message: impl Into<String>) -> Self {
        DomainError::InvalidPayload {
            message: message.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
