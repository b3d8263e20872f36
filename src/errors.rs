// Copyright 2025 Eventum Contributors.

//! Error types for domain operations
//!
//! Command handlers report failures through [`DomainError`]; storage and
//! processing layers carry their own error enums and convert into the
//! processor-level [`CommandError`](crate::modeling::CommandError) at the
//! boundary so callers can tell "retry" from "fail fast".

use thiserror::Error;

/// Errors raised by aggregate business logic
///
/// These are validation-class failures: the command was understood but the
/// aggregate refuses it. They are never retried by the engine because
/// re-reading fresher state cannot make them succeed.
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    /// The operation is not valid for the aggregate's current state
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Reason why the operation is invalid
        reason: String,
    },

    /// An aggregate invariant would be violated
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Command input failed validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A business rule rejected the command
    #[error("Business rule violation: {rule}")]
    BusinessRuleViolation {
        /// Description of the violated rule
        rule: String,
    },

    /// A referenced entity or aggregate does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failed to serialize or deserialize domain data
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Generic domain error
    #[error("Domain error: {0}")]
    Generic(String),
}

/// Result type for domain operations
pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl DomainError {
    /// Create a generic domain error
    pub fn generic(msg: impl Into<String>) -> Self {
        DomainError::Generic(msg.into())
    }

    /// Create an invalid-operation error
    pub fn invalid_operation(reason: impl Into<String>) -> Self {
        DomainError::InvalidOperation {
            reason: reason.into(),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, DomainError::NotFound(_))
    }

    /// Check if this is a validation-class error
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            DomainError::ValidationError(_)
                | DomainError::InvariantViolation(_)
                | DomainError::BusinessRuleViolation { .. }
                | DomainError::InvalidOperation { .. }
        )
    }

    /// Stable error code for structured command results
    pub fn error_code(&self) -> &'static str {
        match self {
            DomainError::InvalidOperation { .. } => "INVALID_OPERATION",
            DomainError::InvariantViolation(_) => "INVARIANT_VIOLATION",
            DomainError::ValidationError(_) => "VALIDATION_ERROR",
            DomainError::BusinessRuleViolation { .. } => "BUSINESS_RULE_VIOLATION",
            DomainError::NotFound(_) => "NOT_FOUND",
            DomainError::SerializationError(_) => "SERIALIZATION_ERROR",
            DomainError::Generic(_) => "DOMAIN_ERROR",
        }
    }
}
