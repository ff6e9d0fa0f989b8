//! Error types for the authorization engine

use thiserror::Error;

/// Authorization engine errors.
///
/// Only input and operational errors are surfaced through `Result`. Evaluation-kind
/// errors (unbound attribute, type mismatch inside a condition) never reach here --
/// they degrade to "condition false" and are recorded as diagnostics instead, per
/// the propagation policy of the engine.
#[derive(Debug, Error)]
pub enum AuthzError {
    /// A loaded policy failed validation: bad enum value, missing field, unparsable
    /// condition, invalid scope syntax, or a derived-role cycle.
    #[error("invalid policy '{name}': {reason}")]
    InvalidPolicy { name: String, reason: String },

    /// A `check` request was malformed: missing principal/resource id, empty or
    /// duplicate actions.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A scope string did not conform to the dotted-segment grammar.
    #[error("invalid scope '{0}': {1}")]
    InvalidScope(String, String),

    /// The caller's cancellation signal fired before the check completed.
    #[error("check cancelled")]
    Cancelled,

    /// A programming invariant was violated; should never happen in practice.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for authorization operations.
pub type Result<T> = std::result::Result<T, AuthzError>;
