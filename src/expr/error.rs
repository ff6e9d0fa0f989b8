//! Errors raised by expression compilation and evaluation.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    #[error("failed to parse expression '{expr}': {reason}")]
    ParseError { expr: String, reason: String },

    #[error("unbound attribute path '{0}'")]
    UnboundAttribute(String),

    #[error("type mismatch evaluating '{op}': {detail}")]
    TypeMismatch { op: String, detail: String },

    #[error("division by zero")]
    DivisionByZero,
}

pub type Result<T> = std::result::Result<T, ExpressionError>;
