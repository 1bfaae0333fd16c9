//! CEL-specific error types

use thiserror::Error;

/// Errors that can occur during CEL expression parsing and evaluation
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CelError {
    /// Failed to parse the CEL expression
    #[error("failed to parse CEL expression '{expression}': {message}")]
    ParseError {
        /// The expression that failed to parse
        expression: String,
        /// Description of the parse error
        message: String,
    },

    /// Failed to evaluate the CEL expression (includes missing fields)
    #[error("failed to evaluate CEL expression '{expression}': {message}")]
    EvaluationError {
        /// The expression that failed to evaluate
        expression: String,
        /// Description of the evaluation error
        message: String,
    },

    /// The expression produced a value of the wrong type
    #[error("type mismatch in '{expression}': expected {expected}, got {actual}")]
    TypeError {
        expression: String,
        /// Expected type
        expected: String,
        /// Actual type received
        actual: String,
    },
}
