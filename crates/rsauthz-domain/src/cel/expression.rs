//! CEL expression parsing and representation

use std::panic;

use cel_interpreter::Program;

use super::context::{CelContext, CelResult as EvalResult};
use super::{CelError, CelResult};

/// A compiled CEL (Common Expression Language) expression.
///
/// # Example
///
/// ```ignore
/// use rsauthz_domain::cel::CelExpression;
///
/// let expr = CelExpression::parse("resource.public == true")?;
/// ```
pub struct CelExpression {
    /// The original source expression
    source: String,
    /// The compiled CEL program
    program: Program,
}

impl std::fmt::Debug for CelExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CelExpression")
            .field("source", &self.source)
            .finish()
    }
}

impl CelExpression {
    /// Parse a CEL expression string into a CelExpression
    ///
    /// # Returns
    ///
    /// * `Ok(CelExpression)` - Successfully parsed expression
    /// * `Err(CelError::ParseError)` - Invalid CEL syntax
    pub fn parse(expression: &str) -> CelResult<Self> {
        // The underlying parser may panic on some malformed input.
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| Program::compile(expression)));

        let program = match result {
            Ok(Ok(program)) => program,
            Ok(Err(e)) => {
                return Err(CelError::ParseError {
                    expression: expression.to_string(),
                    message: e.to_string(),
                });
            }
            Err(_panic) => {
                return Err(CelError::ParseError {
                    expression: expression.to_string(),
                    message: "parser encountered an internal error while parsing this expression"
                        .to_string(),
                });
            }
        };

        Ok(Self {
            source: expression.to_string(),
            program,
        })
    }

    /// Returns the original source expression
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the CEL expression against a context
    pub fn evaluate(&self, context: &CelContext) -> CelResult<EvalResult> {
        let cel_ctx = context.to_cel_context();
        let result = self
            .program
            .execute(&cel_ctx)
            .map_err(|e| CelError::EvaluationError {
                expression: self.source.clone(),
                message: e.to_string(),
            })?;
        Ok(EvalResult::new(result))
    }

    /// Evaluate the expression and require a boolean result.
    pub fn evaluate_bool(&self, context: &CelContext) -> CelResult<bool> {
        let result = self.evaluate(context)?;
        result.as_bool().ok_or_else(|| CelError::TypeError {
            expression: self.source.clone(),
            expected: "bool".to_string(),
            actual: result.type_name().to_string(),
        })
    }
}
