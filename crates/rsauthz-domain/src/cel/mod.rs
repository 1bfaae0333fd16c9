//! CEL (Common Expression Language) evaluation module
//!
//! Attribute rules (`rule(...)` inline expressions and the bodies of
//! top-level `rule` definitions) are CEL expressions over three maps:
//!
//! ```text
//! resource  attributes of the entity being checked
//! subject   attributes of the subject
//! request   caller-supplied context
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               CEL Module                     │
//! ├─────────────────────────────────────────────┤
//! │  CelExpression      - Parsed CEL expression │
//! │  CelExpressionCache - Caches parsed exprs   │
//! │  CelContext         - Variable bindings     │
//! │  CelEvaluator       - ExpressionEvaluator   │
//! │  CelError           - CEL-specific errors   │
//! └─────────────────────────────────────────────┘
//! ```

mod cache;
mod context;
mod error;
mod evaluator;
mod expression;

pub use cache::{global_cache, CelExpressionCache};
pub use context::{CelContext, CelResult as EvalResult, CelValue};
pub use error::CelError;
pub use evaluator::CelEvaluator;
pub use expression::CelExpression;

/// Result type for CEL operations
pub type CelResult<T> = Result<T, CelError>;

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_can_parse_comparison_and_logical_operators() {
        for source in [
            "a == b",
            "a != b",
            "a < b && b <= c",
            "a > b || b >= c",
            "!(a == b)",
            "x + 1 * 2 - 3 / 4 % 5 == 0",
        ] {
            assert!(
                CelExpression::parse(source).is_ok(),
                "should parse: {source}"
            );
        }
    }

    #[test]
    fn test_parser_rejects_invalid_cel_syntax() {
        for source in ["a ==", "(a == b", "&& b", "a b c"] {
            let result = CelExpression::parse(source);
            assert!(
                matches!(result, Err(CelError::ParseError { .. })),
                "should reject: {source}"
            );
        }
    }

    /// Member access on a bound map resolves to the map entry.
    #[test]
    fn test_map_variables_are_accessible() {
        // Arrange
        let expr = CelExpression::parse("resource.owner == 'alice'").unwrap();
        let mut resource = HashMap::new();
        resource.insert("owner".to_string(), CelValue::String("alice".to_string()));
        let mut ctx = CelContext::new();
        ctx.set_map("resource", resource);

        // Act
        let result = expr.evaluate(&ctx);

        // Assert
        assert!(result.unwrap().is_truthy());
    }

    #[test]
    fn test_missing_variable_returns_error() {
        let expr = CelExpression::parse("request.missing == 1").unwrap();
        let result = expr.evaluate(&CelContext::new());
        assert!(matches!(result, Err(CelError::EvaluationError { .. })));
    }

    #[test]
    fn test_scalar_bindings() {
        let mut ctx = CelContext::new();
        ctx.set("x", CelValue::Int(10));
        ctx.set("flag", CelValue::Bool(true));
        ctx.set("s", CelValue::String("hello".to_string()));

        let expr = CelExpression::parse("x > 5 && flag && s.startsWith('he')").unwrap();
        assert!(expr.evaluate_bool(&ctx).unwrap());
    }

    #[test]
    fn test_string_result_is_not_boolean() {
        let mut ctx = CelContext::new();
        ctx.set("s", CelValue::String("hello".to_string()));
        let expr = CelExpression::parse("s + ' world'").unwrap();

        let result = expr.evaluate(&ctx).unwrap();
        assert_eq!(result.as_bool(), None);
        assert_eq!(result.type_name(), "string");
        assert!(matches!(
            expr.evaluate_bool(&ctx),
            Err(CelError::TypeError { .. })
        ));
    }
}
