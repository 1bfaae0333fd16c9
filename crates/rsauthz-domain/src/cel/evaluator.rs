//! [`ExpressionEvaluator`] backed by CEL.

use crate::resolver::{ExpressionContext, ExpressionEvaluator};

use super::cache::{global_cache, CelExpressionCache};
use super::context::CelContext;
use super::CelError;

/// Evaluates attribute expressions with compiled programs from a shared cache.
#[derive(Clone, Copy)]
pub struct CelEvaluator {
    cache: &'static CelExpressionCache,
}

impl Default for CelEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl CelEvaluator {
    /// Uses the process-wide cache.
    pub fn new() -> Self {
        Self {
            cache: global_cache(),
        }
    }

    /// Uses a caller-owned cache; mainly for tests that assert cache behavior.
    pub fn with_cache(cache: &'static CelExpressionCache) -> Self {
        Self { cache }
    }
}

impl std::fmt::Debug for CelEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CelEvaluator")
            .field("cached_expressions", &self.cache.entry_count())
            .finish()
    }
}

impl ExpressionEvaluator for CelEvaluator {
    fn evaluate(&self, expression: &str, context: &ExpressionContext) -> Result<bool, CelError> {
        let program = self.cache.get_or_parse(expression)?;

        let mut ctx = CelContext::new();
        ctx.set_attributes("resource", &context.resource);
        ctx.set_attributes("subject", &context.subject);
        ctx.set_attributes("request", &context.request);

        program.evaluate_bool(&ctx)
    }
}
