//! CEL expression cache for avoiding repeated parsing.
//!
//! Rule bodies and inline attribute rules are evaluated on every check that
//! reaches them. Compiled programs are cached by source text so each distinct
//! expression is parsed once per process.

use std::sync::{Arc, OnceLock};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::expression::CelExpression;
use super::CelResult;

/// Thread-safe cache of compiled expressions keyed by source.
#[derive(Default)]
pub struct CelExpressionCache {
    cache: DashMap<String, Arc<CelExpression>>,
}

impl CelExpressionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached expression, compiling and inserting it on a miss.
    /// Compile failures are not cached.
    pub fn get_or_parse(&self, expression: &str) -> CelResult<Arc<CelExpression>> {
        if let Some(cached) = self.cache.get(expression) {
            return Ok(Arc::clone(cached.value()));
        }

        // Entry API keeps parse+insert atomic so concurrent callers share one Arc.
        match self.cache.entry(expression.to_string()) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let parsed = Arc::new(CelExpression::parse(expression)?);
                entry.insert(Arc::clone(&parsed));
                Ok(parsed)
            }
        }
    }

    pub fn entry_count(&self) -> usize {
        self.cache.len()
    }

    pub fn invalidate_all(&self) {
        self.cache.clear();
    }
}

static GLOBAL_CACHE: OnceLock<CelExpressionCache> = OnceLock::new();

/// Process-wide expression cache.
pub fn global_cache() -> &'static CelExpressionCache {
    GLOBAL_CACHE.get_or_init(CelExpressionCache::default)
}
