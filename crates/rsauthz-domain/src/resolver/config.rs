//! Configuration for the permission resolver.

use std::time::Duration;

/// Resolver limits shared by check, expand and lookup.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Maximum recursion depth; a request deeper than this fails.
    pub max_depth: u32,
    /// Deadline for a whole check/expand/lookup call.
    pub timeout: Duration,
    /// Concurrent candidate checks during lookup.
    pub lookup_concurrency: usize,
    /// Page size used when a lookup request asks for 0.
    pub default_page_size: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_depth: 100,
            timeout: Duration::from_secs(30),
            lookup_concurrency: 16,
            default_page_size: 50,
        }
    }
}

impl ResolverConfig {
    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_lookup_concurrency(mut self, concurrency: usize) -> Self {
        // buffered(0) would never make progress
        self.lookup_concurrency = concurrency.max(1);
        self
    }

    pub fn with_default_page_size(mut self, page_size: u32) -> Self {
        self.default_page_size = page_size;
        self
    }

    pub(crate) fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}
