//! Permission resolution.
//!
//! ```text
//!   Checker ──────▶ Evaluator ──▶ RelationReader / AttributeReader
//!      ▲                 │
//!   Lookup               └──────▶ ExpressionEvaluator
//!
//!   Expander ─────▶ RelationReader
//! ```
//!
//! Every entry point resolves the schema through a [`SchemaReader`] (an
//! explicit version, or the tenant's latest), runs under
//! [`ResolverConfig::timeout`] and is bounded by [`ResolverConfig::max_depth`].

mod checker;
mod config;
mod evaluator;
mod expander;
mod lookup;
mod traits;
mod types;

pub use checker::Checker;
pub use config::ResolverConfig;
pub use evaluator::Evaluator;
pub use expander::Expander;
pub use lookup::Lookup;
pub use traits::{
    AttributeReader, ExpressionContext, ExpressionEvaluator, RelationReader, SchemaReader,
};
pub use types::{
    CheckRequest, CheckResult, EvaluationRequest, ExpandLeaf, ExpandNode, ExpandRequest,
    ExpandResult, LookupEntityRequest, LookupEntityResult, LookupSubjectRequest,
    LookupSubjectResult, SubjectPermissionRequest, SubjectPermissionResult,
};

#[cfg(test)]
mod tests;
