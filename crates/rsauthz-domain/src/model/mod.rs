//! Runtime authorization model.
//!
//! This module contains:
//! - Schema structures (entities, relations, attributes, permissions, rules)
//! - The permission rule tree evaluated by the resolver
//! - Relation tuples, filters and attribute values

mod types;

pub use types::*;
