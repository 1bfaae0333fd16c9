//! rsauthz-domain: Core authorization domain logic
//!
//! This crate contains the relationship/attribute authorization engine:
//! - Schema DSL front end (lexer, parser, generator, AST conversion)
//! - Static schema validation
//! - Runtime domain model
//! - CEL expression evaluation for attribute rules
//! - Permission resolution (check, expand, lookup)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsauthz-domain                 │
//! ├─────────────────────────────────────────────┤
//! │  dsl/        - Lexer, parser, generator     │
//! │  validation/ - Schema validation            │
//! │  model/      - Runtime schema & tuples      │
//! │  cel/        - Attribute expression engine  │
//! │  resolver/   - Check, expand, lookup        │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cel;
pub mod dsl;
pub mod error;
pub mod model;
pub mod resolver;
pub mod validation;

// Re-export commonly used types at the crate root
pub use dsl::compile_schema;
pub use error::{DomainError, DomainResult};
