//! Schema DSL front end.
//!
//! ```text
//! source ──lexer──▶ tokens ──parser──▶ SchemaAst ──validation──▶ converter ──▶ Schema
//!                                          │
//!                                          └──generator──▶ canonical source
//! ```

pub mod ast;
pub mod converter;
mod generator;
mod lexer;
mod parser;
mod token;

use chrono::{DateTime, Utc};
use tracing::debug;

pub use generator::{generate, generate_expr};
pub use lexer::{tokenize, LexError};
pub use parser::{parse, ParseError, ParseResult, SyntaxError};
pub use token::{Token, TokenKind};

use crate::error::{DomainError, DomainResult};
use crate::model::Schema;
use crate::validation;

/// Parses, validates and converts DSL source into a [`Schema`].
///
/// Parse errors and validation errors are each reported all together; no
/// schema is produced unless both stages succeed.
pub fn compile_schema(
    tenant_id: &str,
    version: &str,
    dsl: &str,
    created_at: DateTime<Utc>,
) -> DomainResult<Schema> {
    let ast = parse(dsl).map_err(|e| DomainError::SchemaParse {
        message: e.to_string(),
    })?;

    validation::validate(&ast).map_err(|errors| DomainError::SchemaValidation {
        message: errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"),
    })?;

    let schema = converter::ast_to_schema(&ast, tenant_id, version, dsl, created_at)?;
    debug!(
        tenant_id,
        version,
        entities = schema.entities.len(),
        rules = schema.rules.len(),
        "compiled schema"
    );
    Ok(schema)
}

/// Regenerates canonical DSL text for a runtime schema.
pub fn schema_to_dsl(schema: &Schema) -> DomainResult<String> {
    Ok(generate(&converter::schema_to_ast(schema)?))
}
