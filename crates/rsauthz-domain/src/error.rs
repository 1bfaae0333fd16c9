//! Domain error types for schema compilation and permission evaluation.

use thiserror::Error;

/// Domain-specific errors for schema and authorization operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// One or more lexical/syntactic errors in schema DSL.
    #[error("schema parse error: {message}")]
    SchemaParse { message: String },

    /// One or more structural/referential errors in a parsed schema.
    #[error("schema validation error: {message}")]
    SchemaValidation { message: String },

    /// No schema (or no schema with the requested version) for a tenant.
    #[error("schema not found for tenant '{tenant_id}'{}", version_suffix(.version))]
    SchemaNotFound {
        tenant_id: String,
        version: Option<String>,
    },

    /// Entity type not declared in the schema.
    #[error("entity type not found: {entity_type}")]
    EntityNotFound { entity_type: String },

    /// Permission not declared on the entity.
    #[error("permission '{permission}' not found on entity '{entity_type}'")]
    PermissionNotFound {
        entity_type: String,
        permission: String,
    },

    /// Relation not declared on the entity.
    #[error("relation '{relation}' not found on entity '{entity_type}'")]
    RelationNotFound {
        entity_type: String,
        relation: String,
    },

    /// Top-level rule referenced by a rule call does not exist.
    #[error("rule not found: {rule}")]
    RuleNotFound { rule: String },

    /// Rule call argument count differs from the rule's parameter count.
    #[error("rule '{rule}' expects {expected} argument(s), got {actual}")]
    RuleArityMismatch {
        rule: String,
        expected: usize,
        actual: usize,
    },

    /// Depth limit exceeded during recursive evaluation.
    #[error("depth limit exceeded (max: {max_depth})")]
    DepthLimitExceeded { max_depth: u32 },

    /// The expression engine failed to compile or evaluate an expression.
    #[error("expression error in {rule}: {message}")]
    Expression { rule: String, message: String },

    /// A permission rule tree is structurally broken (e.g. `or` without a right operand).
    #[error("malformed rule: {message}")]
    MalformedRule { message: String },

    /// The operation does not support this rule kind.
    #[error("unsupported rule type: {kind}")]
    UnsupportedRule { kind: String },

    /// A required request field is missing or malformed.
    #[error("invalid request: {field} {reason}")]
    InvalidRequest { field: String, reason: String },

    /// Operation exceeded its deadline.
    #[error("timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Error reported by a repository.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// An evaluation failure annotated with the `entity#permission` being evaluated.
    #[error("evaluating {entity}#{permission}: {source}")]
    Evaluation {
        entity: String,
        permission: String,
        #[source]
        source: Box<DomainError>,
    },
}

fn version_suffix(version: &Option<String>) -> String {
    match version {
        Some(v) => format!(" (version {v})"),
        None => String::new(),
    }
}

impl DomainError {
    /// Returns true for errors meaning "the request references something that
    /// does not exist", as opposed to evaluation failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.root_cause(),
            DomainError::SchemaNotFound { .. }
                | DomainError::EntityNotFound { .. }
                | DomainError::PermissionNotFound { .. }
                | DomainError::RelationNotFound { .. }
                | DomainError::RuleNotFound { .. }
        )
    }

    /// The innermost error beneath any [`DomainError::Evaluation`] layers.
    pub fn root_cause(&self) -> &DomainError {
        match self {
            DomainError::Evaluation { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Wraps `self` with the entity and permission under evaluation.
    pub(crate) fn in_evaluation(
        self,
        entity_type: &str,
        entity_id: &str,
        permission: &str,
    ) -> Self {
        DomainError::Evaluation {
            entity: format!("{entity_type}:{entity_id}"),
            permission: permission.to_string(),
            source: Box::new(self),
        }
    }

    pub(crate) fn missing(field: &str) -> Self {
        DomainError::InvalidRequest {
            field: field.to_string(),
            reason: "cannot be empty".to_string(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
