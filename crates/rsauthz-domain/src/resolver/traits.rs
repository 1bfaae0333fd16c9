//! Traits for the storage and expression capabilities the resolver consumes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::cel::CelError;
use crate::error::DomainResult;
use crate::model::{AttributeValue, RelationFilter, RelationTuple, Schema};

/// Reads relation tuples.
#[async_trait]
pub trait RelationReader: Send + Sync {
    /// Returns every tuple of the tenant matching `filter`.
    async fn read_relations(
        &self,
        tenant_id: &str,
        filter: &RelationFilter,
    ) -> DomainResult<Vec<RelationTuple>>;
}

/// Reads attribute values of one entity instance.
#[async_trait]
pub trait AttributeReader: Send + Sync {
    /// Returns all attributes of `entity_type:entity_id`; empty if none exist.
    async fn read_attributes(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> DomainResult<HashMap<String, AttributeValue>>;
}

/// Resolves compiled schemas.
#[async_trait]
pub trait SchemaReader: Send + Sync {
    /// Newest schema version of the tenant, or `SchemaNotFound`.
    async fn latest_schema(&self, tenant_id: &str) -> DomainResult<Arc<Schema>>;

    /// A specific schema version, or `SchemaNotFound`.
    async fn schema_by_version(&self, tenant_id: &str, version: &str)
        -> DomainResult<Arc<Schema>>;
}

/// Variables visible to attribute expressions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExpressionContext {
    pub resource: HashMap<String, AttributeValue>,
    pub subject: HashMap<String, AttributeValue>,
    pub request: HashMap<String, AttributeValue>,
}

/// Evaluates boolean attribute expressions.
///
/// Implementations must fail (rather than return `false`) when the expression
/// does not compile, references a missing field, or yields a non-boolean.
pub trait ExpressionEvaluator: Send + Sync {
    fn evaluate(&self, expression: &str, context: &ExpressionContext) -> Result<bool, CelError>;
}

pub(crate) async fn resolve_schema<S: SchemaReader + ?Sized>(
    reader: &S,
    tenant_id: &str,
    version: Option<&str>,
) -> DomainResult<Arc<Schema>> {
    // An empty version means "latest"
    match version.filter(|v| !v.is_empty()) {
        Some(version) => reader.schema_by_version(tenant_id, version).await,
        None => reader.latest_schema(tenant_id).await,
    }
}
