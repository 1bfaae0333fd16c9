//! DataStore trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StorageError, StorageResult};

/// Maximum length of identifiers (tenant IDs, types, IDs, relation names).
pub const MAX_IDENTIFIER_LENGTH: usize = 256;

/// Filter for reading or deleting tuples; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub relation: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
}

impl TupleFilter {
    pub fn is_empty(&self) -> bool {
        self.entity_type.is_none()
            && self.entity_id.is_none()
            && self.relation.is_none()
            && self.subject_type.is_none()
            && self.subject_id.is_none()
    }

    pub fn matches(&self, tuple: &StoredTuple) -> bool {
        fn field(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().map_or(true, |f| f == value)
        }
        field(&self.entity_type, &tuple.entity_type)
            && field(&self.entity_id, &tuple.entity_id)
            && field(&self.relation, &tuple.relation)
            && field(&self.subject_type, &tuple.subject_type)
            && field(&self.subject_id, &tuple.subject_id)
    }
}

/// A stored tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoredTuple {
    pub entity_type: String,
    pub entity_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
    pub subject_relation: Option<String>,
}

/// A stored attribute value. Values are kept as JSON at the storage boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAttribute {
    pub entity_type: String,
    pub entity_id: String,
    pub name: String,
    pub value: serde_json::Value,
}

/// One immutable schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSchema {
    pub tenant_id: String,
    pub version: String,
    pub dsl: String,
    pub created_at: DateTime<Utc>,
}

/// Abstract storage interface for authorization data.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    // Schema operations

    /// Stores a new schema version. Fails if the version already exists.
    async fn write_schema(&self, schema: StoredSchema) -> StorageResult<()>;

    /// Gets a specific schema version.
    async fn get_schema(&self, tenant_id: &str, version: &str) -> StorageResult<StoredSchema>;

    /// Gets the newest schema version of a tenant.
    async fn get_latest_schema(&self, tenant_id: &str) -> StorageResult<StoredSchema>;

    /// Lists schema versions of a tenant, newest first.
    async fn list_schema_versions(&self, tenant_id: &str) -> StorageResult<Vec<String>>;

    // Tuple operations

    /// Writes tuples; writing an existing tuple is a no-op.
    async fn write_tuples(&self, tenant_id: &str, tuples: Vec<StoredTuple>) -> StorageResult<()>;

    /// Deletes every tuple matching the filter and returns how many were removed.
    /// An empty filter is rejected.
    async fn delete_tuples(&self, tenant_id: &str, filter: &TupleFilter) -> StorageResult<usize>;

    /// Reads tuples matching the filter, in a stable order.
    async fn read_tuples(
        &self,
        tenant_id: &str,
        filter: &TupleFilter,
    ) -> StorageResult<Vec<StoredTuple>>;

    // Attribute operations

    /// Writes attributes, replacing existing values of the same name.
    async fn write_attributes(
        &self,
        tenant_id: &str,
        attributes: Vec<StoredAttribute>,
    ) -> StorageResult<()>;

    /// Deletes attributes of one entity instance; all of them when `name` is `None`.
    /// Returns how many were removed.
    async fn delete_attributes(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
        name: Option<&str>,
    ) -> StorageResult<usize>;

    /// Reads all attributes of one entity instance, ordered by name.
    async fn read_attributes(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> StorageResult<Vec<StoredAttribute>>;
}

// Validation helpers

/// Validates a required identifier: non-empty and within length limits.
pub fn validate_identifier(field: &str, value: &str) -> StorageResult<()> {
    if value.is_empty() {
        return Err(StorageError::InvalidInput {
            message: format!("{field} cannot be empty"),
        });
    }
    if value.len() > MAX_IDENTIFIER_LENGTH {
        return Err(StorageError::InvalidInput {
            message: format!("{field} exceeds maximum length of {MAX_IDENTIFIER_LENGTH}"),
        });
    }
    Ok(())
}

pub fn validate_tenant_id(tenant_id: &str) -> StorageResult<()> {
    validate_identifier("tenant_id", tenant_id)
}

pub fn validate_tuple(tuple: &StoredTuple) -> StorageResult<()> {
    validate_identifier("entity_type", &tuple.entity_type)?;
    validate_identifier("entity_id", &tuple.entity_id)?;
    validate_identifier("relation", &tuple.relation)?;
    validate_identifier("subject_type", &tuple.subject_type)?;
    validate_identifier("subject_id", &tuple.subject_id)?;
    if let Some(relation) = &tuple.subject_relation {
        validate_identifier("subject_relation", relation)?;
    }
    Ok(())
}

pub fn validate_attribute(attribute: &StoredAttribute) -> StorageResult<()> {
    validate_identifier("entity_type", &attribute.entity_type)?;
    validate_identifier("entity_id", &attribute.entity_id)?;
    validate_identifier("name", &attribute.name)?;
    if attribute.value.is_null() {
        return Err(StorageError::InvalidInput {
            message: format!("attribute '{}' has a null value", attribute.name),
        });
    }
    Ok(())
}
