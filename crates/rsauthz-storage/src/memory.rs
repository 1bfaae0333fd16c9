//! In-memory storage implementation.
//!
//! Tuples are kept in a `HashSet<StoredTuple>` per tenant so writes are
//! idempotent. Deletes match a filter, so they scan the tenant's set with
//! `retain`; reads scan and sort.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    validate_attribute, validate_identifier, validate_tenant_id, validate_tuple, DataStore,
    StoredAttribute, StoredSchema, StoredTuple, TupleFilter,
};

/// Attributes of one tenant: `(entity_type, entity_id)` → name → value.
type AttributeTable = BTreeMap<(String, String), BTreeMap<String, serde_json::Value>>;

/// In-memory implementation of DataStore.
///
/// # Performance Characteristics
///
/// - **Write tuple**: O(1) average (HashSet insert)
/// - **Delete tuples**: O(N) in the tenant's tuple count (filter scan)
/// - **Read tuples**: O(N log N) (scan, then sort for a stable order)
/// - **Schema lookup**: O(V) in the tenant's version count
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    /// Schema versions per tenant, in insertion order.
    schemas: DashMap<String, Vec<StoredSchema>>,
    tuples: DashMap<String, HashSet<StoredTuple>>,
    attributes: DashMap<String, AttributeTable>,
}

impl MemoryDataStore {
    /// Creates a new in-memory data store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory data store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

/// Newest first: created_at DESC, then version DESC (ULIDs sort by time).
fn newest_first(a: &StoredSchema, b: &StoredSchema) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.version.cmp(&a.version))
}

#[async_trait]
impl DataStore for MemoryDataStore {
    #[instrument(skip(self, schema), fields(tenant_id = %schema.tenant_id, version = %schema.version))]
    async fn write_schema(&self, schema: StoredSchema) -> StorageResult<()> {
        validate_tenant_id(&schema.tenant_id)?;
        validate_identifier("version", &schema.version)?;

        let mut versions = self.schemas.entry(schema.tenant_id.clone()).or_default();
        if versions.iter().any(|s| s.version == schema.version) {
            return Err(StorageError::SchemaVersionExists {
                tenant_id: schema.tenant_id,
                version: schema.version,
            });
        }
        versions.push(schema);
        Ok(())
    }

    async fn get_schema(&self, tenant_id: &str, version: &str) -> StorageResult<StoredSchema> {
        self.schemas
            .get(tenant_id)
            .and_then(|versions| versions.iter().find(|s| s.version == version).cloned())
            .ok_or_else(|| StorageError::SchemaNotFound {
                tenant_id: tenant_id.to_string(),
                version: Some(version.to_string()),
            })
    }

    async fn get_latest_schema(&self, tenant_id: &str) -> StorageResult<StoredSchema> {
        self.schemas
            .get(tenant_id)
            .and_then(|versions| versions.iter().min_by(|a, b| newest_first(a, b)).cloned())
            .ok_or_else(|| StorageError::SchemaNotFound {
                tenant_id: tenant_id.to_string(),
                version: None,
            })
    }

    async fn list_schema_versions(&self, tenant_id: &str) -> StorageResult<Vec<String>> {
        let mut versions: Vec<StoredSchema> = self
            .schemas
            .get(tenant_id)
            .map(|v| v.value().clone())
            .unwrap_or_default();
        versions.sort_by(newest_first);
        Ok(versions.into_iter().map(|s| s.version).collect())
    }

    #[instrument(skip(self, tuples), fields(count = tuples.len()))]
    async fn write_tuples(&self, tenant_id: &str, tuples: Vec<StoredTuple>) -> StorageResult<()> {
        validate_tenant_id(tenant_id)?;
        for tuple in &tuples {
            validate_tuple(tuple)?;
        }

        let mut stored = self.tuples.entry(tenant_id.to_string()).or_default();
        stored.extend(tuples);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_tuples(&self, tenant_id: &str, filter: &TupleFilter) -> StorageResult<usize> {
        validate_tenant_id(tenant_id)?;
        if filter.is_empty() {
            return Err(StorageError::InvalidFilter {
                message: "delete requires at least one filter field".to_string(),
            });
        }

        let Some(mut stored) = self.tuples.get_mut(tenant_id) else {
            return Ok(0);
        };
        let before = stored.len();
        stored.retain(|t| !filter.matches(t));
        let removed = before - stored.len();
        debug!(removed, "deleted tuples");
        Ok(removed)
    }

    async fn read_tuples(
        &self,
        tenant_id: &str,
        filter: &TupleFilter,
    ) -> StorageResult<Vec<StoredTuple>> {
        let mut tuples: Vec<StoredTuple> = self
            .tuples
            .get(tenant_id)
            .map(|stored| stored.iter().filter(|t| filter.matches(t)).cloned().collect())
            .unwrap_or_default();
        tuples.sort();
        Ok(tuples)
    }

    #[instrument(skip(self, attributes), fields(count = attributes.len()))]
    async fn write_attributes(
        &self,
        tenant_id: &str,
        attributes: Vec<StoredAttribute>,
    ) -> StorageResult<()> {
        validate_tenant_id(tenant_id)?;
        for attribute in &attributes {
            validate_attribute(attribute)?;
        }

        let mut table = self.attributes.entry(tenant_id.to_string()).or_default();
        for attribute in attributes {
            table
                .entry((attribute.entity_type, attribute.entity_id))
                .or_default()
                .insert(attribute.name, attribute.value);
        }
        Ok(())
    }

    async fn delete_attributes(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
        name: Option<&str>,
    ) -> StorageResult<usize> {
        let Some(mut table) = self.attributes.get_mut(tenant_id) else {
            return Ok(0);
        };
        let key = (entity_type.to_string(), entity_id.to_string());
        let removed = match name {
            Some(name) => table
                .get_mut(&key)
                .and_then(|values| values.remove(name))
                .map_or(0, |_| 1),
            None => table.remove(&key).map_or(0, |values| values.len()),
        };
        Ok(removed)
    }

    async fn read_attributes(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> StorageResult<Vec<StoredAttribute>> {
        let key = (entity_type.to_string(), entity_id.to_string());
        Ok(self
            .attributes
            .get(tenant_id)
            .and_then(|table| {
                table.get(&key).map(|values| {
                    values
                        .iter()
                        .map(|(name, value)| StoredAttribute {
                            entity_type: entity_type.to_string(),
                            entity_id: entity_id.to_string(),
                            name: name.clone(),
                            value: value.clone(),
                        })
                        .collect()
                })
            })
            .unwrap_or_default())
    }
}
