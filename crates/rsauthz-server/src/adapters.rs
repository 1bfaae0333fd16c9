//! Adapters that bridge the storage layer to the domain layer.
//!
//! The domain resolver consumes three read traits (`RelationReader`,
//! `AttributeReader`, `SchemaReader`). The storage crate implements a single
//! `DataStore`. The adapters here implement the domain traits on top of any
//! `DataStore`, converting rows and errors at the boundary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::{debug, warn};

use rsauthz_domain::compile_schema;
use rsauthz_domain::error::{DomainError, DomainResult};
use rsauthz_domain::model::{AttributeValue, RelationFilter, RelationTuple, Schema};
use rsauthz_domain::resolver::{AttributeReader, RelationReader, SchemaReader};
use rsauthz_storage::{DataStore, StorageError, StoredSchema, StoredTuple, TupleFilter};

use crate::config::SchemaCacheSettings;

/// Maps a storage failure to the domain error the resolver reports.
pub fn storage_error(err: StorageError) -> DomainError {
    match err {
        StorageError::SchemaNotFound { tenant_id, version } => {
            DomainError::SchemaNotFound { tenant_id, version }
        }
        other => DomainError::Storage {
            message: other.to_string(),
        },
    }
}

pub fn to_domain_tuple(tuple: StoredTuple) -> RelationTuple {
    RelationTuple {
        entity_type: tuple.entity_type,
        entity_id: tuple.entity_id,
        relation: tuple.relation,
        subject_type: tuple.subject_type,
        subject_id: tuple.subject_id,
        subject_relation: tuple.subject_relation,
    }
}

pub fn to_stored_tuple(tuple: RelationTuple) -> StoredTuple {
    StoredTuple {
        entity_type: tuple.entity_type,
        entity_id: tuple.entity_id,
        relation: tuple.relation,
        subject_type: tuple.subject_type,
        subject_id: tuple.subject_id,
        // "" and None both mean a plain subject
        subject_relation: tuple.subject_relation.filter(|r| !r.is_empty()),
    }
}

pub fn to_tuple_filter(filter: &RelationFilter) -> TupleFilter {
    TupleFilter {
        entity_type: filter.entity_type.clone(),
        entity_id: filter.entity_id.clone(),
        relation: filter.relation.clone(),
        subject_type: filter.subject_type.clone(),
        subject_id: filter.subject_id.clone(),
    }
}

/// Adapter that implements `RelationReader` using a `DataStore`.
pub struct DataStoreRelationReader<S: ?Sized> {
    storage: Arc<S>,
}

impl<S: DataStore + ?Sized> DataStoreRelationReader<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: DataStore + ?Sized> RelationReader for DataStoreRelationReader<S> {
    async fn read_relations(
        &self,
        tenant_id: &str,
        filter: &RelationFilter,
    ) -> DomainResult<Vec<RelationTuple>> {
        let tuples = self
            .storage
            .read_tuples(tenant_id, &to_tuple_filter(filter))
            .await
            .map_err(storage_error)?;
        Ok(tuples.into_iter().map(to_domain_tuple).collect())
    }
}

/// Adapter that implements `AttributeReader` using a `DataStore`.
pub struct DataStoreAttributeReader<S: ?Sized> {
    storage: Arc<S>,
}

impl<S: DataStore + ?Sized> DataStoreAttributeReader<S> {
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: DataStore + ?Sized> AttributeReader for DataStoreAttributeReader<S> {
    async fn read_attributes(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
    ) -> DomainResult<HashMap<String, AttributeValue>> {
        let stored = self
            .storage
            .read_attributes(tenant_id, entity_type, entity_id)
            .await
            .map_err(storage_error)?;

        let mut attributes = HashMap::with_capacity(stored.len());
        for attribute in stored {
            match AttributeValue::from_json(attribute.value) {
                Some(value) => {
                    attributes.insert(attribute.name, value);
                }
                None => warn!(
                    entity_type,
                    entity_id,
                    attribute = %attribute.name,
                    "skipping stored attribute without a representable value"
                ),
            }
        }
        Ok(attributes)
    }
}

type SchemaKey = (String, String);

/// Adapter that implements `SchemaReader` using a `DataStore`.
///
/// Stored schemas are kept as DSL text and compiled on read. Compiled schemas
/// are cached per `(tenant, version)`; since versions are immutable a cached
/// entry never goes stale. The "latest" pointer is always read from storage so
/// a newly written version is visible on the next request.
pub struct DataStoreSchemaReader<S: ?Sized> {
    storage: Arc<S>,
    cache: Option<Cache<SchemaKey, Arc<Schema>>>,
}

impl<S: DataStore + ?Sized> DataStoreSchemaReader<S> {
    /// Creates an uncached reader; every call recompiles the stored DSL.
    pub fn new(storage: Arc<S>) -> Self {
        Self {
            storage,
            cache: None,
        }
    }

    /// Creates a reader with the compiled schema cache configured by `settings`.
    pub fn with_cache(storage: Arc<S>, settings: &SchemaCacheSettings) -> Self {
        let cache = settings.enabled.then(|| {
            Cache::builder()
                .max_capacity(settings.max_capacity)
                .time_to_live(Duration::from_secs(settings.ttl_secs))
                .build()
        });
        Self { storage, cache }
    }

    async fn compiled(&self, stored: StoredSchema) -> DomainResult<Arc<Schema>> {
        let key = (stored.tenant_id.clone(), stored.version.clone());
        if let Some(cache) = &self.cache {
            if let Some(schema) = cache.get(&key).await {
                return Ok(schema);
            }
        }

        let schema = Arc::new(compile_schema(
            &stored.tenant_id,
            &stored.version,
            &stored.dsl,
            stored.created_at,
        )?);

        if let Some(cache) = &self.cache {
            debug!(tenant_id = %key.0, version = %key.1, "caching compiled schema");
            cache.insert(key, Arc::clone(&schema)).await;
        }
        Ok(schema)
    }
}

#[async_trait]
impl<S: DataStore + ?Sized> SchemaReader for DataStoreSchemaReader<S> {
    async fn latest_schema(&self, tenant_id: &str) -> DomainResult<Arc<Schema>> {
        let stored = self
            .storage
            .get_latest_schema(tenant_id)
            .await
            .map_err(storage_error)?;
        self.compiled(stored).await
    }

    async fn schema_by_version(
        &self,
        tenant_id: &str,
        version: &str,
    ) -> DomainResult<Arc<Schema>> {
        if let Some(cache) = &self.cache {
            let key = (tenant_id.to_string(), version.to_string());
            if let Some(schema) = cache.get(&key).await {
                return Ok(schema);
            }
        }
        let stored = self
            .storage
            .get_schema(tenant_id, version)
            .await
            .map_err(storage_error)?;
        self.compiled(stored).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use rsauthz_storage::{MemoryDataStore, StorageResult, StoredAttribute};
    use serde_json::json;

    const DSL: &str = r#"
        entity user {}
        entity document {
            relation viewer @user
            attribute public bool
            permission view = viewer
        }
    "#;

    fn stored_schema(tenant_id: &str, version: &str, dsl: &str) -> StoredSchema {
        StoredSchema {
            tenant_id: tenant_id.to_string(),
            version: version.to_string(),
            dsl: dsl.to_string(),
            created_at: Utc::now(),
        }
    }

    /// Counts `get_schema` calls to observe cache hits.
    struct CountingStore {
        inner: MemoryDataStore,
        get_schema_calls: AtomicUsize,
    }

    #[async_trait]
    impl DataStore for CountingStore {
        async fn write_schema(&self, schema: StoredSchema) -> StorageResult<()> {
            self.inner.write_schema(schema).await
        }

        async fn get_schema(&self, tenant_id: &str, version: &str) -> StorageResult<StoredSchema> {
            self.get_schema_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_schema(tenant_id, version).await
        }

        async fn get_latest_schema(&self, tenant_id: &str) -> StorageResult<StoredSchema> {
            self.inner.get_latest_schema(tenant_id).await
        }

        async fn list_schema_versions(&self, tenant_id: &str) -> StorageResult<Vec<String>> {
            self.inner.list_schema_versions(tenant_id).await
        }

        async fn write_tuples(&self, tenant_id: &str, tuples: Vec<StoredTuple>) -> StorageResult<()> {
            self.inner.write_tuples(tenant_id, tuples).await
        }

        async fn delete_tuples(&self, tenant_id: &str, filter: &TupleFilter) -> StorageResult<usize> {
            self.inner.delete_tuples(tenant_id, filter).await
        }

        async fn read_tuples(
            &self,
            tenant_id: &str,
            filter: &TupleFilter,
        ) -> StorageResult<Vec<StoredTuple>> {
            self.inner.read_tuples(tenant_id, filter).await
        }

        async fn write_attributes(
            &self,
            tenant_id: &str,
            attributes: Vec<StoredAttribute>,
        ) -> StorageResult<()> {
            self.inner.write_attributes(tenant_id, attributes).await
        }

        async fn delete_attributes(
            &self,
            tenant_id: &str,
            entity_type: &str,
            entity_id: &str,
            name: Option<&str>,
        ) -> StorageResult<usize> {
            self.inner
                .delete_attributes(tenant_id, entity_type, entity_id, name)
                .await
        }

        async fn read_attributes(
            &self,
            tenant_id: &str,
            entity_type: &str,
            entity_id: &str,
        ) -> StorageResult<Vec<StoredAttribute>> {
            self.inner
                .read_attributes(tenant_id, entity_type, entity_id)
                .await
        }
    }

    #[tokio::test]
    async fn test_relation_reader_converts_tuples_and_filters() {
        let storage = MemoryDataStore::new_shared();
        storage
            .write_tuples(
                "t1",
                vec![
                    to_stored_tuple(RelationTuple::new("document", "d1", "viewer", "user", "alice")),
                    to_stored_tuple(
                        RelationTuple::new("document", "d1", "viewer", "group", "eng")
                            .with_subject_relation("member"),
                    ),
                    to_stored_tuple(RelationTuple::new("document", "d2", "viewer", "user", "bob")),
                ],
            )
            .await
            .unwrap();

        let reader = DataStoreRelationReader::new(storage);
        let tuples = reader
            .read_relations("t1", &RelationFilter::new().entity("document", "d1"))
            .await
            .unwrap();

        assert_eq!(tuples.len(), 2);
        assert!(tuples.iter().any(|t| t.is_userset() && t.subject_id == "eng"));
        assert!(tuples.iter().all(|t| t.entity_id == "d1"));
    }

    #[test]
    fn test_empty_subject_relation_is_stored_as_plain_subject() {
        let tuple = RelationTuple::new("document", "d1", "viewer", "user", "alice")
            .with_subject_relation("");
        assert_eq!(to_stored_tuple(tuple).subject_relation, None);
    }

    #[tokio::test]
    async fn test_attribute_reader_converts_json_values() {
        let storage = MemoryDataStore::new_shared();
        storage
            .write_attributes(
                "t1",
                vec![
                    StoredAttribute {
                        entity_type: "document".to_string(),
                        entity_id: "d1".to_string(),
                        name: "public".to_string(),
                        value: json!(true),
                    },
                    StoredAttribute {
                        entity_type: "document".to_string(),
                        entity_id: "d1".to_string(),
                        name: "tags".to_string(),
                        value: json!(["a", "b"]),
                    },
                ],
            )
            .await
            .unwrap();

        let reader = DataStoreAttributeReader::new(storage);
        let attributes = reader.read_attributes("t1", "document", "d1").await.unwrap();
        assert_eq!(attributes["public"], AttributeValue::Bool(true));
        assert_eq!(
            attributes["tags"],
            AttributeValue::List(vec!["a".into(), "b".into()])
        );

        let missing = reader.read_attributes("t1", "document", "d9").await.unwrap();
        assert!(missing.is_empty());
    }

    #[tokio::test]
    async fn test_schema_reader_maps_missing_schema() {
        let reader = DataStoreSchemaReader::new(MemoryDataStore::new_shared());
        let err = reader.latest_schema("nobody").await.unwrap_err();
        assert!(matches!(
            err,
            DomainError::SchemaNotFound { ref tenant_id, version: None } if tenant_id == "nobody"
        ));

        let err = reader.schema_by_version("nobody", "v1").await.unwrap_err();
        assert!(matches!(err, DomainError::SchemaNotFound { version: Some(_), .. }));
    }

    #[tokio::test]
    async fn test_schema_reader_compiles_latest_version() {
        let storage = MemoryDataStore::new_shared();
        storage
            .write_schema(stored_schema("t1", "v1", "entity user {}"))
            .await
            .unwrap();
        storage.write_schema(stored_schema("t1", "v2", DSL)).await.unwrap();

        let reader = DataStoreSchemaReader::new(storage);
        let latest = reader.latest_schema("t1").await.unwrap();
        assert_eq!(latest.version, "v2");
        assert!(latest.entity("document").is_some());

        let older = reader.schema_by_version("t1", "v1").await.unwrap();
        assert!(older.entity("document").is_none());
    }

    #[tokio::test]
    async fn test_cached_versions_skip_storage() {
        let storage = Arc::new(CountingStore {
            inner: MemoryDataStore::new(),
            get_schema_calls: AtomicUsize::new(0),
        });
        storage.write_schema(stored_schema("t1", "v1", DSL)).await.unwrap();

        let reader = DataStoreSchemaReader::with_cache(
            Arc::clone(&storage),
            &SchemaCacheSettings::default(),
        );

        let first = reader.schema_by_version("t1", "v1").await.unwrap();
        let second = reader.schema_by_version("t1", "v1").await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(storage.get_schema_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_reads_storage_every_time() {
        let storage = Arc::new(CountingStore {
            inner: MemoryDataStore::new(),
            get_schema_calls: AtomicUsize::new(0),
        });
        storage.write_schema(stored_schema("t1", "v1", DSL)).await.unwrap();

        let settings = SchemaCacheSettings {
            enabled: false,
            ..Default::default()
        };
        let reader = DataStoreSchemaReader::with_cache(Arc::clone(&storage), &settings);

        reader.schema_by_version("t1", "v1").await.unwrap();
        reader.schema_by_version("t1", "v1").await.unwrap();
        assert_eq!(storage.get_schema_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_latest_pointer_sees_new_versions_with_cache() {
        let storage = MemoryDataStore::new_shared();
        storage
            .write_schema(stored_schema("t1", "v1", "entity user {}"))
            .await
            .unwrap();
        let reader = DataStoreSchemaReader::with_cache(
            Arc::clone(&storage),
            &SchemaCacheSettings::default(),
        );
        assert_eq!(reader.latest_schema("t1").await.unwrap().version, "v1");

        storage.write_schema(stored_schema("t1", "v2", DSL)).await.unwrap();
        assert_eq!(reader.latest_schema("t1").await.unwrap().version, "v2");
    }
}
