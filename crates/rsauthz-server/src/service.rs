//! Engine-level API: schema management, data seeding and permission queries.
//!
//! `AuthzService` wires the domain resolver (checker, expander, lookup) to a
//! `DataStore` through the adapters in [`crate::adapters`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, instrument};
use ulid::Ulid;

use rsauthz_domain::cel::CelEvaluator;
use rsauthz_domain::compile_schema;
use rsauthz_domain::error::DomainError;
use rsauthz_domain::model::{Attribute, RelationFilter, RelationTuple, Schema};
use rsauthz_domain::resolver::{
    CheckRequest, CheckResult, Checker, Evaluator, ExpandRequest, ExpandResult, Expander,
    ExpressionEvaluator, LookupEntityRequest, LookupEntityResult, LookupSubjectRequest,
    LookupSubjectResult, Lookup, SchemaReader, SubjectPermissionRequest,
    SubjectPermissionResult,
};
use rsauthz_storage::{DataStore, MemoryDataStore, StorageError, StoredAttribute, StoredSchema};

use crate::adapters::{
    to_stored_tuple, to_tuple_filter, DataStoreAttributeReader,
    DataStoreRelationReader, DataStoreSchemaReader,
};
use crate::config::{ConfigLoadError, ServerConfig};

type Relations<S> = DataStoreRelationReader<S>;
type Attributes<S> = DataStoreAttributeReader<S>;
type Schemas<S> = DataStoreSchemaReader<S>;

/// Errors returned by [`AuthzService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A relationship does not fit the tenant's latest schema.
    #[error("invalid relationship {tuple}: {reason}")]
    InvalidRelationship { tuple: String, reason: String },

    /// An attribute is undeclared or its value does not match the declared type.
    #[error("invalid attribute {entity_type}:{entity_id}.{name}: {reason}")]
    InvalidAttribute {
        entity_type: String,
        entity_id: String,
        name: String,
        reason: String,
    },
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        match self {
            ServiceError::Domain(e) => e.is_not_found(),
            ServiceError::Storage(StorageError::SchemaNotFound { .. }) => true,
            _ => false,
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Authorization service over a `DataStore`.
pub struct AuthzService<S: DataStore + ?Sized> {
    storage: Arc<S>,
    schemas: Arc<Schemas<S>>,
    checker: Arc<Checker<Relations<S>, Attributes<S>, Schemas<S>>>,
    expander: Expander<Relations<S>, Schemas<S>>,
    lookup: Lookup<Relations<S>, Attributes<S>, Schemas<S>>,
}

impl AuthzService<dyn DataStore> {
    /// Builds a service with the storage backend named in the configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Self, ConfigLoadError> {
        config.validate()?;
        let storage: Arc<dyn DataStore> = match config.storage.backend.as_str() {
            "memory" => MemoryDataStore::new_shared(),
            other => {
                return Err(ConfigLoadError::Invalid {
                    message: format!("unsupported storage backend: {other}"),
                })
            }
        };
        Ok(Self::new(storage, config))
    }
}

impl<S: DataStore + ?Sized> AuthzService<S> {
    /// Creates a service evaluating attribute rules with the CEL engine.
    pub fn new(storage: Arc<S>, config: &ServerConfig) -> Self {
        Self::with_expressions(storage, config, Arc::new(CelEvaluator::new()))
    }

    pub fn with_expressions(
        storage: Arc<S>,
        config: &ServerConfig,
        expressions: Arc<dyn ExpressionEvaluator>,
    ) -> Self {
        let resolver_config = config.resolver_config();
        let relations = Arc::new(DataStoreRelationReader::new(Arc::clone(&storage)));
        let attributes = Arc::new(DataStoreAttributeReader::new(Arc::clone(&storage)));
        let schemas = Arc::new(DataStoreSchemaReader::with_cache(
            Arc::clone(&storage),
            &config.schema_cache,
        ));

        let evaluator = Arc::new(Evaluator::new(
            Arc::clone(&relations),
            attributes,
            expressions,
            resolver_config.clone(),
        ));
        let checker = Arc::new(Checker::new(evaluator, Arc::clone(&schemas)));
        let expander = Expander::new(relations, Arc::clone(&schemas), resolver_config);
        let lookup = Lookup::new(Arc::clone(&checker));

        Self {
            storage,
            schemas,
            checker,
            expander,
            lookup,
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    // Schema operations

    /// Compiles `dsl` and stores it as a new immutable version.
    ///
    /// Returns the new version id. Nothing is stored when the DSL has parse or
    /// validation errors.
    #[instrument(skip(self, dsl))]
    pub async fn write_schema(&self, tenant_id: &str, dsl: &str) -> ServiceResult<String> {
        require_tenant(tenant_id)?;
        let version = Ulid::new().to_string();
        let created_at = Utc::now();
        let schema = compile_schema(tenant_id, &version, dsl, created_at)?;

        self.storage
            .write_schema(StoredSchema {
                tenant_id: tenant_id.to_string(),
                version: version.clone(),
                dsl: dsl.to_string(),
                created_at,
            })
            .await?;

        info!(
            tenant_id,
            version = %version,
            entities = schema.entities.len(),
            "schema version written"
        );
        Ok(version)
    }

    /// Reads a compiled schema; the latest version when `version` is `None`.
    pub async fn read_schema(
        &self,
        tenant_id: &str,
        version: Option<&str>,
    ) -> ServiceResult<Arc<Schema>> {
        require_tenant(tenant_id)?;
        let schema = match version.filter(|v| !v.is_empty()) {
            Some(version) => self.schemas.schema_by_version(tenant_id, version).await?,
            None => self.schemas.latest_schema(tenant_id).await?,
        };
        Ok(schema)
    }

    /// Schema versions of the tenant, newest first.
    pub async fn schema_versions(&self, tenant_id: &str) -> ServiceResult<Vec<String>> {
        require_tenant(tenant_id)?;
        Ok(self.storage.list_schema_versions(tenant_id).await?)
    }

    // Data operations

    /// Stores relationships after checking them against the latest schema.
    ///
    /// The batch is rejected as a whole if any tuple does not fit.
    #[instrument(skip(self, tuples), fields(count = tuples.len()))]
    pub async fn write_relationships(
        &self,
        tenant_id: &str,
        tuples: Vec<RelationTuple>,
    ) -> ServiceResult<()> {
        let schema = self.read_schema(tenant_id, None).await?;
        for tuple in &tuples {
            check_relationship(&schema, tuple)?;
        }
        self.storage
            .write_tuples(tenant_id, tuples.into_iter().map(to_stored_tuple).collect())
            .await?;
        Ok(())
    }

    /// Deletes every relationship matching `filter`; returns the number removed.
    pub async fn delete_relationships(
        &self,
        tenant_id: &str,
        filter: &RelationFilter,
    ) -> ServiceResult<usize> {
        require_tenant(tenant_id)?;
        Ok(self
            .storage
            .delete_tuples(tenant_id, &to_tuple_filter(filter))
            .await?)
    }

    /// Stores attribute values after checking them against the latest schema.
    #[instrument(skip(self, attributes), fields(count = attributes.len()))]
    pub async fn write_attributes(
        &self,
        tenant_id: &str,
        attributes: Vec<Attribute>,
    ) -> ServiceResult<()> {
        let schema = self.read_schema(tenant_id, None).await?;
        for attribute in &attributes {
            check_attribute(&schema, attribute)?;
        }
        let stored = attributes
            .into_iter()
            .map(|a| StoredAttribute {
                value: a.value.to_json(),
                entity_type: a.entity_type,
                entity_id: a.entity_id,
                name: a.name,
            })
            .collect();
        self.storage.write_attributes(tenant_id, stored).await?;
        Ok(())
    }

    /// Deletes one attribute of an entity instance, or all of them when `name` is `None`.
    pub async fn delete_attributes(
        &self,
        tenant_id: &str,
        entity_type: &str,
        entity_id: &str,
        name: Option<&str>,
    ) -> ServiceResult<usize> {
        require_tenant(tenant_id)?;
        Ok(self
            .storage
            .delete_attributes(tenant_id, entity_type, entity_id, name)
            .await?)
    }

    // Permission queries

    pub async fn check(&self, request: &CheckRequest) -> ServiceResult<CheckResult> {
        Ok(self.checker.check(request).await?)
    }

    /// Checks several permissions at once; per-permission failures read as `false`.
    pub async fn check_multiple(
        &self,
        request: &CheckRequest,
        permissions: &[String],
    ) -> ServiceResult<BTreeMap<String, bool>> {
        Ok(self.checker.check_multiple(request, permissions).await?)
    }

    pub async fn subject_permission(
        &self,
        request: &SubjectPermissionRequest,
    ) -> ServiceResult<SubjectPermissionResult> {
        Ok(self.checker.subject_permission(request).await?)
    }

    pub async fn expand(&self, request: &ExpandRequest) -> ServiceResult<ExpandResult> {
        Ok(self.expander.expand(request).await?)
    }

    pub async fn lookup_entity(
        &self,
        request: &LookupEntityRequest,
    ) -> ServiceResult<LookupEntityResult> {
        Ok(self.lookup.lookup_entity(request).await?)
    }

    pub async fn lookup_subject(
        &self,
        request: &LookupSubjectRequest,
    ) -> ServiceResult<LookupSubjectResult> {
        Ok(self.lookup.lookup_subject(request).await?)
    }
}

fn require_tenant(tenant_id: &str) -> Result<(), DomainError> {
    if tenant_id.trim().is_empty() {
        return Err(DomainError::InvalidRequest {
            field: "tenant_id".to_string(),
            reason: "cannot be empty".to_string(),
        });
    }
    Ok(())
}

fn check_relationship(schema: &Schema, tuple: &RelationTuple) -> ServiceResult<()> {
    let reject = |reason: String| ServiceError::InvalidRelationship {
        tuple: tuple.to_string(),
        reason,
    };

    let entity = schema
        .entity(&tuple.entity_type)
        .ok_or_else(|| reject(format!("entity type '{}' is not declared", tuple.entity_type)))?;
    let relation = entity.relation(&tuple.relation).ok_or_else(|| {
        reject(format!(
            "relation '{}' is not declared on '{}'",
            tuple.relation, tuple.entity_type
        ))
    })?;

    let subject_relation = tuple.subject_relation.as_deref().filter(|r| !r.is_empty());
    if !relation.allows_subject(&tuple.subject_type, subject_relation) {
        let subject = match subject_relation {
            Some(rel) => format!("{}#{}", tuple.subject_type, rel),
            None => tuple.subject_type.clone(),
        };
        return Err(reject(format!(
            "subject '{subject}' is not allowed on {}#{}",
            tuple.entity_type, tuple.relation
        )));
    }
    Ok(())
}

fn check_attribute(schema: &Schema, attribute: &Attribute) -> ServiceResult<()> {
    let reject = |reason: String| ServiceError::InvalidAttribute {
        entity_type: attribute.entity_type.clone(),
        entity_id: attribute.entity_id.clone(),
        name: attribute.name.clone(),
        reason,
    };

    let declared = schema
        .entity(&attribute.entity_type)
        .ok_or_else(|| reject("entity type is not declared".to_string()))?
        .attribute(&attribute.name)
        .ok_or_else(|| reject("attribute is not declared".to_string()))?;

    if !attribute.value.conforms_to(declared.attribute_type) {
        return Err(reject(format!(
            "value does not match declared type {}",
            declared.attribute_type
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsauthz_domain::model::AttributeValue;
    use rsauthz_domain::resolver::ExpandNode;

    const DSL: &str = r#"
entity user {}

entity team {
    relation member @user
}

entity document {
    relation owner @user
    relation viewer @user @team#member

    attribute public bool
    attribute tags string[]

    permission edit = owner
    permission view = edit or viewer or rule(resource.public == true)
}
"#;

    async fn service_with_schema() -> AuthzService<dyn DataStore> {
        let service = AuthzService::from_config(&ServerConfig::default()).unwrap();
        service.write_schema("t1", DSL).await.unwrap();
        service
    }

    fn tuple(value: &str) -> RelationTuple {
        RelationTuple::parse(value).unwrap()
    }

    #[test]
    fn test_from_config_rejects_invalid_config() {
        let mut config = ServerConfig::default();
        config.storage.backend = "rocksdb".to_string();
        assert!(matches!(
            AuthzService::from_config(&config),
            Err(ConfigLoadError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_schema_returns_new_versions() {
        let service = AuthzService::from_config(&ServerConfig::default()).unwrap();
        let v1 = service.write_schema("t1", "entity user {}").await.unwrap();
        let v2 = service.write_schema("t1", DSL).await.unwrap();
        assert_ne!(v1, v2);

        let latest = service.read_schema("t1", None).await.unwrap();
        assert_eq!(latest.version, v2);

        // Older versions stay readable and unchanged
        let old = service.read_schema("t1", Some(&v1)).await.unwrap();
        assert_eq!(old.dsl, "entity user {}");
        assert_eq!(service.schema_versions("t1").await.unwrap(), vec![v2, v1]);
    }

    #[tokio::test]
    async fn test_write_schema_rejects_invalid_dsl_without_storing() {
        let service = AuthzService::from_config(&ServerConfig::default()).unwrap();

        let err = service
            .write_schema("t1", "entity document { relation owner @nobody }")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::SchemaValidation { .. })
        ));

        let err = service.write_schema("t1", "entity {").await.unwrap_err();
        assert!(matches!(err, ServiceError::Domain(DomainError::SchemaParse { .. })));

        let err = service.read_schema("t1", None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_write_schema_requires_tenant() {
        let service = AuthzService::from_config(&ServerConfig::default()).unwrap();
        let err = service.write_schema(" ", DSL).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Domain(DomainError::InvalidRequest { .. })
        ));
    }

    #[tokio::test]
    async fn test_write_relationships_type_checks_against_latest_schema() {
        let service = service_with_schema().await;

        service
            .write_relationships(
                "t1",
                vec![
                    tuple("document:d1#owner@user:alice"),
                    tuple("document:d1#viewer@team:eng#member"),
                ],
            )
            .await
            .unwrap();

        for bad in [
            "folder:f1#owner@user:alice",
            "document:d1#editor@user:alice",
            "document:d1#owner@team:eng",
            "document:d1#viewer@team:eng#owner",
        ] {
            let err = service
                .write_relationships("t1", vec![tuple(bad)])
                .await
                .unwrap_err();
            assert!(
                matches!(err, ServiceError::InvalidRelationship { .. }),
                "{bad} should be rejected, got {err:?}"
            );
        }

        // A rejected batch stores nothing
        let err = service
            .write_relationships(
                "t1",
                vec![
                    tuple("document:d2#owner@user:bob"),
                    tuple("document:d2#nope@user:bob"),
                ],
            )
            .await;
        assert!(err.is_err());
        let removed = service
            .delete_relationships("t1", &RelationFilter::new().entity("document", "d2"))
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_write_relationships_without_schema_is_not_found() {
        let service = AuthzService::from_config(&ServerConfig::default()).unwrap();
        let err = service
            .write_relationships("t1", vec![tuple("document:d1#owner@user:alice")])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_write_attributes_checks_declared_types() {
        let service = service_with_schema().await;

        service
            .write_attributes(
                "t1",
                vec![
                    Attribute::new("document", "d1", "public", true),
                    Attribute::new(
                        "document",
                        "d1",
                        "tags",
                        AttributeValue::List(vec!["a".into()]),
                    ),
                ],
            )
            .await
            .unwrap();

        let err = service
            .write_attributes("t1", vec![Attribute::new("document", "d1", "public", "yes")])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidAttribute { .. }));

        let err = service
            .write_attributes("t1", vec![Attribute::new("document", "d1", "owner_age", 3i64)])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidAttribute { .. }));

        assert_eq!(
            service
                .delete_attributes("t1", "document", "d1", Some("tags"))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_queries_delegate_to_resolver() {
        let service = service_with_schema().await;
        service
            .write_relationships(
                "t1",
                vec![
                    tuple("document:d1#owner@user:alice"),
                    tuple("document:d2#viewer@user:bob"),
                ],
            )
            .await
            .unwrap();
        service
            .write_attributes("t1", vec![Attribute::new("document", "d3", "public", true)])
            .await
            .unwrap();

        let request = CheckRequest::new("t1", "document", "d1", "edit", "user", "alice");
        assert!(service.check(&request).await.unwrap().allowed);

        let multiple = service
            .check_multiple(&request, &["edit".to_string(), "view".to_string()])
            .await
            .unwrap();
        assert_eq!(multiple.get("edit"), Some(&true));
        assert_eq!(multiple.get("view"), Some(&true));

        let permissions = service
            .subject_permission(&SubjectPermissionRequest::new(
                "t1", "document", "d2", "user", "bob",
            ))
            .await
            .unwrap();
        assert_eq!(permissions.permissions.get("edit"), Some(&false));
        assert_eq!(permissions.permissions.get("view"), Some(&true));

        let expanded = service
            .expand(&ExpandRequest::new("t1", "document", "d1", "edit"))
            .await
            .unwrap();
        assert!(matches!(expanded.tree, ExpandNode::Union { .. }));

        let entities = service
            .lookup_entity(&LookupEntityRequest::new(
                "t1", "document", "view", "user", "bob",
            ))
            .await
            .unwrap();
        // d2 via viewer, d3 via the public attribute is not a tuple candidate
        assert_eq!(entities.entity_ids, vec!["d2".to_string()]);

        let subjects = service
            .lookup_subject(&LookupSubjectRequest::new(
                "t1", "document", "d1", "view", "user",
            ))
            .await
            .unwrap();
        assert_eq!(subjects.subject_ids, vec!["alice".to_string()]);
    }
}
