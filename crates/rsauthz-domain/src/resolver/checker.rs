//! Permission check entry point.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{DomainError, DomainResult};
use crate::model::Schema;

use super::evaluator::Evaluator;
use super::traits::{resolve_schema, AttributeReader, RelationReader, SchemaReader};
use super::types::{
    CheckRequest, CheckResult, EvaluationRequest, SubjectPermissionRequest,
    SubjectPermissionResult,
};

/// Validates check requests, resolves the schema, and delegates to the [`Evaluator`].
pub struct Checker<R, A, S> {
    evaluator: Arc<Evaluator<R, A>>,
    schemas: Arc<S>,
}

impl<R, A, S> Checker<R, A, S>
where
    R: RelationReader + 'static,
    A: AttributeReader + 'static,
    S: SchemaReader + 'static,
{
    pub fn new(evaluator: Arc<Evaluator<R, A>>, schemas: Arc<S>) -> Self {
        Self { evaluator, schemas }
    }

    pub fn evaluator(&self) -> &Arc<Evaluator<R, A>> {
        &self.evaluator
    }

    pub(crate) fn schemas(&self) -> &Arc<S> {
        &self.schemas
    }

    /// Checks whether the subject holds `request.permission` on the entity.
    pub async fn check(&self, request: &CheckRequest) -> DomainResult<CheckResult> {
        request.validate()?;

        let config = self.evaluator.config();
        let check = async {
            let schema = resolve_schema(
                self.schemas.as_ref(),
                &request.tenant_id,
                request.schema_version.as_deref(),
            )
            .await?;
            self.check_in_schema(&schema, request).await
        };

        let allowed = match timeout(config.timeout, check).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DomainError::Timeout {
                    duration_ms: config.timeout_ms(),
                })
            }
        };
        Ok(CheckResult { allowed })
    }

    /// Runs one check against an already resolved schema.
    ///
    /// Fails with `EntityNotFound`/`PermissionNotFound` when the request names
    /// something the schema does not declare.
    pub(crate) async fn check_in_schema(
        &self,
        schema: &Schema,
        request: &CheckRequest,
    ) -> DomainResult<bool> {
        let entity =
            schema
                .entity(&request.entity_type)
                .ok_or_else(|| DomainError::EntityNotFound {
                    entity_type: request.entity_type.clone(),
                })?;
        let permission = entity.permission(&request.permission).ok_or_else(|| {
            DomainError::PermissionNotFound {
                entity_type: request.entity_type.clone(),
                permission: request.permission.clone(),
            }
        })?;

        let evaluation = EvaluationRequest {
            tenant_id: request.tenant_id.clone(),
            schema_version: schema.version.clone(),
            entity_type: request.entity_type.clone(),
            entity_id: request.entity_id.clone(),
            subject_type: request.subject_type.clone(),
            subject_id: request.subject_id.clone(),
            contextual_tuples: Arc::new(request.contextual_tuples.clone()),
            context: Arc::new(request.context.clone()),
            depth: 0,
        };

        let allowed = self
            .evaluator
            .evaluate_rule(schema, &evaluation, &permission.rule)
            .await
            .map_err(|e| {
                e.in_evaluation(&request.entity_type, &request.entity_id, &request.permission)
            })?;
        debug!(
            tenant_id = %request.tenant_id,
            version = %schema.version,
            entity = %format_args!("{}:{}", request.entity_type, request.entity_id),
            permission = %request.permission,
            subject = %format_args!("{}:{}", request.subject_type, request.subject_id),
            allowed,
            "check evaluated"
        );
        Ok(allowed)
    }

    /// Checks several permissions for the same entity and subject.
    ///
    /// `request.permission` is ignored. A failing permission is reported as
    /// `false`; only schema resolution failures fail the whole call.
    pub async fn check_multiple(
        &self,
        request: &CheckRequest,
        permissions: &[String],
    ) -> DomainResult<BTreeMap<String, bool>> {
        let config = self.evaluator.config();
        let run = async {
            let schema = resolve_schema(
                self.schemas.as_ref(),
                &request.tenant_id,
                request.schema_version.as_deref(),
            )
            .await?;
            Ok::<_, DomainError>(self.check_each(&schema, request, permissions).await)
        };

        match timeout(config.timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::Timeout {
                duration_ms: config.timeout_ms(),
            }),
        }
    }

    /// Evaluates every permission declared on the entity type for one subject.
    pub async fn subject_permission(
        &self,
        request: &SubjectPermissionRequest,
    ) -> DomainResult<SubjectPermissionResult> {
        request.validate()?;

        let config = self.evaluator.config();
        let template = request.check_request("");
        let run = async {
            let schema = resolve_schema(
                self.schemas.as_ref(),
                &request.tenant_id,
                request.schema_version.as_deref(),
            )
            .await?;
            let entity =
                schema
                    .entity(&request.entity_type)
                    .ok_or_else(|| DomainError::EntityNotFound {
                        entity_type: request.entity_type.clone(),
                    })?;
            let names: Vec<String> = entity.permissions.iter().map(|p| p.name.clone()).collect();
            Ok::<_, DomainError>(self.check_each(&schema, &template, &names).await)
        };

        let permissions = match timeout(config.timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DomainError::Timeout {
                    duration_ms: config.timeout_ms(),
                })
            }
        };
        Ok(SubjectPermissionResult { permissions })
    }

    async fn check_each(
        &self,
        schema: &Schema,
        request: &CheckRequest,
        permissions: &[String],
    ) -> BTreeMap<String, bool> {
        let checks = permissions.iter().map(|permission| async move {
            let single = CheckRequest {
                permission: permission.clone(),
                ..request.clone()
            };
            let allowed = match single.validate() {
                Ok(()) => self.check_in_schema(schema, &single).await,
                Err(e) => Err(e),
            };
            let allowed = allowed.unwrap_or_else(|e| {
                warn!(
                    permission = %permission,
                    error = %e,
                    "permission check failed, treating as denied"
                );
                false
            });
            (permission.clone(), allowed)
        });
        join_all(checks).await.into_iter().collect()
    }
}
