//! Reverse queries: entities a subject can access and subjects that can access
//! an entity.
//!
//! Both enumerate every ID observed in stored (and contextual) tuples, sort
//! them, and run a check per candidate. Page tokens mean "resume scanning
//! strictly after this candidate ID".

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::{DomainError, DomainResult};
use crate::model::{RelationFilter, RelationTuple, Schema};

use super::checker::Checker;
use super::traits::{resolve_schema, AttributeReader, RelationReader, SchemaReader};
use super::types::{
    require, CheckRequest, LookupEntityRequest, LookupEntityResult, LookupSubjectRequest,
    LookupSubjectResult,
};

/// Brute-force lookup on top of a [`Checker`].
pub struct Lookup<R, A, S> {
    checker: Arc<Checker<R, A, S>>,
}

/// One page of allowed IDs.
struct Page {
    ids: Vec<String>,
    next_page_token: Option<String>,
}

impl<R, A, S> Lookup<R, A, S>
where
    R: RelationReader + 'static,
    A: AttributeReader + 'static,
    S: SchemaReader + 'static,
{
    pub fn new(checker: Arc<Checker<R, A, S>>) -> Self {
        Self { checker }
    }

    /// Entities of `request.entity_type` on which the subject holds the permission.
    pub async fn lookup_entity(
        &self,
        request: &LookupEntityRequest,
    ) -> DomainResult<LookupEntityResult> {
        require("tenant_id", &request.tenant_id)?;
        require("entity_type", &request.entity_type)?;
        require("permission", &request.permission)?;
        require("subject_type", &request.subject_type)?;
        require("subject_id", &request.subject_id)?;

        let run = async {
            let schema = self.schema_with_permission(
                &request.tenant_id,
                request.schema_version.as_deref(),
                &request.entity_type,
                &request.permission,
            )
            .await?;

            let filter = RelationFilter::new().entity_type(&request.entity_type);
            let candidates = self
                .candidates(&request.tenant_id, &filter, &request.contextual_tuples, |t| {
                    Some(t.entity_id.clone())
                })
                .await?;

            let template = CheckRequest {
                tenant_id: request.tenant_id.clone(),
                schema_version: request.schema_version.clone(),
                entity_type: request.entity_type.clone(),
                entity_id: String::new(),
                permission: request.permission.clone(),
                subject_type: request.subject_type.clone(),
                subject_id: request.subject_id.clone(),
                contextual_tuples: request.contextual_tuples.clone(),
                context: request.context.clone(),
            };
            self.scan(
                &schema,
                candidates,
                request.page_size,
                request.page_token.as_deref(),
                |id| CheckRequest {
                    entity_id: id.to_string(),
                    ..template.clone()
                },
            )
            .await
        };

        let page = self.with_timeout(run).await?;
        Ok(LookupEntityResult {
            entity_ids: page.ids,
            next_page_token: page.next_page_token,
        })
    }

    /// Subjects of `request.subject_type` holding the permission on the entity.
    pub async fn lookup_subject(
        &self,
        request: &LookupSubjectRequest,
    ) -> DomainResult<LookupSubjectResult> {
        require("tenant_id", &request.tenant_id)?;
        require("entity_type", &request.entity_type)?;
        require("entity_id", &request.entity_id)?;
        require("permission", &request.permission)?;
        require("subject_type", &request.subject_type)?;

        let run = async {
            let schema = self.schema_with_permission(
                &request.tenant_id,
                request.schema_version.as_deref(),
                &request.entity_type,
                &request.permission,
            )
            .await?;

            // Userset subjects are groups, not candidates.
            let filter = RelationFilter::new().subject_type(&request.subject_type);
            let candidates = self
                .candidates(&request.tenant_id, &filter, &request.contextual_tuples, |t| {
                    (!t.is_userset()).then(|| t.subject_id.clone())
                })
                .await?;

            let template = CheckRequest {
                tenant_id: request.tenant_id.clone(),
                schema_version: request.schema_version.clone(),
                entity_type: request.entity_type.clone(),
                entity_id: request.entity_id.clone(),
                permission: request.permission.clone(),
                subject_type: request.subject_type.clone(),
                subject_id: String::new(),
                contextual_tuples: request.contextual_tuples.clone(),
                context: request.context.clone(),
            };
            self.scan(
                &schema,
                candidates,
                request.page_size,
                request.page_token.as_deref(),
                |id| CheckRequest {
                    subject_id: id.to_string(),
                    ..template.clone()
                },
            )
            .await
        };

        let page = self.with_timeout(run).await?;
        Ok(LookupSubjectResult {
            subject_ids: page.ids,
            next_page_token: page.next_page_token,
        })
    }

    async fn with_timeout<F>(&self, run: F) -> DomainResult<Page>
    where
        F: std::future::Future<Output = DomainResult<Page>>,
    {
        let config = self.checker.evaluator().config();
        match timeout(config.timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(DomainError::Timeout {
                duration_ms: config.timeout_ms(),
            }),
        }
    }

    async fn schema_with_permission(
        &self,
        tenant_id: &str,
        version: Option<&str>,
        entity_type: &str,
        permission: &str,
    ) -> DomainResult<Arc<Schema>> {
        let schema = resolve_schema(self.checker.schemas().as_ref(), tenant_id, version).await?;
        let entity = schema
            .entity(entity_type)
            .ok_or_else(|| DomainError::EntityNotFound {
                entity_type: entity_type.to_string(),
            })?;
        if entity.permission(permission).is_none() {
            return Err(DomainError::PermissionNotFound {
                entity_type: entity_type.to_string(),
                permission: permission.to_string(),
            });
        }
        Ok(schema)
    }

    /// Sorted, distinct IDs extracted from stored and contextual tuples matching `filter`.
    async fn candidates(
        &self,
        tenant_id: &str,
        filter: &RelationFilter,
        contextual_tuples: &[RelationTuple],
        extract: impl Fn(&RelationTuple) -> Option<String>,
    ) -> DomainResult<BTreeSet<String>> {
        let stored = self
            .checker
            .evaluator()
            .relations()
            .read_relations(tenant_id, filter)
            .await?;

        Ok(stored
            .iter()
            .chain(contextual_tuples.iter().filter(|t| filter.matches(t)))
            .filter_map(extract)
            .collect())
    }

    /// Checks candidates in order after `page_token` until `page_size` are allowed.
    async fn scan(
        &self,
        schema: &Schema,
        candidates: BTreeSet<String>,
        page_size: u32,
        page_token: Option<&str>,
        to_request: impl Fn(&str) -> CheckRequest,
    ) -> DomainResult<Page> {
        let page_size = match page_size {
            0 => self.checker.evaluator().config().default_page_size,
            n => n,
        } as usize;
        let concurrency = self.checker.evaluator().config().lookup_concurrency;

        let remaining: Vec<String> = candidates
            .into_iter()
            .filter(|id| page_token.map_or(true, |token| id.as_str() > token))
            .collect();
        let total = remaining.len();

        let mut checks = stream::iter(remaining.iter())
            .map(|id| {
                let request = to_request(id);
                async move {
                    let allowed = self
                        .checker
                        .check_in_schema(schema, &request)
                        .await
                        .unwrap_or_else(|e| {
                            warn!(candidate = %id, error = %e, "lookup candidate check failed");
                            false
                        });
                    (id, allowed)
                }
            })
            .buffered(concurrency);

        let mut ids = Vec::new();
        let mut examined = 0;
        let mut last_examined = None;
        while let Some((id, allowed)) = checks.next().await {
            examined += 1;
            last_examined = Some(id);
            if allowed {
                ids.push(id.clone());
                if ids.len() >= page_size {
                    break;
                }
            }
        }

        let next_page_token = if ids.len() >= page_size && examined < total {
            last_examined.cloned()
        } else {
            None
        };
        debug!(
            candidates = total,
            examined,
            allowed = ids.len(),
            "lookup page scanned"
        );
        Ok(Page {
            ids,
            next_page_token,
        })
    }
}
