//! Recursive permission rule evaluator.
//!
//! Decides whether one `(entity, rule, subject)` triple is satisfied.
//!
//! - **Depth limiting**: every recursive step that re-enters a permission or
//!   crosses to another entity instance increments `depth`. There is no static
//!   cycle detection across entities, so this is the only runtime guard.
//! - **Short-circuit**: `or`/`and` evaluate left then right and skip the right
//!   branch when the left already decides. Errors from the evaluated branch
//!   propagate immediately.
//! - **Usersets**: one hop only. A tuple `doc:1#viewer@group:eng#member` grants
//!   `viewer` to whoever directly holds `member` on `group:eng`; nested groups
//!   are not followed.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::trace;

use crate::error::{DomainError, DomainResult};
use crate::model::{
    AttributeValue, LogicalOperator, PermissionRule, RelationFilter, RelationTuple, Schema,
};

use super::config::ResolverConfig;
use super::traits::{AttributeReader, ExpressionContext, ExpressionEvaluator, RelationReader};
use super::types::EvaluationRequest;

/// Type alias for boxed future to handle async recursion.
pub(crate) type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Evaluates permission rules against stored relations and attributes.
pub struct Evaluator<R, A> {
    relations: Arc<R>,
    attributes: Arc<A>,
    expressions: Arc<dyn ExpressionEvaluator>,
    config: ResolverConfig,
}

impl<R, A> Evaluator<R, A>
where
    R: RelationReader + 'static,
    A: AttributeReader + 'static,
{
    pub fn new(
        relations: Arc<R>,
        attributes: Arc<A>,
        expressions: Arc<dyn ExpressionEvaluator>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            relations,
            attributes,
            expressions,
            config,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub(crate) fn relations(&self) -> &Arc<R> {
        &self.relations
    }

    /// Evaluates `rule` for the entity and subject named in `request`.
    pub fn evaluate_rule<'a>(
        &'a self,
        schema: &'a Schema,
        request: &'a EvaluationRequest,
        rule: &'a PermissionRule,
    ) -> BoxFuture<'a, DomainResult<bool>> {
        Box::pin(async move {
            if request.depth > self.config.max_depth {
                return Err(DomainError::DepthLimitExceeded {
                    max_depth: self.config.max_depth,
                });
            }

            match rule {
                PermissionRule::Relation { relation } => {
                    self.evaluate_relation(schema, request, relation).await
                }
                PermissionRule::Logical {
                    operator,
                    left,
                    right,
                } => {
                    self.evaluate_logical(schema, request, *operator, left, right.as_deref())
                        .await
                }
                PermissionRule::Hierarchical {
                    relation,
                    permission,
                } => {
                    self.evaluate_hierarchical(schema, request, relation, permission)
                        .await
                }
                PermissionRule::Abac { expression } => {
                    self.evaluate_expression(request, expression, expression)
                        .await
                }
                PermissionRule::RuleCall {
                    rule_name,
                    arguments,
                } => {
                    let definition =
                        schema
                            .rule(rule_name)
                            .ok_or_else(|| DomainError::RuleNotFound {
                                rule: rule_name.clone(),
                            })?;
                    if definition.parameters.len() != arguments.len() {
                        return Err(DomainError::RuleArityMismatch {
                            rule: rule_name.clone(),
                            expected: definition.parameters.len(),
                            actual: arguments.len(),
                        });
                    }
                    // Arguments are arity-checked only; the body sees the fixed context maps.
                    self.evaluate_expression(request, rule_name, &definition.body)
                        .await
                }
            }
        })
    }

    /// A name on the same entity: either another permission or a stored relation.
    async fn evaluate_relation(
        &self,
        schema: &Schema,
        request: &EvaluationRequest,
        name: &str,
    ) -> DomainResult<bool> {
        let entity =
            schema
                .entity(&request.entity_type)
                .ok_or_else(|| DomainError::EntityNotFound {
                    entity_type: request.entity_type.clone(),
                })?;

        if let Some(permission) = entity.permission(name) {
            return self
                .evaluate_rule(schema, &request.deeper(), &permission.rule)
                .await;
        }

        if entity.relation(name).is_none() {
            return Err(DomainError::RelationNotFound {
                entity_type: request.entity_type.clone(),
                relation: name.to_string(),
            });
        }

        if self
            .holds_directly(request, &request.entity_type, &request.entity_id, name)
            .await?
        {
            return Ok(true);
        }

        self.holds_via_userset(request, name).await
    }

    /// True if the subject is a direct (non-userset) holder of `relation` on the
    /// given instance, via contextual tuples or the repository.
    async fn holds_directly(
        &self,
        request: &EvaluationRequest,
        entity_type: &str,
        entity_id: &str,
        relation: &str,
    ) -> DomainResult<bool> {
        let is_match = |t: &RelationTuple| {
            !t.is_userset()
                && t.entity_type == entity_type
                && t.entity_id == entity_id
                && t.relation == relation
                && t.subject_type == request.subject_type
                && t.subject_id == request.subject_id
        };

        if request.contextual_tuples.iter().any(is_match) {
            return Ok(true);
        }

        let filter = RelationFilter::new()
            .entity(entity_type, entity_id)
            .relation(relation)
            .subject(&request.subject_type, &request.subject_id);
        let stored = self
            .relations
            .read_relations(&request.tenant_id, &filter)
            .await?;
        Ok(stored.iter().any(is_match))
    }

    /// One hop of group indirection over userset tuples on `relation`.
    async fn holds_via_userset(
        &self,
        request: &EvaluationRequest,
        relation: &str,
    ) -> DomainResult<bool> {
        for tuple in self
            .tuples_on(request, &request.entity_type, &request.entity_id, relation)
            .await?
        {
            let Some(subject_relation) = tuple.subject_relation.as_deref() else {
                continue;
            };
            trace!(
                userset = %tuple,
                subject_type = %request.subject_type,
                subject_id = %request.subject_id,
                "following userset"
            );
            if self
                .holds_directly(
                    request,
                    &tuple.subject_type,
                    &tuple.subject_id,
                    subject_relation,
                )
                .await?
            {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every stored and contextual tuple on `(entity_type, entity_id, relation)`.
    async fn tuples_on(
        &self,
        request: &EvaluationRequest,
        entity_type: &str,
        entity_id: &str,
        relation: &str,
    ) -> DomainResult<Vec<RelationTuple>> {
        let filter = RelationFilter::new()
            .entity(entity_type, entity_id)
            .relation(relation);
        let mut tuples = self
            .relations
            .read_relations(&request.tenant_id, &filter)
            .await?;
        tuples.extend(
            request
                .contextual_tuples
                .iter()
                .filter(|t| filter.matches(t))
                .cloned(),
        );
        Ok(tuples)
    }

    async fn evaluate_logical(
        &self,
        schema: &Schema,
        request: &EvaluationRequest,
        operator: LogicalOperator,
        left: &PermissionRule,
        right: Option<&PermissionRule>,
    ) -> DomainResult<bool> {
        if operator == LogicalOperator::Not {
            return Ok(!self.evaluate_rule(schema, request, left).await?);
        }

        let right = right.ok_or_else(|| DomainError::MalformedRule {
            message: format!("'{operator}' rule is missing its right operand"),
        })?;

        let left_result = self.evaluate_rule(schema, request, left).await?;
        match (operator, left_result) {
            (LogicalOperator::Or, true) => Ok(true),
            (LogicalOperator::And, false) => Ok(false),
            _ => self.evaluate_rule(schema, request, right).await,
        }
    }

    /// `relation.permission`: union over every parent instance reached through `relation`.
    async fn evaluate_hierarchical(
        &self,
        schema: &Schema,
        request: &EvaluationRequest,
        relation: &str,
        permission: &str,
    ) -> DomainResult<bool> {
        let entity =
            schema
                .entity(&request.entity_type)
                .ok_or_else(|| DomainError::EntityNotFound {
                    entity_type: request.entity_type.clone(),
                })?;
        let definition =
            entity
                .relation(relation)
                .ok_or_else(|| DomainError::RelationNotFound {
                    entity_type: request.entity_type.clone(),
                    relation: relation.to_string(),
                })?;
        let target_types: Vec<&str> = definition.direct_target_types().collect();

        let parents: BTreeSet<(String, String)> = self
            .tuples_on(request, &request.entity_type, &request.entity_id, relation)
            .await?
            .into_iter()
            .filter(|t| !t.is_userset() && target_types.contains(&t.subject_type.as_str()))
            .map(|t| (t.subject_type, t.subject_id))
            .collect();

        for (parent_type, parent_id) in &parents {
            let granted = match schema
                .entity(parent_type)
                .and_then(|e| e.permission(permission))
            {
                Some(target) => {
                    let nested = request.at_entity(parent_type, parent_id);
                    self.evaluate_rule(schema, &nested, &target.rule)
                        .await
                        .map_err(|e| match e {
                            // Already located at a deeper parent.
                            DomainError::Evaluation { .. } => e,
                            e => e.in_evaluation(parent_type, parent_id, permission),
                        })?
                }
                // Fallback: `permission` names a relation on the parent.
                None => {
                    self.holds_directly(request, parent_type, parent_id, permission)
                        .await?
                }
            };
            if granted {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Runs a boolean expression against resource, subject and request attributes.
    async fn evaluate_expression(
        &self,
        request: &EvaluationRequest,
        rule: &str,
        expression: &str,
    ) -> DomainResult<bool> {
        let context = ExpressionContext {
            resource: self
                .read_attributes(request, &request.entity_type, &request.entity_id)
                .await?,
            subject: self
                .read_attributes(request, &request.subject_type, &request.subject_id)
                .await?,
            request: request.context.as_ref().clone(),
        };

        self.expressions
            .evaluate(expression, &context)
            .map_err(|e| DomainError::Expression {
                rule: rule.to_string(),
                message: e.to_string(),
            })
    }

    async fn read_attributes(
        &self,
        request: &EvaluationRequest,
        entity_type: &str,
        entity_id: &str,
    ) -> DomainResult<HashMap<String, AttributeValue>> {
        self.attributes
            .read_attributes(&request.tenant_id, entity_type, entity_id)
            .await
    }
}
