//! Decision-tree expansion.
//!
//! Unfolds a permission's rule without a subject: relations become unions of
//! their stored grantees, logical operators become set nodes, and attribute
//! rules become expression leaves.
//!
//! Two behaviors differ from the [`Evaluator`](super::Evaluator):
//! - hierarchical targets that do not declare the permission are skipped
//!   (the evaluator falls back to a relation of that name);
//! - calls to top-level rules are rejected with `UnsupportedRule`.

use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::time::timeout;

use crate::error::{DomainError, DomainResult};
use crate::model::{LogicalOperator, PermissionRule, RelationFilter, Schema, SubjectReference};

use super::config::ResolverConfig;
use super::evaluator::BoxFuture;
use super::traits::{resolve_schema, RelationReader, SchemaReader};
use super::types::{require, ExpandLeaf, ExpandNode, ExpandRequest, ExpandResult};

/// Builds [`ExpandNode`] trees for permissions.
pub struct Expander<R, S> {
    relations: Arc<R>,
    schemas: Arc<S>,
    config: ResolverConfig,
}

/// Position in the expansion: which instance a rule is unfolded for.
struct Frame<'a> {
    tenant_id: &'a str,
    entity_type: &'a str,
    entity_id: &'a str,
    depth: u32,
}

impl<R, S> Expander<R, S>
where
    R: RelationReader + 'static,
    S: SchemaReader + 'static,
{
    pub fn new(relations: Arc<R>, schemas: Arc<S>, config: ResolverConfig) -> Self {
        Self {
            relations,
            schemas,
            config,
        }
    }

    pub async fn expand(&self, request: &ExpandRequest) -> DomainResult<ExpandResult> {
        require("tenant_id", &request.tenant_id)?;
        require("entity_type", &request.entity_type)?;
        require("entity_id", &request.entity_id)?;
        require("permission", &request.permission)?;

        let run = async {
            let schema = resolve_schema(
                self.schemas.as_ref(),
                &request.tenant_id,
                request.schema_version.as_deref(),
            )
            .await?;
            let entity = schema.entity(&request.entity_type).ok_or_else(|| {
                DomainError::EntityNotFound {
                    entity_type: request.entity_type.clone(),
                }
            })?;
            let permission = entity.permission(&request.permission).ok_or_else(|| {
                DomainError::PermissionNotFound {
                    entity_type: request.entity_type.clone(),
                    permission: request.permission.clone(),
                }
            })?;

            let frame = Frame {
                tenant_id: &request.tenant_id,
                entity_type: &request.entity_type,
                entity_id: &request.entity_id,
                depth: 0,
            };
            self.expand_rule(&schema, &frame, &permission.rule).await
        };

        match timeout(self.config.timeout, run).await {
            Ok(tree) => Ok(ExpandResult { tree: tree? }),
            Err(_) => Err(DomainError::Timeout {
                duration_ms: self.config.timeout_ms(),
            }),
        }
    }

    fn expand_rule<'a>(
        &'a self,
        schema: &'a Schema,
        frame: &'a Frame<'a>,
        rule: &'a PermissionRule,
    ) -> BoxFuture<'a, DomainResult<ExpandNode>> {
        Box::pin(async move {
            if frame.depth > self.config.max_depth {
                return Err(DomainError::DepthLimitExceeded {
                    max_depth: self.config.max_depth,
                });
            }

            match rule {
                PermissionRule::Relation { relation } => {
                    self.expand_relation(schema, frame, relation).await
                }
                PermissionRule::Logical {
                    operator,
                    left,
                    right,
                } => {
                    let left = self.expand_rule(schema, frame, left).await?;
                    if *operator == LogicalOperator::Not {
                        return Ok(ExpandNode::Exclusion {
                            children: vec![left],
                        });
                    }
                    let right = right.as_deref().ok_or_else(|| DomainError::MalformedRule {
                        message: format!("'{operator}' rule is missing its right operand"),
                    })?;
                    let children = vec![left, self.expand_rule(schema, frame, right).await?];
                    Ok(match operator {
                        LogicalOperator::And => ExpandNode::Intersection { children },
                        _ => ExpandNode::Union {
                            label: None,
                            children,
                        },
                    })
                }
                PermissionRule::Hierarchical {
                    relation,
                    permission,
                } => {
                    self.expand_hierarchical(schema, frame, relation, permission)
                        .await
                }
                PermissionRule::Abac { expression } => Ok(ExpandNode::Leaf {
                    leaf: ExpandLeaf::Expression(expression.clone()),
                }),
                PermissionRule::RuleCall { .. } => Err(DomainError::UnsupportedRule {
                    kind: rule.kind().to_string(),
                }),
            }
        })
    }

    async fn expand_relation(
        &self,
        schema: &Schema,
        frame: &Frame<'_>,
        name: &str,
    ) -> DomainResult<ExpandNode> {
        let entity = schema
            .entity(frame.entity_type)
            .ok_or_else(|| DomainError::EntityNotFound {
                entity_type: frame.entity_type.to_string(),
            })?;

        if let Some(permission) = entity.permission(name) {
            let nested = Frame {
                depth: frame.depth + 1,
                ..*frame
            };
            let child = self.expand_rule(schema, &nested, &permission.rule).await?;
            return Ok(ExpandNode::Union {
                label: Some(name.to_string()),
                children: vec![child],
            });
        }

        if entity.relation(name).is_none() {
            return Err(DomainError::RelationNotFound {
                entity_type: frame.entity_type.to_string(),
                relation: name.to_string(),
            });
        }

        let filter = RelationFilter::new()
            .entity(frame.entity_type, frame.entity_id)
            .relation(name);
        let grantees: BTreeSet<SubjectReference> = self
            .relations
            .read_relations(frame.tenant_id, &filter)
            .await?
            .iter()
            .map(SubjectReference::from)
            .collect();

        Ok(ExpandNode::Union {
            label: Some(name.to_string()),
            children: grantees
                .into_iter()
                .map(|subject| ExpandNode::Leaf {
                    leaf: ExpandLeaf::Subject(subject),
                })
                .collect(),
        })
    }

    async fn expand_hierarchical(
        &self,
        schema: &Schema,
        frame: &Frame<'_>,
        relation: &str,
        permission: &str,
    ) -> DomainResult<ExpandNode> {
        let definition = schema
            .entity(frame.entity_type)
            .and_then(|e| e.relation(relation))
            .ok_or_else(|| DomainError::RelationNotFound {
                entity_type: frame.entity_type.to_string(),
                relation: relation.to_string(),
            })?;
        let target_types: Vec<&str> = definition.direct_target_types().collect();

        let filter = RelationFilter::new()
            .entity(frame.entity_type, frame.entity_id)
            .relation(relation);
        let parents: BTreeSet<(String, String)> = self
            .relations
            .read_relations(frame.tenant_id, &filter)
            .await?
            .into_iter()
            .filter(|t| !t.is_userset() && target_types.contains(&t.subject_type.as_str()))
            .map(|t| (t.subject_type, t.subject_id))
            .collect();

        let mut children = Vec::new();
        for (parent_type, parent_id) in &parents {
            // Parents whose type lacks the permission are left out of the tree.
            let Some(target) = schema
                .entity(parent_type)
                .and_then(|e| e.permission(permission))
            else {
                continue;
            };
            let nested = Frame {
                tenant_id: frame.tenant_id,
                entity_type: parent_type,
                entity_id: parent_id,
                depth: frame.depth + 1,
            };
            let subtree = self.expand_rule(schema, &nested, &target.rule).await?;
            children.push(ExpandNode::Union {
                label: Some(format!("{parent_type}:{parent_id}#{permission}")),
                children: vec![subtree],
            });
        }

        Ok(ExpandNode::Union {
            label: Some(format!("{relation}.{permission}")),
            children,
        })
    }
}
