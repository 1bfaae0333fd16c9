//! Conversion between the schema AST and the runtime domain model.

use chrono::{DateTime, Utc};

use super::ast::{
    AttributeDef, BinaryOp, EntityDef, PermissionDef, RelationDef, RelationTarget, RuleDef,
    RuleExpr, SchemaAst,
};
use crate::error::{DomainError, DomainResult};
use crate::model::{
    AttributeSchema, AttributeType, Entity, LogicalOperator, Permission, PermissionRule, Relation,
    RelationReference, Rule, ScalarType, Schema,
};

/// Maps a rule expression onto the runtime rule tree.
pub fn expr_to_rule(expr: &RuleExpr) -> PermissionRule {
    match expr {
        RuleExpr::Identifier(name) => PermissionRule::relation(name.clone()),
        RuleExpr::Member {
            relation,
            permission,
        } => PermissionRule::hierarchical(relation.clone(), permission.clone()),
        RuleExpr::Call { name, args } => PermissionRule::RuleCall {
            rule_name: name.clone(),
            arguments: args.clone(),
        },
        RuleExpr::Inline { expression } => PermissionRule::abac(expression.clone()),
        RuleExpr::Not(inner) => PermissionRule::not(expr_to_rule(inner)),
        RuleExpr::Binary { op, left, right } => PermissionRule::Logical {
            operator: match op {
                BinaryOp::Or => LogicalOperator::Or,
                BinaryOp::And => LogicalOperator::And,
            },
            left: Box::new(expr_to_rule(left)),
            right: Some(Box::new(expr_to_rule(right))),
        },
    }
}

/// Maps a runtime rule tree back to an expression. A `not` ignores any right
/// operand; `or`/`and` without one are rejected.
pub fn rule_to_expr(rule: &PermissionRule) -> DomainResult<RuleExpr> {
    Ok(match rule {
        PermissionRule::Relation { relation } => RuleExpr::Identifier(relation.clone()),
        PermissionRule::Hierarchical {
            relation,
            permission,
        } => RuleExpr::Member {
            relation: relation.clone(),
            permission: permission.clone(),
        },
        PermissionRule::RuleCall {
            rule_name,
            arguments,
        } => RuleExpr::Call {
            name: rule_name.clone(),
            args: arguments.clone(),
        },
        PermissionRule::Abac { expression } => RuleExpr::Inline {
            expression: expression.clone(),
        },
        PermissionRule::Logical {
            operator: LogicalOperator::Not,
            left,
            ..
        } => RuleExpr::Not(Box::new(rule_to_expr(left)?)),
        PermissionRule::Logical {
            operator,
            left,
            right,
        } => {
            let right = right.as_deref().ok_or_else(|| DomainError::MalformedRule {
                message: format!("'{operator}' rule is missing its right operand"),
            })?;
            let op = if *operator == LogicalOperator::Or {
                BinaryOp::Or
            } else {
                BinaryOp::And
            };
            RuleExpr::binary(op, rule_to_expr(left)?, rule_to_expr(right)?)
        }
    })
}

fn entity_from_def(def: &EntityDef) -> DomainResult<Entity> {
    let attributes = def
        .attributes
        .iter()
        .map(|a| {
            let scalar =
                ScalarType::parse(&a.type_name).ok_or_else(|| DomainError::SchemaValidation {
                    message: format!(
                        "attribute '{}.{}' has invalid type '{}'",
                        def.name, a.name, a.type_name
                    ),
                })?;
            Ok(AttributeSchema {
                name: a.name.clone(),
                attribute_type: AttributeType {
                    scalar,
                    is_array: a.is_array,
                },
            })
        })
        .collect::<DomainResult<Vec<_>>>()?;

    Ok(Entity {
        name: def.name.clone(),
        relations: def
            .relations
            .iter()
            .map(|r| Relation {
                name: r.name.clone(),
                targets: r
                    .targets
                    .iter()
                    .map(|t| RelationReference {
                        entity_type: t.entity.clone(),
                        relation: t.relation.clone(),
                    })
                    .collect(),
            })
            .collect(),
        attributes,
        permissions: def
            .permissions
            .iter()
            .map(|p| Permission {
                name: p.name.clone(),
                rule: expr_to_rule(&p.rule),
            })
            .collect(),
    })
}

/// Builds a [`Schema`] from a validated AST.
pub fn ast_to_schema(
    ast: &SchemaAst,
    tenant_id: &str,
    version: &str,
    dsl: &str,
    created_at: DateTime<Utc>,
) -> DomainResult<Schema> {
    Ok(Schema {
        tenant_id: tenant_id.to_string(),
        dsl: dsl.to_string(),
        rules: ast
            .rules
            .iter()
            .map(|r| Rule {
                name: r.name.clone(),
                parameters: r.params.clone(),
                body: r.body.clone(),
            })
            .collect(),
        entities: ast
            .entities
            .iter()
            .map(entity_from_def)
            .collect::<DomainResult<Vec<_>>>()?,
        version: version.to_string(),
        created_at,
        updated_at: created_at,
    })
}

/// Rebuilds an AST from a runtime schema, e.g. to regenerate its DSL.
pub fn schema_to_ast(schema: &Schema) -> DomainResult<SchemaAst> {
    let entities = schema
        .entities
        .iter()
        .map(|entity| {
            Ok(EntityDef {
                name: entity.name.clone(),
                relations: entity
                    .relations
                    .iter()
                    .map(|r| RelationDef {
                        name: r.name.clone(),
                        targets: r
                            .targets
                            .iter()
                            .map(|t| RelationTarget {
                                entity: t.entity_type.clone(),
                                relation: t.relation.clone(),
                            })
                            .collect(),
                    })
                    .collect(),
                attributes: entity
                    .attributes
                    .iter()
                    .map(|a| AttributeDef {
                        name: a.name.clone(),
                        type_name: a.attribute_type.scalar.as_str().to_string(),
                        is_array: a.attribute_type.is_array,
                    })
                    .collect(),
                permissions: entity
                    .permissions
                    .iter()
                    .map(|p| {
                        Ok(PermissionDef {
                            name: p.name.clone(),
                            rule: rule_to_expr(&p.rule)?,
                        })
                    })
                    .collect::<DomainResult<Vec<_>>>()?,
            })
        })
        .collect::<DomainResult<Vec<_>>>()?;

    Ok(SchemaAst {
        rules: schema
            .rules
            .iter()
            .map(|r| RuleDef {
                name: r.name.clone(),
                params: r.parameters.clone(),
                body: r.body.clone(),
            })
            .collect(),
        entities,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::parse;

    const DSL: &str = r#"
        rule is_adult(subject) { subject.age >= 18 }

        entity user {
            attribute age int
        }

        entity document {
            relation parent @folder
            relation viewer @user @team#member
            attribute tags string[]
            permission view = viewer or parent.view and not rule(resource.locked == true)
            permission adult_view = view and is_adult(subject)
        }
    "#;

    #[test]
    fn test_ast_to_schema_maps_rule_variants() {
        let ast = parse(DSL).unwrap();
        let schema = ast_to_schema(&ast, "t1", "v1", DSL, Utc::now()).unwrap();

        assert_eq!(schema.tenant_id, "t1");
        assert_eq!(schema.version, "v1");
        assert_eq!(schema.rules[0].parameters, vec!["subject".to_string()]);

        let doc = schema.entity("document").unwrap();
        assert_eq!(
            doc.relation("viewer").unwrap().targets[1],
            RelationReference::userset("team", "member")
        );
        assert_eq!(
            doc.attribute("tags").unwrap().attribute_type,
            AttributeType {
                scalar: ScalarType::String,
                is_array: true
            }
        );
        assert_eq!(
            doc.permission("view").unwrap().rule,
            PermissionRule::or(
                PermissionRule::relation("viewer"),
                PermissionRule::and(
                    PermissionRule::hierarchical("parent", "view"),
                    PermissionRule::not(PermissionRule::abac("resource.locked == true")),
                ),
            )
        );
        assert_eq!(
            doc.permission("adult_view").unwrap().rule,
            PermissionRule::and(
                PermissionRule::relation("view"),
                PermissionRule::RuleCall {
                    rule_name: "is_adult".to_string(),
                    arguments: vec!["subject".to_string()],
                },
            )
        );
    }

    #[test]
    fn test_schema_to_ast_round_trip() {
        let ast = parse(DSL).unwrap();
        let schema = ast_to_schema(&ast, "t1", "v1", DSL, Utc::now()).unwrap();
        assert_eq!(schema_to_ast(&schema).unwrap(), ast);
    }

    #[test]
    fn test_not_ignores_right_operand() {
        let rule = PermissionRule::Logical {
            operator: LogicalOperator::Not,
            left: Box::new(PermissionRule::relation("a")),
            right: Some(Box::new(PermissionRule::relation("b"))),
        };
        assert_eq!(
            rule_to_expr(&rule).unwrap(),
            RuleExpr::Not(Box::new(RuleExpr::ident("a")))
        );
    }

    #[test]
    fn test_binary_without_right_operand_is_rejected() {
        let rule = PermissionRule::Logical {
            operator: LogicalOperator::And,
            left: Box::new(PermissionRule::relation("a")),
            right: None,
        };
        assert!(matches!(
            rule_to_expr(&rule),
            Err(DomainError::MalformedRule { .. })
        ));
    }
}
