//! Schema validation.
//!
//! Static checks over a parsed [`SchemaAst`], run in this order:
//! - rule definitions: unique names and parameters, bodies compile
//! - (a) entity names are unique
//! - (b) relation/attribute/permission names are unique per entity, across kinds
//! - (c) attribute types are in the whitelist
//! - (d) relation targets reference declared entities (and userset relations exist)
//! - (e) bare references resolve to a relation or permission on the same entity
//! - (f) `relation.name` references resolve through the relation's target types
//! - (g) rule calls resolve, match arity, and pass recognised arguments
//! - (h) no permission cycles within an entity
//!
//! All errors are collected; validation never stops at the first one.

use std::collections::{HashMap, HashSet};

use crate::cel::CelExpression;
use crate::dsl::ast::{EntityDef, PermissionDef, RuleDef, RuleExpr, SchemaAst};
use crate::model::ScalarType;

/// Context names always available to rule calls.
pub const CONTEXT_NAMES: [&str; 3] = ["resource", "subject", "request"];

/// Validation error types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    DuplicateEntity {
        entity: String,
    },
    DuplicateRule {
        rule: String,
    },
    DuplicateParameter {
        rule: String,
        parameter: String,
    },
    /// A name declared twice in one entity, possibly as different kinds.
    DuplicateName {
        entity: String,
        name: String,
        first: &'static str,
        second: &'static str,
    },
    InvalidAttributeType {
        entity: String,
        attribute: String,
        type_name: String,
    },
    UndefinedEntityType {
        entity: String,
        relation: String,
        referenced_type: String,
    },
    /// `Type#rel` target where `rel` is not declared on `Type`.
    UndefinedUsersetRelation {
        entity: String,
        relation: String,
        target: String,
    },
    UndefinedReference {
        entity: String,
        permission: String,
        name: String,
    },
    UndefinedHierarchicalRelation {
        entity: String,
        permission: String,
        relation: String,
    },
    UndefinedHierarchicalPermission {
        entity: String,
        permission: String,
        target_entity: String,
        name: String,
    },
    UndefinedRule {
        entity: String,
        permission: String,
        rule: String,
    },
    RuleArityMismatch {
        entity: String,
        permission: String,
        rule: String,
        expected: usize,
        actual: usize,
    },
    UnrecognizedArgument {
        entity: String,
        permission: String,
        rule: String,
        argument: String,
    },
    InvalidExpression {
        location: String,
        message: String,
    },
    CyclicPermission {
        entity: String,
        cycle_path: Vec<String>,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::DuplicateEntity { entity } => {
                write!(f, "entity '{entity}' is declared more than once")
            }
            ValidationError::DuplicateRule { rule } => {
                write!(f, "rule '{rule}' is declared more than once")
            }
            ValidationError::DuplicateParameter { rule, parameter } => write!(
                f,
                "rule '{rule}' declares parameter '{parameter}' more than once"
            ),
            ValidationError::DuplicateName {
                entity,
                name,
                first,
                second,
            } => {
                if first == second {
                    write!(f, "{first} '{name}' is declared more than once in entity '{entity}'")
                } else {
                    write!(
                        f,
                        "{second} '{name}' in entity '{entity}' conflicts with {first} of the same name"
                    )
                }
            }
            ValidationError::InvalidAttributeType {
                entity,
                attribute,
                type_name,
            } => write!(
                f,
                "attribute '{entity}.{attribute}' has invalid type '{type_name}' (expected string, int, bool or float, optionally with [])"
            ),
            ValidationError::UndefinedEntityType {
                entity,
                relation,
                referenced_type,
            } => write!(
                f,
                "undefined entity type '{referenced_type}' referenced in {entity}#{relation}"
            ),
            ValidationError::UndefinedUsersetRelation {
                entity,
                relation,
                target,
            } => write!(
                f,
                "userset target '{target}' in {entity}#{relation} does not name a relation or permission"
            ),
            ValidationError::UndefinedReference {
                entity,
                permission,
                name,
            } => write!(
                f,
                "undefined relation or permission '{name}' referenced in {entity}#{permission}"
            ),
            ValidationError::UndefinedHierarchicalRelation {
                entity,
                permission,
                relation,
            } => write!(
                f,
                "'{relation}' used for traversal in {entity}#{permission} is not a relation of '{entity}'"
            ),
            ValidationError::UndefinedHierarchicalPermission {
                entity,
                permission,
                target_entity,
                name,
            } => write!(
                f,
                "entity '{target_entity}' declares no permission or relation '{name}' (referenced in {entity}#{permission})"
            ),
            ValidationError::UndefinedRule {
                entity,
                permission,
                rule,
            } => write!(f, "undefined rule '{rule}' called in {entity}#{permission}"),
            ValidationError::RuleArityMismatch {
                entity,
                permission,
                rule,
                expected,
                actual,
            } => write!(
                f,
                "rule '{rule}' expects {expected} argument(s) but {entity}#{permission} passes {actual}"
            ),
            ValidationError::UnrecognizedArgument {
                entity,
                permission,
                rule,
                argument,
            } => write!(
                f,
                "argument '{argument}' to rule '{rule}' in {entity}#{permission} is neither a context name nor an attribute of '{entity}'"
            ),
            ValidationError::InvalidExpression { location, message } => {
                write!(f, "invalid expression in {location}: {message}")
            }
            ValidationError::CyclicPermission { entity, cycle_path } => write!(
                f,
                "cyclic permission definition in entity '{entity}': {}",
                cycle_path.join(" -> ")
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, Vec<ValidationError>>;

/// Validates `ast`, returning every problem found.
pub fn validate(ast: &SchemaAst) -> ValidationResult<()> {
    SchemaValidator::new(ast).validate(ast)
}

/// Schema validator
pub struct SchemaValidator<'a> {
    /// First declaration of each entity name
    entities: HashMap<&'a str, &'a EntityDef>,
    /// First declaration of each rule name
    rules: HashMap<&'a str, &'a RuleDef>,
}

impl<'a> SchemaValidator<'a> {
    pub fn new(ast: &'a SchemaAst) -> Self {
        let mut entities = HashMap::new();
        for entity in &ast.entities {
            entities.entry(entity.name.as_str()).or_insert(entity);
        }
        let mut rules = HashMap::new();
        for rule in &ast.rules {
            rules.entry(rule.name.as_str()).or_insert(rule);
        }
        Self { entities, rules }
    }

    /// Validate the schema and return any errors found
    pub fn validate(&self, ast: &SchemaAst) -> ValidationResult<()> {
        let mut errors = Vec::new();

        self.validate_rule_definitions(ast, &mut errors);

        // (a)
        let mut seen = HashSet::new();
        for entity in &ast.entities {
            if !seen.insert(entity.name.as_str()) {
                errors.push(ValidationError::DuplicateEntity {
                    entity: entity.name.clone(),
                });
            }
        }

        for entity in &ast.entities {
            Self::validate_namespace(entity, &mut errors); // (b)
            Self::validate_attribute_types(entity, &mut errors); // (c)
            self.validate_relation_targets(entity, &mut errors); // (d)
            for permission in &entity.permissions {
                self.validate_rule_expr(entity, permission, &permission.rule, &mut errors); // (e)-(g)
            }
        }

        for entity in &ast.entities {
            if let Some(cycle_path) = detect_permission_cycle(entity) {
                errors.push(ValidationError::CyclicPermission {
                    entity: entity.name.clone(),
                    cycle_path,
                }); // (h)
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_rule_definitions(&self, ast: &SchemaAst, errors: &mut Vec<ValidationError>) {
        let mut seen = HashSet::new();
        for rule in &ast.rules {
            if !seen.insert(rule.name.as_str()) {
                errors.push(ValidationError::DuplicateRule {
                    rule: rule.name.clone(),
                });
            }

            let mut params = HashSet::new();
            for param in &rule.params {
                if !params.insert(param.as_str()) {
                    errors.push(ValidationError::DuplicateParameter {
                        rule: rule.name.clone(),
                        parameter: param.clone(),
                    });
                }
            }

            if let Err(e) = CelExpression::parse(&rule.body) {
                errors.push(ValidationError::InvalidExpression {
                    location: format!("rule '{}'", rule.name),
                    message: e.to_string(),
                });
            }
        }
    }

    fn validate_namespace(entity: &EntityDef, errors: &mut Vec<ValidationError>) {
        let names = entity
            .relations
            .iter()
            .map(|r| (r.name.as_str(), "relation"))
            .chain(entity.attributes.iter().map(|a| (a.name.as_str(), "attribute")))
            .chain(
                entity
                    .permissions
                    .iter()
                    .map(|p| (p.name.as_str(), "permission")),
            );

        let mut declared: HashMap<&str, &'static str> = HashMap::new();
        for (name, kind) in names {
            if let Some(&first) = declared.get(name) {
                errors.push(ValidationError::DuplicateName {
                    entity: entity.name.clone(),
                    name: name.to_string(),
                    first,
                    second: kind,
                });
            } else {
                declared.insert(name, kind);
            }
        }
    }

    fn validate_attribute_types(entity: &EntityDef, errors: &mut Vec<ValidationError>) {
        for attribute in &entity.attributes {
            if ScalarType::parse(&attribute.type_name).is_none() {
                let suffix = if attribute.is_array { "[]" } else { "" };
                errors.push(ValidationError::InvalidAttributeType {
                    entity: entity.name.clone(),
                    attribute: attribute.name.clone(),
                    type_name: format!("{}{suffix}", attribute.type_name),
                });
            }
        }
    }

    fn validate_relation_targets(&self, entity: &EntityDef, errors: &mut Vec<ValidationError>) {
        for relation in &entity.relations {
            for target in &relation.targets {
                let Some(target_entity) = self.entities.get(target.entity.as_str()) else {
                    errors.push(ValidationError::UndefinedEntityType {
                        entity: entity.name.clone(),
                        relation: relation.name.clone(),
                        referenced_type: target.entity.clone(),
                    });
                    continue;
                };

                if let Some(rel) = &target.relation {
                    if !target_entity.has_relation_or_permission(rel) {
                        errors.push(ValidationError::UndefinedUsersetRelation {
                            entity: entity.name.clone(),
                            relation: relation.name.clone(),
                            target: format!("{}#{}", target.entity, rel),
                        });
                    }
                }
            }
        }
    }

    fn validate_rule_expr(
        &self,
        entity: &EntityDef,
        permission: &PermissionDef,
        expr: &RuleExpr,
        errors: &mut Vec<ValidationError>,
    ) {
        match expr {
            RuleExpr::Identifier(name) => {
                if !entity.has_relation_or_permission(name) {
                    errors.push(ValidationError::UndefinedReference {
                        entity: entity.name.clone(),
                        permission: permission.name.clone(),
                        name: name.clone(),
                    });
                }
            }
            RuleExpr::Member {
                relation,
                permission: target_name,
            } => {
                let Some(relation_def) = entity.relation(relation) else {
                    errors.push(ValidationError::UndefinedHierarchicalRelation {
                        entity: entity.name.clone(),
                        permission: permission.name.clone(),
                        relation: relation.clone(),
                    });
                    return;
                };

                for target in relation_def.targets.iter().filter(|t| t.relation.is_none()) {
                    // Unknown target types are reported by the relation target check
                    let Some(target_entity) = self.entities.get(target.entity.as_str()) else {
                        continue;
                    };
                    if !target_entity.has_relation_or_permission(target_name) {
                        errors.push(ValidationError::UndefinedHierarchicalPermission {
                            entity: entity.name.clone(),
                            permission: permission.name.clone(),
                            target_entity: target.entity.clone(),
                            name: target_name.clone(),
                        });
                    }
                }
            }
            RuleExpr::Call { name, args } => {
                let Some(rule) = self.rules.get(name.as_str()) else {
                    errors.push(ValidationError::UndefinedRule {
                        entity: entity.name.clone(),
                        permission: permission.name.clone(),
                        rule: name.clone(),
                    });
                    return;
                };

                if rule.params.len() != args.len() {
                    errors.push(ValidationError::RuleArityMismatch {
                        entity: entity.name.clone(),
                        permission: permission.name.clone(),
                        rule: name.clone(),
                        expected: rule.params.len(),
                        actual: args.len(),
                    });
                }

                for arg in args {
                    if !CONTEXT_NAMES.contains(&arg.as_str()) && !entity.has_attribute(arg) {
                        errors.push(ValidationError::UnrecognizedArgument {
                            entity: entity.name.clone(),
                            permission: permission.name.clone(),
                            rule: name.clone(),
                            argument: arg.clone(),
                        });
                    }
                }
            }
            RuleExpr::Inline { expression } => {
                if let Err(e) = CelExpression::parse(expression) {
                    errors.push(ValidationError::InvalidExpression {
                        location: format!("{}#{}", entity.name, permission.name),
                        message: e.to_string(),
                    });
                }
            }
            RuleExpr::Not(inner) => self.validate_rule_expr(entity, permission, inner, errors),
            RuleExpr::Binary { left, right, .. } => {
                self.validate_rule_expr(entity, permission, left, errors);
                self.validate_rule_expr(entity, permission, right, errors);
            }
        }
    }
}

/// Collect permission names referenced by bare identifiers in `expr`.
/// `relation.name` crosses to another instance and is not followed.
fn collect_permission_refs<'a>(
    entity: &EntityDef,
    expr: &'a RuleExpr,
    refs: &mut Vec<&'a str>,
) {
    match expr {
        RuleExpr::Identifier(name) => {
            if entity.has_permission(name) {
                refs.push(name.as_str());
            }
        }
        RuleExpr::Not(inner) => collect_permission_refs(entity, inner, refs),
        RuleExpr::Binary { left, right, .. } => {
            collect_permission_refs(entity, left, refs);
            collect_permission_refs(entity, right, refs);
        }
        RuleExpr::Member { .. } | RuleExpr::Call { .. } | RuleExpr::Inline { .. } => {}
    }
}

/// Detect a permission cycle in one entity using DFS. Returns the cycle as a
/// path whose first and last elements are the same permission.
fn detect_permission_cycle(entity: &EntityDef) -> Option<Vec<String>> {
    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();
    for permission in &entity.permissions {
        let mut refs = Vec::new();
        collect_permission_refs(entity, &permission.rule, &mut refs);
        graph.entry(permission.name.as_str()).or_insert(refs);
    }

    let mut visited = HashSet::new();
    let mut path = Vec::new();
    // Declaration order keeps the reported cycle deterministic
    for permission in &entity.permissions {
        if let Some(cycle) = dfs_cycle_detect(&permission.name, &graph, &mut visited, &mut path) {
            return Some(cycle);
        }
    }
    None
}

/// DFS-based cycle detection; `path` is the current recursion stack.
fn dfs_cycle_detect<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> Option<Vec<String>> {
    if let Some(start) = path.iter().position(|n| *n == node) {
        let mut cycle: Vec<String> = path[start..].iter().map(|s| s.to_string()).collect();
        cycle.push(node.to_string());
        return Some(cycle);
    }
    if !visited.insert(node) {
        return None;
    }

    path.push(node);
    if let Some(neighbors) = graph.get(node) {
        for next in neighbors {
            if let Some(cycle) = dfs_cycle_detect(next, graph, visited, path) {
                return Some(cycle);
            }
        }
    }
    path.pop();
    None
}
