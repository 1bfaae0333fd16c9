//! Renders a [`SchemaAst`] back into canonical DSL text.

use std::fmt::Write;

use super::ast::{BinaryOp, EntityDef, RuleDef, RuleExpr, SchemaAst};

const INDENT: &str = "    ";

/// Generates DSL source for `ast`. Parsing the output yields an AST equal to
/// the input.
pub fn generate(ast: &SchemaAst) -> String {
    let mut out = String::new();
    let mut first = true;

    for rule in &ast.rules {
        if !first {
            out.push('\n');
        }
        first = false;
        write_rule(&mut out, rule);
    }

    for entity in &ast.entities {
        if !first {
            out.push('\n');
        }
        first = false;
        write_entity(&mut out, entity);
    }

    out
}

/// Renders a single permission rule expression.
pub fn generate_expr(expr: &RuleExpr) -> String {
    let mut out = String::new();
    write_expr(&mut out, expr, 0);
    out
}

fn write_rule(out: &mut String, rule: &RuleDef) {
    // Writing to a String cannot fail.
    let _ = writeln!(out, "rule {}({}) {{", rule.name, rule.params.join(", "));
    let _ = writeln!(out, "{INDENT}{}", rule.body);
    out.push_str("}\n");
}

fn write_entity(out: &mut String, entity: &EntityDef) {
    if entity.relations.is_empty()
        && entity.attributes.is_empty()
        && entity.permissions.is_empty()
    {
        let _ = writeln!(out, "entity {} {{}}", entity.name);
        return;
    }

    let _ = writeln!(out, "entity {} {{", entity.name);

    for relation in &entity.relations {
        let _ = write!(out, "{INDENT}relation {}", relation.name);
        for target in &relation.targets {
            let _ = write!(out, " @{}", target.entity);
            if let Some(rel) = &target.relation {
                let _ = write!(out, "#{rel}");
            }
        }
        out.push('\n');
    }

    for attribute in &entity.attributes {
        let suffix = if attribute.is_array { "[]" } else { "" };
        let _ = writeln!(
            out,
            "{INDENT}attribute {} {}{suffix}",
            attribute.name, attribute.type_name
        );
    }

    for permission in &entity.permissions {
        let _ = write!(out, "{INDENT}permission {} = ", permission.name);
        write_expr(out, &permission.rule, 0);
        out.push('\n');
    }

    out.push_str("}\n");
}

fn precedence(expr: &RuleExpr) -> u8 {
    match expr {
        RuleExpr::Binary {
            op: BinaryOp::Or, ..
        } => 1,
        RuleExpr::Binary {
            op: BinaryOp::And, ..
        } => 2,
        RuleExpr::Not(_) => 3,
        _ => 4,
    }
}

/// Writes `expr`, parenthesising it when its precedence is below `min`.
fn write_expr(out: &mut String, expr: &RuleExpr, min: u8) {
    let prec = precedence(expr);
    let wrap = prec < min;
    if wrap {
        out.push('(');
    }

    match expr {
        RuleExpr::Identifier(name) => out.push_str(name),
        RuleExpr::Member {
            relation,
            permission,
        } => {
            let _ = write!(out, "{relation}.{permission}");
        }
        RuleExpr::Call { name, args } => {
            let _ = write!(out, "{name}({})", args.join(", "));
        }
        RuleExpr::Inline { expression } => {
            let _ = write!(out, "rule({expression})");
        }
        RuleExpr::Not(inner) => {
            out.push_str("not ");
            write_expr(out, inner, 4);
        }
        RuleExpr::Binary { op, left, right } => {
            let keyword = match op {
                BinaryOp::Or => "or",
                BinaryOp::And => "and",
            };
            // Left-associative: the left operand may share this precedence,
            // the right one must bind tighter.
            write_expr(out, left, prec);
            let _ = write!(out, " {keyword} ");
            write_expr(out, right, prec + 1);
        }
    }

    if wrap {
        out.push(')');
    }
}

#[cfg(test)]
mod tests {
    use super::super::ast::{AttributeDef, PermissionDef, RelationDef, RelationTarget};
    use super::super::parser::parse;
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_generates_canonical_layout() {
        let ast = parse(
            "entity user {}\nrule r(resource) { resource.x == 1 }\n\
             entity doc { permission view = owner\n relation owner @user @team#member\n attribute tags string[] }",
        )
        .unwrap();

        let expected = "\
rule r(resource) {
    resource.x == 1
}

entity user {}

entity doc {
    relation owner @user @team#member
    attribute tags string[]
    permission view = owner
}
";
        assert_eq!(generate(&ast), expected);
    }

    #[test]
    fn test_parenthesises_only_where_required() {
        for source in [
            "a or b and c",
            "(a or b) and c",
            "a or (b or c)",
            "not (a or b)",
            "not a and parent.view",
            "rule(resource.public == true) or is_public(resource)",
        ] {
            let expr = parse(&format!("entity e {{ permission p = {source} }}"))
                .unwrap()
                .entities[0]
                .permissions[0]
                .rule
                .clone();
            assert_eq!(generate_expr(&expr), source);
        }
    }

    // ============ Round-trip property ============

    fn name_strategy() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,6}".prop_filter("keywords are not identifiers", |s| {
            super::super::token::TokenKind::keyword(s).is_none()
        })
    }

    fn expr_strategy() -> impl Strategy<Value = RuleExpr> {
        let leaf = prop_oneof![
            name_strategy().prop_map(RuleExpr::Identifier),
            (name_strategy(), name_strategy()).prop_map(|(relation, permission)| {
                RuleExpr::Member {
                    relation,
                    permission,
                }
            }),
            (name_strategy(), prop::collection::vec(name_strategy(), 0..3))
                .prop_map(|(name, args)| RuleExpr::Call { name, args }),
            Just(RuleExpr::Inline {
                expression: "resource.public == true".to_string()
            }),
        ];
        leaf.prop_recursive(4, 24, 2, |inner| {
            prop_oneof![
                inner.clone().prop_map(|e| RuleExpr::Not(Box::new(e))),
                (inner.clone(), inner.clone())
                    .prop_map(|(l, r)| RuleExpr::binary(BinaryOp::Or, l, r)),
                (inner.clone(), inner).prop_map(|(l, r)| RuleExpr::binary(BinaryOp::And, l, r)),
            ]
        })
    }

    fn entity_strategy() -> impl Strategy<Value = EntityDef> {
        let relation = (
            name_strategy(),
            prop::collection::vec(
                (name_strategy(), prop::option::of(name_strategy())),
                1..3,
            ),
        )
            .prop_map(|(name, targets)| RelationDef {
                name,
                targets: targets
                    .into_iter()
                    .map(|(entity, relation)| RelationTarget { entity, relation })
                    .collect(),
            });
        let attribute = (
            name_strategy(),
            prop_oneof![Just("string"), Just("int"), Just("bool"), Just("float")],
            any::<bool>(),
        )
            .prop_map(|(name, ty, is_array)| AttributeDef {
                name,
                type_name: ty.to_string(),
                is_array,
            });
        let permission =
            (name_strategy(), expr_strategy()).prop_map(|(name, rule)| PermissionDef { name, rule });

        (
            name_strategy(),
            prop::collection::vec(relation, 0..3),
            prop::collection::vec(attribute, 0..3),
            prop::collection::vec(permission, 0..3),
        )
            .prop_map(|(name, relations, attributes, permissions)| EntityDef {
                name,
                relations,
                attributes,
                permissions,
            })
    }

    fn schema_strategy() -> impl Strategy<Value = SchemaAst> {
        let rule = (
            name_strategy(),
            prop::collection::vec(name_strategy(), 1..3),
        )
            .prop_map(|(name, params)| RuleDef {
                name,
                params,
                body: "resource.level >= 2 && subject.active".to_string(),
            });
        (
            prop::collection::vec(rule, 0..2),
            prop::collection::vec(entity_strategy(), 0..4),
        )
            .prop_map(|(rules, entities)| SchemaAst { rules, entities })
    }

    proptest! {
        #[test]
        fn prop_parse_generate_round_trip(ast in schema_strategy()) {
            let source = generate(&ast);
            let reparsed = parse(&source);
            prop_assert!(reparsed.is_ok(), "generated source failed to parse:\n{}\n{:?}", source, reparsed);
            prop_assert_eq!(reparsed.unwrap(), ast);
        }
    }
}
