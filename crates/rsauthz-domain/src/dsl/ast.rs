//! Schema AST produced by the parser.
//!
//! Nodes carry no source positions so that two ASTs describing the same
//! schema compare equal regardless of formatting.

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaAst {
    pub rules: Vec<RuleDef>,
    pub entities: Vec<EntityDef>,
}

/// `rule name(params) { body }` with the body kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDef {
    pub name: String,
    pub relations: Vec<RelationDef>,
    pub attributes: Vec<AttributeDef>,
    pub permissions: Vec<PermissionDef>,
}

impl EntityDef {
    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.permissions.iter().any(|p| p.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|a| a.name == name)
    }

    /// True if `name` is a relation or a permission of this entity.
    pub fn has_relation_or_permission(&self, name: &str) -> bool {
        self.relation(name).is_some() || self.has_permission(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub name: String,
    pub targets: Vec<RelationTarget>,
}

/// `@entity` or `@entity#relation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationTarget {
    pub entity: String,
    pub relation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeDef {
    pub name: String,
    /// Type keyword as written; checked against the whitelist by the validator.
    pub type_name: String,
    pub is_array: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDef {
    pub name: String,
    pub rule: RuleExpr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
}

/// Permission rule expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleExpr {
    /// Bare relation or permission name.
    Identifier(String),
    /// `relation.permission`
    Member { relation: String, permission: String },
    /// `name(arg, ...)`
    Call { name: String, args: Vec<String> },
    /// `rule(<expression>)`
    Inline { expression: String },
    Not(Box<RuleExpr>),
    Binary {
        op: BinaryOp,
        left: Box<RuleExpr>,
        right: Box<RuleExpr>,
    },
}

impl RuleExpr {
    pub fn ident(name: impl Into<String>) -> Self {
        RuleExpr::Identifier(name.into())
    }

    pub fn binary(op: BinaryOp, left: RuleExpr, right: RuleExpr) -> Self {
        RuleExpr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}
