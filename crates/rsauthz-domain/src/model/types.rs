//! Runtime domain model consumed by the resolver.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A compiled, immutable schema version for one tenant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tenant_id: String,
    /// The DSL text this schema was compiled from.
    pub dsl: String,
    pub rules: Vec<Rule>,
    pub entities: Vec<Entity>,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Schema {
    /// Looks up an entity definition by type name.
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Looks up a top-level rule by name.
    pub fn rule(&self, name: &str) -> Option<&Rule> {
        self.rules.iter().find(|r| r.name == name)
    }
}

/// An entity type: relations, attributes and permissions share one namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub name: String,
    #[serde(default)]
    pub relations: Vec<Relation>,
    #[serde(default)]
    pub attributes: Vec<AttributeSchema>,
    #[serde(default)]
    pub permissions: Vec<Permission>,
}

impl Entity {
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn permission(&self, name: &str) -> Option<&Permission> {
        self.permissions.iter().find(|p| p.name == name)
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// A relation and the subject types it may point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub targets: Vec<RelationReference>,
}

impl Relation {
    /// Entity types a concrete (non-userset) tuple on this relation may reference.
    pub fn direct_target_types(&self) -> impl Iterator<Item = &str> {
        self.targets
            .iter()
            .filter(|t| t.relation.is_none())
            .map(|t| t.entity_type.as_str())
    }

    /// Whether a tuple subject of the given shape is allowed by this relation.
    pub fn allows_subject(&self, subject_type: &str, subject_relation: Option<&str>) -> bool {
        self.targets.iter().any(|t| {
            t.entity_type == subject_type && t.relation.as_deref() == subject_relation
        })
    }
}

/// `Type` or `Type#relation` (a userset reference).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationReference {
    pub entity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

impl RelationReference {
    pub fn direct(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            relation: None,
        }
    }

    pub fn userset(entity_type: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            relation: Some(relation.into()),
        }
    }
}

impl fmt::Display for RelationReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            Some(rel) => write!(f, "{}#{}", self.entity_type, rel),
            None => write!(f, "{}", self.entity_type),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub name: String,
    pub attribute_type: AttributeType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeType {
    pub scalar: ScalarType,
    pub is_array: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarType {
    String,
    Int,
    Bool,
    Float,
}

impl ScalarType {
    /// Parses a DSL type keyword; `None` for anything outside the whitelist.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(ScalarType::String),
            "int" => Some(ScalarType::Int),
            "bool" => Some(ScalarType::Bool),
            "float" => Some(ScalarType::Float),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ScalarType::String => "string",
            ScalarType::Int => "int",
            ScalarType::Bool => "bool",
            ScalarType::Float => "float",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_array {
            write!(f, "{}[]", self.scalar.as_str())
        } else {
            write!(f, "{}", self.scalar.as_str())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
    pub rule: PermissionRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalOperator {
    Or,
    And,
    Not,
}

impl fmt::Display for LogicalOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogicalOperator::Or => "or",
            LogicalOperator::And => "and",
            LogicalOperator::Not => "not",
        };
        f.write_str(s)
    }
}

/// Permission rule tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PermissionRule {
    /// A relation or permission name on the same entity.
    Relation { relation: String },
    /// `right` is `None` for `not`.
    Logical {
        operator: LogicalOperator,
        left: Box<PermissionRule>,
        right: Option<Box<PermissionRule>>,
    },
    /// `relation.permission`: evaluated on every entity reached through `relation`.
    Hierarchical { relation: String, permission: String },
    /// Inline boolean expression over `resource`/`subject`/`request`.
    Abac { expression: String },
    /// Call of a top-level [`Rule`].
    RuleCall {
        rule_name: String,
        arguments: Vec<String>,
    },
}

impl PermissionRule {
    pub fn relation(name: impl Into<String>) -> Self {
        PermissionRule::Relation {
            relation: name.into(),
        }
    }

    pub fn or(left: PermissionRule, right: PermissionRule) -> Self {
        PermissionRule::Logical {
            operator: LogicalOperator::Or,
            left: Box::new(left),
            right: Some(Box::new(right)),
        }
    }

    pub fn and(left: PermissionRule, right: PermissionRule) -> Self {
        PermissionRule::Logical {
            operator: LogicalOperator::And,
            left: Box::new(left),
            right: Some(Box::new(right)),
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(inner: PermissionRule) -> Self {
        PermissionRule::Logical {
            operator: LogicalOperator::Not,
            left: Box::new(inner),
            right: None,
        }
    }

    pub fn hierarchical(relation: impl Into<String>, permission: impl Into<String>) -> Self {
        PermissionRule::Hierarchical {
            relation: relation.into(),
            permission: permission.into(),
        }
    }

    pub fn abac(expression: impl Into<String>) -> Self {
        PermissionRule::Abac {
            expression: expression.into(),
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            PermissionRule::Relation { .. } => "relation",
            PermissionRule::Logical { .. } => "logical",
            PermissionRule::Hierarchical { .. } => "hierarchical",
            PermissionRule::Abac { .. } => "abac",
            PermissionRule::RuleCall { .. } => "rule_call",
        }
    }
}

/// A reusable named boolean expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    pub parameters: Vec<String>,
    pub body: String,
}

/// A stored relationship fact: `entity#relation@subject[#subject_relation]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationTuple {
    pub entity_type: String,
    pub entity_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_relation: Option<String>,
}

impl RelationTuple {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        relation: impl Into<String>,
        subject_type: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            relation: relation.into(),
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            subject_relation: None,
        }
    }

    /// Turns the subject into a userset (`team:T#member`).
    pub fn with_subject_relation(mut self, relation: impl Into<String>) -> Self {
        self.subject_relation = Some(relation.into());
        self
    }

    /// True when the subject position denotes the holders of a relation.
    pub fn is_userset(&self) -> bool {
        self.subject_relation
            .as_deref()
            .is_some_and(|r| !r.is_empty())
    }

    /// Parses `type:id#relation@subject_type:subject_id[#subject_relation]`.
    pub fn parse(value: &str) -> Result<Self, &'static str> {
        let (entity, subject) = value
            .split_once('@')
            .ok_or("tuple must contain '@' between entity and subject")?;
        let (entity, relation) = entity
            .split_once('#')
            .ok_or("entity must be in 'type:id#relation' format")?;
        let (entity_type, entity_id) = split_typed_id(entity)?;
        if relation.is_empty() {
            return Err("relation cannot be empty");
        }

        let (subject, subject_relation) = match subject.split_once('#') {
            Some((s, r)) if !r.is_empty() => (s, Some(r.to_string())),
            Some(_) => return Err("subject relation cannot be empty"),
            None => (subject, None),
        };
        let (subject_type, subject_id) = split_typed_id(subject)?;

        Ok(Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            relation: relation.to_string(),
            subject_type: subject_type.to_string(),
            subject_id: subject_id.to_string(),
            subject_relation,
        })
    }
}

fn split_typed_id(value: &str) -> Result<(&str, &str), &'static str> {
    match value.split_once(':') {
        Some((t, id)) if !t.is_empty() && !id.is_empty() => Ok((t, id)),
        _ => Err("reference must be in 'type:id' format"),
    }
}

impl fmt::Display for RelationTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}#{}@{}:{}",
            self.entity_type, self.entity_id, self.relation, self.subject_type, self.subject_id
        )?;
        if let Some(rel) = &self.subject_relation {
            write!(f, "#{rel}")?;
        }
        Ok(())
    }
}

/// Filter over relation tuples; `None` fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationFilter {
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub relation: Option<String>,
    pub subject_type: Option<String>,
    pub subject_id: Option<String>,
}

impl RelationFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn subject(mut self, subject_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        self.subject_type = Some(subject_type.into());
        self.subject_id = Some(subject_id.into());
        self
    }

    pub fn subject_type(mut self, subject_type: impl Into<String>) -> Self {
        self.subject_type = Some(subject_type.into());
        self
    }

    pub fn matches(&self, tuple: &RelationTuple) -> bool {
        fn field(filter: &Option<String>, value: &str) -> bool {
            filter.as_deref().map_or(true, |f| f == value)
        }
        field(&self.entity_type, &tuple.entity_type)
            && field(&self.entity_id, &tuple.entity_id)
            && field(&self.relation, &tuple.relation)
            && field(&self.subject_type, &tuple.subject_type)
            && field(&self.subject_id, &tuple.subject_id)
    }
}

/// A subject reference; `relation` marks a userset subject.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectReference {
    pub subject_type: String,
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

impl SubjectReference {
    pub fn new(subject_type: impl Into<String>, subject_id: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            relation: None,
        }
    }
}

impl From<&RelationTuple> for SubjectReference {
    fn from(tuple: &RelationTuple) -> Self {
        Self {
            subject_type: tuple.subject_type.clone(),
            subject_id: tuple.subject_id.clone(),
            relation: tuple.subject_relation.clone(),
        }
    }
}

impl fmt::Display for SubjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_type, self.subject_id)?;
        if let Some(rel) = &self.relation {
            write!(f, "#{rel}")?;
        }
        Ok(())
    }
}

/// A single attribute value attached to an entity instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub entity_type: String,
    pub entity_id: String,
    pub name: String,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Dynamically-typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<AttributeValue>),
    Map(BTreeMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Converts JSON into an attribute value. JSON `null` has no representation.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        use serde_json::Value as Json;
        Some(match value {
            Json::Null => return None,
            Json::Bool(b) => AttributeValue::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => AttributeValue::Int(i),
                None => AttributeValue::Float(n.as_f64()?),
            },
            Json::String(s) => AttributeValue::String(s),
            Json::Array(items) => AttributeValue::List(
                items
                    .into_iter()
                    .map(AttributeValue::from_json)
                    .collect::<Option<Vec<_>>>()?,
            ),
            Json::Object(map) => AttributeValue::Map(
                map.into_iter()
                    .map(|(k, v)| AttributeValue::from_json(v).map(|v| (k, v)))
                    .collect::<Option<BTreeMap<_, _>>>()?,
            ),
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            AttributeValue::Bool(b) => Json::Bool(*b),
            AttributeValue::Int(i) => Json::from(*i),
            AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            AttributeValue::String(s) => Json::String(s.clone()),
            AttributeValue::List(items) => {
                Json::Array(items.iter().map(AttributeValue::to_json).collect())
            }
            AttributeValue::Map(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Checks the value against a declared attribute type.
    pub fn conforms_to(&self, ty: AttributeType) -> bool {
        fn scalar(value: &AttributeValue, ty: ScalarType) -> bool {
            matches!(
                (value, ty),
                (AttributeValue::Bool(_), ScalarType::Bool)
                    | (AttributeValue::Int(_), ScalarType::Int)
                    | (AttributeValue::Int(_), ScalarType::Float)
                    | (AttributeValue::Float(_), ScalarType::Float)
                    | (AttributeValue::String(_), ScalarType::String)
            )
        }
        match self {
            AttributeValue::List(items) if ty.is_array => {
                items.iter().all(|v| scalar(v, ty.scalar))
            }
            _ if ty.is_array => false,
            other => scalar(other, ty.scalar),
        }
    }
}

impl From<bool> for AttributeValue {
    fn from(v: bool) -> Self {
        AttributeValue::Bool(v)
    }
}

impl From<i64> for AttributeValue {
    fn from(v: i64) -> Self {
        AttributeValue::Int(v)
    }
}

impl From<f64> for AttributeValue {
    fn from(v: f64) -> Self {
        AttributeValue::Float(v)
    }
}

impl From<&str> for AttributeValue {
    fn from(v: &str) -> Self {
        AttributeValue::String(v.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(v: String) -> Self {
        AttributeValue::String(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_parse_and_display() {
        let tuple = RelationTuple::parse("repository:r1#contributor@team:t1#member").unwrap();
        assert_eq!(tuple.entity_type, "repository");
        assert_eq!(tuple.entity_id, "r1");
        assert_eq!(tuple.relation, "contributor");
        assert_eq!(tuple.subject_type, "team");
        assert_eq!(tuple.subject_id, "t1");
        assert_eq!(tuple.subject_relation.as_deref(), Some("member"));
        assert!(tuple.is_userset());
        assert_eq!(
            tuple.to_string(),
            "repository:r1#contributor@team:t1#member"
        );

        let direct = RelationTuple::parse("document:doc1#owner@user:alice").unwrap();
        assert!(!direct.is_userset());
        assert_eq!(direct.to_string(), "document:doc1#owner@user:alice");
    }

    #[test]
    fn test_tuple_parse_rejects_malformed_input() {
        for input in [
            "document:doc1#owner",
            "document#owner@user:alice",
            "document:doc1@user:alice",
            "document:doc1#owner@user",
            "document:doc1#owner@user:alice#",
            ":doc1#owner@user:alice",
        ] {
            assert!(RelationTuple::parse(input).is_err(), "accepted {input}");
        }
    }

    #[test]
    fn test_filter_matches_only_set_fields() {
        let tuple = RelationTuple::new("document", "doc1", "viewer", "user", "alice");
        assert!(RelationFilter::new().matches(&tuple));
        assert!(RelationFilter::new()
            .entity("document", "doc1")
            .relation("viewer")
            .matches(&tuple));
        assert!(!RelationFilter::new().relation("owner").matches(&tuple));
        assert!(!RelationFilter::new().subject("user", "bob").matches(&tuple));
    }

    #[test]
    fn test_attribute_value_json_conversion() {
        let json = serde_json::json!({
            "public": true,
            "level": 3,
            "score": 1.5,
            "tags": ["a", "b"],
            "owner": {"name": "alice"}
        });
        let value = AttributeValue::from_json(json.clone()).unwrap();
        match &value {
            AttributeValue::Map(map) => {
                assert_eq!(map.get("public"), Some(&AttributeValue::Bool(true)));
                assert_eq!(map.get("level"), Some(&AttributeValue::Int(3)));
                assert_eq!(map.get("score"), Some(&AttributeValue::Float(1.5)));
            }
            other => panic!("expected map, got {other:?}"),
        }
        assert_eq!(value.to_json(), json);
        assert!(AttributeValue::from_json(serde_json::Value::Null).is_none());
    }

    #[test]
    fn test_attribute_value_conforms_to_declared_type() {
        let string_array = AttributeType {
            scalar: ScalarType::String,
            is_array: true,
        };
        let int = AttributeType {
            scalar: ScalarType::Int,
            is_array: false,
        };
        assert!(AttributeValue::List(vec!["a".into(), "b".into()]).conforms_to(string_array));
        assert!(!AttributeValue::List(vec![AttributeValue::Int(1)]).conforms_to(string_array));
        assert!(!AttributeValue::String("a".into()).conforms_to(string_array));
        assert!(AttributeValue::Int(7).conforms_to(int));
        assert!(!AttributeValue::Bool(true).conforms_to(int));
    }

    #[test]
    fn test_relation_allows_subject_shapes() {
        let relation = Relation {
            name: "contributor".to_string(),
            targets: vec![
                RelationReference::direct("user"),
                RelationReference::userset("team", "member"),
            ],
        };
        assert!(relation.allows_subject("user", None));
        assert!(relation.allows_subject("team", Some("member")));
        assert!(!relation.allows_subject("team", None));
        assert_eq!(relation.direct_target_types().collect::<Vec<_>>(), vec!["user"]);
    }
}
