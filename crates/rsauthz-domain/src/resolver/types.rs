//! Request and response types for the resolver.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::model::{AttributeValue, RelationTuple, SubjectReference};

/// Internal request for evaluating one rule against one entity instance.
#[derive(Debug, Clone)]
pub struct EvaluationRequest {
    pub tenant_id: String,
    pub schema_version: String,
    pub entity_type: String,
    pub entity_id: String,
    pub subject_type: String,
    pub subject_id: String,
    /// Tuples visible only to this request. Shared across recursive calls.
    pub contextual_tuples: Arc<Vec<RelationTuple>>,
    /// Exposed to expressions as `request`.
    pub context: Arc<HashMap<String, AttributeValue>>,
    pub depth: u32,
}

impl EvaluationRequest {
    /// The same request one level deeper (e.g. a permission referencing another).
    pub(crate) fn deeper(&self) -> Self {
        Self {
            depth: self.depth + 1,
            ..self.clone()
        }
    }

    /// The request re-rooted at another entity instance, one level deeper.
    pub(crate) fn at_entity(&self, entity_type: &str, entity_id: &str) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            depth: self.depth + 1,
            ..self.clone()
        }
    }
}

/// Request for a permission check.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub tenant_id: String,
    /// Schema version to evaluate against; latest when `None`.
    #[serde(default)]
    pub schema_version: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
    pub permission: String,
    pub subject_type: String,
    pub subject_id: String,
    #[serde(default)]
    pub contextual_tuples: Vec<RelationTuple>,
    #[serde(default)]
    pub context: HashMap<String, AttributeValue>,
}

impl CheckRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        permission: impl Into<String>,
        subject_type: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            schema_version: None,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            permission: permission.into(),
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            contextual_tuples: Vec::new(),
            context: HashMap::new(),
        }
    }

    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = Some(version.into());
        self
    }

    pub fn with_contextual_tuples(mut self, tuples: Vec<RelationTuple>) -> Self {
        self.contextual_tuples = tuples;
        self
    }

    pub fn with_context(mut self, context: HashMap<String, AttributeValue>) -> Self {
        self.context = context;
        self
    }

    /// Checks that every required field is present.
    pub fn validate(&self) -> DomainResult<()> {
        require("tenant_id", &self.tenant_id)?;
        require("entity_type", &self.entity_type)?;
        require("entity_id", &self.entity_id)?;
        require("permission", &self.permission)?;
        require("subject_type", &self.subject_type)?;
        require("subject_id", &self.subject_id)
    }
}

pub(crate) fn require(field: &str, value: &str) -> DomainResult<()> {
    if value.trim().is_empty() {
        return Err(DomainError::missing(field));
    }
    Ok(())
}

/// Result of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    pub allowed: bool,
}

/// Request for every permission of an entity type for one subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubjectPermissionRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub schema_version: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
    pub subject_type: String,
    pub subject_id: String,
    #[serde(default)]
    pub contextual_tuples: Vec<RelationTuple>,
    #[serde(default)]
    pub context: HashMap<String, AttributeValue>,
}

impl SubjectPermissionRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        subject_type: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        require("tenant_id", &self.tenant_id)?;
        require("entity_type", &self.entity_type)?;
        require("entity_id", &self.entity_id)?;
        require("subject_type", &self.subject_type)?;
        require("subject_id", &self.subject_id)
    }

    /// The check request for one permission of this entity.
    pub(crate) fn check_request(&self, permission: &str) -> CheckRequest {
        CheckRequest {
            tenant_id: self.tenant_id.clone(),
            schema_version: self.schema_version.clone(),
            entity_type: self.entity_type.clone(),
            entity_id: self.entity_id.clone(),
            permission: permission.to_string(),
            subject_type: self.subject_type.clone(),
            subject_id: self.subject_id.clone(),
            contextual_tuples: self.contextual_tuples.clone(),
            context: self.context.clone(),
        }
    }
}

/// Permission name → allowed, in name order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectPermissionResult {
    pub permissions: BTreeMap<String, bool>,
}

/// Request to explain how a permission could be granted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub schema_version: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
    pub permission: String,
}

impl ExpandRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        permission: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            schema_version: None,
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            permission: permission.into(),
        }
    }
}

/// Decision tree produced by expand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExpandNode {
    /// Granted if any child grants. `label` names the relation or permission.
    Union {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        children: Vec<ExpandNode>,
    },
    /// Granted if every child grants.
    Intersection { children: Vec<ExpandNode> },
    /// Negation; always exactly one child.
    Exclusion { children: Vec<ExpandNode> },
    Leaf { leaf: ExpandLeaf },
}

impl ExpandNode {
    pub fn children(&self) -> &[ExpandNode] {
        match self {
            ExpandNode::Union { children, .. }
            | ExpandNode::Intersection { children }
            | ExpandNode::Exclusion { children } => children,
            ExpandNode::Leaf { .. } => &[],
        }
    }

    pub fn label(&self) -> Option<&str> {
        match self {
            ExpandNode::Union { label, .. } => label.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpandLeaf {
    /// A stored grantee (possibly a userset).
    Subject(SubjectReference),
    /// An attribute expression that cannot be decomposed statically.
    Expression(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandResult {
    pub tree: ExpandNode,
}

/// Request for the entities of a type a subject holds a permission on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupEntityRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub schema_version: Option<String>,
    pub entity_type: String,
    pub permission: String,
    pub subject_type: String,
    pub subject_id: String,
    #[serde(default)]
    pub contextual_tuples: Vec<RelationTuple>,
    #[serde(default)]
    pub context: HashMap<String, AttributeValue>,
    /// Maximum number of results; 0 selects the configured default.
    #[serde(default)]
    pub page_size: u32,
    /// Resume scanning strictly after this candidate ID.
    #[serde(default)]
    pub page_token: Option<String>,
}

impl LookupEntityRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        entity_type: impl Into<String>,
        permission: impl Into<String>,
        subject_type: impl Into<String>,
        subject_id: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            entity_type: entity_type.into(),
            permission: permission.into(),
            subject_type: subject_type.into(),
            subject_id: subject_id.into(),
            ..Default::default()
        }
    }

    pub fn with_page(mut self, page_size: u32, page_token: Option<String>) -> Self {
        self.page_size = page_size;
        self.page_token = page_token;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupEntityResult {
    pub entity_ids: Vec<String>,
    pub next_page_token: Option<String>,
}

/// Request for the subjects of a type holding a permission on one entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LookupSubjectRequest {
    pub tenant_id: String,
    #[serde(default)]
    pub schema_version: Option<String>,
    pub entity_type: String,
    pub entity_id: String,
    pub permission: String,
    pub subject_type: String,
    #[serde(default)]
    pub contextual_tuples: Vec<RelationTuple>,
    #[serde(default)]
    pub context: HashMap<String, AttributeValue>,
    #[serde(default)]
    pub page_size: u32,
    #[serde(default)]
    pub page_token: Option<String>,
}

impl LookupSubjectRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        permission: impl Into<String>,
        subject_type: impl Into<String>,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            permission: permission.into(),
            subject_type: subject_type.into(),
            ..Default::default()
        }
    }

    pub fn with_page(mut self, page_size: u32, page_token: Option<String>) -> Self {
        self.page_size = page_size;
        self.page_token = page_token;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupSubjectResult {
    pub subject_ids: Vec<String>,
    pub next_page_token: Option<String>,
}
