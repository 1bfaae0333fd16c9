//! CEL execution context for variable bindings

use std::collections::HashMap;

use cel_interpreter::objects::Key;
use cel_interpreter::{Context, Value};

use crate::model::AttributeValue;

/// Variable bindings for one CEL evaluation.
#[derive(Debug, Default, Clone)]
pub struct CelContext {
    variables: HashMap<String, CelValue>,
}

/// A value that can be bound into a CEL context.
#[derive(Debug, Clone, PartialEq)]
pub enum CelValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<CelValue>),
    Map(HashMap<String, CelValue>),
}

impl CelContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: CelValue) {
        self.variables.insert(name.into(), value);
    }

    pub fn set_map(&mut self, name: impl Into<String>, values: HashMap<String, CelValue>) {
        self.set(name, CelValue::Map(values));
    }

    /// Binds an attribute map (e.g. all attributes of the resource) as a CEL map.
    pub fn set_attributes(
        &mut self,
        name: impl Into<String>,
        attributes: &HashMap<String, AttributeValue>,
    ) {
        let values = attributes
            .iter()
            .map(|(k, v)| (k.clone(), CelValue::from(v)))
            .collect();
        self.set_map(name, values);
    }

    pub(crate) fn to_cel_context(&self) -> Context<'_> {
        let mut ctx = Context::default();
        for (name, value) in &self.variables {
            ctx.add_variable_from_value(name.as_str(), cel_value_to_value(value));
        }
        ctx
    }
}

impl From<&AttributeValue> for CelValue {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Bool(b) => CelValue::Bool(*b),
            AttributeValue::Int(i) => CelValue::Int(*i),
            AttributeValue::Float(f) => CelValue::Float(*f),
            AttributeValue::String(s) => CelValue::String(s.clone()),
            AttributeValue::List(items) => CelValue::List(items.iter().map(CelValue::from).collect()),
            AttributeValue::Map(map) => CelValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), CelValue::from(v)))
                    .collect(),
            ),
        }
    }
}

fn cel_value_to_value(v: &CelValue) -> Value {
    match v {
        CelValue::Bool(b) => Value::Bool(*b),
        CelValue::Int(i) => Value::Int(*i),
        CelValue::Float(f) => Value::Float(*f),
        CelValue::String(s) => Value::String(s.clone().into()),
        CelValue::List(list) => Value::List(
            list.iter()
                .map(cel_value_to_value)
                .collect::<Vec<_>>()
                .into(),
        ),
        CelValue::Map(map) => {
            let converted: HashMap<Key, Value> = map
                .iter()
                .map(|(k, v)| (Key::String(k.clone().into()), cel_value_to_value(v)))
                .collect();
            Value::Map(converted.into())
        }
    }
}

/// Result of evaluating a CEL expression.
#[derive(Debug, Clone)]
pub struct CelResult {
    value: Value,
}

impl CelResult {
    pub(crate) fn new(value: Value) -> Self {
        Self { value }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match &self.value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_truthy(&self) -> bool {
        self.as_bool().unwrap_or(false)
    }

    #[must_use]
    pub fn raw(&self) -> &Value {
        &self.value
    }

    /// Short CEL type name of the result, for error messages.
    pub fn type_name(&self) -> &'static str {
        match &self.value {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::UInt(_) => "uint",
            Value::Float(_) => "double",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Null => "null",
            _ => "other",
        }
    }
}
