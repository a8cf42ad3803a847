//! Typed attribute tree
//!
//! The flattened, schema-shaped view of a cluster that is handed to Terraform
//! as resource state. Keys are kept ordered so that identical input always
//! serializes to identical state.

use crate::schema::{AttributeType, SchemaBlock, UNKNOWN_VALUE};
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised when state or configuration does not fit the schema
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AttributeError {
    #[error("{path}: expected {expected}")]
    TypeMismatch { path: String, expected: &'static str },
    #[error("{path}: value is not known yet")]
    Unknown { path: String },
}

/// A single attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, String>),
    Block(AttributeTree),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[AttrValue]> {
        match self {
            AttrValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<&AttributeTree> {
        match self {
            AttrValue::Block(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AttrValue::String(s) => Value::String(s.clone()),
            AttrValue::Int(i) => Value::Number(Number::from(*i)),
            AttrValue::Bool(b) => Value::Bool(*b),
            AttrValue::List(items) => Value::Array(items.iter().map(AttrValue::to_json).collect()),
            AttrValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ),
            AttrValue::Block(tree) => tree.to_json(),
        }
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::Int(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::Int(value.into())
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

impl From<AttributeTree> for AttrValue {
    fn from(value: AttributeTree) -> Self {
        AttrValue::Block(value)
    }
}

/// An object of named attributes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeTree {
    values: BTreeMap<String, AttrValue>,
}

impl AttributeTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<AttrValue>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Insert a nested block as the single element of a list
    pub fn insert_block(&mut self, key: &str, block: AttributeTree) {
        self.values
            .insert(key.to_string(), AttrValue::List(vec![AttrValue::Block(block)]));
    }

    pub fn get(&self, key: &str) -> Option<&AttrValue> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(AttrValue::as_str)
    }

    pub fn get_int(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(AttrValue::as_int)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(AttrValue::as_bool)
    }

    pub fn get_list(&self, key: &str) -> &[AttrValue] {
        self.get(key).and_then(AttrValue::as_list).unwrap_or(&[])
    }

    /// Nested blocks stored under `key`, in order
    pub fn blocks(&self, key: &str) -> impl Iterator<Item = &AttributeTree> {
        self.get_list(key).iter().filter_map(AttrValue::as_block)
    }

    /// First nested block under `key`, for single-item blocks
    pub fn block(&self, key: &str) -> Option<&AttributeTree> {
        self.blocks(key).next()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.to_json_map())
    }

    pub fn to_json_map(&self) -> Map<String, Value> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect()
    }

    /// Read a JSON object shaped by `block` into a typed tree.
    ///
    /// Null values are dropped, keys not declared by the schema are ignored.
    pub fn from_json(block: &SchemaBlock, value: &Value) -> Result<Self, AttributeError> {
        tree_from_json(block, value, "")
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

fn tree_from_json(block: &SchemaBlock, value: &Value, path: &str) -> Result<AttributeTree, AttributeError> {
    let object = value.as_object().ok_or_else(|| AttributeError::TypeMismatch {
        path: path.to_string(),
        expected: "object",
    })?;

    let mut tree = AttributeTree::new();
    for (name, attr) in &block.attributes {
        if let Some(v) = object.get(name).filter(|v| !v.is_null()) {
            let attr_path = join_path(path, name);
            tree.values
                .insert(name.clone(), value_from_json(&attr.attr_type, v, &attr_path)?);
        }
    }

    for (name, nested) in &block.blocks {
        let Some(v) = object.get(name).filter(|v| !v.is_null()) else {
            continue;
        };
        let block_path = join_path(path, name);
        let items = v.as_array().ok_or_else(|| AttributeError::TypeMismatch {
            path: block_path.clone(),
            expected: "list of blocks",
        })?;
        let blocks = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                tree_from_json(&nested.block, item, &format!("{}.{}", block_path, i)).map(AttrValue::Block)
            })
            .collect::<Result<Vec<_>, _>>()?;
        tree.values.insert(name.clone(), AttrValue::List(blocks));
    }

    Ok(tree)
}

fn value_from_json(attr_type: &AttributeType, value: &Value, path: &str) -> Result<AttrValue, AttributeError> {
    if value.as_str() == Some(UNKNOWN_VALUE) {
        return Err(AttributeError::Unknown {
            path: path.to_string(),
        });
    }

    let mismatch = |expected: &'static str| AttributeError::TypeMismatch {
        path: path.to_string(),
        expected,
    };

    match attr_type {
        AttributeType::String => value
            .as_str()
            .map(AttrValue::from)
            .ok_or_else(|| mismatch("string")),
        AttributeType::Number => value
            .as_i64()
            .or_else(|| value.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
            .map(AttrValue::Int)
            .ok_or_else(|| mismatch("whole number")),
        AttributeType::Bool => value
            .as_bool()
            .map(AttrValue::Bool)
            .ok_or_else(|| mismatch("bool")),
        AttributeType::List(element_type) => {
            let items = value.as_array().ok_or_else(|| mismatch("list"))?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| value_from_json(element_type, item, &format!("{}.{}", path, i)))
                .collect::<Result<Vec<_>, _>>()
                .map(AttrValue::List)
        }
        AttributeType::Map(_) => {
            let entries = value.as_object().ok_or_else(|| mismatch("map"))?;
            entries
                .iter()
                .map(|(k, v)| {
                    v.as_str()
                        .map(|s| (k.clone(), s.to_string()))
                        .ok_or_else(|| AttributeError::TypeMismatch {
                            path: format!("{}.{}", path, k),
                            expected: "string",
                        })
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(AttrValue::Map)
        }
    }
}
