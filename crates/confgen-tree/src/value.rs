//! Configuration tree types
//!
//! A `ConfigTree` is always a mapping at the top level. Values below it are
//! mappings, sequences or scalars. Keys are kept sorted.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::TreeError;

/// Leaf value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Scalar {
    /// Borrow the string payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Integer(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

/// Shape of a value, used when reporting strict-merge conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Mapping,
    Sequence,
    Scalar,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Mapping => "mapping",
            ValueKind::Sequence => "sequence",
            ValueKind::Scalar => "scalar",
        };
        f.write_str(name)
    }
}

/// A value inside a configuration tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Mapping(ConfigTree),
    Sequence(Vec<ConfigValue>),
    Scalar(Scalar),
}

impl ConfigValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ConfigValue::Mapping(_) => ValueKind::Mapping,
            ConfigValue::Sequence(_) => ValueKind::Sequence,
            ConfigValue::Scalar(_) => ValueKind::Scalar,
        }
    }

    pub fn as_mapping(&self) -> Option<&ConfigTree> {
        match self {
            ConfigValue::Mapping(tree) => Some(tree),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[ConfigValue]> {
        match self {
            ConfigValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::Scalar(s) => s.as_str(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Scalar(Scalar::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Scalar(Scalar::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ConfigValue::Scalar(Scalar::Null))
    }
}

impl From<Scalar> for ConfigValue {
    fn from(s: Scalar) -> Self {
        ConfigValue::Scalar(s)
    }
}

impl From<ConfigTree> for ConfigValue {
    fn from(tree: ConfigTree) -> Self {
        ConfigValue::Mapping(tree)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        ConfigValue::Scalar(Scalar::String(s.to_string()))
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        ConfigValue::Scalar(Scalar::String(s))
    }
}

impl From<i64> for ConfigValue {
    fn from(i: i64) -> Self {
        ConfigValue::Scalar(Scalar::Integer(i))
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        ConfigValue::Scalar(Scalar::Bool(b))
    }
}

impl From<Value> for ConfigValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => ConfigValue::Scalar(Scalar::Null),
            Value::Bool(b) => ConfigValue::Scalar(Scalar::Bool(b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ConfigValue::Scalar(Scalar::Integer(i)),
                None => ConfigValue::Scalar(Scalar::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => ConfigValue::Scalar(Scalar::String(s)),
            Value::Array(items) => {
                ConfigValue::Sequence(items.into_iter().map(ConfigValue::from).collect())
            }
            Value::Object(map) => ConfigValue::Mapping(
                map.into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<ConfigValue> for Value {
    fn from(value: ConfigValue) -> Self {
        match value {
            ConfigValue::Scalar(Scalar::Null) => Value::Null,
            ConfigValue::Scalar(Scalar::Bool(b)) => Value::Bool(b),
            ConfigValue::Scalar(Scalar::Integer(i)) => Value::Number(i.into()),
            ConfigValue::Scalar(Scalar::Float(f)) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ConfigValue::Scalar(Scalar::String(s)) => Value::String(s),
            ConfigValue::Sequence(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            ConfigValue::Mapping(tree) => tree.into_json(),
        }
    }
}

impl From<toml::Value> for ConfigValue {
    fn from(value: toml::Value) -> Self {
        match value {
            toml::Value::String(s) => ConfigValue::Scalar(Scalar::String(s)),
            toml::Value::Integer(i) => ConfigValue::Scalar(Scalar::Integer(i)),
            toml::Value::Float(f) => ConfigValue::Scalar(Scalar::Float(f)),
            toml::Value::Boolean(b) => ConfigValue::Scalar(Scalar::Bool(b)),
            toml::Value::Datetime(dt) => ConfigValue::Scalar(Scalar::String(dt.to_string())),
            toml::Value::Array(items) => {
                ConfigValue::Sequence(items.into_iter().map(ConfigValue::from).collect())
            }
            toml::Value::Table(table) => ConfigValue::Mapping(
                table
                    .into_iter()
                    .map(|(k, v)| (k, ConfigValue::from(v)))
                    .collect(),
            ),
        }
    }
}

/// A mapping from string keys to configuration values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigTree(BTreeMap<String, ConfigValue>);

impl ConfigTree {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Option<ConfigValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<ConfigValue> {
        self.0.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ConfigValue> {
        self.0.iter()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Look up a value by dot-separated path (`"jail.ssh.maxretry"`)
    pub fn get_path(&self, path: &str) -> Option<&ConfigValue> {
        let mut parts = path.split('.');
        let mut current = self.get(parts.next()?)?;
        for part in parts {
            current = current.as_mapping()?.get(part)?;
        }
        Some(current)
    }

    /// Build a tree from a JSON value, which must be an object
    pub fn from_json(value: Value) -> Result<Self, TreeError> {
        match ConfigValue::from(value) {
            ConfigValue::Mapping(tree) => Ok(tree),
            other => Err(TreeError::NotAMapping(other.kind())),
        }
    }

    /// Build a tree from a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self, TreeError> {
        let table: toml::Table = toml::from_str(s).map_err(|e| TreeError::Parse(e.to_string()))?;
        Ok(table
            .into_iter()
            .map(|(k, v)| (k, ConfigValue::from(v)))
            .collect())
    }

    /// Build a tree from a JSON document
    pub fn from_json_str(s: &str) -> Result<Self, TreeError> {
        let value: Value = serde_json::from_str(s).map_err(|e| TreeError::Parse(e.to_string()))?;
        Self::from_json(value)
    }

    pub fn to_json(&self) -> Value {
        self.clone().into_json()
    }

    pub fn into_json(self) -> Value {
        Value::Object(self.0.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
    }

    /// SHA-256 hex digest of the RFC 8785 canonical JSON encoding.
    ///
    /// Two trees with equal content always produce the same digest.
    pub fn digest(&self) -> Result<String, TreeError> {
        let jcs_bytes = serde_json_canonicalizer::to_vec(&self.to_json())
            .map_err(|e| TreeError::Canonicalize(e.to_string()))?;

        let mut hasher = Sha256::new();
        hasher.update(&jcs_bytes);
        Ok(hex::encode(hasher.finalize()))
    }
}

impl FromIterator<(String, ConfigValue)> for ConfigTree {
    fn from_iter<I: IntoIterator<Item = (String, ConfigValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for ConfigTree {
    type Item = (String, ConfigValue);
    type IntoIter = btree_map::IntoIter<String, ConfigValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a ConfigTree {
    type Item = (&'a String, &'a ConfigValue);
    type IntoIter = btree_map::Iter<'a, String, ConfigValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
