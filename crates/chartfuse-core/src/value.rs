//! Structured values shared by values documents, overlay configs and resources
//!
//! Parsed YAML and JSON documents are converted into a closed tree model
//! ([`StructuredValue`]) before anything merges or rewrites them. Values that
//! cannot be expressed in the model (tagged YAML nodes, complex mapping keys,
//! keys that collide once stringified) are rejected at conversion time with a
//! [`MergeError`] naming the offending path.

use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer, Error as _};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_yaml::{Number, Value as YamlValue};
use std::path::Path;

use crate::error::{CoreError, Result};
use crate::merge::MergeError;

/// Ordered string-keyed mapping
pub type Mapping = IndexMap<String, StructuredValue>;

/// Leaf value
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

/// A document node: mapping, sequence or scalar
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredValue {
    Mapping(Mapping),
    Sequence(Vec<StructuredValue>),
    Scalar(Scalar),
}

impl Default for StructuredValue {
    fn default() -> Self {
        Self::empty_mapping()
    }
}

impl StructuredValue {
    /// Empty mapping, the identity element of [`crate::merge::merge`]
    pub fn empty_mapping() -> Self {
        Self::Mapping(Mapping::new())
    }

    pub fn null() -> Self {
        Self::Scalar(Scalar::Null)
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(value.into()))
    }

    pub fn bool(value: bool) -> Self {
        Self::Scalar(Scalar::Bool(value))
    }

    pub fn int(value: i64) -> Self {
        Self::Scalar(Scalar::Number(value.into()))
    }

    /// Load a single YAML document from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse a single YAML document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: YamlValue = serde_yaml::from_str(yaml)?;
        Ok(Self::try_from(raw)?)
    }

    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: YamlValue = serde_json::from_str(json)?;
        Ok(Self::try_from(raw)?)
    }

    /// Serialize as a YAML document
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Scalar(Scalar::Null))
    }

    pub fn is_empty_mapping(&self) -> bool {
        matches!(self, Self::Mapping(map) if map.is_empty())
    }

    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut Mapping> {
        match self {
            Self::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[StructuredValue]> {
        match self {
            Self::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(Scalar::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Scalar(Scalar::Number(n)) => n.as_i64(),
            _ => None,
        }
    }

    /// Get a direct child of a mapping
    pub fn get_key(&self, key: &str) -> Option<&StructuredValue> {
        self.as_mapping().and_then(|map| map.get(key))
    }

    /// Get a value by dotted path (e.g., "spec.replicas")
    pub fn get(&self, path: &str) -> Option<&StructuredValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(self, &parts)
    }

    /// Set a value by dotted path, creating intermediate mappings
    pub fn set(&mut self, path: &str, value: StructuredValue) {
        let parts: Vec<&str> = path.split('.').collect();
        set_nested(self, &parts, value);
    }
}

impl From<&str> for StructuredValue {
    fn from(value: &str) -> Self {
        Self::string(value)
    }
}

impl From<String> for StructuredValue {
    fn from(value: String) -> Self {
        Self::string(value)
    }
}

impl From<Vec<StructuredValue>> for StructuredValue {
    fn from(items: Vec<StructuredValue>) -> Self {
        Self::Sequence(items)
    }
}

impl From<Mapping> for StructuredValue {
    fn from(map: Mapping) -> Self {
        Self::Mapping(map)
    }
}

impl TryFrom<YamlValue> for StructuredValue {
    type Error = MergeError;

    fn try_from(value: YamlValue) -> std::result::Result<Self, Self::Error> {
        convert(value, "$")
    }
}

fn convert(value: YamlValue, path: &str) -> std::result::Result<StructuredValue, MergeError> {
    match value {
        YamlValue::Null => Ok(StructuredValue::null()),
        YamlValue::Bool(b) => Ok(StructuredValue::bool(b)),
        YamlValue::Number(n) => Ok(StructuredValue::Scalar(Scalar::Number(n))),
        YamlValue::String(s) => Ok(StructuredValue::string(s)),
        YamlValue::Sequence(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| convert(item, &format!("{}[{}]", path, index)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map(StructuredValue::Sequence),
        YamlValue::Mapping(raw) => {
            let mut map = Mapping::with_capacity(raw.len());
            for (raw_key, raw_value) in raw {
                let key = mapping_key(raw_key, path)?;
                let child_path = format!("{}.{}", path, key);
                if map.contains_key(&key) {
                    return Err(MergeError::new(child_path, "duplicate mapping key"));
                }
                let child = convert(raw_value, &child_path)?;
                map.insert(key, child);
            }
            Ok(StructuredValue::Mapping(map))
        }
        YamlValue::Tagged(tagged) => Err(MergeError::new(
            path,
            format!("tagged value `{}` is not supported", tagged.tag),
        )),
    }
}

fn mapping_key(key: YamlValue, path: &str) -> std::result::Result<String, MergeError> {
    match key {
        YamlValue::String(s) => Ok(s),
        YamlValue::Bool(b) => Ok(b.to_string()),
        YamlValue::Number(n) => Ok(n.to_string()),
        YamlValue::Null => Err(MergeError::new(path, "null mapping key")),
        YamlValue::Sequence(_) | YamlValue::Mapping(_) => {
            Err(MergeError::new(path, "non-scalar mapping key"))
        }
        YamlValue::Tagged(tagged) => Err(MergeError::new(
            path,
            format!("tagged mapping key `{}` is not supported", tagged.tag),
        )),
    }
}

impl Serialize for Scalar {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Scalar::Null => serializer.serialize_unit(),
            Scalar::Bool(b) => serializer.serialize_bool(*b),
            Scalar::Number(n) => n.serialize(serializer),
            Scalar::String(s) => serializer.serialize_str(s),
        }
    }
}

impl Serialize for StructuredValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            StructuredValue::Mapping(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (key, value) in map {
                    out.serialize_entry(key, value)?;
                }
                out.end()
            }
            StructuredValue::Sequence(items) => {
                let mut out = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    out.serialize_element(item)?;
                }
                out.end()
            }
            StructuredValue::Scalar(scalar) => scalar.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for StructuredValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = YamlValue::deserialize(deserializer)?;
        StructuredValue::try_from(raw).map_err(D::Error::custom)
    }
}

fn get_nested<'a>(value: &'a StructuredValue, path: &[&str]) -> Option<&'a StructuredValue> {
    let Some((key, remaining)) = path.split_first() else {
        return Some(value);
    };
    value.get_key(key).and_then(|v| get_nested(v, remaining))
}

fn set_nested(value: &mut StructuredValue, path: &[&str], new_value: StructuredValue) {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return;
    };

    if !matches!(value, StructuredValue::Mapping(_)) {
        *value = StructuredValue::empty_mapping();
    }
    let StructuredValue::Mapping(map) = value else {
        return;
    };

    let entry = map
        .entry((*key).to_string())
        .or_insert_with(StructuredValue::empty_mapping);
    set_nested(entry, remaining, new_value);
}

/// Parse `key=value` overrides into a values document
///
/// Values are typed the way a values file would type them: booleans, null,
/// integers and finite floats are recognized (`nan` and `inf` stay strings);
/// `[..]` and `{..}` are parsed as inline JSON and fall back to plain strings.
pub fn parse_set_values(set_args: &[String]) -> Result<StructuredValue> {
    let mut values = StructuredValue::empty_mapping();

    for arg in set_args {
        let (key, val) = arg.split_once('=').ok_or_else(|| CoreError::InvalidValue {
            message: format!("Invalid --set format: '{}'. Expected key=value", arg),
        })?;
        if key.is_empty() {
            return Err(CoreError::InvalidValue {
                message: format!("Invalid --set format: '{}'. Key is empty", arg),
            });
        }

        let parsed = match val {
            "true" => StructuredValue::bool(true),
            "false" => StructuredValue::bool(false),
            "null" => StructuredValue::null(),
            _ => {
                if let Ok(num) = val.parse::<i64>() {
                    StructuredValue::int(num)
                } else if let Some(num) = val.parse::<f64>().ok().filter(|n| n.is_finite()) {
                    StructuredValue::Scalar(Scalar::Number(num.into()))
                } else if val.starts_with('[') || val.starts_with('{') {
                    StructuredValue::from_json(val).unwrap_or_else(|_| StructuredValue::string(val))
                } else {
                    StructuredValue::string(val)
                }
            }
        };

        values.set(key, parsed);
    }

    Ok(values)
}
