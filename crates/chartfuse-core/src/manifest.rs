//! Rendered manifests and the resource collections parsed from them
//!
//! External tools exchange raw multi-document YAML ([`RenderedManifest`]).
//! Once a pipeline run completes, the bytes are parsed into a
//! [`ManifestSet`] of discrete [`Resource`]s that can be replaced or merged
//! in place and serialized back.

use serde::Deserialize;
use std::fmt;
use thiserror::Error;

use crate::error::{CoreError, Result};
use crate::merge::merge;
use crate::value::{Mapping, StructuredValue};

/// Rendered bytes did not parse as a stream of resources
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid manifest document #{document}: {message}")]
pub struct ParseError {
    /// Zero-based index of the document in the stream
    pub document: usize,
    pub message: String,
}

/// Raw output of the render or overlay-build engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedManifest(Vec<u8>);

impl RenderedManifest {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for RenderedManifest {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&str> for RenderedManifest {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

/// Identity of a resource: apiVersion, kind, namespace and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// A single manifest document; always a mapping
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    value: StructuredValue,
}

impl Resource {
    pub fn from_mapping(map: Mapping) -> Self {
        Self {
            value: StructuredValue::Mapping(map),
        }
    }

    pub fn id(&self) -> ResourceId {
        let field = |path: &str| {
            self.value
                .get(path)
                .and_then(StructuredValue::as_str)
                .unwrap_or_default()
                .to_string()
        };
        ResourceId {
            api_version: field("apiVersion"),
            kind: field("kind"),
            namespace: field("metadata.namespace"),
            name: field("metadata.name"),
        }
    }

    pub fn as_structured(&self) -> &StructuredValue {
        &self.value
    }

    pub fn into_structured(self) -> StructuredValue {
        self.value
    }

    /// Replace this resource's content with another's
    pub fn replace(&mut self, other: &Resource) {
        self.value = other.value.clone();
    }

    /// Deep merge another resource on top of this one
    pub fn merge(&mut self, other: &Resource) {
        self.value = merge(&self.value, &other.value);
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        self.value.to_yaml_string()
    }
}

impl TryFrom<StructuredValue> for Resource {
    type Error = CoreError;

    fn try_from(value: StructuredValue) -> Result<Self> {
        match value {
            StructuredValue::Mapping(map) => Ok(Self::from_mapping(map)),
            _ => Err(CoreError::InvalidResource {
                message: "a resource must be a mapping".to_string(),
            }),
        }
    }
}

/// Merge an injected document into an existing resource
///
/// The result is the resource's new canonical form; `existing` is untouched.
pub fn merge_into(existing: &Resource, document: &StructuredValue) -> Result<Resource> {
    Resource::try_from(merge(existing.as_structured(), document))
}

/// Ordered collection of resources
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestSet {
    resources: Vec<Resource>,
}

impl ManifestSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a multi-document YAML stream
    ///
    /// Empty and `null` documents are skipped. Every other document must be
    /// a mapping.
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, ParseError> {
        let mut resources = Vec::new();

        for (index, document) in serde_yaml::Deserializer::from_slice(bytes).enumerate() {
            let raw = serde_yaml::Value::deserialize(document).map_err(|e| ParseError {
                document: index,
                message: e.to_string(),
            })?;
            if raw.is_null() {
                continue;
            }

            let value = StructuredValue::try_from(raw).map_err(|e| ParseError {
                document: index,
                message: e.to_string(),
            })?;
            match value {
                StructuredValue::Mapping(map) => resources.push(Resource::from_mapping(map)),
                _ => {
                    return Err(ParseError {
                        document: index,
                        message: "document is not a mapping".to_string(),
                    });
                }
            }
        }

        Ok(Self { resources })
    }

    /// Parse the final output of a pipeline run
    pub fn publish(manifest: &RenderedManifest) -> std::result::Result<Self, ParseError> {
        Self::from_bytes(manifest.as_bytes())
    }

    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut [Resource] {
        &mut self.resources
    }

    pub fn push(&mut self, resource: Resource) {
        self.resources.push(resource);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter()
    }

    /// First resource with the given kind and name
    pub fn find(&self, kind: &str, name: &str) -> Option<&Resource> {
        self.resources.iter().find(|r| {
            let id = r.id();
            id.kind == kind && id.name == name
        })
    }

    /// Merge a document into every resource of the set
    pub fn merge_document(&mut self, document: &StructuredValue) -> Result<()> {
        for resource in &mut self.resources {
            *resource = merge_into(resource, document)?;
        }
        Ok(())
    }

    /// Serialize back to a YAML stream separated by `---`
    pub fn to_yaml_string(&self) -> Result<String> {
        let mut out = String::new();
        for (index, resource) in self.resources.iter().enumerate() {
            if index > 0 {
                out.push_str("---\n");
            }
            out.push_str(&resource.to_yaml_string()?);
        }
        Ok(out)
    }

    pub fn to_yaml_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.to_yaml_string()?.into_bytes())
    }

    pub fn to_rendered(&self) -> Result<RenderedManifest> {
        Ok(RenderedManifest::from(self.to_yaml_bytes()?))
    }
}

impl<'a> IntoIterator for &'a ManifestSet {
    type Item = &'a Resource;
    type IntoIter = std::slice::Iter<'a, Resource>;

    fn into_iter(self) -> Self::IntoIter {
        self.resources.iter()
    }
}
