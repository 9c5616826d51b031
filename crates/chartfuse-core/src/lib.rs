//! chartfuse core - shared types for rendering charts and fusing overlays
//!
//! This crate provides the foundational types used by the pipeline:
//! - `StructuredValue`: closed tree model for values, overlay configs and resources
//! - `merge`: deep merge with overlay-wins semantics
//! - `ManifestSet`: multi-document manifests as ordered resources
//! - `ChartConfig`: the generator configuration document

pub mod config;
pub mod error;
pub mod manifest;
pub mod merge;
pub mod value;

pub use config::{ChartConfig, RepoAuth, RepoCredentials};
pub use error::{CoreError, Result};
pub use manifest::{ManifestSet, ParseError, RenderedManifest, Resource, ResourceId, merge_into};
pub use merge::{MergeError, merge, merge_all, merge_yaml};
pub use value::{Mapping, Scalar, StructuredValue, parse_set_values};
