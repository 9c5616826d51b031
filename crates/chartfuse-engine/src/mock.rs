//! Test doubles for the external tools
//!
//! These stand in for `helm` and `kustomize` so the pipeline can be
//! exercised without either installed. The overlay builder understands a
//! small subset of overlay configs: `resources` files are concatenated and
//! each `patchesJson6902` entry with a `target` (kind and name) and either
//! an inline `patch` mapping or a `path` to one is deep merged into the
//! matching resources.

use chartfuse_core::{ManifestSet, RenderedManifest, Resource, StructuredValue};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::{FuseError, Result};
use crate::fusion::{OVERLAY_CONFIG_FILE, PATCH_SPEC_FIELD, RESOURCES_FIELD};
use crate::helm::{RenderRequest, TemplateRenderer};
use crate::kustomize::OverlayBuilder;
use crate::workspace::{ChartFetcher, FetchRequest};

/// Renderer returning a fixed manifest, or failing like a broken chart
#[derive(Clone, Default)]
pub struct MockRenderer {
    output: RenderedManifest,
    failure: Option<(i32, String)>,
    requests: Arc<Mutex<Vec<RenderRequest>>>,
}

impl MockRenderer {
    pub fn new(output: impl Into<RenderedManifest>) -> Self {
        Self {
            output: output.into(),
            ..Self::default()
        }
    }

    pub fn failing(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            failure: Some((exit_code, stderr.into())),
            ..Self::default()
        }
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<RenderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl TemplateRenderer for MockRenderer {
    fn render(&self, request: &RenderRequest) -> Result<RenderedManifest> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.failure {
            Some((code, stderr)) => Err(FuseError::Render {
                exit_code: Some(*code),
                stderr: stderr.clone(),
            }),
            None => Ok(self.output.clone()),
        }
    }
}

/// A fetch as seen by [`MockFetcher`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedFetch {
    pub chart_name: String,
    pub repo: String,
    pub version: Option<String>,
    pub destination: PathBuf,
    pub username: Option<String>,
}

/// Fetcher that unpacks a fixed set of files
#[derive(Clone, Default)]
pub struct MockFetcher {
    files: Vec<(String, String)>,
    failure: Option<String>,
    requests: Arc<Mutex<Vec<RecordedFetch>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file to the unpacked chart, relative to the chart root
    pub fn with_file(mut self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.files.push((path.into(), contents.into()));
        self
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<RecordedFetch> {
        self.requests.lock().unwrap().clone()
    }
}

impl ChartFetcher for MockFetcher {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<()> {
        self.requests.lock().unwrap().push(RecordedFetch {
            chart_name: request.chart_name.to_string(),
            repo: request.repo.to_string(),
            version: request.version.map(str::to_string),
            destination: request.destination.to_path_buf(),
            username: request.credentials.map(|c| c.username.clone()),
        });

        if let Some(message) = &self.failure {
            return Err(FuseError::workspace(request.destination, message.clone()));
        }

        let chart_dir = request.destination.join(request.chart_name);
        for (relative, contents) in &self.files {
            let path = chart_dir.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, contents)?;
        }
        Ok(())
    }
}

/// Overlay builder applying mapping patches with the deep merge
#[derive(Clone, Default)]
pub struct MockOverlayBuilder {
    fail_on: Option<usize>,
    calls: Arc<Mutex<Vec<PathBuf>>>,
}

impl MockOverlayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the nth build (1-based)
    pub fn fail_on(mut self, build: usize) -> Self {
        self.fail_on = Some(build);
        self
    }

    /// Directories built so far, in order
    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }

    fn apply(dir: &Path) -> Result<RenderedManifest> {
        let config = StructuredValue::from_file(dir.join(OVERLAY_CONFIG_FILE))?;

        let mut input = Vec::new();
        for resource in config
            .get_key(RESOURCES_FIELD)
            .and_then(StructuredValue::as_sequence)
            .unwrap_or_default()
        {
            if let Some(file) = resource.as_str() {
                input.extend(fs::read(dir.join(file))?);
                input.extend(b"\n---\n");
            }
        }
        let mut set = ManifestSet::from_bytes(&input)?;

        for entry in config
            .get_key(PATCH_SPEC_FIELD)
            .and_then(StructuredValue::as_sequence)
            .unwrap_or_default()
        {
            let kind = entry.get("target.kind").and_then(StructuredValue::as_str);
            let name = entry.get("target.name").and_then(StructuredValue::as_str);

            let patch = match (entry.get_key("patch"), entry.get_key("path").and_then(StructuredValue::as_str)) {
                (Some(inline), _) => inline.clone(),
                (None, Some(path)) => StructuredValue::from_file(dir.join(path))?,
                (None, None) => continue,
            };
            let patch = Resource::try_from(patch)?;

            for resource in set.resources_mut() {
                let id = resource.id();
                if kind.is_none_or(|k| k == id.kind) && name.is_none_or(|n| n == id.name) {
                    resource.merge(&patch);
                }
            }
        }

        Ok(set.to_rendered()?)
    }
}

impl OverlayBuilder for MockOverlayBuilder {
    fn build(&self, dir: &Path) -> Result<RenderedManifest> {
        let call = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(dir.to_path_buf());
            calls.len()
        };

        if self.fail_on == Some(call) {
            return Err(FuseError::Build {
                overlay: dir.display().to_string(),
                patch: None,
                exit_code: Some(1),
                stderr: format!("mock build #{} failed", call),
            });
        }

        Self::apply(dir)
    }
}
