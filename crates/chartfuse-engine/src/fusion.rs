//! Patch fusion over a rendered manifest
//!
//! Each overlay directory declares patches in its `kustomization.yaml`.
//! Patch entries are applied one build at a time: the current manifest is
//! written next to the overlay config as its only resource, the config's
//! patch list is replaced with the accumulated overlay, and the overlay
//! builder's output becomes the next manifest. The last output is the
//! result of the run.

use chartfuse_core::{Mapping, RenderedManifest, StructuredValue, merge};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{FuseError, Result};
use crate::kustomize::OverlayBuilder;
use crate::placeholder::{Placeholders, substitute_dir};

/// Overlay configuration file inside each overlay directory
pub const OVERLAY_CONFIG_FILE: &str = "kustomization.yaml";
/// Field of the overlay configuration holding the patch list
pub const PATCH_SPEC_FIELD: &str = "patchesJson6902";
/// Field of the overlay configuration listing input files
pub const RESOURCES_FIELD: &str = "resources";
/// Manifest handed to each build
pub const INTERMEDIATE_MANIFEST_FILE: &str = "helmoutput.yaml";

/// An overlay directory as declared in the config, and where it lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayDeclaration {
    pub name: String,
    pub dir: PathBuf,
}

impl OverlayDeclaration {
    /// Resolve a declared directory name against the chart path
    pub fn resolve(chart_path: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            dir: chart_path.join(name),
        }
    }
}

/// Result of a successful fusion run
#[derive(Debug, Clone)]
pub struct FusionOutcome {
    pub manifest: RenderedManifest,
    /// Number of overlay builds performed
    pub builds: usize,
}

/// `kustomization.yaml` loaded from an overlay directory
struct OverlayConfig {
    path: PathBuf,
    document: Mapping,
}

impl OverlayConfig {
    fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(OVERLAY_CONFIG_FILE);
        if !path.is_file() {
            return Err(FuseError::config(format!(
                "overlay directory {} has no {}",
                dir.display(),
                OVERLAY_CONFIG_FILE
            )));
        }

        let document = match StructuredValue::from_file(&path)? {
            StructuredValue::Mapping(map) => map,
            value if value.is_null() => Mapping::new(),
            _ => {
                return Err(FuseError::config(format!(
                    "{} is not a mapping",
                    path.display()
                )));
            }
        };

        Ok(Self { path, document })
    }

    /// Declared patch entries, in order
    fn patches(&self) -> Result<Vec<StructuredValue>> {
        match self.document.get(PATCH_SPEC_FIELD) {
            None => Ok(Vec::new()),
            Some(value) if value.is_null() => Ok(Vec::new()),
            Some(StructuredValue::Sequence(items)) => Ok(items.clone()),
            Some(_) => Err(FuseError::config(format!(
                "'{}' in {} must be a list",
                PATCH_SPEC_FIELD,
                self.path.display()
            ))),
        }
    }

    /// Persist the config for one build
    ///
    /// `resources` is always exactly the intermediate manifest. The patch
    /// field is replaced when `patches` is given.
    fn write_for_build(&self, patches: Option<&StructuredValue>) -> Result<()> {
        let mut document = self.document.clone();
        document.insert(
            RESOURCES_FIELD.to_string(),
            StructuredValue::Sequence(vec![StructuredValue::string(INTERMEDIATE_MANIFEST_FILE)]),
        );
        if let Some(patches) = patches {
            document.insert(PATCH_SPEC_FIELD.to_string(), patches.clone());
        }

        let yaml = StructuredValue::Mapping(document).to_yaml_string()?;
        fs::write(&self.path, yaml)?;
        Ok(())
    }
}

/// Applies overlay directories to a manifest in declared order
pub struct PatchFusion<'a> {
    builder: &'a dyn OverlayBuilder,
    placeholders: Placeholders,
    overlays: Vec<OverlayDeclaration>,
}

impl<'a> PatchFusion<'a> {
    pub fn new(builder: &'a dyn OverlayBuilder, placeholders: Placeholders) -> Self {
        Self {
            builder,
            placeholders,
            overlays: Vec::new(),
        }
    }

    pub fn overlay(mut self, overlay: OverlayDeclaration) -> Self {
        self.overlays.push(overlay);
        self
    }

    /// Add every declared directory name, resolved against the chart path
    pub fn overlays_in(mut self, chart_path: &Path, names: &[String]) -> Self {
        self.overlays
            .extend(names.iter().map(|name| OverlayDeclaration::resolve(chart_path, name)));
        self
    }

    pub fn overlay_list(&self) -> &[OverlayDeclaration] {
        &self.overlays
    }

    /// Run every overlay over `initial`
    ///
    /// The first failure ends the run; no manifest is produced for a
    /// partially fused run.
    pub fn run(&self, initial: RenderedManifest) -> Result<FusionOutcome> {
        let mut manifest = initial;
        let mut builds = 0;

        for overlay in &self.overlays {
            if !overlay.dir.is_dir() {
                return Err(FuseError::config(format!(
                    "overlay directory '{}' not found at {}",
                    overlay.name,
                    overlay.dir.display()
                )));
            }

            let changed = substitute_dir(&overlay.dir, &self.placeholders)?;
            debug!(overlay = %overlay.name, files = changed.len(), "placeholders substituted");

            let config = OverlayConfig::load(&overlay.dir)?;
            let patches = config.patches()?;
            info!(overlay = %overlay.name, patches = patches.len(), "applying overlay");

            if patches.is_empty() {
                manifest = self.build_once(overlay, &config, &manifest, None, None)?;
                builds += 1;
                continue;
            }

            let mut accumulated = config
                .document
                .get(PATCH_SPEC_FIELD)
                .filter(|v| !v.is_null())
                .cloned()
                .unwrap_or_else(|| StructuredValue::Sequence(Vec::new()));

            for (index, patch) in patches.into_iter().enumerate() {
                accumulated = merge(&accumulated, &StructuredValue::Sequence(vec![patch]));
                manifest =
                    self.build_once(overlay, &config, &manifest, Some(&accumulated), Some(index))?;
                builds += 1;
            }
        }

        Ok(FusionOutcome { manifest, builds })
    }

    fn build_once(
        &self,
        overlay: &OverlayDeclaration,
        config: &OverlayConfig,
        manifest: &RenderedManifest,
        patches: Option<&StructuredValue>,
        index: Option<usize>,
    ) -> Result<RenderedManifest> {
        let intermediate = overlay.dir.join(INTERMEDIATE_MANIFEST_FILE);
        fs::write(&intermediate, manifest.as_bytes())?;
        config.write_for_build(patches)?;

        debug!(overlay = %overlay.name, patch = ?index, "building overlay");
        self.builder
            .build(&overlay.dir)
            .map_err(|e| e.at_patch(&overlay.name, index))
    }
}
