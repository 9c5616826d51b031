//! Overlay-build engine adapter

use chartfuse_core::RenderedManifest;
use std::path::Path;
use std::time::Duration;

use crate::error::{FuseError, Result};
use crate::process::ToolCommand;

/// Builds an overlay declaration directory into a manifest
pub trait OverlayBuilder {
    fn build(&self, dir: &Path) -> Result<RenderedManifest>;
}

/// The `kustomize` command line tool
#[derive(Debug, Clone)]
pub struct KustomizeCli {
    bin: String,
    timeout: Duration,
}

impl KustomizeCli {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    pub fn build_command(&self, dir: &Path) -> ToolCommand {
        ToolCommand::new(&self.bin)
            .timeout(self.timeout)
            .arg("build")
            .arg(dir)
    }
}

impl OverlayBuilder for KustomizeCli {
    fn build(&self, dir: &Path) -> Result<RenderedManifest> {
        let overlay = dir.display().to_string();
        let output = self.build_command(dir).run().map_err(|e| FuseError::Build {
            overlay: overlay.clone(),
            patch: None,
            exit_code: None,
            stderr: format!("cannot run '{}': {}", self.bin, e),
        })?;

        if !output.success {
            return Err(FuseError::Build {
                overlay,
                patch: None,
                exit_code: output.exit_code,
                stderr: output.diagnostics(self.timeout),
            });
        }

        Ok(RenderedManifest::new(output.stdout))
    }
}
