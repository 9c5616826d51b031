//! Render engine adapter
//!
//! [`HelmCli`] drives the `helm` binary: `helm template` renders a chart to a
//! multi-document manifest and `helm pull` fetches a chart into a workspace.

use chartfuse_core::{RenderedManifest, StructuredValue};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{FuseError, Result};
use crate::process::ToolCommand;
use crate::workspace::{ChartFetcher, FetchRequest, Workspace};

/// Name of the values file written into the workspace
pub const VALUES_FILE: &str = "values.yaml";

/// Inputs of a single chart render
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub chart_path: PathBuf,
    pub values_file: PathBuf,
    pub release_name: String,
    pub namespace: String,
    /// Values file from `valuesFrom`, layered after the inline values
    pub external_values_file: Option<PathBuf>,
    pub extra_args: Vec<String>,
}

/// Renders a chart to a manifest
pub trait TemplateRenderer {
    fn render(&self, request: &RenderRequest) -> Result<RenderedManifest>;
}

/// Inputs of [`render_chart`] besides the renderer and workspace
#[derive(Debug, Clone, Copy)]
pub struct RenderInputs<'a> {
    pub chart_path: &'a Path,
    pub values: &'a StructuredValue,
    pub release_name: &'a str,
    pub namespace: &'a str,
    pub extra_args: &'a [String],
    pub external_values: Option<&'a Path>,
}

/// Write the values document into the workspace and render the chart
pub fn render_chart(
    renderer: &dyn TemplateRenderer,
    workspace: &Workspace,
    inputs: RenderInputs<'_>,
) -> Result<RenderedManifest> {
    let values_yaml = inputs.values.to_yaml_string()?;
    let values_file = workspace.write_file(VALUES_FILE, values_yaml.as_bytes())?;

    let request = RenderRequest {
        chart_path: inputs.chart_path.to_path_buf(),
        values_file,
        release_name: inputs.release_name.to_string(),
        namespace: inputs.namespace.to_string(),
        external_values_file: inputs.external_values.map(Path::to_path_buf),
        extra_args: inputs.extra_args.to_vec(),
    };

    info!(release = %request.release_name, namespace = %request.namespace, "rendering chart");
    let manifest = renderer.render(&request)?;
    debug!(bytes = manifest.len(), "chart rendered");
    Ok(manifest)
}

/// The `helm` command line tool
#[derive(Debug, Clone)]
pub struct HelmCli {
    bin: String,
    timeout: Duration,
}

impl HelmCli {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }

    pub fn bin(&self) -> &str {
        &self.bin
    }

    pub fn template_command(&self, request: &RenderRequest) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.bin)
            .timeout(self.timeout)
            .arg("template")
            .arg(&request.release_name)
            .arg(&request.chart_path)
            .arg("--namespace")
            .arg(&request.namespace)
            .arg("--values")
            .arg(&request.values_file);

        if let Some(external) = &request.external_values_file {
            cmd = cmd.arg("--values").arg(external);
        }

        cmd.args(&request.extra_args)
    }

    pub fn pull_command(&self, request: &FetchRequest<'_>) -> ToolCommand {
        let mut cmd = ToolCommand::new(&self.bin)
            .timeout(self.timeout)
            .arg("pull")
            .arg(request.chart_name)
            .arg("--repo")
            .arg(request.repo)
            .arg("--untar")
            .arg("--untardir")
            .arg(request.destination);

        if let Some(version) = request.version {
            cmd = cmd.arg("--version").arg(version);
        }
        if let Some(creds) = request.credentials {
            cmd = cmd
                .arg("--username")
                .arg(&creds.username)
                .arg("--password")
                .secret_arg(&creds.password);
        }

        cmd
    }
}

impl TemplateRenderer for HelmCli {
    fn render(&self, request: &RenderRequest) -> Result<RenderedManifest> {
        let cmd = self.template_command(request);
        let output = cmd.run().map_err(|e| FuseError::Render {
            exit_code: None,
            stderr: format!("cannot run '{}': {}", self.bin, e),
        })?;

        if !output.success {
            return Err(FuseError::Render {
                exit_code: output.exit_code,
                stderr: output.diagnostics(self.timeout),
            });
        }

        Ok(RenderedManifest::new(output.stdout))
    }
}

impl ChartFetcher for HelmCli {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<()> {
        let cmd = self.pull_command(request);
        let output = cmd
            .run()
            .map_err(|e| FuseError::workspace(request.destination, format!("cannot run '{}': {}", self.bin, e)))?;

        if !output.success {
            let code = output
                .exit_code
                .map(|c| format!(" (exit code {})", c))
                .unwrap_or_default();
            return Err(FuseError::workspace(
                request.destination,
                format!(
                    "fetching chart '{}' failed{}: {}",
                    request.chart_name,
                    code,
                    output.diagnostics(self.timeout).trim()
                ),
            ));
        }

        Ok(())
    }
}
