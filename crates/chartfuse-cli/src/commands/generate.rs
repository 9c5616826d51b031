//! Generate command - render a chart and fuse its overlays

use chartfuse_core::{ChartConfig, merge, parse_set_values};
use chartfuse_engine::{HelmCli, KustomizeCli, Pipeline, PipelineOptions, Tools};
use clap::Args;
use console::style;
use std::path::Path;
use tracing::debug;

use super::write_output;
use crate::error::{CliError, Result};

/// Command line values that take precedence over the config document
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    /// Render engine binary
    #[arg(long, env = "CHARTFUSE_HELM_BIN")]
    pub helm_bin: Option<String>,

    /// Overlay-build engine binary
    #[arg(long, env = "CHARTFUSE_KUSTOMIZE_BIN")]
    pub kustomize_bin: Option<String>,

    /// Timeout for each external tool invocation (e.g. 90s, 5m)
    #[arg(long)]
    pub timeout: Option<humantime::Duration>,

    /// Release name
    #[arg(long)]
    pub release_name: Option<String>,

    /// Release namespace
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Set values on command line (key=value)
    #[arg(long = "set")]
    pub set: Vec<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut ChartConfig) -> Result<()> {
        if let Some(bin) = &self.helm_bin {
            config.helm_bin = bin.clone();
        }
        if let Some(bin) = &self.kustomize_bin {
            config.kustomize_bin = bin.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout = timeout.into();
        }
        if let Some(name) = &self.release_name {
            config.release_name = name.clone();
        }
        if let Some(namespace) = &self.namespace {
            config.release_namespace = namespace.clone();
        }
        if !self.set.is_empty() {
            let set_values = parse_set_values(&self.set).map_err(|e| {
                CliError::config_with_help(e.to_string(), "use --set key=value, e.g. --set image.tag=v2")
            })?;
            config.values = merge(&config.values, &set_values);
        }
        Ok(())
    }
}

pub fn run(
    config_path: &Path,
    output: Option<&Path>,
    keep_workspace: bool,
    overrides: &Overrides,
) -> Result<()> {
    let mut config = ChartConfig::from_file(config_path)?;
    overrides.apply(&mut config)?;
    config.validate()?;
    debug!(?config, "effective configuration");

    eprintln!(
        "{} Generating {} (release {}, namespace {})",
        style("→").cyan().bold(),
        style(&config.chart_name).bold(),
        config.release_name,
        config.release_namespace
    );

    let helm = HelmCli::new(&config.helm_bin, config.timeout);
    let kustomize = KustomizeCli::new(&config.kustomize_bin, config.timeout);
    let mut pipeline = Pipeline::new(
        &config,
        Tools {
            renderer: &helm,
            fetcher: &helm,
            builder: &kustomize,
        },
    )
    .with_options(PipelineOptions {
        keep_workspace,
        keep_on_failure: keep_workspace,
    });

    let result = pipeline.run()?;
    write_output(result.manifest.as_bytes(), output)?;

    eprintln!(
        "{} {} resource(s), {} overlay build(s)",
        style("✓").green().bold(),
        result.resources.len(),
        result.overlay_builds
    );
    if let Some(path) = output {
        eprintln!("  Written to {}", path.display());
    }
    if let Some(workspace) = &result.workspace {
        eprintln!("  Workspace kept at {}", style(workspace.display()).dim());
    }

    Ok(())
}
