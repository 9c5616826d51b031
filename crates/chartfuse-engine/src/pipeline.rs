//! End-to-end run: place chart, render, fuse overlays, publish
//!
//! ```text
//! Idle -> Rendering -> [Fusing] -> Done
//!   \________\____________\______> Failed
//! ```

use chartfuse_core::{ChartConfig, ManifestSet, RenderedManifest};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::error::{FuseError, Result};
use crate::fusion::PatchFusion;
use crate::helm::{RenderInputs, TemplateRenderer, render_chart};
use crate::kustomize::OverlayBuilder;
use crate::placeholder::Placeholders;
use crate::workspace::{ChartFetcher, ChartSource, Workspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Rendering,
    Fusing,
    Done,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Rendering => "rendering",
            Self::Fusing => "fusing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PipelineOptions {
    /// Leave the workspace on disk after a successful run
    pub keep_workspace: bool,
    /// Leave the workspace on disk after a failed run
    pub keep_on_failure: bool,
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub manifest: RenderedManifest,
    pub resources: ManifestSet,
    pub overlay_builds: usize,
    /// Workspace path, when kept
    pub workspace: Option<PathBuf>,
}

/// The external tools a run drives
#[derive(Clone, Copy)]
pub struct Tools<'a> {
    pub renderer: &'a dyn TemplateRenderer,
    pub fetcher: &'a dyn ChartFetcher,
    pub builder: &'a dyn OverlayBuilder,
}

pub struct Pipeline<'a> {
    config: &'a ChartConfig,
    tools: Tools<'a>,
    options: PipelineOptions,
    state: PipelineState,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a ChartConfig, tools: Tools<'a>) -> Self {
        Self {
            config,
            tools,
            options: PipelineOptions::default(),
            state: PipelineState::Idle,
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        debug!(from = %self.state, to = %next, "pipeline state");
        self.state = next;
    }

    /// Run the pipeline once
    pub fn run(&mut self) -> Result<PipelineOutput> {
        let mut workspace = None;
        match self.execute(&mut workspace) {
            Ok(mut output) => {
                self.transition(PipelineState::Done);
                if self.options.keep_workspace
                    && let Some(ws) = workspace
                {
                    let path = ws.keep();
                    warn!(workspace = %path.display(), "keeping workspace");
                    output.workspace = Some(path);
                }
                Ok(output)
            }
            Err(e) => {
                self.transition(PipelineState::Failed);
                if self.options.keep_on_failure
                    && let Some(ws) = workspace
                {
                    let path = ws.keep();
                    warn!(workspace = %path.display(), "keeping workspace of failed run");
                }
                Err(e)
            }
        }
    }

    fn execute(&mut self, workspace_slot: &mut Option<Workspace>) -> Result<PipelineOutput> {
        let config = self.config;
        self.transition(PipelineState::Rendering);

        if let Some(values_from) = &config.values_from
            && !values_from.is_file()
        {
            return Err(FuseError::config(format!(
                "valuesFrom file not found: {}",
                values_from.display()
            )));
        }

        let source = ChartSource::from_config(config)?;
        let workspace = workspace_slot.insert(Workspace::prepare(&source, self.tools.fetcher)?);

        let rendered = render_chart(
            self.tools.renderer,
            workspace,
            RenderInputs {
                chart_path: workspace.chart_path(),
                values: &config.values,
                release_name: &config.release_name,
                namespace: &config.release_namespace,
                extra_args: &config.extra_args,
                external_values: config.values_from.as_deref(),
            },
        )?;

        let (manifest, overlay_builds) = if config.has_patches() {
            self.transition(PipelineState::Fusing);
            let outcome = PatchFusion::new(
                self.tools.builder,
                Placeholders::for_release(&config.release_name, &config.chart_name),
            )
            .overlays_in(workspace.chart_path(), &config.chart_patches)
            .run(rendered)?;
            (outcome.manifest, outcome.builds)
        } else {
            (rendered, 0)
        };

        let resources = ManifestSet::publish(&manifest)?;
        info!(resources = resources.len(), overlay_builds, "manifest ready");

        Ok(PipelineOutput {
            manifest,
            resources,
            overlay_builds,
            workspace: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockFetcher, MockOverlayBuilder, MockRenderer};
    use chartfuse_core::RepoAuth;
    use std::fs;
    use std::path::Path;

    const RENDERED: &str = "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  replicas: 1\n---\napiVersion: v1\nkind: Service\nmetadata:\n  name: web\n";

    const OVERLAY: &str = "patchesJson6902:\n  - target: {kind: Deployment, name: \"?web\"}\n    patch:\n      spec:\n        replicas: 3\n";

    fn local_chart(root: &Path) -> PathBuf {
        let chart = root.join("web");
        fs::create_dir_all(chart.join("patches")).unwrap();
        fs::write(chart.join("Chart.yaml"), "name: web\nversion: 0.1.0\n").unwrap();
        fs::write(chart.join("requirements.yaml"), "dependencies: []\n").unwrap();
        fs::write(chart.join("patches/kustomization.yaml"), OVERLAY).unwrap();
        chart
    }

    fn config_for(chart: &Path) -> ChartConfig {
        let mut config = ChartConfig::new("web");
        config.chart_home = Some(chart.to_path_buf());
        config.release_name = "web".to_string();
        config
    }

    #[test]
    fn test_run_without_overlays() {
        let root = tempfile::tempdir().unwrap();
        let config = config_for(&local_chart(root.path()));
        let renderer = MockRenderer::new(RENDERED);
        let fetcher = MockFetcher::new();
        let builder = MockOverlayBuilder::new();

        let mut pipeline = Pipeline::new(
            &config,
            Tools {
                renderer: &renderer,
                fetcher: &fetcher,
                builder: &builder,
            },
        );
        assert_eq!(pipeline.state(), PipelineState::Idle);

        let output = pipeline.run().unwrap();

        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(output.overlay_builds, 0);
        assert_eq!(output.resources.len(), 2);
        assert_eq!(output.manifest.as_bytes(), RENDERED.as_bytes());
        assert!(output.workspace.is_none());
        assert!(builder.calls().is_empty());
    }

    #[test]
    fn test_run_with_overlay_leaves_user_chart_untouched() {
        let root = tempfile::tempdir().unwrap();
        let chart = local_chart(root.path());
        let mut config = config_for(&chart);
        config.chart_patches = vec!["patches".to_string()];
        let renderer = MockRenderer::new(RENDERED);
        let fetcher = MockFetcher::new();
        let builder = MockOverlayBuilder::new();

        let mut pipeline = Pipeline::new(
            &config,
            Tools {
                renderer: &renderer,
                fetcher: &fetcher,
                builder: &builder,
            },
        )
        .with_options(PipelineOptions {
            keep_workspace: true,
            ..Default::default()
        });
        let output = pipeline.run().unwrap();

        assert_eq!(pipeline.state(), PipelineState::Done);
        assert_eq!(output.overlay_builds, 1);
        insta::assert_snapshot!(output.resources.to_yaml_string().unwrap(), @r"
        apiVersion: apps/v1
        kind: Deployment
        metadata:
          name: web
        spec:
          replicas: 3
        ---
        apiVersion: v1
        kind: Service
        metadata:
          name: web
        ");

        // Destructive steps happened in the workspace only
        assert_eq!(fs::read_to_string(chart.join("patches/kustomization.yaml")).unwrap(), OVERLAY);
        assert!(chart.join("requirements.yaml").exists());
        assert!(!chart.join("patches/helmoutput.yaml").exists());

        let kept = output.workspace.unwrap();
        assert!(kept.join("web/patches/helmoutput.yaml").exists());
        assert!(!kept.join("web/requirements.yaml").exists());
        assert!(kept.join("values.yaml").exists());
        fs::remove_dir_all(kept).unwrap();
    }

    #[test]
    fn test_render_failure_marks_failed() {
        let root = tempfile::tempdir().unwrap();
        let config = config_for(&local_chart(root.path()));
        let renderer = MockRenderer::failing(1, "Error: template: web/templates/x.yaml: boom");
        let fetcher = MockFetcher::new();
        let builder = MockOverlayBuilder::new();

        let mut pipeline = Pipeline::new(
            &config,
            Tools {
                renderer: &renderer,
                fetcher: &fetcher,
                builder: &builder,
            },
        );
        let err = pipeline.run().unwrap_err();

        assert!(err.is_render());
        assert!(err.to_string().contains("boom"));
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[test]
    fn test_build_failure_marks_failed() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config_for(&local_chart(root.path()));
        config.chart_patches = vec!["patches".to_string()];
        let renderer = MockRenderer::new(RENDERED);
        let fetcher = MockFetcher::new();
        let builder = MockOverlayBuilder::new().fail_on(1);

        let mut pipeline = Pipeline::new(
            &config,
            Tools {
                renderer: &renderer,
                fetcher: &fetcher,
                builder: &builder,
            },
        );
        let err = pipeline.run().unwrap_err();

        assert!(err.is_build());
        assert_eq!(pipeline.state(), PipelineState::Failed);
    }

    #[test]
    fn test_fetch_passes_version_and_credentials() {
        let root = tempfile::tempdir().unwrap();
        let password_file = root.path().join("password");
        fs::write(&password_file, "s3cret\n").unwrap();

        let mut config = ChartConfig::new("web");
        config.chart_version = Some("~1.4".to_string());
        config.chart_repo = "https://charts.example.com".to_string();
        config.chart_repo_auth = Some(RepoAuth {
            username: "bot".to_string(),
            password_file,
        });
        let renderer = MockRenderer::new(RENDERED);
        let fetcher = MockFetcher::new().with_file("Chart.yaml", "name: web\n");
        let builder = MockOverlayBuilder::new();

        let mut pipeline = Pipeline::new(
            &config,
            Tools {
                renderer: &renderer,
                fetcher: &fetcher,
                builder: &builder,
            },
        );
        pipeline.run().unwrap();

        let fetches = fetcher.requests();
        assert_eq!(fetches.len(), 1);
        assert_eq!(fetches[0].version.as_deref(), Some("~1.4"));
        assert_eq!(fetches[0].repo, "https://charts.example.com");
        assert_eq!(fetches[0].username.as_deref(), Some("bot"));

        let render = &renderer.requests()[0];
        assert_eq!(render.release_name, "release-name");
        assert_eq!(render.namespace, "default");
        assert!(render.chart_path.ends_with("web"));
    }

    #[test]
    fn test_missing_values_from_is_config_error() {
        let root = tempfile::tempdir().unwrap();
        let mut config = config_for(&local_chart(root.path()));
        config.values_from = Some(root.path().join("absent.yaml"));
        let renderer = MockRenderer::new(RENDERED);
        let fetcher = MockFetcher::new();
        let builder = MockOverlayBuilder::new();

        let mut pipeline = Pipeline::new(
            &config,
            Tools {
                renderer: &renderer,
                fetcher: &fetcher,
                builder: &builder,
            },
        );
        let err = pipeline.run().unwrap_err();

        assert!(matches!(err, FuseError::Config { .. }));
        assert!(renderer.requests().is_empty());
    }
}
