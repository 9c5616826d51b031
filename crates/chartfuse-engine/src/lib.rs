//! Chartfuse Engine - render a chart and fuse overlays into one manifest
//!
//! This crate drives the external tools of a run:
//! - [`workspace`]: isolated temp directory holding a copy of the chart
//! - [`helm`]: chart fetch and render through the `helm` binary
//! - [`kustomize`]: overlay builds through the `kustomize` binary
//! - [`fusion`]: per-patch overlay application in declared order
//! - [`pipeline`]: the whole run as a small state machine
//!
//! Tool seams are traits ([`TemplateRenderer`], [`ChartFetcher`],
//! [`OverlayBuilder`]); [`mock`] provides in-process stand-ins.

pub mod error;
pub mod fusion;
pub mod helm;
pub mod kustomize;
pub mod mock;
pub mod pipeline;
pub mod placeholder;
pub mod process;
pub mod workspace;

pub use error::{FuseError, Result};
pub use fusion::{FusionOutcome, OverlayDeclaration, PatchFusion};
pub use helm::{HelmCli, RenderInputs, RenderRequest, TemplateRenderer, render_chart};
pub use kustomize::{KustomizeCli, OverlayBuilder};
pub use pipeline::{Pipeline, PipelineOptions, PipelineOutput, PipelineState, Tools};
pub use placeholder::{Placeholders, substitute_dir};
pub use process::{ToolCommand, ToolOutput};
pub use workspace::{ChartFetcher, ChartSource, FetchRequest, Workspace, strip_requirements};
