//! Pipeline error types
//!
//! Every error is fatal to the current run. Variants carry what is needed to
//! diagnose a failure without re-running: captured stderr, the overlay
//! directory and patch index, or the path of the value that failed to merge.

use chartfuse_core::{CoreError, MergeError, ParseError};
use miette::Diagnostic;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FuseError>;

#[derive(Error, Debug, Diagnostic)]
pub enum FuseError {
    /// Workspace creation, chart placement or fetch failed
    #[error("workspace error at {}: {message}", .path.display())]
    #[diagnostic(
        code(chartfuse::workspace),
        help("the chart could not be placed; check chartHome, chartRepo and chartVersion")
    )]
    Workspace { path: PathBuf, message: String },

    /// The render engine exited non-zero or timed out
    #[error("chart render failed{}: {}", exit_label(.exit_code), .stderr.trim())]
    #[diagnostic(code(chartfuse::render))]
    Render {
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The overlay-build engine exited non-zero or timed out
    #[error(
        "overlay build failed in '{overlay}'{}{}: {}",
        patch_label(.patch),
        exit_label(.exit_code),
        .stderr.trim()
    )]
    #[diagnostic(code(chartfuse::build))]
    Build {
        overlay: String,
        patch: Option<usize>,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error(transparent)]
    #[diagnostic(
        code(chartfuse::merge),
        help("tagged YAML values and complex mapping keys cannot be merged")
    )]
    Merge(#[from] MergeError),

    #[error(transparent)]
    #[diagnostic(code(chartfuse::parse))]
    Parse(#[from] ParseError),

    #[error("invalid configuration: {message}")]
    #[diagnostic(code(chartfuse::config))]
    Config { message: String },

    #[error("IO error: {0}")]
    #[diagnostic(code(chartfuse::io))]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    #[diagnostic(code(chartfuse::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

fn exit_label(exit_code: &Option<i32>) -> String {
    match exit_code {
        Some(code) => format!(" (exit code {})", code),
        None => String::new(),
    }
}

fn patch_label(patch: &Option<usize>) -> String {
    match patch {
        Some(index) => format!(" at patch #{}", index),
        None => String::new(),
    }
}

impl FuseError {
    pub fn workspace(path: impl AsRef<Path>, message: impl Into<String>) -> Self {
        Self::Workspace {
            path: path.as_ref().to_path_buf(),
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Attach overlay and patch position to a build failure
    pub fn at_patch(self, overlay: &str, patch: Option<usize>) -> Self {
        match self {
            Self::Build {
                exit_code, stderr, ..
            } => Self::Build {
                overlay: overlay.to_string(),
                patch,
                exit_code,
                stderr,
            },
            other => other,
        }
    }

    pub fn is_render(&self) -> bool {
        matches!(self, Self::Render { .. })
    }

    pub fn is_build(&self) -> bool {
        matches!(self, Self::Build { .. })
    }
}

impl From<CoreError> for FuseError {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::Merge(e) => Self::Merge(e),
            CoreError::Parse(e) => Self::Parse(e),
            CoreError::Io(e) => Self::Io(e),
            CoreError::YamlParse(e) => Self::Yaml(e),
            other => Self::Config {
                message: other.to_string(),
            },
        }
    }
}
