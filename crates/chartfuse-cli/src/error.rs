//! CLI error types with exit code handling
//!
//! Pipeline errors pass through with their own diagnostics; everything the
//! CLI itself detects is wrapped here. Each variant maps to a stable exit
//! code.

use chartfuse_core::{CoreError, ParseError};
use chartfuse_engine::FuseError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// Configuration document or override is invalid
    #[error("Configuration error: {message}")]
    #[diagnostic(code(chartfuse::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// A pipeline step failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Pipeline(#[from] FuseError),

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(chartfuse::cli::io))]
    Io { message: String },
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Pipeline(e) => match e {
                FuseError::Render { .. } => exit_codes::RENDER_ERROR,
                FuseError::Build { .. } => exit_codes::BUILD_ERROR,
                FuseError::Config { .. } | FuseError::Yaml(_) => exit_codes::CONFIG_ERROR,
                FuseError::Io(_) => exit_codes::IO_ERROR,
                FuseError::Workspace { .. } | FuseError::Merge(_) | FuseError::Parse(_) => {
                    exit_codes::ERROR
                }
            },
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// IO failure on a named file
    pub fn io_at(path: &std::path::Path, err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{}: {}", path.display(), err),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Io(e) => e.into(),
            CoreError::Merge(e) => FuseError::Merge(e).into(),
            CoreError::Parse(e) => FuseError::Parse(e).into(),
            other => CliError::config(other.to_string()),
        }
    }
}

impl From<ParseError> for CliError {
    fn from(err: ParseError) -> Self {
        FuseError::Parse(err).into()
    }
}
