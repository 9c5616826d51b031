//! Core error types

use thiserror::Error;

use crate::manifest::ParseError;
use crate::merge::MergeError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value: {message}")]
    InvalidValue { message: String },

    #[error("Invalid resource: {message}")]
    InvalidResource { message: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
