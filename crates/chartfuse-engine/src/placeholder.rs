//! Release placeholders in overlay files
//!
//! Overlay files are written once for any release. Resource names in them
//! use `?` where the rendered name is the bare release name (or nothing,
//! when the release is named after the chart) and `*` where the rendered
//! name is prefixed with `<release>-`.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{FuseError, Result};

pub const BLANK_TOKEN: &str = "?";
pub const WILDCARD_TOKEN: &str = "*";

/// Replacement text for each token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placeholders {
    pub blank: String,
    pub wildcard: String,
}

impl Placeholders {
    pub fn for_release(release_name: &str, chart_name: &str) -> Self {
        let blank = if release_name == chart_name {
            String::new()
        } else {
            release_name.to_string()
        };

        Self {
            blank,
            wildcard: format!("{}-", release_name),
        }
    }

    pub fn apply(&self, text: &str) -> String {
        text.replace(BLANK_TOKEN, &self.blank)
            .replace(WILDCARD_TOKEN, &self.wildcard)
    }
}

/// Substitute placeholders in every `*.yaml` file directly inside `dir`
///
/// Returns the files that changed. Files are rewritten in place.
pub fn substitute_dir(dir: &Path, placeholders: &Placeholders) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        FuseError::config(format!("cannot read overlay directory {}: {}", dir.display(), e))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "yaml"))
        .collect();
    files.sort();

    let mut changed = Vec::new();
    for path in files {
        let original = fs::read_to_string(&path)?;
        let substituted = placeholders.apply(&original);
        if substituted != original {
            fs::write(&path, substituted)?;
            debug!(file = %path.display(), "substituted placeholders");
            changed.push(path);
        }
    }

    Ok(changed)
}
