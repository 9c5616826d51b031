//! Merge command - deep merge a document into every resource of a manifest

use chartfuse_core::{ManifestSet, StructuredValue};
use console::style;
use std::path::Path;

use super::write_output;
use crate::error::{CliError, Result};

pub fn run(base: &Path, overlay: &Path, output: Option<&Path>) -> Result<()> {
    let bytes = std::fs::read(base).map_err(|e| CliError::io_at(base, e))?;
    let mut set = ManifestSet::from_bytes(&bytes)?;

    let document = StructuredValue::from_file(overlay)?;
    if document.as_mapping().is_none() {
        return Err(CliError::config_with_help(
            format!("{} is not a mapping", overlay.display()),
            "the overlay document must be a YAML mapping",
        ));
    }

    set.merge_document(&document)?;
    write_output(&set.to_yaml_bytes()?, output)?;

    eprintln!(
        "{} Merged {} into {} resource(s)",
        style("✓").green().bold(),
        overlay.display(),
        set.len()
    );
    Ok(())
}
