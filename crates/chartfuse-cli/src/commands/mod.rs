//! CLI commands

pub mod generate;
pub mod merge;

use std::io::Write;
use std::path::Path;

use crate::error::{CliError, Result};

/// Write command output to a file, or stdout when no file is given
pub(crate) fn write_output(bytes: &[u8], output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, bytes).map_err(|e| CliError::io_at(path, e)),
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(bytes)?;
            stdout.flush()?;
            Ok(())
        }
    }
}
