//! Isolated working directories for pipeline runs
//!
//! A workspace owns a fresh temp directory. The chart is always placed at
//! `<workspace>/<chartName>`, whether it comes from a local directory, a
//! local archive or the fetch tool, so that the destructive steps of a run
//! (lock file stripping, placeholder substitution, overlay rewrites) never
//! touch the caller's files.

use chartfuse_core::{ChartConfig, RepoCredentials};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tar::Archive;
use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::{FuseError, Result};

/// File stem of dependency artifacts removed from the chart root
pub const REQUIREMENTS_STEM: &str = "requirements";

const STAGING_DIR: &str = ".staging";

/// Where the chart comes from
#[derive(Debug, Clone)]
pub struct ChartSource {
    pub chart_name: String,
    /// Local chart directory or archive
    pub chart_home: Option<PathBuf>,
    pub repo: String,
    pub version: Option<String>,
    pub credentials: Option<RepoCredentials>,
}

impl ChartSource {
    /// Build from config, reading repository credentials if declared
    pub fn from_config(config: &ChartConfig) -> Result<Self> {
        let credentials = match &config.chart_repo_auth {
            Some(auth) => Some(auth.load().map_err(|e| {
                FuseError::workspace(&auth.password_file, format!("cannot read repository password: {}", e))
            })?),
            None => None,
        };

        Ok(Self {
            chart_name: config.chart_name.clone(),
            chart_home: config.chart_home.clone(),
            repo: config.chart_repo.clone(),
            version: config.chart_version.clone(),
            credentials,
        })
    }
}

/// Inputs of a chart fetch
#[derive(Debug, Clone)]
pub struct FetchRequest<'a> {
    pub chart_name: &'a str,
    pub repo: &'a str,
    pub version: Option<&'a str>,
    /// Directory the chart is unpacked into (as `<destination>/<chart_name>`)
    pub destination: &'a Path,
    pub credentials: Option<&'a RepoCredentials>,
}

/// Retrieves a chart bundle and unpacks it
pub trait ChartFetcher {
    fn fetch(&self, request: &FetchRequest<'_>) -> Result<()>;
}

/// A disposable working directory holding one run's files
#[derive(Debug)]
pub struct Workspace {
    dir: Option<TempDir>,
    root: PathBuf,
    chart_path: PathBuf,
}

impl Workspace {
    /// Create an empty workspace for a chart
    pub fn create(chart_name: &str) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("chartfuse-")
            .tempdir()
            .map_err(|e| {
                FuseError::workspace(std::env::temp_dir(), format!("cannot create workspace: {}", e))
            })?;
        let root = dir.path().to_path_buf();
        let chart_path = root.join(chart_name);

        Ok(Self {
            dir: Some(dir),
            root,
            chart_path,
        })
    }

    /// Create a workspace and place the chart in it
    pub fn prepare(source: &ChartSource, fetcher: &dyn ChartFetcher) -> Result<Self> {
        let workspace = Self::create(&source.chart_name)?;
        debug!(workspace = %workspace.root.display(), chart = %source.chart_name, "preparing workspace");

        if let Err(e) = workspace.place_chart(source, fetcher) {
            // A half-copied chart is never a usable state.
            let _ = fs::remove_dir_all(&workspace.chart_path);
            return Err(e);
        }

        let removed = strip_requirements(&workspace.chart_path)?;
        for path in &removed {
            debug!(file = %path.display(), "removed dependency artifact");
        }

        info!(chart = %workspace.chart_path.display(), "chart placed");
        Ok(workspace)
    }

    fn place_chart(&self, source: &ChartSource, fetcher: &dyn ChartFetcher) -> Result<()> {
        match source.chart_home.as_deref() {
            Some(home) if home.is_dir() => {
                debug!(from = %home.display(), "copying local chart");
                copy_dir(home, &self.chart_path)
            }
            Some(home) if home.is_file() && is_archive(home) => {
                debug!(from = %home.display(), "unpacking local chart archive");
                let staging = self.root.join(STAGING_DIR);
                extract_archive(home, &staging)?;
                let unpacked = find_unpacked_chart(&staging, &source.chart_name)?;
                relocate(&unpacked, &self.chart_path)
            }
            Some(home) if home.exists() => Err(FuseError::workspace(
                home,
                "chartHome must be a chart directory or a .tgz archive",
            )),
            _ => {
                let staging = self.root.join(STAGING_DIR);
                fs::create_dir_all(&staging)
                    .map_err(|e| FuseError::workspace(&staging, e.to_string()))?;

                let request = FetchRequest {
                    chart_name: &source.chart_name,
                    repo: &source.repo,
                    version: source.version.as_deref(),
                    destination: &staging,
                    credentials: source.credentials.as_ref(),
                };
                info!(chart = %source.chart_name, repo = %source.repo, "fetching chart");
                fetcher.fetch(&request)?;

                let unpacked = staging.join(&source.chart_name);
                if !unpacked.is_dir() {
                    return Err(FuseError::workspace(
                        &unpacked,
                        "fetch finished but the chart directory is missing",
                    ));
                }
                relocate(&unpacked, &self.chart_path)
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of the placed chart
    pub fn chart_path(&self) -> &Path {
        &self.chart_path
    }

    /// Write a scratch file at the workspace root
    pub fn write_file(&self, name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.root.join(name);
        fs::write(&path, contents).map_err(|e| FuseError::workspace(&path, e.to_string()))?;
        Ok(path)
    }

    /// Keep the directory on disk and return its path
    pub fn keep(mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            let _ = dir.keep();
        }
        self.root.clone()
    }
}

/// Remove `requirements.*` files from the top level of a chart
///
/// Only regular files whose stem is exactly `requirements` are removed;
/// subdirectories are not scanned.
pub fn strip_requirements(chart_dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(chart_dir).map_err(|e| FuseError::workspace(chart_dir, e.to_string()))?;

    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| FuseError::workspace(chart_dir, e.to_string()))?;
        let path = entry.path();
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        let stem_matches = path
            .file_stem()
            .is_some_and(|stem| stem == REQUIREMENTS_STEM);

        if is_file && stem_matches {
            fs::remove_file(&path).map_err(|e| FuseError::workspace(&path, e.to_string()))?;
            removed.push(path);
        }
    }

    removed.sort();
    Ok(removed)
}

fn is_archive(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(".tgz") || name.ends_with(".tar.gz")
}

fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).map_err(|e| FuseError::workspace(archive_path, e.to_string()))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    fs::create_dir_all(dest).map_err(|e| FuseError::workspace(dest, e.to_string()))?;
    archive
        .unpack(dest)
        .map_err(|e| FuseError::workspace(archive_path, format!("cannot unpack archive: {}", e)))
}

/// Locate the chart inside an unpacked archive: `<chart_name>/` or the only top-level directory
fn find_unpacked_chart(staging: &Path, chart_name: &str) -> Result<PathBuf> {
    let named = staging.join(chart_name);
    if named.is_dir() {
        return Ok(named);
    }

    let dirs: Vec<PathBuf> = fs::read_dir(staging)
        .map_err(|e| FuseError::workspace(staging, e.to_string()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();

    match dirs.as_slice() {
        [only] => Ok(only.clone()),
        _ => Err(FuseError::workspace(
            staging,
            format!("archive does not contain a single chart directory for '{}'", chart_name),
        )),
    }
}

/// Move a directory, copying when a rename is not possible
fn relocate(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_dir(from, to)?;
    fs::remove_dir_all(from).map_err(|e| FuseError::workspace(from, e.to_string()))
}

/// Copy a directory tree
fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from) {
        let entry = entry.map_err(|e| FuseError::workspace(from, e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| FuseError::workspace(entry.path(), e.to_string()))?;
        let target = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| FuseError::workspace(&target, e.to_string()))?;
        } else {
            fs::copy(entry.path(), &target)
                .map_err(|e| FuseError::workspace(&target, e.to_string()))?;
        }
    }
    Ok(())
}
