//! Generator configuration (`kind: HelmChart` documents)
//!
//! ```yaml
//! apiVersion: chartfuse.dev/v1
//! kind: HelmChart
//! metadata:
//!   name: web
//! chartName: web
//! chartHome: ./charts/web
//! releaseName: web-prod
//! releaseNamespace: prod
//! values:
//!   replicas: 2
//! chartPatches:
//!   - patches/base
//!   - patches/prod
//! ```
//!
//! `apiVersion`, `kind` and `metadata` are accepted and ignored. Empty
//! strings count as unset so that generated documents can leave fields blank.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::value::StructuredValue;

pub const DEFAULT_CHART_REPO: &str = "https://kubernetes-charts.storage.googleapis.com";
pub const DEFAULT_RELEASE_NAME: &str = "release-name";
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_HELM_BIN: &str = "helm";
pub const DEFAULT_KUSTOMIZE_BIN: &str = "kustomize";

/// Chart rendering and overlay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfig {
    /// Chart name (required)
    pub chart_name: String,

    /// Local chart directory or `.tgz` archive; fetched when absent
    #[serde(default)]
    pub chart_home: Option<PathBuf>,

    /// Version constraint passed to the fetch step
    #[serde(default)]
    pub chart_version: Option<String>,

    /// Repository to fetch the chart from
    #[serde(default = "default_chart_repo")]
    pub chart_repo: String,

    /// Repository credentials
    #[serde(default)]
    pub chart_repo_auth: Option<RepoAuth>,

    /// Extra values file handed to the render engine after the inline values
    #[serde(default)]
    pub values_from: Option<PathBuf>,

    /// Inline values document
    #[serde(default)]
    pub values: StructuredValue,

    #[serde(default = "default_release_name")]
    pub release_name: String,

    #[serde(default = "default_namespace")]
    pub release_namespace: String,

    /// Extra render arguments: a whitespace-separated string or a list
    #[serde(default, deserialize_with = "args_from_line_or_list")]
    pub extra_args: Vec<String>,

    /// Overlay directories, relative to the chart, applied in order
    #[serde(default, deserialize_with = "one_or_many")]
    pub chart_patches: Vec<String>,

    #[serde(default = "default_helm_bin")]
    pub helm_bin: String,

    #[serde(default = "default_kustomize_bin")]
    pub kustomize_bin: String,

    /// Limit for every external tool invocation
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

/// Repository authentication as declared in the config
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoAuth {
    pub username: String,
    pub password_file: PathBuf,
}

impl RepoAuth {
    /// Read the password file
    pub fn load(&self) -> Result<RepoCredentials> {
        let password = std::fs::read_to_string(&self.password_file)?;
        Ok(RepoCredentials {
            username: self.username.clone(),
            password: password.trim_end_matches(['\r', '\n']).to_string(),
        })
    }
}

/// Resolved repository credentials
#[derive(Clone, PartialEq, Eq)]
pub struct RepoCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RepoCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepoCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn default_chart_repo() -> String {
    DEFAULT_CHART_REPO.to_string()
}

fn default_release_name() -> String {
    DEFAULT_RELEASE_NAME.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_helm_bin() -> String {
    DEFAULT_HELM_BIN.to_string()
}

fn default_kustomize_bin() -> String {
    DEFAULT_KUSTOMIZE_BIN.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Vec<String>, D::Error> {
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(item)) if item.trim().is_empty() => Vec::new(),
        Some(OneOrMany::One(item)) => vec![item],
        Some(OneOrMany::Many(items)) => items,
    })
}

fn args_from_line_or_list<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Vec<String>, D::Error> {
    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(line)) if line == "null" => Vec::new(),
        Some(OneOrMany::One(line)) => line.split_whitespace().map(str::to_string).collect(),
        Some(OneOrMany::Many(items)) => items,
    })
}

impl ChartConfig {
    /// Minimal config for a chart
    pub fn new(chart_name: impl Into<String>) -> Self {
        Self {
            chart_name: chart_name.into(),
            chart_home: None,
            chart_version: None,
            chart_repo: default_chart_repo(),
            chart_repo_auth: None,
            values_from: None,
            values: StructuredValue::empty_mapping(),
            release_name: default_release_name(),
            release_namespace: default_namespace(),
            extra_args: Vec::new(),
            chart_patches: Vec::new(),
            helm_bin: default_helm_bin(),
            kustomize_bin: default_kustomize_bin(),
            timeout: default_timeout(),
        }
    }

    /// Load a config file; relative paths resolve against its directory
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;
        if let Some(dir) = path.parent() {
            config.resolve_paths(dir);
        }
        Ok(config)
    }

    /// Parse, normalize and validate a config document
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let mut config: ChartConfig = serde_yaml::from_str(yaml)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Treat blank and `null` strings as unset
    pub fn normalize(&mut self) {
        fn blank(s: &str) -> bool {
            s.trim().is_empty() || s == "null"
        }

        if blank(&self.release_name) {
            self.release_name = default_release_name();
        }
        if blank(&self.release_namespace) {
            self.release_namespace = default_namespace();
        }
        if blank(&self.chart_repo) {
            self.chart_repo = default_chart_repo();
        }
        if blank(&self.helm_bin) {
            self.helm_bin = default_helm_bin();
        }
        if blank(&self.kustomize_bin) {
            self.kustomize_bin = default_kustomize_bin();
        }
        if self.chart_version.as_deref().is_some_and(blank) {
            self.chart_version = None;
        }
        if self
            .chart_home
            .as_deref()
            .is_some_and(|p| blank(&p.to_string_lossy()))
        {
            self.chart_home = None;
        }
        if self
            .values_from
            .as_deref()
            .is_some_and(|p| blank(&p.to_string_lossy()))
        {
            self.values_from = None;
        }
        if self.values.is_null() {
            self.values = StructuredValue::empty_mapping();
        }
        self.chart_patches.retain(|p| !blank(p));
    }

    /// Check the config for values that can never render
    pub fn validate(&self) -> Result<()> {
        if self.chart_name.trim().is_empty() {
            return Err(CoreError::MissingField {
                field: "chartName".to_string(),
            });
        }
        if self.chart_name.contains(['/', '\\']) || self.chart_name == ".." {
            return Err(CoreError::InvalidConfig {
                message: format!("chartName '{}' must not contain path separators", self.chart_name),
            });
        }

        // Constraints are resolved by the render engine; this only warns.
        if let Some(version) = &self.chart_version
            && !is_known_version_constraint(version)
        {
            warn!(chart_version = %version, "chartVersion is not a recognised version constraint, passing it through");
        }

        if self.values.as_mapping().is_none() {
            return Err(CoreError::InvalidConfig {
                message: "values must be a mapping".to_string(),
            });
        }

        for patch_dir in &self.chart_patches {
            let path = Path::new(patch_dir);
            let escapes = path.is_absolute()
                || path
                    .components()
                    .any(|c| matches!(c, std::path::Component::ParentDir));
            if escapes {
                return Err(CoreError::InvalidConfig {
                    message: format!(
                        "chartPatches entry '{}' must be a relative path inside the chart",
                        patch_dir
                    ),
                });
            }
        }

        if self.timeout.is_zero() {
            return Err(CoreError::InvalidConfig {
                message: "timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }

    /// Resolve relative file references against `base`
    pub fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };

        if let Some(home) = self.chart_home.as_mut() {
            resolve(home);
        }
        if let Some(values) = self.values_from.as_mut() {
            resolve(values);
        }
        if let Some(auth) = self.chart_repo_auth.as_mut() {
            resolve(&mut auth.password_file);
        }
    }

    /// Whether the overlay fusion step runs
    pub fn has_patches(&self) -> bool {
        !self.chart_patches.is_empty()
    }
}

/// Whether `constraint` reads as a chart version constraint
///
/// Accepts plain versions with an optional `v` prefix, comparisons joined by
/// commas or spaces, hyphen ranges and `||` alternatives.
pub fn is_known_version_constraint(constraint: &str) -> bool {
    constraint.split("||").all(|alternative| {
        let alternative = alternative.trim();
        if let Some((low, high)) = alternative.split_once(" - ") {
            let range = format!(">={}, <={}", strip_v(low.trim()), strip_v(high.trim()));
            return semver::VersionReq::parse(&range).is_ok();
        }

        let mut comparators = Vec::new();
        let mut pending = String::new();
        for token in alternative
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            pending.push_str(token);
            // A bare operator binds to the version after it: `>= 1.2`
            if token.chars().all(is_operator) {
                continue;
            }
            comparators.push(strip_v(&pending));
            pending.clear();
        }

        !comparators.is_empty()
            && pending.is_empty()
            && semver::VersionReq::parse(&comparators.join(", ")).is_ok()
    })
}

fn is_operator(c: char) -> bool {
    matches!(c, '<' | '>' | '=' | '~' | '^' | '!')
}

/// `>=v1.2` becomes `>=1.2`
fn strip_v(comparator: &str) -> String {
    let split = comparator.find(|c: char| !is_operator(c)).unwrap_or(comparator.len());
    let (op, rest) = comparator.split_at(split);
    match rest.strip_prefix(['v', 'V']) {
        Some(version) if version.starts_with(|c: char| c.is_ascii_digit()) => format!("{op}{version}"),
        _ => comparator.to_string(),
    }
}
