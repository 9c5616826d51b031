//! Integration tests for CLI commands
//!
//! `helm` and `kustomize` are replaced by small shell scripts, so these
//! only run on unix.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Renders one Deployment named `<release>-web`, labelled with the image
/// tag read from the first values file
const FAKE_HELM: &str = r#"#!/bin/sh
if [ "$1" != "template" ]; then
  echo "unsupported command: $1" >&2
  exit 1
fi
release="$2"
shift 3
ns=default
values=""
while [ $# -gt 0 ]; do
  case "$1" in
    --namespace) ns="$2"; shift ;;
    --values) if [ -z "$values" ]; then values="$2"; fi; shift ;;
  esac
  shift
done
tag=$(sed -n 's/^ *tag: *//p' "$values" | head -n 1)
cat <<EOF
apiVersion: apps/v1
kind: Deployment
metadata:
  name: ${release}-web
  namespace: ${ns}
  labels:
    tag: "${tag}"
spec:
  replicas: 1
EOF
"#;

const FAILING_HELM: &str = r#"#!/bin/sh
echo "Error: template: web/templates/deployment.yaml:3: boom" >&2
exit 1
"#;

/// Applies the replica count from `replicas.yaml` once the overlay config
/// points at the intermediate manifest
const FAKE_KUSTOMIZE: &str = r#"#!/bin/sh
dir="$2"
if ! grep -q 'helmoutput.yaml' "$dir/kustomization.yaml"; then
  echo "Error: helmoutput.yaml is not a resource" >&2
  exit 1
fi
replicas=$(sed -n 's/^ *value: *//p' "$dir/replicas.yaml")
sed "s/replicas: [0-9]*/replicas: ${replicas}/" "$dir/helmoutput.yaml"
"#;

const FAILING_KUSTOMIZE: &str = r#"#!/bin/sh
echo "Error: kaboom" >&2
exit 1
"#;

const CONFIG: &str = r#"apiVersion: chartfuse/v1
kind: HelmChart
metadata:
  name: web
chartName: web
chartHome: ./web
releaseName: prod
releaseNamespace: apps
chartPatches: patches
values:
  image:
    tag: v7
"#;

const KUSTOMIZATION: &str = r#"resources:
  - deployment.yaml
patchesJson6902:
  - target:
      group: apps
      version: v1
      kind: Deployment
      name: "*web"
    path: replicas.yaml
"#;

struct Fixture {
    dir: TempDir,
    config: PathBuf,
    helm: PathBuf,
    kustomize: PathBuf,
}

impl Fixture {
    fn new(helm: &str, kustomize: &str) -> Self {
        let dir = TempDir::new().unwrap();
        let chart = dir.path().join("web");
        fs::create_dir_all(chart.join("templates")).unwrap();
        fs::create_dir_all(chart.join("patches")).unwrap();
        fs::write(chart.join("Chart.yaml"), "apiVersion: v2\nname: web\nversion: 0.1.0\n").unwrap();
        fs::write(chart.join("requirements.yaml"), "dependencies: []\n").unwrap();
        fs::write(chart.join("templates/deployment.yaml"), "kind: Deployment\n").unwrap();
        fs::write(chart.join("patches/kustomization.yaml"), KUSTOMIZATION).unwrap();
        fs::write(
            chart.join("patches/replicas.yaml"),
            "- op: replace\n  path: /spec/replicas\n  value: 3\n",
        )
        .unwrap();

        let config = dir.path().join("chartfuse.yaml");
        fs::write(&config, CONFIG).unwrap();

        let helm_path = write_script(dir.path(), "fake-helm", helm);
        let kustomize_path = write_script(dir.path(), "fake-kustomize", kustomize);

        Self {
            dir,
            config,
            helm: helm_path,
            kustomize: kustomize_path,
        }
    }

    fn generate(&self, extra: &[&str]) -> Output {
        let mut args = vec![
            "generate".to_string(),
            self.config.display().to_string(),
            "--helm-bin".to_string(),
            self.helm.display().to_string(),
            "--kustomize-bin".to_string(),
            self.kustomize.display().to_string(),
        ];
        args.extend(extra.iter().map(|s| s.to_string()));
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        chartfuse(&refs)
    }

    fn path(&self, relative: &str) -> PathBuf {
        self.dir.path().join(relative)
    }
}

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Helper to run chartfuse command
fn chartfuse(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chartfuse"))
        .args(args)
        .env_remove("CHARTFUSE_LOG")
        .env_remove("CHARTFUSE_HELM_BIN")
        .env_remove("CHARTFUSE_KUSTOMIZE_BIN")
        .output()
        .expect("Failed to execute chartfuse")
}

mod generate_command {
    use super::*;

    #[test]
    fn test_generate_prints_fused_manifest() {
        let fixture = Fixture::new(FAKE_HELM, FAKE_KUSTOMIZE);
        let output = fixture.generate(&[]);

        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(output.status.success(), "generate failed: {stderr}");

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(stdout.contains("name: prod-web"));
        assert!(stdout.contains("namespace: apps"));
        assert!(stdout.contains("tag: \"v7\""));
        assert!(stdout.contains("replicas: 3"));
        assert!(stderr.contains("1 resource(s), 1 overlay build(s)"));
    }

    #[test]
    fn test_generate_leaves_chart_untouched() {
        let fixture = Fixture::new(FAKE_HELM, FAKE_KUSTOMIZE);
        let output = fixture.generate(&[]);
        assert!(output.status.success());

        assert!(fixture.path("web/requirements.yaml").exists());
        assert!(!fixture.path("web/patches/helmoutput.yaml").exists());
        assert_eq!(
            fs::read_to_string(fixture.path("web/patches/kustomization.yaml")).unwrap(),
            KUSTOMIZATION
        );
    }

    #[test]
    fn test_generate_to_file_with_overrides() {
        let fixture = Fixture::new(FAKE_HELM, FAKE_KUSTOMIZE);
        let out = fixture.path("out.yaml");
        let out_arg = out.display().to_string();

        let output = fixture.generate(&[
            "-o",
            &out_arg,
            "--release-name",
            "canary",
            "--namespace",
            "staging",
            "--set",
            "image.tag=v8",
        ]);

        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        assert!(output.stdout.is_empty());

        let written = fs::read_to_string(&out).unwrap();
        assert!(written.contains("name: canary-web"));
        assert!(written.contains("namespace: staging"));
        assert!(written.contains("tag: \"v8\""));
    }

    #[test]
    fn test_generate_keep_workspace() {
        let fixture = Fixture::new(FAKE_HELM, FAKE_KUSTOMIZE);
        let output = fixture.generate(&["--keep-workspace"]);
        assert!(output.status.success());

        let stderr = String::from_utf8_lossy(&output.stderr);
        let kept = stderr
            .lines()
            .find_map(|line| line.trim().strip_prefix("Workspace kept at "))
            .map(|path| PathBuf::from(console::strip_ansi_codes(path).to_string()))
            .expect("workspace path reported");

        let kustomization = fs::read_to_string(kept.join("web/patches/kustomization.yaml")).unwrap();
        assert!(kustomization.contains("prod-web"));
        assert!(kustomization.contains("helmoutput.yaml"));
        assert!(!kept.join("web/requirements.yaml").exists());
        fs::remove_dir_all(kept).unwrap();
    }

    #[test]
    fn test_render_failure_exit_code() {
        let fixture = Fixture::new(FAILING_HELM, FAKE_KUSTOMIZE);
        let output = fixture.generate(&[]);

        assert_eq!(output.status.code(), Some(3));
        assert!(output.stdout.is_empty());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("boom"));
    }

    #[test]
    fn test_build_failure_exit_code() {
        let fixture = Fixture::new(FAKE_HELM, FAILING_KUSTOMIZE);
        let output = fixture.generate(&[]);

        assert_eq!(output.status.code(), Some(4));
        assert!(output.stdout.is_empty());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("kaboom"));
    }

    #[test]
    fn test_invalid_config_exit_code() {
        let fixture = Fixture::new(FAKE_HELM, FAKE_KUSTOMIZE);
        fs::write(&fixture.config, "chartName: web\ntimeout: 0s\n").unwrap();

        let output = fixture.generate(&[]);
        assert_eq!(output.status.code(), Some(2));
    }

    #[test]
    fn test_missing_config_exit_code() {
        let fixture = Fixture::new(FAKE_HELM, FAKE_KUSTOMIZE);
        fs::remove_file(&fixture.config).unwrap();

        let output = fixture.generate(&[]);
        assert_eq!(output.status.code(), Some(5));
    }
}

mod merge_command {
    use super::*;

    #[test]
    fn test_merge_into_every_resource() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("manifest.yaml");
        let overlay = dir.path().join("labels.yaml");
        fs::write(
            &base,
            "kind: Service\nmetadata:\n  name: a\n---\nkind: ConfigMap\nmetadata:\n  name: b\n  labels:\n    owner: ops\n",
        )
        .unwrap();
        fs::write(&overlay, "metadata:\n  labels:\n    team: core\n").unwrap();

        let output = chartfuse(&[
            "merge",
            &base.display().to_string(),
            &overlay.display().to_string(),
        ]);

        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(stdout.matches("team: core").count(), 2);
        assert!(stdout.contains("owner: ops"));
        assert!(stdout.contains("---"));
    }

    #[test]
    fn test_merge_rejects_invalid_manifest() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("manifest.yaml");
        let overlay = dir.path().join("labels.yaml");
        fs::write(&base, "- not\n- a\n- resource\n").unwrap();
        fs::write(&overlay, "metadata: {}\n").unwrap();

        let output = chartfuse(&[
            "merge",
            &base.display().to_string(),
            &overlay.display().to_string(),
        ]);

        assert_eq!(output.status.code(), Some(1));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("document #0"));
    }
}
