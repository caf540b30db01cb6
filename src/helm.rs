//! Helm chart wrapper
//!
//! Drives `helm` (and `oc` for pod checks) for the shared-chart suites:
//! clone the chart repo, package a named chart, install it with values,
//! verify imagestream tags, and run the chart's own test pods.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tempfile::TempDir;
use tracing::info;

use crate::engine::{capture_checked, CommandOutput};
use crate::error::{HarnessError, Result};
use crate::openshift::OpenShiftCli;

#[derive(Debug, Deserialize)]
pub struct ImageStream {
    pub spec: ImageStreamSpec,
}

#[derive(Debug, Deserialize)]
pub struct ImageStreamSpec {
    #[serde(default)]
    pub tags: Vec<TagReference>,
}

#[derive(Debug, Deserialize)]
pub struct TagReference {
    pub name: String,
    pub from: Option<ObjectReference>,
}

#[derive(Debug, Deserialize)]
pub struct ObjectReference {
    pub name: String,
}

/// Whether the imagestream carries `version` pointing at `registry`.
pub fn imagestream_has_tag(stream: &ImageStream, version: &str, registry: &str) -> bool {
    stream.spec.tags.iter().any(|tag| {
        tag.name == version
            && tag
                .from
                .as_ref()
                .map(|from| from.name == registry)
                .unwrap_or(false)
    })
}

/// Path helm reports after packaging, scraped from its stdout.
pub fn packaged_path_from_output(stdout: &str) -> Option<PathBuf> {
    stdout
        .lines()
        .find_map(|line| line.strip_prefix("Successfully packaged chart and saved it to: "))
        .map(|path| PathBuf::from(path.trim()))
}

/// Render install values to a YAML file helm consumes with `-f`.
pub fn write_values_file(path: &Path, values: &BTreeMap<String, String>) -> Result<()> {
    let rendered = serde_yaml::to_string(values).map_err(|e| HarnessError::CommandFailed {
        command: "serialize helm values".to_string(),
        status: 0,
        stderr: e.to_string(),
    })?;
    std::fs::write(path, rendered)?;
    Ok(())
}

/// One chart under test inside a generated project.
pub struct HelmChart {
    helm: PathBuf,
    git: PathBuf,
    pub package_name: String,
    oc: OpenShiftCli,
    workdir: TempDir,
    charts_dir: Option<PathBuf>,
    packaged: Option<PathBuf>,
}

impl HelmChart {
    pub fn new(package_name: &str, pod_name_prefix: &str) -> Result<Self> {
        let helm = which::which("helm")
            .map_err(|_| HarnessError::BinaryNotFound("helm".to_string()))?;
        let git = which::which("git")
            .map_err(|_| HarnessError::BinaryNotFound("git".to_string()))?;
        Ok(Self {
            helm,
            git,
            package_name: package_name.to_string(),
            oc: OpenShiftCli::new(pod_name_prefix)?,
            workdir: TempDir::new()?,
            charts_dir: None,
            packaged: None,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.oc.namespace
    }

    pub async fn create_project(&self) -> Result<()> {
        self.oc.create_project().await
    }

    pub async fn delete_project(&self) -> Result<()> {
        self.oc.delete_project().await
    }

    /// Shallow-clone the chart repository and select the subdir holding the
    /// charts (e.g. `charts/redhat`).
    pub async fn clone_chart_repo(
        &mut self,
        repo_url: &str,
        repo_name: &str,
        subdir: &str,
    ) -> Result<()> {
        let checkout = self.workdir.path().join(repo_name);
        if !checkout.exists() {
            info!(%repo_url, "cloning chart repository");
            let checkout_str = checkout.to_string_lossy().into_owned();
            let _ = capture_checked(
                &self.git,
                &["clone", "--depth", "1", repo_url, checkout_str.as_str()],
            )
            .await?;
        }
        self.charts_dir = Some(checkout.join(subdir));
        Ok(())
    }

    fn chart_source(&self) -> Result<PathBuf> {
        let charts_dir = self.charts_dir.as_ref().ok_or_else(|| {
            HarnessError::CommandFailed {
                command: "helm package".to_string(),
                status: 0,
                stderr: "chart repository was not cloned".to_string(),
            }
        })?;
        Ok(charts_dir.join(&self.package_name))
    }

    /// `helm package` the selected chart; remembers the tarball for
    /// [`install`].
    ///
    /// [`install`]: HelmChart::install
    pub async fn package(&mut self) -> Result<PathBuf> {
        let source = self.chart_source()?;
        let source_str = source.to_string_lossy().into_owned();
        let dest = self.workdir.path().to_string_lossy().into_owned();

        let output = capture_checked(
            &self.helm,
            &[
                "package",
                source_str.as_str(),
                "--destination",
                dest.as_str(),
            ],
        )
        .await?;

        let tarball =
            packaged_path_from_output(&output.stdout).ok_or(HarnessError::CommandFailed {
                command: "helm package".to_string(),
                status: 0,
                stderr: format!("could not locate packaged chart in: {}", output.stdout.trim()),
            })?;
        info!(tarball = %tarball.display(), "chart packaged");
        self.packaged = Some(tarball.clone());
        Ok(tarball)
    }

    /// Install the packaged tarball into the project. Values are rendered
    /// to a YAML file and passed with `-f`.
    pub async fn install(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let tarball = self.packaged.as_ref().ok_or_else(|| {
            HarnessError::CommandFailed {
                command: "helm install".to_string(),
                status: 0,
                stderr: "chart was not packaged".to_string(),
            }
        })?;
        let tarball = tarball.to_string_lossy().into_owned();

        let mut args = vec![
            "install".to_string(),
            self.package_name.clone(),
            tarball,
            "--namespace".to_string(),
            self.namespace().to_string(),
            "--create-namespace".to_string(),
        ];
        let values_file = self.workdir.path().join("values.yaml");
        if !values.is_empty() {
            write_values_file(&values_file, values)?;
            args.push("-f".to_string());
            args.push(values_file.to_string_lossy().into_owned());
        }

        info!(release = %self.package_name, "installing chart");
        let _ = capture_checked(&self.helm, &args).await?;
        Ok(())
    }

    pub async fn uninstall(&self) -> Result<()> {
        let _ = capture_checked(
            &self.helm,
            &[
                "uninstall",
                &self.package_name,
                "--namespace",
                self.namespace(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn is_pod_running(&self, prefix: &str, max_wait: Duration) -> Result<bool> {
        self.oc.is_pod_running(prefix, max_wait).await
    }

    /// Confirm the installed imagestream carries the version tag pointing
    /// at the expected registry reference.
    pub async fn check_imagestreams(&self, version: &str, registry: &str) -> Result<bool> {
        let raw = self.oc.get_json("is", "mariadb").await?;
        let stream: ImageStream =
            serde_json::from_str(&raw).map_err(|e| HarnessError::CommandFailed {
                command: "oc get is mariadb -o json".to_string(),
                status: 0,
                stderr: e.to_string(),
            })?;
        Ok(imagestream_has_tag(&stream, version, registry))
    }

    /// Run the chart's own test pods (`helm test --logs`) and require every
    /// expected string in the output.
    pub async fn test_chart(&self, expected: &[&str]) -> Result<bool> {
        let output: CommandOutput = capture_checked(
            &self.helm,
            &[
                "test",
                &self.package_name,
                "--namespace",
                self.namespace(),
                "--logs",
            ],
        )
        .await?;
        let combined = output.combined();
        Ok(expected.iter().all(|needle| combined.contains(needle)))
    }
}
