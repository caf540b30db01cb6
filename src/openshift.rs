//! OpenShift CLI wrapper
//!
//! Drives `oc` for the template and Helm suites: a throwaway project per
//! test, imagestream + template deployment, and pod readiness polling over
//! `oc get pods -o json`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use crate::engine::{capture, capture_checked, capture_with_stdin, CommandOutput};
use crate::error::{HarnessError, Result};

/// How often to re-list pods while waiting for readiness.
const POD_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
pub struct PodList {
    #[serde(default)]
    pub items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
pub struct Pod {
    pub metadata: PodMetadata,
    #[serde(default)]
    pub status: PodStatus,
}

#[derive(Debug, Deserialize)]
pub struct PodMetadata {
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    #[serde(default)]
    pub phase: String,
    #[serde(default)]
    pub container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerStatus {
    #[serde(default)]
    pub ready: bool,
}

/// Whether a pod counts as the running application pod for a prefix.
/// Deployer and build pods match the prefix too and must be excluded.
pub fn pod_is_running(pod: &Pod, prefix: &str) -> bool {
    let name = &pod.metadata.name;
    name.starts_with(prefix)
        && !name.ends_with("-deploy")
        && !name.ends_with("-build")
        && pod.status.phase == "Running"
        && !pod.status.container_statuses.is_empty()
        && pod.status.container_statuses.iter().all(|c| c.ready)
}

/// `oc` wrapper scoped to one generated project.
#[derive(Debug, Clone)]
pub struct OpenShiftCli {
    binary: PathBuf,
    pub pod_name_prefix: String,
    pub namespace: String,
}

impl OpenShiftCli {
    /// Generate a unique project name from the prefix. The project is not
    /// created until [`create_project`] runs.
    ///
    /// [`create_project`]: OpenShiftCli::create_project
    pub fn new(pod_name_prefix: &str) -> Result<Self> {
        let namespace = format!(
            "{pod_name_prefix}-{}",
            &Uuid::new_v4().simple().to_string()[..8]
        );
        Self::in_namespace(pod_name_prefix, &namespace)
    }

    /// Bind to an existing or caller-chosen namespace (the Helm wrapper
    /// shares one this way).
    pub fn in_namespace(pod_name_prefix: &str, namespace: &str) -> Result<Self> {
        let binary = which::which("oc")
            .map_err(|_| HarnessError::BinaryNotFound("oc".to_string()))?;
        Ok(Self {
            binary,
            pod_name_prefix: pod_name_prefix.to_string(),
            namespace: namespace.to_string(),
        })
    }

    async fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<CommandOutput> {
        capture_checked(&self.binary, args).await
    }

    pub async fn create_project(&self) -> Result<()> {
        info!(namespace = %self.namespace, "creating project");
        let _ = self.run(&["new-project", &self.namespace]).await?;
        Ok(())
    }

    pub async fn delete_project(&self) -> Result<()> {
        info!(namespace = %self.namespace, "deleting project");
        let _ = capture(
            &self.binary,
            &["delete", "project", &self.namespace, "--ignore-not-found"],
        )
        .await?;
        Ok(())
    }

    /// `oc apply -f <file>` inside the project.
    pub async fn apply_file(&self, file: &Path) -> Result<()> {
        let file = file.to_string_lossy().into_owned();
        let _ = self
            .run(&["apply", "-n", &self.namespace, "-f", file.as_str()])
            .await?;
        Ok(())
    }

    /// Process a template locally with parameters, returning the rendered
    /// JSON document.
    pub async fn process_template(
        &self,
        template: &Path,
        params: &[(&str, &str)],
    ) -> Result<String> {
        let template = template.to_string_lossy().into_owned();
        let mut args = vec![
            "process".to_string(),
            "--local".to_string(),
            "-o".to_string(),
            "json".to_string(),
            "-f".to_string(),
            template,
        ];
        for (key, value) in params {
            args.push("-p".to_string());
            args.push(format!("{key}={value}"));
        }
        let output = self.run(&args).await?;
        Ok(output.stdout)
    }

    /// Deploy an imagestream plus a processed template, the way the
    /// template suite provisions the database.
    pub async fn deploy_image_stream_template(
        &self,
        imagestream_file: &Path,
        template_file: &Path,
        app_name: &str,
    ) -> Result<()> {
        self.apply_file(imagestream_file).await?;

        let rendered = self
            .process_template(
                template_file,
                &[
                    ("DATABASE_SERVICE_NAME", app_name),
                    ("NAMESPACE", &self.namespace),
                ],
            )
            .await?;

        let _ = capture_with_stdin(
            &self.binary,
            &["apply", "-n", &self.namespace, "-f", "-"],
            &rendered,
        )
        .await?;
        Ok(())
    }

    pub async fn get_pods(&self) -> Result<PodList> {
        let output = self
            .run(&["get", "pods", "-n", &self.namespace, "-o", "json"])
            .await?;
        serde_json::from_str(&output.stdout).map_err(|e| HarnessError::CommandFailed {
            command: "oc get pods -o json".to_string(),
            status: 0,
            stderr: e.to_string(),
        })
    }

    /// Poll until a pod with the prefix is running and ready.
    pub async fn is_pod_running(&self, prefix: &str, max_wait: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            let pods = self.get_pods().await?;
            if pods.items.iter().any(|pod| pod_is_running(pod, prefix)) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                debug!(prefix, "no running pod before deadline");
                return Ok(false);
            }
            sleep(POD_POLL_INTERVAL).await;
        }
    }

    /// Name of the first running pod with the prefix, if any.
    pub async fn running_pod_name(&self, prefix: &str) -> Result<Option<String>> {
        let pods = self.get_pods().await?;
        Ok(pods
            .items
            .into_iter()
            .find(|pod| pod_is_running(pod, prefix))
            .map(|pod| pod.metadata.name))
    }

    /// Run a shell command inside a pod.
    pub async fn exec_in_pod(&self, pod: &str, cmd: &str) -> Result<CommandOutput> {
        capture(
            &self.binary,
            &["exec", "-n", &self.namespace, pod, "--", "bash", "-c", cmd],
        )
        .await
    }

    /// `oc get <kind> <name> -o json`, for imagestream checks.
    pub async fn get_json(&self, kind: &str, name: &str) -> Result<String> {
        let output = self
            .run(&["get", kind, name, "-n", &self.namespace, "-o", "json"])
            .await?;
        Ok(output.stdout)
    }
}
