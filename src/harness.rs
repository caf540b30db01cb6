//! Container lifecycle harness
//!
//! High-level API the suites drive: create a container of the image under
//! test with a cid file, look up its cid/IP, poll for database readiness,
//! probe that a bad configuration refuses to start, and clean everything up
//! at the end of a test.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::engine::ContainerEngine;
use crate::error::{HarnessError, Result};
use crate::sql::{SqlFlavor, SqlQuery, SqlRunner};

/// How long to wait for the engine to write a cid file.
const CID_FILE_TIMEOUT: Duration = Duration::from_secs(10);

/// How often to poll for the cid file.
const CID_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Watch budget for a container expected to die (attempts x 2s).
const CREATION_FAIL_ATTEMPTS: u32 = 10;

/// Default budget when polling for database readiness (attempts x 2s).
const DB_READY_ATTEMPTS: u32 = 20;

/// Initialize logging for tests (call once per test run).
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// Arguments for one `run` invocation of the image under test.
#[derive(Debug, Clone, Default)]
pub struct RunSpec {
    pub name: String,
    args: Vec<String>,
    command: Vec<String>,
}

impl RunSpec {
    /// `name` keys the cid file for later cid/IP lookups.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    /// Add an `-e KEY=VALUE` environment pair.
    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.args.push("-e".to_string());
        self.args.push(format!("{key}={value}"));
        self
    }

    /// Add a raw engine argument before the image name. This is also how the
    /// configuration suite injects deliberately malformed tokens (a bare
    /// `MYSQL_USER=...` with no `-e` is parsed as an image reference).
    pub fn arg(mut self, arg: &str) -> Self {
        self.args.push(arg.to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Command passed after the image, e.g. `run-mysqld` or `mysqld-master`.
    pub fn command(mut self, command: &str) -> Self {
        self.command = command
            .split_whitespace()
            .map(str::to_string)
            .collect();
        self
    }
}

/// Full `run` argument vector for a spec. Free-standing for unit tests.
pub fn run_args(image: &str, cid_file: &std::path::Path, spec: &RunSpec) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        format!("--cidfile={}", cid_file.display()),
    ];
    args.extend(spec.args.iter().cloned());
    args.push(image.to_string());
    args.extend(spec.command.iter().cloned());
    args
}

/// Sanitized cid file name for a spec name.
pub fn cid_file_name(name: &str) -> String {
    let safe: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    format!("{safe}.cid")
}

/// Lifecycle harness for one image under test.
///
/// Containers it creates and images it builds are registered and removed by
/// [`cleanup`]; dropping without cleanup falls back to a best-effort
/// synchronous removal.
///
/// [`cleanup`]: ContainerHarness::cleanup
pub struct ContainerHarness {
    engine: ContainerEngine,
    image: String,
    sql: SqlRunner,
    cid_dir: TempDir,
    containers: Mutex<Vec<String>>,
    images: Mutex<Vec<String>>,
    cleaned: Mutex<bool>,
}

impl ContainerHarness {
    pub fn new(image: &str) -> Result<Self> {
        let engine = ContainerEngine::detect()?;
        Ok(Self {
            sql: SqlRunner::new(engine.clone(), image),
            engine,
            image: image.to_string(),
            cid_dir: TempDir::new()?,
            containers: Mutex::new(Vec::new()),
            images: Mutex::new(Vec::new()),
            cleaned: Mutex::new(false),
        })
    }

    /// Select the SQL client entrypoint used by probes.
    pub fn set_flavor(&mut self, flavor: SqlFlavor) {
        self.sql.set_flavor(flavor);
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn engine(&self) -> &ContainerEngine {
        &self.engine
    }

    /// The SQL runner bound to this image (same engine, same flavor).
    pub fn sql(&self) -> &SqlRunner {
        &self.sql
    }

    pub fn cid_file(&self, name: &str) -> PathBuf {
        self.cid_dir.path().join(cid_file_name(name))
    }

    /// Start a detached container and wait for its cid file.
    pub async fn create_container(&self, spec: &RunSpec) -> Result<String> {
        let cid_file = self.cid_file(&spec.name);
        if cid_file.exists() {
            std::fs::remove_file(&cid_file)?;
        }

        let args = run_args(&self.image, &cid_file, spec);
        let _ = self.engine.run_checked(&args).await?;

        let cid = self.wait_for_cid_file(&cid_file).await?;
        info!(name = %spec.name, cid = %cid, "container started");
        self.register_container(&cid);
        Ok(cid)
    }

    async fn wait_for_cid_file(&self, cid_file: &std::path::Path) -> Result<String> {
        let read = || -> Option<String> {
            let content = std::fs::read_to_string(cid_file).ok()?;
            let cid = content.trim().to_string();
            (!cid.is_empty()).then_some(cid)
        };

        timeout(CID_FILE_TIMEOUT, async {
            loop {
                if let Some(cid) = read() {
                    return cid;
                }
                sleep(CID_POLL_INTERVAL).await;
            }
        })
        .await
        .map_err(|_| HarnessError::CidFile(cid_file.to_path_buf()))
    }

    pub fn get_cid(&self, name: &str) -> Result<String> {
        let cid_file = self.cid_file(name);
        let content =
            std::fs::read_to_string(&cid_file).map_err(|_| HarnessError::CidFile(cid_file.clone()))?;
        let cid = content.trim().to_string();
        if cid.is_empty() {
            return Err(HarnessError::CidFile(cid_file));
        }
        Ok(cid)
    }

    pub async fn get_cip(&self, name: &str) -> Result<String> {
        let cid = self.get_cid(name)?;
        self.engine.container_ip(&cid).await
    }

    pub async fn get_cip_cid(&self, name: &str) -> Result<(String, String)> {
        let cid = self.get_cid(name)?;
        let cip = self.engine.container_ip(&cid).await?;
        Ok((cip, cid))
    }

    /// Probe that a configuration refuses to come up.
    ///
    /// Returns `true` only when the engine accepted the `run` and the
    /// container then exited non-zero within the watch budget. An engine
    /// invocation error (e.g. invalid reference format from a malformed
    /// token) or a container that stays up / exits zero returns `false`.
    pub async fn creation_fails(&self, spec: &RunSpec) -> Result<bool> {
        let cid_file = self.cid_file(&spec.name);
        if cid_file.exists() {
            std::fs::remove_file(&cid_file)?;
        }

        let args = run_args(&self.image, &cid_file, spec);
        match self.engine.run_checked(&args).await {
            Ok(_) => {}
            Err(HarnessError::CommandFailed { stderr, .. }) => {
                debug!(%stderr, "engine rejected the run invocation");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }

        let cid = self.wait_for_cid_file(&cid_file).await?;
        self.register_container(&cid);

        let mut attempt = 1;
        while self.engine.is_running(&cid).await? {
            if attempt >= CREATION_FAIL_ATTEMPTS {
                debug!(%cid, "container is still up, configuration was accepted");
                self.engine.stop(&cid).await?;
                self.engine.remove(&cid).await?;
                return Ok(false);
            }
            attempt += 1;
            sleep(Duration::from_secs(2)).await;
        }

        let exit_code = self.engine.exit_code(&cid).await?;
        self.engine.remove(&cid).await?;
        Ok(exit_code != 0)
    }

    /// Poll until the database answers the query (default `SELECT 1;`).
    ///
    /// `query.max_attempts` overrides the default budget when set above one;
    /// attempts are spaced ~2s apart.
    pub async fn test_db_connection(&self, query: &SqlQuery) -> Result<bool> {
        let attempts = if query.max_attempts > 1 {
            query.max_attempts
        } else {
            DB_READY_ATTEMPTS
        };

        for attempt in 1..=attempts {
            let output = self.sql.run_once(query).await?;
            if output.success() {
                debug!(ip = %query.ip, attempt, "database answered");
                return Ok(true);
            }
            if attempt < attempts {
                sleep(Duration::from_secs(2)).await;
            }
        }
        warn!(ip = %query.ip, attempts, "database did not become ready");
        Ok(false)
    }

    /// Register an externally created container for cleanup.
    pub fn register_container(&self, cid: &str) {
        lock(&self.containers).push(cid.to_string());
    }

    /// Register a built image for cleanup.
    pub fn register_image(&self, tag: &str) {
        lock(&self.images).push(tag.to_string());
    }

    /// Remove every container and image this harness created.
    pub async fn cleanup(&self) -> Result<()> {
        let containers: Vec<String> = lock(&self.containers).drain(..).collect();
        for cid in containers {
            debug!(%cid, "removing container");
            self.engine.remove(&cid).await?;
        }
        let images: Vec<String> = lock(&self.images).drain(..).collect();
        for tag in images {
            debug!(%tag, "removing image");
            self.engine.remove_image(&tag).await?;
        }
        *lock(&self.cleaned) = true;
        Ok(())
    }
}

impl Drop for ContainerHarness {
    fn drop(&mut self) {
        if *lock(&self.cleaned) {
            return;
        }
        // Best-effort synchronous cleanup; the async path is preferred.
        for cid in lock(&self.containers).drain(..) {
            let _ = std::process::Command::new(self.engine.binary())
                .args(["rm", "--force", "--volumes", &cid])
                .output();
        }
        for tag in lock(&self.images).drain(..) {
            let _ = std::process::Command::new(self.engine.binary())
                .args(["rmi", "--force", &tag])
                .output();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
