//! Container engine CLI wrapper
//!
//! Thin process-invocation layer over podman (docker as a fallback). Every
//! helper captures stdout/stderr and the exit status; nothing here knows
//! about MariaDB.

use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::error::{HarnessError, Result};

/// Captured result of a single engine invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code, if the process exited normally.
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// stdout and stderr concatenated. The mysql client reports access
    /// errors on stderr, and the suites scrape both streams together.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Run any binary with captured output. The engine, `oc` and `helm`
/// wrappers all sit on top of this.
pub async fn capture<S: AsRef<str>>(program: &Path, args: &[S]) -> Result<CommandOutput> {
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    debug!(program = %program.display(), ?args, "running command");

    let output = Command::new(program)
        .args(&args)
        .kill_on_drop(true)
        .output()
        .await?;

    Ok(CommandOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Like [`capture`] but fails on a non-zero exit status.
pub async fn capture_checked<S: AsRef<str>>(program: &Path, args: &[S]) -> Result<CommandOutput> {
    let output = capture(program, args).await?;
    if output.success() {
        return Ok(output);
    }
    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    Err(HarnessError::CommandFailed {
        command: format!("{} {}", program.display(), args.join(" ")),
        status: output.status.unwrap_or(-1),
        stderr: output.stderr.trim().to_string(),
    })
}

/// Like [`capture_checked`] but feeds `stdin` to the process. Used to pipe
/// processed OpenShift templates into `oc apply -f -`.
pub async fn capture_with_stdin<S: AsRef<str>>(
    program: &Path,
    args: &[S],
    stdin: &str,
) -> Result<CommandOutput> {
    use std::process::Stdio;
    use tokio::io::AsyncWriteExt;

    let args: Vec<&str> = args.iter().map(AsRef::as_ref).collect();
    debug!(program = %program.display(), ?args, "running command with stdin");

    let mut child = Command::new(program)
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    if let Some(mut handle) = child.stdin.take() {
        handle.write_all(stdin.as_bytes()).await?;
    }

    let output = child.wait_with_output().await?;
    let captured = CommandOutput {
        status: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    if captured.success() {
        return Ok(captured);
    }
    Err(HarnessError::CommandFailed {
        command: format!("{} {}", program.display(), args.join(" ")),
        status: captured.status.unwrap_or(-1),
        stderr: captured.stderr.trim().to_string(),
    })
}

/// Handle to the container engine binary.
#[derive(Debug, Clone)]
pub struct ContainerEngine {
    binary: PathBuf,
}

impl ContainerEngine {
    /// Locate the engine binary.
    ///
    /// `CONTAINER_ENGINE` overrides discovery (either a name on PATH or an
    /// absolute path); otherwise podman is preferred, then docker.
    pub fn detect() -> Result<Self> {
        if let Ok(name) = std::env::var("CONTAINER_ENGINE") {
            let path = PathBuf::from(&name);
            if path.is_absolute() && path.exists() {
                return Ok(Self { binary: path });
            }
            return which::which(&name)
                .map(|binary| Self { binary })
                .map_err(|_| HarnessError::BinaryNotFound(name));
        }

        for candidate in ["podman", "docker"] {
            if let Ok(binary) = which::which(candidate) {
                return Ok(Self { binary });
            }
        }
        Err(HarnessError::EngineNotFound)
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Run an engine subcommand, capturing output. The exit status is not
    /// checked; callers that want a hard failure use [`run_checked`].
    ///
    /// [`run_checked`]: ContainerEngine::run_checked
    pub async fn run<S: AsRef<str>>(&self, args: &[S]) -> Result<CommandOutput> {
        capture(&self.binary, args).await
    }

    /// Run an engine subcommand and fail on a non-zero exit status, carrying
    /// the captured stderr in the error.
    pub async fn run_checked<S: AsRef<str>>(&self, args: &[S]) -> Result<CommandOutput> {
        capture_checked(&self.binary, args).await
    }

    /// Full log output of a container, both streams. mysqld writes its
    /// startup chatter to stderr.
    pub async fn logs(&self, cid: &str) -> Result<String> {
        let output = self.run(&["logs", cid]).await?;
        Ok(output.combined())
    }

    /// Run a shell command inside a running container.
    pub async fn exec_shell(&self, cid: &str, cmd: &str) -> Result<CommandOutput> {
        self.run(&["exec", cid, "bash", "-c", cmd]).await
    }

    /// Read a file from inside a running container.
    pub async fn file_content(&self, cid: &str, path: &str) -> Result<String> {
        let output = self
            .run_checked(&["exec", cid, "cat", path])
            .await?;
        Ok(output.stdout)
    }

    /// IP address of a running container on the default network.
    pub async fn container_ip(&self, cid: &str) -> Result<String> {
        let output = self
            .run_checked(&[
                "inspect",
                "--format",
                "{{.NetworkSettings.IPAddress}}",
                cid,
            ])
            .await?;
        let ip = output.stdout.trim().to_string();
        if ip.is_empty() {
            return Err(HarnessError::NoContainerIp(cid.to_string()));
        }
        Ok(ip)
    }

    pub async fn is_running(&self, cid: &str) -> Result<bool> {
        let output = self
            .run_checked(&["inspect", "--format", "{{.State.Running}}", cid])
            .await?;
        Ok(output.stdout.trim() == "true")
    }

    pub async fn exit_code(&self, cid: &str) -> Result<i32> {
        let output = self
            .run_checked(&["inspect", "--format", "{{.State.ExitCode}}", cid])
            .await?;
        output
            .stdout
            .trim()
            .parse()
            .map_err(|_| HarnessError::CommandFailed {
                command: format!("inspect {cid}"),
                status: 0,
                stderr: format!("unparseable exit code: {}", output.stdout.trim()),
            })
    }

    pub async fn stop(&self, cid: &str) -> Result<()> {
        let _ = self.run_checked(&["stop", cid]).await?;
        Ok(())
    }

    /// Force-remove a container. Best effort; removal of an already-gone
    /// container is not an error.
    pub async fn remove(&self, cid: &str) -> Result<()> {
        let _ = self.run(&["rm", "--force", "--volumes", cid]).await?;
        Ok(())
    }

    /// Remove a built image, best effort.
    pub async fn remove_image(&self, image: &str) -> Result<()> {
        let _ = self.run(&["rmi", "--force", image]).await?;
        Ok(())
    }

    /// Build an image from a context directory.
    pub async fn build(&self, context: &Path, tag: &str) -> Result<()> {
        let context = context.to_string_lossy().into_owned();
        let _ = self
            .run_checked(&["build", "--tag", tag, context.as_str()])
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_joins_streams_with_newline() {
        let output = CommandOutput {
            status: Some(1),
            stdout: "row1".to_string(),
            stderr: "ERROR 1045 (28000): Access denied for user 'user'@'host'".to_string(),
        };
        let combined = output.combined();
        assert!(combined.starts_with("row1\n"));
        assert!(combined.contains("Access denied for user 'user'@"));
        assert!(!output.success());
    }

    #[test]
    fn combined_without_stderr_is_stdout() {
        let output = CommandOutput {
            status: Some(0),
            stdout: "a\nb\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(output.combined(), "a\nb\n");
        assert!(output.success());
    }
}
