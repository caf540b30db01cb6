use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the harness collaborators (engine, SQL client, oc/helm)
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("no container engine found on PATH (tried podman, docker)")]
    EngineNotFound,

    #[error("required binary `{0}` not found on PATH")]
    BinaryNotFound(String),

    #[error("`{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("cid file {0:?} missing or empty")]
    CidFile(PathBuf),

    #[error("container {0} has no IP address")]
    NoContainerIp(String),

    #[error("timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: u32 },

    #[error("required environment variable {0} is not set")]
    MissingVariable(&'static str),

    #[error("unknown target OS: {0}")]
    UnknownTarget(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HarnessError>;
