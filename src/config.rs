//! Test-matrix configuration
//!
//! The suites are parameterized over an environment-driven tuple:
//! `IMAGE_NAME` (image under test), `VERSION` (MariaDB version stream) and
//! `TARGET` (OS target). Everything else is derived from those three.

use std::env;
use std::path::PathBuf;

use crate::error::{HarnessError, Result};

/// Database the suites create and query.
pub const DB_NAME: &str = "db";

/// Image tag suffix for an OS target.
pub fn tag_for_target(target: &str) -> Option<&'static str> {
    match target {
        "rhel8" => Some("-el8"),
        "rhel9" => Some("-el9"),
        "rhel10" => Some("-el10"),
        _ => None,
    }
}

/// Previous major version stream, for upgrade tests.
pub fn previous_version(version: &str) -> Option<&'static str> {
    match version {
        "10.3" => Some("10.2"),
        "10.5" => Some("10.3"),
        "10.11" => Some("10.5"),
        "11.8" => Some("10.11"),
        _ => None,
    }
}

/// MariaDB 11.3+ enforces stricter TLS verification (certificate and
/// hostname checks), so the client needs this option on 11.8.
/// https://mariadb.org/mission-impossible-zero-configuration-ssl/
pub const SSL_VERIFY_OPTION: &str = "--disable-ssl-verify-server-cert";

/// The resolved test matrix entry for this run.
#[derive(Debug, Clone)]
pub struct TestVars {
    pub image_name: String,
    pub version: String,
    pub target: String,
    pub tag: String,
    pub previous_version: Option<String>,
    pub test_app: PathBuf,
    pub very_long_db_name: String,
    pub very_long_user_name: String,
}

impl TestVars {
    /// Resolve the matrix entry from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve from an arbitrary lookup. Unit tests inject a map here so
    /// they never mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let image_name = lookup("IMAGE_NAME")
            .filter(|v| !v.is_empty())
            .ok_or(HarnessError::MissingVariable("IMAGE_NAME"))?;
        let version = lookup("VERSION")
            .filter(|v| !v.is_empty())
            .ok_or(HarnessError::MissingVariable("VERSION"))?;
        let target = lookup("TARGET")
            .filter(|v| !v.is_empty())
            .ok_or(HarnessError::MissingVariable("TARGET"))?
            .to_lowercase();

        let tag = tag_for_target(&target)
            .ok_or_else(|| HarnessError::UnknownTarget(target.clone()))?
            .to_string();

        Ok(Self {
            image_name,
            previous_version: previous_version(&version).map(str::to_string),
            version,
            target,
            tag,
            test_app: test_app_dir(),
            very_long_db_name: format!("very_long_database_name_{}", "x".repeat(20)),
            very_long_user_name: format!("very_long_user_name_{}", "x".repeat(20)),
        })
    }

    /// Client options required for this version, if any.
    pub fn ssl_option(&self) -> Option<&'static str> {
        if self.version == "11.8" {
            Some(SSL_VERIFY_OPTION)
        } else {
            None
        }
    }

    /// Whether this version stream is published yet. Template and chart
    /// scenarios bail out for unreleased streams.
    pub fn is_released(&self) -> bool {
        self.version != "11.8"
    }
}

/// Check that the required variables are present, without resolving the
/// full tuple.
pub fn check_variables() -> bool {
    ["IMAGE_NAME", "VERSION", "TARGET"]
        .iter()
        .all(|name| env::var(name).map(|v| !v.is_empty()).unwrap_or(false))
}

fn test_app_dir() -> PathBuf {
    let manifest_dir = env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(manifest_dir)
        .join("tests")
        .join("fixtures")
        .join("test-app")
}
