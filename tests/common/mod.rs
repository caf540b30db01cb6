//! Shared helpers for the integration suites.

#![allow(dead_code)]

use std::path::Path;

use anyhow::Result;

pub use mariadb_container_e2e::*;

/// Resolve the test matrix entry, or log and skip when the environment does
/// not carry one. Suites that need a real image start with:
///
/// ```ignore
/// let Some(vars) = common::test_vars() else { return Ok(()) };
/// ```
pub fn test_vars() -> Option<TestVars> {
    init_logging();
    match TestVars::from_env() {
        Ok(vars) => Some(vars),
        Err(e) => {
            tracing::warn!("skipping: test image not configured ({e})");
            None
        }
    }
}

/// Build the s2i test application on top of the image under test and return
/// a harness for the result.
pub async fn build_s2i_app(vars: &TestVars) -> Result<ContainerHarness> {
    let engine = ContainerEngine::detect()?;
    let dst_image = format!("{}-testapp", vars.image_name);
    let harness = build_app_image(&engine, &vars.test_app, &vars.image_name, &dst_image).await?;
    Ok(harness)
}

/// Open up a host directory that will be bind-mounted as the datadir, so the
/// mysql user inside the container can write to it.
pub fn make_world_writable(dir: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777))?;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            make_world_writable(&entry.path())?;
        } else {
            std::fs::set_permissions(entry.path(), std::fs::Permissions::from_mode(0o666))?;
        }
    }
    Ok(())
}

/// `dir:/var/lib/mysql/data:Z` volume argument for a datadir mount.
pub fn datadir_volume(dir: &Path) -> String {
    format!("-v={}:/var/lib/mysql/data:Z", dir.display())
}
