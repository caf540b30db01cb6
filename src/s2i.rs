//! Source-to-image builds
//!
//! The basics suite validates the image as an s2i builder. Instead of
//! shelling out to the `s2i` binary, the build is emulated the way
//! `s2i build --as-dockerfile` would: copy the application source into a
//! build context, generate a Dockerfile that runs the image's assemble
//! script, and hand it to the engine.

use std::path::Path;

use tempfile::TempDir;
use tracing::info;

use crate::engine::ContainerEngine;
use crate::error::Result;
use crate::harness::ContainerHarness;

/// Dockerfile equivalent to what `s2i build --as-dockerfile` generates for
/// a builder image with the standard s2i script locations.
pub fn dockerfile_for(src_image: &str) -> String {
    format!(
        "FROM {src_image}\n\
         LABEL io.openshift.s2i.build.image=\"{src_image}\" \\\n\
         \x20     io.openshift.s2i.build.source-location=\".\"\n\
         USER root\n\
         COPY upload/src/ /tmp/src/\n\
         RUN chown -R 1001:0 /tmp/src\n\
         USER 1001\n\
         RUN /usr/libexec/s2i/assemble\n\
         CMD [\"/usr/libexec/s2i/run\"]\n"
    )
}

/// Recursive copy of an application directory into the build context.
pub fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            let _ = std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Build `dst_image` from `src_image` plus an s2i application directory and
/// return a lifecycle harness for the result. The built image is registered
/// on the harness and removed by its cleanup.
pub async fn build_app_image(
    engine: &ContainerEngine,
    app_path: &Path,
    src_image: &str,
    dst_image: &str,
) -> Result<ContainerHarness> {
    let context = TempDir::new()?;
    copy_dir_recursive(app_path, &context.path().join("upload").join("src"))?;
    std::fs::write(context.path().join("Dockerfile"), dockerfile_for(src_image))?;

    info!(%src_image, %dst_image, "building s2i application image");
    engine.build(context.path(), dst_image).await?;

    let harness = ContainerHarness::new(dst_image)?;
    harness.register_image(dst_image);
    Ok(harness)
}
