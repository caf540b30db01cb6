//! E2E test harness for the MariaDB container image
//!
//! This crate provides infrastructure for validating a containerized
//! MariaDB image across OS targets, versions, and deployment mechanisms:
//! direct container runtime, source-to-image builds, Helm charts, and
//! OpenShift templates.
//!
//! The harness never implements a database or a container runtime; it
//! shells out to a container engine (podman, docker as fallback) and the
//! `mysql`/`mariadb` client, polls until things are ready, and asserts on
//! captured output.
//!
//! ## Quick start
//!
//! ```ignore
//! use mariadb_container_e2e::{ContainerHarness, RunSpec, SqlQuery};
//!
//! #[tokio::test]
//! async fn my_test() -> anyhow::Result<()> {
//!     let db = ContainerHarness::new("quay.io/sclorg/mariadb-1011-c9s")?;
//!     db.create_container(
//!         &RunSpec::new("smoke")
//!             .env("MYSQL_USER", "user")
//!             .env("MYSQL_PASSWORD", "pass")
//!             .env("MYSQL_DATABASE", "db"),
//!     )
//!     .await?;
//!     let (cip, _cid) = db.get_cip_cid("smoke").await?;
//!     assert!(db.test_db_connection(&SqlQuery::new(&cip, "user", "pass")).await?);
//!     db.cleanup().await
//! }
//! ```

pub mod assertions;
pub mod config;
pub mod engine;
pub mod error;
pub mod harness;
pub mod helm;
pub mod openshift;
pub mod s2i;
pub mod sql;

pub use assertions::*;
pub use config::{check_variables, previous_version, tag_for_target, TestVars, DB_NAME};
pub use engine::{CommandOutput, ContainerEngine};
pub use error::{HarnessError, Result};
pub use harness::{cid_file_name, init_logging, run_args, ContainerHarness, RunSpec};
pub use helm::HelmChart;
pub use openshift::OpenShiftCli;
pub use s2i::build_app_image;
pub use sql::{client_args, SqlFlavor, SqlQuery, SqlRunner};
