//! Configuration handling: required variable combinations, identifier
//! length limits, auto-calculated buffer sizes under a memory cgroup limit,
//! and the MYSQL_* tuning knobs landing in my.cnf.

mod common;

use anyhow::Result;
use test_case::test_case;

use common::*;

#[tokio::test]
async fn creation_fails_with_no_arguments() -> Result<()> {
    let Some(vars) = test_vars() else { return Ok(()) };

    let db = ContainerHarness::new(&vars.image_name)?;
    assert!(db.creation_fails(&RunSpec::new("no_arguments")).await?);
    db.cleanup().await?;
    Ok(())
}

#[test_case(&[("MYSQL_USER", "user"), ("MYSQL_DATABASE", "db")]; "user_without_password")]
#[test_case(&[("MYSQL_PASSWORD", "pass"), ("MYSQL_DATABASE", "db")]; "password_without_user")]
#[test_case(
    &[("MYSQL_USER", "user"), ("MYSQL_DATABASE", "db"), ("MYSQL_ROOT_PASSWORD", "pass")];
    "user_without_password_with_root"
)]
#[test_case(
    &[("MYSQL_PASSWORD", "pass"), ("MYSQL_DATABASE", "db"), ("MYSQL_ROOT_PASSWORD", "pass")];
    "password_without_user_with_root"
)]
#[tokio::test]
async fn invalid_combination_refuses_to_start(env: &[(&str, &str)]) -> Result<()> {
    let Some(vars) = test_vars() else { return Ok(()) };

    let db = ContainerHarness::new(&vars.image_name)?;
    let mut spec = RunSpec::new("invalid_combination");
    for (key, value) in env {
        spec = spec.env(key, value);
    }
    assert!(db.creation_fails(&spec).await?);
    db.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn invalid_configuration_matrix() -> Result<()> {
    let Some(vars) = test_vars() else { return Ok(()) };

    let db = ContainerHarness::new(&vars.image_name)?;

    // Over-long identifiers are injected as bare KEY=VALUE tokens, which the
    // engine rejects as an invalid image reference before the entrypoint
    // ever sees them; those rows therefore expect `false`.
    let long_user_token = format!("MYSQL_USER={}", vars.very_long_user_name);
    let long_db_token = format!("MYSQL_DATABASE={}", vars.very_long_db_name);

    let cases: Vec<(RunSpec, bool)> = vec![
        (
            RunSpec::new("invalid_0")
                .env("MYSQL_USER", "user")
                .env("MYSQL_PASSWORD", "pass"),
            true,
        ),
        (
            RunSpec::new("invalid_1")
                .env("MYSQL_USER", "$invalid")
                .env("MYSQL_PASSWORD", "pass")
                .env("MYSQL_DATABASE", "db")
                .env("MYSQL_ROOT_PASSWORD", "root_pass"),
            true,
        ),
        (
            RunSpec::new("invalid_2")
                .arg(&long_user_token)
                .env("MYSQL_PASSWORD", "pass")
                .env("MYSQL_DATABASE", "db")
                .env("MYSQL_ROOT_PASSWORD", "root_pass"),
            false,
        ),
        (
            RunSpec::new("invalid_3")
                .env("MYSQL_USER", "user")
                .env("MYSQL_PASSWORD", "")
                .env("MYSQL_DATABASE", "db")
                .env("MYSQL_ROOT_PASSWORD", "root_pass"),
            true,
        ),
        (
            RunSpec::new("invalid_4")
                .env("MYSQL_USER", "user")
                .env("MYSQL_PASSWORD", "pass")
                .env("MYSQL_DATABASE", "$invalid")
                .env("MYSQL_ROOT_PASSWORD", "root_pass"),
            true,
        ),
        (
            RunSpec::new("invalid_5")
                .env("MYSQL_USER", "user")
                .env("MYSQL_PASSWORD", "pass")
                .arg(&long_db_token)
                .env("MYSQL_ROOT_PASSWORD", "root_pass"),
            false,
        ),
        (
            RunSpec::new("invalid_6")
                .env("MYSQL_USER", "user")
                .env("MYSQL_PASSWORD", "pass")
                .env("MYSQL_DATABASE", "db")
                .env("MYSQL_ROOT_PASSWORD", ""),
            true,
        ),
        (
            RunSpec::new("invalid_7")
                .env("MYSQL_USER", "root")
                .env("MYSQL_PASSWORD", "pass")
                .env("MYSQL_DATABASE", "db")
                .env("MYSQL_ROOT_PASSWORD", "pass"),
            true,
        ),
    ];

    for (spec, expected) in cases {
        let name = spec.name.clone();
        assert_eq!(
            db.creation_fails(&spec).await?,
            expected,
            "unexpected outcome for case {name}"
        );
    }

    db.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn auto_calculated_settings_under_memory_limit() -> Result<()> {
    let Some(vars) = test_vars() else { return Ok(()) };

    let mut db = ContainerHarness::new(&vars.image_name)?;
    db.set_flavor(SqlFlavor::Mysql);
    let username = "config_test_user";
    let password = "config_test";

    db.create_container(
        &RunSpec::new("auto_config")
            .env("MYSQL_COLLATION", "latin2_czech_cs")
            .env("MYSQL_CHARSET", "latin2")
            .env("MYSQL_USER", username)
            .env("MYSQL_PASSWORD", password)
            .env("MYSQL_DATABASE", DB_NAME)
            .arg("--memory=256m"),
    )
    .await?;
    let (cip, cid) = db.get_cip_cid("auto_config").await?;

    assert!(
        db.test_db_connection(
            &SqlQuery::new(&cip, username, password)
                .database(DB_NAME)
                .max_attempts(10)
        )
        .await?
    );

    // Buffer sizes derived from the 256m cgroup limit.
    let configuration = db
        .engine()
        .exec_shell(&cid, "cat /etc/my.cnf /etc/my.cnf.d/*")
        .await?
        .stdout;
    assert_config_setting(&configuration, "key_buffer_size", "25M");
    assert_config_setting(&configuration, "read_buffer_size", "12M");
    assert_config_setting(&configuration, "innodb_log_file_size", "38M");
    assert_config_setting(&configuration, "innodb_log_buffer_size", "38M");

    // Charset and collation must reach newly created tables.
    db.sql()
        .run_sql(
            &SqlQuery::new(&cip, username, password)
                .database(DB_NAME)
                .sql("CREATE TABLE tbl (col VARCHAR(20));")
                .max_attempts(3),
        )
        .await?;
    let show_table = db
        .engine()
        .exec_shell(
            &cid,
            &format!("mysql -uroot -e 'SHOW CREATE TABLE tbl;' {DB_NAME}"),
        )
        .await?
        .combined();
    assert_output_contains(&show_table, "CHARSET=latin2");
    assert_output_contains(&show_table, "COLLATE=latin2_czech_cs");

    db.engine().stop(&cid).await?;
    db.cleanup().await?;
    Ok(())
}

#[tokio::test]
async fn tuning_knobs_land_in_configuration() -> Result<()> {
    let Some(vars) = test_vars() else { return Ok(()) };

    let mut db = ContainerHarness::new(&vars.image_name)?;
    db.set_flavor(SqlFlavor::Mysql);

    db.create_container(
        &RunSpec::new("options_config")
            .env("MYSQL_USER", "config_test_user")
            .env("MYSQL_PASSWORD", "config_test")
            .env("MYSQL_DATABASE", DB_NAME)
            .env("MYSQL_LOWER_CASE_TABLE_NAMES", "1")
            .env("MYSQL_LOG_QUERIES_ENABLED", "1")
            .env("MYSQL_MAX_CONNECTIONS", "1337")
            .env("MYSQL_FT_MIN_WORD_LEN", "8")
            .env("MYSQL_FT_MAX_WORD_LEN", "15")
            .env("MYSQL_MAX_ALLOWED_PACKET", "10M")
            .env("MYSQL_TABLE_OPEN_CACHE", "100")
            .env("MYSQL_SORT_BUFFER_SIZE", "256K")
            .env("MYSQL_KEY_BUFFER_SIZE", "16M")
            .env("MYSQL_READ_BUFFER_SIZE", "16M")
            .env("MYSQL_INNODB_BUFFER_POOL_SIZE", "16M")
            .env("MYSQL_INNODB_LOG_FILE_SIZE", "4M")
            .env("MYSQL_INNODB_LOG_BUFFER_SIZE", "4M")
            .env("WORKAROUND_DOCKER_BUG_14203", ""),
    )
    .await?;
    let (cip, cid) = db.get_cip_cid("options_config").await?;

    assert!(
        db.test_db_connection(
            &SqlQuery::new(&cip, "config_test_user", "config_test")
                .database(DB_NAME)
                .max_attempts(10)
        )
        .await?
    );

    let configuration = db
        .engine()
        .exec_shell(&cid, "cat /etc/my.cnf /etc/my.cnf.d/*")
        .await?
        .stdout;
    for (key, value) in [
        ("lower_case_table_names", "1"),
        ("general_log", "1"),
        ("max_connections", "1337"),
        ("ft_min_word_len", "8"),
        ("ft_max_word_len", "15"),
        ("max_allowed_packet", "10M"),
        ("table_open_cache", "100"),
        ("sort_buffer_size", "256K"),
        ("key_buffer_size", "16M"),
        ("read_buffer_size", "16M"),
        ("innodb_log_file_size", "4M"),
        ("innodb_log_buffer_size", "4M"),
    ] {
        assert_config_setting(&configuration, key, value);
    }

    db.engine().stop(&cid).await?;
    db.cleanup().await?;
    Ok(())
}
