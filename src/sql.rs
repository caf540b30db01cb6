//! SQL client wrapper
//!
//! Runs the `mysql`/`mariadb` client in a throwaway container of the image
//! under test, pointed at a running container's IP. Output from both streams
//! is returned so suites can scrape `Access denied for user ...` messages.

use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

use crate::engine::ContainerEngine;
use crate::error::{HarnessError, Result};

/// Which client entrypoint to invoke inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlFlavor {
    MariaDb,
    Mysql,
}

impl SqlFlavor {
    pub fn client(self) -> &'static str {
        match self {
            SqlFlavor::MariaDb => "mariadb",
            SqlFlavor::Mysql => "mysql",
        }
    }
}

/// A single client invocation against a container IP.
#[derive(Debug, Clone)]
pub struct SqlQuery {
    pub ip: String,
    pub user: String,
    pub password: String,
    pub database: Option<String>,
    pub sql: Option<String>,
    pub options: Vec<String>,
    pub ignore_error: bool,
    pub max_attempts: u32,
}

impl SqlQuery {
    pub fn new(ip: &str, user: &str, password: &str) -> Self {
        Self {
            ip: ip.to_string(),
            user: user.to_string(),
            password: password.to_string(),
            database: None,
            sql: None,
            options: Vec::new(),
            ignore_error: false,
            max_attempts: 1,
        }
    }

    pub fn database(mut self, database: &str) -> Self {
        self.database = Some(database.to_string());
        self
    }

    pub fn sql(mut self, sql: &str) -> Self {
        self.sql = Some(sql.to_string());
        self
    }

    /// Extra client option, e.g. the TLS verification switch on 11.8.
    pub fn option(mut self, option: &str) -> Self {
        self.options.push(option.to_string());
        self
    }

    /// Return the captured output even when the client exits non-zero.
    pub fn ignore_error(mut self) -> Self {
        self.ignore_error = true;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }
}

/// Builds the full engine argument vector for a query. Kept free-standing so
/// the construction is unit-testable without an engine.
pub fn client_args(image: &str, flavor: SqlFlavor, query: &SqlQuery) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "--rm".to_string(),
        image.to_string(),
        flavor.client().to_string(),
        "--host".to_string(),
        query.ip.clone(),
        "-u".to_string(),
        query.user.clone(),
        format!("-p{}", query.password),
    ];
    for option in &query.options {
        args.push(option.clone());
    }
    args.push("-e".to_string());
    args.push(
        query
            .sql
            .clone()
            .unwrap_or_else(|| "SELECT 1;".to_string()),
    );
    if let Some(database) = &query.database {
        args.push(database.clone());
    }
    args
}

/// One-shot SQL execution against a container under test.
#[derive(Debug, Clone)]
pub struct SqlRunner {
    engine: ContainerEngine,
    image: String,
    flavor: SqlFlavor,
}

impl SqlRunner {
    pub fn new(engine: ContainerEngine, image: &str) -> Self {
        Self {
            engine,
            image: image.to_string(),
            flavor: SqlFlavor::MariaDb,
        }
    }

    pub fn with_flavor(mut self, flavor: SqlFlavor) -> Self {
        self.flavor = flavor;
        self
    }

    pub fn set_flavor(&mut self, flavor: SqlFlavor) {
        self.flavor = flavor;
    }

    /// Single client invocation, no retries, raw captured output.
    pub async fn run_once(&self, query: &SqlQuery) -> Result<crate::engine::CommandOutput> {
        let args = client_args(&self.image, self.flavor, query);
        self.engine.run(&args).await
    }

    /// Run a query, retrying with ~2s spacing until the client exits zero or
    /// attempts run out. With `ignore_error` the first captured output is
    /// returned regardless of status.
    pub async fn run_sql(&self, query: &SqlQuery) -> Result<String> {
        let mut last = String::new();

        for attempt in 1..=query.max_attempts {
            let output = self.run_once(query).await?;
            last = output.combined();
            if output.success() || query.ignore_error {
                return Ok(last);
            }
            debug!(attempt, ip = %query.ip, user = %query.user, "sql attempt failed");
            if attempt < query.max_attempts {
                sleep(Duration::from_secs(2)).await;
            }
        }

        if query.max_attempts == 1 {
            // Single-attempt callers inspect the output themselves.
            return Ok(last);
        }
        Err(HarnessError::Timeout {
            what: format!("sql query against {}", query.ip),
            attempts: query.max_attempts,
        })
    }

    /// Whether a login with these credentials succeeds, single attempt.
    pub async fn login_ok(&self, ip: &str, user: &str, password: &str) -> Result<bool> {
        let output = self.run_once(&SqlQuery::new(ip, user, password)).await?;
        Ok(output.success())
    }

    /// Compare a login attempt against an expectation; mirrors the truth
    /// tables the general suite walks through.
    pub async fn assert_login_access(
        &self,
        ip: &str,
        user: &str,
        password: &str,
        expected_success: bool,
    ) -> Result<bool> {
        let ok = self.login_ok(ip, user, password).await?;
        if ok != expected_success {
            debug!(
                user,
                password, expected_success, "login access did not match expectation"
            );
        }
        Ok(ok == expected_success)
    }

    /// Whether the local Unix-socket login inside the container works.
    pub async fn local_access_ok(&self, cid: &str) -> Result<bool> {
        let cmd = format!("{} <<< 'SELECT 1;'", self.flavor.client());
        Ok(self.engine.exec_shell(cid, &cmd).await?.success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_query_args() {
        let query = SqlQuery::new("172.17.0.2", "user", "pass");
        let args = client_args("image:latest", SqlFlavor::Mysql, &query);
        assert_eq!(
            args,
            vec![
                "run", "--rm", "image:latest", "mysql", "--host", "172.17.0.2", "-u", "user",
                "-ppass", "-e", "SELECT 1;"
            ]
        );
    }

    #[test]
    fn query_with_database_and_options() {
        let query = SqlQuery::new("10.0.0.5", "root", "r00t")
            .database("db")
            .sql("SHOW SLAVE HOSTS;")
            .option("--disable-ssl-verify-server-cert");
        let args = client_args("img", SqlFlavor::MariaDb, &query);

        assert_eq!(args[3], "mariadb");
        assert!(args.contains(&"--disable-ssl-verify-server-cert".to_string()));
        let e = args.iter().position(|a| a == "-e").unwrap();
        assert_eq!(args[e + 1], "SHOW SLAVE HOSTS;");
        assert_eq!(args.last().unwrap(), "db");
    }

    #[test]
    fn empty_password_still_passes_flag() {
        let query = SqlQuery::new("ip", "root", "");
        let args = client_args("img", SqlFlavor::Mysql, &query);
        assert!(args.contains(&"-p".to_string()));
    }

    #[test]
    fn max_attempts_is_at_least_one() {
        let query = SqlQuery::new("ip", "u", "p").max_attempts(0);
        assert_eq!(query.max_attempts, 1);
    }
}
