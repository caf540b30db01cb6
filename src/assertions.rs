//! Output assertions for the suites
//!
//! Everything the tests scrape is a string: container logs, SQL client
//! output, `my.cnf` contents read out of a running container.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::{sleep, timeout};

use anyhow::Result;

static ACCESS_DENIED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Access denied for user '([^']+)'@").unwrap());

/// The user named in a client `Access denied` error, if present.
pub fn access_denied_user(output: &str) -> Option<&str> {
    ACCESS_DENIED
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Assert that command output contains a substring.
pub fn assert_output_contains(output: &str, needle: &str) {
    assert!(
        output.contains(needle),
        "Expected output to contain {:?}, got:\n{}",
        needle,
        output
    );
}

/// Assert that command output does NOT contain a substring.
pub fn assert_output_not_contains(output: &str, needle: &str) {
    assert!(
        !output.contains(needle),
        "Expected output NOT to contain {:?}, got:\n{}",
        needle,
        output
    );
}

/// Whether the output matches a regex (multi-line mode).
pub fn output_matches(output: &str, pattern: &str) -> bool {
    Regex::new(&format!("(?m){pattern}"))
        .map(|re| re.is_match(output))
        .unwrap_or(false)
}

/// Assert that command output matches a regex.
pub fn assert_output_matches(output: &str, pattern: &str) {
    assert!(
        output_matches(output, pattern),
        "Expected output to match /{}/, got:\n{}",
        pattern,
        output
    );
}

/// Whether a `key = value` setting appears in mysqld configuration text
/// (the concatenated `/etc/my.cnf` + `/etc/my.cnf.d/*`). Keys are matched
/// case-insensitively; whitespace around `=` is free-form.
pub fn config_has_setting(config: &str, key: &str, value: &str) -> bool {
    let pattern = format!(
        r"(?mi)^\s*{}\s*=\s*{}\s*$",
        regex::escape(key),
        regex::escape(value)
    );
    Regex::new(&pattern)
        .map(|re| re.is_match(config))
        .unwrap_or(false)
}

/// Assert a mysqld setting is present in configuration text.
pub fn assert_config_setting(config: &str, key: &str, value: &str) {
    assert!(
        config_has_setting(config, key, value),
        "Expected setting {} = {} in configuration:\n{}",
        key,
        value,
        config
    );
}

/// Unique name with a prefix, for containers, databases and projects.
pub fn random_name(prefix: &str) -> String {
    format!("{}-{}", prefix, &uuid::Uuid::new_v4().simple().to_string()[..8])
}

/// Retry an assertion until it succeeds or times out.
///
/// Useful for eventual consistency, e.g. waiting for a replica to catch up.
pub async fn assert_eventually<F, Fut, E>(f: F, timeout_duration: Duration) -> Result<()>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<(), E>>,
    E: std::fmt::Debug,
{
    retry_until_ok(f, timeout_duration).await
}

/// Retry a fallible async operation until it succeeds or times out, polling
/// every 500ms.
pub async fn retry_until_ok<F, Fut, T, E>(f: F, timeout_duration: Duration) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Debug,
{
    let poll_interval = Duration::from_millis(500);
    let mut last_error = None;

    timeout(timeout_duration, async {
        loop {
            match f().await {
                Ok(v) => return Ok::<_, anyhow::Error>(v),
                Err(e) => {
                    last_error = Some(format!("{:?}", e));
                    sleep(poll_interval).await;
                }
            }
        }
    })
    .await
    .map_err(|_| {
        anyhow::anyhow!(
            "Operation did not succeed within {:?}. Last error: {:?}",
            timeout_duration,
            last_error
        )
    })?
}
