// ABOUTME: Utility functions for SQL identifiers and retry handling
// ABOUTME: Provides MySQL identifier quoting, display sanitizing and backoff retries

use std::future::Future;
use std::time::Duration;

/// Retry an async operation with exponential backoff
///
/// Runs `operation` once, then up to `max_retries` more times, doubling the
/// delay before each retry.
///
/// # Returns
///
/// Returns the successful result or the last error after all retries exhausted.
///
/// # Examples
///
/// ```no_run
/// # use std::time::Duration;
/// # use cdc_audit_sync::utils::retry_with_backoff;
/// # async fn example() -> Result<(), std::io::Error> {
/// let result = retry_with_backoff(
///     || async { Ok::<_, std::io::Error>("success") },
///     3,  // Retry up to 3 times
///     Duration::from_secs(1)  // Start with 1s delay
/// ).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_with_backoff<F, Fut, T, E>(
    mut operation: F,
    max_retries: u32,
    initial_delay: Duration,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = initial_delay;
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if attempt < max_retries => {
                attempt += 1;
                tracing::warn!(
                    "Operation failed (attempt {}/{}): {}. Retrying in {:?}...",
                    attempt,
                    max_retries + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                delay *= 2; // Exponential backoff
            }
            Err(e) => return Err(e),
        }
    }
}

/// Sanitize an identifier (table name, database name) for display
///
/// Removes control characters and limits length to prevent log injection and
/// keep messages readable.
///
/// **Note**: This is for display purposes only. Use [`quote_mysql_ident`] when
/// building SQL.
///
/// # Examples
///
/// ```
/// # use cdc_audit_sync::utils::sanitize_identifier;
/// assert_eq!(sanitize_identifier("orders_audit"), "orders_audit");
/// assert_eq!(sanitize_identifier("orders\n_audit"), "orders_audit");
/// ```
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| !c.is_control())
        .take(100)
        .collect()
}

/// Quote a MySQL identifier (database, table, column)
///
/// MySQL uses backticks for identifier quoting. Escapes embedded backticks
/// by doubling them.
///
/// # Examples
///
/// ```
/// use cdc_audit_sync::utils::quote_mysql_ident;
/// assert_eq!(quote_mysql_ident("users"), "`users`");
/// assert_eq!(quote_mysql_ident("user`name"), "`user``name`");
/// ```
pub fn quote_mysql_ident(identifier: &str) -> String {
    let mut quoted = String::with_capacity(identifier.len() + 2);
    quoted.push('`');
    for ch in identifier.chars() {
        if ch == '`' {
            quoted.push('`');
        }
        quoted.push(ch);
    }
    quoted.push('`');
    quoted
}
