// ABOUTME: Error kinds raised while syncing audit tables
// ABOUTME: Separates run-fatal failures from failures scoped to a single table

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed error from a database driver or test source.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the sync engine and its collaborators.
///
/// `Connection` and `Directory` abort the whole run. Every other kind is
/// caught at the per-table boundary by the engine.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("MySQL connection to {host} failed")]
    Connection {
        host: String,
        #[source]
        source: BoxError,
    },

    #[error("cannot create output directory {}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to open {} for {action}", path.display())]
    FileIo {
        path: PathBuf,
        action: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("query failed on table `{table}` while {operation}")]
    Query {
        table: String,
        operation: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("failed writing export rows to {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

impl SyncError {
    pub fn query(table: &str, operation: &'static str, source: impl Into<BoxError>) -> Self {
        SyncError::Query {
            table: table.to_string(),
            operation,
            source: source.into(),
        }
    }

    /// Whether this error must stop the run rather than just the current table.
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Connection { .. } | SyncError::Directory { .. }
        )
    }
}
