// ABOUTME: Database-facing interface needed by the export and trim engine
// ABOUTME: Implemented for MySQL and by an in-memory source in tests

use async_trait::async_trait;

use super::AuditRow;
use crate::error::SyncError;

/// Receives a streamed result set: column names once, then rows in order.
pub trait RowSink: Send {
    fn begin(&mut self, columns: &[String]) -> Result<(), SyncError>;

    fn write_row(&mut self, row: &AuditRow) -> Result<(), SyncError>;
}

/// `{count, min, max}` of `audit_pk` over a whole table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyRange {
    pub count: u64,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// Source of audit rows.
///
/// Callers must not assume exclusive access: other sessions keep inserting
/// while these methods run.
#[async_trait]
pub trait AuditSource: Send {
    /// All table names in the target schema, in server order.
    async fn list_tables(&mut self) -> Result<Vec<String>, SyncError>;

    /// Streams every row with `audit_pk > lower_bound`, ascending by
    /// `audit_pk`, into `sink`. Returns the number of rows delivered.
    async fn scan_after(
        &mut self,
        table: &str,
        lower_bound: i64,
        sink: &mut dyn RowSink,
    ) -> Result<u64, SyncError>;

    async fn key_range(&mut self, table: &str) -> Result<KeyRange, SyncError>;

    /// Deletes rows with `min <= audit_pk < max_exclusive`. Returns rows deleted.
    async fn delete_range(
        &mut self,
        table: &str,
        min: i64,
        max_exclusive: i64,
    ) -> Result<u64, SyncError>;
}
