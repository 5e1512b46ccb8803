// ABOUTME: Shrinks an exported audit table with small, spaced-out delete batches
// ABOUTME: Always keeps the newest row so concurrent writers are never disturbed

use std::time::Duration;

use super::source::{AuditSource, KeyRange};
use crate::error::SyncError;

/// Rows deleted per batch unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: u64 = 100;

/// Pause between batches unless configured otherwise.
pub const DEFAULT_PAUSE: Duration = Duration::from_secs(1);

/// Half-open `audit_pk` range removed by one delete statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimBatch {
    pub min_pk: i64,
    pub max_pk_exclusive: i64,
}

impl TrimBatch {
    /// Computes the next batch for `range`, or `None` once at most one row
    /// remains.
    ///
    /// The upper bound is capped at the table's current maximum, which is
    /// therefore never inside a batch.
    pub fn plan(range: &KeyRange, batch_size: u64) -> Option<Self> {
        if range.count <= 1 {
            return None;
        }
        let (min, max) = (range.min?, range.max?);
        if min >= max {
            return None;
        }

        let step = i64::try_from(batch_size).unwrap_or(i64::MAX);
        Some(Self {
            min_pk: min,
            max_pk_exclusive: min.saturating_add(step).min(max),
        })
    }
}

/// Totals for one trim pass over a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrimStats {
    pub batches: u64,
    pub rows_deleted: u64,
}

/// Deletes already-exported rows in bounded batches.
///
/// Each batch only removes keys strictly below the maximum observed just
/// before it. The range is re-read every iteration, so rows inserted by other
/// sessions in between are never touched.
#[derive(Debug, Clone, Copy)]
pub struct TableTrimmer {
    batch_size: u64,
    pause: Duration,
}

impl Default for TableTrimmer {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE, DEFAULT_PAUSE)
    }
}

impl TableTrimmer {
    pub fn new(batch_size: u64, pause: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            pause,
        }
    }

    /// Deletes all but the newest row of `table`.
    ///
    /// A failing batch ends the pass with an error; batches already deleted
    /// stay deleted, which is safe because their rows are in the export file.
    pub async fn trim<S: AuditSource + ?Sized>(
        &self,
        source: &mut S,
        table: &str,
    ) -> Result<TrimStats, SyncError> {
        tracing::info!("Wiping audit table: {}", table);
        let mut stats = TrimStats::default();

        loop {
            if stats.batches > 0 && !self.pause.is_zero() {
                tokio::time::sleep(self.pause).await;
            }

            let range = source.key_range(table).await?;
            let Some(batch) = TrimBatch::plan(&range, self.batch_size) else {
                tracing::debug!(
                    "Stopping wipe of {}: {} row(s) left (max audit_pk {:?})",
                    table,
                    range.count,
                    range.max
                );
                break;
            };

            tracing::info!(
                "Wiping audit table rows {} to {}",
                batch.min_pk,
                batch.max_pk_exclusive
            );
            let deleted = source
                .delete_range(table, batch.min_pk, batch.max_pk_exclusive)
                .await?;
            stats.batches += 1;
            stats.rows_deleted += deleted;

            if deleted == 0 {
                tracing::warn!(
                    "Delete of audit_pk {}..{} on {} removed no rows, stopping wipe",
                    batch.min_pk,
                    batch.max_pk_exclusive,
                    table
                );
                break;
            }
        }

        Ok(stats)
    }
}
