// ABOUTME: Resumable export and bounded trim of trigger-populated audit tables
// ABOUTME: Shared row and resume-point types plus the per-component modules

pub mod engine;
pub mod exporter;
pub mod resume;
pub mod source;
pub mod trimmer;

#[cfg(test)]
pub(crate) mod memory;

pub use engine::{SyncEngine, SyncStats};
pub use exporter::RowExporter;
pub use resume::ResumeLocator;
pub use source::{AuditSource, KeyRange, RowSink};
pub use trimmer::{TableTrimmer, TrimBatch, TrimStats};

/// Name of the key column every audit table carries as its last column.
pub const AUDIT_PK_COLUMN: &str = "audit_pk";

/// Last exported record must have at least this many fields to be trusted.
pub const MIN_DATA_FIELDS: usize = 6;

/// One field value: `None` is SQL NULL, written as an empty CSV field.
pub type FieldValue = Option<Vec<u8>>;

/// One row read from an audit table, with `audit_pk` as the trailing value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRow {
    values: Vec<FieldValue>,
}

impl AuditRow {
    pub fn new(values: Vec<FieldValue>) -> Self {
        Self { values }
    }

    /// Fields as written to CSV: NULL becomes the empty string.
    pub fn csv_fields(&self) -> impl Iterator<Item = &[u8]> {
        self.values
            .iter()
            .map(|v| v.as_deref().unwrap_or_default())
    }

    /// The trailing `audit_pk` value, when it parses as an integer.
    pub fn audit_pk(&self) -> Option<i64> {
        let last = self.values.last()?.as_ref()?;
        std::str::from_utf8(last).ok()?.trim().parse().ok()
    }
}

/// Where the next export for a table starts.
///
/// Derived from the export file on every run and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    /// No usable prior export: create the file and write a header.
    Fresh,
    /// Rows up to and including this `audit_pk` are already in the file.
    After(u64),
}

impl ResumePoint {
    /// Numeric sentinel for "no prior export", below every valid `audit_pk`.
    pub const NONE_SENTINEL: i64 = -1;

    /// Exclusive lower bound for the export query.
    pub fn lower_bound(&self) -> i64 {
        match self {
            ResumePoint::Fresh => Self::NONE_SENTINEL,
            ResumePoint::After(pk) => i64::try_from(*pk).unwrap_or(i64::MAX),
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, ResumePoint::Fresh)
    }
}

impl std::fmt::Display for ResumePoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.lower_bound())
    }
}
