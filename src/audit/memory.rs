// ABOUTME: In-memory AuditSource used by unit tests of the sync engine
// ABOUTME: Records every delete range so trim batches can be asserted exactly

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::source::{AuditSource, KeyRange, RowSink};
use super::{AuditRow, FieldValue};
use crate::error::SyncError;

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: BTreeMap<i64, Vec<FieldValue>>,
}

/// Ordered tables keyed by name, each holding rows keyed by `audit_pk`.
#[derive(Debug, Default)]
pub struct MemorySource {
    tables: Vec<(String, MemoryTable)>,
    /// `(table, min, max_exclusive)` for every delete issued.
    pub deletes: Vec<(String, i64, i64)>,
    /// Tables whose deletes fail.
    pub failing_deletes: Vec<String>,
    /// Rows inserted by a "concurrent writer" after each delete, per table.
    pub inserts_after_delete: Vec<(String, i64)>,
    /// Tables whose export fails as if the server went away.
    pub lost_connection_on: Vec<String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&mut self, name: &str, columns: &[&str]) {
        self.tables.push((
            name.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: BTreeMap::new(),
            },
        ));
    }

    /// Inserts generated rows whose last column is the given `audit_pk`.
    pub fn insert_rows(&mut self, name: &str, pks: impl IntoIterator<Item = i64>) {
        for pk in pks {
            let width = self.table(name).columns.len();
            let mut values: Vec<FieldValue> = (1..width)
                .map(|i| Some(format!("v{}_{}", pk, i).into_bytes()))
                .collect();
            values.push(Some(pk.to_string().into_bytes()));
            self.insert_values(name, values);
        }
    }

    pub fn insert_values(&mut self, name: &str, values: Vec<FieldValue>) {
        let pk = AuditRow::new(values.clone())
            .audit_pk()
            .expect("test row needs a numeric audit_pk");
        self.table_mut(name).rows.insert(pk, values);
    }

    pub fn pks(&self, name: &str) -> Vec<i64> {
        self.table(name).rows.keys().copied().collect()
    }

    fn table(&self, name: &str) -> &MemoryTable {
        self.find(name).expect("unknown test table")
    }

    fn table_mut(&mut self, name: &str) -> &mut MemoryTable {
        self.tables
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
            .expect("unknown test table")
    }

    fn find(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.iter().find(|(n, _)| n == name).map(|(_, t)| t)
    }

    fn missing(name: &str, operation: &'static str) -> SyncError {
        SyncError::query(name, operation, format!("Table '{}' doesn't exist", name))
    }
}

#[async_trait]
impl AuditSource for MemorySource {
    async fn list_tables(&mut self) -> Result<Vec<String>, SyncError> {
        Ok(self.tables.iter().map(|(n, _)| n.clone()).collect())
    }

    async fn scan_after(
        &mut self,
        table: &str,
        lower_bound: i64,
        sink: &mut dyn RowSink,
    ) -> Result<u64, SyncError> {
        if self.lost_connection_on.iter().any(|t| t == table) {
            return Err(SyncError::Connection {
                host: "memory".to_string(),
                source: "server has gone away".into(),
            });
        }
        let t = self
            .find(table)
            .ok_or_else(|| Self::missing(table, "exporting rows"))?;

        sink.begin(&t.columns)?;
        let mut count = 0;
        for values in t.rows.range(lower_bound.saturating_add(1)..).map(|(_, v)| v) {
            sink.write_row(&AuditRow::new(values.clone()))?;
            count += 1;
        }
        Ok(count)
    }

    async fn key_range(&mut self, table: &str) -> Result<KeyRange, SyncError> {
        let t = self
            .find(table)
            .ok_or_else(|| Self::missing(table, "reading key range"))?;
        Ok(KeyRange {
            count: t.rows.len() as u64,
            min: t.rows.keys().next().copied(),
            max: t.rows.keys().next_back().copied(),
        })
    }

    async fn delete_range(
        &mut self,
        table: &str,
        min: i64,
        max_exclusive: i64,
    ) -> Result<u64, SyncError> {
        if self.failing_deletes.iter().any(|t| t == table) {
            return Err(SyncError::query(table, "deleting rows", "lock wait timeout"));
        }
        if self.find(table).is_none() {
            return Err(Self::missing(table, "deleting rows"));
        }

        self.deletes.push((table.to_string(), min, max_exclusive));
        let rows = &mut self.table_mut(table).rows;
        let doomed: Vec<i64> = rows.range(min..max_exclusive).map(|(k, _)| *k).collect();
        for pk in &doomed {
            rows.remove(pk);
        }

        let pending: Vec<i64> = self
            .inserts_after_delete
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, pk)| *pk)
            .collect();
        self.inserts_after_delete.retain(|(t, _)| t != table);
        self.insert_rows(table, pending);

        Ok(doomed.len() as u64)
    }
}
