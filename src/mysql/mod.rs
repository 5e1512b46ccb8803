// ABOUTME: MySQL implementation of AuditSource built on mysql_async
// ABOUTME: Connects with retry, streams audit rows and runs bounded deletes

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, Value};
use std::time::Duration;

use crate::audit::source::{AuditSource, KeyRange, RowSink};
use crate::audit::{AuditRow, FieldValue, AUDIT_PK_COLUMN};
use crate::config::ConnectionSettings;
use crate::error::SyncError;
use crate::utils::{quote_mysql_ident, retry_with_backoff};

/// A single MySQL session used for the whole run.
pub struct MysqlSource {
    conn: Conn,
    endpoint: String,
    database: String,
}

impl MysqlSource {
    /// Open a connection, retrying with exponential backoff.
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self, SyncError> {
        tracing::debug!(
            "Connecting to mysql. host={}, port={}, user={}, database={}",
            settings.host,
            settings.port,
            settings.user,
            settings.database
        );

        let opts = OptsBuilder::default()
            .ip_or_hostname(settings.host.clone())
            .tcp_port(settings.port)
            .user(Some(settings.user.clone()))
            .pass(Some(settings.password.clone()))
            .db_name(Some(settings.database.clone()));

        let endpoint = format!("{}:{}", settings.host, settings.port);
        let conn = retry_with_backoff(
            || Conn::new(opts.clone()),
            settings.connect_retries,
            Duration::from_secs(1),
        )
        .await
        .map_err(|e| SyncError::Connection {
            host: endpoint.clone(),
            source: Box::new(e),
        })?;

        tracing::info!("Connected to mysql");
        Ok(Self {
            conn,
            endpoint,
            database: settings.database.clone(),
        })
    }

    /// Close the session cleanly.
    pub async fn disconnect(self) {
        if let Err(e) = self.conn.disconnect().await {
            tracing::debug!("Error while disconnecting from mysql: {}", e);
        }
    }
}

#[async_trait]
impl AuditSource for MysqlSource {
    async fn list_tables(&mut self) -> Result<Vec<String>, SyncError> {
        let tables: Vec<String> = self
            .conn
            .query("SHOW TABLES")
            .await
            .map_err(|e| {
                driver_error(&self.endpoint, &self.database, "listing tables", e)
            })?;
        Ok(tables)
    }

    async fn scan_after(
        &mut self,
        table: &str,
        lower_bound: i64,
        sink: &mut dyn RowSink,
    ) -> Result<u64, SyncError> {
        // Text protocol: values arrive exactly as MySQL renders them.
        let query = format!(
            "SELECT * FROM {table} WHERE {pk} > {lower_bound} ORDER BY {pk}",
            table = quote_mysql_ident(table),
            pk = quote_mysql_ident(AUDIT_PK_COLUMN),
        );
        let endpoint = self.endpoint.clone();
        let query_err =
            |e: mysql_async::Error| driver_error(&endpoint, table, "exporting rows", e);

        let mut result = self.conn.query_iter(query).await.map_err(query_err)?;

        let columns: Vec<String> = result
            .columns_ref()
            .iter()
            .map(|c| c.name_str().into_owned())
            .collect();
        sink.begin(&columns)?;

        let mut count = 0;
        while let Some(row) = result.next().await.map_err(query_err)? {
            let values: Vec<FieldValue> = (0..row.len())
                .map(|i| row.as_ref(i).and_then(value_to_field))
                .collect();
            sink.write_row(&AuditRow::new(values))?;
            count += 1;
        }

        Ok(count)
    }

    async fn key_range(&mut self, table: &str) -> Result<KeyRange, SyncError> {
        let query = format!(
            "SELECT COUNT({pk}), MIN({pk}), MAX({pk}) FROM {table}",
            pk = quote_mysql_ident(AUDIT_PK_COLUMN),
            table = quote_mysql_ident(table),
        );

        let row: Option<(u64, Option<i64>, Option<i64>)> = self
            .conn
            .query_first(query)
            .await
            .map_err(|e| driver_error(&self.endpoint, table, "reading key range", e))?;

        let (count, min, max) = row.unwrap_or_default();
        Ok(KeyRange { count, min, max })
    }

    async fn delete_range(
        &mut self,
        table: &str,
        min: i64,
        max_exclusive: i64,
    ) -> Result<u64, SyncError> {
        let query = format!(
            "DELETE FROM {table} WHERE {pk} >= ? AND {pk} < ?",
            table = quote_mysql_ident(table),
            pk = quote_mysql_ident(AUDIT_PK_COLUMN),
        );

        self.conn
            .exec_drop(query, (min, max_exclusive))
            .await
            .map_err(|e| driver_error(&self.endpoint, table, "deleting rows", e))?;
        Ok(self.conn.affected_rows())
    }
}

/// Maps a driver error onto the sync error kinds.
///
/// I/O failures mean the session is gone, which ends the run. Everything
/// else is scoped to the table being processed.
fn driver_error(
    endpoint: &str,
    table: &str,
    operation: &'static str,
    e: mysql_async::Error,
) -> SyncError {
    if matches!(e, mysql_async::Error::Io(_)) {
        SyncError::Connection {
            host: endpoint.to_string(),
            source: Box::new(e),
        }
    } else {
        SyncError::query(table, operation, e)
    }
}

/// Renders a MySQL value the way it appears in text-protocol results.
///
/// NULL stays `None`; it is written as an empty CSV field.
pub fn value_to_field(value: &Value) -> FieldValue {
    let text = match value {
        Value::NULL => return None,
        Value::Bytes(bytes) => return Some(bytes.clone()),
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Date(year, month, day, hour, minute, second, micros) => {
            let mut text = format!(
                "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                year, month, day, hour, minute, second
            );
            if *micros > 0 {
                text.push_str(&format!(".{:06}", micros));
            }
            text
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let total_hours = u64::from(*days) * 24 + u64::from(*hours);
            let mut text = format!(
                "{}{:02}:{:02}:{:02}",
                if *negative { "-" } else { "" },
                total_hours,
                minutes,
                seconds
            );
            if *micros > 0 {
                text.push_str(&format!(".{:06}", micros));
            }
            text
        }
    };
    Some(text.into_bytes())
}
