// ABOUTME: Streams new audit rows into the table's CSV export file
// ABOUTME: Creates the file with a header on first export, appends afterwards

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::source::{AuditSource, RowSink};
use super::{AuditRow, ResumePoint};
use crate::error::SyncError;

/// Writes rows above a resume point to an export file.
#[derive(Debug, Default, Clone, Copy)]
pub struct RowExporter;

impl RowExporter {
    pub fn new() -> Self {
        Self
    }

    /// Exports every row of `table` past `resume` into `path`.
    ///
    /// [`ResumePoint::Fresh`] truncates the file and writes a header line;
    /// [`ResumePoint::After`] appends. Returns the number of rows written.
    pub async fn export<S: AuditSource + ?Sized>(
        &self,
        source: &mut S,
        table: &str,
        resume: ResumePoint,
        path: &Path,
    ) -> Result<u64, SyncError> {
        let mut sink = CsvSink::open(path, resume)?;

        tracing::debug!(
            "Selecting rows from `{}` with audit_pk > {}",
            table,
            resume.lower_bound()
        );
        let rows = source
            .scan_after(table, resume.lower_bound(), &mut sink)
            .await?;

        sink.finish()?;
        Ok(rows)
    }
}

/// [`RowSink`] writing CSV lines to an export file.
pub struct CsvSink {
    path: PathBuf,
    writer: csv::Writer<File>,
    write_header: bool,
}

impl CsvSink {
    /// Opens the export file in create mode for a fresh export, otherwise in
    /// append mode.
    pub fn open(path: &Path, resume: ResumePoint) -> Result<Self, SyncError> {
        let file_io = |source| SyncError::FileIo {
            path: path.to_path_buf(),
            action: "writing",
            source,
        };

        let file = if resume.is_fresh() {
            File::create(path).map_err(file_io)?
        } else {
            let mut file = OpenOptions::new()
                .read(true)
                .append(true)
                .create(true)
                .open(path)
                .map_err(file_io)?;
            terminate_last_line(&mut file).map_err(file_io)?;
            file
        };

        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(file);

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            write_header: resume.is_fresh(),
        })
    }

    /// Flushes buffered lines to disk.
    pub fn finish(mut self) -> Result<(), SyncError> {
        self.writer.flush().map_err(|source| SyncError::FileIo {
            path: self.path.clone(),
            action: "writing",
            source,
        })
    }

    fn write_err(&self, source: csv::Error) -> SyncError {
        SyncError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

impl RowSink for CsvSink {
    fn begin(&mut self, columns: &[String]) -> Result<(), SyncError> {
        if self.write_header {
            self.writer
                .write_record(columns)
                .map_err(|e| self.write_err(e))?;
            self.write_header = false;
        }
        Ok(())
    }

    fn write_row(&mut self, row: &AuditRow) -> Result<(), SyncError> {
        self.writer
            .write_record(row.csv_fields())
            .map_err(|e| self.write_err(e))
    }
}

/// Appends a newline when the file ends inside an unterminated line.
fn terminate_last_line(file: &mut File) -> io::Result<()> {
    let len = file.seek(SeekFrom::End(0))?;
    if len == 0 {
        return Ok(());
    }

    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        tracing::warn!("Export file ends without a newline, terminating its last line");
        file.write_all(b"\n")?;
    }
    Ok(())
}
