// ABOUTME: Derives the resume point of a table from its existing export file
// ABOUTME: Reads only the final CSV record, scanning backwards in fixed-size chunks

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use super::{ResumePoint, MIN_DATA_FIELDS};
use crate::error::SyncError;

const CHUNK_SIZE: u64 = 4096;

/// Finds the last exported `audit_pk` in an export file.
///
/// The file is the only record of progress, so a malformed or header-only
/// tail resolves to [`ResumePoint::Fresh`]: re-exporting is preferred over
/// skipping rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResumeLocator;

impl ResumeLocator {
    pub fn new() -> Self {
        Self
    }

    pub fn locate(&self, path: &Path) -> Result<ResumePoint, SyncError> {
        if !path.exists() {
            tracing::debug!("No export file at {}, starting fresh", path.display());
            return Ok(ResumePoint::Fresh);
        }

        let file_io = |source| SyncError::FileIo {
            path: path.to_path_buf(),
            action: "reading",
            source,
        };

        let mut file = File::open(path).map_err(file_io)?;
        if !file.metadata().map_err(file_io)?.is_file() {
            return Err(file_io(io::Error::new(
                io::ErrorKind::Other,
                "export path is not a regular file",
            )));
        }
        let record = read_last_record(&mut file).map_err(file_io)?;

        match parse_resume_record(&record) {
            Some(pk) => Ok(ResumePoint::After(pk)),
            None => {
                tracing::debug!(
                    "Last record of {} is not a data row, treating as no prior export",
                    path.display()
                );
                Ok(ResumePoint::Fresh)
            }
        }
    }
}

/// Returns the final CSV record of `reader`, without its terminator.
///
/// A newline only ends a record when an even number of quote characters
/// follows it, so a quoted field spanning several lines comes back whole.
/// Trailing `\n` / `\r\n` at end of input are skipped. Returns an empty vec
/// for empty input.
pub fn read_last_record<R: Read + Seek>(reader: &mut R) -> io::Result<Vec<u8>> {
    let len = reader.seek(SeekFrom::End(0))?;
    let mut chunks: Vec<Vec<u8>> = Vec::new();
    let mut pos = len;
    let mut quotes: usize = 0;
    let mut skipping_terminators = true;

    while pos > 0 {
        let chunk_len = CHUNK_SIZE.min(pos);
        pos -= chunk_len;
        reader.seek(SeekFrom::Start(pos))?;
        let mut chunk = vec![0u8; chunk_len as usize];
        reader.read_exact(&mut chunk)?;

        if skipping_terminators {
            while matches!(chunk.last(), Some(b'\n' | b'\r')) {
                chunk.pop();
            }
            if chunk.is_empty() {
                continue;
            }
            skipping_terminators = false;
        }

        let mut record_start = None;
        for (i, byte) in chunk.iter().enumerate().rev() {
            match byte {
                b'"' => quotes += 1,
                b'\n' if quotes % 2 == 0 => {
                    record_start = Some(i + 1);
                    break;
                }
                _ => {}
            }
        }

        match record_start {
            Some(start) => {
                chunks.push(chunk.split_off(start));
                break;
            }
            None => chunks.push(chunk),
        }
    }

    chunks.reverse();
    Ok(chunks.concat())
}

/// Parses an exported record into its trailing `audit_pk`.
///
/// Returns `None` unless `record` holds exactly one CSV record with at least
/// [`MIN_DATA_FIELDS`] fields whose last field is a non-negative integer.
pub fn parse_resume_record(record: &[u8]) -> Option<u64> {
    if record.is_empty() {
        return None;
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(record);

    let mut fields = csv::ByteRecord::new();
    match reader.read_byte_record(&mut fields) {
        Ok(true) => {}
        _ => return None,
    }

    let mut extra = csv::ByteRecord::new();
    if !matches!(reader.read_byte_record(&mut extra), Ok(false)) {
        return None;
    }

    if fields.len() < MIN_DATA_FIELDS {
        return None;
    }

    let last = std::str::from_utf8(fields.get(fields.len() - 1)?).ok()?.trim();
    if last.is_empty() || !last.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    last.parse().ok()
}
