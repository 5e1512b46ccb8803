// ABOUTME: SyncEngine runs one export cycle over every selected audit table
// ABOUTME: Locates the resume point, exports new rows and optionally trims per table

use std::path::{Path, PathBuf};
use std::time::Instant;

use super::exporter::RowExporter;
use super::resume::ResumeLocator;
use super::source::AuditSource;
use super::trimmer::TableTrimmer;
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::filters::TableFilter;
use crate::utils::sanitize_identifier;

/// Statistics from a sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    pub tables_synced: usize,
    pub rows_exported: u64,
    pub rows_trimmed: u64,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

impl SyncStats {
    /// Check if the run completed without errors.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Result of syncing one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableOutcome {
    pub rows_exported: u64,
    pub rows_trimmed: u64,
}

/// Exports audit tables to `{output_dir}/{table}.csv`.
///
/// Tables are processed one at a time in the order the source lists them.
/// A failure on one table is logged and recorded, and the run moves on to
/// the next table.
pub struct SyncEngine {
    enabled: bool,
    output_dir: PathBuf,
    wipe: bool,
    filter: TableFilter,
    locator: ResumeLocator,
    exporter: RowExporter,
    trimmer: TableTrimmer,
}

impl SyncEngine {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            enabled: config.sync_enabled(),
            output_dir: config.output_dir.clone(),
            wipe: config.wipe,
            filter: config.filter.clone(),
            locator: ResumeLocator::new(),
            exporter: RowExporter::new(),
            trimmer: TableTrimmer::new(config.trim.batch_size, config.trim.pause),
        }
    }

    /// Path of the export file for `table`.
    pub fn csv_path(&self, table: &str) -> PathBuf {
        self.output_dir.join(format!("{}.csv", table))
    }

    /// Creates the output directory when it does not exist yet.
    pub fn ensure_output_dir(&self) -> Result<(), SyncError> {
        ensure_dir_exists(&self.output_dir)
    }

    /// Whether this engine exports anything at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Run a sync over every table the filter selects.
    ///
    /// Errors that make the whole run pointless (listing tables, the output
    /// directory, a lost connection) are returned; other per-table failures
    /// land in [`SyncStats::errors`].
    pub async fn run<S: AuditSource + ?Sized>(
        &self,
        source: &mut S,
    ) -> Result<SyncStats, SyncError> {
        let start = Instant::now();
        let mut stats = SyncStats::default();

        if !self.enabled {
            tracing::info!(
                "Output directory is {:?}, skipping audit table sync",
                self.output_dir
            );
            return Ok(stats);
        }

        self.ensure_output_dir()?;

        tracing::info!("Getting tables");
        let all_tables = source.list_tables().await.map_err(|e| {
            tracing::error!("Failed to list tables: {:?}", e);
            e
        })?;

        for table in &all_tables {
            if let Some(reason) = self.filter.skip_reason(table) {
                tracing::info!(
                    "Found table {}. {}, skipping",
                    sanitize_identifier(table),
                    reason
                );
                continue;
            }

            match self.sync_table(source, table).await {
                Ok(outcome) => {
                    stats.tables_synced += 1;
                    stats.rows_exported += outcome.rows_exported;
                    stats.rows_trimmed += outcome.rows_trimmed;
                }
                Err(e) if e.is_run_fatal() => {
                    tracing::error!(
                        "Aborting sync at {}: {:?}",
                        sanitize_identifier(table),
                        e
                    );
                    return Err(e);
                }
                Err(e) => {
                    // Log with :? to show full error chain including root cause
                    let name = sanitize_identifier(table);
                    tracing::error!("Failed to sync {}: {:?}", name, e);
                    stats.errors.push(format!("Failed to sync {}: {}", name, e));
                }
            }
        }

        stats.duration_ms = start.elapsed().as_millis() as u64;

        if stats.is_success() {
            // Shown at the default verbosity.
            tracing::warn!(
                "Successfully synced audit tables to {}",
                self.output_dir.display()
            );
        } else {
            tracing::error!(
                "Synced {} table(s) to {}, {} failed",
                stats.tables_synced,
                self.output_dir.display(),
                stats.errors.len()
            );
        }

        Ok(stats)
    }

    /// Exports one table and trims it when wiping is enabled.
    pub async fn sync_table<S: AuditSource + ?Sized>(
        &self,
        source: &mut S,
        table: &str,
    ) -> Result<TableOutcome, SyncError> {
        tracing::info!("Processing table {}", sanitize_identifier(table));
        let path = self.csv_path(table);

        let resume = self.locator.locate(&path)?;
        tracing::debug!("Resuming {} after audit_pk {}", table, resume);

        let rows_exported = self.exporter.export(source, table, resume, &path).await?;
        tracing::info!(
            "Exported {} row(s) from {} to {}",
            rows_exported,
            table,
            path.display()
        );

        let rows_trimmed = if self.wipe {
            let trim = self.trimmer.trim(source, table).await?;
            tracing::info!(
                "Wiped {} row(s) from {} in {} batch(es)",
                trim.rows_deleted,
                table,
                trim.batches
            );
            trim.rows_deleted
        } else {
            0
        };

        Ok(TableOutcome {
            rows_exported,
            rows_trimmed,
        })
    }
}

fn ensure_dir_exists(path: &Path) -> Result<(), SyncError> {
    tracing::debug!("Checking if path exists: {}", path.display());
    if path.is_dir() {
        return Ok(());
    }

    tracing::debug!("Path does not exist, creating: {}", path.display());
    std::fs::create_dir_all(path).map_err(|source| SyncError::Directory {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!("Path created: {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::memory::MemorySource;
    use crate::config::{TrimSettings, DISABLED_OUTPUT_DIR};
    use crate::filters::AuditMarker;
    use std::time::Duration;
    use tempfile::TempDir;

    const COLUMNS: [&str; 6] = ["id", "name", "op", "changed_at", "changed_by", "audit_pk"];

    fn config(dir: &Path, wipe: bool, filter: TableFilter) -> SyncConfig {
        SyncConfig {
            output_dir: dir.to_path_buf(),
            wipe,
            filter,
            trim: TrimSettings {
                batch_size: 100,
                pause: Duration::ZERO,
            },
            ..SyncConfig::default()
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    #[tokio::test]
    async fn test_resume_scenario_appends_only_new_rows() {
        let dir = TempDir::new().unwrap();
        let engine = SyncEngine::new(&config(dir.path(), false, TableFilter::default()));
        let path = engine.csv_path("t_audit");

        let mut source = MemorySource::new();
        source.add_table("t_audit", &COLUMNS);
        source.insert_rows("t_audit", 1..=3);

        let stats = engine.run(&mut source).await.unwrap();
        assert!(stats.is_success());
        assert_eq!(stats.rows_exported, 3);
        let first = read_lines(&path);
        assert_eq!(first.len(), 4);
        assert_eq!(first[0], COLUMNS.join(","));
        assert!(first[3].ends_with(",3"));

        let bytes_before = std::fs::read(&path).unwrap();
        let stats = engine.run(&mut source).await.unwrap();
        assert_eq!(stats.rows_exported, 0);
        assert_eq!(std::fs::read(&path).unwrap(), bytes_before);

        source.insert_rows("t_audit", 4..=5);
        let stats = engine.run(&mut source).await.unwrap();
        assert_eq!(stats.rows_exported, 2);
        let third = read_lines(&path);
        assert_eq!(third.len(), 6);
        assert_eq!(&third[..4], &first[..]);
        assert!(third[5].ends_with(",5"));
        assert_eq!(third.iter().filter(|l| **l == first[0]).count(), 1);
    }

    #[tokio::test]
    async fn test_wipe_after_export_keeps_newest_row() {
        let dir = TempDir::new().unwrap();
        let engine = SyncEngine::new(&config(dir.path(), true, TableFilter::default()));

        let mut source = MemorySource::new();
        source.add_table("t_audit", &COLUMNS);
        source.insert_rows("t_audit", 1..=250);

        let stats = engine.run(&mut source).await.unwrap();
        assert_eq!(stats.rows_exported, 250);
        assert_eq!(stats.rows_trimmed, 249);
        assert_eq!(source.pks("t_audit"), vec![250]);

        // The kept row is already exported and must not be written again.
        source.insert_rows("t_audit", 251..=252);
        let stats = engine.run(&mut source).await.unwrap();
        assert_eq!(stats.rows_exported, 2);
        let lines = read_lines(&engine.csv_path("t_audit"));
        assert_eq!(lines.len(), 253);
        assert!(lines[252].ends_with(",252"));
        assert_eq!(source.pks("t_audit"), vec![252]);
    }

    #[tokio::test]
    async fn test_filter_selects_tables() {
        let dir = TempDir::new().unwrap();
        let filter = TableFilter::new(
            Some(vec!["a_audit".to_string()]),
            true,
            AuditMarker::Suffix("_audit".to_string()),
        )
        .unwrap();
        let engine = SyncEngine::new(&config(dir.path(), false, filter));

        let mut source = MemorySource::new();
        for name in ["a_audit", "b_audit", "c"] {
            source.add_table(name, &COLUMNS);
            source.insert_rows(name, 1..=2);
        }

        let stats = engine.run(&mut source).await.unwrap();
        assert_eq!(stats.tables_synced, 1);
        assert!(!engine.csv_path("a_audit").exists());
        assert!(engine.csv_path("b_audit").exists());
        assert!(!engine.csv_path("c").exists());
    }

    #[tokio::test]
    async fn test_failing_table_does_not_stop_others() {
        let dir = TempDir::new().unwrap();
        let engine = SyncEngine::new(&config(dir.path(), true, TableFilter::default()));

        let mut source = MemorySource::new();
        for name in ["a_audit", "b_audit"] {
            source.add_table(name, &COLUMNS);
            source.insert_rows(name, 1..=3);
        }
        source.failing_deletes.push("a_audit".to_string());

        let stats = engine.run(&mut source).await.unwrap();
        assert!(!stats.is_success());
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].contains("a_audit"));
        assert_eq!(stats.tables_synced, 1);
        // a_audit was exported before its trim failed; b_audit fully synced.
        assert_eq!(read_lines(&engine.csv_path("a_audit")).len(), 4);
        assert_eq!(source.pks("b_audit"), vec![3]);
    }

    #[tokio::test]
    async fn test_multiline_newest_row_resumes_with_wipe() {
        let dir = TempDir::new().unwrap();
        let engine = SyncEngine::new(&config(dir.path(), true, TableFilter::default()));
        let path = engine.csv_path("notes_audit");

        let mut source = MemorySource::new();
        source.add_table(
            "notes_audit",
            &["id", "note", "op", "ts", "user", "audit_pk"],
        );
        source.insert_rows("notes_audit", 1..=2);
        source.insert_values(
            "notes_audit",
            vec![
                Some(b"3".to_vec()),
                Some(b"line1\nline2".to_vec()),
                Some(b"U".to_vec()),
                Some(b"ts".to_vec()),
                Some(b"root".to_vec()),
                Some(b"3".to_vec()),
            ],
        );

        let stats = engine.run(&mut source).await.unwrap();
        assert_eq!(stats.rows_exported, 3);
        assert_eq!(source.pks("notes_audit"), vec![3]);
        let first = std::fs::read(&path).unwrap();

        let stats = engine.run(&mut source).await.unwrap();
        assert!(stats.is_success());
        assert_eq!(stats.rows_exported, 0);
        assert_eq!(std::fs::read(&path).unwrap(), first);

        let contents = String::from_utf8(first).unwrap();
        assert!(contents.contains("v1_1,"));
        assert!(contents.contains("v2_1,"));
        assert!(contents.ends_with("3,\"line1\nline2\",U,ts,root,3\n"));
    }

    #[tokio::test]
    async fn test_unreadable_export_file_fails_only_its_table() {
        let dir = TempDir::new().unwrap();
        let engine = SyncEngine::new(&config(dir.path(), false, TableFilter::default()));
        std::fs::create_dir(engine.csv_path("a_audit")).unwrap();

        let mut source = MemorySource::new();
        for name in ["a_audit", "b_audit"] {
            source.add_table(name, &COLUMNS);
            source.insert_rows(name, 1..=2);
        }

        let stats = engine.run(&mut source).await.unwrap();
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].contains("a_audit"));
        assert!(stats.errors[0].contains("reading"));
        assert_eq!(stats.tables_synced, 1);
        assert_eq!(read_lines(&engine.csv_path("b_audit")).len(), 3);
    }

    #[tokio::test]
    async fn test_lost_connection_aborts_run() {
        let dir = TempDir::new().unwrap();
        let engine = SyncEngine::new(&config(dir.path(), false, TableFilter::default()));

        let mut source = MemorySource::new();
        for name in ["a_audit", "b_audit"] {
            source.add_table(name, &COLUMNS);
            source.insert_rows(name, 1..=2);
        }
        source.lost_connection_on.push("a_audit".to_string());

        let err = engine.run(&mut source).await.unwrap_err();
        assert!(matches!(err, SyncError::Connection { .. }));
        assert!(!engine.csv_path("b_audit").exists());
    }

    #[tokio::test]
    async fn test_disabled_output_dir_skips_everything() {
        let engine = SyncEngine::new(&config(
            Path::new(DISABLED_OUTPUT_DIR),
            true,
            TableFilter::default(),
        ));
        assert!(!engine.is_enabled());

        let mut source = MemorySource::new();
        source.add_table("t_audit", &COLUMNS);
        source.insert_rows("t_audit", 1..=3);

        let stats = engine.run(&mut source).await.unwrap();
        assert!(stats.is_success());
        assert_eq!(stats.tables_synced, 0);
        assert!(source.deletes.is_empty());
        assert_eq!(source.pks("t_audit"), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_output_dir_is_created() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("exports").join("audit");
        let engine = SyncEngine::new(&config(&nested, false, TableFilter::default()));

        let mut source = MemorySource::new();
        engine.run(&mut source).await.unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn test_uncreatable_output_dir_is_run_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "").unwrap();
        let engine = SyncEngine::new(&config(
            &blocker.join("sub"),
            false,
            TableFilter::default(),
        ));

        let err = engine.run(&mut MemorySource::new()).await.unwrap_err();
        assert!(err.is_run_fatal());
        assert!(matches!(err, SyncError::Directory { .. }));
    }
}
