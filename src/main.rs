// ABOUTME: CLI entry point for cdc-audit-sync
// ABOUTME: Parses flags, sets up logging and runs one sync over the audit tables

use clap::{ArgAction, Parser};
use std::path::PathBuf;
use std::process::ExitCode;

use cdc_audit_sync::config::{ConfigLayer, SyncConfig};
use cdc_audit_sync::filters::TableFilter;
use cdc_audit_sync::logging::{self, DEFAULT_VERBOSITY};
use cdc_audit_sync::mysql::MysqlSource;
use cdc_audit_sync::SyncEngine;

#[derive(Parser)]
#[command(name = "cdc-audit-sync")]
#[command(
    about = "Incrementally export MySQL audit tables to CSV files",
    long_about = None
)]
#[command(version, disable_help_flag = true)]
struct Cli {
    /// Database name
    #[arg(short = 'd', long, env = "CDC_AUDIT_SYNC_DATABASE")]
    database: Option<String>,
    /// Address of the machine running MySQL [default: localhost]
    #[arg(short = 'h', long, env = "CDC_AUDIT_SYNC_HOST")]
    host: Option<String>,
    /// MySQL port [default: 3306]
    #[arg(short = 'P', long)]
    port: Option<u16>,
    /// MySQL username [default: root]
    #[arg(short = 'u', long, env = "CDC_AUDIT_SYNC_USER")]
    user: Option<String>,
    /// MySQL password
    #[arg(short = 'p', long, env = "CDC_AUDIT_SYNC_PASSWORD", hide_env_values = true)]
    password: Option<String>,
    /// Directory to write audit CSV files to [default: ./cdc_audit_sync]
    #[arg(short = 'm', long)]
    output_dir: Option<PathBuf>,
    /// Comma separated list of tables to sync [default: all audit tables]
    #[arg(short = 't', long)]
    tables: Option<String>,
    /// Invert --tables: exclude the listed tables
    #[arg(short = 'e', long)]
    exclude: bool,
    /// Wipe all but the very last audit row after syncing, in small batches
    #[arg(short = 'w', long)]
    wipe: bool,
    /// Suffix marking audit tables [default: _audit]
    #[arg(short = 'A', long)]
    suffix: Option<String>,
    /// Prefix marking audit tables, replaces the suffix
    #[arg(short = 'a', long)]
    prefix: Option<String>,
    /// Send all log output to FILE instead of stdout
    #[arg(short = 'o', long = "log-file", value_name = "FILE")]
    log_file: Option<PathBuf>,
    /// Verbosity: 3 = errors only, 4 = warnings, 6 = informational, 7 = debug
    #[arg(short = 'v', long, default_value_t = DEFAULT_VERBOSITY)]
    verbosity: u8,
    /// Rows deleted per wipe batch [default: 100]
    #[arg(long)]
    batch_size: Option<u64>,
    /// Pause between wipe batches in milliseconds [default: 1000]
    #[arg(long)]
    trim_pause_ms: Option<u64>,
    /// Extra connection attempts before giving up [default: 3]
    #[arg(long)]
    connect_retries: Option<u32>,
    /// Path to a TOML file with defaults for any of these settings
    #[arg(long = "config", value_name = "FILE")]
    config_path: Option<PathBuf>,
    /// Print help
    #[arg(long, action = ArgAction::Help)]
    help: Option<bool>,
}

impl Cli {
    /// Command line settings as the highest-precedence config layer.
    fn overrides(&self) -> ConfigLayer {
        let mut layer = ConfigLayer::default();
        layer.mysql.host = self.host.clone();
        layer.mysql.port = self.port;
        layer.mysql.user = self.user.clone();
        layer.mysql.password = self.password.clone();
        layer.mysql.database = self.database.clone();
        layer.mysql.connect_retries = self.connect_retries;
        layer.audit.tables = self.tables.as_deref().map(TableFilter::parse_table_list);
        layer.audit.exclude = self.exclude.then_some(true);
        layer.audit.prefix = self.prefix.clone();
        layer.audit.suffix = self.suffix.clone();
        layer.output.dir = self.output_dir.clone();
        layer.output.wipe = self.wipe.then_some(true);
        layer.trim.batch_size = self.batch_size;
        layer.trim.pause_ms = self.trim_pause_ms;
        layer
    }

    fn resolve_config(&self) -> anyhow::Result<SyncConfig> {
        let file = match &self.config_path {
            Some(path) => ConfigLayer::load(path)?,
            None => ConfigLayer::default(),
        };
        file.merge(self.overrides()).resolve()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    logging::init(cli.verbosity, cli.log_file.as_deref())?;

    let config = match cli.resolve_config() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("{:#}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    Ok(run(&config).await)
}

async fn run(config: &SyncConfig) -> ExitCode {
    let engine = SyncEngine::new(config);
    if !engine.is_enabled() {
        tracing::info!("Output directory is {:?}, nothing to sync", config.output_dir);
        return ExitCode::SUCCESS;
    }

    // The output directory is checked before connecting so a bad path fails fast.
    if let Err(e) = engine.ensure_output_dir() {
        tracing::error!("{:?}", anyhow::Error::new(e));
        return ExitCode::FAILURE;
    }

    let mut source = match MysqlSource::connect(&config.connection).await {
        Ok(source) => source,
        Err(e) => {
            tracing::error!("{:?}", anyhow::Error::new(e));
            return ExitCode::FAILURE;
        }
    };

    let outcome = engine.run(&mut source).await;
    source.disconnect().await;

    match outcome {
        Ok(stats) if stats.is_success() => {
            tracing::info!(
                "Synced {} table(s): {} row(s) exported, {} row(s) wiped in {}ms",
                stats.tables_synced,
                stats.rows_exported,
                stats.rows_trimmed,
                stats.duration_ms
            );
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{:?}", anyhow::Error::new(e));
            ExitCode::FAILURE
        }
    }
}
