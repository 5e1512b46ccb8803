// ABOUTME: Immutable run configuration assembled from defaults, TOML and CLI
// ABOUTME: Later layers override earlier ones field by field

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audit::trimmer::{DEFAULT_BATCH_SIZE, DEFAULT_PAUSE};
use crate::filters::{AuditMarker, TableFilter};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_OUTPUT_DIR: &str = "./cdc_audit_sync";
pub const DEFAULT_SUFFIX: &str = "_audit";
pub const DEFAULT_CONNECT_RETRIES: u32 = 3;

/// Output directory value that turns the export off.
pub const DISABLED_OUTPUT_DIR: &str = "=NONE=";

/// MySQL connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub connect_retries: u32,
}

// Hand-written so the password never reaches a log line.
impl std::fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("database", &self.database)
            .field("connect_retries", &self.connect_retries)
            .finish()
    }
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: String::new(),
            database: String::new(),
            connect_retries: DEFAULT_CONNECT_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrimSettings {
    pub batch_size: u64,
    pub pause: Duration,
}

impl Default for TrimSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pause: DEFAULT_PAUSE,
        }
    }
}

/// Everything one run needs, fixed before the run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub connection: ConnectionSettings,
    pub filter: TableFilter,
    pub output_dir: PathBuf,
    pub wipe: bool,
    pub trim: TrimSettings,
}

impl SyncConfig {
    /// False when the output directory is empty or [`DISABLED_OUTPUT_DIR`],
    /// in which case a run does nothing.
    pub fn sync_enabled(&self) -> bool {
        !self.output_dir.as_os_str().is_empty()
            && self.output_dir.as_path() != Path::new(DISABLED_OUTPUT_DIR)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionSettings::default(),
            filter: TableFilter::default(),
            output_dir: PathBuf::from(DEFAULT_OUTPUT_DIR),
            wipe: false,
            trim: TrimSettings::default(),
        }
    }
}

/// One configuration layer; every field is optional.
///
/// Used both for the TOML file and for command line overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    #[serde(default)]
    pub mysql: MysqlLayer,
    #[serde(default)]
    pub audit: AuditLayer,
    #[serde(default)]
    pub output: OutputLayer,
    #[serde(default)]
    pub trim: TrimLayer,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MysqlLayer {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub connect_retries: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditLayer {
    pub tables: Option<Vec<String>>,
    pub exclude: Option<bool>,
    pub prefix: Option<String>,
    pub suffix: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputLayer {
    pub dir: Option<PathBuf>,
    pub wipe: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrimLayer {
    pub batch_size: Option<u64>,
    pub pause_ms: Option<u64>,
}

impl ConfigLayer {
    /// Load a layer from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file {:?}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Returns `self` with every field set in `over` replaced.
    pub fn merge(self, over: ConfigLayer) -> ConfigLayer {
        ConfigLayer {
            mysql: MysqlLayer {
                host: over.mysql.host.or(self.mysql.host),
                port: over.mysql.port.or(self.mysql.port),
                user: over.mysql.user.or(self.mysql.user),
                password: over.mysql.password.or(self.mysql.password),
                database: over.mysql.database.or(self.mysql.database),
                connect_retries: over.mysql.connect_retries.or(self.mysql.connect_retries),
            },
            audit: AuditLayer {
                tables: over.audit.tables.or(self.audit.tables),
                exclude: over.audit.exclude.or(self.audit.exclude),
                prefix: over.audit.prefix.or(self.audit.prefix),
                suffix: over.audit.suffix.or(self.audit.suffix),
            },
            output: OutputLayer {
                dir: over.output.dir.or(self.output.dir),
                wipe: over.output.wipe.or(self.output.wipe),
            },
            trim: TrimLayer {
                batch_size: over.trim.batch_size.or(self.trim.batch_size),
                pause_ms: over.trim.pause_ms.or(self.trim.pause_ms),
            },
        }
    }

    /// Fill remaining gaps with defaults and validate.
    pub fn resolve(self) -> Result<SyncConfig> {
        let database = match self.mysql.database {
            Some(db) if !db.trim().is_empty() => db,
            _ => bail!("A database name is required (use -d/--database or [mysql] database)"),
        };

        let batch_size = self.trim.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        if batch_size == 0 {
            bail!("Trim batch size must be at least 1");
        }

        let suffix = self
            .audit
            .suffix
            .unwrap_or_else(|| DEFAULT_SUFFIX.to_string());
        let marker = AuditMarker::from_parts(self.audit.prefix.as_deref(), &suffix);
        let filter = TableFilter::new(
            self.audit.tables,
            self.audit.exclude.unwrap_or(false),
            marker,
        )?;

        Ok(SyncConfig {
            connection: ConnectionSettings {
                host: self.mysql.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: self.mysql.port.unwrap_or(DEFAULT_PORT),
                user: self.mysql.user.unwrap_or_else(|| DEFAULT_USER.to_string()),
                password: self.mysql.password.unwrap_or_default(),
                database,
                connect_retries: self
                    .mysql
                    .connect_retries
                    .unwrap_or(DEFAULT_CONNECT_RETRIES),
            },
            filter,
            output_dir: self
                .output
                .dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            wipe: self.output.wipe.unwrap_or(false),
            trim: TrimSettings {
                batch_size,
                pause: self
                    .trim
                    .pause_ms
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_PAUSE),
            },
        })
    }
}
