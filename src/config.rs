use crate::error::Error;
use crate::workdir::WorkingDir;
use config::{Config, Environment, File as ConfigFile, FileFormat};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

pub const CONFIG_HELP: &str = "
Configure the purge settings in the [purge] section of conf/cuckoo.conf
(or conf/purge.toml, or CUCKOO__PURGE__<KEY> environment variables):

    [purge]
    threshold = 50          # reserve to keep free, whole GiB
    daemon = no             # yes: purge continuously, no: one bounded pass
    archive = no            # keep the sample and a gzipped report
    binaries_folder = binaries
    reports_folder = reports
";

const DEFAULT_POLL_INTERVAL_SECS: u64 = 600;

/// Settings exactly as read from the configuration sources, before any
/// validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSettings {
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub purge: PurgeSection,
    #[serde(default)]
    pub mongodb: MongoSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseSection {
    pub connection: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PurgeSection {
    pub threshold: Option<String>,
    #[serde(default)]
    pub daemon: bool,
    #[serde(default)]
    pub archive: bool,
    #[serde(default = "default_binaries_folder")]
    pub binaries_folder: String,
    #[serde(default = "default_reports_folder")]
    pub reports_folder: String,
    #[serde(default = "default_interval")]
    pub interval: u64,
}

impl Default for PurgeSection {
    fn default() -> Self {
        Self {
            threshold: None,
            daemon: false,
            archive: false,
            binaries_folder: default_binaries_folder(),
            reports_folder: default_reports_folder(),
            interval: default_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoSection {
    #[serde(default = "default_mongo_host")]
    pub host: String,
    #[serde(default = "default_mongo_port")]
    pub port: u16,
    #[serde(default = "default_mongo_db")]
    pub db: String,
}

impl Default for MongoSection {
    fn default() -> Self {
        Self {
            host: default_mongo_host(),
            port: default_mongo_port(),
            db: default_mongo_db(),
        }
    }
}

fn default_binaries_folder() -> String {
    "binaries".to_string()
}

fn default_reports_folder() -> String {
    "reports".to_string()
}

fn default_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_mongo_host() -> String {
    "127.0.0.1".to_string()
}

fn default_mongo_port() -> u16 {
    27017
}

fn default_mongo_db() -> String {
    "cuckoo".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Purge whole days until the reserve is met, then exit.
    Bounded,
    /// Purge one task at a time forever, sleeping while the reserve is met.
    Daemon,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseTarget {
    Postgres(String),
    Sqlite(PathBuf),
}

#[derive(Debug, Clone)]
pub struct MongoSettings {
    pub uri: String,
    pub db: String,
}

/// Validated, immutable configuration. Built once at startup and handed to
/// the components that need it.
#[derive(Debug, Clone)]
pub struct Settings {
    pub threshold_gib: u64,
    pub mode: RunMode,
    pub archive: bool,
    pub binaries_folder: PathBuf,
    pub reports_folder: PathBuf,
    pub poll_interval: Duration,
    pub database: DatabaseTarget,
    pub mongodb: MongoSettings,
}

impl Settings {
    pub fn load(cwd: &WorkingDir) -> Result<Settings, Error> {
        load_raw(cwd)?.validate(cwd)
    }

    /// Free space to keep available, in bytes.
    pub fn reserve_bytes(&self) -> u64 {
        self.threshold_gib.saturating_mul(1 << 30)
    }
}

pub fn load_raw(cwd: &WorkingDir) -> Result<RawSettings, Error> {
    let conf_dir = cwd.conf_dir();
    let cuckoo_conf = conf_dir.join("cuckoo.conf");
    let reporting_conf = conf_dir.join("reporting.conf");
    let purge_toml = conf_dir.join("purge.toml");

    let builder = Config::builder()
        .add_source(
            ConfigFile::new(&cuckoo_conf.to_string_lossy(), FileFormat::Ini).required(false),
        )
        .add_source(
            ConfigFile::new(&reporting_conf.to_string_lossy(), FileFormat::Ini).required(false),
        )
        .add_source(ConfigFile::new(&purge_toml.to_string_lossy(), FileFormat::Toml).required(false))
        .add_source(Environment::with_prefix("CUCKOO").separator("__"))
        .build()?;

    Ok(builder.try_deserialize::<RawSettings>()?)
}

impl RawSettings {
    pub fn validate(self, cwd: &WorkingDir) -> Result<Settings, Error> {
        let database = parse_database_target(self.database.connection.as_deref(), cwd)?;
        let threshold_gib = parse_threshold(self.purge.threshold.as_deref())?;

        let mode = if self.purge.daemon {
            RunMode::Daemon
        } else {
            RunMode::Bounded
        };

        Ok(Settings {
            threshold_gib,
            mode,
            archive: self.purge.archive,
            binaries_folder: cwd.resolve(&self.purge.binaries_folder),
            reports_folder: cwd.resolve(&self.purge.reports_folder),
            poll_interval: Duration::from_secs(self.purge.interval),
            database,
            mongodb: MongoSettings {
                uri: format!("mongodb://{}:{}", self.mongodb.host, self.mongodb.port),
                db: self.mongodb.db,
            },
        })
    }
}

fn parse_threshold(raw: Option<&str>) -> Result<u64, Error> {
    let raw = match raw.map(str::trim) {
        Some(value) if !value.is_empty() => value,
        _ => return Err(Error::MissingThreshold),
    };
    raw.parse::<u64>()
        .map_err(|_| Error::InvalidThreshold(raw.to_string()))
}

/// Map a SQLAlchemy-style connection string onto a backend. No connection
/// string means the default SQLite database inside the working directory,
/// which must exist.
pub fn parse_database_target(
    connection: Option<&str>,
    cwd: &WorkingDir,
) -> Result<DatabaseTarget, Error> {
    let connection = connection.map(str::trim).filter(|c| !c.is_empty());

    let Some(connection) = connection else {
        let default_db = cwd.default_database();
        if !default_db.exists() {
            return Err(Error::InvalidWorkingDir(cwd.root().to_path_buf()));
        }
        return Ok(DatabaseTarget::Sqlite(default_db));
    };

    let Some((scheme, rest)) = connection.split_once("://") else {
        return Err(Error::UnsupportedDatabase(connection.to_string()));
    };
    // "postgresql+psycopg2" and friends name a python driver, not a backend.
    let backend = scheme.split('+').next().unwrap_or(scheme);

    match backend {
        "postgres" | "postgresql" => Ok(DatabaseTarget::Postgres(format!("postgresql://{}", rest))),
        "sqlite" => {
            let path = rest.strip_prefix('/').unwrap_or(rest);
            if path.is_empty() {
                return Err(Error::UnsupportedDatabase(connection.to_string()));
            }
            Ok(DatabaseTarget::Sqlite(cwd.resolve(path)))
        }
        _ => Err(Error::UnsupportedDatabase(connection.to_string())),
    }
}
