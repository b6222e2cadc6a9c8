//! # Config - database open options
//!
//! Every option can be set from the environment:
//!
//! ```text
//! BASALT_DB_DIR            database directory        (default: "data/basalt")
//! BASALT_CREATE_IF_MISSING create the db on open     (default: "true")
//! BASALT_ERROR_IF_EXISTS   fail if the db exists     (default: "false")
//! BASALT_PARANOID_CHECKS   fail on WAL corruption    (default: "false")
//! BASALT_VERIFY_CHECKSUMS  verify record checksums   (default: "true")
//! BASALT_WAL_SYNC          fsync every WAL append    (default: "true")
//! BASALT_COMPARATOR        comparator name           (default: "basalt.BytewiseComparator")
//! ```
//!
//! Values that do not parse fall back to the default.

use std::path::PathBuf;

pub const DEFAULT_DB_DIR: &str = "data/basalt";
pub const DEFAULT_COMPARATOR: &str = "basalt.BytewiseComparator";

/// Options for opening a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Directory holding the logs, MANIFEST and CURRENT.
    pub db_dir: PathBuf,
    /// Create a new database if `CURRENT` does not exist.
    pub create_if_missing: bool,
    /// Refuse to open an existing database.
    pub error_if_exists: bool,
    /// Treat any reported WAL corruption as fatal during recovery.
    ///
    /// When `false`, corrupted records are skipped and counted in the
    /// recovery stats.
    pub paranoid_checks: bool,
    /// Verify record checksums when replaying the WAL.
    pub verify_checksums: bool,
    /// `fsync` the WAL after every write.
    pub wal_sync: bool,
    /// Name stored in the MANIFEST; reopening with another name fails.
    pub comparator_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_dir: PathBuf::from(DEFAULT_DB_DIR),
            create_if_missing: true,
            error_if_exists: false,
            paranoid_checks: false,
            verify_checksums: true,
            wal_sync: true,
            comparator_name: DEFAULT_COMPARATOR.to_string(),
        }
    }
}

impl Config {
    /// Default options for the database in `db_dir`.
    pub fn new(db_dir: impl Into<PathBuf>) -> Self {
        Self {
            db_dir: db_dir.into(),
            ..Self::default()
        }
    }

    /// Reads options from `BASALT_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Config::from_env`], but reads variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let env_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let flag = |key: &str, default: bool| {
            env_or(key, if default { "true" } else { "false" })
                .parse()
                .unwrap_or(default)
        };

        Self {
            db_dir: PathBuf::from(env_or("BASALT_DB_DIR", DEFAULT_DB_DIR)),
            create_if_missing: flag("BASALT_CREATE_IF_MISSING", defaults.create_if_missing),
            error_if_exists: flag("BASALT_ERROR_IF_EXISTS", defaults.error_if_exists),
            paranoid_checks: flag("BASALT_PARANOID_CHECKS", defaults.paranoid_checks),
            verify_checksums: flag("BASALT_VERIFY_CHECKSUMS", defaults.verify_checksums),
            wal_sync: flag("BASALT_WAL_SYNC", defaults.wal_sync),
            comparator_name: env_or("BASALT_COMPARATOR", DEFAULT_COMPARATOR),
        }
    }
}
