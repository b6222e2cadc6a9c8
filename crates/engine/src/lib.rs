//! # Engine - Basalt database core
//!
//! Ties the [`wal`] log format and the [`version`] manifest together into the
//! durable core of an LSM store: a write-ahead log that every batch goes
//! through, and a version set recording which logs and tables are live.
//!
//! The memtable is not part of this crate. Callers own it and receive
//! recovered writes through a [`BatchHandler`] on open.
//!
//! ## Directory layout
//!
//! ```text
//! <db_dir>/
//!   CURRENT            -> "MANIFEST-000005\n"
//!   MANIFEST-000005    version edits (log format, one edit per record)
//!   000004.log         WAL being replayed / still unflushed
//!   000006.log         active WAL
//!   000003.sst         tables added by the caller via log_and_apply
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                            |
//! |----------------|----------------------------------------------------|
//! | `lib.rs`       | `Engine` struct, open, accessors, `Debug`          |
//! | [`batch`]      | `WriteBatch` encoding and `BatchHandler`           |
//! | [`recovery`]   | WAL replay on open, `RecoveryStats`                |
//! | `write`        | `write()`, `rotate_wal()`, manifest passthrough    |
//! | `obsolete`     | `remove_obsolete_files()`                          |
//!
//! ## Crash Safety
//!
//! A batch is acknowledged only after its WAL record is written (and synced
//! when `wal_sync` is set). Logs are deleted only once the manifest's
//! `log_number` has moved past them, which the caller does after persisting
//! the corresponding memtable. `CURRENT` is replaced atomically.
pub mod batch;
mod obsolete;
pub mod recovery;
mod write;

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use config::Config;
use tracing::info;
use version::{filename, VersionEdit, VersionSet};
use wal::{LogFile, LogWriter};

pub use batch::{BatchHandler, WriteBatch, BATCH_HEADER_SIZE};
pub use recovery::RecoveryStats;

/// The durable core of the database: active WAL plus version set.
///
/// # Open
///
/// 1. Create the database if `CURRENT` is missing (and allowed).
/// 2. Recover the version set from the manifest.
/// 3. Replay unflushed logs into the caller's handler.
/// 4. Start a fresh WAL and a fresh manifest.
/// 5. Delete files nothing references anymore.
///
/// # Write Path
///
/// [`Engine::write`] stamps the batch with the next sequence numbers and
/// appends it to the active WAL. After a failed append or sync every later
/// write and rotation fails until the database is reopened.
pub struct Engine {
    pub(crate) config: Config,
    pub(crate) versions: VersionSet,
    pub(crate) wal: LogWriter<LogFile>,
    pub(crate) wal_number: u64,
    pub(crate) recovery: RecoveryStats,
    /// First WAL failure; sticky.
    pub(crate) wal_error: Option<String>,
    /// Numbers handed out by `new_file_number` whose table is not in the
    /// manifest yet. Cleanup leaves their files alone.
    pub(crate) pending_outputs: BTreeSet<u64>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("db_dir", &self.config.db_dir)
            .field("last_sequence", &self.versions.last_sequence())
            .field("wal_number", &self.wal_number)
            .field("wal_offset", &self.wal.offset())
            .field("log_number", &self.versions.log_number())
            .field("manifest", &self.versions.manifest_file_number())
            .field("wal_sync", &self.config.wal_sync)
            .field("wal_error", &self.wal_error)
            .field("pending_outputs", &self.pending_outputs.len())
            .finish()
    }
}

impl Engine {
    /// Opens (or creates) the database described by `config`, replaying
    /// unflushed writes into `handler`.
    ///
    /// # Errors
    ///
    /// * the directory has no database and `create_if_missing` is off, or
    ///   has one and `error_if_exists` is on;
    /// * the manifest is corrupt or was written with another comparator;
    /// * with `paranoid_checks`, any corruption in a replayed log.
    pub fn open<H: BatchHandler>(config: Config, handler: &mut H) -> Result<Self> {
        let dir = config.db_dir.clone();
        let current = filename::current_file_name(&dir);

        let mut versions = VersionSet::new(&dir, config.comparator_name.as_str());

        if current.exists() {
            if config.error_if_exists {
                bail!("{} exists (error_if_exists is true)", dir.display());
            }
        } else if config.create_if_missing {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
            versions.create_new_db()?;
        } else {
            bail!("{} does not exist (create_if_missing is false)", dir.display());
        }

        versions
            .recover()
            .with_context(|| format!("failed to recover {}", dir.display()))?;

        let (logs, stats) = recovery::replay_logs(
            &dir,
            versions.log_number(),
            versions.prev_log_number(),
            config.verify_checksums,
            config.paranoid_checks,
            handler,
        )?;
        for &number in &logs {
            versions.mark_file_number_used(number)?;
        }
        if stats.max_sequence > versions.last_sequence() {
            versions.set_last_sequence(stats.max_sequence);
        }

        let (wal_number, wal) = Self::new_wal(&mut versions)?;

        // The replayed logs stay live until the caller flushes what they
        // hold, so log_number is left alone here.
        let mut edit = VersionEdit::new();
        if let Err(e) = versions.log_and_apply(&mut edit) {
            drop(wal);
            let _ = fs::remove_file(filename::log_file_name(&dir, wal_number));
            return Err(e);
        }

        info!(
            dir = %dir.display(),
            wal = wal_number,
            last_sequence = versions.last_sequence(),
            logs_replayed = stats.logs_replayed,
            "database opened"
        );

        let mut engine = Self {
            config,
            versions,
            wal,
            wal_number,
            recovery: stats,
            wal_error: None,
            pending_outputs: BTreeSet::new(),
        };
        engine.remove_obsolete_files()?;
        Ok(engine)
    }

    /// Allocates a number and creates an empty log file for it.
    pub(crate) fn new_wal(versions: &mut VersionSet) -> Result<(u64, LogWriter<LogFile>)> {
        let number = versions.new_file_number();
        let path = filename::log_file_name(versions.dir(), number);
        match LogWriter::create(&path) {
            Ok(wal) => Ok((number, wal)),
            Err(e) => {
                versions.reuse_file_number(number);
                Err(anyhow::Error::new(e).context(format!("failed to create {}", path.display())))
            }
        }
    }

    /// Sequence number of the most recent write.
    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.versions.last_sequence()
    }

    /// Number of the active WAL.
    #[must_use]
    pub fn wal_number(&self) -> u64 {
        self.wal_number
    }

    /// The failure that stopped the write path, if any.
    #[must_use]
    pub fn wal_error(&self) -> Option<&str> {
        self.wal_error.as_deref()
    }

    /// What the replay on open found.
    #[must_use]
    pub fn recovery_stats(&self) -> RecoveryStats {
        self.recovery
    }

    pub fn versions(&self) -> &VersionSet {
        &self.versions
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn dir(&self) -> &Path {
        &self.config.db_dir
    }
}

#[cfg(test)]
mod tests;
