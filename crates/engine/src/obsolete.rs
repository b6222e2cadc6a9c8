/// Garbage collection of files the version set no longer references.
use std::fs;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use version::filename::{self, FileType};

use crate::Engine;

impl Engine {
    /// Deletes every file in the database directory that is no longer needed:
    ///
    /// * logs older than `log_number`, except `prev_log_number`;
    /// * manifests other than the active one;
    /// * tables not live in any column family;
    /// * leftover temp files.
    ///
    /// Tables and temp files numbered by a still pending
    /// [`Engine::new_file_number`] are kept.
    ///
    /// Unknown files, `CURRENT` and `LOCK` are never touched. Returns the
    /// number of files removed; a file that cannot be removed is logged and
    /// skipped.
    pub fn remove_obsolete_files(&mut self) -> Result<usize> {
        let dir = self.config.db_dir.clone();
        let live = self.versions.live_files();
        let log_number = self.versions.log_number();
        let prev_log_number = self.versions.prev_log_number();
        let manifest_number = self.versions.manifest_file_number();

        let mut removed = 0usize;
        for entry in fs::read_dir(&dir).with_context(|| format!("failed to list {}", dir.display()))? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some((number, kind)) = filename::parse_file_name(name) else {
                continue;
            };

            let keep = match kind {
                FileType::Log => {
                    number >= log_number || number == prev_log_number || number == self.wal_number
                }
                FileType::Descriptor => number >= manifest_number,
                FileType::Table => {
                    live.contains(&number) || self.pending_outputs.contains(&number)
                }
                FileType::Temp => self.pending_outputs.contains(&number),
                FileType::Current | FileType::DbLock => true,
            };
            if keep {
                continue;
            }

            match fs::remove_file(entry.path()) {
                Ok(()) => {
                    debug!(file = name, ?kind, "removed obsolete file");
                    removed += 1;
                }
                Err(e) => warn!(file = name, error = %e, "failed to remove obsolete file"),
            }
        }

        if removed > 0 {
            info!(removed, "removed obsolete files");
        }
        Ok(removed)
    }
}
