/// Write path: `write()`, `rotate_wal()`, and the manifest passthroughs.
///
/// Every batch is stamped with consecutive sequence numbers and appended to
/// the active WAL as a single log record. Applying it to a memtable is the
/// caller's job once `write` returns.
use anyhow::{anyhow, bail, Context, Result};
use tracing::{debug, error, info};
use version::VersionEdit;

use crate::{Engine, WriteBatch};

impl Engine {
    /// Appends `batch` to the WAL.
    ///
    /// On success the batch's sequence is set to the number assigned to its
    /// first entry. An empty batch is a no-op.
    ///
    /// # Errors
    ///
    /// A failed append or sync. The record may still have reached the log,
    /// so its sequence numbers are consumed anyway, and the engine refuses
    /// every later write with the same error.
    pub fn write(&mut self, batch: &mut WriteBatch) -> Result<()> {
        self.check_wal()?;
        if batch.is_empty() {
            return Ok(());
        }

        let first = self
            .versions
            .last_sequence()
            .checked_add(1)
            .ok_or_else(|| anyhow!("sequence number overflow (u64::MAX reached)"))?;
        let last = first
            .checked_add(u64::from(batch.count()) - 1)
            .ok_or_else(|| anyhow!("sequence number overflow (u64::MAX reached)"))?;
        batch.set_sequence(first);

        let result = self.append_batch(batch);
        self.versions.set_last_sequence(last);
        if let Err(e) = result {
            let message = format!("{:#}", e);
            error!(wal = self.wal_number, error = %message, "WAL write failed; writes are stopped");
            self.wal_error = Some(message);
            return Err(e);
        }

        debug!(seq = first, count = batch.count(), "batch written");
        Ok(())
    }

    fn append_batch(&mut self, batch: &WriteBatch) -> Result<()> {
        self.wal
            .add_record(batch.contents())
            .with_context(|| format!("failed to append to log {}", self.wal_number))?;
        if self.config.wal_sync {
            self.wal
                .sync()
                .with_context(|| format!("failed to sync log {}", self.wal_number))?;
        }
        Ok(())
    }

    fn check_wal(&self) -> Result<()> {
        match &self.wal_error {
            Some(e) => bail!("writes stopped after an earlier WAL failure: {}", e),
            None => Ok(()),
        }
    }

    /// Starts a new WAL and returns its number.
    ///
    /// The previous log stays live. Once the writes it holds have been
    /// persisted elsewhere, record that with an edit whose `log_number` is
    /// the returned number.
    pub fn rotate_wal(&mut self) -> Result<u64> {
        self.check_wal()?;
        self.wal.sync().context("failed to sync log before rotation")?;
        let (number, wal) = Self::new_wal(&mut self.versions)?;
        let old = std::mem::replace(&mut self.wal_number, number);
        self.wal = wal;
        info!(old, new = number, "rotated WAL");
        Ok(number)
    }

    /// Durably records `edit` in the manifest. See
    /// [`version::VersionSet::log_and_apply`].
    ///
    /// Tables the edit adds are no longer pending once it is applied.
    pub fn log_and_apply(&mut self, edit: &mut VersionEdit) -> Result<()> {
        self.versions.log_and_apply(edit)?;
        for (_, file) in edit.new_files() {
            self.pending_outputs.remove(&file.number);
        }
        Ok(())
    }

    /// Allocates a file number, e.g. for a table about to be written.
    ///
    /// The number stays pending, and [`Engine::remove_obsolete_files`] keeps
    /// its files, until an edit adding it is applied or it is released.
    pub fn new_file_number(&mut self) -> u64 {
        let number = self.versions.new_file_number();
        self.pending_outputs.insert(number);
        number
    }

    /// Gives up on a number from [`Engine::new_file_number`] that will never
    /// be added, so cleanup may delete whatever was written under it.
    pub fn release_file_number(&mut self, number: u64) {
        self.pending_outputs.remove(&number);
    }

    /// Ensures `number`, chosen outside the engine, is never allocated.
    pub fn mark_file_number_used(&mut self, number: u64) -> Result<()> {
        self.versions.mark_file_number_used(number)
    }
}
