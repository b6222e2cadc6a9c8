//! `VersionSet`: owner of the MANIFEST and the global counters.
//!
//! ## Lifecycle
//!
//! ```text
//! new() --create_new_db()--> (MANIFEST-000001, CURRENT)
//!   |
//!   +--recover()--> counters + live files from the MANIFEST named by CURRENT
//!                     |
//!                     +--log_and_apply(edit)--> first call starts a new MANIFEST
//!                                               with a full snapshot, then
//!                                               appends edits to it
//! ```
//!
//! File numbers are shared by logs, tables and manifests and only grow.
//! A new MANIFEST is only made visible by repointing `CURRENT` after the
//! snapshot and the first edit are durable.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, ensure, Context, Result};
use tracing::{debug, info, warn};
use wal::{CountingReporter, LogFile, LogReader, LogWriter};

use crate::edit::VersionEdit;
use crate::filename;
use crate::live::{LiveFiles, ManifestCounters};
use crate::{DEFAULT_COLUMN_FAMILY_ID, DEFAULT_COLUMN_FAMILY_NAME, MAX_FILE_NUMBER};

/// One column family: a name and its own live-file set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnFamily {
    id: u32,
    name: String,
    files: LiveFiles,
}

impl ColumnFamily {
    fn new(id: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            files: LiveFiles::new(),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn files(&self) -> &LiveFiles {
        &self.files
    }
}

/// Column families by id, plus ids dropped so far.
#[derive(Debug, Clone)]
struct Families {
    live: BTreeMap<u32, ColumnFamily>,
    dropped: BTreeSet<u32>,
}

impl Families {
    fn with_default() -> Self {
        let mut live = BTreeMap::new();
        live.insert(
            DEFAULT_COLUMN_FAMILY_ID,
            ColumnFamily::new(DEFAULT_COLUMN_FAMILY_ID, DEFAULT_COLUMN_FAMILY_NAME),
        );
        Self {
            live,
            dropped: BTreeSet::new(),
        }
    }

    /// Applies the column-family and file parts of `edit`.
    ///
    /// During replay, edits for a dropped column family are skipped.
    fn apply(&mut self, edit: &VersionEdit) -> Result<()> {
        let id = edit.column_family().unwrap_or(DEFAULT_COLUMN_FAMILY_ID);

        if let Some(name) = edit.column_family_add() {
            ensure!(
                !self.live.contains_key(&id) && !self.dropped.contains(&id),
                "column family {} already exists",
                id
            );
            self.live.insert(id, ColumnFamily::new(id, name));
        }

        if self.dropped.contains(&id) {
            return Ok(());
        }
        ensure!(
            self.live.contains_key(&id),
            "edit refers to unknown column family {}",
            id
        );

        if edit.is_column_family_drop() {
            ensure!(id != DEFAULT_COLUMN_FAMILY_ID, "cannot drop the default column family");
            self.live.remove(&id);
            self.dropped.insert(id);
            return Ok(());
        }

        if let Some(cf) = self.live.get_mut(&id) {
            cf.files.apply(edit);
        }
        Ok(())
    }
}

/// Owns the active MANIFEST and the state recovered from it.
pub struct VersionSet {
    dir: PathBuf,
    comparator_name: String,

    next_file_number: u64,
    manifest_file_number: u64,
    last_sequence: u64,
    log_number: u64,
    /// Log being compacted when the last edit was written; `0` if none.
    prev_log_number: u64,
    max_column_family: u32,

    families: Families,

    /// Open MANIFEST writer, `None` until the first `log_and_apply`.
    pub(crate) descriptor_log: Option<LogWriter<LogFile>>,
}

impl VersionSet {
    /// A version set for the database in `dir`. Call
    /// [`VersionSet::create_new_db`] and/or [`VersionSet::recover`] next.
    pub fn new(dir: impl Into<PathBuf>, comparator_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            comparator_name: comparator_name.into(),
            next_file_number: 2,
            manifest_file_number: 0,
            last_sequence: 0,
            log_number: 0,
            prev_log_number: 0,
            max_column_family: 0,
            families: Families::with_default(),
            descriptor_log: None,
        }
    }

    /// Writes `MANIFEST-000001` describing an empty database and points
    /// `CURRENT` at it.
    pub fn create_new_db(&self) -> Result<()> {
        let mut edit = VersionEdit::new();
        edit.set_comparator_name(self.comparator_name.as_str());
        edit.set_log_number(0);
        edit.set_next_file_number(2);
        edit.set_last_sequence(0);

        let manifest = filename::descriptor_file_name(&self.dir, 1);
        let result = write_manifest(&manifest, &[edit])
            .and_then(|()| filename::set_current_file(&self.dir, 1));
        if result.is_err() {
            let _ = fs::remove_file(&manifest);
        } else {
            info!(dir = %self.dir.display(), "created new database");
        }
        result
    }

    /// Rebuilds state from the MANIFEST named by `CURRENT`.
    ///
    /// Returns whether a new MANIFEST will be written; always `true`, the
    /// first [`VersionSet::log_and_apply`] starts one.
    ///
    /// # Errors
    ///
    /// Any corruption in the MANIFEST, an undecodable edit, a comparator
    /// mismatch, or missing counters.
    pub fn recover(&mut self) -> Result<bool> {
        let current = filename::read_current_file(&self.dir)?;
        let path = self.dir.join(&current);

        let mut reader = LogReader::open(&path, CountingReporter::new(current.as_str()))
            .with_context(|| format!("failed to open {}", path.display()))?;

        let mut counters = ManifestCounters::default();
        let mut families = Families::with_default();
        let mut record = Vec::new();
        let mut edits = 0usize;

        while reader
            .read_record(&mut record)
            .with_context(|| format!("failed to read {}", current))?
        {
            check_clean(reader.reporter(), &current)?;

            let edit = VersionEdit::decode(&record)
                .with_context(|| format!("edit #{} in {} is corrupted", edits, current))?;

            if let Some(name) = edit.comparator_name() {
                let cf = edit.column_family().unwrap_or(DEFAULT_COLUMN_FAMILY_ID);
                ensure!(
                    cf != DEFAULT_COLUMN_FAMILY_ID || name == self.comparator_name,
                    "{} does not match existing comparator {}",
                    name,
                    self.comparator_name
                );
            }

            families.apply(&edit)?;
            counters.fold(&edit);
            edits += 1;
        }
        check_clean(reader.reporter(), &current)?;

        let next_file = counters
            .next_file_number
            .ok_or_else(|| anyhow!("no meta-nextfile entry in descriptor"))?;
        let log_number = counters
            .log_number
            .ok_or_else(|| anyhow!("no meta-lognumber entry in descriptor"))?;
        let last_sequence = counters
            .last_sequence
            .ok_or_else(|| anyhow!("no last-sequence-number entry in descriptor"))?;
        let prev_log_number = counters.prev_log_number.unwrap_or(0);

        ensure!(
            next_file < MAX_FILE_NUMBER,
            "next file number {} out of range",
            next_file
        );
        self.next_file_number = next_file;
        self.mark_file_number_used(prev_log_number)?;
        self.mark_file_number_used(log_number)?;

        self.manifest_file_number = self.next_file_number;
        self.next_file_number += 1;
        self.last_sequence = last_sequence;
        self.log_number = log_number;
        self.prev_log_number = prev_log_number;

        let highest_cf = families.live.keys().chain(&families.dropped).copied().max();
        self.max_column_family = counters
            .max_column_family
            .unwrap_or(0)
            .max(highest_cf.unwrap_or(0));
        self.families = families;
        self.descriptor_log = None;

        info!(
            manifest = %current,
            edits,
            next_file = self.next_file_number,
            last_sequence,
            log_number,
            prev_log_number,
            "recovered version set"
        );
        Ok(true)
    }

    /// Makes `edit` durable in the MANIFEST and applies it.
    ///
    /// Counters the edit does not set are filled in from the current state;
    /// `next_file_number` and `last_sequence` are always overwritten. On
    /// error nothing is applied.
    pub fn log_and_apply(&mut self, edit: &mut VersionEdit) -> Result<()> {
        match edit.log_number() {
            Some(n) => ensure!(
                n >= self.log_number && n < self.next_file_number,
                "log number {} out of range [{}, {})",
                n,
                self.log_number,
                self.next_file_number
            ),
            None => edit.set_log_number(self.log_number),
        }
        if edit.prev_log_number().is_none() {
            edit.set_prev_log_number(self.prev_log_number);
        }
        if edit.column_family_add().is_some() {
            let id = edit.column_family().unwrap_or(DEFAULT_COLUMN_FAMILY_ID);
            if id > self.max_column_family {
                edit.set_max_column_family(id);
            }
        }
        edit.set_next_file_number(self.next_file_number);
        edit.set_last_sequence(self.last_sequence);

        let id = edit.column_family().unwrap_or(DEFAULT_COLUMN_FAMILY_ID);
        ensure!(
            !self.families.dropped.contains(&id),
            "column family {} has been dropped",
            id
        );

        let mut families = self.families.clone();
        families.apply(edit)?;

        let record = edit.encode();
        let new_manifest = if self.descriptor_log.is_none() {
            let path = filename::descriptor_file_name(&self.dir, self.manifest_file_number);
            let mut writer = LogWriter::create(&path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            if let Err(e) = self.write_snapshot(&mut writer) {
                drop(writer);
                let _ = fs::remove_file(&path);
                return Err(e);
            }
            self.descriptor_log = Some(writer);
            Some(path)
        } else {
            None
        };

        if let Err(e) = self.append_to_manifest(&record, new_manifest.is_some()) {
            // The manifest may end in a torn record now; never append to it again.
            self.descriptor_log = None;
            match &new_manifest {
                Some(path) => {
                    let _ = fs::remove_file(path);
                }
                None => {
                    self.manifest_file_number = self.new_file_number();
                    warn!(error = %e, "manifest append failed, next edit starts a new manifest");
                }
            }
            return Err(e);
        }

        if let Some(path) = &new_manifest {
            info!(manifest = %path.display(), "started new manifest");
        }
        debug!(edit = %edit, "applied version edit");

        self.families = families;
        if let Some(n) = edit.log_number() {
            self.log_number = n;
        }
        if let Some(n) = edit.prev_log_number() {
            self.prev_log_number = n;
        }
        if let Some(id) = edit.max_column_family() {
            self.max_column_family = self.max_column_family.max(id);
        }
        Ok(())
    }

    fn append_to_manifest(&mut self, record: &[u8], new_manifest: bool) -> Result<()> {
        let log = self
            .descriptor_log
            .as_mut()
            .context("no manifest is open")?;
        log.add_record(record).context("failed to append to manifest")?;
        log.sync().context("failed to sync manifest")?;
        if new_manifest {
            filename::set_current_file(&self.dir, self.manifest_file_number)?;
        }
        Ok(())
    }

    /// Writes one edit per column family recreating the current state.
    fn write_snapshot(&self, writer: &mut LogWriter<LogFile>) -> Result<()> {
        for cf in self.families.live.values() {
            let mut edit = VersionEdit::new();
            if cf.id == DEFAULT_COLUMN_FAMILY_ID {
                edit.set_comparator_name(self.comparator_name.as_str());
                if self.max_column_family > 0 {
                    edit.set_max_column_family(self.max_column_family);
                }
            } else {
                edit.set_column_family(cf.id);
                edit.add_column_family(cf.name.as_str());
            }
            cf.files.add_all_to(&mut edit);
            writer
                .add_record(&edit.encode())
                .context("failed to write manifest snapshot")?;
        }
        Ok(())
    }

    // -------------------- Counters --------------------

    /// Allocates a new file number.
    pub fn new_file_number(&mut self) -> u64 {
        let n = self.next_file_number;
        self.next_file_number += 1;
        n
    }

    /// Returns `number` to the pool if it was the last one allocated.
    pub fn reuse_file_number(&mut self, number: u64) {
        if number.checked_add(1) == Some(self.next_file_number) {
            self.next_file_number = number;
        }
    }

    /// Ensures `number` is never handed out again.
    ///
    /// # Errors
    ///
    /// `number` is not below [`MAX_FILE_NUMBER`].
    pub fn mark_file_number_used(&mut self, number: u64) -> Result<()> {
        ensure!(
            number < MAX_FILE_NUMBER,
            "file number {} out of range (must be below {})",
            number,
            MAX_FILE_NUMBER
        );
        if self.next_file_number <= number {
            self.next_file_number = number + 1;
        }
        Ok(())
    }

    #[must_use]
    pub fn next_file_number(&self) -> u64 {
        self.next_file_number
    }

    #[must_use]
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    /// # Panics
    ///
    /// In debug builds, if `sequence` moves backwards.
    pub fn set_last_sequence(&mut self, sequence: u64) {
        debug_assert!(sequence >= self.last_sequence);
        self.last_sequence = sequence;
    }

    #[must_use]
    pub fn log_number(&self) -> u64 {
        self.log_number
    }

    #[must_use]
    pub fn prev_log_number(&self) -> u64 {
        self.prev_log_number
    }

    #[must_use]
    pub fn manifest_file_number(&self) -> u64 {
        self.manifest_file_number
    }

    #[must_use]
    pub fn max_column_family(&self) -> u32 {
        self.max_column_family
    }

    // -------------------- Inspection --------------------

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn comparator_name(&self) -> &str {
        &self.comparator_name
    }

    /// Live column families, id to name.
    pub fn column_families(&self) -> BTreeMap<u32, String> {
        self.families
            .live
            .values()
            .map(|cf| (cf.id, cf.name.clone()))
            .collect()
    }

    /// Column family `id`, if it exists.
    pub fn column_family(&self, id: u32) -> Option<&ColumnFamily> {
        self.families.live.get(&id)
    }

    /// Live files of column family `id`.
    pub fn current(&self, id: u32) -> Option<&LiveFiles> {
        self.families.live.get(&id).map(|cf| &cf.files)
    }

    /// Numbers of every file live in any column family.
    pub fn live_files(&self) -> BTreeSet<u64> {
        self.families
            .live
            .values()
            .flat_map(|cf| cf.files.numbers())
            .collect()
    }

    /// Number of files at `level` in the default column family.
    #[must_use]
    pub fn num_level_files(&self, level: usize) -> usize {
        self.current(DEFAULT_COLUMN_FAMILY_ID)
            .map_or(0, |files| files.num_level_files(level))
    }
}

impl fmt::Debug for VersionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VersionSet")
            .field("dir", &self.dir)
            .field("comparator", &self.comparator_name)
            .field("next_file_number", &self.next_file_number)
            .field("manifest_file_number", &self.manifest_file_number)
            .field("last_sequence", &self.last_sequence)
            .field("log_number", &self.log_number)
            .field("prev_log_number", &self.prev_log_number)
            .field("column_families", &self.families.live.len())
            .field("manifest_open", &self.descriptor_log.is_some())
            .finish()
    }
}

/// Fails if any corruption has been reported.
fn check_clean(reporter: &CountingReporter, name: &str) -> Result<()> {
    if let Some(reason) = reporter.first_reason() {
        bail!(
            "corrupted manifest {}: {} ({} bytes dropped)",
            name,
            reason,
            reporter.dropped_bytes()
        );
    }
    Ok(())
}

/// Writes `edits` as a complete, synced MANIFEST at `path`.
fn write_manifest(path: &Path, edits: &[VersionEdit]) -> Result<()> {
    let mut writer =
        LogWriter::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    for edit in edits {
        writer.add_record(&edit.encode())?;
    }
    writer.sync()?;
    Ok(())
}
