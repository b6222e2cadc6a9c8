//! Folding edits into the live-file set and the manifest counters.

use std::collections::{BTreeMap, BTreeSet};

use crate::edit::{FileMetaData, VersionEdit};
use crate::NUM_LEVELS;

/// Files live at each level, keyed by file number.
///
/// Built by applying edits in MANIFEST order. Within one edit deletions are
/// applied before additions, so an edit that moves a file between levels
/// (delete at L, add at L+1) works as expected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveFiles {
    levels: [BTreeMap<u64, FileMetaData>; NUM_LEVELS],
}

impl LiveFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds every edit of `edits`, in order, into an empty set.
    pub fn from_edits<'a>(edits: impl IntoIterator<Item = &'a VersionEdit>) -> Self {
        let mut live = Self::new();
        for edit in edits {
            live.apply(edit);
        }
        live
    }

    /// Applies one edit. Deleting a file that is not live is a no-op.
    pub fn apply(&mut self, edit: &VersionEdit) {
        for &(level, number) in edit.deleted_files() {
            self.levels[level as usize].remove(&number);
        }
        for (level, file) in edit.new_files() {
            self.levels[*level as usize].insert(file.number, file.clone());
        }
    }

    /// Files at `level`, ordered by file number.
    ///
    /// # Panics
    ///
    /// If `level >= NUM_LEVELS`.
    pub fn level(&self, level: usize) -> &BTreeMap<u64, FileMetaData> {
        &self.levels[level]
    }

    #[must_use]
    pub fn num_level_files(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, BTreeMap::len)
    }

    /// Whether file `number` is live at `level`.
    #[must_use]
    pub fn contains(&self, level: u32, number: u64) -> bool {
        self.levels
            .get(level as usize)
            .map_or(false, |files| files.contains_key(&number))
    }

    /// Total number of live files across all levels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.levels.iter().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(BTreeMap::is_empty)
    }

    /// Every live file with its level, level by level.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &FileMetaData)> + '_ {
        self.levels
            .iter()
            .enumerate()
            .flat_map(|(level, files)| files.values().map(move |f| (level as u32, f)))
    }

    /// Numbers of all live files.
    pub fn numbers(&self) -> BTreeSet<u64> {
        self.iter().map(|(_, f)| f.number).collect()
    }

    /// Sum of the sizes of the files at `level`.
    #[must_use]
    pub fn level_bytes(&self, level: usize) -> u64 {
        self.levels
            .get(level)
            .map_or(0, |files| files.values().map(|f| f.file_size).sum())
    }

    /// Adds every live file to `edit`, producing a snapshot that rebuilds
    /// this set from scratch.
    pub fn add_all_to(&self, edit: &mut VersionEdit) {
        for (level, file) in self.iter() {
            edit.add_file(level, file.clone());
        }
    }
}

/// Scalar state accumulated from edits; later values override earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestCounters {
    pub comparator_name: Option<String>,
    pub log_number: Option<u64>,
    pub prev_log_number: Option<u64>,
    pub next_file_number: Option<u64>,
    pub last_sequence: Option<u64>,
    pub max_column_family: Option<u32>,
}

impl ManifestCounters {
    /// Overrides every field present in `edit`.
    pub fn fold(&mut self, edit: &VersionEdit) {
        if let Some(name) = edit.comparator_name() {
            self.comparator_name = Some(name.to_string());
        }
        if let Some(n) = edit.log_number() {
            self.log_number = Some(n);
        }
        if let Some(n) = edit.prev_log_number() {
            self.prev_log_number = Some(n);
        }
        if let Some(n) = edit.next_file_number() {
            self.next_file_number = Some(n);
        }
        if let Some(s) = edit.last_sequence() {
            self.last_sequence = Some(s);
        }
        if let Some(id) = edit.max_column_family() {
            self.max_column_family = Some(id);
        }
    }
}
