//! # Version - MANIFEST and live-file bookkeeping
//!
//! Tracks which sorted table files are live, at which level, and the
//! global counters (next file number, last sequence, current WAL) that must
//! survive a crash.
//!
//! ## Durable state
//!
//! ```text
//! CURRENT            -> "MANIFEST-000007\n"
//! MANIFEST-000007    -> [snapshot edit][edit][edit]...   (wal log format)
//! ```
//!
//! Every change is a [`VersionEdit`] written as one record to the active
//! MANIFEST. On startup [`VersionSet::recover`] replays the edits in order
//! and folds them into [`LiveFiles`] and [`ManifestCounters`].
//!
//! ## Failure policy
//!
//! Unlike the WAL, the MANIFEST tolerates no corruption: any reported
//! framing problem or undecodable edit aborts recovery, since partial
//! metadata is unsafe to operate on.
//!
//! | Component         | Role                                           |
//! |-------------------|------------------------------------------------|
//! | [`VersionEdit`]   | Diff encode/decode                             |
//! | [`LiveFiles`]     | Per-level fold of added/deleted files          |
//! | [`filename`]      | File naming, parsing, and the CURRENT pointer  |
//! | [`VersionSet`]    | MANIFEST ownership, recovery, counters         |

mod edit;
pub mod filename;
mod live;
mod version_set;

pub use edit::{FileMetaData, NewFileFormat, VersionEdit};
pub use live::{LiveFiles, ManifestCounters};
pub use version_set::{ColumnFamily, VersionSet};

use thiserror::Error;

/// Number of levels a file can be placed at.
pub const NUM_LEVELS: usize = 7;

/// File numbers stay below this, so the counter can never wrap.
pub const MAX_FILE_NUMBER: u64 = u64::MAX >> 1;

/// Id of the column family every database starts with.
pub const DEFAULT_COLUMN_FAMILY_ID: u32 = 0;

/// Name of the default column family.
pub const DEFAULT_COLUMN_FAMILY_NAME: &str = "default";

/// A [`VersionEdit`] that could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// A field was truncated or out of range; names the field.
    #[error("VersionEdit: malformed {0}")]
    Field(&'static str),

    #[error("VersionEdit: unknown tag {0}")]
    UnknownTag(u32),

    /// Bytes left over that do not form a tag.
    #[error("VersionEdit: invalid tag")]
    InvalidTag,
}

#[cfg(test)]
mod tests;
