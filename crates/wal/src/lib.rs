//! # WAL - block-framed record log
//!
//! Append-only log format shared by the write-ahead log (`NNNNNN.log`) and
//! the MANIFEST (`MANIFEST-NNNNNN`). Callers hand [`LogWriter`] opaque
//! logical records; [`LogReader`] gives them back in the same order, and
//! survives a torn tail left by a crash mid-append.
//!
//! ## Physical layout
//!
//! The file is a sequence of 32 KiB blocks. Each block holds whole physical
//! records; a record that does not fit is split into fragments.
//!
//! ```text
//! block   := record* trailer?
//! record  := checksum: u32 LE | length: u16 LE | type: u8 | payload[length]
//! trailer := 0..6 zero bytes (too small for a header, never parsed)
//!
//! checksum := mask(crc32c(type ++ payload))
//! type     := 1 Full | 2 First | 3 Middle | 4 Last   (0 is reserved)
//! ```
//!
//! A logical record is either one `Full` fragment, or `First`, any number of
//! `Middle`, and one `Last`. A zero-length logical record is still written as
//! one `Full` fragment so it can be told apart from no record at all.
//!
//! ## Corruption
//!
//! The reader never decides whether corruption is fatal. Dropped bytes are
//! reported through a [`Reporter`]; a torn tail at EOF, zero-filled
//! pre-allocated space and records before the requested start offset are
//! skipped without a report.
//!
//! ## Example
//!
//! ```rust,no_run
//! use wal::{CountingReporter, LogReader, LogWriter};
//!
//! let mut w = LogWriter::create("000003.log").unwrap();
//! w.add_record(b"hello").unwrap();
//! w.sync().unwrap();
//! drop(w);
//!
//! let mut r = LogReader::open("000003.log", CountingReporter::default()).unwrap();
//! let mut record = Vec::new();
//! while r.read_record(&mut record).unwrap() {
//!     println!("{:?}", record);
//! }
//! assert_eq!(r.reporter().events(), 0);
//! ```

mod checksum;
mod file;
mod format;
mod reader;
mod reporter;
mod writer;

pub use checksum::{default_checksum, mask, unmask, Checksum, Crc32c, SharedChecksum};
pub use file::{LogFile, SequentialFile, WritableFile};
pub use format::{RecordType, BLOCK_SIZE, HEADER_SIZE, MAX_FRAGMENT_LEN};
pub use reader::{LogReader, Records};
pub use reporter::{CountingReporter, NoopReporter, Reporter};
pub use writer::LogWriter;

use std::io;
use thiserror::Error;

/// Errors returned by log reads and writes.
///
/// Corruption is not an error at this layer; it is handed to the
/// [`Reporter`] and reading continues.
#[derive(Debug, Error)]
pub enum WalError {
    /// An underlying I/O error. Never retried.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// An earlier append failed part-way, so the file no longer ends where
    /// the writer's framing expects. The writer must be replaced.
    #[error("log writer is unusable after an earlier write error")]
    Poisoned,
}

#[cfg(test)]
mod tests;
