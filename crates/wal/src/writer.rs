//! Log writer: fragments logical records into 32 KiB blocks.

use std::path::Path;

use tracing::debug;

use crate::checksum::{default_checksum, mask, SharedChecksum};
use crate::file::{LogFile, WritableFile};
use crate::format::{RecordType, BLOCK_SIZE, HEADER_SIZE};
use crate::WalError;

/// Zero bytes used to pad the tail of a block that cannot hold a header.
const TRAILER: [u8; HEADER_SIZE - 1] = [0u8; HEADER_SIZE - 1];

/// Appends logical records to a single log file.
///
/// Not safe for concurrent use; exactly one writer appends to a given file.
/// Every physical record is followed by a `flush`; durability requires an
/// explicit [`LogWriter::sync`].
pub struct LogWriter<W: WritableFile> {
    dest: W,
    /// Bytes already used in the current block, at most `BLOCK_SIZE`.
    block_offset: usize,
    /// Total file length, including whatever existed before we opened it.
    offset: u64,
    checksum: SharedChecksum,
    /// Checksum of each type byte, so a record's CRC only extends over the payload.
    type_crc: [u32; RecordType::ALL.len()],
    /// Set when an append fails; `block_offset` may no longer match the file.
    poisoned: bool,
}

impl<W: WritableFile> LogWriter<W> {
    /// Creates a writer that appends to the empty file `dest`.
    pub fn new(dest: W) -> Self {
        Self::with_length(dest, 0)
    }

    /// Creates a writer for a file that already holds `dest_length` bytes.
    ///
    /// New records continue inside the partially filled last block.
    pub fn with_length(dest: W, dest_length: u64) -> Self {
        let checksum = default_checksum();
        let type_crc = type_crcs(&checksum);
        Self {
            dest,
            block_offset: (dest_length % BLOCK_SIZE as u64) as usize,
            offset: dest_length,
            checksum,
            type_crc,
            poisoned: false,
        }
    }

    /// Replaces the checksum strategy.
    #[must_use]
    pub fn with_checksum(mut self, checksum: SharedChecksum) -> Self {
        self.type_crc = type_crcs(&checksum);
        self.checksum = checksum;
        self
    }

    /// Appends one logical record.
    ///
    /// The record is split into as many physical records as needed. An empty
    /// `record` still produces a single zero-length `Full` record.
    ///
    /// # Errors
    ///
    /// Any destination error aborts the record and is returned as-is. The
    /// file may then end in a partial record, which readers treat as a torn
    /// tail, and every later call fails with [`WalError::Poisoned`].
    pub fn add_record(&mut self, record: &[u8]) -> Result<(), WalError> {
        if self.poisoned {
            return Err(WalError::Poisoned);
        }
        let result = self.write_fragments(record);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn write_fragments(&mut self, record: &[u8]) -> Result<(), WalError> {
        let mut left = record;
        let mut begin = true;

        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                // Switch to a new block, padding the trailer with zeroes.
                if leftover > 0 {
                    self.dest.append(&TRAILER[..leftover])?;
                    self.offset += leftover as u64;
                }
                self.block_offset = 0;
            }

            let avail = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_length = left.len().min(avail);
            let end = fragment_length == left.len();

            let kind = match (begin, end) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, true) => RecordType::Last,
                (false, false) => RecordType::Middle,
            };

            let (fragment, rest) = left.split_at(fragment_length);
            self.emit_physical_record(kind, fragment)?;
            left = rest;
            begin = false;

            if end {
                return Ok(());
            }
        }
    }

    fn emit_physical_record(&mut self, kind: RecordType, fragment: &[u8]) -> Result<(), WalError> {
        let length = fragment.len();
        debug_assert!(length <= 0xffff);
        debug_assert!(self.block_offset + HEADER_SIZE + length <= BLOCK_SIZE);

        let crc = self.checksum.extend(self.type_crc[kind as usize], fragment);

        let mut header = [0u8; HEADER_SIZE];
        header[..4].copy_from_slice(&mask(crc).to_le_bytes());
        header[4..6].copy_from_slice(&(length as u16).to_le_bytes());
        header[6] = kind as u8;

        self.dest.append(&header)?;
        self.dest.append(fragment)?;
        self.dest.flush()?;

        self.block_offset += HEADER_SIZE + length;
        self.offset += (HEADER_SIZE + length) as u64;
        Ok(())
    }

    /// Makes every record appended so far durable.
    pub fn sync(&mut self) -> Result<(), WalError> {
        self.dest.sync()?;
        Ok(())
    }

    /// Whether an earlier append failed. A poisoned writer accepts no records.
    #[must_use]
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Current length of the log file in bytes.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes used in the current block.
    #[must_use]
    pub fn block_offset(&self) -> usize {
        self.block_offset
    }

    /// Borrows the destination.
    pub fn get_ref(&self) -> &W {
        &self.dest
    }

    /// Consumes the writer, returning the destination.
    pub fn into_inner(self) -> W {
        self.dest
    }
}

impl LogWriter<LogFile> {
    /// Creates (or truncates) a log file at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        let file = LogFile::create(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "created log file");
        Ok(Self::new(file))
    }

    /// Opens an existing log file at `path` and continues appending to it.
    pub fn open_append<P: AsRef<Path>>(path: P) -> Result<Self, WalError> {
        let (file, len) = LogFile::open_append(path.as_ref())?;
        debug!(path = %path.as_ref().display(), len, "reopened log file for append");
        Ok(Self::with_length(file, len))
    }
}

fn type_crcs(checksum: &SharedChecksum) -> [u32; RecordType::ALL.len()] {
    let mut out = [0u32; RecordType::ALL.len()];
    for kind in RecordType::ALL {
        out[kind as usize] = checksum.value(&[kind as u8]);
    }
    out
}
