//! Log reader: reassembles logical records from physical fragments.
//!
//! ## State machine
//!
//! ```text
//! NotInRecord --Full--> (record)
//! NotInRecord --First--> InFragment --Middle*--> InFragment --Last--> (record)
//! ```
//!
//! Anything else is an illegal transition: the partial record is dropped,
//! the drop is reported, and reading continues with the next fragment.

use std::fs::File;
use std::path::Path;

use coding::decode_fixed32;
use tracing::debug;

use crate::checksum::{default_checksum, unmask, SharedChecksum};
use crate::file::SequentialFile;
use crate::format::{RecordType, BLOCK_SIZE, HEADER_SIZE};
use crate::reporter::{NoopReporter, Reporter};
use crate::WalError;

/// Outcome of decoding one physical record from the block buffer.
enum Physical {
    /// A fragment with a verified header; the payload is
    /// `backing_store[start..end]`.
    Fragment { kind: u8, start: usize, end: usize },
    /// No more data (clean EOF or a torn tail).
    Eof,
    /// Something was skipped: corruption (already reported), zero padding,
    /// or a record before the initial offset.
    BadRecord,
}

/// Reads logical records back from a log written by [`crate::LogWriter`].
///
/// The reader owns one block-sized buffer; the unread part of the current
/// block is `backing_store[buf_start..buf_end]`.
pub struct LogReader<F, R = NoopReporter> {
    file: F,
    reporter: R,
    checksum: SharedChecksum,
    verify_checksums: bool,

    backing_store: Vec<u8>,
    buf_start: usize,
    buf_end: usize,

    /// Last read returned fewer than `BLOCK_SIZE` bytes.
    eof: bool,

    /// Offset of the first byte past the data in `backing_store`.
    end_of_buffer_offset: u64,

    /// Offset of the start of the last record returned by `read_record`.
    last_record_offset: u64,

    /// Records starting before this offset are skipped silently.
    initial_offset: u64,

    /// Whether the initial block skip has been performed.
    positioned: bool,

    /// After skipping to `initial_offset`, drop `Middle`/`Last` fragments
    /// of a record that began before it.
    resyncing: bool,
}

impl<F: SequentialFile, R: Reporter> LogReader<F, R> {
    /// Creates a reader over `file`.
    ///
    /// * `reporter` - receives every detected corruption.
    /// * `verify_checksums` - compare stored checksums against the payload.
    /// * `initial_offset` - return only records that start at or after this
    ///   byte offset.
    pub fn new(file: F, reporter: R, verify_checksums: bool, initial_offset: u64) -> Self {
        Self {
            file,
            reporter,
            checksum: default_checksum(),
            verify_checksums,
            backing_store: vec![0u8; BLOCK_SIZE],
            buf_start: 0,
            buf_end: 0,
            eof: false,
            end_of_buffer_offset: 0,
            last_record_offset: 0,
            initial_offset,
            positioned: false,
            resyncing: initial_offset > 0,
        }
    }

    /// Replaces the checksum strategy.
    #[must_use]
    pub fn with_checksum(mut self, checksum: SharedChecksum) -> Self {
        self.checksum = checksum;
        self
    }

    /// Reads the next logical record into `record`.
    ///
    /// Returns `Ok(true)` with `record` filled in, or `Ok(false)` once the log
    /// is exhausted (clean EOF or a torn tail). `record` is overwritten, and
    /// also serves as the reassembly buffer for fragmented records.
    ///
    /// # Errors
    ///
    /// Only I/O errors from the underlying file. Corruption goes to the
    /// reporter.
    pub fn read_record(&mut self, record: &mut Vec<u8>) -> Result<bool, WalError> {
        if !self.positioned {
            self.positioned = true;
            if self.initial_offset > 0 {
                self.skip_to_initial_block()?;
            }
        }

        record.clear();
        let mut in_fragmented_record = false;
        // Offset of the first fragment of the record being assembled.
        let mut prospective_record_offset = 0u64;

        loop {
            let physical = self.read_physical_record()?;

            let (kind, start, end) = match physical {
                Physical::Fragment { kind, start, end } => (kind, start, end),
                Physical::Eof => {
                    if in_fragmented_record && !record.is_empty() {
                        // The writer died between two fragments of this
                        // record; report what we are dropping.
                        self.report_corruption(record.len(), "partial record without end(3)");
                    }
                    record.clear();
                    return Ok(false);
                }
                Physical::BadRecord => {
                    if in_fragmented_record {
                        self.report_corruption(record.len(), "error in middle of record");
                        in_fragmented_record = false;
                        record.clear();
                    }
                    continue;
                }
            };

            let fragment_len = end - start;
            let physical_record_offset = self.end_of_buffer_offset
                - self.buffered() as u64
                - HEADER_SIZE as u64
                - fragment_len as u64;

            let kind = RecordType::try_from(kind);

            if self.resyncing {
                match kind {
                    Ok(RecordType::Middle) => continue,
                    Ok(RecordType::Last) => {
                        self.resyncing = false;
                        continue;
                    }
                    _ => self.resyncing = false,
                }
            }

            match kind {
                Ok(RecordType::Full) => {
                    // An empty First at the tail of a block followed by a
                    // Full at the start of the next one was emitted by older
                    // writers; only a non-empty partial record is corruption.
                    if in_fragmented_record && !record.is_empty() {
                        self.report_corruption(record.len(), "partial record without end(1)");
                    }
                    record.clear();
                    record.extend_from_slice(&self.backing_store[start..end]);
                    self.last_record_offset = physical_record_offset;
                    return Ok(true);
                }
                Ok(RecordType::First) => {
                    if in_fragmented_record && !record.is_empty() {
                        self.report_corruption(record.len(), "partial record without end(2)");
                    }
                    prospective_record_offset = physical_record_offset;
                    record.clear();
                    record.extend_from_slice(&self.backing_store[start..end]);
                    in_fragmented_record = true;
                }
                Ok(RecordType::Middle) => {
                    if in_fragmented_record {
                        record.extend_from_slice(&self.backing_store[start..end]);
                    } else {
                        self.report_corruption(fragment_len, "missing start of fragmented record(1)");
                    }
                }
                Ok(RecordType::Last) => {
                    if in_fragmented_record {
                        record.extend_from_slice(&self.backing_store[start..end]);
                        self.last_record_offset = prospective_record_offset;
                        return Ok(true);
                    }
                    self.report_corruption(fragment_len, "missing start of fragmented record(2)");
                }
                Ok(RecordType::Zero) | Err(_) => {
                    let tag = match kind {
                        Ok(t) => t as u8,
                        Err(t) => t,
                    };
                    let dropped = fragment_len + if in_fragmented_record { record.len() } else { 0 };
                    self.report_corruption(dropped, &format!("unknown record type {}", tag));
                    in_fragmented_record = false;
                    record.clear();
                }
            }
        }
    }

    /// Iterator over the remaining logical records.
    pub fn records(&mut self) -> Records<'_, F, R> {
        Records { reader: self }
    }

    /// Offset of the start of the last record returned by
    /// [`LogReader::read_record`]. Undefined before the first record.
    #[must_use]
    pub fn last_record_offset(&self) -> u64 {
        self.last_record_offset
    }

    /// Clears the EOF flag so records appended after it was hit become
    /// visible. Used by readers tailing a log that is still being written.
    ///
    /// If EOF was hit in the middle of a block, the rest of that block is
    /// read now so the buffer stays block-aligned.
    pub fn unmark_eof(&mut self) -> Result<(), WalError> {
        if !self.eof {
            return Ok(());
        }
        self.eof = false;

        if self.buf_end == BLOCK_SIZE {
            return Ok(());
        }

        let filled = self.buf_end;
        let added = match read_fully(&mut self.file, &mut self.backing_store[filled..]) {
            Ok(n) => n,
            Err(e) => {
                self.eof = true;
                return Err(e.into());
            }
        };
        self.buf_end += added;
        self.end_of_buffer_offset += added as u64;
        if self.buf_end < BLOCK_SIZE {
            self.eof = true;
        }
        debug!(added, "resumed reading after eof");
        Ok(())
    }

    /// Borrows the reporter.
    pub fn reporter(&self) -> &R {
        &self.reporter
    }

    /// Consumes the reader, returning its reporter.
    pub fn into_reporter(self) -> R {
        self.reporter
    }

    fn buffered(&self) -> usize {
        self.buf_end - self.buf_start
    }

    fn skip_to_initial_block(&mut self) -> Result<(), WalError> {
        let offset_in_block = (self.initial_offset % BLOCK_SIZE as u64) as usize;
        let mut block_start_location = self.initial_offset - offset_in_block as u64;

        // Don't search a block if we'd be in the trailer.
        if offset_in_block > BLOCK_SIZE - 6 {
            block_start_location += BLOCK_SIZE as u64;
        }

        self.end_of_buffer_offset = block_start_location;

        if block_start_location > 0 {
            if let Err(e) = self.file.skip(block_start_location) {
                self.eof = true;
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn read_next_block(&mut self) -> Result<(), WalError> {
        self.buf_start = 0;
        self.buf_end = 0;
        match read_fully(&mut self.file, &mut self.backing_store[..]) {
            Ok(n) => {
                self.buf_end = n;
                self.end_of_buffer_offset += n as u64;
                if n < BLOCK_SIZE {
                    self.eof = true;
                }
                Ok(())
            }
            Err(e) => {
                self.eof = true;
                Err(e.into())
            }
        }
    }

    fn read_physical_record(&mut self) -> Result<Physical, WalError> {
        loop {
            if self.buffered() < HEADER_SIZE {
                if !self.eof {
                    // Last read was a full block; anything left is trailer.
                    self.read_next_block()?;
                    continue;
                }
                // A truncated header at EOF means the writer crashed while
                // writing it. Not corruption.
                return Ok(Physical::Eof);
            }

            let header = &self.backing_store[self.buf_start..self.buf_start + HEADER_SIZE];
            let stored_crc = decode_fixed32(header).unwrap_or_default();
            let length = usize::from(header[4]) | (usize::from(header[5]) << 8);
            let kind = header[6];

            if HEADER_SIZE + length > self.buffered() {
                if !self.eof {
                    let drop_size = self.buffered();
                    self.buf_start = self.buf_end;
                    self.report_corruption(drop_size, "bad record length");
                    return Ok(Physical::BadRecord);
                }
                // The writer died in the middle of the payload.
                return Ok(Physical::Eof);
            }

            if kind == RecordType::Zero as u8 && length == 0 {
                // Zero-filled space left by writers that pre-allocate the
                // file. Skip the header without reporting.
                self.buf_start += HEADER_SIZE;
                return Ok(Physical::BadRecord);
            }

            let start = self.buf_start + HEADER_SIZE;
            let end = start + length;

            if self.verify_checksums {
                let expected = unmask(stored_crc);
                // The checksum covers the type byte and the payload.
                let actual = self.checksum.value(&self.backing_store[start - 1..end]);
                if actual != expected {
                    // The length itself may be corrupt, so drop the rest of
                    // the block rather than trusting it to find the next record.
                    let drop_size = self.buffered();
                    self.buf_start = self.buf_end;
                    self.report_corruption(drop_size, "checksum mismatch");
                    return Ok(Physical::BadRecord);
                }
            }

            self.buf_start = end;

            let record_start =
                self.end_of_buffer_offset - self.buffered() as u64 - (HEADER_SIZE + length) as u64;
            if record_start < self.initial_offset {
                return Ok(Physical::BadRecord);
            }

            return Ok(Physical::Fragment { kind, start, end });
        }
    }

    /// Reports `bytes` dropped, unless they lie entirely before the initial
    /// offset the caller asked to skip.
    fn report_corruption(&mut self, bytes: usize, reason: &str) {
        let drop_start = self
            .end_of_buffer_offset
            .saturating_sub(self.buffered() as u64 + bytes as u64);
        if drop_start >= self.initial_offset {
            self.reporter.corruption(bytes, reason);
        }
    }
}

impl<R: Reporter> LogReader<File, R> {
    /// Opens the log at `path`, verifying checksums, starting at offset 0.
    pub fn open<P: AsRef<Path>>(path: P, reporter: R) -> Result<Self, WalError> {
        let file = File::open(path)?;
        Ok(Self::new(file, reporter, true, 0))
    }
}

/// Iterator returned by [`LogReader::records`].
pub struct Records<'a, F, R> {
    reader: &'a mut LogReader<F, R>,
}

impl<F: SequentialFile, R: Reporter> Iterator for Records<'_, F, R> {
    type Item = Result<Vec<u8>, WalError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut record = Vec::new();
        match self.reader.read_record(&mut record) {
            Ok(true) => Some(Ok(record)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Reads until `buf` is full or the file is exhausted.
fn read_fully<F: SequentialFile>(file: &mut F, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read_chunk(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
