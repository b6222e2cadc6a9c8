/// Write batches: the payload of every WAL record.
///
/// ```text
/// +-----------+---------+-----------------------------------------+
/// | seq (u64) | count   | entries...                              |
/// | fixed64   | fixed32 | 1 key value  (put, length-prefixed)     |
/// |           |         | 0 key        (delete, length-prefixed)  |
/// +-----------+---------+-----------------------------------------+
/// ```
///
/// Entry `i` of a batch with sequence `s` is assigned sequence `s + i`.
use anyhow::{bail, ensure, Result};

/// Size of the sequence + count header.
pub const BATCH_HEADER_SIZE: usize = 12;

const TAG_DELETE: u8 = 0;
const TAG_PUT: u8 = 1;

/// Receives the entries of a batch in order.
pub trait BatchHandler {
    fn put(&mut self, seq: u64, key: &[u8], value: &[u8]);
    fn delete(&mut self, seq: u64, key: &[u8]);
}

impl<H: BatchHandler + ?Sized> BatchHandler for &mut H {
    fn put(&mut self, seq: u64, key: &[u8], value: &[u8]) {
        (**self).put(seq, key, value)
    }

    fn delete(&mut self, seq: u64, key: &[u8]) {
        (**self).delete(seq, key)
    }
}

/// An ordered group of puts and deletes applied atomically.
#[derive(Clone, PartialEq, Eq)]
pub struct WriteBatch {
    rep: Vec<u8>,
}

impl Default for WriteBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WriteBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBatch")
            .field("sequence", &self.sequence())
            .field("count", &self.count())
            .field("bytes", &self.rep.len())
            .finish()
    }
}

impl WriteBatch {
    pub fn new() -> Self {
        Self {
            rep: vec![0; BATCH_HEADER_SIZE],
        }
    }

    /// Wraps the raw contents of a WAL record.
    ///
    /// Only the header is checked here; entries are validated by
    /// [`WriteBatch::iterate`].
    pub fn from_contents(contents: Vec<u8>) -> Result<Self> {
        ensure!(
            contents.len() >= BATCH_HEADER_SIZE,
            "log record too small: {} bytes",
            contents.len()
        );
        Ok(Self { rep: contents })
    }

    pub fn put(&mut self, key: &[u8], value: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(TAG_PUT);
        coding::put_length_prefixed_slice(&mut self.rep, key);
        coding::put_length_prefixed_slice(&mut self.rep, value);
    }

    pub fn delete(&mut self, key: &[u8]) {
        self.set_count(self.count() + 1);
        self.rep.push(TAG_DELETE);
        coding::put_length_prefixed_slice(&mut self.rep, key);
    }

    /// Drops every entry and resets the sequence to 0.
    pub fn clear(&mut self) {
        self.rep.clear();
        self.rep.resize(BATCH_HEADER_SIZE, 0);
    }

    #[must_use]
    pub fn count(&self) -> u32 {
        coding::decode_fixed32(&self.rep[8..]).unwrap_or(0)
    }

    fn set_count(&mut self, count: u32) {
        self.rep[8..BATCH_HEADER_SIZE].copy_from_slice(&count.to_le_bytes());
    }

    /// Sequence number of the first entry.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        coding::decode_fixed64(&self.rep).unwrap_or(0)
    }

    pub fn set_sequence(&mut self, seq: u64) {
        self.rep[..8].copy_from_slice(&seq.to_le_bytes());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Encoded bytes, as written to the WAL.
    pub fn contents(&self) -> &[u8] {
        &self.rep
    }

    /// Feeds every entry to `handler`.
    ///
    /// # Errors
    ///
    /// Fails on an unknown tag, a truncated entry, or when the number of
    /// entries differs from the header count. Entries before the bad one
    /// have already been delivered.
    pub fn iterate<H: BatchHandler>(&self, handler: &mut H) -> Result<()> {
        let mut input = &self.rep[BATCH_HEADER_SIZE..];
        let mut seq = self.sequence();
        let mut found = 0u32;

        while let Some((&tag, rest)) = input.split_first() {
            input = rest;
            match tag {
                TAG_PUT => {
                    let (Some(key), Some(value)) = (
                        coding::get_length_prefixed_slice(&mut input),
                        coding::get_length_prefixed_slice(&mut input),
                    ) else {
                        bail!("bad WriteBatch put");
                    };
                    handler.put(seq, key, value);
                }
                TAG_DELETE => {
                    let Some(key) = coding::get_length_prefixed_slice(&mut input) else {
                        bail!("bad WriteBatch delete");
                    };
                    handler.delete(seq, key);
                }
                other => bail!("unknown WriteBatch tag {}", other),
            }
            found += 1;
            seq = seq.wrapping_add(1);
        }

        ensure!(
            found == self.count(),
            "WriteBatch has wrong count: header says {}, found {}",
            self.count(),
            found
        );
        Ok(())
    }
}
