//! File abstractions the log is written to and read from.
//!
//! The writer needs an append-only sink with explicit flush and sync; the
//! reader needs sequential reads plus a forward skip. Anything `Read + Seek`
//! (a `File`, a `Cursor<Vec<u8>>`) is a [`SequentialFile`]; [`LogFile`] and
//! `Vec<u8>` are [`WritableFile`]s.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Append-only destination for log records.
pub trait WritableFile {
    /// Appends `data` at the end of the file.
    fn append(&mut self, data: &[u8]) -> io::Result<()>;

    /// Pushes buffered bytes to the operating system.
    fn flush(&mut self) -> io::Result<()>;

    /// Makes everything appended so far durable.
    fn sync(&mut self) -> io::Result<()>;
}

/// Sequential source of log bytes.
pub trait SequentialFile {
    /// Reads up to `buf.len()` bytes. `Ok(0)` means end of file.
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Skips `n` bytes forward.
    fn skip(&mut self, n: u64) -> io::Result<()>;
}

impl<T: Read + Seek> SequentialFile for T {
    fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Read::read(self, buf)
    }

    fn skip(&mut self, n: u64) -> io::Result<()> {
        let n = i64::try_from(n)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "skip distance overflows i64"))?;
        self.seek(SeekFrom::Current(n))?;
        Ok(())
    }
}

/// In-memory log, mostly for tests and tooling.
impl WritableFile for Vec<u8> {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: WritableFile + ?Sized> WritableFile for &mut W {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        (**self).append(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// Buffered append-only file on disk.
///
/// `flush` hands the buffer to the OS; `sync` additionally calls
/// `sync_all()` (fsync).
pub struct LogFile {
    inner: BufWriter<File>,
    path: PathBuf,
}

impl LogFile {
    /// Creates `path`, truncating any existing file.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self {
            inner: BufWriter::new(file),
            path,
        })
    }

    /// Opens (or creates) `path` for appending and returns it together with
    /// its current length.
    pub fn open_append<P: AsRef<Path>>(path: P) -> io::Result<(Self, u64)> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let len = file.metadata()?.len();
        Ok((
            Self {
                inner: BufWriter::new(file),
                path,
            },
            len,
        ))
    }

    /// Path this file was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for LogFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogFile").field("path", &self.path).finish()
    }
}

impl WritableFile for LogFile {
    fn append(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    fn sync(&mut self) -> io::Result<()> {
        self.inner.flush()?;
        self.inner.get_ref().sync_all()
    }
}
