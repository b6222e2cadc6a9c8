//! Command dispatch for the interactive shell.

use std::collections::BTreeMap;
use std::io::Write;

use anyhow::Result;
use config::Config;
use engine::{BatchHandler, Engine, WriteBatch};
use version::{FileMetaData, VersionEdit, DEFAULT_COLUMN_FAMILY_ID, NUM_LEVELS};

use crate::dump;

/// In-memory view of the data: latest value per key, `None` for deletes.
#[derive(Debug, Default)]
pub struct MemTable {
    entries: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl MemTable {
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        self.entries.get(key).and_then(|v| v.as_deref())
    }

    /// Number of keys with a live value.
    pub fn len(&self) -> usize {
        self.entries.values().filter(|v| v.is_some()).count()
    }
}

impl BatchHandler for MemTable {
    fn put(&mut self, _seq: u64, key: &[u8], value: &[u8]) {
        self.entries.insert(key.to_vec(), Some(value.to_vec()));
    }

    fn delete(&mut self, _seq: u64, key: &[u8]) {
        self.entries.insert(key.to_vec(), None);
    }
}

/// Whether the shell should keep reading commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Shell {
    engine: Engine,
    mem: MemTable,
}

impl Shell {
    /// Opens the database, replaying its WAL into a fresh [`MemTable`].
    pub fn open(config: Config) -> Result<Self> {
        let mut mem = MemTable::default();
        let engine = Engine::open(config, &mut mem)?;
        Ok(Self { engine, mem })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Runs one command line, writing its reply to `out`.
    ///
    /// Command failures are reported as `ERR ...` lines; only errors writing
    /// to `out` are returned.
    pub fn execute(&mut self, line: &str, out: &mut impl Write) -> Result<Flow> {
        let mut parts = line.split_whitespace();
        let Some(cmd) = parts.next() else {
            return Ok(Flow::Continue);
        };
        let args: Vec<&str> = parts.collect();

        match cmd.to_uppercase().as_str() {
            "PUT" => match args.split_first() {
                Some((key, rest)) if !rest.is_empty() => {
                    let value = rest.join(" ");
                    let mut batch = WriteBatch::new();
                    batch.put(key.as_bytes(), value.as_bytes());
                    self.write(&mut batch, out)?;
                }
                _ => writeln!(out, "ERR usage: PUT key value")?,
            },
            "DEL" => match args.as_slice() {
                [key] => {
                    let mut batch = WriteBatch::new();
                    batch.delete(key.as_bytes());
                    self.write(&mut batch, out)?;
                }
                _ => writeln!(out, "ERR usage: DEL key")?,
            },
            "GET" => match args.as_slice() {
                [key] => match self.mem.get(key.as_bytes()) {
                    Some(v) => writeln!(out, "{}", String::from_utf8_lossy(v))?,
                    None => writeln!(out, "(nil)")?,
                },
                _ => writeln!(out, "ERR usage: GET key")?,
            },
            "ROTATE" => match self.engine.rotate_wal() {
                Ok(n) => writeln!(out, "OK (wal={})", n)?,
                Err(e) => writeln!(out, "ERR rotate failed: {:#}", e)?,
            },
            "ADDFILE" => self.add_file(&args, out)?,
            "DELFILE" => self.delete_file(&args, out)?,
            "FILES" => self.files(out)?,
            "DUMPWAL" => match args.as_slice() {
                [n] => match n.parse::<u64>() {
                    Ok(number) => {
                        if let Err(e) = dump::dump_wal(self.engine.dir(), number, out) {
                            writeln!(out, "ERR dump failed: {:#}", e)?;
                        }
                    }
                    Err(_) => writeln!(out, "ERR usage: DUMPWAL number")?,
                },
                _ => writeln!(out, "ERR usage: DUMPWAL number")?,
            },
            "DUMPMANIFEST" => {
                if let Err(e) = dump::dump_manifest(self.engine.dir(), out) {
                    writeln!(out, "ERR dump failed: {:#}", e)?;
                }
            }
            "CLEAN" => match self.engine.remove_obsolete_files() {
                Ok(n) => writeln!(out, "OK (removed {})", n)?,
                Err(e) => writeln!(out, "ERR clean failed: {:#}", e)?,
            },
            "STATS" => {
                writeln!(out, "{:?}", self.engine)?;
                writeln!(out, "{:?}", self.engine.recovery_stats())?;
                writeln!(out, "keys: {}", self.mem.len())?;
            }
            "EXIT" | "QUIT" => {
                writeln!(out, "bye")?;
                return Ok(Flow::Exit);
            }
            other => writeln!(out, "unknown command: {}", other)?,
        }
        Ok(Flow::Continue)
    }

    /// Logs `batch`, then applies it to the memtable.
    fn write(&mut self, batch: &mut WriteBatch, out: &mut impl Write) -> Result<()> {
        match self.engine.write(batch) {
            Ok(()) => {
                // Already logged; a decode failure here would be a bug.
                if let Err(e) = batch.iterate(&mut self.mem) {
                    writeln!(out, "ERR apply failed: {:#}", e)?;
                } else {
                    writeln!(out, "OK")?;
                }
            }
            Err(e) => writeln!(out, "ERR write failed: {:#}", e)?,
        }
        Ok(())
    }

    fn add_file(&mut self, args: &[&str], out: &mut impl Write) -> Result<()> {
        const USAGE: &str = "ERR usage: ADDFILE level number size smallest largest";
        let [level, number, size, smallest, largest] = args else {
            writeln!(out, "{}", USAGE)?;
            return Ok(());
        };
        let (Ok(level), Ok(number), Ok(size)) =
            (level.parse::<u32>(), number.parse::<u64>(), size.parse::<u64>())
        else {
            writeln!(out, "{}", USAGE)?;
            return Ok(());
        };
        if level as usize >= NUM_LEVELS {
            writeln!(out, "ERR level must be below {}", NUM_LEVELS)?;
            return Ok(());
        }

        if let Err(e) = self.engine.mark_file_number_used(number) {
            writeln!(out, "ERR addfile failed: {:#}", e)?;
            return Ok(());
        }
        let mut edit = VersionEdit::new();
        edit.add_file(
            level,
            FileMetaData::new(number, size, smallest.as_bytes().to_vec(), largest.as_bytes().to_vec()),
        );
        match self.engine.log_and_apply(&mut edit) {
            Ok(()) => writeln!(out, "OK")?,
            Err(e) => writeln!(out, "ERR addfile failed: {:#}", e)?,
        }
        Ok(())
    }

    fn delete_file(&mut self, args: &[&str], out: &mut impl Write) -> Result<()> {
        const USAGE: &str = "ERR usage: DELFILE level number";
        let [level, number] = args else {
            writeln!(out, "{}", USAGE)?;
            return Ok(());
        };
        let (Ok(level), Ok(number)) = (level.parse::<u32>(), number.parse::<u64>()) else {
            writeln!(out, "{}", USAGE)?;
            return Ok(());
        };
        if level as usize >= NUM_LEVELS {
            writeln!(out, "ERR level must be below {}", NUM_LEVELS)?;
            return Ok(());
        }

        let mut edit = VersionEdit::new();
        edit.delete_file(level, number);
        match self.engine.log_and_apply(&mut edit) {
            Ok(()) => writeln!(out, "OK")?,
            Err(e) => writeln!(out, "ERR delfile failed: {:#}", e)?,
        }
        Ok(())
    }

    fn files(&self, out: &mut impl Write) -> Result<()> {
        let Some(files) = self.engine.versions().current(DEFAULT_COLUMN_FAMILY_ID) else {
            writeln!(out, "(no files)")?;
            return Ok(());
        };
        if files.is_empty() {
            writeln!(out, "(no files)")?;
            return Ok(());
        }
        for (level, f) in files.iter() {
            writeln!(
                out,
                "L{} #{} {} bytes ['{}' .. '{}']",
                level,
                f.number,
                f.file_size,
                String::from_utf8_lossy(&f.smallest),
                String::from_utf8_lossy(&f.largest)
            )?;
        }
        writeln!(out, "({} files)", files.len())?;
        Ok(())
    }
}
