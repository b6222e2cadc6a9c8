//! Human-readable dumps of WAL and MANIFEST files.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use engine::{BatchHandler, WriteBatch};
use version::{filename, VersionEdit};
use wal::{CountingReporter, LogReader};

/// Formats batch entries as `seq N PUT key value` / `seq N DEL key`.
#[derive(Default)]
struct Lines(Vec<String>);

impl BatchHandler for Lines {
    fn put(&mut self, seq: u64, key: &[u8], value: &[u8]) {
        self.0.push(format!(
            "seq {} PUT {} {}",
            seq,
            String::from_utf8_lossy(key),
            String::from_utf8_lossy(value)
        ));
    }

    fn delete(&mut self, seq: u64, key: &[u8]) {
        self.0.push(format!("seq {} DEL {}", seq, String::from_utf8_lossy(key)));
    }
}

/// Prints every entry of log `number` in `dir`.
///
/// Corruption is reported in the summary line, not treated as an error;
/// a batch that fails to decode is printed as `bad batch: <reason>`.
pub fn dump_wal(dir: &Path, number: u64, out: &mut impl Write) -> Result<()> {
    let path = filename::log_file_name(dir, number);
    let mut reader = LogReader::open(&path, CountingReporter::new(path.display().to_string()))
        .with_context(|| format!("failed to open {}", path.display()))?;

    let mut records = 0usize;
    let mut record = Vec::new();
    while reader.read_record(&mut record)? {
        records += 1;
        let mut lines = Lines::default();
        let result =
            WriteBatch::from_contents(std::mem::take(&mut record)).and_then(|b| b.iterate(&mut lines));
        for line in &lines.0 {
            writeln!(out, "{}", line)?;
        }
        if let Err(e) = result {
            writeln!(out, "bad batch: {}", e)?;
        }
    }

    let reporter = reader.into_reporter();
    writeln!(
        out,
        "({} records, {} corruption events, {} bytes dropped)",
        records,
        reporter.events(),
        reporter.dropped_bytes()
    )?;
    Ok(())
}

/// Prints every edit of the MANIFEST named by `CURRENT`.
pub fn dump_manifest(dir: &Path, out: &mut impl Write) -> Result<()> {
    let name = filename::read_current_file(dir)?;
    let path = dir.join(&name);
    let mut reader = LogReader::open(&path, CountingReporter::new(name.as_str()))
        .with_context(|| format!("failed to open {}", path.display()))?;

    writeln!(out, "{}", name)?;
    let mut edits = 0usize;
    let mut record = Vec::new();
    while reader.read_record(&mut record)? {
        let edit = VersionEdit::decode(&record)
            .with_context(|| format!("edit #{} in {} is corrupted", edits, name))?;
        writeln!(out, "{}", edit)?;
        edits += 1;
    }

    let reporter = reader.into_reporter();
    writeln!(out, "({} edits, {} corruption events)", edits, reporter.events())?;
    Ok(())
}
