//! Names of the files in a database directory.
//!
//! ```text
//! 000012.log        write-ahead log
//! 000015.sst        sorted table
//! MANIFEST-000007   version edits
//! CURRENT           name of the active MANIFEST, newline-terminated
//! 000007.dbtmp      scratch file, renamed into place
//! LOCK              directory lock
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::debug;

const CURRENT: &str = "CURRENT";
const LOCK: &str = "LOCK";
const MANIFEST_PREFIX: &str = "MANIFEST-";

/// Kind of a file found in the database directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileType {
    Log,
    DbLock,
    Table,
    Descriptor,
    Current,
    Temp,
}

pub fn log_file_name(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{:06}.log", number))
}

pub fn table_file_name(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{:06}.sst", number))
}

/// Path of MANIFEST number `number`.
pub fn descriptor_file_name(dir: &Path, number: u64) -> PathBuf {
    dir.join(descriptor_base_name(number))
}

pub fn temp_file_name(dir: &Path, number: u64) -> PathBuf {
    dir.join(format!("{:06}.dbtmp", number))
}

pub fn current_file_name(dir: &Path) -> PathBuf {
    dir.join(CURRENT)
}

pub fn lock_file_name(dir: &Path) -> PathBuf {
    dir.join(LOCK)
}

fn descriptor_base_name(number: u64) -> String {
    format!("{}{:06}", MANIFEST_PREFIX, number)
}

/// Classifies a bare file name (no directory).
///
/// Returns the file number (`0` for `CURRENT` and `LOCK`) and type, or
/// `None` for names the database does not own.
pub fn parse_file_name(name: &str) -> Option<(u64, FileType)> {
    match name {
        CURRENT => return Some((0, FileType::Current)),
        LOCK => return Some((0, FileType::DbLock)),
        _ => {}
    }

    if let Some(rest) = name.strip_prefix(MANIFEST_PREFIX) {
        return parse_number(rest).map(|n| (n, FileType::Descriptor));
    }

    let (number, suffix) = name.split_once('.')?;
    let number = parse_number(number)?;
    let kind = match suffix {
        "log" => FileType::Log,
        "sst" | "ldb" => FileType::Table,
        "dbtmp" => FileType::Temp,
        _ => return None,
    };
    Some((number, kind))
}

fn parse_number(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Points `CURRENT` at MANIFEST `descriptor_number`.
///
/// The new contents go to a temp file that is synced and then renamed over
/// `CURRENT`, so readers see either the old or the new pointer.
pub fn set_current_file(dir: &Path, descriptor_number: u64) -> Result<()> {
    let contents = format!("{}\n", descriptor_base_name(descriptor_number));
    let tmp_path = temp_file_name(dir, descriptor_number);

    let result = (|| -> Result<()> {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .with_context(|| format!("failed to create {}", tmp_path.display()))?;
        f.write_all(contents.as_bytes())?;
        f.sync_all()?;
        fs::rename(&tmp_path, current_file_name(dir))
            .with_context(|| format!("failed to rename {} to CURRENT", tmp_path.display()))?;
        Ok(())
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    } else {
        debug!(manifest = %contents.trim_end(), "CURRENT updated");
    }
    result
}

/// Reads the name of the active MANIFEST from `CURRENT`.
pub fn read_current_file(dir: &Path) -> Result<String> {
    let path = current_file_name(dir);
    let contents = fs::read_to_string(&path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let Some(name) = contents.strip_suffix('\n') else {
        bail!("CURRENT file does not end with newline");
    };
    if name.is_empty() || name.contains('\n') {
        bail!("CURRENT file is malformed: {:?}", contents);
    }
    match parse_file_name(name) {
        Some((_, FileType::Descriptor)) => Ok(name.to_string()),
        _ => bail!("CURRENT names {:?}, which is not a MANIFEST", name),
    }
}
