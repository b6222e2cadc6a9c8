/// WAL replay on open.
///
/// Every log numbered `>= log_number`, plus `prev_log_number`, may hold writes
/// that never reached a table. They are replayed oldest first into the
/// caller's [`BatchHandler`]. How corruption is treated depends on
/// `paranoid_checks`: strict mode fails the open, lenient mode skips the
/// damaged bytes and counts them in [`RecoveryStats`].
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};
use version::filename::{self, FileType};
use wal::{CountingReporter, LogReader};

use crate::batch::{BatchHandler, WriteBatch};

/// Summary of the WAL replay performed by [`crate::Engine::open`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub logs_replayed: usize,
    pub records_replayed: u64,
    /// Corruption reports from the log readers.
    pub corruption_events: usize,
    pub dropped_bytes: u64,
    /// Highest sequence number seen in any replayed batch; `0` if none.
    pub max_sequence: u64,
}

/// Numbers of the logs in `dir` that must be replayed, ascending.
pub(crate) fn logs_to_replay(dir: &Path, log_number: u64, prev_log_number: u64) -> Result<Vec<u64>> {
    let mut logs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to list {}", dir.display()))? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some((number, FileType::Log)) = filename::parse_file_name(name) {
            if number >= log_number || (prev_log_number != 0 && number == prev_log_number) {
                logs.push(number);
            }
        }
    }
    logs.sort_unstable();
    Ok(logs)
}

/// Replays log `number` into `handler`, accumulating into `stats`.
pub(crate) fn replay_log<H: BatchHandler>(
    dir: &Path,
    number: u64,
    verify_checksums: bool,
    paranoid: bool,
    handler: &mut H,
    stats: &mut RecoveryStats,
) -> Result<()> {
    let path = filename::log_file_name(dir, number);
    let label = path.display().to_string();
    let mut reader = LogReader::new(
        fs::File::open(&path).with_context(|| format!("failed to open {}", label))?,
        CountingReporter::new(label.as_str()),
        verify_checksums,
        0,
    );

    let mut record = Vec::new();
    let mut records = 0u64;
    loop {
        let more = reader
            .read_record(&mut record)
            .with_context(|| format!("failed to read {}", label))?;
        if paranoid {
            if let Some(reason) = reader.reporter().first_reason() {
                bail!("corrupted log {}: {}", label, reason);
            }
        }
        if !more {
            break;
        }

        match apply_record(std::mem::take(&mut record), handler) {
            Ok(Some(last)) => stats.max_sequence = stats.max_sequence.max(last),
            Ok(None) => {}
            Err(e) if !paranoid => {
                warn!(log = %label, error = %e, "skipping bad log record");
                stats.corruption_events += 1;
                continue;
            }
            Err(e) => return Err(e.context(format!("corrupted log {}", label))),
        }
        records += 1;
    }

    let reporter = reader.into_reporter();
    if !reporter.is_clean() {
        warn!(
            log = %label,
            events = reporter.events(),
            dropped_bytes = reporter.dropped_bytes(),
            reason = reporter.first_reason().unwrap_or(""),
            "log had corruption, dropped bytes skipped"
        );
    }
    stats.logs_replayed += 1;
    stats.records_replayed += records;
    stats.corruption_events += reporter.events();
    stats.dropped_bytes += reporter.dropped_bytes();

    debug!(log = %label, records, "replayed log");
    Ok(())
}

/// Decodes one WAL record and feeds it to `handler`, returning the sequence
/// of its last entry.
fn apply_record<H: BatchHandler>(contents: Vec<u8>, handler: &mut H) -> Result<Option<u64>> {
    let batch = WriteBatch::from_contents(contents)?;
    batch.iterate(handler)?;
    Ok(match batch.count() {
        0 => None,
        n => Some(batch.sequence().wrapping_add(u64::from(n) - 1)),
    })
}

/// Replays every log that may hold unflushed writes.
pub(crate) fn replay_logs<H: BatchHandler>(
    dir: &Path,
    log_number: u64,
    prev_log_number: u64,
    verify_checksums: bool,
    paranoid: bool,
    handler: &mut H,
) -> Result<(Vec<u64>, RecoveryStats)> {
    let logs = logs_to_replay(dir, log_number, prev_log_number)?;
    let mut stats = RecoveryStats::default();
    for &number in &logs {
        replay_log(dir, number, verify_checksums, paranoid, handler, &mut stats)?;
    }
    if !logs.is_empty() {
        info!(
            logs = stats.logs_replayed,
            records = stats.records_replayed,
            corruption_events = stats.corruption_events,
            dropped_bytes = stats.dropped_bytes,
            max_sequence = stats.max_sequence,
            "WAL recovery complete"
        );
    }
    Ok((logs, stats))
}
