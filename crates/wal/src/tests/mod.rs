use crate::*;
use std::io::Cursor;


/// Collects every corruption report.
#[derive(Debug, Default)]
pub struct Collector {
    pub dropped: usize,
    pub reasons: Vec<String>,
}

impl Reporter for Collector {
    fn corruption(&mut self, bytes: usize, reason: &str) {
        self.dropped += bytes;
        self.reasons.push(reason.to_string());
    }
}

/// Writes `records` to an in-memory log.
pub fn write_log(records: &[&[u8]]) -> Vec<u8> {
    let mut w = LogWriter::new(Vec::new());
    for r in records {
        w.add_record(r).unwrap();
    }
    w.into_inner()
}

/// Reads every record from `data`, verifying checksums.
pub fn read_log(data: &[u8]) -> (Vec<Vec<u8>>, Collector) {
    read_log_from(data, true, 0)
}

pub fn read_log_from(data: &[u8], verify: bool, initial_offset: u64) -> (Vec<Vec<u8>>, Collector) {
    let mut reader = LogReader::new(Cursor::new(data), Collector::default(), verify, initial_offset);
    let mut out = Vec::new();
    let mut record = Vec::new();
    while reader.read_record(&mut record).unwrap() {
        out.push(record.clone());
    }
    (out, reader.into_reporter())
}

/// One hand-built physical record with a valid checksum.
pub fn physical(kind: u8, payload: &[u8]) -> Vec<u8> {
    let mut typed = vec![kind];
    typed.extend_from_slice(payload);
    let crc = mask(Crc32c.value(&typed));

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&crc.to_le_bytes());
    out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    out.push(kind);
    out.extend_from_slice(payload);
    out
}

/// `n` bytes made by repeating `pattern`.
pub fn big(pattern: &str, n: usize) -> Vec<u8> {
    pattern.bytes().cycle().take(n).collect()
}
