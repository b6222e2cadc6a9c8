//! Corruption reporting for [`crate::LogReader`].

use tracing::warn;

/// Receives every corruption the reader detects.
///
/// `bytes` is the number of bytes dropped, `reason` a short description such
/// as `"checksum mismatch"`. Expected artifacts (torn tail at EOF, zero
/// padding, records before the initial offset) are never reported.
pub trait Reporter {
    fn corruption(&mut self, bytes: usize, reason: &str);
}

impl<R: Reporter + ?Sized> Reporter for &mut R {
    fn corruption(&mut self, bytes: usize, reason: &str) {
        (**self).corruption(bytes, reason)
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn corruption(&mut self, bytes: usize, reason: &str) {
        (**self).corruption(bytes, reason)
    }
}

/// Ignores all reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl Reporter for NoopReporter {
    fn corruption(&mut self, _bytes: usize, _reason: &str) {}
}

/// Logs each report with `tracing::warn!` and keeps running totals.
#[derive(Debug, Default, Clone)]
pub struct CountingReporter {
    /// Name of the log being read, included in the log line.
    label: String,
    events: usize,
    dropped_bytes: u64,
    first_reason: Option<String>,
}

impl CountingReporter {
    /// A reporter whose log lines mention `label` (typically the file name).
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Number of corruption reports received.
    #[must_use]
    pub fn events(&self) -> usize {
        self.events
    }

    /// Total bytes dropped across all reports.
    #[must_use]
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped_bytes
    }

    /// Reason given by the first report, if any.
    #[must_use]
    pub fn first_reason(&self) -> Option<&str> {
        self.first_reason.as_deref()
    }

    /// `true` if nothing was reported.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.events == 0
    }
}

impl Reporter for CountingReporter {
    fn corruption(&mut self, bytes: usize, reason: &str) {
        warn!(log = %self.label, bytes, reason, "log corruption, dropping bytes");
        self.events += 1;
        self.dropped_bytes += bytes as u64;
        if self.first_reason.is_none() {
            self.first_reason = Some(reason.to_string());
        }
    }
}
