//! ``src/tasks/scan_task.rs``
//! ============================================================================
//! # Scan Task: depth-first walk feeding the result and error streams
//!
//! The walk runs on a blocking thread and pushes into bounded channels with
//! `blocking_send`, so a slow consumer throttles it. Directories are visited
//! pre-order: a directory entry's whole subtree is finished before the next
//! sibling is looked at.

use std::{
    ops::ControlFlow,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};

use serde::Serialize;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::fs::{dir_source::DirSource, file_record::FileRecord};

/// Counters reported by a finished scan task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScanSummary {
    pub directories_listed: u64,
    pub directories_failed: u64,
    pub files_matched: u64,
    /// Matches emitted with size 0 because their size could not be read.
    pub unsized_matches: u64,
    pub elapsed: Duration,
}

/// Lower-cases `text` one character at a time.
///
/// Unlike `str::to_lowercase`, a character maps the same way wherever it sits
/// in the word (capital sigma always becomes `σ`), so a suffix folds exactly
/// like the tail of a name.
#[must_use]
pub fn fold_case(text: &str) -> String {
    text.chars().flat_map(char::to_lowercase).collect()
}

/// Case-insensitive suffix test. `lowered_suffix` must already be folded with
/// [`fold_case`].
#[inline]
#[must_use]
pub fn matches_suffix(name: &str, lowered_suffix: &str) -> bool {
    lowered_suffix.is_empty() || fold_case(name).ends_with(lowered_suffix)
}

pub(crate) struct TreeWalk<S: DirSource> {
    source: Arc<S>,
    suffix: String,
    results: Sender<FileRecord>,
    errors: Sender<ScanError>,
    results_open: bool,
    errors_open: bool,
    summary: ScanSummary,
}

impl<S: DirSource> TreeWalk<S> {
    pub(crate) fn new(
        source: Arc<S>,
        suffix: &str,
        results: Sender<FileRecord>,
        errors: Sender<ScanError>,
    ) -> Self {
        Self {
            source,
            suffix: fold_case(suffix),
            results,
            errors,
            results_open: true,
            errors_open: true,
            summary: ScanSummary::default(),
        }
    }

    /// Walks `root` to completion. Must run outside an async context.
    ///
    /// Consumes the walk so both senders are dropped, closing the streams,
    /// before the summary is handed back.
    pub(crate) fn run(mut self, root: &Path) -> ScanSummary {
        let start = Instant::now();

        info!(
            marker = "SCAN_TASK",
            operation_type = "scan_start",
            root = %root.display(),
            suffix = %self.suffix,
            "Starting directory scan"
        );

        if self.walk(root).is_break() {
            debug!(
                marker = "SCAN_TASK",
                operation_type = "scan_abandoned",
                root = %root.display(),
                "Both streams dropped by the consumer, stopping walk"
            );
        }

        self.summary.elapsed = start.elapsed();

        info!(
            marker = "SCAN_TASK",
            operation_type = "scan_complete",
            root = %root.display(),
            directories_listed = self.summary.directories_listed,
            directories_failed = self.summary.directories_failed,
            files_matched = self.summary.files_matched,
            unsized_matches = self.summary.unsized_matches,
            duration_ms = self.summary.elapsed.as_millis(),
            "Directory scan completed"
        );

        self.summary
    }

    fn walk(&mut self, dir: &Path) -> ControlFlow<()> {
        let entries = match self.source.list(dir) {
            Ok(entries) => entries,

            Err(cause) => {
                self.summary.directories_failed += 1;

                warn!(
                    marker = "SCAN_TASK",
                    operation_type = "directory_read_failure",
                    path = %dir.display(),
                    error = %cause,
                    "Failed to list directory"
                );

                return self.emit_error(ScanError::new(dir, cause));
            }
        };

        self.summary.directories_listed += 1;

        for entry in entries {
            let entry_path = dir.join(&entry.name);

            if entry.is_dir {
                self.walk(&entry_path)?;
                continue;
            }

            if !matches_suffix(&entry.name.to_string_lossy(), &self.suffix) {
                continue;
            }

            let size: u64 = match self.source.file_size(&entry_path) {
                Ok(size) => size,

                Err(e) => {
                    self.summary.unsized_matches += 1;

                    warn!(
                        marker = "SCAN_TASK",
                        operation_type = "metadata_failure",
                        path = %entry_path.display(),
                        error = %e,
                        "Size unavailable, reporting match with size 0"
                    );

                    0
                }
            };

            self.summary.files_matched += 1;
            self.emit_record(FileRecord::new(dir, entry.name, size))?;
        }

        ControlFlow::Continue(())
    }

    fn emit_record(&mut self, record: FileRecord) -> ControlFlow<()> {
        if self.results_open && self.results.blocking_send(record).is_err() {
            debug!(
                marker = "SCAN_TASK",
                operation_type = "result_stream_dropped",
                "Result stream closed by consumer, discarding further matches"
            );
            self.results_open = false;
        }

        self.observed()
    }

    fn emit_error(&mut self, error: ScanError) -> ControlFlow<()> {
        if self.errors_open && self.errors.blocking_send(error).is_err() {
            debug!(
                marker = "SCAN_TASK",
                operation_type = "error_stream_dropped",
                "Error stream closed by consumer, discarding further errors"
            );
            self.errors_open = false;
        }

        self.observed()
    }

    // Break once nobody is left to receive anything.
    fn observed(&self) -> ControlFlow<()> {
        if self.results.is_closed() && self.errors.is_closed() {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    }
}
