//! ``src/fs/scanner.rs``
//!
//! # `Scanner`: Streaming Recursive File Search
//!
//! [`Scanner::search`] launches a background walk of a directory tree and
//! returns at once with two bounded streams: matching files on one, directory
//! read failures on the other. Both streams end (yield `None`) once the walk
//! is over. Every call gets its own streams, so one `Scanner` can run any
//! number of searches concurrently.
//!
//! ```rust,ignore
//! let scanner = Scanner::new();
//! let barrier = CompletionBarrier::new();
//!
//! let mut scan = scanner.search("/var/log", ".log", Some(&barrier));
//! while let Some(record) = scan.results.recv().await {
//!     println!("{record}");
//! }
//! ```

use std::{
    path::PathBuf,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::Stream;
use tokio::{
    sync::mpsc::{self, Receiver},
    task::{self as TokioScheduler, JoinHandle},
};
use tracing::info_span;

use crate::config::ScanConfig;
use crate::error::{AppError, ScanError};
use crate::fs::{
    dir_source::{DirSource, OsDirSource},
    file_record::FileRecord,
};
use crate::tasks::{
    completion::CompletionBarrier,
    scan_task::{ScanSummary, TreeWalk},
};

/// Entry point for recursive file searches.
#[derive(Debug)]
pub struct Scanner<S: DirSource = OsDirSource> {
    source: Arc<S>,
    config: ScanConfig,
}

impl Scanner<OsDirSource> {
    /// Scanner over the real filesystem with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: Arc::new(OsDirSource),
            config: ScanConfig::default(),
        }
    }

    pub fn with_config(config: ScanConfig) -> Result<Self, AppError> {
        Self::with_source(OsDirSource, config)
    }
}

impl Default for Scanner<OsDirSource> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: DirSource> Scanner<S> {
    pub fn with_source(source: S, config: ScanConfig) -> Result<Self, AppError> {
        config.validate()?;

        Ok(Self {
            source: Arc::new(source),
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Starts scanning `root` for files whose name ends with `suffix`,
    /// compared case-insensitively. An empty suffix matches every file.
    ///
    /// Returns immediately. If a barrier is given, one unit of work is
    /// registered on it before returning and released exactly once when the
    /// scan task ends, however it ends.
    ///
    /// Keep draining both streams until they yield `None`: the walk blocks
    /// while a stream's buffer is full. Waiting on the barrier without
    /// draining deadlocks once a buffer fills.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn search<P: Into<PathBuf>>(
        &self,
        root: P,
        suffix: &str,
        barrier: Option<&CompletionBarrier>,
    ) -> ScanStreams {
        let root: PathBuf = root.into();
        let token = barrier.map(CompletionBarrier::register);

        let (result_tx, result_rx) = mpsc::channel::<FileRecord>(self.config.channel_capacity);
        let (error_tx, error_rx) = mpsc::channel::<ScanError>(self.config.channel_capacity);

        let walk = TreeWalk::new(self.source.clone(), suffix, result_tx, error_tx);
        let span = info_span!(
            "scan",
            operation_type = "scan",
            root = %root.display(),
            suffix = %suffix
        );

        let handle: JoinHandle<ScanSummary> = TokioScheduler::spawn_blocking(move || {
            let _entered = span.enter();
            let _token = token;

            walk.run(&root)
        });

        ScanStreams {
            results: ScanStream::new(result_rx),
            errors: ScanStream::new(error_rx),
            task: ScanTask { handle },
        }
    }
}

/// Receiving half of one of a scan's output streams.
///
/// Yields `None` once the scan task has finished and everything buffered has
/// been received.
#[derive(Debug)]
pub struct ScanStream<T> {
    rx: Receiver<T>,
}

impl<T> ScanStream<T> {
    const fn new(rx: Receiver<T>) -> Self {
        Self { rx }
    }

    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Blocking receive for consumers running on plain threads.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context.
    pub fn blocking_recv(&mut self) -> Option<T> {
        self.rx.blocking_recv()
    }

    /// Number of items currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Receives everything until the stream ends.
    pub async fn drain(mut self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.rx.recv().await {
            items.push(item);
        }
        items
    }
}

impl<T> Stream for ScanStream<T> {
    type Item = T;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

/// Handle on a scan's background task.
#[derive(Debug)]
pub struct ScanTask {
    handle: JoinHandle<ScanSummary>,
}

impl ScanTask {
    /// Waits for the task and returns its counters. The task cannot finish
    /// while one of its streams is full and undrained.
    pub async fn join(self) -> Result<ScanSummary, AppError> {
        Ok(self.handle.await?)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Everything collected from a finished scan.
#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub records: Vec<FileRecord>,
    pub errors: Vec<ScanError>,
    pub summary: ScanSummary,
}

/// The state of one `search` call.
#[derive(Debug)]
pub struct ScanStreams {
    pub results: ScanStream<FileRecord>,
    pub errors: ScanStream<ScanError>,
    task: ScanTask,
}

impl ScanStreams {
    #[must_use]
    pub fn into_parts(self) -> (ScanStream<FileRecord>, ScanStream<ScanError>, ScanTask) {
        (self.results, self.errors, self.task)
    }

    /// Drains both streams concurrently, then joins the task.
    pub async fn collect(self) -> Result<ScanOutput, AppError> {
        let Self {
            mut results,
            mut errors,
            task,
        } = self;

        let mut records: Vec<FileRecord> = Vec::new();
        let mut failures: Vec<ScanError> = Vec::new();
        let mut results_done = false;
        let mut errors_done = false;

        while !(results_done && errors_done) {
            tokio::select! {
                record = results.recv(), if !results_done => match record {
                    Some(record) => records.push(record),
                    None => results_done = true,
                },

                failure = errors.recv(), if !errors_done => match failure {
                    Some(failure) => failures.push(failure),
                    None => errors_done = true,
                },
            }
        }

        let summary = task.join().await?;

        Ok(ScanOutput {
            records,
            errors: failures,
            summary,
        })
    }
}

/// Convenience for a one-off scan over the real filesystem with defaults.
pub fn search<P: Into<PathBuf>>(
    root: P,
    suffix: &str,
    barrier: Option<&CompletionBarrier>,
) -> ScanStreams {
    Scanner::new().search(root, suffix, barrier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{collections::HashMap, ffi::OsStr, io, path::Path, time::Duration};

    use futures::StreamExt;

    use crate::fs::dir_source::ListedEntry;

    /// In-memory tree with failure injection.
    #[derive(Debug, Default)]
    struct MemorySource {
        // None marks a directory whose listing fails.
        dirs: HashMap<PathBuf, Option<Vec<ListedEntry>>>,
        sizes: HashMap<PathBuf, u64>,
    }

    impl MemorySource {
        fn attach(&mut self, path: &Path, is_dir: bool) {
            let name = path.file_name().unwrap_or(OsStr::new("")).to_os_string();
            if let Some(Some(siblings)) = path.parent().and_then(|p| self.dirs.get_mut(p)) {
                siblings.push(ListedEntry::new(name, is_dir));
            }
        }

        fn dir(mut self, path: &str) -> Self {
            let path = PathBuf::from(path);
            self.attach(&path, true);
            self.dirs.insert(path, Some(Vec::new()));
            self
        }

        fn locked_dir(mut self, path: &str) -> Self {
            let path = PathBuf::from(path);
            self.attach(&path, true);
            self.dirs.insert(path, None);
            self
        }

        fn file(mut self, path: &str, size: u64) -> Self {
            let path = PathBuf::from(path);
            self.attach(&path, false);
            self.sizes.insert(path, size);
            self
        }

        fn unsized_file(mut self, path: &str) -> Self {
            self.attach(&PathBuf::from(path), false);
            self
        }
    }

    impl DirSource for MemorySource {
        fn list(&self, dir: &Path) -> io::Result<Vec<ListedEntry>> {
            match self.dirs.get(dir) {
                Some(Some(entries)) => Ok(entries.clone()),
                Some(None) => Err(io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    "permission denied",
                )),
                None => Err(io::Error::new(io::ErrorKind::NotFound, "no such directory")),
            }
        }

        fn file_size(&self, path: &Path) -> io::Result<u64> {
            self.sizes
                .get(path)
                .copied()
                .ok_or_else(|| io::Error::other("stat failed"))
        }
    }

    fn sample_tree() -> MemorySource {
        MemorySource::default()
            .dir("/root")
            .file("/root/a.txt", 5)
            .dir("/root/sub")
            .file("/root/sub/b.TXT", 3)
            .file("/root/sub/c.md", 1)
    }

    fn scanner(source: MemorySource) -> Scanner<MemorySource> {
        Scanner::with_source(source, ScanConfig::default()).unwrap()
    }

    fn sorted(mut records: Vec<FileRecord>) -> Vec<FileRecord> {
        records.sort_by(|a, b| a.path().cmp(&b.path()));
        records
    }

    #[tokio::test]
    async fn test_matches_suffix_across_tree() {
        let output = scanner(sample_tree())
            .search("/root", ".txt", None)
            .collect()
            .await
            .unwrap();

        assert_eq!(
            sorted(output.records),
            vec![
                FileRecord::new("/root", "a.txt", 5),
                FileRecord::new("/root/sub", "b.TXT", 3),
            ]
        );
        assert!(output.errors.is_empty());
        assert_eq!(output.summary.directories_listed, 2);
        assert_eq!(output.summary.files_matched, 2);
    }

    #[tokio::test]
    async fn test_missing_root_yields_single_error() {
        let output = scanner(sample_tree())
            .search("/does/not/exist", ".txt", None)
            .collect()
            .await
            .unwrap();

        assert!(output.records.is_empty());
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].path(), Path::new("/does/not/exist"));
        assert!(output.errors[0].is_not_found());
        assert_eq!(output.summary.directories_failed, 1);
    }

    #[tokio::test]
    async fn test_unreadable_subdir_does_not_hide_siblings() {
        let source = MemorySource::default()
            .dir("/data")
            .file("/data/top.log", 10)
            .dir("/data/ok")
            .file("/data/ok/inner.log", 20)
            .locked_dir("/data/locked")
            .dir("/data/after")
            .file("/data/after/late.log", 30);

        let output = scanner(source)
            .search("/data", ".log", None)
            .collect()
            .await
            .unwrap();

        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.errors[0].path(), Path::new("/data/locked"));
        assert_eq!(output.errors[0].kind(), io::ErrorKind::PermissionDenied);

        let names: Vec<_> = sorted(output.records)
            .into_iter()
            .map(|r| r.display_name().into_owned())
            .collect();
        assert_eq!(names, vec!["late.log", "inner.log", "top.log"]);
    }

    #[tokio::test]
    async fn test_unsized_match_is_still_reported() {
        let source = MemorySource::default()
            .dir("/m")
            .unsized_file("/m/ghost.txt")
            .file("/m/real.txt", 7);

        let output = scanner(source)
            .search("/m", ".txt", None)
            .collect()
            .await
            .unwrap();

        assert_eq!(
            sorted(output.records),
            vec![
                FileRecord::new("/m", "ghost.txt", 0),
                FileRecord::new("/m", "real.txt", 7),
            ]
        );
        assert_eq!(output.summary.unsized_matches, 1);
        assert!(output.errors.is_empty());
    }

    #[tokio::test]
    async fn test_empty_suffix_matches_every_file() {
        let output = scanner(sample_tree())
            .search("/root", "", None)
            .collect()
            .await
            .unwrap();

        assert_eq!(output.records.len(), 3);
    }

    #[tokio::test]
    async fn test_subtree_finishes_before_next_sibling() {
        let source = MemorySource::default()
            .dir("/t")
            .file("/t/1.txt", 1)
            .dir("/t/d")
            .file("/t/d/2.txt", 1)
            .dir("/t/d/e")
            .file("/t/d/e/3.txt", 1)
            .file("/t/d/4.txt", 1)
            .file("/t/5.txt", 1);

        let records = scanner(source)
            .search("/t", ".txt", None)
            .results
            .drain()
            .await;

        let order: Vec<_> = records.iter().map(|r| r.display_name()).collect();
        assert_eq!(order, vec!["1.txt", "2.txt", "3.txt", "4.txt", "5.txt"]);
    }

    #[tokio::test]
    async fn test_backpressure_with_tiny_buffer_loses_nothing() {
        let mut source = MemorySource::default().dir("/many");
        for i in 0..200 {
            source = source.file(&format!("/many/f{i}.dat"), i);
        }

        let scanner = Scanner::with_source(
            source,
            ScanConfig {
                channel_capacity: 1,
            },
        )
        .unwrap();

        let mut scan = scanner.search("/many", ".dat", None);

        // Walk stalls on the full buffer until we read.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(scan.results.len() <= 1);

        let output = scan.collect().await.unwrap();
        assert_eq!(output.records.len(), 200);
    }

    #[tokio::test]
    async fn test_barrier_reaches_zero_after_mixed_scans() {
        let scanner = scanner(sample_tree());
        let barrier = CompletionBarrier::new();

        let scans: Vec<ScanStreams> = ["/root", "/root/sub", "/nope", "/root", "/also/nope"]
            .into_iter()
            .map(|root| scanner.search(root, ".txt", Some(&barrier)))
            .collect();

        let mut total_errors = 0;
        for scan in scans {
            total_errors += scan.collect().await.unwrap().errors.len();
        }

        assert!(barrier.wait_timeout(Duration::from_secs(5)).await);
        assert_eq!(barrier.pending(), 0);
        assert_eq!(total_errors, 2);
    }

    #[tokio::test]
    async fn test_registration_happens_before_return() {
        let mut source = MemorySource::default().dir("/big");
        for i in 0..50 {
            source = source.file(&format!("/big/{i}.txt"), 1);
        }
        let scanner = scanner(source);
        let barrier = CompletionBarrier::new();

        let scan = scanner.search("/big", ".txt", Some(&barrier));

        // 50 matches cannot fit a 10-slot buffer, so the task is still alive.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(barrier.pending(), 1);

        scan.collect().await.unwrap();
        barrier.wait().await;
        assert_eq!(barrier.pending(), 0);
    }

    #[tokio::test]
    async fn test_dropping_both_streams_still_releases_barrier() {
        let mut source = MemorySource::default().dir("/big");
        for i in 0..100 {
            source = source.file(&format!("/big/{i}.txt"), 1);
        }
        let scanner = scanner(source);
        let barrier = CompletionBarrier::new();

        let (results, errors, task) = scanner
            .search("/big", ".txt", Some(&barrier))
            .into_parts();
        drop(results);
        drop(errors);

        let summary = task.join().await.unwrap();
        assert!(summary.files_matched < 100);
        assert!(barrier.wait_timeout(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn test_dropping_results_keeps_errors_flowing() {
        let source = MemorySource::default()
            .dir("/x")
            .file("/x/a.txt", 1)
            .locked_dir("/x/locked");

        let (results, errors, task) = scanner(source).search("/x", ".txt", None).into_parts();
        drop(results);

        let failures = errors.drain().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(task.join().await.unwrap().directories_failed, 1);
    }

    #[tokio::test]
    async fn test_one_scanner_serves_concurrent_searches() {
        let scanner = scanner(sample_tree());

        let first = scanner.search("/root", ".txt", None);
        let second = scanner.search("/root/sub", ".md", None);

        let (first, second) = tokio::join!(first.collect(), second.collect());

        assert_eq!(first.unwrap().records.len(), 2);
        assert_eq!(
            second.unwrap().records,
            vec![FileRecord::new("/root/sub", "c.md", 1)]
        );
    }

    #[tokio::test]
    async fn test_streams_work_as_futures_streams() {
        let (results, errors, _task) = scanner(sample_tree())
            .search("/root", ".txt", None)
            .into_parts();

        let total: i64 = results
            .map(|record| record.size)
            .fold(0, |acc, size| async move { acc + size })
            .await;
        let failures: Vec<ScanError> = errors.collect().await;

        assert_eq!(total, 8);
        assert!(failures.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_blocking_consumer_thread() {
        let scan = scanner(sample_tree()).search("/root", ".md", None);
        let (mut results, mut errors, task) = scan.into_parts();

        let consumer = std::thread::spawn(move || {
            let mut names = Vec::new();
            while let Some(record) = results.blocking_recv() {
                names.push(record.display_name().into_owned());
            }
            while errors.blocking_recv().is_some() {}
            names
        });

        let summary = task.join().await.unwrap();
        let names = tokio::task::spawn_blocking(move || consumer.join().unwrap())
            .await
            .unwrap();

        assert_eq!(names, vec!["c.md".to_string()]);
        assert_eq!(summary.files_matched, 1);
    }

    /// Source whose listing always panics.
    #[derive(Debug)]
    struct PanickingSource;

    impl DirSource for PanickingSource {
        fn list(&self, dir: &Path) -> io::Result<Vec<ListedEntry>> {
            panic!("listing {} blew up", dir.display());
        }

        fn file_size(&self, _path: &Path) -> io::Result<u64> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_panicking_walk_releases_barrier_and_closes_streams() {
        let scanner = Scanner::with_source(PanickingSource, ScanConfig::default()).unwrap();
        let barrier = CompletionBarrier::new();

        let (mut results, mut errors, task) = scanner
            .search("/anywhere", ".txt", Some(&barrier))
            .into_parts();

        let err = task.join().await.unwrap_err();
        assert!(matches!(err, AppError::TaskFailed { .. }));

        assert!(results.recv().await.is_none());
        assert!(errors.recv().await.is_none());
        assert!(barrier.wait_timeout(Duration::from_secs(5)).await);
        assert_eq!(barrier.pending(), 0);
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let err = Scanner::with_source(
            MemorySource::default(),
            ScanConfig {
                channel_capacity: 0,
            },
        )
        .unwrap_err();

        assert!(matches!(err, AppError::InvalidInput { .. }));
    }
}
