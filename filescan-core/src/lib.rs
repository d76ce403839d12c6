//! filescan-core: streaming recursive file search.
//!
//! [`Scanner::search`] walks a directory tree on a background task and hands
//! back two bounded streams right away, one carrying [`FileRecord`]s for every
//! file whose name ends with a suffix (case-insensitively), the other carrying
//! a [`ScanError`] for every directory that could not be listed. A shared
//! [`CompletionBarrier`] lets a caller wait for many scans at once.

pub mod error;

pub mod config;

pub mod fs {
    pub mod dir_source;
    pub use dir_source::{DirSource, ListedEntry, OsDirSource};

    pub mod file_record;
    pub use file_record::FileRecord;

    pub mod scanner;
    pub use scanner::{ScanOutput, ScanStream, ScanStreams, ScanTask, Scanner, search};
}

pub mod tasks {
    pub mod completion;
    pub use completion::{CompletionBarrier, CompletionToken};

    pub mod scan_task;
    pub use scan_task::{ScanSummary, fold_case, matches_suffix};
}

pub mod logging;
pub use logging::LoggerBuilder;

pub use config::{Config, ScanConfig};
pub use error::{AppError, ScanError};
pub use fs::{FileRecord, ScanStreams, Scanner};
pub use tasks::{CompletionBarrier, ScanSummary};
