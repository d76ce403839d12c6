//! `src/fs/file_record.rs`
//! ============================================================
//! A single matched file as delivered on a scan's result stream.

use std::borrow::Cow;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use bytesize::ByteSize;
use serde::{Deserialize, Serialize};

/// One file whose name matched the scan suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileRecord {
    /// Containing directory, exactly as the walk reached it.
    pub directory_path: PathBuf,

    /// File name including its extension, byte-for-byte as listed.
    pub name: OsString,

    /// Length in bytes. Never negative; 0 when the size could not be read.
    pub size: i64,
}

impl FileRecord {
    pub fn new<P, N>(directory_path: P, name: N, size: u64) -> Self
    where
        P: Into<PathBuf>,
        N: Into<OsString>,
    {
        Self {
            directory_path: directory_path.into(),
            name: name.into(),
            size: i64::try_from(size).unwrap_or(i64::MAX),
        }
    }

    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory_path
    }

    /// Full path of the file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.directory_path.join(&self.name)
    }

    /// File name for display. Bytes that are not valid UTF-8 show as U+FFFD.
    #[must_use]
    pub fn display_name(&self) -> Cow<'_, str> {
        self.name.to_string_lossy()
    }

    #[must_use]
    pub fn len(&self) -> u64 {
        self.size.unsigned_abs()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }
}

impl fmt::Display for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.path().display(), ByteSize::b(self.len()))
    }
}
