//! ``src/fs/dir_source.rs``
//!
//! # `DirSource`: the two filesystem primitives a scan relies on
//!
//! A walk only needs to list a directory and to ask a file for its length.
//! Both live behind [`DirSource`] so scans can run against the real
//! filesystem ([`OsDirSource`]) or anything else that can answer them.

use std::{
    ffi::OsString,
    fs::{self, FileType},
    io,
    path::Path,
};

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedEntry {
    pub name: OsString,
    pub is_dir: bool,
}

impl ListedEntry {
    pub fn new<N: Into<OsString>>(name: N, is_dir: bool) -> Self {
        Self {
            name: name.into(),
            is_dir,
        }
    }

    pub fn file<N: Into<OsString>>(name: N) -> Self {
        Self::new(name, false)
    }

    pub fn dir<N: Into<OsString>>(name: N) -> Self {
        Self::new(name, true)
    }
}

/// Filesystem access used by the traversal.
///
/// Implementations are shared between the caller and the scan task, and are
/// called from a blocking thread.
pub trait DirSource: Send + Sync + 'static {
    /// Lists the immediate children of `dir`. Any failure, including one
    /// midway through the listing, fails the whole directory. Entries that
    /// vanish while being listed are left out.
    fn list(&self, dir: &Path) -> io::Result<Vec<ListedEntry>>;

    /// Byte length of the file at `path`. Failures are tolerated by the caller.
    fn file_size(&self, path: &Path) -> io::Result<u64>;
}

/// [`DirSource`] backed by `std::fs`.
///
/// Directory-ness comes from the entry's own file type, so a symbolic link is
/// never reported as a directory, and sizes come from `symlink_metadata`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsDirSource;

impl DirSource for OsDirSource {
    fn list(&self, dir: &Path) -> io::Result<Vec<ListedEntry>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(dir)? {
            let entry = entry?;

            if let Some(listed) = listed_entry(entry.file_name(), entry.file_type())? {
                entries.push(listed);
            }
        }

        Ok(entries)
    }

    fn file_size(&self, path: &Path) -> io::Result<u64> {
        fs::symlink_metadata(path).map(|metadata| metadata.len())
    }
}

/// An entry removed between readdir and lstat is dropped from the listing
/// rather than failing it.
fn listed_entry(
    name: OsString,
    file_type: io::Result<FileType>,
) -> io::Result<Option<ListedEntry>> {
    match file_type {
        Ok(file_type) => Ok(Some(ListedEntry::new(name, file_type.is_dir()))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}
