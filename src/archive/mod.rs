//! Streaming tar+gzip codec.
//!
//! [`pack`] turns a directory tree (or a single file) into a gzip-compressed
//! tar stream written to any [`std::io::Write`]. [`unpack`] does the reverse
//! from any [`std::io::Read`], checking every entry against the destination
//! root before touching the filesystem.
//!
//! Neither side buffers a whole file or the whole archive: entries are
//! produced lazily by [`TreeWalk`] and file contents are copied through a
//! fixed-size buffer. Both functions are blocking; callers on an async
//! runtime run them on the blocking pool.
//!
//! Only directories and regular files are supported. Symlinks, hardlinks and
//! device nodes are rejected in both directions.

mod pack;
mod unpack;
mod walk;

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::pathguard::PathEscape;

pub use pack::pack;
pub use unpack::{save_file, unpack};
pub use walk::TreeWalk;

/// Copy buffer used for entry contents.
pub(crate) const COPY_BUFFER: usize = 64 * 1024;

/// What a single archive entry holds.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EntryKind {
    Directory,
    File,
    Unsupported,
}

impl From<fs::FileType> for EntryKind {
    fn from(file_type: fs::FileType) -> Self {
        if file_type.is_dir() {
            Self::Directory
        } else if file_type.is_file() {
            Self::File
        } else {
            Self::Unsupported
        }
    }
}

impl From<tar::EntryType> for EntryKind {
    fn from(entry_type: tar::EntryType) -> Self {
        if entry_type.is_dir() {
            Self::Directory
        } else if entry_type.is_file() {
            Self::File
        } else {
            Self::Unsupported
        }
    }
}

/// One filesystem node on its way into an archive.
///
/// `name` is root-relative and always slash-separated. A directory root is
/// named `.`; a single-file root is named by its base file name.
#[derive(Debug)]
pub struct ArchiveEntry {
    pub kind: EntryKind,
    pub name: String,
    pub size: u64,
    pub(crate) source: PathBuf,
    pub(crate) metadata: fs::Metadata,
}

/// Errors produced while packing or unpacking.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("malformed input stream: {0}")]
    Malformed(#[source] io::Error),

    #[error(transparent)]
    PathEscape(#[from] PathEscape),

    #[error("unsupported entry type {kind} for {name}")]
    UnsupportedEntry { kind: String, name: String },

    #[error("{} is the destination directory, not a file", .0.display())]
    FileOverRoot(PathBuf),

    #[error("non UTF-8 path {}", .0.display())]
    NonUtf8Path(PathBuf),

    #[error("failed creating dir {}: {source}", path.display())]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed creating file {}: {source}", path.display())]
    CreateFile { path: PathBuf, source: io::Error },

    #[error("failed writing file {}: {source}", path.display())]
    WriteFile { path: PathBuf, source: io::Error },

    #[error("failed reading {}: {source}", path.display())]
    ReadSource { path: PathBuf, source: io::Error },

    #[error("failed writing archive: {0}")]
    Output(#[source] io::Error),
}

impl ArchiveError {
    /// True when the error was caused by what the client sent (bad framing,
    /// a hostile path, an entry type we refuse) rather than by the server's
    /// own filesystem.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Malformed(_) | Self::PathEscape(_) | Self::UnsupportedEntry { .. }
                | Self::FileOverRoot(_)
                | Self::NonUtf8Path(_)
        )
    }
}
