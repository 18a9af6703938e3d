use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::trace;

use super::{ArchiveError, COPY_BUFFER, EntryKind};
use crate::pathguard;

/// Extracts a gzip-compressed tar stream under `dest`.
///
/// Every entry is resolved against `dest` and must stay inside it; the check
/// runs per entry, before any directory or file is created for it. The first
/// error stops extraction and whatever was already written stays on disk.
///
/// Returns the number of file content bytes written.
pub fn unpack<R: Read>(reader: R, dest: &Path) -> Result<u64, ArchiveError> {
    let mut archive = Archive::new(GzDecoder::new(reader));
    let root = pathguard::absolute(dest);
    let mut total = 0u64;

    for entry in archive.entries().map_err(ArchiveError::Malformed)? {
        let mut entry = entry.map_err(ArchiveError::Malformed)?;
        let name = entry.path().map_err(ArchiveError::Malformed)?.into_owned();
        let target = pathguard::resolve(dest, &name)?;
        let entry_type = entry.header().entry_type();

        match EntryKind::from(entry_type) {
            EntryKind::Directory => {
                fs::create_dir_all(&target).map_err(|source| ArchiveError::CreateDir {
                    path: target.clone(),
                    source,
                })?;
            }
            EntryKind::File if target == root => return Err(ArchiveError::FileOverRoot(target)),
            EntryKind::File => {
                let written = write_file(&mut entry, &target)?;
                trace!(path = %target.display(), bytes = written, "extracted file");
                total += written;
            }
            EntryKind::Unsupported => {
                return Err(ArchiveError::UnsupportedEntry {
                    kind: format!("{entry_type:?}"),
                    name: name.display().to_string(),
                });
            }
        }
    }

    // Drain the end-of-archive padding and gzip trailer so a corrupt
    // checksum is still reported.
    io::copy(&mut archive.into_inner(), &mut io::sink()).map_err(ArchiveError::Malformed)?;
    Ok(total)
}

/// Saves a raw byte stream as a single file at `target`, creating parent
/// directories as needed.
pub fn save_file<R: Read>(mut reader: R, target: &Path) -> Result<u64, ArchiveError> {
    write_file(&mut reader, target)
}

fn write_file(reader: &mut impl Read, target: &Path) -> Result<u64, ArchiveError> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|source| ArchiveError::CreateDir {
            path: parent.to_owned(),
            source,
        })?;
    }
    let mut file = File::create(target).map_err(|source| ArchiveError::CreateFile {
        path: target.to_owned(),
        source,
    })?;

    let mut buf = vec![0u8; COPY_BUFFER];
    let mut written = 0u64;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ArchiveError::Malformed(e)),
        };
        file.write_all(&buf[..n]).map_err(|source| ArchiveError::WriteFile {
            path: target.to_owned(),
            source,
        })?;
        written += n as u64;
    }

    file.flush().map_err(|source| ArchiveError::WriteFile {
        path: target.to_owned(),
        source,
    })?;
    Ok(written)
}
