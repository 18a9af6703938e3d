use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{Builder, Header, HeaderMode};

use super::{ArchiveEntry, ArchiveError, EntryKind, TreeWalk};

/// Writes `root` as a gzip-compressed tar stream into `writer`.
///
/// Returns the number of file content bytes copied into the archive, which
/// excludes tar headers, padding and compression overhead.
pub fn pack<W: Write>(writer: W, root: &Path) -> Result<u64, ArchiveError> {
    let walk = TreeWalk::new(root)?;
    let mut builder = Builder::new(GzEncoder::new(writer, Compression::default()));
    builder.mode(HeaderMode::Complete);

    let mut total = 0u64;
    for entry in walk {
        total += append(&mut builder, &entry?)?;
    }

    let encoder = builder.into_inner().map_err(ArchiveError::Output)?;
    let mut writer = encoder.finish().map_err(ArchiveError::Output)?;
    writer.flush().map_err(ArchiveError::Output)?;
    Ok(total)
}

fn append<W: Write>(builder: &mut Builder<W>, entry: &ArchiveEntry) -> Result<u64, ArchiveError> {
    let mut header = Header::new_gnu();
    header.set_metadata_in_mode(&entry.metadata, HeaderMode::Complete);

    match entry.kind {
        EntryKind::Directory => {
            header.set_size(0);
            builder
                .append_data(&mut header, &entry.name, io::empty())
                .map_err(ArchiveError::Output)?;
            Ok(0)
        }
        EntryKind::File => {
            let file = File::open(&entry.source).map_err(|source| ArchiveError::ReadSource {
                path: entry.source.clone(),
                source,
            })?;
            header.set_size(entry.size);
            let mut reader = CountingReader::new(file.take(entry.size));
            let appended = builder.append_data(&mut header, &entry.name, &mut reader);

            if let Some(source) = reader.error.take() {
                return Err(ArchiveError::ReadSource { path: entry.source.clone(), source });
            }
            appended.map_err(ArchiveError::Output)?;

            if reader.count != entry.size {
                return Err(ArchiveError::ReadSource {
                    path: entry.source.clone(),
                    source: io::Error::new(io::ErrorKind::UnexpectedEof, "file shrank while archiving"),
                });
            }
            Ok(reader.count)
        }
        EntryKind::Unsupported => Err(ArchiveError::UnsupportedEntry {
            kind: format!("{:?}", entry.metadata.file_type()),
            name: entry.name.clone(),
        }),
    }
}

/// Counts bytes read and keeps the first read error apart from the write
/// errors `tar` reports through the same `io::Result`.
struct CountingReader<R> {
    inner: R,
    count: u64,
    error: Option<io::Error>,
}

impl<R> CountingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, count: 0, error: None }
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => {
                self.count += n as u64;
                Ok(n)
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                let relayed = io::Error::new(e.kind(), e.to_string());
                self.error = Some(e);
                Err(relayed)
            }
        }
    }
}
