use std::fs;
use std::path::{Component, Path, PathBuf};

use super::{ArchiveEntry, ArchiveError, EntryKind};

/// Lazy, depth-first, pre-order walk of a filesystem tree.
///
/// Siblings are visited in lexical byte order of their names, so the same
/// tree always produces the same entry sequence. Only one directory listing
/// is held in memory per level of depth still being visited.
///
/// Symlinks are reported (as [`EntryKind::Unsupported`]) but never followed.
pub struct TreeWalk {
    root: PathBuf,
    single_file: bool,
    pending: Vec<PathBuf>,
}

impl TreeWalk {
    pub fn new(root: &Path) -> Result<Self, ArchiveError> {
        let metadata = fs::symlink_metadata(root).map_err(|source| ArchiveError::ReadSource {
            path: root.to_owned(),
            source,
        })?;
        Ok(Self {
            root: root.to_owned(),
            single_file: !metadata.is_dir(),
            pending: vec![root.to_owned()],
        })
    }

    fn entry_for(&mut self, path: PathBuf) -> Result<ArchiveEntry, ArchiveError> {
        let metadata = fs::symlink_metadata(&path).map_err(|source| ArchiveError::ReadSource {
            path: path.clone(),
            source,
        })?;
        let kind = EntryKind::from(metadata.file_type());
        let name = self.name_of(&path)?;

        if kind == EntryKind::Directory {
            self.push_children(&path)?;
        }

        Ok(ArchiveEntry {
            kind,
            name,
            size: if kind == EntryKind::File { metadata.len() } else { 0 },
            source: path,
            metadata,
        })
    }

    fn push_children(&mut self, dir: &Path) -> Result<(), ArchiveError> {
        let read_err = |source: std::io::Error| ArchiveError::ReadSource { path: dir.to_owned(), source };
        let mut children = fs::read_dir(dir)
            .map_err(read_err)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err)?;
        children.sort();
        // Reverse so the lexically smallest child is popped first.
        self.pending.extend(children.into_iter().rev());
        Ok(())
    }

    fn name_of(&self, path: &Path) -> Result<String, ArchiveError> {
        let non_utf8 = || ArchiveError::NonUtf8Path(path.to_owned());

        if self.single_file {
            return path
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_owned)
                .ok_or_else(non_utf8);
        }

        let relative = path.strip_prefix(&self.root).map_err(|_| non_utf8())?;
        let mut parts = Vec::new();
        for component in relative.components() {
            if let Component::Normal(part) = component {
                parts.push(part.to_str().ok_or_else(non_utf8)?);
            }
        }
        if parts.is_empty() {
            return Ok(".".to_owned());
        }
        Ok(parts.join("/"))
    }
}

impl Iterator for TreeWalk {
    type Item = Result<ArchiveEntry, ArchiveError>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.pending.pop()?;
        Some(self.entry_for(path))
    }
}
