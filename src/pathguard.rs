//! Lexical path containment.
//!
//! Every path that arrives from the network (a `Deploy-Path` header, a tar
//! entry name, a static file request) is joined onto a root and checked here
//! before any filesystem call. The check is purely lexical: `.` and `..`
//! segments are folded, nothing is stat-ed and symlinks are not followed.
//!
//! Containment is decided per path component, so `/var/www-evil` is *not*
//! inside `/var/www` even though it shares the textual prefix.

use std::env;
use std::path::{Component, Path, PathBuf};

/// A candidate path resolved outside of its root.
#[derive(Debug, thiserror::Error)]
#[error("the path {} is not a suitable one, it is outside of {}", candidate.display(), root.display())]
pub struct PathEscape {
    pub root: PathBuf,
    pub candidate: PathBuf,
}

/// Accepts `candidate` iff its absolute, cleaned form lies inside the
/// absolute, cleaned form of `root` (or is `root` itself).
pub fn contain(root: &Path, candidate: &Path) -> Result<(), PathEscape> {
    let root = absolute(root);
    let candidate = absolute(candidate);
    if candidate.starts_with(&root) {
        Ok(())
    } else {
        Err(PathEscape { root, candidate })
    }
}

/// Joins an untrusted, slash-separated `relative` path onto `root`, cleans
/// the result and checks it with [`contain`].
///
/// Leading `/` in `relative` does not reset the base the way
/// [`Path::join`] would: `/etc/passwd` lands at `root/etc/passwd`. The
/// returned path is the cleaned one, so callers never hand `..` segments to
/// the operating system.
pub fn resolve(root: &Path, relative: impl AsRef<Path>) -> Result<PathBuf, PathEscape> {
    let mut joined = absolute(root);
    for component in relative.as_ref().components() {
        match component {
            Component::Normal(part) => joined.push(part),
            Component::ParentDir => joined.push(".."),
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
        }
    }
    let candidate = clean(&joined);
    contain(root, &candidate)?;
    Ok(candidate)
}

/// Makes `path` absolute against the working directory and folds `.`/`..`.
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return clean(path);
    }
    // A missing working directory leaves both sides of a comparison relative,
    // which still compares consistently.
    let base = env::current_dir().unwrap_or_default();
    clean(&base.join(path))
}

fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            // `pop` on the filesystem root is a no-op: `/..` is `/`.
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}
