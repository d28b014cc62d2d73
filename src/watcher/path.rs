use crate::error::WatchResult;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Resolves `path` to the identity key used by the registry.
///
/// The path is made absolute and `.`/`..` are folded lexically. When the
/// parent directory exists it is canonicalized so symlinked directories and
/// the paths the OS reports back agree; the final component is kept as-is
/// because the file itself may not exist yet.
pub fn canonical_path(path: &Path) -> WatchResult<PathBuf> {
    let absolute = normalize(&std::path::absolute(path)?);

    match (absolute.parent(), absolute.file_name()) {
        (Some(parent), Some(name)) => match fs::canonicalize(parent) {
            Ok(parent) => Ok(parent.join(name)),
            Err(_) => Ok(absolute),
        },
        _ => Ok(absolute),
    }
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
