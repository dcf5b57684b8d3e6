//! Synchronous filesystem steps of store operations.
//!
//! These run inside `spawn_blocking`; they are short relative to transfer
//! latency and are not cancellable mid-flight.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use stratus_core::resolver::placeholder_path;
use stratus_core::{StoreError, StoreResult};
use tracing::debug;

/// Run a filesystem step on the blocking pool.
pub(crate) async fn blocking<T, F>(step: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> StoreResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(step)
        .await
        .unwrap_or_else(|e| Err(StoreError::provider(format!("filesystem task failed: {e}"))))
}

/// Copy `source` to `dest`, replacing whatever is at `dest`.
///
/// Missing parent directories of `dest` are created. Returns bytes copied.
pub fn replace_copy(source: &Path, dest: &Path) -> StoreResult<u64> {
    let metadata = fs::metadata(source).map_err(|e| StoreError::io(source, e))?;

    if let Some(parent) = dest.parent() {
        if !parent.exists() {
            debug!(dir = %parent.display(), "creating directory");
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }
    }

    remove_existing(dest)?;

    debug!(from = %source.display(), to = %dest.display(), "copying");
    if metadata.is_dir() {
        copy_dir_recursive(source, dest)
    } else {
        fs::copy(source, dest).map_err(|e| StoreError::io(source, e))
    }
}

/// Remove a container entry, or its placeholder when only the remote copy
/// exists. An entry that is already gone is not an error.
pub fn remove_entry(path: &Path) -> StoreResult<()> {
    if fs::symlink_metadata(path).is_ok() {
        debug!(path = %path.display(), "removing entry");
        return remove_existing(path);
    }

    let Some(placeholder) = placeholder_path(path) else {
        return Ok(());
    };
    debug!(path = %placeholder.display(), "removing placeholder");
    match fs::remove_file(&placeholder) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "already absent");
            Ok(())
        }
        Err(e) => Err(StoreError::io(placeholder, e)),
    }
}

/// Every path below `root`, relative to it. A missing root yields nothing.
pub fn sub_paths(root: &Path) -> Vec<String> {
    if !root.is_dir() {
        return Vec::new();
    }

    WalkDir::new(root)
        .skip_hidden(false)
        .sort(true)
        .min_depth(1)
        .into_iter()
        .flatten()
        .filter_map(|entry| {
            entry
                .path()
                .strip_prefix(root)
                .ok()
                .map(|rel| rel.to_string_lossy().into_owned())
        })
        .collect()
}

fn remove_existing(path: &Path) -> StoreResult<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(StoreError::io(path, e)),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|e| StoreError::io(path, e))
}

fn copy_dir_recursive(source: &Path, dest: &Path) -> StoreResult<u64> {
    fs::create_dir_all(dest).map_err(|e| StoreError::io(dest, e))?;

    let mut total_bytes = 0u64;
    let entries = fs::read_dir(source).map_err(|e| StoreError::io(source, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(source, e))?;
        let path: PathBuf = entry.path();
        let dest_path = dest.join(entry.file_name());

        if path.is_dir() {
            total_bytes += copy_dir_recursive(&path, &dest_path)?;
        } else {
            total_bytes += fs::copy(&path, &dest_path).map_err(|e| StoreError::io(&path, e))?;
        }
    }

    Ok(total_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_replace_copy_overwrites() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("src.txt");
        let dest = dir.path().join("nested").join("dest.txt");
        fs::write(&source, b"new").unwrap();
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, b"old contents").unwrap();

        let bytes = replace_copy(&source, &dest).unwrap();
        assert_eq!(bytes, 3);
        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn test_replace_copy_missing_source() {
        let dir = TempDir::new().unwrap();
        let err = replace_copy(&dir.path().join("nope"), &dir.path().join("d")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn test_remove_entry_prefers_file_then_placeholder() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        fs::write(&file, b"a").unwrap();
        remove_entry(&file).unwrap();
        assert!(!file.exists());

        let placeholder = dir.path().join(".b.txt.icloud");
        fs::write(&placeholder, b"b").unwrap();
        remove_entry(&dir.path().join("b.txt")).unwrap();
        assert!(!placeholder.exists());

        remove_entry(&dir.path().join("never.txt")).unwrap();
    }

    #[test]
    fn test_sub_paths_includes_directories() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs").join("a.txt"), b"a").unwrap();

        assert_eq!(
            sub_paths(dir.path()),
            vec!["docs".to_string(), "docs/a.txt".to_string()]
        );
        assert!(sub_paths(&dir.path().join("missing")).is_empty());
    }
}
