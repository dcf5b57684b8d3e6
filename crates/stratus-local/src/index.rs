//! On-disk view of a container: real files plus remote-only placeholders.

use std::path::{Path, PathBuf};

use jwalk::WalkDir;
use stratus_core::resolver::{logical_path, placeholder_path};
use tracing::warn;

/// One entry found on disk, before sync state is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DiskEntry {
    /// Logical path (the placeholder's target for remote-only files).
    pub path: PathBuf,
    pub is_dir: bool,
    /// False when only a placeholder exists.
    pub materialized: bool,
}

/// Look up a single logical path.
pub(crate) fn lookup(path: &Path) -> Option<DiskEntry> {
    if let Ok(metadata) = std::fs::symlink_metadata(path) {
        return Some(DiskEntry {
            path: path.to_path_buf(),
            is_dir: metadata.is_dir(),
            materialized: true,
        });
    }

    let placeholder = placeholder_path(path)?;
    placeholder.is_file().then(|| DiskEntry {
        path: path.to_path_buf(),
        is_dir: false,
        materialized: false,
    })
}

/// Walk everything below `root`. A missing root yields no entries.
pub(crate) fn walk(root: &Path) -> Vec<DiskEntry> {
    if !root.is_dir() {
        return Vec::new();
    }

    let walker = WalkDir::new(root)
        .skip_hidden(false)
        .follow_links(false)
        .sort(true)
        .min_depth(1);

    let mut entries = Vec::new();
    for entry_result in walker {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "skipping unreadable entry");
                continue;
            }
        };

        let path = entry.path();
        let is_dir = entry.file_type().is_dir();

        if !is_dir {
            if let Some(logical) = logical_path(&path) {
                // A materialized copy wins over a stale placeholder.
                if !logical.exists() {
                    entries.push(DiskEntry {
                        path: logical,
                        is_dir: false,
                        materialized: false,
                    });
                }
                continue;
            }
        }

        entries.push(DiskEntry {
            path,
            is_dir,
            materialized: true,
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_walk_maps_placeholders() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs").join(".b.txt.icloud"), b"b").unwrap();

        let entries = walk(dir.path());
        let paths: Vec<_> = entries.iter().map(|e| e.path.clone()).collect();

        assert_eq!(
            paths,
            vec![
                dir.path().join("a.txt"),
                dir.path().join("docs"),
                dir.path().join("docs").join("b.txt"),
            ]
        );
        assert!(!entries[2].materialized);
        assert!(entries[1].is_dir);
    }

    #[test]
    fn test_walk_missing_root() {
        let dir = TempDir::new().unwrap();
        assert!(walk(&dir.path().join("nope")).is_empty());
    }

    #[test]
    fn test_lookup_placeholder() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".c.bin.icloud"), b"c").unwrap();

        let entry = lookup(&dir.path().join("c.bin")).unwrap();
        assert!(!entry.materialized);
        assert!(lookup(&dir.path().join("d.bin")).is_none());
    }
}
