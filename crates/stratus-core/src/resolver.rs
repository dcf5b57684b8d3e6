//! Maps container identifiers and cloud file names to local paths.

use std::path::{Component, Path, PathBuf};

use crate::{CloudProvider, StoreError, StoreResult};

/// Suffix of the provider's placeholder for a remote-only file.
pub const PLACEHOLDER_SUFFIX: &str = ".icloud";

/// Resolve the root location for a container and optional subdirectory.
pub fn resolve_root(
    provider: &dyn CloudProvider,
    container_id: &str,
    directory: Option<&str>,
) -> StoreResult<PathBuf> {
    let root = provider
        .container_root(container_id)
        .ok_or(StoreError::ContainerUnavailable)?;

    match directory {
        Some(dir) if !dir.is_empty() => {
            check_relative(dir)?;
            Ok(root.join(dir))
        }
        _ => Ok(root),
    }
}

/// Join a cloud file name onto a resolved root.
pub fn resolve_item(root: &Path, name: &str) -> StoreResult<PathBuf> {
    if name.is_empty() {
        return Err(StoreError::invalid("cloud file name cannot be empty"));
    }
    check_relative(name)?;
    Ok(root.join(name))
}

/// Path of the placeholder the provider keeps for a remote-only file.
///
/// `/c/docs/a.txt` becomes `/c/docs/.a.txt.icloud`.
pub fn placeholder_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_string_lossy();
    let placeholder = format!(".{name}{PLACEHOLDER_SUFFIX}");
    Some(match path.parent() {
        Some(parent) => parent.join(placeholder),
        None => PathBuf::from(placeholder),
    })
}

/// Inverse of [`placeholder_path`]: the logical file behind a placeholder.
pub fn logical_path(placeholder: &Path) -> Option<PathBuf> {
    let name = placeholder.file_name()?.to_str()?;
    let inner = name.strip_prefix('.')?.strip_suffix(PLACEHOLDER_SUFFIX)?;
    if inner.is_empty() {
        return None;
    }
    Some(match placeholder.parent() {
        Some(parent) => parent.join(inner),
        None => PathBuf::from(inner),
    })
}

fn check_relative(value: &str) -> StoreResult<()> {
    let path = Path::new(value);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes {
        return Err(StoreError::invalid(format!(
            "path must stay inside the container: {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_round_trip_names() {
        let placeholder = placeholder_path(Path::new("/c/docs/a.txt")).unwrap();
        assert_eq!(placeholder, PathBuf::from("/c/docs/.a.txt.icloud"));
        assert_eq!(logical_path(&placeholder), Some(PathBuf::from("/c/docs/a.txt")));
    }

    #[test]
    fn test_logical_path_rejects_plain_files() {
        assert_eq!(logical_path(Path::new("/c/a.txt")), None);
        assert_eq!(logical_path(Path::new("/c/.icloud")), None);
        assert_eq!(logical_path(Path::new("/c/..icloud")), None);
    }

    #[test]
    fn test_resolve_item_rejects_escapes() {
        let root = Path::new("/c");
        assert!(resolve_item(root, "a/b.txt").is_ok());
        assert!(resolve_item(root, "../b.txt").is_err());
        assert!(resolve_item(root, "/etc/passwd").is_err());
        assert!(resolve_item(root, "").is_err());
    }
}
