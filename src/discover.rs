//! Container discovery for the `virtual` and `checksum` commands.
//!
//! Expands a mixed list of files and directories into a sorted list of
//! `.rpk` container paths, optionally recursing into subdirectories, and
//! applies glob-style select/filter patterns. The composer itself consumes
//! the pre-resolved list; it never walks the filesystem.

use std::path::{Path, PathBuf};

use glob::Pattern;

use crate::format::CONTAINER_EXT;

/// Errors raised while discovering container files.
#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    /// An input path is neither a container file nor a directory
    #[error("'{path}' is not a container file or directory")]
    NotFound {
        /// Offending input
        path: PathBuf,
    },

    /// A select/filter pattern is not valid glob syntax
    #[error("invalid pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    /// A directory could not be listed
    #[error("I/O error at '{path}': {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying I/O failure
        source: std::io::Error,
    },
}

/// Expands `inputs` into a sorted list of `.rpk` files.
///
/// File inputs are taken as-is (after an extension check); directory inputs
/// are scanned for containers, recursively when `recursive` is set.
pub fn collect_containers(
    inputs: &[PathBuf],
    recursive: bool,
) -> Result<Vec<PathBuf>, DiscoverError> {
    let mut found = Vec::new();

    for input in inputs {
        if input.is_file() {
            if has_container_ext(input) {
                found.push(input.clone());
            } else {
                return Err(DiscoverError::NotFound {
                    path: input.clone(),
                });
            }
        } else if input.is_dir() {
            scan_dir(input, recursive, &mut found)?;
        } else {
            return Err(DiscoverError::NotFound {
                path: input.clone(),
            });
        }
    }

    found.sort();
    found.dedup();
    Ok(found)
}

fn scan_dir(
    dir: &Path,
    recursive: bool,
    found: &mut Vec<PathBuf>,
) -> Result<(), DiscoverError> {
    let entries = std::fs::read_dir(dir).map_err(|source| DiscoverError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    for entry in entries {
        let entry = entry.map_err(|source| DiscoverError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if path.is_dir() {
            if recursive {
                scan_dir(&path, recursive, found)?;
            }
        } else if has_container_ext(&path) {
            found.push(path);
        }
    }
    Ok(())
}

fn has_container_ext(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == CONTAINER_EXT)
}

/// Keeps only the paths matching the glob `pattern`.
pub fn select(paths: Vec<PathBuf>, pattern: &str) -> Result<Vec<PathBuf>, DiscoverError> {
    let pattern = Pattern::new(pattern)?;
    Ok(paths
        .into_iter()
        .filter(|path| pattern.matches(&path.to_string_lossy()))
        .collect())
}

/// Drops the paths matching the glob `pattern`.
pub fn filter_out(paths: Vec<PathBuf>, pattern: &str) -> Result<Vec<PathBuf>, DiscoverError> {
    let pattern = Pattern::new(pattern)?;
    Ok(paths
        .into_iter()
        .filter(|path| !pattern.matches(&path.to_string_lossy()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn scans_directories_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.rpk"));
        touch(&dir.path().join("a.rpk"));
        touch(&dir.path().join("notes.txt"));
        fs::create_dir(dir.path().join("nested")).unwrap();
        touch(&dir.path().join("nested/c.rpk"));

        let flat = collect_containers(&[dir.path().to_path_buf()], false).unwrap();
        assert_eq!(flat.len(), 2);
        assert!(flat[0].ends_with("a.rpk"));
        assert!(flat[1].ends_with("b.rpk"));

        let deep = collect_containers(&[dir.path().to_path_buf()], true).unwrap();
        assert_eq!(deep.len(), 3);
    }

    #[test]
    fn non_container_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let stray = dir.path().join("notes.txt");
        touch(&stray);
        let err = collect_containers(&[stray], false).unwrap_err();
        assert!(matches!(err, DiscoverError::NotFound { .. }));
    }

    #[test]
    fn select_and_filter_apply_patterns() {
        let paths = vec![
            PathBuf::from("set.pt0.rpk"),
            PathBuf::from("set.pt1.rpk"),
            PathBuf::from("other.rpk"),
        ];

        let selected = select(paths.clone(), "*.pt*.rpk").unwrap();
        assert_eq!(selected.len(), 2);

        let remaining = filter_out(paths, "*.pt*.rpk").unwrap();
        assert_eq!(remaining, [PathBuf::from("other.rpk")]);
    }
}
