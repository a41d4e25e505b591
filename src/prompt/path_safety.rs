//! Trusted-root path resolution.
//!
//! Resolves a relative path against a trusted root directory and rejects
//! anything that would land outside it: absolute overrides, `..` segments
//! that climb above the root, and symlinks whose target escapes. File
//! contents are never read here.

use std::path::{Component, Path, PathBuf};

use crate::{AppError, Result};

/// Resolve `relative` inside `root`.
///
/// Normalizes the candidate lexically before touching the file system, then
/// canonicalizes the root and, when the resolved path exists, the result too
/// so symlink escapes are caught.
/// Returns the absolute path on success; the path need not exist.
///
/// # Errors
///
/// - `AppError::Config` if the root cannot be canonicalized.
/// - `AppError::PathTraversal` if the candidate is absolute, climbs above
///   the root, or resolves through a symlink to a target outside the root.
pub fn resolve_within(root: &Path, relative: impl AsRef<Path>) -> Result<PathBuf> {
    let relative = relative.as_ref();

    let mut normalized = PathBuf::new();
    for component in relative.components() {
        match component {
            Component::ParentDir => {
                if !normalized.pop() {
                    return Err(AppError::PathTraversal(format!(
                        "{} escapes {}",
                        relative.display(),
                        root.display()
                    )));
                }
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::PathTraversal(format!(
                    "absolute path {} not allowed",
                    relative.display()
                )));
            }
            Component::Normal(part) => normalized.push(part),
        }
    }

    let root = root.canonicalize().map_err(|err| {
        AppError::Config(format!("trusted root {} unavailable: {err}", root.display()))
    })?;
    let absolute = root.join(normalized);

    if absolute.exists() {
        let canonical = absolute
            .canonicalize()
            .map_err(|err| AppError::Io(format!("cannot resolve {}: {err}", absolute.display())))?;

        if !canonical.starts_with(&root) {
            return Err(AppError::PathTraversal(format!(
                "{} resolves outside {}",
                relative.display(),
                root.display()
            )));
        }

        Ok(canonical)
    } else {
        Ok(absolute)
    }
}
