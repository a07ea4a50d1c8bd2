use crate::error::{PguError, Result};
use std::path::{Path, PathBuf};

const SYSTEM_DIRECTORIES: &[&str] = &["/etc", "/sys", "/proc", "/dev", "/boot"];

/// Path checks applied before anything is written to disk.
pub struct PathValidator;

impl PathValidator {
    /// Canonicalises a repository directory and refuses system locations.
    pub fn validate_project_path(path: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();

        let canonical = path.canonicalize().map_err(|e| {
            PguError::ProjectValidation(format!("Invalid path '{}': {e}", path.display()))
        })?;

        if !canonical.is_dir() {
            return Err(PguError::ProjectValidation(format!(
                "Path '{}' is not a directory",
                canonical.display()
            )));
        }

        if let Some(system) = Self::system_directory(path, &canonical) {
            return Err(PguError::ProjectValidation(format!(
                "Access to system directory '{}' is not allowed",
                system
            )));
        }

        Ok(canonical)
    }

    /// Ensures `path` resolves to a location inside `base_dir`.
    pub fn validate_file_path(path: impl AsRef<Path>, base_dir: impl AsRef<Path>) -> Result<PathBuf> {
        let path = path.as_ref();
        let base_dir = base_dir.as_ref();

        let canonical = path.canonicalize().map_err(|e| {
            PguError::ProjectValidation(format!("Invalid file path '{}': {e}", path.display()))
        })?;
        let canonical_base = base_dir.canonicalize().map_err(|e| {
            PguError::ProjectValidation(format!(
                "Invalid base directory '{}': {e}",
                base_dir.display()
            ))
        })?;

        if !canonical.starts_with(&canonical_base) {
            return Err(PguError::ProjectValidation(format!(
                "'{}' is outside '{}'",
                canonical.display(),
                canonical_base.display()
            )));
        }

        Ok(canonical)
    }

    fn system_directory(path: &Path, canonical: &Path) -> Option<&'static str> {
        SYSTEM_DIRECTORIES.iter().copied().find(|system| {
            let system_path = Path::new(system);
            path.starts_with(system_path)
                || canonical.starts_with(system_path)
                || system_path
                    .canonicalize()
                    .is_ok_and(|resolved| canonical.starts_with(resolved))
        })
    }
}
