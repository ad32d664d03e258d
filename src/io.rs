//! Filesystem utilities that attach error context.

use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::{with_err_context, ErrorContext, Result};

/// Creates a directory and all of its parents.
pub fn create_dir_all(path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    with_err_context(std::fs::create_dir_all(path), || {
        ErrorContext::CreateDir(path.to_path_buf())
    })?;
    Ok(())
}

/// Creates a file, as well as its parent directories if necessary.
pub fn create_file(path: impl AsRef<Path>) -> Result<File> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    let f = with_err_context(File::create(path), || {
        ErrorContext::CreateFile(path.to_path_buf())
    })?;
    Ok(f)
}

/// Reads a file into a string.
pub fn read_to_string(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let contents = with_err_context(std::fs::read_to_string(path), || {
        ErrorContext::ReadFile(path.to_path_buf())
    })?;
    Ok(contents)
}

/// Writes a string to a file, creating parent directories if necessary.
pub fn write_string(path: impl AsRef<Path>, contents: &str) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    with_err_context(std::fs::write(path, contents), || {
        ErrorContext::CreateFile(path.to_path_buf())
    })?;
    Ok(())
}

/// Returns the canonical, absolute form of a path.
pub fn canonicalize(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let path = with_err_context(std::fs::canonicalize(path), || {
        ErrorContext::Task(format!("resolving path {path:?}"))
    })?;
    Ok(path)
}
