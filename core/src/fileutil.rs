//! File Utility Functions

use std::fs;
use std::path::{Path, PathBuf};
use std::result::Result;

/// Returns the absolute path after resolving the given path.
///
/// * `path` - The path.
pub fn absolute_path(path: &str) -> Result<String, String> {
    match PathBuf::from(path)
        .canonicalize()
        .map(PathBuf::into_os_string)
        .map(|s| s.into_string().ok())
    {
        Ok(Some(abs_path)) => Ok(abs_path),
        Ok(None) => Err(format!("invalid path {}", path)),
        Err(err) => Err(format!("invalid path {}. {}.", path, err)),
    }
}

/// Returns the parent directory of a path, if any.
///
/// * `path` - The path.
pub fn parent_path(path: &str) -> Option<String> {
    Path::new(path)
        .parent()
        .and_then(|p| p.to_str())
        .filter(|p| !p.is_empty())
        .map(String::from)
}

/// Resolves `path` against `base_dir` unless it is already absolute.
///
/// * `path`     - The path.
/// * `base_dir` - Directory relative paths are resolved against.
pub fn resolve_path(path: &str, base_dir: Option<&str>) -> String {
    match base_dir {
        Some(dir) if Path::new(path).is_relative() => {
            Path::new(dir).join(path).to_string_lossy().into_owned()
        }
        _ => path.to_string(),
    }
}

/// Reads an entire text file.
///
/// * `path` - The path.
pub fn file_to_string(path: &str) -> Result<String, String> {
    debug!("Reading '{}'", path);
    fs::read_to_string(path).map_err(|err| format!("Error reading file '{}': {}", path, err))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_are_resolved_against_base() {
        assert_eq!(resolve_path("a.xml", Some("/data")), "/data/a.xml");
        assert_eq!(resolve_path("/abs/a.xml", Some("/data")), "/abs/a.xml");
        assert_eq!(resolve_path("a.xml", None), "a.xml");
    }

    #[test]
    fn parent_of_bare_file_is_none() {
        assert_eq!(parent_path("scene.rad"), None);
        assert_eq!(parent_path("/tmp/scene.rad").as_deref(), Some("/tmp"));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = file_to_string("/definitely/not/here.rad").unwrap_err();
        assert!(err.contains("/definitely/not/here.rad"));
    }

    #[test]
    fn file_contents_are_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.rad");
        std::fs::write(&path, "void plastic red\n").unwrap();
        let s = file_to_string(path.to_str().unwrap()).unwrap();
        assert_eq!(s, "void plastic red\n");
        assert!(absolute_path(path.to_str().unwrap()).is_ok());
    }
}
