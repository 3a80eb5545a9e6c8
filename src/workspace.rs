//! The run directory every stage executes in.
//!
//! Stages refer to their inputs and outputs by relative name, so the
//! workspace is passed to each of them as an explicit handle instead of
//! living in a process-wide location.

use crate::errors::WorkspaceError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// File the submitted source is written to.
pub const SOURCE_FILE: &str = "KotlinExplorer.kt";
/// R8 keep rules, regenerated before every optimize stage.
pub const RULES_FILE: &str = "rules.txt";
/// Extension of compiler-produced units.
pub const CLASS_EXTENSION: &str = "class";
/// Optimized artifact written by R8 into the workspace.
pub const DEX_FILE: &str = "classes.dex";
/// Where the optimized artifact is pushed on the device.
pub const DEVICE_DEX_PATH: &str = "/sdcard/classes.dex";
/// Where dex2oat writes the native artifact on the device.
pub const DEVICE_OAT_PATH: &str = "/sdcard/classes.oat";

/// Whether `path` names a compiled unit: a UTF-8 file name ending in `.class`.
///
/// Cleanup and artifact listing both go through this, so whatever one
/// considers stale the other never passes on to a tool.
pub fn is_class_file(path: &Path) -> bool {
    let suffix = format!(".{}", CLASS_EXTENSION);
    path.file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.ends_with(&suffix))
        && path.is_file()
}

#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    // Held so the directory lives as long as the handle.
    _temp: Option<TempDir>,
}

impl Workspace {
    /// Use (and create if needed) a fixed directory shared across runs.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self, WorkspaceError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| WorkspaceError::CreateFailed {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root, _temp: None })
    }

    /// Create a private directory that is removed when the handle drops.
    pub fn ephemeral() -> Result<Self, WorkspaceError> {
        let temp = tempfile::Builder::new()
            .prefix("dexplorer-")
            .tempdir()
            .map_err(|source| WorkspaceError::CreateFailed {
                path: std::env::temp_dir(),
                source,
            })?;
        Ok(Self {
            root: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_ephemeral(&self) -> bool {
        self._temp.is_some()
    }

    pub fn source_path(&self) -> PathBuf {
        self.root.join(SOURCE_FILE)
    }

    /// Reset the directory for a new submission.
    ///
    /// Only compiled units from the previous run are removed; everything
    /// else stays and is overwritten by later stages.
    pub fn prepare(&self, source: &str) -> Result<(), WorkspaceError> {
        let removed = self.remove_class_files()?;
        debug!(workspace = %self.root.display(), removed, "Removed stale class files");

        let path = self.source_path();
        std::fs::write(&path, source).map_err(|source| WorkspaceError::WriteFailed {
            path: path.clone(),
            source,
        })
    }

    fn remove_class_files(&self) -> Result<usize, WorkspaceError> {
        let entries = std::fs::read_dir(&self.root).map_err(|source| {
            WorkspaceError::CleanupFailed {
                path: self.root.clone(),
                source,
            }
        })?;

        let mut removed = 0;
        for entry in entries {
            let path = entry
                .map_err(|source| WorkspaceError::CleanupFailed {
                    path: self.root.clone(),
                    source,
                })?
                .path();
            if is_class_file(&path) {
                std::fs::remove_file(&path)
                    .map_err(|source| WorkspaceError::CleanupFailed { path, source })?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_prepare_writes_source() {
        let dir = tempdir().unwrap();
        let ws = Workspace::at(dir.path()).unwrap();
        ws.prepare("fun main() {}").unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join(SOURCE_FILE)).unwrap(),
            "fun main() {}"
        );
    }

    #[test]
    fn test_prepare_removes_only_class_files() {
        let dir = tempdir().unwrap();
        for name in ["A.class", "B$1.class", "classes.dex", "rules.txt", "notes.class.txt"] {
            fs::write(dir.path().join(name), "old").unwrap();
        }
        let ws = Workspace::at(dir.path()).unwrap();
        ws.prepare("fun f() = 1").unwrap();

        assert!(!dir.path().join("A.class").exists());
        assert!(!dir.path().join("B$1.class").exists());
        assert_eq!(fs::read_to_string(dir.path().join("classes.dex")).unwrap(), "old");
        assert_eq!(fs::read_to_string(dir.path().join("rules.txt")).unwrap(), "old");
        assert!(dir.path().join("notes.class.txt").exists());
    }

    #[test]
    fn test_prepare_removes_bare_dot_class_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(".class"), "old").unwrap();
        let ws = Workspace::at(dir.path()).unwrap();
        ws.prepare("fun f() = 1").unwrap();
        assert!(!dir.path().join(".class").exists());
    }

    #[test]
    fn test_is_class_file() {
        let dir = tempdir().unwrap();
        for name in ["A.class", ".class", "A.classx", "class"] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("Dir.class")).unwrap();

        assert!(is_class_file(&dir.path().join("A.class")));
        assert!(is_class_file(&dir.path().join(".class")));
        assert!(!is_class_file(&dir.path().join("A.classx")));
        assert!(!is_class_file(&dir.path().join("class")));
        assert!(!is_class_file(&dir.path().join("Dir.class")));
        assert!(!is_class_file(&dir.path().join("Missing.class")));
    }

    #[test]
    fn test_prepare_overwrites_previous_source() {
        let dir = tempdir().unwrap();
        let ws = Workspace::at(dir.path()).unwrap();
        ws.prepare("first").unwrap();
        ws.prepare("second").unwrap();
        assert_eq!(fs::read_to_string(ws.source_path()).unwrap(), "second");
    }

    #[test]
    fn test_at_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        let ws = Workspace::at(&nested).unwrap();
        assert!(nested.is_dir());
        assert!(!ws.is_ephemeral());
    }

    #[test]
    fn test_ephemeral_is_removed_on_drop() {
        let ws = Workspace::ephemeral().unwrap();
        let root = ws.root().to_path_buf();
        assert!(root.is_dir());
        assert!(ws.is_ephemeral());
        drop(ws);
        assert!(!root.exists());
    }
}
