//! Project discovery and structure

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the directory marking a project root
pub const PROJECT_DIR: &str = ".spk";

/// Represents an SPK project
#[derive(Debug, Clone)]
pub struct Project {
    /// Root directory of the project (parent of .spk/)
    root: PathBuf,
}

impl Project {
    /// Find project root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current = std::env::current_dir()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find project root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            if current.join(PROJECT_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Create a new project structure at the given path
    pub fn init(path: &Path) -> Result<Self, ProjectError> {
        let root = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        if root.join(PROJECT_DIR).exists() {
            return Err(ProjectError::AlreadyExists(root.clone()));
        }
        Self::write_structure(root)
    }

    /// Force initialization even if .spk/ exists
    ///
    /// Only the config file is rewritten; existing databases are kept.
    pub fn init_force(path: &Path) -> Result<Self, ProjectError> {
        let root = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());
        Self::write_structure(root)
    }

    fn write_structure(root: PathBuf) -> Result<Self, ProjectError> {
        let spk_dir = root.join(PROJECT_DIR);
        std::fs::create_dir_all(&spk_dir).map_err(|e| ProjectError::IoError(e.to_string()))?;

        std::fs::write(spk_dir.join("config.yaml"), Self::default_config())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        std::fs::write(spk_dir.join(".gitignore"), "*.db\n*.db-wal\n*.db-shm\n")
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        Ok(Self { root })
    }

    fn default_config() -> &'static str {
        r#"# SPK Project Configuration

# Primary database (relative to the project root)
# database: .spk/parking.db

# Search index database (relative to the project root)
# search_index: .spk/search.db

# Address for `spk serve`
# bind: 127.0.0.1:8080

# Principal recorded in created_by / last_modified_by (default: $USER)
# auditor: ""

# Application name used in X-<name>-alert response headers
# application_name: smartParkingApp
"#
    }

    /// Open an existing project rooted at `path` without walking up
    pub fn at(path: &Path) -> Result<Self, ProjectError> {
        let root = path
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        if !root.join(PROJECT_DIR).is_dir() {
            return Err(ProjectError::NotFound {
                searched_from: path.to_path_buf(),
            });
        }
        Ok(Self { root })
    }

    /// Get the project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .spk configuration directory
    pub fn spk_dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }
}

/// Errors that can occur during project operations
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not an SPK project (searched from {searched_from:?}). Run 'spk init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("SPK project already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_project_init_creates_structure() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();

        assert!(project.spk_dir().is_dir());
        assert!(project.spk_dir().join("config.yaml").exists());
    }

    #[test]
    fn test_project_init_fails_if_exists() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let err = Project::init(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::AlreadyExists(_)));
        assert!(Project::init_force(tmp.path()).is_ok());
    }

    #[test]
    fn test_project_discover_finds_spk_dir() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let subdir = tmp.path().join("some/nested/dir");
        std::fs::create_dir_all(&subdir).unwrap();

        let project = Project::discover_from(&subdir).unwrap();
        assert_eq!(
            project.root().canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_project_discover_fails_without_spk_dir() {
        let tmp = tempdir().unwrap();
        let err = Project::discover_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound { .. }));
        assert!(Project::at(tmp.path()).is_err());
    }
}
