//! Configuration management with layered hierarchy

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::core::audit::SYSTEM_ACCOUNT;
use crate::core::Project;

/// Default primary database, relative to the project root
pub const DEFAULT_DATABASE: &str = ".spk/parking.db";

/// Default search index, relative to the project root
pub const DEFAULT_SEARCH_INDEX: &str = ".spk/search.db";

pub const DEFAULT_BIND: &str = "127.0.0.1:8080";

pub const DEFAULT_APP_NAME: &str = "smartParkingApp";

/// SPK configuration with layered hierarchy
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Primary SQLite database file
    pub database: Option<PathBuf>,

    /// Search index SQLite file
    pub search_index: Option<PathBuf>,

    /// Address for `spk serve`
    pub bind: Option<String>,

    /// Principal stamped into audit columns
    pub auditor: Option<String>,

    /// Application name used in alert headers
    pub application_name: Option<String>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        Self::load_for(Project::discover().ok().as_ref())
    }

    /// Load configuration using an already-located project
    pub fn load_for(project: Option<&Project>) -> Self {
        let mut config = Config::default();

        // 1. Built-in defaults (applied by the accessors)

        // 2. Global user config (~/.config/spk/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if let Some(global) = Self::read_file(&global_path) {
                config.merge(global);
            }
        }

        // 3. Project config (.spk/config.yaml)
        if let Some(project) = project {
            if let Some(project_config) = Self::read_file(&project.spk_dir().join("config.yaml")) {
                config.merge(project_config);
            }
        }

        // 4. Environment variables
        config.merge(Self::from_env());

        config
    }

    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                None
            }
        }
    }

    fn from_env() -> Config {
        Config {
            database: std::env::var_os("SPK_DATABASE").map(PathBuf::from),
            search_index: std::env::var_os("SPK_SEARCH_INDEX").map(PathBuf::from),
            bind: std::env::var("SPK_BIND").ok(),
            auditor: std::env::var("SPK_AUDITOR").ok(),
            application_name: std::env::var("SPK_APP_NAME").ok(),
        }
    }

    /// Get the path to the global config file
    fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "spk")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Merge another config into this one (other takes precedence)
    fn merge(&mut self, other: Config) {
        if other.database.is_some() {
            self.database = other.database;
        }
        if other.search_index.is_some() {
            self.search_index = other.search_index;
        }
        if other.bind.is_some() {
            self.bind = other.bind;
        }
        if other.auditor.is_some() {
            self.auditor = other.auditor;
        }
        if other.application_name.is_some() {
            self.application_name = other.application_name;
        }
    }

    /// Primary database path; relative paths resolve against the project root
    pub fn database_path(&self, root: &Path) -> PathBuf {
        resolve(root, self.database.as_deref(), DEFAULT_DATABASE)
    }

    pub fn search_index_path(&self, root: &Path) -> PathBuf {
        resolve(root, self.search_index.as_deref(), DEFAULT_SEARCH_INDEX)
    }

    pub fn bind(&self) -> String {
        self.bind.clone().unwrap_or_else(|| DEFAULT_BIND.to_string())
    }

    /// Get the acting principal, falling back to the login name
    pub fn auditor(&self) -> String {
        if let Some(ref auditor) = self.auditor {
            if !auditor.trim().is_empty() {
                return auditor.clone();
            }
        }

        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| SYSTEM_ACCOUNT.to_string())
    }

    pub fn application_name(&self) -> String {
        self.application_name
            .clone()
            .unwrap_or_else(|| DEFAULT_APP_NAME.to_string())
    }
}

fn resolve(root: &Path, configured: Option<&Path>, default: &str) -> PathBuf {
    match configured {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => root.join(path),
        None => root.join(default),
    }
}
