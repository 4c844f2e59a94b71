//! Shared helper functions for CLI commands

use std::fs;
use std::sync::Arc;

use miette::{IntoDiagnostic, Result};

use crate::cli::GlobalOpts;
use crate::core::audit::FixedAuditor;
use crate::core::config::Config;
use crate::core::project::Project;
use crate::core::search::SqliteSearchIndex;
use crate::core::service::ResourceService;
use crate::core::store::PrimaryStore;

/// A located project with its merged configuration
pub struct Workspace {
    pub project: Project,
    pub config: Config,
}

impl Workspace {
    /// Locate the project from `--project` or by walking up from the working directory
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let project = match &global.project {
            Some(path) => Project::at(path),
            None => Project::discover(),
        }
        .map_err(|e| miette::miette!("{}", e))?;

        let config = Config::load_for(Some(&project));
        Ok(Self { project, config })
    }

    /// Open both stores and wire them into a service
    pub fn service(&self) -> Result<ResourceService> {
        let root = self.project.root();
        let store = PrimaryStore::open(self.config.database_path(root))?;
        let index = SqliteSearchIndex::open(self.config.search_index_path(root))?;
        let auditor = Arc::new(FixedAuditor::new(self.config.auditor()));
        Ok(ResourceService::new(store, index, auditor))
    }
}

/// Read a JSON payload given inline, as `@file`, or as `-` for stdin
pub fn read_payload(raw: &str) -> Result<String> {
    if raw == "-" {
        let mut buf = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf).into_diagnostic()?;
        Ok(buf)
    } else if let Some(path) = raw.strip_prefix('@') {
        fs::read_to_string(path)
            .map_err(|e| miette::miette!("cannot read payload file {}: {}", path, e))
    } else {
        Ok(raw.to_string())
    }
}

/// Truncate a string to max_len, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
