//! Audit context: who is acting, and what was stamped on a record

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Fallback principal when nobody is configured
pub const SYSTEM_ACCOUNT: &str = "system";

/// Supplies the acting principal for created/modified metadata
pub trait Auditor: Send + Sync {
    fn current_auditor(&self) -> String;
}

/// An auditor that always reports the same principal
#[derive(Debug, Clone)]
pub struct FixedAuditor(String);

impl FixedAuditor {
    pub fn new(principal: impl Into<String>) -> Self {
        let principal = principal.into();
        if principal.trim().is_empty() {
            Self(SYSTEM_ACCOUNT.to_string())
        } else {
            Self(principal)
        }
    }

    pub fn system() -> Self {
        Self(SYSTEM_ACCOUNT.to_string())
    }
}

impl Auditor for FixedAuditor {
    fn current_auditor(&self) -> String {
        self.0.clone()
    }
}

/// Audit columns of a stored record
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub created_by: String,
    pub created_date: DateTime<Utc>,
    pub last_modified_by: Option<String>,
    pub last_modified_date: Option<DateTime<Utc>>,
}
