//! Error taxonomy shared by the stores, the service and both surfaces

use miette::Diagnostic;
use rusqlite::ffi;
use thiserror::Error;

use crate::core::identity::EntityKind;

/// Machine-readable error code carried by every user-visible failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKey {
    IdExists,
    IdNull,
    IdInvalid,
    IdNotFound,
    NotFound,
    Validation,
    RelationNotFound,
    BadQuery,
    Conflict,
    StoreUnavailable,
}

impl ErrorKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKey::IdExists => "idexists",
            ErrorKey::IdNull => "idnull",
            ErrorKey::IdInvalid => "idinvalid",
            ErrorKey::IdNotFound => "idnotfound",
            ErrorKey::NotFound => "notfound",
            ErrorKey::Validation => "validation",
            ErrorKey::RelationNotFound => "relationnotfound",
            ErrorKey::BadQuery => "badquery",
            ErrorKey::Conflict => "conflict",
            ErrorKey::StoreUnavailable => "storeunavailable",
        }
    }
}

impl std::fmt::Display for ErrorKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which of the two stores failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreRole {
    Primary,
    Mirror,
}

impl std::fmt::Display for StoreRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreRole::Primary => write!(f, "primary"),
            StoreRole::Mirror => write!(f, "search index"),
        }
    }
}

/// Failure of a resource operation
#[derive(Debug, Error, Diagnostic)]
pub enum ResourceError {
    #[error("{message} ({entity}: {key})")]
    #[diagnostic(code(spk::invalid_request))]
    InvalidRequest {
        entity: EntityKind,
        key: ErrorKey,
        message: String,
    },

    #[error("{message} ({entity}: {key})")]
    #[diagnostic(code(spk::not_found))]
    NotFound {
        entity: EntityKind,
        key: ErrorKey,
        message: String,
    },

    #[error("{message} ({entity}: conflict)")]
    #[diagnostic(code(spk::conflict))]
    Conflict { entity: EntityKind, message: String },

    #[error("{store} store unavailable for {entity}: {source}")]
    #[diagnostic(
        code(spk::store_unavailable),
        help("check that the database files are reachable and not locked by another process")
    )]
    StoreUnavailable {
        entity: EntityKind,
        store: StoreRole,
        #[source]
        source: rusqlite::Error,
    },
}

impl ResourceError {
    pub fn invalid(entity: EntityKind, key: ErrorKey, message: impl Into<String>) -> Self {
        ResourceError::InvalidRequest {
            entity,
            key,
            message: message.into(),
        }
    }

    pub fn not_found(entity: EntityKind, key: ErrorKey, message: impl Into<String>) -> Self {
        ResourceError::NotFound {
            entity,
            key,
            message: message.into(),
        }
    }

    /// Entity type the failure concerns
    pub fn entity(&self) -> EntityKind {
        match self {
            ResourceError::InvalidRequest { entity, .. }
            | ResourceError::NotFound { entity, .. }
            | ResourceError::Conflict { entity, .. }
            | ResourceError::StoreUnavailable { entity, .. } => *entity,
        }
    }

    pub fn key(&self) -> ErrorKey {
        match self {
            ResourceError::InvalidRequest { key, .. } | ResourceError::NotFound { key, .. } => *key,
            ResourceError::Conflict { .. } => ErrorKey::Conflict,
            ResourceError::StoreUnavailable { .. } => ErrorKey::StoreUnavailable,
        }
    }

    /// Classify a SQLite error raised while writing `entity`
    ///
    /// Constraint failures are caller mistakes; everything else means the
    /// store itself could not serve the request.
    pub fn from_sqlite(entity: EntityKind, store: StoreRole, err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, ref msg) = err {
            let detail = msg.clone().unwrap_or_else(|| failure.to_string());
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_FOREIGNKEY => {
                    return ResourceError::invalid(
                        entity,
                        ErrorKey::RelationNotFound,
                        "Referenced entity does not exist",
                    );
                }
                ffi::SQLITE_CONSTRAINT_NOTNULL => {
                    return ResourceError::invalid(entity, ErrorKey::Validation, detail);
                }
                ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return ResourceError::Conflict {
                        entity,
                        message: detail,
                    };
                }
                _ => {}
            }
        }
        ResourceError::StoreUnavailable {
            entity,
            store,
            source: err,
        }
    }
}

/// Result type for resource operations
pub type ResourceResult<T> = Result<T, ResourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn failure(extended_code: i32) -> rusqlite::Error {
        rusqlite::Error::SqliteFailure(ffi::Error::new(extended_code), Some("constraint".into()))
    }

    #[test]
    fn test_foreign_key_failure_is_invalid_request() {
        let err = ResourceError::from_sqlite(
            EntityKind::CarPark,
            StoreRole::Primary,
            failure(ffi::SQLITE_CONSTRAINT_FOREIGNKEY),
        );
        assert_eq!(err.key(), ErrorKey::RelationNotFound);
        assert_eq!(err.entity(), EntityKind::CarPark);
    }

    #[test]
    fn test_not_null_failure_is_validation() {
        let err = ResourceError::from_sqlite(
            EntityKind::ParkingSpot,
            StoreRole::Primary,
            failure(ffi::SQLITE_CONSTRAINT_NOTNULL),
        );
        assert!(matches!(err, ResourceError::InvalidRequest { .. }));
        assert_eq!(err.key(), ErrorKey::Validation);
    }

    #[test]
    fn test_other_failures_are_store_unavailable() {
        let err = ResourceError::from_sqlite(
            EntityKind::Address,
            StoreRole::Mirror,
            rusqlite::Error::InvalidQuery,
        );
        assert_eq!(err.key(), ErrorKey::StoreUnavailable);
        assert!(err.to_string().contains("search index"));
    }
}
