//! Core module - fundamental types and utilities

pub mod audit;
pub mod config;
pub mod entity;
pub mod error;
pub mod graph;
pub mod identity;
pub mod links;
pub mod project;
pub mod search;
pub mod service;
pub mod store;

pub use audit::{AuditRecord, Auditor, FixedAuditor};
pub use config::Config;
pub use entity::{dispatch, Entity, KindVisitor};
pub use error::{ErrorKey, ResourceError, ResourceResult, StoreRole};
pub use graph::{Aggregate, AssociationIndex, EntityGraph, GraphError, Relink};
pub use identity::{EntityId, EntityKind, EntityRef, IdParseError};
pub use links::{Association, Cardinality};
pub use project::{Project, ProjectError};
pub use search::{SearchHits, SearchIndex, SqliteSearchIndex};
pub use service::{ReindexStats, ResourceService};
pub use store::PrimaryStore;
