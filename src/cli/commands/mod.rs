//! CLI command implementations

pub mod completions;
pub mod entity;
pub mod init;
pub mod link;
pub mod reindex;
pub mod serve;
pub mod status;
