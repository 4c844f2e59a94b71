//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    completions::CompletionsArgs,
    entity::{
        CreateArgs, DeleteArgs, ListArgs, PatchArgs, SearchArgs, ShowArgs, UpdateArgs,
    },
    init::InitArgs,
    link::LinkCommands,
    reindex::ReindexArgs,
    serve::ServeArgs,
    status::StatusArgs,
};

#[derive(Parser)]
#[command(name = "spk")]
#[command(author, version, about = "Smart Parking")]
#[command(long_about = "Smart Parking - car parks, parking spots and parking sessions stored in SQLite, mirrored into a full-text search index and served over REST.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Project root (default: auto-detect by finding .spk/)
    #[arg(long, global = true)]
    pub project: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new project
    Init(InitArgs),

    /// Run the REST API
    Serve(ServeArgs),

    /// Show store and search index status
    Status(StatusArgs),

    /// List every entity of a collection
    List(ListArgs),

    /// Show one entity
    Show(ShowArgs),

    /// Create an entity from a JSON payload
    Create(CreateArgs),

    /// Replace an entity with a JSON payload
    Update(UpdateArgs),

    /// Merge the fields of a JSON payload into an entity
    Patch(PatchArgs),

    /// Delete an entity
    Delete(DeleteArgs),

    /// Query the search index
    Search(SearchArgs),

    /// Manage parent/child associations
    #[command(subcommand)]
    Link(LinkCommands),

    /// Rebuild the search index from the primary store
    Reindex(ReindexArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Automatically detect based on context (yaml for show, table for list)
    #[default]
    Auto,
    /// YAML format
    Yaml,
    /// JSON format (for programming)
    Json,
    /// Aligned table
    Table,
    /// Just IDs, one per line
    Id,
}
