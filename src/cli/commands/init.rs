//! `spk init` command - Initialize a new project

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::GlobalOpts;
use crate::core::config::Config;
use crate::core::project::{Project, ProjectError};
use crate::core::search::SqliteSearchIndex;
use crate::core::store::PrimaryStore;

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,

    /// Rewrite the config even if .spk/ already exists (databases are kept)
    #[arg(long)]
    pub force: bool,
}

pub fn run(args: InitArgs, global: &GlobalOpts) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).into_diagnostic()?;
    }

    let project = if args.force {
        Project::init_force(&path)
    } else {
        Project::init(&path)
    };

    match project {
        Ok(project) => {
            // Create both databases up front so `spk status` works immediately
            let config = Config::load_for(Some(&project));
            PrimaryStore::open(config.database_path(project.root()))?;
            SqliteSearchIndex::open(config.search_index_path(project.root()))?;

            if !global.quiet {
                println!(
                    "{} Initialized project at {}",
                    style("✓").green(),
                    style(project.root().display()).cyan()
                );
                println!();
                println!("Next steps:");
                println!(
                    "  {} Add an address",
                    style("spk create addresses --json '{\"streetAddress\":\"Main St 1\"}'").yellow()
                );
                println!("  {} Start the REST API", style("spk serve").yellow());
            }
            Ok(())
        }
        Err(ProjectError::AlreadyExists(path)) => {
            println!(
                "{} Project already exists at {}",
                style("!").yellow(),
                style(path.display()).cyan()
            );
            println!();
            println!("Use {} to reinitialize", style("spk init --force").yellow());
            Ok(())
        }
        Err(e) => Err(miette::miette!("{}", e)),
    }
}
