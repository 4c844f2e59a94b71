//! `spk serve` command - Run the REST API

use std::net::SocketAddr;

use console::style;
use miette::{IntoDiagnostic, Result};
use tracing::info;

use crate::api::{self, AppState};
use crate::cli::helpers::Workspace;
use crate::cli::GlobalOpts;

#[derive(clap::Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on (default: config `bind`, then 127.0.0.1:8080)
    #[arg(long)]
    pub bind: Option<String>,
}

pub fn run(args: ServeArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let bind = args.bind.unwrap_or_else(|| workspace.config.bind());
    let addr: SocketAddr = bind
        .parse()
        .map_err(|e| miette::miette!(code = "spk::cli::bind", "invalid bind address '{}': {}", bind, e))?;

    let service = workspace.service()?;
    if service.index().needs_reindex() {
        info!("search index was reset, rebuilding from the primary store");
        service.reindex()?;
    }

    if !global.quiet {
        println!(
            "{} Serving {} on {}",
            style("✓").green(),
            style(workspace.project.root().display()).cyan(),
            style(format!("http://{}/api", addr)).yellow()
        );
    }

    let state = AppState::new(service, workspace.config.application_name());
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;
    runtime.block_on(api::serve(state, addr))
}
