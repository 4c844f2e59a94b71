//! `spk status` command - Store and search index overview

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::Workspace;
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::identity::EntityKind;

#[derive(clap::Args, Debug)]
pub struct StatusArgs {}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct KindStatus {
    entity: EntityKind,
    stored: usize,
    indexed: usize,
}

pub fn run(_args: StatusArgs, global: &GlobalOpts) -> Result<()> {
    let workspace = Workspace::open(global)?;
    let service = workspace.service()?;

    let mut kinds = Vec::new();
    for kind in EntityKind::all() {
        kinds.push(KindStatus {
            entity: *kind,
            stored: service.store().count(*kind)?,
            indexed: service.index().count(*kind)?,
        });
    }
    let in_sync = kinds.iter().all(|k| k.stored == k.indexed);

    match global.format {
        OutputFormat::Json => {
            let status = serde_json::json!({
                "root": workspace.project.root(),
                "database": service.store().path(),
                "searchIndex": service.index().path(),
                "entities": kinds,
                "inSync": in_sync,
            });
            println!("{}", serde_json::to_string_pretty(&status).into_diagnostic()?);
        }
        _ => {
            let width = 44;
            println!("{}", style("Smart Parking Status").bold().underlined());
            println!("{}", "═".repeat(width));
            println!("Project:      {}", style(workspace.project.root().display()).cyan());
            println!("Database:     {}", style(service.store().path().display()).dim());
            println!("Search index: {}", style(service.index().path().display()).dim());
            println!();
            println!("{:<14} {:>8} {:>8}", "ENTITY", "STORED", "INDEXED");
            for k in &kinds {
                let indexed = if k.indexed == k.stored {
                    style(k.indexed.to_string()).green()
                } else {
                    style(k.indexed.to_string()).yellow()
                };
                println!("{:<14} {:>8} {:>8}", k.entity.to_string(), k.stored, indexed);
            }
            println!("{}", "═".repeat(width));
            if in_sync {
                println!("Search index: {}", style("in sync").green().bold());
            } else {
                println!(
                    "Search index: {} (run {})",
                    style("out of sync").yellow().bold(),
                    style("spk reindex").yellow()
                );
            }
        }
    }
    Ok(())
}
