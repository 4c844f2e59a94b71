//! `spk reindex` command - Rebuild the search index

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::Workspace;
use crate::cli::{GlobalOpts, OutputFormat};

#[derive(clap::Args, Debug)]
pub struct ReindexArgs {}

pub fn run(_args: ReindexArgs, global: &GlobalOpts) -> Result<()> {
    let service = Workspace::open(global)?.service()?;
    let stats = service.reindex()?;

    match global.format {
        OutputFormat::Json => {
            let indexed: serde_json::Map<String, serde_json::Value> = stats
                .indexed
                .iter()
                .map(|(kind, count)| (kind.to_string(), (*count).into()))
                .collect();
            let report = serde_json::json!({
                "indexed": indexed,
                "failed": stats.failed,
                "durationMs": stats.duration_ms,
            });
            println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
        }
        _ if global.quiet => {}
        _ => {
            for (kind, count) in &stats.indexed {
                println!("  {:<14} {}", kind.to_string(), style(count).cyan());
            }
            println!(
                "{} Indexed {} entities in {}ms",
                style("✓").green(),
                style(stats.total()).cyan(),
                stats.duration_ms
            );
            if stats.failed > 0 {
                println!("{} {} entities could not be indexed", style("!").yellow(), stats.failed);
            }
        }
    }
    Ok(())
}
