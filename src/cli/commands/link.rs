//! `spk link` command - Manage parent/child associations

use console::style;
use miette::Result;

use crate::cli::helpers::Workspace;
use crate::cli::output::{print_records, to_values};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::graph::Relink;
use crate::core::identity::EntityKind;
use crate::core::links::{self, Association};

#[derive(clap::Subcommand, Debug)]
pub enum LinkCommands {
    /// Replace the whole child collection of a parent
    Set(SetLinkArgs),

    /// Attach one child to a parent
    Add(ChildLinkArgs),

    /// Detach one child from a parent
    Remove(ChildLinkArgs),

    /// List the children of a parent
    Show(ShowLinkArgs),
}

#[derive(clap::Args, Debug)]
#[command(after_help = "\
ASSOCIATIONS:
  addresses      car-parks       Address -> CarPark (many)
  car-parks      open-hours      CarPark -> OpenHours (many)
  car-parks      parking-spots   CarPark -> ParkingSpot (many)
  parking-spots  user-extra      ParkingSpot -> UserExtra (one)

EXAMPLES:
  spk link set car-parks 1 parking-spots 4 5 6
  spk link set car-parks 1 open-hours          # detach every child
")]
pub struct SetLinkArgs {
    /// Parent collection
    pub collection: EntityKind,

    /// Parent id
    pub id: i64,

    /// Association segment (car-parks, open-hours, parking-spots, user-extra)
    pub association: String,

    /// Child ids making up the new collection
    pub children: Vec<i64>,
}

#[derive(clap::Args, Debug)]
pub struct ChildLinkArgs {
    /// Parent collection
    pub collection: EntityKind,

    /// Parent id
    pub id: i64,

    /// Association segment (car-parks, open-hours, parking-spots, user-extra)
    pub association: String,

    /// Child id
    pub child: i64,
}

#[derive(clap::Args, Debug)]
pub struct ShowLinkArgs {
    /// Parent collection
    pub collection: EntityKind,

    /// Parent id
    pub id: i64,

    /// Association segment (car-parks, open-hours, parking-spots, user-extra)
    pub association: String,
}

pub fn run(cmd: LinkCommands, global: &GlobalOpts) -> Result<()> {
    let service = Workspace::open(global)?.service()?;

    match cmd {
        LinkCommands::Set(args) => {
            let association = resolve(args.collection, &args.association)?;
            let relinks = service.set_children(association, args.id, &args.children)?;
            report(&relinks, global)
        }
        LinkCommands::Add(args) => {
            let association = resolve(args.collection, &args.association)?;
            let relinks = service.add_child(association, args.id, args.child)?;
            report(&relinks, global)
        }
        LinkCommands::Remove(args) => {
            let association = resolve(args.collection, &args.association)?;
            let relinks = service.remove_child(association, args.id, args.child)?;
            report(&relinks, global)
        }
        LinkCommands::Show(args) => {
            let association = resolve(args.collection, &args.association)?;
            let children = service.children(association, args.id)?;
            print_records(&to_values(&children)?, global.format, global.quiet)
        }
    }
}

fn resolve(parent: EntityKind, segment: &str) -> Result<&'static Association> {
    links::find(parent, segment).ok_or_else(|| {
        let known: Vec<&str> = links::children_of(parent).map(|a| a.segment).collect();
        miette::miette!(
            code = "spk::cli::association",
            "{} has no association '{}' (known: {})",
            parent,
            segment,
            if known.is_empty() { "none".to_string() } else { known.join(", ") }
        )
    })
}

fn report(relinks: &[Relink], global: &GlobalOpts) -> Result<()> {
    match global.format {
        OutputFormat::Json | OutputFormat::Yaml => {
            crate::cli::output::print_record(&relinks, global.format)
        }
        _ if global.quiet => Ok(()),
        _ => {
            if relinks.is_empty() {
                println!("{} Nothing to change", style("✓").green());
            }
            for relink in relinks {
                let describe = |parent: Option<i64>| {
                    parent.map_or_else(|| "none".to_string(), |id| id.to_string())
                };
                println!(
                    "{} {} {} {} {} -> {}",
                    style("✓").green(),
                    relink.association.child,
                    style(relink.child).cyan(),
                    relink.association.column,
                    describe(relink.before),
                    style(describe(relink.after)).yellow()
                );
            }
            Ok(())
        }
    }
}
