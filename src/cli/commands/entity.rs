//! `spk list|show|create|update|patch|delete|search` - entity commands
//!
//! The collection argument accepts the REST segment (`car-parks`), the
//! entity name (`carPark`) or the table name (`car_park`).

use console::style;
use miette::{IntoDiagnostic, Result};
use serde_json::Value;

use crate::cli::helpers::{read_payload, Workspace};
use crate::cli::output::{print_record, print_records, to_values};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::entity::{dispatch, Entity, KindVisitor};
use crate::core::identity::EntityKind;
use crate::core::service::ResourceService;

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Collection (addresses, car-parks, open-hours, parking-spots, user-extras)
    pub collection: EntityKind,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Collection (addresses, car-parks, open-hours, parking-spots, user-extras)
    pub collection: EntityKind,

    /// Entity id
    pub id: i64,

    /// Include created/modified metadata
    #[arg(long)]
    pub audit: bool,

    /// Include direct children grouped by association
    #[arg(long)]
    pub children: bool,
}

#[derive(clap::Args, Debug)]
pub struct CreateArgs {
    /// Collection (addresses, car-parks, open-hours, parking-spots, user-extras)
    pub collection: EntityKind,

    /// JSON payload, `@file` or `-` for stdin
    #[arg(long)]
    pub json: String,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    /// Collection (addresses, car-parks, open-hours, parking-spots, user-extras)
    pub collection: EntityKind,

    /// Entity id
    pub id: i64,

    /// Full JSON payload including the matching "id", `@file` or `-` for stdin
    #[arg(long)]
    pub json: String,
}

#[derive(clap::Args, Debug)]
pub struct PatchArgs {
    /// Collection (addresses, car-parks, open-hours, parking-spots, user-extras)
    pub collection: EntityKind,

    /// Entity id
    pub id: i64,

    /// JSON object with the matching "id" and the fields to overwrite
    #[arg(long)]
    pub json: String,
}

#[derive(clap::Args, Debug)]
pub struct DeleteArgs {
    /// Collection (addresses, car-parks, open-hours, parking-spots, user-extras)
    pub collection: EntityKind,

    /// Entity id
    pub id: i64,
}

#[derive(clap::Args, Debug)]
pub struct SearchArgs {
    /// Collection (addresses, car-parks, open-hours, parking-spots, user-extras)
    pub collection: EntityKind,

    /// Query expression, e.g. `central` or `name:central`; `*` matches everything
    #[arg(default_value = "*")]
    pub query: String,
}

pub fn list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let service = Workspace::open(global)?.service()?;
    let records = dispatch(args.collection, Perform::new(&service, Operation::List))?;
    print_records(&records, global.format, global.quiet)
}

pub fn show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    let service = Workspace::open(global)?.service()?;
    let mut record = single(dispatch(args.collection, Perform::new(&service, Operation::Show(args.id)))?);

    if args.children {
        let aggregate = service
            .load_with_children(args.collection, args.id)?
            .and_then(|graph| graph.aggregate(args.collection, args.id));
        if let (Some(aggregate), Value::Object(map)) = (aggregate, &mut record) {
            map.insert(
                "children".to_string(),
                serde_json::to_value(&aggregate.children).into_diagnostic()?,
            );
        }
    }

    if args.audit {
        if let (Some(audit), Value::Object(map)) = (service.audit_of(args.collection, args.id)?, &mut record) {
            map.insert("audit".to_string(), serde_json::to_value(&audit).into_diagnostic()?);
        }
    }

    print_record(&record, global.format)
}

pub fn create(args: CreateArgs, global: &GlobalOpts) -> Result<()> {
    let service = Workspace::open(global)?.service()?;
    let payload = read_payload(&args.json)?;
    let record = single(dispatch(args.collection, Perform::new(&service, Operation::Create(payload)))?);
    report("Created", args.collection, &record, global)
}

pub fn update(args: UpdateArgs, global: &GlobalOpts) -> Result<()> {
    let service = Workspace::open(global)?.service()?;
    let payload = read_payload(&args.json)?;
    let record = single(dispatch(
        args.collection,
        Perform::new(&service, Operation::Update(args.id, payload)),
    )?);
    report("Updated", args.collection, &record, global)
}

pub fn patch(args: PatchArgs, global: &GlobalOpts) -> Result<()> {
    let service = Workspace::open(global)?.service()?;
    let payload = read_payload(&args.json)?;
    let record = single(dispatch(
        args.collection,
        Perform::new(&service, Operation::Patch(args.id, payload)),
    )?);
    report("Updated", args.collection, &record, global)
}

pub fn delete(args: DeleteArgs, global: &GlobalOpts) -> Result<()> {
    let service = Workspace::open(global)?.service()?;
    service.delete(args.collection, args.id)?;
    if !global.quiet {
        println!(
            "{} Deleted {} {}",
            style("✓").green(),
            args.collection,
            style(args.id).cyan()
        );
    }
    Ok(())
}

pub fn search(args: SearchArgs, global: &GlobalOpts) -> Result<()> {
    let service = Workspace::open(global)?.service()?;
    let records = dispatch(args.collection, Perform::new(&service, Operation::Search(args.query)))?;
    print_records(&records, global.format, global.quiet)
}

/// Confirmation line for human output, the stored entity otherwise
fn report(verb: &str, kind: EntityKind, record: &Value, global: &GlobalOpts) -> Result<()> {
    match global.format {
        OutputFormat::Auto if !global.quiet => {
            let id = record.get("id").cloned().unwrap_or(Value::Null);
            println!("{} {} {} {}", style("✓").green(), verb, kind, style(id).cyan());
            Ok(())
        }
        OutputFormat::Auto => Ok(()),
        format => print_record(record, format),
    }
}

fn single(mut records: Vec<Value>) -> Value {
    records.pop().unwrap_or(Value::Null)
}

enum Operation {
    List,
    Show(i64),
    Create(String),
    Update(i64, String),
    Patch(i64, String),
    Search(String),
}

/// Run one operation against the entity type chosen at runtime
struct Perform<'a> {
    service: &'a ResourceService,
    operation: Operation,
}

impl<'a> Perform<'a> {
    fn new(service: &'a ResourceService, operation: Operation) -> Self {
        Self { service, operation }
    }
}

impl KindVisitor for Perform<'_> {
    type Output = Result<Vec<Value>>;

    fn visit<E: Entity>(self) -> Result<Vec<Value>> {
        let service = self.service;
        match self.operation {
            Operation::List => to_values(&service.find_all::<E>()?),
            Operation::Show(id) => to_values(&[service.get::<E>(id)?]),
            Operation::Create(payload) => to_values(&[service.create(parse::<E>(&payload)?)?]),
            Operation::Update(id, payload) => {
                to_values(&[service.update(id, parse::<E>(&payload)?)?])
            }
            Operation::Patch(id, payload) => {
                to_values(&[service.partial_update(id, parse::<E>(&payload)?)?])
            }
            Operation::Search(query) => {
                let hits: Vec<E> = service.search::<E>(&query)?.collect();
                to_values(&hits)
            }
        }
    }
}

fn parse<E: Entity>(payload: &str) -> Result<E> {
    serde_json::from_str(payload).map_err(|e| {
        miette::miette!(
            code = "spk::cli::payload",
            help = "payloads use the REST field names, e.g. {\"streetAddress\": \"...\"}",
            "invalid {} payload: {}",
            E::KIND,
            e
        )
    })
}
