//! Rendering of entities for the terminal
//!
//! Entities are rendered from their JSON form so every kind shares one
//! code path. Back-references (`{"id": n}`) collapse to the bare id in
//! tables.

use console::style;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use serde_json::Value;
use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::truncate_str;
use crate::cli::OutputFormat;

const MAX_CELL: usize = 40;

/// Convert anything serializable into JSON values for rendering
pub fn to_values<T: Serialize>(items: &[T]) -> Result<Vec<Value>> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).into_diagnostic())
        .collect()
}

/// Print a collection; `auto` renders a table
pub fn print_records(records: &[Value], format: OutputFormat, quiet: bool) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(records).into_diagnostic()?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&records).into_diagnostic()?);
        }
        OutputFormat::Id => {
            for record in records {
                if let Some(id) = record.get("id").and_then(Value::as_i64) {
                    println!("{}", id);
                }
            }
        }
        OutputFormat::Auto | OutputFormat::Table => {
            if records.is_empty() {
                if !quiet {
                    println!("{}", style("No entities found").dim());
                }
                return Ok(());
            }
            println!("{}", render_table(records));
            if !quiet {
                println!();
                println!("{} entit{} found", style(records.len()).cyan(), if records.len() == 1 { "y" } else { "ies" });
            }
        }
    }
    Ok(())
}

/// Print a single record; `auto` renders YAML
pub fn print_record<T: Serialize>(record: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(record).into_diagnostic()?);
        }
        OutputFormat::Table => {
            let value = serde_json::to_value(record).into_diagnostic()?;
            println!("{}", render_table(std::slice::from_ref(&value)));
        }
        OutputFormat::Id => {
            let value = serde_json::to_value(record).into_diagnostic()?;
            if let Some(id) = value.get("id").and_then(Value::as_i64) {
                println!("{}", id);
            }
        }
        OutputFormat::Auto | OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(record).into_diagnostic()?);
        }
    }
    Ok(())
}

fn render_table(records: &[Value]) -> String {
    let columns = columns_of(records);

    let mut builder = Builder::default();
    builder.push_record(columns.iter().map(|c| c.to_string()));
    for record in records {
        builder.push_record(columns.iter().map(|column| cell(record.get(column.as_str()))));
    }

    let mut table = builder.build();
    table.with(Style::rounded());
    table.to_string()
}

/// Union of keys in first-seen order, with `id` leading
fn columns_of(records: &[Value]) -> Vec<String> {
    let mut columns = vec!["id".to_string()];
    for record in records {
        if let Value::Object(map) = record {
            for key in map.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
    }
    columns
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => truncate_str(s, MAX_CELL),
        Some(Value::Object(map)) => match map.get("id") {
            Some(id) if map.len() == 1 => id.to_string(),
            _ => truncate_str(&Value::Object(map.clone()).to_string(), MAX_CELL),
        },
        Some(other) => truncate_str(&other.to_string(), MAX_CELL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_columns_start_with_id() {
        let records = vec![
            json!({"name": "Central", "id": 1}),
            json!({"id": 2, "owner": "city"}),
        ];
        let columns = columns_of(&records);
        assert_eq!(columns[0], "id");
        assert!(columns.contains(&"name".to_string()));
        assert!(columns.contains(&"owner".to_string()));
        assert_eq!(columns.len(), 3);
    }

    #[test]
    fn test_back_reference_renders_as_id() {
        assert_eq!(cell(Some(&json!({"id": 7}))), "7");
        assert_eq!(cell(Some(&Value::Null)), "-");
        assert_eq!(cell(None), "-");
        assert_eq!(cell(Some(&json!(true))), "true");
    }

    #[test]
    fn test_table_contains_values() {
        let table = render_table(&[json!({"id": 3, "city": "Oulu"})]);
        assert!(table.contains("Oulu"));
        assert!(table.contains("city"));
    }
}
