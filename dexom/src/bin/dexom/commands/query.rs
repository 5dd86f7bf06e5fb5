use anyhow::{Result, bail};
use clap::Args;
use comfy_table::{Cell, Table};
use dexom::{Datastore, Key, PropertyFilter, Query, StoredEntity, Value};
use serde::Serialize;

use super::open_store;
use crate::output::{Printer, Report, table};

pub const AFTER_HELP: &str = "Values parse as null, true, false or a number when they look like one;\n\
                              quote them (name='\"30\"') to force a string.\n\n\
                              Examples:\n  dexom query Thing foo=true\n  dexom query Container embedded_entity.foo=true --limit 5";

#[derive(Args)]
pub struct QueryArgs {
    /// Entity kind
    kind: String,

    /// `path=value` equality filters, all of which must match
    #[arg(value_name = "PATH=VALUE")]
    filters: Vec<String>,

    #[arg(long)]
    limit: Option<usize>,
}

impl QueryArgs {
    fn query(&self) -> Result<Query> {
        let mut query = Query::new(&self.kind);
        for raw in &self.filters {
            query = query.filter(filter(raw)?);
        }
        if let Some(limit) = self.limit {
            query = query.limit(limit);
        }
        Ok(query)
    }
}

#[derive(Serialize)]
pub struct Hit {
    pub key: Key,
    pub indexed: usize,
    pub stored: usize,
}

impl From<&StoredEntity> for Hit {
    fn from(entity: &StoredEntity) -> Self {
        let values = entity.flatten();
        Self {
            key: entity.key.clone(),
            indexed: values.iter().filter(|value| !value.exclude_from_indexes).count(),
            stored: values.len(),
        }
    }
}

#[derive(Serialize)]
#[serde(transparent)]
pub struct Hits(pub Vec<Hit>);

impl Report for Hits {
    fn table(&self, color: bool) -> Table {
        let mut rows = table(&["Key", "Indexed", "Stored"], color);
        for hit in &self.0 {
            rows.add_row(vec![
                Cell::new(&hit.key),
                Cell::new(hit.indexed),
                Cell::new(hit.stored),
            ]);
        }
        rows
    }
}

fn filter(raw: &str) -> Result<PropertyFilter> {
    match raw.split_once('=') {
        Some((path, value)) if !path.is_empty() => Ok(PropertyFilter::eq(path, literal(value))),
        _ => bail!("filter `{raw}` is not of the form path=value"),
    }
}

fn literal(raw: &str) -> Value {
    if let Some(quoted) = raw.strip_prefix('"').and_then(|rest| rest.strip_suffix('"')) {
        return Value::from(quoted);
    }
    match raw {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => raw
            .parse::<i64>()
            .map(Value::Integer)
            .or_else(|_| raw.parse::<f64>().map(Value::Double))
            .unwrap_or_else(|_| Value::from(raw)),
    }
}

pub async fn run(args: QueryArgs, printer: &Printer) -> Result<()> {
    let query = args.query()?;
    let mut store = open_store(printer).await?;
    let hits = Hits(store.query(&query).await?.iter().map(Hit::from).collect());
    printer.status(&format!("{} {} matched", hits.0.len(), query.kind));
    printer.emit(&hits)
}
