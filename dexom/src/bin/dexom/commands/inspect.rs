use anyhow::{Result, bail};
use clap::Args;
use comfy_table::{Cell, Table};
use dexom::{Datastore, FlatProperty, Key};
use serde::Serialize;

use super::{key_id, open_store};
use crate::output::{Printer, Report, flag_cell, table};

pub const AFTER_HELP: &str = "Examples:\n  dexom inspect Thing 2\n  dexom inspect User alice --output json";

#[derive(Args)]
pub struct InspectArgs {
    /// Entity kind
    kind: String,

    /// Allocated id or key name
    id: String,
}

/// Every stored value of one entity with its exclusion flag.
#[derive(Serialize)]
pub struct Stored {
    pub key: Key,
    pub values: Vec<FlatProperty>,
}

impl Stored {
    fn indexed(&self) -> usize {
        self.values.iter().filter(|value| !value.exclude_from_indexes).count()
    }
}

impl Report for Stored {
    fn table(&self, color: bool) -> Table {
        let mut rows = table(&["Path", "Type", "Value", "Index"], color);
        for value in &self.values {
            rows.add_row(vec![
                Cell::new(&value.path),
                Cell::new(value.value.type_name()),
                Cell::new(&value.value),
                flag_cell(value.exclude_from_indexes, color),
            ]);
        }
        rows
    }
}

pub async fn run(args: InspectArgs, printer: &Printer) -> Result<()> {
    let key = Key::new(args.kind, key_id(&args.id));
    let mut store = open_store(printer).await?;
    let Some(entity) = store.get(&key).await? else {
        bail!("nothing stored under {key}");
    };

    let stored = Stored {
        key,
        values: entity.flatten(),
    };
    printer.status(&format!("{}: {} of {} values indexed", stored.key, stored.indexed(), stored.values.len()));
    printer.emit(&stored)
}
