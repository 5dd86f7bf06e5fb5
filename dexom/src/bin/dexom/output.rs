use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets};
use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Table,
    Json,
}

/// A command result that prints as a table or as JSON.
pub trait Report: Serialize {
    fn table(&self, color: bool) -> Table;
}

/// Routes results to stdout and status lines to stderr.
pub struct Printer {
    format: Format,
    quiet: bool,
    color: bool,
}

impl Printer {
    pub fn new(format: Format, quiet: bool, color: bool) -> Self {
        Self { format, quiet, color }
    }

    pub fn emit(&self, report: &impl Report) -> Result<()> {
        match self.format {
            Format::Json => println!("{}", serde_json::to_string_pretty(report)?),
            Format::Table => println!("{}", report.table(self.color)),
        }
        Ok(())
    }

    /// Status line, suppressed by `--quiet` and in JSON mode.
    pub fn status(&self, message: &str) {
        if self.quiet || self.format == Format::Json {
            return;
        }
        if self.color {
            eprintln!("{}", message.dimmed());
        } else {
            eprintln!("{message}");
        }
    }

    pub fn failure(&self, message: &str) {
        if self.color {
            eprintln!("{} {}", "error:".red().bold(), message);
        } else {
            eprintln!("error: {message}");
        }
    }
}

/// Table with a bold header; plain ASCII when color is off.
pub fn table(headers: &[&str], color: bool) -> Table {
    let mut table = Table::new();
    table
        .load_preset(if color { presets::UTF8_FULL_CONDENSED } else { presets::ASCII_FULL })
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(|header| Cell::new(header).add_attribute(Attribute::Bold)));
    table
}

/// "indexed" or "excluded", colored by whether queries can see the value.
pub fn flag_cell(excluded: bool, color: bool) -> Cell {
    let (label, tint) = if excluded {
        ("excluded", Color::DarkGrey)
    } else {
        ("indexed", Color::Green)
    };
    let cell = Cell::new(label);
    if color { cell.fg(tint) } else { cell }
}
