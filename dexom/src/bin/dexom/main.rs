mod commands;
mod config;
mod output;

use clap::{Parser, Subcommand};
use log::LevelFilter;

use commands::{init::InitArgs, inspect::InspectArgs, query::QueryArgs};
use output::{Format, Printer};

/// Look at what dexom stored and which values queries can see.
#[derive(Parser)]
#[command(name = "dexom", version, arg_required_else_help = true)]
#[command(after_help = "Reads .dexom/config.toml from the current directory or a parent.\n\
                        REDIS_URL is used when the config says ${REDIS_URL}.")]
struct Cli {
    /// How results are printed
    #[arg(long, value_enum, default_value_t = Format::Table, global = true)]
    output: Format,

    /// Print results only, no status lines
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Raise log verbosity (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write .dexom/config.toml in the current directory
    #[command(after_help = commands::init::AFTER_HELP)]
    Init(InitArgs),

    /// Show every stored value of one entity and whether it is indexed
    #[command(after_help = commands::inspect::AFTER_HELP)]
    Inspect(InspectArgs),

    /// Equality query; excluded values never match
    #[command(after_help = commands::query::AFTER_HELP)]
    Query(QueryArgs),
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    if cli.no_color {
        colored::control::set_override(false);
    }

    let printer = Printer::new(cli.output, cli.quiet, !cli.no_color);
    let outcome = match cli.command {
        Command::Init(args) => commands::init::run(args, &printer).await,
        Command::Inspect(args) => commands::inspect::run(args, &printer).await,
        Command::Query(args) => commands::query::run(args, &printer).await,
    };

    if let Err(err) = outcome {
        printer.failure(&format!("{err:#}"));
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["dexom", "query", "Thing", "foo=true", "--output", "json", "-vv"])?;
        assert_eq!(cli.output, Format::Json);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Command::Query(_)));
        Ok(())
    }
}
