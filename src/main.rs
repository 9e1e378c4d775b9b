//! Tonewright CLI - Audio Transcoding and Tagging
//!
//! Command-line interface for the Tonewright toolkit.

use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use tonewright::cli::commands::{self, Result};
use tonewright::cli::{Cli, Commands};
use tonewright::{ExportOptions, SettingsDictionary};

fn main() -> ExitCode {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    debug!("Tonewright v{}", env!("CARGO_PKG_VERSION"));

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let engine = commands::build_engine(cli.config.as_deref(), cli.queue_capacity)?;

    match cli.command {
        Commands::List => commands::list(&engine),
        Commands::Info { paths, json } => commands::info(&engine, &paths, json),
        Commands::Export {
            encoder,
            paths,
            output_dir,
            name,
            replace,
            settings,
            filters,
        } => {
            let settings = SettingsDictionary::from_pairs(&settings)?;
            let filters = filters
                .iter()
                .map(|spec| commands::parse_filter(spec))
                .collect::<Result<Vec<_>>>()?;
            let options = ExportOptions {
                output_dir,
                output_name: name,
                replace_existing: replace,
                filters,
            };
            commands::export(&engine, &encoder, &paths, &settings, &options)
        }
        Commands::Analyze {
            analyzer,
            paths,
            group,
            dry_run,
        } => commands::analyze(&engine, &analyzer, &paths, group, dry_run),
        Commands::SetMetadata {
            paths,
            tags,
            settings,
        } => {
            let settings = SettingsDictionary::from_pairs(&settings)?;
            commands::set_metadata(&engine, &paths, &tags, &settings)
        }
        Commands::ClearMetadata { paths, settings } => {
            let settings = SettingsDictionary::from_pairs(&settings)?;
            commands::clear_metadata(&engine, &paths, &settings)
        }
    }
}
