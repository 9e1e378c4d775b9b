//! CLI Module
//!
//! Command-line interface for the Tonewright toolkit.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Tonewright - audio transcoding and tagging
#[derive(Parser, Debug)]
#[command(name = "tonewright-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine configuration file (JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Collections buffered between decoder and consumer
    #[arg(long, global = true)]
    pub queue_capacity: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the registered extensions and their settings
    #[command(name = "list")]
    List,

    /// Show format information and tags
    #[command(name = "info")]
    Info {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Transcode files with an encoder
    #[command(name = "export")]
    Export {
        /// Encoder name (e.g. Wave)
        encoder: String,

        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Output directory (defaults to each input's directory)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Output file stem (single input only)
        #[arg(short, long)]
        name: Option<String>,

        /// Overwrite existing output files
        #[arg(long)]
        replace: bool,

        /// Encoder setting as KEY=VALUE (repeatable)
        #[arg(short, long = "setting")]
        settings: Vec<String>,

        /// Filter as NAME or NAME:KEY=VALUE,KEY=VALUE (repeatable, applied in order)
        #[arg(short, long = "filter")]
        filters: Vec<String>,
    },

    /// Run an analyzer and save its results as tags
    #[command(name = "analyze")]
    Analyze {
        /// Analyzer name (e.g. Peak)
        analyzer: String,

        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Analyze all files as one group (album values)
        #[arg(short, long)]
        group: bool,

        /// Print results without saving them
        #[arg(long)]
        dry_run: bool,
    },

    /// Set tags and save them
    #[command(name = "set-metadata")]
    SetMetadata {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Tag as KEY=VALUE (repeatable; an empty value removes the tag)
        #[arg(short, long = "tag", required = true)]
        tags: Vec<String>,

        /// Metadata encoder setting as KEY=VALUE (repeatable)
        #[arg(short, long = "setting")]
        settings: Vec<String>,
    },

    /// Remove all tags
    #[command(name = "clear-metadata")]
    ClearMetadata {
        /// Files or directories
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Metadata encoder setting as KEY=VALUE (repeatable)
        #[arg(short, long = "setting")]
        settings: Vec<String>,
    },
}
