//! Command-line surface.
//!
//! Each subcommand is a thin wrapper over one library stage: commands load
//! configuration, construct the stage, and print its summary. All pipeline
//! semantics live in the library modules.

pub mod collect_cmd;
pub mod query_cmd;
pub mod refine_cmd;
pub mod status_cmd;

use crate::config::{BackendKind, DataPaths};
use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fellowscout",
    version,
    about = "Fellowship listing collector, enricher, and query tool"
)]
pub struct Cli {
    /// Root directory for configs/, tmp/, and data/
    /// (default: $FELLOWSCOUT_HOME, else the current directory)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Emit summaries as JSON instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Delete the snapshot cache before running the command
    #[arg(long, global = true)]
    pub clear_tmp: bool,

    /// Delete both stores before running the command
    #[arg(long, global = true)]
    pub clear_data: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum BackendArg {
    Generative,
    Search,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Generative => BackendKind::Generative,
            BackendArg::Search => BackendKind::Search,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in, apply facet filters, and collect listings into the raw store
    Collect {
        /// Ignore any cached filter snapshot and re-drive the facet UI
        #[arg(long)]
        fresh: bool,
    },
    /// Enrich pending raw records through the inference backend
    Refine {
        /// Override the configured backend
        #[arg(long, value_enum)]
        backend: Option<BackendArg>,
        /// Override the configured model identifier
        #[arg(long)]
        model: Option<String>,
    },
    /// Filter, sort, and page through enriched records
    Query {
        /// Hide records rated below this (applies only above 1.0)
        #[arg(long, default_value_t = 0.0)]
        min_rating: f64,
        /// Sort favorited records first
        #[arg(long)]
        favorites_first: bool,
        /// Include records that were hidden
        #[arg(long)]
        show_removed: bool,
        /// Relevance keyword; repeatable, ranks by match count
        #[arg(long = "keyword")]
        keywords: Vec<String>,
        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        per_page: usize,
    },
    /// Report stage counts across both stores
    Status,
}

/// Resolve paths, apply maintenance flags, and dispatch the subcommand.
pub async fn run(cli: Cli) -> Result<()> {
    let root = cli
        .data_dir
        .clone()
        .unwrap_or_else(DataPaths::default_root);
    let paths = DataPaths::new(root)?;

    if cli.clear_tmp {
        paths.clear_tmp()?;
    }
    if cli.clear_data {
        paths.clear_data()?;
    }

    match &cli.command {
        Commands::Collect { fresh } => collect_cmd::run(&paths, *fresh, cli.json).await,
        Commands::Refine { backend, model } => {
            refine_cmd::run(&paths, backend.map(Into::into), model.clone(), cli.json).await
        }
        Commands::Query {
            min_rating,
            favorites_first,
            show_removed,
            keywords,
            page,
            per_page,
        } => {
            let options = crate::query::QueryOptions {
                min_rating: *min_rating,
                favorites_first: *favorites_first,
                show_removed: *show_removed,
                keywords: keywords.clone(),
                page: *page,
                per_page: *per_page,
            };
            query_cmd::run(&paths, &options, cli.json)
        }
        Commands::Status => status_cmd::run(&paths, cli.json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_collect() {
        let cli = Cli::try_parse_from(["fellowscout", "collect", "--fresh"]).unwrap();
        assert!(matches!(cli.command, Commands::Collect { fresh: true }));
    }

    #[test]
    fn test_cli_parses_query_flags() {
        let cli = Cli::try_parse_from([
            "fellowscout",
            "query",
            "--min-rating",
            "3.5",
            "--keyword",
            "robotics",
            "--keyword",
            "funded",
            "--page",
            "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Query {
                min_rating,
                keywords,
                page,
                ..
            } => {
                assert_eq!(min_rating, 3.5);
                assert_eq!(keywords, vec!["robotics", "funded"]);
                assert_eq!(page, 2);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from([
            "fellowscout",
            "status",
            "--data-dir",
            "/tmp/fs",
            "--json",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.data_dir.as_deref(), Some(std::path::Path::new("/tmp/fs")));
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_backend_arg_mapping() {
        assert_eq!(BackendKind::from(BackendArg::Search), BackendKind::Search);
        assert_eq!(
            BackendKind::from(BackendArg::Generative),
            BackendKind::Generative
        );
    }
}
