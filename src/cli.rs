//! CLI argument definitions using clap derive macros.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Find open-access books across public catalogs and stream them through a
/// signed, allowlisted proxy.
#[derive(Parser, Debug)]
#[command(name = "bookloft")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (`key = value` lines); defaults to ~/.config/bookloft/config
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve {
        /// Listen address, overrides BIND_ADDR
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Harvest the OAI-PMH catalog in the background on start
        #[arg(long)]
        harvest: bool,
    },

    /// Run one aggregated search and print the JSON result
    Search {
        /// Search terms
        #[arg(required = true, num_args = 1..)]
        query: Vec<String>,

        /// Result page (1-based)
        #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=1000))]
        page: u32,

        /// Sort by relevance
        #[arg(long)]
        ranked: bool,

        /// Skip live probes (metadata analysis only)
        #[arg(long)]
        no_probe: bool,
    },
}

impl Args {
    /// Subcommand to run; `serve` with defaults when none was given.
    #[must_use]
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve {
            bind: None,
            harvest: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_serve() {
        let args = Args::try_parse_from(["bookloft"]).unwrap();
        assert_eq!(args.verbose, 0);
        assert!(!args.quiet);
        assert_eq!(
            args.command(),
            Command::Serve {
                bind: None,
                harvest: false
            }
        );
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["bookloft", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);

        let args = Args::try_parse_from(["bookloft", "search", "dune", "--verbose"]).unwrap();
        assert_eq!(args.verbose, 1);
    }

    #[test]
    fn test_cli_serve_bind_override() {
        let args = Args::try_parse_from(["bookloft", "serve", "--bind", "0.0.0.0:9000", "--harvest"]).unwrap();
        let Command::Serve { bind, harvest } = args.command() else {
            panic!("expected serve");
        };
        assert_eq!(bind.unwrap().port(), 9000);
        assert!(harvest);
    }

    #[test]
    fn test_cli_search_joins_terms() {
        let args = Args::try_parse_from(["bookloft", "search", "economics", "in", "africa", "--ranked"]).unwrap();
        let Command::Search {
            query,
            page,
            ranked,
            no_probe,
        } = args.command()
        else {
            panic!("expected search");
        };
        assert_eq!(query.join(" "), "economics in africa");
        assert_eq!(page, 1);
        assert!(ranked);
        assert!(!no_probe);
    }

    #[test]
    fn test_cli_search_requires_query() {
        let err = Args::try_parse_from(["bookloft", "search"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Args::try_parse_from(["bookloft", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
