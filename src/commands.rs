//! This module defines the command-line interface for the application using `clap`.
//!
//! It provides a `Cli` struct that represents the parsed command-line arguments,
//! and a `Commands` enum that represents the available subcommands and their
//! options.
//!
//! # Examples
//!
//! ```no_run
//! use clap::Parser;
//! use cosmere_chat::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! match cli.command {
//!     Commands::Ask { question, .. } => println!("asking {question}"),
//!     _ => {}
//! }
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Represents the parsed command-line arguments.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Configuration file. Defaults to `config.yaml` in the platform config directory.
    #[arg(long, short = 'c', global = true, env = "COSMERE_CONFIG")]
    pub config: Option<PathBuf>,

    /// The parsed subcommand and its options.
    #[command(subcommand)]
    pub command: Commands,
}

/// Represents the available subcommands and their options.
#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write the default configuration and prompt template to the config directory.
    Init,

    /// Chunk and embed a corpus directory into a JSON array of index records.
    #[clap(name = "index", alias = "x")]
    Index {
        /// Directory searched recursively for corpus files.
        corpus_dir: PathBuf,

        #[arg(long, short = 'o', default_value = "index.json")]
        output: PathBuf,
    },

    /// Interactive conversation. Type `exit` to quit.
    #[clap(name = "chat", alias = "i")]
    Chat {
        /// Search a local index file instead of the configured search service.
        #[arg(long)]
        index: Option<PathBuf>,

        /// Prompt template name under `<config_dir>/templates`.
        #[arg(name = "template", short = 't')]
        template: Option<String>,
    },

    /// Ask a single question and print the answer.
    #[clap(name = "ask", alias = "a")]
    Ask {
        question: String,

        #[arg(long)]
        index: Option<PathBuf>,

        #[arg(name = "template", short = 't')]
        template: Option<String>,
    },
}
