//! Command-line arguments

use clap::{Parser, Subcommand, ValueEnum};
use colloquy_core::VisualizationOptions;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "colloquy")]
#[command(about = "Colloquy - resumable classroom discussions between AI roles", long_about = None)]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Config file layered over ~/.colloquy/colloquy.toml and ./.colloquy/colloquy.toml
    #[arg(short, long, global = true, env = "COLLOQUY_CONFIG")]
    pub config: Option<PathBuf>,

    /// JSON array of retrieval documents: [{"content": "...", "source": "..."}]
    #[arg(long, global = true)]
    pub corpus: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a thread on a question and run it to the first halt
    Run {
        /// Thread ID
        #[arg(short, long)]
        thread: String,
        /// Question for the reporter
        #[arg(short, long)]
        query: String,
        /// Print the report as it is written
        #[arg(long)]
        stream: bool,
    },

    /// Continue a paused or failed thread
    Resume {
        /// Thread ID
        #[arg(short, long)]
        thread: String,
        /// Critic point to discuss
        #[arg(long, conflicts_with = "explore")]
        point: Option<usize>,
        /// Case of the chosen point (default: 0)
        #[arg(long, requires = "point")]
        case: Option<usize>,
        /// Report point to explore in detail
        #[arg(long)]
        explore: Option<usize>,
        /// Print streamed output as it is written
        #[arg(long)]
        stream: bool,
    },

    /// Show a thread's state as JSON
    State {
        /// Thread ID
        #[arg(short, long)]
        thread: String,
    },

    /// Delete a thread and its checkpoint
    Clear {
        /// Thread ID
        #[arg(short, long)]
        thread: String,
    },

    /// List stored threads
    Threads,

    /// Print the workflow graph
    Graph {
        #[arg(short, long, value_enum, default_value_t = GraphFormat::Mermaid)]
        format: GraphFormat,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Mermaid,
    Dot,
}

impl GraphFormat {
    pub fn options(self) -> VisualizationOptions {
        match self {
            GraphFormat::Mermaid => VisualizationOptions::mermaid(),
            GraphFormat::Dot => VisualizationOptions::dot(),
        }
    }
}
