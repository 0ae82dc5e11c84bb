use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Retrieval-augmented assistant over the OpenFoodFacts dump", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Normalize the raw tab-separated export into staged batch files
    Ingest {
        /// Path to the raw product export (tab-separated)
        #[arg(short, long)]
        source: String,
        /// Discard previously staged batches instead of aborting
        #[arg(long)]
        reset: bool,
    },
    /// Embed staged batches and rebuild the search index from scratch
    Index {
        /// Drop an existing index instead of aborting
        #[arg(long)]
        reset: bool,
    },
    /// Interactive question-answering loop
    Chat,
    /// Answer a single question and exit
    Ask {
        /// The question to answer
        question: String,
    },
    /// Probe the raw nearest neighbors for queries, without reranking
    Inspect {
        /// Number of neighbors to display per query
        #[arg(short = 'k', long, default_value_t = 3)]
        top: usize,
    },
}

/// Tokens that end the interactive loops.
pub fn is_quit_token(input: &str) -> bool {
    matches!(
        input.trim().to_lowercase().as_str(),
        "q" | "quit" | "exit"
    )
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
