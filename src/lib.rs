pub mod api_connection;
pub mod cli;
pub mod config;
pub mod indexer;
pub mod normalizer;
pub mod retrieval;
pub mod search;
pub mod staging;
pub mod synthesizer;
