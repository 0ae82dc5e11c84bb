pub mod embedding_engine;
pub mod engine_client;
pub mod reranker;

pub use embedding_engine::{Embedder, StaticModelEmbedder, EMBEDDING_DIMENSION};
pub use engine_client::{SearchEngineClient, SearchHit};
pub use reranker::{HttpReranker, RelevanceScorer};
