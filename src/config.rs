use std::env;
use std::path::PathBuf;

/// Runtime configuration for every stage. Defaults match the reference
/// deployment (local engine, local reranker sidecar, local Ollama); any field
/// can be overridden from the environment, with `.env` files honored by the
/// caller before `from_env` runs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub engine: SearchEngineConfig,
    pub embedding: EmbeddingConfig,
    pub reranker: RerankerConfig,
    pub completion: CompletionConfig,
    pub retrieval: RetrievalConfig,
    pub ingestion: IngestionConfig,
}

#[derive(Debug, Clone)]
pub struct SearchEngineConfig {
    pub endpoint: String,
    pub index_name: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model_id: String,
}

#[derive(Debug, Clone)]
pub struct RerankerConfig {
    pub base_url: String,
    pub model: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct CompletionConfig {
    pub base_url: String,
    pub model: String,
    /// Env var holding the bearer token; None for unauthenticated endpoints.
    pub api_key_env: Option<String>,
    pub temperature: f32,
    /// Per-candidate cap on ingredient text in the prompt context.
    pub context_chars: usize,
}

#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub k_candidates: usize,
    pub num_candidates: usize,
}

#[derive(Debug, Clone)]
pub struct IngestionConfig {
    pub batch_size: usize,
    pub staging_dir: PathBuf,
}

const API_KEY_ENV_VAR: &str = "FOODFACTS_LLM_API_KEY";

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: SearchEngineConfig {
                endpoint: "http://localhost:9200".to_string(),
                index_name: "openfoodfacts".to_string(),
                request_timeout_secs: 60,
            },
            embedding: EmbeddingConfig {
                model_id: crate::search::embedding_engine::DEFAULT_EMBEDDING_MODEL.to_string(),
            },
            reranker: RerankerConfig {
                base_url: "http://localhost:8082".to_string(),
                model: "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string(),
                request_timeout_secs: 30,
            },
            completion: CompletionConfig {
                base_url: "http://localhost:11434/v1".to_string(),
                model: "qwen2.5:3b".to_string(),
                api_key_env: None,
                temperature: 0.1,
                context_chars: 600,
            },
            retrieval: RetrievalConfig {
                top_k: 5,
                k_candidates: 50,
                num_candidates: 500,
            },
            ingestion: IngestionConfig {
                batch_size: 50_000,
                staging_dir: PathBuf::from("data/staging_data"),
            },
        }
    }
}

fn override_string(target: &mut String, var: &str) {
    if let Ok(value) = env::var(var) {
        *target = value;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, var: &str) {
    if let Ok(value) = env::var(var) {
        if let Ok(parsed) = value.parse() {
            *target = parsed;
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        override_string(&mut config.engine.endpoint, "FOODFACTS_ENGINE_URL");
        override_string(&mut config.engine.index_name, "FOODFACTS_INDEX");
        override_parsed(
            &mut config.engine.request_timeout_secs,
            "FOODFACTS_ENGINE_TIMEOUT_SECS",
        );

        override_string(&mut config.embedding.model_id, "FOODFACTS_EMBEDDING_MODEL");

        override_string(&mut config.reranker.base_url, "FOODFACTS_RERANKER_URL");
        override_string(&mut config.reranker.model, "FOODFACTS_RERANKER_MODEL");
        override_parsed(
            &mut config.reranker.request_timeout_secs,
            "FOODFACTS_RERANKER_TIMEOUT_SECS",
        );

        override_string(&mut config.completion.base_url, "FOODFACTS_LLM_URL");
        override_string(&mut config.completion.model, "FOODFACTS_LLM_MODEL");
        override_parsed(
            &mut config.completion.temperature,
            "FOODFACTS_LLM_TEMPERATURE",
        );
        override_parsed(&mut config.completion.context_chars, "FOODFACTS_CONTEXT_CHARS");
        // Bearer auth only kicks in when the key variable is actually set;
        // local Ollama-style endpoints need none.
        if env::var(API_KEY_ENV_VAR).is_ok() {
            config.completion.api_key_env = Some(API_KEY_ENV_VAR.to_string());
        }

        override_parsed(&mut config.retrieval.top_k, "FOODFACTS_TOP_K");
        override_parsed(&mut config.retrieval.k_candidates, "FOODFACTS_K_CANDIDATES");
        override_parsed(
            &mut config.retrieval.num_candidates,
            "FOODFACTS_NUM_CANDIDATES",
        );

        override_parsed(&mut config.ingestion.batch_size, "FOODFACTS_BATCH_SIZE");
        if let Ok(dir) = env::var("FOODFACTS_STAGING_DIR") {
            config.ingestion.staging_dir = PathBuf::from(dir);
        }

        config
    }
}
