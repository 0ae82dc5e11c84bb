use anyhow::{Context, Result};
use std::io::{self, BufRead, Write};
use std::path::Path;

use foodfacts_rag::api_connection::connection::Provider;
use foodfacts_rag::cli::{is_quit_token, parse_args, Command};
use foodfacts_rag::config::AppConfig;
use foodfacts_rag::indexer::index_batches;
use foodfacts_rag::normalizer::normalize_source;
use foodfacts_rag::retrieval::RetrievalPipeline;
use foodfacts_rag::search::embedding_engine::{Embedder, StaticModelEmbedder};
use foodfacts_rag::search::engine_client::SearchEngineClient;
use foodfacts_rag::search::reranker::HttpReranker;
use foodfacts_rag::synthesizer::synthesize;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = parse_args();
    let config = AppConfig::from_env();

    match cli.command {
        Command::Ingest { source, reset } => run_ingest(&config, &source, reset),
        Command::Index { reset } => run_index(&config, reset).await,
        Command::Chat => run_chat(&config).await,
        Command::Ask { question } => run_ask(&config, &question).await,
        Command::Inspect { top } => run_inspect(&config, top).await,
    }
}

fn build_engine(config: &AppConfig) -> Result<SearchEngineClient> {
    SearchEngineClient::new(
        &config.engine.endpoint,
        &config.engine.index_name,
        config.engine.request_timeout_secs,
    )
}

fn build_embedder(config: &AppConfig) -> Result<StaticModelEmbedder> {
    println!(
        "Loading embedding model {} (this may take a moment)...",
        config.embedding.model_id
    );
    StaticModelEmbedder::new(&config.embedding.model_id)
        .with_context(|| format!("Failed to load embedding model '{}'", config.embedding.model_id))
}

fn build_provider(config: &AppConfig) -> Provider {
    Provider::open_ai_compatible(
        &config.completion.base_url,
        &config.completion.model,
        config.completion.api_key_env.clone(),
    )
}

fn run_ingest(config: &AppConfig, source: &str, reset: bool) -> Result<()> {
    let report = normalize_source(
        Path::new(source),
        &config.ingestion.staging_dir,
        config.ingestion.batch_size,
        reset,
    )?;
    println!(
        "Summary: {} rows read, {} malformed, {} dropped, {} kept.",
        report.rows_read, report.rows_malformed, report.rows_dropped, report.records_kept
    );
    Ok(())
}

async fn run_index(config: &AppConfig, reset: bool) -> Result<()> {
    let engine = build_engine(config)?;
    let embedder = build_embedder(config)?;
    let report = index_batches(&engine, &embedder, &config.ingestion.staging_dir, reset).await?;
    println!(
        "Index '{}' now holds {} documents ({} failed).",
        config.engine.index_name, report.documents_indexed, report.documents_failed
    );
    Ok(())
}

fn prompt_line(prompt: &str) -> Result<Option<String>> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    if read == 0 {
        // EOF behaves like a quit token.
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

async fn answer_query(
    pipeline: &RetrievalPipeline<'_, StaticModelEmbedder, HttpReranker>,
    provider: &Provider,
    config: &AppConfig,
    query: &str,
) -> Result<()> {
    println!("Recherche des produits...");
    let candidates = pipeline.retrieve(query).await?;

    println!("L'IA réfléchit...");
    let answer = synthesize(
        provider,
        query,
        &candidates,
        config.completion.temperature,
        config.completion.context_chars,
    )
    .await?;

    println!("\n{}", "-".repeat(50));
    println!("RÉPONSE :");
    println!("{}", answer);
    println!("{}", "-".repeat(50));
    Ok(())
}

async fn run_chat(config: &AppConfig) -> Result<()> {
    let engine = build_engine(config)?;
    let embedder = build_embedder(config)?;
    let reranker = HttpReranker::new(
        &config.reranker.base_url,
        &config.reranker.model,
        config.reranker.request_timeout_secs,
    )?;
    let provider = build_provider(config);
    let pipeline = RetrievalPipeline::new(&engine, &embedder, &reranker, config.retrieval.clone());

    println!("=== ASSISTANT OPENFOODFACTS ===");
    loop {
        let query = match prompt_line("\nVotre question (ou 'q' pour quitter) : ")? {
            Some(query) => query,
            None => break,
        };
        if query.is_empty() {
            continue;
        }
        if is_quit_token(&query) {
            break;
        }
        // A failed round trip is reported, then the loop waits for the next
        // question.
        if let Err(e) = answer_query(&pipeline, &provider, config, &query).await {
            eprintln!("Erreur: {:#}", e);
        }
    }
    Ok(())
}

async fn run_ask(config: &AppConfig, question: &str) -> Result<()> {
    let engine = build_engine(config)?;
    let embedder = build_embedder(config)?;
    let reranker = HttpReranker::new(
        &config.reranker.base_url,
        &config.reranker.model,
        config.reranker.request_timeout_secs,
    )?;
    let provider = build_provider(config);
    let pipeline = RetrievalPipeline::new(&engine, &embedder, &reranker, config.retrieval.clone());

    answer_query(&pipeline, &provider, config, question).await
}

/// Raw nearest-neighbor probe: shows what the vector search alone returns,
/// with the engine's similarity scores, skipping rerank and synthesis.
async fn run_inspect(config: &AppConfig, top: usize) -> Result<()> {
    let engine = build_engine(config)?;
    let embedder = build_embedder(config)?;

    loop {
        let query =
            match prompt_line("\nTape un mot-clé (ex: 'tomate', 'chocolat') ou 'q' pour quitter : ")?
            {
                Some(query) => query,
                None => break,
            };
        if query.is_empty() {
            continue;
        }
        if is_quit_token(&query) {
            break;
        }

        let query_vector = embedder.embed_one(&query)?;
        println!("   ... Recherche dans les vecteurs ...");
        let hits = match engine.knn_search(&query_vector, top, 100).await {
            Ok(hits) => hits,
            Err(e) => {
                eprintln!("Erreur: {:#}", e);
                continue;
            }
        };

        println!("\n--- RÉSULTATS POUR : '{}' ---", query);
        if hits.is_empty() {
            println!("Aucun résultat trouvé (index vide ?)");
            continue;
        }
        for (i, hit) in hits.iter().enumerate() {
            let preview: String = hit.record.ingredients_text.chars().take(150).collect();
            println!("#{} [Score: {:.4}]", i + 1, hit.score);
            println!("   Produit : {}", hit.record.product_name);
            println!("   Ingrédients : {}...", preview);
            println!("{}", "-".repeat(40));
        }
    }
    Ok(())
}
