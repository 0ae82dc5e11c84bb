use anyhow::{anyhow, bail, Context, Result};
use serde_json::{json, Value};
use std::path::Path;

use crate::search::embedding_engine::Embedder;
use crate::search::engine_client::{SearchEngineClient, VECTOR_FIELD};
use crate::staging::{list_batch_files, read_batch, StagedBatch};

/// Encode group size: compromise between throughput and memory.
const ENCODE_GROUP_SIZE: usize = 32;

#[derive(Debug, Default)]
pub struct IndexReport {
    pub batches_processed: usize,
    pub documents_indexed: usize,
    pub documents_failed: usize,
}

/// Pairs each staged record with its embedding into one index document.
/// A vector of the wrong length means the embedder and index disagree and
/// nothing sane can be inserted.
pub fn batch_documents(
    batch: &StagedBatch,
    embeddings: &[Vec<f32>],
    dimension: usize,
) -> Result<Vec<Value>> {
    if embeddings.len() != batch.len() {
        bail!(
            "Embedding count mismatch: {} records but {} vectors",
            batch.len(),
            embeddings.len()
        );
    }
    batch
        .records()
        .zip(embeddings.iter())
        .map(|(record, embedding)| {
            if embedding.len() != dimension {
                return Err(anyhow!(
                    "Embedding dimension mismatch for '{}'. Expected {}, got {}.",
                    record.product_name,
                    dimension,
                    embedding.len()
                ));
            }
            Ok(json!({
                "code": record.code,
                "product_name": record.product_name,
                "ingredients_text": record.ingredients_text,
                "nutriscore_grade": record.nutriscore_grade,
                VECTOR_FIELD: embedding,
            }))
        })
        .collect()
}

/// Full index rebuild from the staged batches: connectivity gate, reset-gated
/// delete and recreate, then embed + bulk insert batch by batch. Item
/// failures inside a batch are counted and reported, never retried, and do
/// not stop later batches.
pub async fn index_batches<E: Embedder>(
    engine: &SearchEngineClient,
    embedder: &E,
    staging_dir: &Path,
    reset: bool,
) -> Result<IndexReport> {
    let info = engine
        .info()
        .await
        .context("Cannot reach the search engine; no index changes attempted")?;
    println!("Connected to search engine version {}", info.version.number);

    let batch_files = list_batch_files(staging_dir)?;
    if batch_files.is_empty() {
        bail!(
            "No staged batch files found in {:?}. Run the ingest stage first.",
            staging_dir
        );
    }

    if engine.index_exists().await? {
        if !reset {
            bail!(
                "Index '{}' already exists; pass --reset to drop and rebuild it",
                engine.index_name()
            );
        }
        println!(
            "Deleting existing index '{}' for rebuild...",
            engine.index_name()
        );
        engine.delete_index().await?;
    }
    engine
        .create_index(embedder.dimension(), embedder.model_id())
        .await
        .context("Failed to create the search index")?;

    println!("Indexing {} staged files...", batch_files.len());
    let mut report = IndexReport::default();

    for path in &batch_files {
        let batch = match read_batch(path) {
            Ok(batch) => batch,
            Err(e) => {
                eprintln!("Skipping unreadable batch {:?}: {:#}", path, e);
                continue;
            }
        };
        println!("Processing {:?} ({} records)...", path, batch.len());

        println!("   -> Computing vectors for {} products...", batch.len());
        let mut embeddings = Vec::with_capacity(batch.len());
        for group in batch.ingredients_texts.chunks(ENCODE_GROUP_SIZE) {
            embeddings.extend(
                embedder
                    .embed(group)
                    .context("Failed to embed ingredient texts")?,
            );
        }

        let documents = batch_documents(&batch, &embeddings, embedder.dimension())?;

        println!("   -> Sending to the search engine...");
        match engine.bulk_index(&documents).await {
            Ok((indexed, failed)) => {
                println!("   -> Success: {} documents indexed.", indexed);
                if failed > 0 {
                    eprintln!("   -> {} documents rejected by the engine.", failed);
                }
                report.documents_indexed += indexed;
                report.documents_failed += failed;
            }
            Err(e) => {
                // A failed bulk call loses this batch only.
                eprintln!("   -> Bulk insert failed for {:?}: {:#}", path, e);
                report.documents_failed += documents.len();
            }
        }
        report.batches_processed += 1;
    }

    println!(
        "Indexing finished: {} documents indexed, {} failed.",
        report.documents_indexed, report.documents_failed
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::staging::ProductRecord;

    fn batch_of(records: Vec<ProductRecord>) -> StagedBatch {
        let mut batch = StagedBatch::default();
        for record in records {
            batch.push(record);
        }
        batch
    }

    fn record(name: &str) -> ProductRecord {
        ProductRecord {
            code: "001".to_string(),
            product_name: name.to_string(),
            ingredients_text: "water, sugar, salt, flavoring agent".to_string(),
            nutriscore_grade: "c".to_string(),
        }
    }

    #[test]
    fn test_batch_documents_carries_fields_and_vector() -> Result<()> {
        let batch = batch_of(vec![record("TestSoda")]);
        let documents = batch_documents(&batch, &[vec![0.1, 0.2, 0.3]], 3)?;
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0]["product_name"], "TestSoda");
        assert_eq!(documents[0]["nutriscore_grade"], "c");
        assert_eq!(documents[0][VECTOR_FIELD].as_array().unwrap().len(), 3);
        Ok(())
    }

    #[test]
    fn test_batch_documents_rejects_count_mismatch() {
        let batch = batch_of(vec![record("TestSoda"), record("Biscuit")]);
        let result = batch_documents(&batch, &[vec![0.1, 0.2, 0.3]], 3);
        assert!(result.is_err());
    }

    #[test]
    fn test_batch_documents_rejects_wrong_dimension() {
        let batch = batch_of(vec![record("TestSoda")]);
        let result = batch_documents(&batch, &[vec![0.1, 0.2]], 3);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("dimension mismatch"));
    }
}
