use anyhow::{bail, Context, Result};
use std::cell::Cell;
use std::cmp::Ordering;

use crate::config::RetrievalConfig;
use crate::search::embedding_engine::Embedder;
use crate::search::engine_client::SearchEngineClient;
use crate::search::reranker::RelevanceScorer;
use crate::staging::ProductRecord;

/// One retrieved product, alive for a single query. `retrieval_rank` is the
/// 0-based position the engine returned it at; it breaks ties between equal
/// rerank scores so result order is deterministic.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub record: ProductRecord,
    pub retrieval_score: f32,
    pub retrieval_rank: usize,
    pub rerank_score: f32,
}

impl Candidate {
    /// Text the cross-encoder sees for this candidate.
    pub fn rerank_text(&self) -> String {
        format!(
            "{} {}",
            self.record.product_name, self.record.ingredients_text
        )
    }
}

/// Descending rerank score, ties broken by ascending retrieval rank.
pub fn rank_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.rerank_score
            .partial_cmp(&a.rerank_score)
            .unwrap_or(Ordering::Equal)
            .then(a.retrieval_rank.cmp(&b.retrieval_rank))
    });
}

/// Embed the query, fetch nearest neighbors, rerank them with the
/// cross-encoder, keep the best `top_k`. The embedder must match the one the
/// index was built with; that is verified once per pipeline instance against
/// the model id recorded in the index mapping.
pub struct RetrievalPipeline<'a, E, R> {
    engine: &'a SearchEngineClient,
    embedder: &'a E,
    scorer: &'a R,
    config: RetrievalConfig,
    model_verified: Cell<bool>,
}

impl<'a, E: Embedder, R: RelevanceScorer> RetrievalPipeline<'a, E, R> {
    pub fn new(
        engine: &'a SearchEngineClient,
        embedder: &'a E,
        scorer: &'a R,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            engine,
            embedder,
            scorer,
            config,
            model_verified: Cell::new(false),
        }
    }

    async fn ensure_model_match(&self) -> Result<()> {
        if self.model_verified.get() {
            return Ok(());
        }
        match self.engine.embedding_model_meta().await? {
            Some(indexed_model) if indexed_model != self.embedder.model_id() => {
                bail!(
                    "Index '{}' was built with embedding model '{}' but '{}' is configured; \
                     rebuild the index or fix the configuration",
                    self.engine.index_name(),
                    indexed_model,
                    self.embedder.model_id()
                );
            }
            Some(_) => {}
            None => {
                eprintln!(
                    "Warning: index '{}' records no embedding model; cannot verify \
                     query/index vector compatibility",
                    self.engine.index_name()
                );
            }
        }
        self.model_verified.set(true);
        Ok(())
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<Candidate>> {
        self.ensure_model_match().await?;

        let query_vector = self
            .embedder
            .embed_one(query)
            .context("Failed to embed the query")?;

        let hits = self
            .engine
            .knn_search(
                &query_vector,
                self.config.k_candidates,
                self.config.num_candidates,
            )
            .await?;
        if hits.is_empty() {
            // Nothing matched; the caller turns this into a canned answer.
            return Ok(Vec::new());
        }

        let mut candidates: Vec<Candidate> = hits
            .into_iter()
            .enumerate()
            .map(|(rank, hit)| Candidate {
                record: hit.record,
                retrieval_score: hit.score,
                retrieval_rank: rank,
                rerank_score: 0.0,
            })
            .collect();

        let documents: Vec<String> = candidates.iter().map(Candidate::rerank_text).collect();
        let scores = self
            .scorer
            .score_pairs(query, &documents)
            .await
            .context("Reranking failed")?;
        if scores.len() != candidates.len() {
            bail!(
                "Reranker returned {} scores for {} candidates",
                scores.len(),
                candidates.len()
            );
        }
        for (candidate, score) in candidates.iter_mut().zip(scores) {
            candidate.rerank_score = score;
        }

        rank_candidates(&mut candidates);
        candidates.truncate(self.config.top_k);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(rank: usize, rerank_score: f32) -> Candidate {
        Candidate {
            record: ProductRecord {
                code: format!("{:03}", rank),
                product_name: format!("Product {}", rank),
                ingredients_text: "water, sugar, salt, flavoring agent".to_string(),
                nutriscore_grade: "c".to_string(),
            },
            retrieval_score: 1.0 / (rank as f32 + 1.0),
            retrieval_rank: rank,
            rerank_score,
        }
    }

    #[test]
    fn test_rank_candidates_sorts_by_rerank_score_descending() {
        let mut candidates = vec![candidate(0, 0.2), candidate(1, 0.9), candidate(2, 0.5)];
        rank_candidates(&mut candidates);
        let ranks: Vec<usize> = candidates.iter().map(|c| c.retrieval_rank).collect();
        assert_eq!(ranks, vec![1, 2, 0]);
    }

    #[test]
    fn test_rank_candidates_breaks_ties_by_retrieval_rank() {
        let mut candidates = vec![candidate(3, 0.5), candidate(1, 0.5), candidate(2, 0.5)];
        rank_candidates(&mut candidates);
        let ranks: Vec<usize> = candidates.iter().map(|c| c.retrieval_rank).collect();
        assert_eq!(ranks, vec![1, 2, 3]);
    }

    #[test]
    fn test_top_k_selection_from_wide_candidate_pool() {
        // 50 retrieval candidates, rerank favors the tail; only the best 5
        // survive, best first.
        let mut candidates: Vec<Candidate> = (0..50)
            .map(|rank| candidate(rank, rank as f32 / 100.0))
            .collect();
        rank_candidates(&mut candidates);
        candidates.truncate(5);

        assert_eq!(candidates.len(), 5);
        let ranks: Vec<usize> = candidates.iter().map(|c| c.retrieval_rank).collect();
        assert_eq!(ranks, vec![49, 48, 47, 46, 45]);
        for pair in candidates.windows(2) {
            assert!(pair[0].rerank_score >= pair[1].rerank_score);
        }
    }

    #[test]
    fn test_rerank_text_concatenates_name_and_ingredients() {
        let c = candidate(0, 0.0);
        assert_eq!(
            c.rerank_text(),
            "Product 0 water, sugar, salt, flavoring agent"
        );
    }
}
