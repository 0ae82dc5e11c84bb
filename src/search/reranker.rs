use anyhow::{anyhow, Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capability interface for pairwise relevance scoring. Scores come back
/// aligned with `documents`; ordering and truncation stay with the caller.
#[allow(async_fn_in_trait)]
pub trait RelevanceScorer {
    async fn score_pairs(&self, query: &str, documents: &[String]) -> Result<Vec<f32>>;
}

/// Cross-encoder reranker behind an OpenAI-compatible `/v1/rerank` endpoint
/// (e.g. llama-server or a text-embeddings-inference sidecar). One batched
/// request scores every pair; raw logits are squashed to 0..1.
pub struct HttpReranker {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct RerankRequest {
    model: String,
    query: String,
    documents: Vec<String>,
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultRaw>,
}

#[derive(Deserialize)]
struct RerankResultRaw {
    index: usize,
    relevance_score: f32,
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

impl HttpReranker {
    pub fn new(base_url: &str, model: &str, request_timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .context("Failed to build HTTP client for the reranker")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

impl RelevanceScorer for HttpReranker {
    async fn score_pairs(&self, query: &str, documents: &[String]) -> Result<Vec<f32>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/v1/rerank", self.base_url);
        let request = RerankRequest {
            model: self.model.clone(),
            query: query.to_string(),
            documents: documents.to_vec(),
            top_n: documents.len(),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to reach reranker endpoint")?;
        if !response.status().is_success() {
            let status = response.status();
            let error_body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Reranker returned {}: {}", status, error_body));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .context("Failed to parse reranker response")?;

        let mut scores = vec![0.0f32; documents.len()];
        for result in parsed.results {
            let slot = scores.get_mut(result.index).ok_or_else(|| {
                anyhow!(
                    "Reranker returned index {} for {} documents",
                    result.index,
                    documents.len()
                )
            })?;
            *slot = sigmoid(result.relevance_score);
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_midpoint_and_extremes() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(10.0) > 0.999);
        assert!(sigmoid(-10.0) < 0.001);
    }

    #[test]
    fn test_sigmoid_preserves_order() {
        // Monotonic: reranking by squashed scores equals reranking by logits.
        let logits = [-3.2f32, -0.5, 0.0, 1.7, 6.0];
        let squashed: Vec<f32> = logits.iter().map(|&x| sigmoid(x)).collect();
        for pair in squashed.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn test_rerank_request_serializes_all_pairs() {
        let request = RerankRequest {
            model: "cross-encoder/ms-marco-MiniLM-L-6-v2".to_string(),
            query: "chocolate".to_string(),
            documents: vec!["doc a".to_string(), "doc b".to_string()],
            top_n: 2,
        };
        let payload = serde_json::to_value(&request).unwrap();
        assert_eq!(payload["top_n"], 2);
        assert_eq!(payload["documents"].as_array().unwrap().len(), 2);
        assert_eq!(payload["query"], "chocolate");
    }

    #[test]
    fn test_rerank_response_parses_out_of_order_results() {
        let raw = r#"{"results": [
            {"index": 1, "relevance_score": 2.0},
            {"index": 0, "relevance_score": -1.0}
        ]}"#;
        let parsed: RerankResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.results.len(), 2);
        assert_eq!(parsed.results[0].index, 1);
    }
}
