use anyhow::{anyhow, Context, Result};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::staging::ProductRecord;

pub const VECTOR_FIELD: &str = "vector_embedding";
const SOURCE_FIELDS: [&str; 4] = [
    "code",
    "product_name",
    "ingredients_text",
    "nutriscore_grade",
];

/// HTTP client for an Elasticsearch-compatible search engine. The engine is
/// an external collaborator: this client only speaks its REST API (index
/// lifecycle, bulk upsert, kNN search) and never reimplements any of it.
pub struct SearchEngineClient {
    client: Client,
    base_url: String,
    index: String,
}

#[derive(Debug, Deserialize)]
pub struct EngineInfo {
    pub version: EngineVersion,
}

#[derive(Debug, Deserialize)]
pub struct EngineVersion {
    pub number: String,
}

/// One kNN hit: the projected source fields plus the engine's similarity
/// score, in the order the engine returned them.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub score: f32,
    pub record: ProductRecord,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHitsEnvelope,
}

#[derive(Debug, Deserialize)]
struct SearchHitsEnvelope {
    hits: Vec<RawHit>,
}

#[derive(Debug, Deserialize)]
struct RawHit {
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: ProductRecord,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    items: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

/// NDJSON body for the engine's `_bulk` endpoint: an action line per
/// document, no explicit id so the engine generates one.
pub fn bulk_body(index: &str, documents: &[Value]) -> String {
    let mut body = String::new();
    for document in documents {
        body.push_str(&json!({ "index": { "_index": index } }).to_string());
        body.push('\n');
        body.push_str(&document.to_string());
        body.push('\n');
    }
    body
}

/// kNN search request: `k` nearest vectors out of a wider `num_candidates`
/// pool, `_source` projected to the stored text fields only.
pub fn knn_request_body(query_vector: &[f32], k: usize, num_candidates: usize) -> Value {
    json!({
        "knn": {
            "field": VECTOR_FIELD,
            "query_vector": query_vector,
            "k": k,
            "num_candidates": num_candidates
        },
        "_source": SOURCE_FIELDS
    })
}

impl SearchEngineClient {
    pub fn new(base_url: &str, index: &str, request_timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()
            .context("Failed to build HTTP client for the search engine")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            index: index.to_string(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }

    fn index_url(&self, suffix: &str) -> String {
        format!("{}/{}{}", self.base_url, self.index, suffix)
    }

    async fn check(&self, response: Response, operation: &str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let error_body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error body".to_string());
        Err(anyhow!(
            "Search engine {} request failed with {}: {}",
            operation,
            status,
            error_body
        ))
    }

    /// Connectivity check. Failure here means the engine is unreachable and
    /// callers must not attempt any index mutation.
    pub async fn info(&self) -> Result<EngineInfo> {
        let response = self
            .client
            .get(&self.base_url)
            .send()
            .await
            .with_context(|| format!("Failed to reach search engine at {}", self.base_url))?;
        let response = self.check(response, "info").await?;
        response
            .json::<EngineInfo>()
            .await
            .context("Failed to parse search engine info response")
    }

    pub async fn index_exists(&self) -> Result<bool> {
        let response = self
            .client
            .head(self.index_url(""))
            .send()
            .await
            .with_context(|| format!("Failed to reach search engine at {}", self.base_url))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(anyhow!(
                "Search engine existence check for '{}' failed with {}",
                self.index,
                status
            )),
        }
    }

    pub async fn delete_index(&self) -> Result<()> {
        let response = self
            .client
            .delete(self.index_url(""))
            .send()
            .await
            .with_context(|| format!("Failed to delete index '{}'", self.index))?;
        self.check(response, "index deletion").await?;
        Ok(())
    }

    /// Creates the index with an explicit mapping: the four text fields, a
    /// cosine-similarity dense vector of `dims`, and the embedding model id
    /// recorded in `_meta` so query time can verify it.
    pub async fn create_index(&self, dims: usize, embedding_model: &str) -> Result<()> {
        let mapping = json!({
            "mappings": {
                "_meta": { "embedding_model": embedding_model },
                "properties": {
                    "code": { "type": "keyword" },
                    "product_name": { "type": "text" },
                    "ingredients_text": { "type": "text" },
                    "nutriscore_grade": { "type": "keyword" },
                    VECTOR_FIELD: {
                        "type": "dense_vector",
                        "dims": dims,
                        "index": true,
                        "similarity": "cosine"
                    }
                }
            }
        });
        let response = self
            .client
            .put(self.index_url(""))
            .json(&mapping)
            .send()
            .await
            .with_context(|| format!("Failed to create index '{}'", self.index))?;
        self.check(response, "index creation").await?;
        Ok(())
    }

    /// Embedding model id recorded in the index mapping, if any.
    pub async fn embedding_model_meta(&self) -> Result<Option<String>> {
        let response = self
            .client
            .get(self.index_url("/_mapping"))
            .send()
            .await
            .with_context(|| format!("Failed to fetch mapping for index '{}'", self.index))?;
        let response = self.check(response, "mapping fetch").await?;
        let mapping: Value = response
            .json()
            .await
            .context("Failed to parse index mapping response")?;
        Ok(mapping[&self.index]["mappings"]["_meta"]["embedding_model"]
            .as_str()
            .map(String::from))
    }

    pub async fn count(&self) -> Result<u64> {
        let response = self
            .client
            .get(self.index_url("/_count"))
            .send()
            .await
            .with_context(|| format!("Failed to count documents in index '{}'", self.index))?;
        let response = self.check(response, "count").await?;
        let counted: CountResponse = response
            .json()
            .await
            .context("Failed to parse count response")?;
        Ok(counted.count)
    }

    /// Makes indexed documents visible to search. Only needed when querying
    /// right after a bulk insert, as the integration tests do.
    pub async fn refresh(&self) -> Result<()> {
        let response = self
            .client
            .post(self.index_url("/_refresh"))
            .send()
            .await
            .with_context(|| format!("Failed to refresh index '{}'", self.index))?;
        self.check(response, "refresh").await?;
        Ok(())
    }

    /// Bulk insert with engine-generated ids. Returns `(indexed, failed)`
    /// counts taken from the per-item results; item failures are reported,
    /// never retried here.
    pub async fn bulk_index(&self, documents: &[Value]) -> Result<(usize, usize)> {
        if documents.is_empty() {
            return Ok((0, 0));
        }
        let body = bulk_body(&self.index, documents);
        let response = self
            .client
            .post(format!("{}/_bulk", self.base_url))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .with_context(|| format!("Bulk insert into '{}' failed to send", self.index))?;
        let response = self.check(response, "bulk insert").await?;
        let bulk: BulkResponse = response
            .json()
            .await
            .context("Failed to parse bulk insert response")?;

        let failed = bulk
            .items
            .iter()
            .filter(|item| item["index"].get("error").is_some())
            .count();
        Ok((bulk.items.len() - failed, failed))
    }

    /// Approximate nearest-neighbor search. An empty hit list is a valid
    /// outcome (empty index, nothing above the engine's threshold), not an
    /// error.
    pub async fn knn_search(
        &self,
        query_vector: &[f32],
        k: usize,
        num_candidates: usize,
    ) -> Result<Vec<SearchHit>> {
        let body = knn_request_body(query_vector, k, num_candidates);
        let response = self
            .client
            .post(self.index_url("/_search"))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("kNN search against '{}' failed to send", self.index))?;
        let response = self.check(response, "kNN search").await?;
        let parsed: SearchResponse = response
            .json()
            .await
            .context("Failed to parse kNN search response")?;

        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| SearchHit {
                score: hit.score.unwrap_or(0.0),
                record: hit.source,
            })
            .collect())
    }
}
