use anyhow::Result;
use model2vec_rs::model::StaticModel;

pub const DEFAULT_EMBEDDING_MODEL: &str = "minishlab/potion-base-32M";

/// Output size of the potion-base-32M model. model2vec_rs does not expose
/// the dimension from the loaded config, so it is pinned here.
pub const EMBEDDING_DIMENSION: usize = 512;

/// Capability interface for turning text into fixed-length vectors. The same
/// implementation must be used at indexing time and at query time; `model_id`
/// is what gets pinned into the index metadata to enforce that.
pub trait Embedder {
    fn dimension(&self) -> usize;

    fn model_id(&self) -> &str;

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let embeddings = self.embed(&[text.to_string()])?;
        embeddings.into_iter().next().ok_or_else(|| {
            anyhow::anyhow!("Failed to generate embedding for single text: {}", text)
        })
    }
}

/// Static sentence-embedding model loaded once per process and reused for
/// every call. Deterministic: the same text always yields the same vector.
pub struct StaticModelEmbedder {
    model: StaticModel,
    model_id: String,
}

impl StaticModelEmbedder {
    pub fn new(model_id: &str) -> Result<Self> {
        let model = StaticModel::from_pretrained(model_id, None, None, None)?;
        Ok(Self {
            model,
            model_id: model_id.to_string(),
        })
    }
}

impl Embedder for StaticModelEmbedder {
    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(self.model.encode(texts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Downloads the model; slow and network-dependent.
    fn test_static_model_embedder_init_and_embed() -> Result<()> {
        let embedder = StaticModelEmbedder::new(DEFAULT_EMBEDDING_MODEL)?;
        assert_eq!(embedder.dimension(), EMBEDDING_DIMENSION);
        assert_eq!(embedder.model_id(), DEFAULT_EMBEDDING_MODEL);

        let sentences = vec![
            "water, sugar, salt".to_string(),
            "wheat flour, butter, eggs".to_string(),
        ];
        let embeddings = embedder.embed(&sentences)?;
        assert_eq!(embeddings.len(), 2);
        assert_eq!(embeddings[0].len(), EMBEDDING_DIMENSION);

        let single = embedder.embed_one("chocolate")?;
        assert_eq!(single.len(), EMBEDDING_DIMENSION);
        Ok(())
    }
}
