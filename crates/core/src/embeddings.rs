use crate::error::EmbedError;

const DEFAULT: usize = 384;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Maps text to a fixed-length vector.
///
/// `dimensions()` must not change over the lifetime of an instance; the index
/// schema and every query vector are derived from it.
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;
}

impl<E: Embedder + ?Sized> Embedder for &E {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        (**self).embed(text)
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn dimensions(&self) -> usize {
        (**self).dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        (**self).embed(text)
    }
}

/// Hashed character-trigram embedding, L2-normalized.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Embedder for CharacterNgramEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let trimmed = text.trim();

        if trimmed.is_empty() {
            return Ok(vector);
        }

        // Padding gives short words at least one trigram.
        let padded = format!(" {} ", trimmed.to_lowercase());
        let chars: Vec<char> = padded.chars().collect();

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        Ok(vector)
    }
}

#[cfg(feature = "minilm")]
pub use minilm::{mean_pool, MiniLmEmbedder};

#[cfg(feature = "minilm")]
mod minilm {
    use super::Embedder;
    use crate::error::EmbedError;
    use candle_core::{Device, Tensor};
    use candle_nn::VarBuilder;
    use candle_transformers::models::bert::{BertModel, Config, DTYPE};
    use std::path::Path;
    use tokenizers::{Tokenizer, TruncationParams};
    use tracing::info;

    const MAX_TOKENS: usize = 128;

    fn model_error(error: impl std::fmt::Display) -> EmbedError {
        EmbedError::Model(error.to_string())
    }

    /// Averages `hidden` `(batch, tokens, hidden)` over the tokens whose
    /// `mask` `(batch, tokens)` entry is set. Returns `(batch, hidden)`.
    pub fn mean_pool(hidden: &Tensor, mask: &Tensor) -> candle_core::Result<Tensor> {
        let mask = mask.to_dtype(hidden.dtype())?;
        let summed = hidden.broadcast_mul(&mask.unsqueeze(2)?)?.sum(1)?;
        let counts = mask.sum_keepdim(1)?.maximum(1f64)?;
        summed.broadcast_div(&counts)
    }

    /// Sentence-transformers BERT model (e.g. paraphrase-multilingual-MiniLM-L12-v2)
    /// loaded from a local directory holding `config.json`, `tokenizer.json`
    /// and `model.safetensors`. Produces mean-pooled token embeddings.
    pub struct MiniLmEmbedder {
        model: BertModel,
        tokenizer: Tokenizer,
        device: Device,
        dimensions: usize,
    }

    impl MiniLmEmbedder {
        pub fn load(model_dir: &Path) -> Result<Self, EmbedError> {
            let device = Device::Cpu;
            let load_error =
                |error: String| EmbedError::Load(format!("{}: {error}", model_dir.display()));

            let config = std::fs::read_to_string(model_dir.join("config.json"))
                .map_err(|error| load_error(error.to_string()))?;
            let config: Config =
                serde_json::from_str(&config).map_err(|error| load_error(error.to_string()))?;

            let mut tokenizer = Tokenizer::from_file(model_dir.join("tokenizer.json"))
                .map_err(|error| load_error(error.to_string()))?;
            tokenizer
                .with_truncation(Some(TruncationParams {
                    max_length: MAX_TOKENS,
                    ..Default::default()
                }))
                .map_err(|error| load_error(error.to_string()))?;

            let weights = model_dir.join("model.safetensors");
            // SAFETY: the weights file is not modified while the model is alive.
            let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DTYPE, &device) }
                .map_err(|error| load_error(error.to_string()))?;
            let model =
                BertModel::load(vb, &config).map_err(|error| load_error(error.to_string()))?;

            let mut embedder = Self {
                model,
                tokenizer,
                device,
                dimensions: 0,
            };
            embedder.dimensions = embedder.forward("dimension check")?.len();
            info!(
                model_dir = %model_dir.display(),
                dimensions = embedder.dimensions,
                "embedding model loaded"
            );
            Ok(embedder)
        }

        fn forward(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            let encoding = self.tokenizer.encode(text, true).map_err(model_error)?;
            let input_ids = Tensor::new(encoding.get_ids(), &self.device)
                .and_then(|tensor| tensor.unsqueeze(0))
                .map_err(model_error)?;
            let token_type_ids = Tensor::new(encoding.get_type_ids(), &self.device)
                .and_then(|tensor| tensor.unsqueeze(0))
                .map_err(model_error)?;
            let attention_mask = Tensor::new(encoding.get_attention_mask(), &self.device)
                .and_then(|tensor| tensor.unsqueeze(0))
                .map_err(model_error)?;

            let hidden = self
                .model
                .forward(&input_ids, &token_type_ids, Some(&attention_mask))
                .map_err(model_error)?;

            mean_pool(&hidden, &attention_mask)
                .and_then(|pooled| pooled.squeeze(0))
                .and_then(|pooled| pooled.to_vec1::<f32>())
                .map_err(model_error)
        }
    }

    impl Embedder for MiniLmEmbedder {
        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            let vector = self.forward(text)?;
            if vector.len() != self.dimensions {
                return Err(EmbedError::Dimensions {
                    expected: self.dimensions,
                    actual: vector.len(),
                });
            }
            Ok(vector)
        }
    }

}

#[cfg(test)]
mod tests {
    use super::{CharacterNgramEmbedder, Embedder};

    fn cosine(left: &[f32], right: &[f32]) -> f32 {
        left.iter().zip(right).map(|(a, b)| a * b).sum()
    }

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Paris is the capital of France.").unwrap();
        let second = embedder.embed("Paris is the capital of France.").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder::default();
        assert_eq!(embedder.dimensions(), 384);
        assert_eq!(embedder.embed("abc").unwrap().len(), 384);

        let small = CharacterNgramEmbedder { dimensions: 32 };
        assert_eq!(small.embed("abc").unwrap().len(), 32);
    }

    #[test]
    fn short_text_still_has_a_direction() {
        let embedder = CharacterNgramEmbedder::default();
        let vector = embedder.embed("a").unwrap();
        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 1e-4);
    }

    #[test]
    fn related_text_scores_higher_than_unrelated_text() {
        let embedder = CharacterNgramEmbedder::default();
        let query = embedder.embed("capital of France").unwrap();
        let related = embedder.embed("Paris is the capital of France.").unwrap();
        let unrelated = embedder.embed("Goodbye world.").unwrap();
        assert!(cosine(&query, &related) > cosine(&query, &unrelated));
    }
}
