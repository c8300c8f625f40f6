use crate::embeddings::Embedder;
use crate::error::EmbeddingError;
use async_trait::async_trait;
use ndarray::{ArrayView3, Ix3};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokenizers::{Tokenizer, TruncationParams};
use tracing::{debug, info};

pub const DEFAULT_MODEL_DIR: &str = "models/all-MiniLM-L6-v2";

// all-MiniLM-L6-v2 was trained on sequences of at most 256 word pieces
const MAX_SEQUENCE_TOKENS: usize = 256;

pub struct OrtEmbedder {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    model_id: String,
    dimensions: usize,
}

impl std::fmt::Debug for OrtEmbedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrtEmbedder")
            .field("model_id", &self.model_id)
            .field("dimensions", &self.dimensions)
            .finish_non_exhaustive()
    }
}

impl OrtEmbedder {
    pub fn from_directory(
        dir: impl AsRef<Path>,
        model_id: impl Into<String>,
    ) -> Result<Self, EmbeddingError> {
        let dir = dir.as_ref();
        let model_path = find_model_file(dir)?;
        let tokenizer_path = find_tokenizer_file(dir)?;
        Self::from_files(&model_path, &tokenizer_path, model_id)
    }

    pub fn from_files(
        model_path: &Path,
        tokenizer_path: &Path,
        model_id: impl Into<String>,
    ) -> Result<Self, EmbeddingError> {
        if !model_path.is_file() {
            return Err(EmbeddingError::ModelNotFound(model_path.to_path_buf()));
        }

        let tokenizer_error = |error: tokenizers::Error| EmbeddingError::Tokenizer {
            path: tokenizer_path.to_path_buf(),
            message: error.to_string(),
        };
        let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(tokenizer_error)?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: MAX_SEQUENCE_TOKENS,
                ..TruncationParams::default()
            }))
            .map_err(tokenizer_error)?;

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(available_threads())?
            .commit_from_file(model_path)?;

        let mut embedder = Self {
            session: Mutex::new(session),
            tokenizer,
            model_id: model_id.into(),
            dimensions: 0,
        };
        embedder.dimensions = embedder.encode("")?.len();

        info!(
            model = %embedder.model_id,
            path = %model_path.display(),
            dimensions = embedder.dimensions,
            "loaded onnx embedding model"
        );
        Ok(embedder)
    }

    pub fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|error| EmbeddingError::Tokenization(error.to_string()))?;
        let seq_len = encoding.len();

        let input_ids = Tensor::from_array(([1, seq_len], widen(encoding.get_ids())))?;
        let attention_mask =
            Tensor::from_array(([1, seq_len], widen(encoding.get_attention_mask())))?;
        let token_type_ids = Tensor::from_array(([1, seq_len], widen(encoding.get_type_ids())))?;

        let hidden_states = {
            let mut session = self
                .session
                .lock()
                .map_err(|_| EmbeddingError::Inference("session lock poisoned".to_string()))?;
            let outputs = session.run(ort::inputs![
                "input_ids" => input_ids,
                "attention_mask" => attention_mask,
                "token_type_ids" => token_type_ids,
            ])?;

            let hidden = outputs
                .get("last_hidden_state")
                .or_else(|| outputs.get("token_embeddings"))
                .ok_or_else(|| {
                    EmbeddingError::Inference("model has no last_hidden_state output".to_string())
                })?;
            let view = hidden.try_extract_array::<f32>()?;
            view.to_owned()
        };

        let hidden_states = hidden_states
            .into_dimensionality::<Ix3>()
            .map_err(|error| EmbeddingError::Inference(error.to_string()))?;

        let mut vector = mean_pool(&hidden_states.view(), encoding.get_attention_mask());
        l2_normalize(&mut vector);
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for OrtEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        debug!(model = %self.model_id, batch_size = texts.len(), "encoding locally");
        texts.iter().map(|text| self.encode(text)).collect()
    }
}

fn widen(values: &[u32]) -> Box<[i64]> {
    values.iter().map(|&value| i64::from(value)).collect()
}

fn mean_pool(hidden_states: &ArrayView3<f32>, attention_mask: &[u32]) -> Vec<f32> {
    let hidden_dim = hidden_states.shape()[2];
    let mut pooled = vec![0f32; hidden_dim];
    let mut counted = 0f32;

    for (position, &mask) in attention_mask.iter().enumerate() {
        if mask == 0 {
            continue;
        }
        counted += 1.0;
        for (dim, value) in pooled.iter_mut().enumerate() {
            *value += hidden_states[[0, position, dim]];
        }
    }

    if counted > 0.0 {
        for value in &mut pooled {
            *value /= counted;
        }
    }
    pooled
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

fn find_model_file(dir: &Path) -> Result<PathBuf, EmbeddingError> {
    let candidates = [
        dir.join("model.onnx"),
        dir.join("onnx/model.onnx"),
        dir.join("onnx/model_quantized.onnx"),
    ];
    candidates
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| EmbeddingError::ModelNotFound(dir.to_path_buf()))
}

fn find_tokenizer_file(dir: &Path) -> Result<PathBuf, EmbeddingError> {
    [dir.join("tokenizer.json"), dir.join("onnx/tokenizer.json")]
        .into_iter()
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| EmbeddingError::TokenizerNotFound(dir.to_path_buf()))
}

fn available_threads() -> usize {
    std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(4)
}
