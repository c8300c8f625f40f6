use crate::error::EmbeddingError;
use crate::models::Document;
use crate::onnx::{OrtEmbedder, DEFAULT_MODEL_DIR};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;
pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed_documents(&[text]).await?;
        match vectors.len() {
            1 => Ok(vectors.remove(0)),
            actual => Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual,
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CharacterNgramEmbedder {
    dimensions: usize,
    model_id: String,
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model_id: format!("char-trigram-{dimensions}"),
        }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        let width = chars.len().min(3);
        for window in chars.windows(width) {
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

        vector
    }
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    dimensions: usize,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(
        base_url: &str,
        model: impl Into<String>,
        dimensions: usize,
        api_key: Option<String>,
    ) -> Result<Self, EmbeddingError> {
        let base = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))?;
        Ok(Self {
            client: Client::new(),
            endpoint: base.join("embeddings")?,
            model: model.into(),
            dimensions,
            api_key,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_documents(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(model = %self.model, batch_size = texts.len(), "requesting embeddings");

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            });
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::BackendResponse {
                provider: self.endpoint.to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        into_ordered_vectors(parsed, texts.len())
    }
}

fn into_ordered_vectors(
    mut response: EmbeddingResponse,
    expected: usize,
) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if response.data.len() != expected {
        return Err(EmbeddingError::CountMismatch {
            expected,
            actual: response.data.len(),
        });
    }
    response.data.sort_by_key(|item| item.index);
    Ok(response.data.into_iter().map(|item| item.embedding).collect())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmbeddingBackend {
    #[default]
    Onnx,
    Http,
    Trigram,
}

impl FromStr for EmbeddingBackend {
    type Err = EmbeddingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "onnx" => Ok(Self::Onnx),
            "http" => Ok(Self::Http),
            "trigram" => Ok(Self::Trigram),
            other => Err(EmbeddingError::UnknownBackend(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub backend: EmbeddingBackend,
    pub model: String,
    pub model_dir: PathBuf,
    pub dimensions: usize,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            model_dir: PathBuf::from(DEFAULT_MODEL_DIR),
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
            endpoint: None,
            api_key: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn build(&self) -> Result<Arc<dyn Embedder>, EmbeddingError> {
        match self.backend {
            EmbeddingBackend::Onnx => Ok(Arc::new(OrtEmbedder::from_directory(
                &self.model_dir,
                self.model.clone(),
            )?)),
            EmbeddingBackend::Http => {
                let endpoint = self
                    .endpoint
                    .as_deref()
                    .ok_or(EmbeddingError::MissingEndpoint)?;
                Ok(Arc::new(HttpEmbedder::new(
                    endpoint,
                    self.model.clone(),
                    self.dimensions,
                    self.api_key.clone(),
                )?))
            }
            EmbeddingBackend::Trigram => Ok(Arc::new(CharacterNgramEmbedder::new(self.dimensions))),
        }
    }
}

#[derive(Clone)]
pub struct EmbeddingPipeline {
    model: Arc<dyn Embedder>,
}

impl EmbeddingPipeline {
    pub fn new(model: Arc<dyn Embedder>) -> Self {
        Self { model }
    }

    pub async fn embed_texts(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let vectors = self.model.embed_documents(texts).await?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: vectors.len(),
            });
        }
        Ok(vectors)
    }

    pub async fn embed_chunks(&self, chunks: &[Document]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let texts = chunks
            .iter()
            .map(|chunk| chunk.page_content.as_str())
            .collect::<Vec<_>>();
        self.embed_texts(&texts).await
    }

    pub fn embedding_model(&self) -> Arc<dyn Embedder> {
        Arc::clone(&self.model)
    }
}

impl std::fmt::Debug for EmbeddingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingPipeline")
            .field("model", &self.model.model_id())
            .field("dimensions", &self.model.dimensions())
            .finish()
    }
}
