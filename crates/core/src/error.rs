use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {provider}: {details}")]
    BackendResponse { provider: String, details: String },

    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch { expected: usize, actual: usize },

    #[error("onnx runtime error: {0}")]
    Onnx(#[from] ort::Error),

    #[error("onnx model file not found in {0}")]
    ModelNotFound(PathBuf),

    #[error("tokenizer.json not found in {0}")]
    TokenizerNotFound(PathBuf),

    #[error("failed to load tokenizer from {path}: {message}")]
    Tokenizer { path: PathBuf, message: String },

    #[error("tokenization failed: {0}")]
    Tokenization(String),

    #[error("embedding inference failed: {0}")]
    Inference(String),

    #[error("the http embedding backend needs an endpoint")]
    MissingEndpoint,

    #[error("unknown embedding backend `{0}`; expected onnx, http or trigram")]
    UnknownBackend(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("vector index not found at {0}")]
    NotFound(String),

    #[error("cannot build an index from zero chunks")]
    Empty,

    #[error("vector dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("prompt template is missing the {{{0}}} placeholder")]
    MissingPlaceholder(&'static str),
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("no api key configured for {0}")]
    MissingApiKey(String),

    #[error("{backend} returned {status}: {details}")]
    BackendResponse {
        backend: String,
        status: u16,
        details: String,
    },

    #[error("{0} returned no completion choices")]
    EmptyCompletion(String),
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("retrieval failed: {0}")]
    Retrieval(#[from] IndexError),

    #[error("generation failed: {0}")]
    Generation(#[from] ModelError),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
