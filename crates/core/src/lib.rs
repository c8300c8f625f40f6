pub mod chain;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod llm;
pub mod loader;
pub mod models;
pub mod onnx;
pub mod pipeline;
pub mod prompt;
pub mod store;
pub mod traits;

pub use chain::RetrievalChain;
pub use chunking::{ChunkingConfig, RecursiveCharacterSplitter, DEFAULT_SEPARATORS};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, EmbeddingBackend, EmbeddingConfig, EmbeddingPipeline,
    HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL,
};
pub use error::{
    ChainError, EmbeddingError, IndexError, IngestError, ModelError, PipelineError, PromptError,
};
pub use llm::{GroqChatModel, LlmConfig, DEFAULT_CHAT_MODEL, DEFAULT_MAX_TOKENS, GROQ_BASE_URL};
pub use loader::{discover_pdf_files, DocumentLoader, PdfLoader};
pub use models::{
    ChainInput, ChainOutput, Document, Metadata, PipelineOptions, ScoredDocument, SearchType,
};
pub use onnx::{OrtEmbedder, DEFAULT_MODEL_DIR};
pub use pipeline::{build_vector_store, load_chain, load_corpus, BuildReport, PdfChatChain, SkippedPdf};
pub use prompt::{format_documents, PromptTemplate, DEFAULT_TEMPLATE};
pub use store::{IndexManifest, Retriever, SourceFingerprint, VectorStore, INDEX_FILE};
pub use traits::{ChatModel, DocumentRetriever, QuestionAnswering};
