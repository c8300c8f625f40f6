use crate::chain::RetrievalChain;
use crate::chunking::{ChunkingConfig, RecursiveCharacterSplitter};
use crate::embeddings::Embedder;
use crate::llm::{GroqChatModel, LlmConfig};
use crate::loader::{digest_file, resolve_pdf_paths, DocumentLoader, PdfLoader};
use crate::prompt::PromptTemplate;
use crate::store::{Retriever, SourceFingerprint, VectorStore};
use crate::{Document, IngestError, ModelError, PipelineError, PipelineOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

pub type PdfChatChain = RetrievalChain<Retriever, GroqChatModel>;

#[derive(Debug)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug)]
pub struct BuildReport {
    pub index_dir: PathBuf,
    pub pages: usize,
    pub chunks: usize,
    pub sources: Vec<SourceFingerprint>,
    pub skipped_files: Vec<SkippedPdf>,
}

pub fn load_corpus(
    options: &PipelineOptions,
) -> Result<(Vec<Document>, Vec<SourceFingerprint>, Vec<SkippedPdf>), IngestError> {
    let single_file = !options.pdf_path.is_dir();
    let files = resolve_pdf_paths(&options.pdf_path)?;

    let mut pages = Vec::new();
    let mut sources = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        let loaded = PdfLoader::new(&path)
            .load()
            .and_then(|documents| Ok((documents, digest_file(&path)?)));

        match loaded {
            Ok((documents, checksum)) => {
                info!(path = %path.display(), pages = documents.len(), "loaded pdf");
                pages.extend(documents);
                sources.push(SourceFingerprint {
                    path: path.to_string_lossy().to_string(),
                    checksum,
                });
            }
            Err(error) if single_file => return Err(error),
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped pdf");
                skipped_files.push(SkippedPdf {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    if sources.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no readable pdf files under {}",
            options.pdf_path.display()
        )));
    }

    Ok((pages, sources, skipped_files))
}

pub async fn build_vector_store(
    options: &PipelineOptions,
    embedder: Arc<dyn Embedder>,
) -> Result<BuildReport, PipelineError> {
    let (pages, sources, skipped_files) = load_corpus(options)?;

    let splitter = RecursiveCharacterSplitter::new(ChunkingConfig::from(options))?;
    let chunks = splitter.split_documents(&pages);
    info!(
        pages = pages.len(),
        chunks = chunks.len(),
        chunk_size = options.chunk_size,
        chunk_overlap = options.chunk_overlap,
        "split corpus"
    );

    let chunk_count = chunks.len();
    VectorStore::from_documents(chunks, embedder)
        .await?
        .with_sources(sources.clone())
        .save_local(&options.index_dir)?;

    Ok(BuildReport {
        index_dir: options.index_dir.clone(),
        pages: pages.len(),
        chunks: chunk_count,
        sources,
        skipped_files,
    })
}

pub fn load_chain(
    options: &PipelineOptions,
    embedder: Arc<dyn Embedder>,
    llm: LlmConfig,
) -> Result<PdfChatChain, PipelineError> {
    if llm.api_key.is_none() {
        return Err(ModelError::MissingApiKey(llm.base_url).into());
    }

    info!(model = %llm.model, max_tokens = llm.max_tokens, "loading chat model");
    let model = GroqChatModel::new(llm)?;

    info!(path = %options.index_dir.display(), "loading vector index");
    let store = VectorStore::load_local(&options.index_dir, embedder)?;
    let retriever = Arc::new(store).as_retriever(options.top_k);

    Ok(RetrievalChain::new(retriever, model, PromptTemplate::default()))
}
