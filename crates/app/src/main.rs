mod api;

use api::{run_server, AppState};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use docchat_core::{
    build_vector_store, load_chain, ChainInput, EmbeddingBackend, EmbeddingConfig, LlmConfig,
    PipelineOptions, QuestionAnswering, VectorStore, DEFAULT_CHAT_MODEL,
    DEFAULT_EMBEDDING_DIMENSIONS, DEFAULT_EMBEDDING_MODEL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL_DIR,
    GROQ_BASE_URL,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8000;

#[derive(Parser)]
#[command(name = "docchat", version, about = "Ask questions about a PDF corpus")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,

    /// PDF file, or folder of PDFs, the index is built from
    #[arg(long, env = "DOCCHAT_PDF", default_value = "data/Medical_book.pdf")]
    pdf: PathBuf,

    /// Directory holding the persisted vector index
    #[arg(long, env = "DOCCHAT_INDEX_DIR", default_value = "faiss_index")]
    index_dir: PathBuf,

    /// Maximum characters per chunk
    #[arg(long, env = "DOCCHAT_CHUNK_SIZE", default_value_t = 2_000)]
    chunk_size: usize,

    /// Characters shared between neighbouring chunks
    #[arg(long, env = "DOCCHAT_CHUNK_OVERLAP", default_value_t = 200)]
    chunk_overlap: usize,

    /// Chunks retrieved per question
    #[arg(long, env = "DOCCHAT_TOP_K", default_value_t = 3)]
    top_k: usize,

    /// Embedding backend: onnx (local sentence model), http or trigram
    #[arg(long, env = "DOCCHAT_EMBEDDING_BACKEND", default_value = "onnx")]
    embedding_backend: EmbeddingBackend,

    /// Embedding model name, recorded in the index and sent to the http backend
    #[arg(long, env = "DOCCHAT_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Directory holding model.onnx and tokenizer.json for the onnx backend
    #[arg(long, env = "DOCCHAT_EMBEDDING_MODEL_DIR", default_value = DEFAULT_MODEL_DIR)]
    embedding_model_dir: PathBuf,

    /// Embedding vector size for the http and trigram backends
    #[arg(long, env = "DOCCHAT_EMBEDDING_DIMENSIONS", default_value_t = DEFAULT_EMBEDDING_DIMENSIONS)]
    embedding_dimensions: usize,

    /// OpenAI-compatible embeddings base URL for the http backend
    #[arg(long, env = "DOCCHAT_EMBEDDING_ENDPOINT")]
    embedding_endpoint: Option<String>,

    /// Bearer token for the embedding endpoint
    #[arg(long, env = "DOCCHAT_EMBEDDING_API_KEY", hide_env_values = true)]
    embedding_api_key: Option<String>,

    /// Chat model
    #[arg(long, env = "DOCCHAT_LLM_MODEL", default_value = DEFAULT_CHAT_MODEL)]
    llm_model: String,

    /// Chat completions base URL
    #[arg(long, env = "DOCCHAT_LLM_BASE_URL", default_value = GROQ_BASE_URL)]
    llm_base_url: String,

    /// Maximum tokens in a generated answer
    #[arg(long, env = "DOCCHAT_MAX_TOKENS", default_value_t = DEFAULT_MAX_TOKENS)]
    max_tokens: u32,

    /// Groq API key
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    groq_api_key: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the JSON API (default).
    Serve,
    /// Load the PDF corpus, chunk and embed it, and write the vector index.
    Build,
    /// Answer one question and print the retrieved context.
    Ask {
        /// Question to answer
        question: String,
    },
    /// Print the nearest chunks for a query with their distances.
    Search {
        /// Search query
        query: String,
        /// Number of chunks to return.
        #[arg(long, default_value_t = 4)]
        k: usize,
    },
}

#[derive(Args)]
struct ServeArgs {
    /// Interface to bind
    #[arg(long, global = true, env = "DOCCHAT_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(long, global = true, env = "DOCCHAT_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

impl Cli {
    fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            pdf_path: self.pdf.clone(),
            index_dir: self.index_dir.clone(),
            chunk_size: self.chunk_size,
            chunk_overlap: self.chunk_overlap,
            top_k: self.top_k,
        }
    }

    fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            backend: self.embedding_backend,
            model: self.embedding_model.clone(),
            model_dir: self.embedding_model_dir.clone(),
            dimensions: self.embedding_dimensions,
            endpoint: self.embedding_endpoint.clone(),
            api_key: self.embedding_api_key.clone(),
        }
    }

    fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            model: self.llm_model.clone(),
            api_key: self
                .groq_api_key
                .as_ref()
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            max_tokens: self.max_tokens,
            base_url: self.llm_base_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    // .env must be applied before clap reads env-backed arguments
    let dotenv = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    if let Ok(path) = dotenv {
        info!(path = %path.display(), "loaded environment file");
    }

    let mut cli = Cli::parse();
    let options = cli.pipeline_options();
    let embedding = cli.embedding_config();

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        embedding_backend = ?embedding.backend,
        embedding_model = %embedding.model,
        "docchat boot"
    );

    match cli.command.take().unwrap_or(Command::Serve) {
        Command::Serve => {
            let addr: SocketAddr = format!("{}:{}", cli.serve.host, cli.serve.port).parse()?;
            let chatbot = load_chatbot(&options, &embedding, cli.llm_config());
            run_server(addr, AppState::new(chatbot)).await?;
        }
        Command::Build => {
            let report = build_vector_store(&options, embedding.build()?)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            if !report.skipped_files.is_empty() {
                warn!(
                    "skipped_files={} for corpus={}",
                    report.skipped_files.len(),
                    options.pdf_path.display()
                );
                for skipped in &report.skipped_files {
                    warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped pdf");
                }
            }

            println!(
                "{} pages, {} chunks indexed into {} at {}",
                report.pages,
                report.chunks,
                report.index_dir.display(),
                Utc::now().to_rfc3339()
            );
        }
        Command::Ask { question } => {
            let chain = load_chain(&options, embedding.build()?, cli.llm_config())
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let output = chain
                .invoke(ChainInput::new(question))
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("{}", output.answer);
            for (rank, document) in output.context.iter().enumerate() {
                println!("\n[context {}]\n{}", rank + 1, document.page_content);
            }
        }
        Command::Search { query, k } => {
            let store = VectorStore::load_local(&options.index_dir, embedding.build()?)
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;
            let hits = store
                .similarity_search_with_score(&query, k)
                .await
                .map_err(|error| anyhow::anyhow!(error.to_string()))?;

            println!("query: {query}");
            for (rank, hit) in hits.iter().enumerate() {
                println!("[{}] distance={:.4}", rank + 1, hit.score);
                println!("  chunk_text:\n{}", hit.document.page_content);
            }
        }
    }

    Ok(())
}

/// Builds the chain once for the process lifetime. Any failure, including
/// the embedding model failing to load, is logged and leaves the service
/// running degraded.
fn load_chatbot(
    options: &PipelineOptions,
    embedding: &EmbeddingConfig,
    llm: LlmConfig,
) -> Option<Arc<dyn QuestionAnswering>> {
    let embedder = match embedding.build() {
        Ok(embedder) => embedder,
        Err(error) => {
            error!(%error, "failed to load embedding model; serving in degraded mode");
            return None;
        }
    };

    match load_chain(options, embedder, llm) {
        Ok(chain) => {
            info!(index = %options.index_dir.display(), top_k = options.top_k, "chatbot loaded");
            Some(Arc::new(chain))
        }
        Err(error) => {
            error!(%error, "failed to load chatbot; serving in degraded mode");
            warn!("run `docchat build` to create the vector index and set GROQ_API_KEY");
            None
        }
    }
}
