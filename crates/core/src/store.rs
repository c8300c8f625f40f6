use crate::embeddings::{Embedder, EmbeddingPipeline};
use crate::error::IndexError;
use crate::models::{Document, ScoredDocument, SearchType};
use crate::traits::DocumentRetriever;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

pub const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFingerprint {
    pub path: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexManifest {
    pub embedding_model: String,
    pub dimensions: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub sources: Vec<SourceFingerprint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    id: Uuid,
    vector: Vec<f32>,
    document: Document,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedIndex {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
}

pub struct VectorStore {
    manifest: IndexManifest,
    entries: Vec<IndexEntry>,
    embedder: Arc<dyn Embedder>,
}

impl VectorStore {
    pub async fn from_documents(
        chunks: Vec<Document>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, IndexError> {
        if chunks.is_empty() {
            return Err(IndexError::Empty);
        }

        let vectors = EmbeddingPipeline::new(Arc::clone(&embedder))
            .embed_chunks(&chunks)
            .await?;

        let dimensions = embedder.dimensions();
        let entries = chunks
            .into_iter()
            .zip(vectors)
            .map(|(document, vector)| {
                if vector.len() != dimensions {
                    return Err(IndexError::DimensionMismatch {
                        expected: dimensions,
                        actual: vector.len(),
                    });
                }
                Ok(IndexEntry {
                    id: Uuid::new_v4(),
                    vector,
                    document,
                })
            })
            .collect::<Result<Vec<_>, IndexError>>()?;

        Ok(Self {
            manifest: IndexManifest {
                embedding_model: embedder.model_id().to_string(),
                dimensions,
                chunk_count: entries.len(),
                created_at: Utc::now(),
                sources: Vec::new(),
            },
            entries,
            embedder,
        })
    }

    pub async fn build(
        chunks: Vec<Document>,
        embedder: Arc<dyn Embedder>,
        path: &Path,
    ) -> Result<Self, IndexError> {
        let store = Self::from_documents(chunks, embedder).await?;
        store.save_local(path)?;
        Ok(store)
    }

    pub fn with_sources(mut self, sources: Vec<SourceFingerprint>) -> Self {
        self.manifest.sources = sources;
        self
    }

    pub fn save_local(&self, path: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(path)?;

        let persisted = PersistedIndex {
            manifest: self.manifest.clone(),
            entries: self.entries.clone(),
        };
        let staging = path.join(format!("{INDEX_FILE}.tmp"));
        fs::write(&staging, serde_json::to_vec(&persisted)?)?;
        fs::rename(&staging, path.join(INDEX_FILE))?;

        info!(
            path = %path.display(),
            chunks = self.entries.len(),
            model = %self.manifest.embedding_model,
            "vector index written"
        );
        Ok(())
    }

    // a model mismatch is only logged; the file is trusted as-is
    pub fn load_local(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, IndexError> {
        let file = path.join(INDEX_FILE);
        if !file.is_file() {
            return Err(IndexError::NotFound(path.display().to_string()));
        }

        let persisted: PersistedIndex = serde_json::from_slice(&fs::read(&file)?)?;

        if persisted.manifest.embedding_model != embedder.model_id()
            || persisted.manifest.dimensions != embedder.dimensions()
        {
            warn!(
                index_model = %persisted.manifest.embedding_model,
                index_dimensions = persisted.manifest.dimensions,
                query_model = %embedder.model_id(),
                query_dimensions = embedder.dimensions(),
                "index was built with a different embedding model; search quality will suffer"
            );
        }

        info!(
            path = %path.display(),
            chunks = persisted.entries.len(),
            "vector index loaded"
        );

        Ok(Self {
            manifest: persisted.manifest,
            entries: persisted.entries,
            embedder,
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn as_retriever(self: Arc<Self>, k: usize) -> Retriever {
        Retriever {
            store: self,
            k,
            search_type: SearchType::Similarity,
        }
    }

    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>, IndexError> {
        Ok(self
            .similarity_search_with_score(query, k)
            .await?
            .into_iter()
            .map(|hit| hit.document)
            .collect())
    }

    pub async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, IndexError> {
        let vector = self.embedder.embed_query(query).await?;
        self.similarity_search_by_vector_with_score(&vector, k)
    }

    // ascending squared L2; equal distances keep insertion order
    pub fn similarity_search_by_vector_with_score(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredDocument>, IndexError> {
        if vector.len() != self.manifest.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.manifest.dimensions,
                actual: vector.len(),
            });
        }

        let mut scored = self
            .entries
            .iter()
            .map(|entry| (squared_l2(&entry.vector, vector), entry))
            .collect::<Vec<_>>();
        scored.sort_by(|left, right| left.0.total_cmp(&right.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, entry)| ScoredDocument {
                document: entry.document.clone(),
                score,
            })
            .collect())
    }
}

impl std::fmt::Debug for VectorStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorStore")
            .field("manifest", &self.manifest)
            .field("entries", &self.entries.len())
            .field("embedder", &self.embedder.model_id())
            .finish()
    }
}

fn squared_l2(left: &[f32], right: &[f32]) -> f32 {
    left.iter()
        .zip(right)
        .map(|(a, b)| (a - b) * (a - b))
        .sum()
}

#[derive(Debug, Clone)]
pub struct Retriever {
    store: Arc<VectorStore>,
    k: usize,
    search_type: SearchType,
}

impl Retriever {
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn search_type(&self) -> SearchType {
        self.search_type
    }

    pub fn vector_store(&self) -> &Arc<VectorStore> {
        &self.store
    }
}

#[async_trait]
impl DocumentRetriever for Retriever {
    async fn retrieve(&self, query: &str) -> Result<Vec<Document>, IndexError> {
        match self.search_type {
            SearchType::Similarity => self.store.similarity_search(query, self.k).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use tempfile::tempdir;

    fn corpus() -> Vec<Document> {
        [
            "Asthma is a chronic disease of the airways that causes wheezing.",
            "A fracture is a break in the continuity of a bone.",
            "Diabetes mellitus is marked by high blood sugar over a long period.",
            "Migraine headaches often come with nausea and sensitivity to light.",
            "Influenza is a contagious respiratory illness caused by viruses.",
        ]
        .into_iter()
        .map(Document::new)
        .collect()
    }

    fn embedder() -> Arc<dyn Embedder> {
        Arc::new(CharacterNgramEmbedder::new(128))
    }

    #[tokio::test]
    async fn build_then_load_finds_exact_chunk_first() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("faiss_index");
        VectorStore::build(corpus(), embedder(), &path).await?;

        let loaded = VectorStore::load_local(&path, embedder())?;
        assert_eq!(loaded.len(), 5);

        let query = "A fracture is a break in the continuity of a bone.";
        let hits = loaded.similarity_search_with_score(query, 3).await?;

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].document.page_content, query);
        assert!(hits[0].score.abs() < 1e-6);
        Ok(())
    }

    #[tokio::test]
    async fn scores_are_non_decreasing() -> Result<(), Box<dyn std::error::Error>> {
        let store = VectorStore::from_documents(corpus(), embedder()).await?;
        let hits = store
            .similarity_search_with_score("breathing trouble and wheezing", 5)
            .await?;

        assert_eq!(hits.len(), 5);
        for pair in hits.windows(2) {
            assert!(pair[0].score <= pair[1].score);
        }
        Ok(())
    }

    #[tokio::test]
    async fn k_larger_than_index_returns_everything() -> Result<(), Box<dyn std::error::Error>> {
        let store = VectorStore::from_documents(corpus(), embedder()).await?;
        let hits = store.similarity_search_with_score("bone", 50).await?;
        assert_eq!(hits.len(), 5);
        Ok(())
    }

    #[test]
    fn load_fails_when_index_is_absent() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let result = VectorStore::load_local(&dir.path().join("missing"), embedder());
        assert!(matches!(result, Err(IndexError::NotFound(_))));
        Ok(())
    }

    #[tokio::test]
    async fn empty_corpus_is_rejected() {
        let result = VectorStore::from_documents(Vec::new(), embedder()).await;
        assert!(matches!(result, Err(IndexError::Empty)));
    }

    #[tokio::test]
    async fn rebuild_overwrites_previous_index() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("faiss_index");
        VectorStore::build(corpus(), embedder(), &path).await?;
        VectorStore::build(vec![Document::new("only chunk")], embedder(), &path).await?;

        let loaded = VectorStore::load_local(&path, embedder())?;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.manifest().chunk_count, 1);
        Ok(())
    }

    #[tokio::test]
    async fn loading_with_another_model_succeeds() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let path = dir.path().join("faiss_index");
        VectorStore::build(corpus(), embedder(), &path).await?;

        let other: Arc<dyn Embedder> = Arc::new(CharacterNgramEmbedder::new(64));
        let loaded = VectorStore::load_local(&path, other)?;
        assert_eq!(loaded.manifest().embedding_model, "char-trigram-128");

        let search = loaded.similarity_search_with_score("asthma", 2).await;
        assert!(matches!(
            search,
            Err(IndexError::DimensionMismatch {
                expected: 128,
                actual: 64
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn retriever_returns_top_k_documents() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(VectorStore::from_documents(corpus(), embedder()).await?);
        let retriever = store.as_retriever(3);

        let documents = retriever
            .retrieve("Influenza is a contagious respiratory illness caused by viruses.")
            .await?;

        assert_eq!(retriever.k(), 3);
        assert_eq!(documents.len(), 3);
        assert!(documents[0].page_content.starts_with("Influenza"));
        Ok(())
    }
}
