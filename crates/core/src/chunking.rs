use crate::error::IngestError;
use crate::models::{Document, PipelineOptions};
use std::collections::VecDeque;
use tracing::warn;

pub const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub separators: Vec<String>,
    pub keep_metadata: bool,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.chunk_size == 0 {
            return Err(IngestError::InvalidChunkConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(IngestError::InvalidChunkConfig(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2_000,
            chunk_overlap: 200,
            separators: DEFAULT_SEPARATORS.iter().map(|s| s.to_string()).collect(),
            keep_metadata: false,
        }
    }
}

impl From<&PipelineOptions> for ChunkingConfig {
    fn from(value: &PipelineOptions) -> Self {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    config: ChunkingConfig,
}

impl RecursiveCharacterSplitter {
    pub fn new(config: ChunkingConfig) -> Result<Self, IngestError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &self.config.separators)
    }

    pub fn split_documents(&self, documents: &[Document]) -> Vec<Document> {
        let mut chunks = Vec::new();
        for document in documents {
            for text in self.split_text(&document.page_content) {
                let mut chunk = Document::new(text);
                if self.config.keep_metadata {
                    chunk.metadata = document.metadata.clone();
                }
                chunks.push(chunk);
            }
        }
        chunks
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        let mut separator = separators.last().map(String::as_str).unwrap_or("");
        let mut remaining: &[String] = &[];

        for (index, candidate) in separators.iter().enumerate() {
            if candidate.is_empty() {
                separator = "";
                break;
            }
            if text.contains(candidate.as_str()) {
                separator = candidate;
                remaining = &separators[index + 1..];
                break;
            }
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();

        for piece in split_keeping_separator(text, separator) {
            if char_len(piece) < self.config.chunk_size {
                pending.push(piece);
                continue;
            }

            if !pending.is_empty() {
                chunks.extend(self.merge_splits(&pending));
                pending.clear();
            }

            if remaining.is_empty() {
                warn!(
                    length = char_len(piece),
                    chunk_size = self.config.chunk_size,
                    "emitting unsplittable chunk larger than chunk_size"
                );
                chunks.push(piece.to_string());
            } else {
                chunks.extend(self.split_recursive(piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_splits(&pending));
        }

        chunks
    }

    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let size = self.config.chunk_size;
        let overlap = self.config.chunk_overlap;

        let mut chunks = Vec::new();
        let mut window: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let length = char_len(split);

            if total + length > size && !window.is_empty() {
                push_joined(&mut chunks, &window);

                // keep at most `overlap` chars as leading context for the next chunk
                while total > overlap || (total + length > size && total > 0) {
                    match window.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            window.push_back(split);
            total += length;
        }

        push_joined(&mut chunks, &window);
        chunks
    }
}

fn push_joined(chunks: &mut Vec<String>, window: &VecDeque<&str>) {
    let joined = window.iter().copied().collect::<String>();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        chunks.push(trimmed.to_string());
    }
}

// separator stays at the start of the following piece
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(index, ch)| &text[index..index + ch.len_utf8()])
            .collect();
    }

    let mut pieces = Vec::new();
    let mut start = 0;

    for (position, _) in text.match_indices(separator) {
        if position > start {
            pieces.push(&text[start..position]);
        }
        start = position;
    }

    if start < text.len() {
        pieces.push(&text[start..]);
    }

    pieces
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
