use crate::error::IngestError;
use crate::models::Document;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub trait DocumentLoader {
    fn load(&self) -> Result<Vec<Document>, IngestError>;
}

#[derive(Debug, Clone)]
pub struct PdfLoader {
    path: PathBuf,
}

impl PdfLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DocumentLoader for PdfLoader {
    fn load(&self) -> Result<Vec<Document>, IngestError> {
        if !self.path.exists() {
            return Err(IngestError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("pdf not found: {}", self.path.display()),
            )));
        }

        let pdf = lopdf::Document::load(&self.path)
            .map_err(|error| IngestError::PdfParse(format!("{}: {error}", self.path.display())))?;

        let pages = pdf.get_pages();
        let total_pages = pages.len();
        let source = self.path.to_string_lossy().to_string();

        let mut documents = Vec::with_capacity(total_pages);
        for (index, page_no) in pages.keys().enumerate() {
            let text = match pdf.extract_text(&[*page_no]) {
                Ok(text) => text,
                Err(error) => {
                    warn!(source = %source, page = *page_no, %error, "page text extraction failed");
                    String::new()
                }
            };

            documents.push(
                Document::new(text)
                    .with_metadata("source", source.clone())
                    .with_metadata("page", index)
                    .with_metadata("total_pages", total_pages),
            );
        }

        debug!(source = %source, pages = documents.len(), "loaded pdf");
        Ok(documents)
    }
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn digest_file(path: &Path) -> Result<String, IngestError> {
    let bytes = fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

pub fn resolve_pdf_paths(path: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if path.is_dir() {
        let files = discover_pdf_files(path);
        if files.is_empty() {
            return Err(IngestError::InvalidArgument(format!(
                "no pdf files found in {}",
                path.display()
            )));
        }
        return Ok(files);
    }

    if path.file_name().is_none() {
        return Err(IngestError::MissingFileName(path.display().to_string()));
    }

    Ok(vec![path.to_path_buf()])
}
