//! services/bot/src/adapters/extract/mod.rs
//!
//! The `TextExtractionService` adapter. Parsing is CPU-bound, so it runs on
//! the blocking thread pool.

pub mod doc;
pub mod docx;

use async_trait::async_trait;
use bytes::Bytes;
use originality_core::catalog::DocumentFormat;
use originality_core::ports::{PortError, PortResult, TextExtractionService};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentExtractor;

impl DocumentExtractor {
    pub fn new() -> Self {
        Self
    }
}

fn extract_sync(content: &[u8], format: DocumentFormat) -> PortResult<String> {
    match format {
        DocumentFormat::Docx => docx::extract_docx(content)
            .map_err(|e| PortError::Extraction(format!("docx: {}", e))),
        DocumentFormat::Doc => {
            doc::extract_doc(content).map_err(|e| PortError::Extraction(format!("doc: {}", e)))
        }
    }
}

#[async_trait]
impl TextExtractionService for DocumentExtractor {
    async fn extract(&self, content: Bytes, format: DocumentFormat) -> PortResult<String> {
        let size = content.len();
        let text = tokio::task::spawn_blocking(move || extract_sync(&content, format))
            .await
            .map_err(|e| PortError::Unexpected(format!("extraction task failed: {}", e)))??;
        debug!(?format, size, chars = text.len(), "Document text extracted");
        Ok(text)
    }
}
