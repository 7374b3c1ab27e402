use crate::error::{DocumentError, ModelError};
use crate::models::PageWords;
use std::path::Path;

/// Produces positioned words for every page of a PDF.
pub trait WordSource {
    fn page_count(&self, path: &Path) -> Result<usize, DocumentError>;

    /// Words for the first `max_pages` pages, or all pages when `None`.
    fn extract_words(
        &self,
        path: &Path,
        max_pages: Option<usize>,
    ) -> Result<Vec<PageWords>, DocumentError>;
}

/// Bi-encoder: embeds texts independently into a shared vector space.
pub trait SentenceEncoder {
    fn name(&self) -> &str;

    fn encode(&self, texts: &[&str], batch_size: usize) -> Result<Vec<Vec<f32>>, ModelError>;
}

/// Cross-encoder: scores (anchor, candidate) pairs jointly. Scores are raw logits.
pub trait CrossScorer {
    fn name(&self) -> &str;

    fn score(&self, pairs: &[(&str, &str)], batch_size: usize) -> Result<Vec<f32>, ModelError>;
}
