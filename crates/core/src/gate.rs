use crate::embeddings::{dot, EmbeddingIndex};
use crate::error::ModelError;
use crate::models::DocScore;

/// Number of documents kept when a threshold rejects everything and no
/// `max_docs` was given.
pub const FALLBACK_DOCS: usize = 3;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateOutcome {
    /// Every previewed document, best score first.
    pub scores: Vec<DocScore>,
    pub selected: Vec<String>,
}

/// Decides which documents are worth full extraction and ranking.
pub struct CorpusGate<'a> {
    index: &'a EmbeddingIndex,
    batch_size: usize,
}

impl<'a> CorpusGate<'a> {
    pub fn new(index: &'a EmbeddingIndex, batch_size: usize) -> Self {
        Self {
            index,
            batch_size: batch_size.max(1),
        }
    }

    /// Scores each `(file, preview)` against the anchor and picks the subset
    /// to process. Never empty when `previews` is not.
    pub fn select(
        &self,
        previews: &[(String, String)],
        anchor: &str,
        max_docs: Option<usize>,
        doc_threshold: Option<f32>,
    ) -> Result<GateOutcome, ModelError> {
        if previews.is_empty() {
            return Ok(GateOutcome::default());
        }

        let anchor_row = self
            .index
            .encode(&[anchor], self.batch_size)?
            .into_iter()
            .next()
            .unwrap_or_default();
        let texts: Vec<&str> = previews.iter().map(|(_, preview)| preview.as_str()).collect();
        let rows = self.index.encode(&texts, self.batch_size)?;

        let mut scores: Vec<DocScore> = previews
            .iter()
            .zip(&rows)
            .map(|((file, _), row)| DocScore {
                file: file.clone(),
                score: dot(row, &anchor_row),
            })
            .collect();
        scores.sort_by(|left, right| right.score.total_cmp(&left.score));

        let selected = select_documents(&scores, max_docs, doc_threshold);
        Ok(GateOutcome { scores, selected })
    }
}

/// Threshold-and-cap selection over scores sorted best-first. The threshold is
/// advisory: when nothing clears it, the best documents are taken anyway.
pub fn select_documents(
    sorted: &[DocScore],
    max_docs: Option<usize>,
    doc_threshold: Option<f32>,
) -> Vec<String> {
    let cap = max_docs.unwrap_or(usize::MAX);

    let selected: Vec<String> = sorted
        .iter()
        .filter(|doc| doc_threshold.map_or(true, |threshold| doc.score >= threshold))
        .take(cap)
        .map(|doc| doc.file.clone())
        .collect();

    if !selected.is_empty() || sorted.is_empty() {
        return selected;
    }

    let take = sorted.len().min(max_docs.unwrap_or(FALLBACK_DOCS).max(1));
    sorted
        .iter()
        .take(take)
        .map(|doc| doc.file.clone())
        .collect()
}
