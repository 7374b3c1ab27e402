use crate::error::ModelError;
use crate::traits::{CrossScorer, SentenceEncoder};

const NORM_EPSILON: f32 = 1e-12;

/// Owns the bi-encoder and the cross-encoder for the lifetime of a run.
pub struct EmbeddingIndex {
    encoder: Box<dyn SentenceEncoder>,
    cross: Box<dyn CrossScorer>,
}

impl std::fmt::Debug for EmbeddingIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingIndex")
            .field("encoder", &self.encoder.name())
            .field("cross", &self.cross.name())
            .finish()
    }
}

impl EmbeddingIndex {
    pub fn new(encoder: Box<dyn SentenceEncoder>, cross: Box<dyn CrossScorer>) -> Self {
        Self { encoder, cross }
    }

    pub fn encoder_name(&self) -> &str {
        self.encoder.name()
    }

    pub fn cross_name(&self) -> &str {
        self.cross.name()
    }

    /// Encodes `texts` into L2-normalized rows, one per input.
    pub fn encode(&self, texts: &[&str], batch_size: usize) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut rows = self.encoder.encode(texts, batch_size.max(1))?;
        if rows.len() != texts.len() {
            return Err(ModelError::RowCount {
                requested: texts.len(),
                returned: rows.len(),
            });
        }

        for row in &mut rows {
            l2_normalize(row);
        }
        Ok(rows)
    }

    /// Raw cross-encoder logits for each pair. Apply [`sigmoid`] before mixing
    /// them with other `[0, 1]` signals.
    pub fn cross_score(
        &self,
        pairs: &[(&str, &str)],
        batch_size: usize,
    ) -> Result<Vec<f32>, ModelError> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let scores = self.cross.score(pairs, batch_size.max(1))?;
        if scores.len() != pairs.len() {
            return Err(ModelError::RowCount {
                requested: pairs.len(),
                returned: scores.len(),
            });
        }
        Ok(scores)
    }
}

pub fn l2_normalize(row: &mut [f32]) {
    let norm = row.iter().map(|value| value * value).sum::<f32>().sqrt() + NORM_EPSILON;
    for value in row.iter_mut() {
        *value /= norm;
    }
}

/// Dot product; equals cosine similarity for normalized rows.
pub fn dot(left: &[f32], right: &[f32]) -> f32 {
    left.iter().zip(right).map(|(a, b)| a * b).sum()
}

pub fn sigmoid(value: f32) -> f32 {
    1.0 / (1.0 + (-value).exp())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{HashingEncoder, LexicalCrossScorer};

    struct ShortEncoder;

    impl SentenceEncoder for ShortEncoder {
        fn name(&self) -> &str {
            "short"
        }

        fn encode(&self, _texts: &[&str], _batch_size: usize) -> Result<Vec<Vec<f32>>, ModelError> {
            Ok(vec![vec![1.0, 0.0]])
        }
    }

    fn index() -> EmbeddingIndex {
        EmbeddingIndex::new(
            Box::new(HashingEncoder::default()),
            Box::new(LexicalCrossScorer::default()),
        )
    }

    #[test]
    fn encoded_rows_are_unit_length() -> Result<(), ModelError> {
        let rows = index().encode(&["hydraulic pressure", "flow rate and valves"], 8)?;

        assert_eq!(rows.len(), 2);
        for row in rows {
            let norm = dot(&row, &row).sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
        Ok(())
    }

    #[test]
    fn empty_input_skips_the_model() -> Result<(), ModelError> {
        let index = index();
        assert!(index.encode(&[], 8)?.is_empty());
        assert!(index.cross_score(&[], 8)?.is_empty());
        Ok(())
    }

    #[test]
    fn row_count_mismatch_is_an_error() {
        let index = EmbeddingIndex::new(Box::new(ShortEncoder), Box::new(LexicalCrossScorer::default()));
        let result = index.encode(&["a", "b"], 4);
        assert!(matches!(
            result,
            Err(ModelError::RowCount {
                requested: 2,
                returned: 1
            })
        ));
    }

    #[test]
    fn sigmoid_maps_logits_into_unit_interval() {
        assert!((sigmoid(0.0) - 0.5).abs() < 1e-6);
        assert!(sigmoid(12.0) > 0.99);
        assert!(sigmoid(-12.0) < 0.01);
    }
}
