//! Model-free backends. They keep the pipeline runnable without ONNX weights
//! and make ranking tests deterministic.

use crate::error::ModelError;
use crate::lexical::{coverage, token_set};
use crate::traits::{CrossScorer, SentenceEncoder};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 256;

/// Hashes lower-cased character trigrams into a fixed number of buckets.
#[derive(Debug, Clone, Copy)]
pub struct HashingEncoder {
    pub dimensions: usize,
}

impl Default for HashingEncoder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashingEncoder {
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let mut hash = 1469598103934665603u64;
            for ch in window {
                let mut buffer = [0u8; 4];
                for byte in ch.encode_utf8(&mut buffer).bytes() {
                    hash ^= byte as u64;
                    hash = hash.wrapping_mul(1099511628211);
                }
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        vector
    }
}

impl SentenceEncoder for HashingEncoder {
    fn name(&self) -> &str {
        "hashing-trigram"
    }

    fn encode(&self, texts: &[&str], _batch_size: usize) -> Result<Vec<Vec<f32>>, ModelError> {
        Ok(texts.iter().map(|text| self.embed(text)).collect())
    }
}

/// Scores a pair by the anchor's token coverage, mapped onto a logit scale.
#[derive(Debug, Clone, Copy)]
pub struct LexicalCrossScorer {
    pub scale: f32,
    pub bias: f32,
}

impl Default for LexicalCrossScorer {
    fn default() -> Self {
        Self {
            scale: 8.0,
            bias: -4.0,
        }
    }
}

impl CrossScorer for LexicalCrossScorer {
    fn name(&self) -> &str {
        "lexical-coverage"
    }

    fn score(&self, pairs: &[(&str, &str)], _batch_size: usize) -> Result<Vec<f32>, ModelError> {
        Ok(pairs
            .iter()
            .map(|(anchor, text)| self.scale * coverage(&token_set(anchor), text) + self.bias)
            .collect())
    }
}
