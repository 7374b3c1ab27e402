//! ONNX-backed encoders loaded from a local model directory via `fastembed`.
//!
//! Each model folder holds an exported ONNX graph (`model.onnx`, optionally
//! under `onnx/`) and the Hugging Face tokenizer files next to it.

use crate::error::{ConfigError, ModelError};
use crate::traits::{CrossScorer, SentenceEncoder};
use fastembed::{
    InitOptionsUserDefined, Pooling, RerankInitOptionsUserDefined, TextEmbedding, TextRerank,
    TokenizerFiles, UserDefinedEmbeddingModel, UserDefinedRerankingModel,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ENCODER_DIR: &str = "bge-small-en-v1.5";
pub const CROSS_ENCODER_DIR: &str = "cross-encoder-ms-marco";

const FULL_PRECISION: [&str; 2] = ["model.onnx", "onnx/model.onnx"];
const QUANTIZED: [&str; 4] = [
    "model_quantized.onnx",
    "onnx/model_quantized.onnx",
    "model_qint8.onnx",
    "onnx/model_qint8.onnx",
];

pub struct OnnxEncoder {
    label: String,
    model: TextEmbedding,
}

impl OnnxEncoder {
    pub fn load(model_dir: &Path, quantize_int8: bool) -> Result<Self, ConfigError> {
        let folder = model_dir.join(ENCODER_DIR);
        let onnx = read_onnx(&folder, quantize_int8)?;
        let tokenizer = read_tokenizer_files(&folder)?;

        let definition = UserDefinedEmbeddingModel::new(onnx, tokenizer).with_pooling(Pooling::Mean);
        let model = TextEmbedding::try_new_from_user_defined(definition, InitOptionsUserDefined::default())
            .map_err(|error| ConfigError::ModelLoad(format!("{}: {error}", folder.display())))?;

        info!(model = %folder.display(), quantize_int8, "bi-encoder loaded");
        Ok(Self {
            label: ENCODER_DIR.to_string(),
            model,
        })
    }
}

impl SentenceEncoder for OnnxEncoder {
    fn name(&self) -> &str {
        &self.label
    }

    fn encode(&self, texts: &[&str], batch_size: usize) -> Result<Vec<Vec<f32>>, ModelError> {
        self.model
            .embed(texts.to_vec(), Some(batch_size))
            .map_err(|error| ModelError::Inference {
                backend: self.label.clone(),
                details: error.to_string(),
            })
    }
}

pub struct OnnxCrossScorer {
    label: String,
    model: TextRerank,
}

impl OnnxCrossScorer {
    pub fn load(model_dir: &Path, quantize_int8: bool) -> Result<Self, ConfigError> {
        let folder = model_dir.join(CROSS_ENCODER_DIR);
        let onnx = read_onnx(&folder, quantize_int8)?;
        let tokenizer = read_tokenizer_files(&folder)?;

        let definition = UserDefinedRerankingModel::new(onnx, tokenizer);
        let model = TextRerank::try_new_from_user_defined(
            definition,
            RerankInitOptionsUserDefined::default(),
        )
        .map_err(|error| ConfigError::ModelLoad(format!("{}: {error}", folder.display())))?;

        info!(model = %folder.display(), quantize_int8, "cross-encoder loaded");
        Ok(Self {
            label: CROSS_ENCODER_DIR.to_string(),
            model,
        })
    }
}

impl CrossScorer for OnnxCrossScorer {
    fn name(&self) -> &str {
        &self.label
    }

    /// Pairs are grouped by consecutive anchors so each group is one rerank
    /// call. Results come back sorted by score and are mapped to input order.
    fn score(&self, pairs: &[(&str, &str)], batch_size: usize) -> Result<Vec<f32>, ModelError> {
        let mut scores = vec![0f32; pairs.len()];
        let mut start = 0;

        while start < pairs.len() {
            let anchor = pairs[start].0;
            let end = pairs[start..]
                .iter()
                .position(|(other, _)| *other != anchor)
                .map_or(pairs.len(), |offset| start + offset);

            let documents: Vec<&str> = pairs[start..end].iter().map(|(_, text)| *text).collect();
            let results = self
                .model
                .rerank(anchor, documents, false, Some(batch_size))
                .map_err(|error| ModelError::Inference {
                    backend: self.label.clone(),
                    details: error.to_string(),
                })?;

            for result in results {
                if let Some(slot) = scores.get_mut(start + result.index) {
                    *slot = result.score;
                }
            }
            start = end;
        }

        Ok(scores)
    }
}

fn read_onnx(folder: &Path, quantize_int8: bool) -> Result<Vec<u8>, ConfigError> {
    if quantize_int8 {
        if let Some(path) = first_existing(folder, &QUANTIZED) {
            return Ok(fs::read(path)?);
        }
        warn!(
            model = %folder.display(),
            "no int8 weights found, falling back to full precision"
        );
    }

    let path = first_existing(folder, &FULL_PRECISION).ok_or_else(|| {
        ConfigError::ModelLoad(format!("no ONNX model found in {}", folder.display()))
    })?;
    Ok(fs::read(path)?)
}

fn first_existing(folder: &Path, candidates: &[&str]) -> Option<PathBuf> {
    candidates
        .iter()
        .map(|name| folder.join(name))
        .find(|path| path.is_file())
}

fn read_tokenizer_files(folder: &Path) -> Result<TokenizerFiles, ConfigError> {
    let read = |name: &str| {
        fs::read(folder.join(name)).map_err(|error| {
            ConfigError::ModelLoad(format!("{}: {error}", folder.join(name).display()))
        })
    };

    Ok(TokenizerFiles {
        tokenizer_file: read("tokenizer.json")?,
        config_file: read("config.json")?,
        special_tokens_map_file: read("special_tokens_map.json")?,
        tokenizer_config_file: read("tokenizer_config.json")?,
    })
}
