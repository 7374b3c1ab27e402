pub mod hashing;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use hashing::{HashingEncoder, LexicalCrossScorer, DEFAULT_EMBEDDING_DIMENSIONS};
#[cfg(feature = "onnx")]
pub use onnx::{OnnxCrossScorer, OnnxEncoder};
