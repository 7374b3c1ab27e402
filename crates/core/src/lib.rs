pub mod backends;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod layout;
pub mod lexical;
pub mod models;
pub mod pipeline;
pub mod preview;
pub mod ranker;
pub mod store;
pub mod structure;
pub mod traits;

pub use backends::{HashingEncoder, LexicalCrossScorer, DEFAULT_EMBEDDING_DIMENSIONS};
#[cfg(feature = "onnx")]
pub use backends::{OnnxCrossScorer, OnnxEncoder};
pub use chunking::{build_chunks, clean_text_for_output, normalize_whitespace, sanitize_filename};
pub use embeddings::EmbeddingIndex;
pub use error::{ConfigError, DocumentError, ModelError};
pub use extractor::LopdfWordSource;
pub use gate::{CorpusGate, GateOutcome};
pub use layout::{group_lines, JunkFilter};
pub use models::{
    Chunk, DocScore, FusionWeights, InputRequest, OutlineEntry, PerDocumentResult,
    PipelineOptions, RankRequest, RankerConfig, ScoredChunk, Summary,
};
pub use pipeline::{discover_pdf_files, load_input, DocumentFilter, Pipeline, RunSummary};
pub use preview::PreviewSampler;
pub use ranker::HybridRanker;
pub use store::ArtifactStore;
pub use structure::{DocumentStructure, StructureExtractor};
pub use traits::{CrossScorer, SentenceEncoder, WordSource};
