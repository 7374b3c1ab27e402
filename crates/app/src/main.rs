use chrono::Utc;
use clap::{Parser, ValueEnum};
use section_ranker_core::{
    load_input, ConfigError, EmbeddingIndex, FusionWeights, HashingEncoder, HybridRanker,
    LexicalCrossScorer, LopdfWordSource, Pipeline, PipelineOptions, RankerConfig,
};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Local ONNX bi-encoder and cross-encoder.
    Onnx,
    /// Model-free hashing encoder and lexical cross scorer.
    Hashing,
}

#[derive(Parser)]
#[command(name = "section-ranker", version, about = "Rank the most relevant sections of a PDF collection")]
struct Cli {
    /// Directory holding `input.json` and a `PDFs/` folder.
    input_dir: PathBuf,

    /// Directory the JSON artifacts are written to. Cleared at start.
    output_dir: PathBuf,

    /// Directory holding the encoder model folders.
    model_dir: PathBuf,

    /// Sections kept per run.
    #[arg(long, alias = "top_k", default_value_t = 5)]
    top_k: usize,

    /// Sections kept per document.
    #[arg(long, alias = "per_doc_k", default_value_t = 2)]
    per_doc_k: usize,

    #[arg(long, alias = "min_cross_score")]
    min_cross_score: Option<f32>,

    #[arg(long, alias = "min_final_score")]
    min_final_score: Option<f32>,

    /// Minimum words in a refined section text.
    #[arg(long, alias = "min_words", default_value_t = 8)]
    min_words: usize,

    #[arg(long, default_value_t = 1.0)]
    alpha: f32,

    #[arg(long, default_value_t = 0.35)]
    beta: f32,

    #[arg(long, default_value_t = 0.25)]
    gamma: f32,

    /// Shortlist size handed to the cross-encoder.
    #[arg(long, alias = "cross_top_m", default_value_t = 48)]
    cross_top_m: usize,

    /// Documents kept by the corpus gate. 0 keeps all.
    #[arg(long, alias = "max_docs", default_value_t = 3)]
    max_docs: usize,

    #[arg(long, alias = "doc_threshold")]
    doc_threshold: Option<f32>,

    /// Filename regexes to admit. Overrides `filters.allow_docs` in input.json.
    #[arg(long, alias = "allow_docs", num_args = 1..)]
    allow_docs: Option<Vec<String>>,

    /// Filename regexes to reject. Overrides `filters.deny_docs` in input.json.
    #[arg(long, alias = "deny_docs", num_args = 1..)]
    deny_docs: Option<Vec<String>>,

    #[arg(long, alias = "preview_pages", default_value_t = 2)]
    preview_pages: usize,

    #[arg(long, alias = "max_pages_per_doc")]
    max_pages_per_doc: Option<usize>,

    #[arg(long, alias = "batch_size", env = "SECTION_RANKER_BATCH_SIZE", default_value_t = 128)]
    batch_size: usize,

    /// Prefer int8-quantized ONNX weights when present.
    #[arg(long, alias = "quantize_int8", default_value_t = false)]
    quantize_int8: bool,

    #[arg(long, value_enum, default_value_t = Backend::Onnx)]
    backend: Backend,
}

impl Cli {
    fn pipeline_options(&self) -> Result<PipelineOptions, ConfigError> {
        if self.batch_size == 0 {
            return Err(ConfigError::InvalidArgument(
                "--batch-size must be at least 1".to_string(),
            ));
        }
        if self.preview_pages == 0 {
            return Err(ConfigError::InvalidArgument(
                "--preview-pages must be at least 1".to_string(),
            ));
        }

        Ok(PipelineOptions {
            top_k: self.top_k,
            per_doc_k: self.per_doc_k,
            min_cross_score: self.min_cross_score,
            min_final_score: self.min_final_score,
            min_words: self.min_words,
            max_docs: (self.max_docs > 0).then_some(self.max_docs),
            doc_threshold: self.doc_threshold,
            allow_docs: self.allow_docs.clone(),
            deny_docs: self.deny_docs.clone(),
            preview_pages: self.preview_pages,
            max_pages_per_doc: self.max_pages_per_doc,
            batch_size: self.batch_size,
            ..PipelineOptions::default()
        })
    }

    fn ranker_config(&self) -> RankerConfig {
        RankerConfig {
            weights: FusionWeights {
                alpha: self.alpha,
                beta: self.beta,
                gamma: self.gamma,
            },
            cross_top_m: self.cross_top_m,
            ..RankerConfig::default()
        }
    }
}

fn load_index(backend: Backend, model_dir: &Path, quantize_int8: bool) -> Result<EmbeddingIndex, ConfigError> {
    match backend {
        Backend::Hashing => Ok(EmbeddingIndex::new(
            Box::new(HashingEncoder::default()),
            Box::new(LexicalCrossScorer::default()),
        )),
        Backend::Onnx => load_onnx_index(model_dir, quantize_int8),
    }
}

#[cfg(feature = "onnx")]
fn load_onnx_index(model_dir: &Path, quantize_int8: bool) -> Result<EmbeddingIndex, ConfigError> {
    use section_ranker_core::{OnnxCrossScorer, OnnxEncoder};

    if !model_dir.is_dir() {
        return Err(ConfigError::ModelLoad(format!(
            "model directory '{}' not found",
            model_dir.display()
        )));
    }
    let encoder = OnnxEncoder::load(model_dir, quantize_int8)?;
    let cross = OnnxCrossScorer::load(model_dir, quantize_int8)?;
    Ok(EmbeddingIndex::new(Box::new(encoder), Box::new(cross)))
}

#[cfg(not(feature = "onnx"))]
fn load_onnx_index(_model_dir: &Path, _quantize_int8: bool) -> Result<EmbeddingIndex, ConfigError> {
    Err(ConfigError::ModelLoad(
        "built without the `onnx` feature; rebuild with it or pass --backend hashing".to_string(),
    ))
}

fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        backend = ?cli.backend,
        "section-ranker boot"
    );

    let options = cli.pipeline_options()?;
    // Fail on a bad input layout before paying for model load.
    load_input(&cli.input_dir)?;

    let index = load_index(cli.backend, &cli.model_dir, cli.quantize_int8)?;
    info!(
        encoder = index.encoder_name(),
        cross = index.cross_name(),
        "models ready"
    );

    let ranker = HybridRanker::new(index, cli.ranker_config());
    let pipeline = Pipeline::new(LopdfWordSource, ranker, options)?;
    let run = pipeline.run(&cli.input_dir, &cli.output_dir)?;

    println!("Done. Summary written to: {}", run.summary_path.display());
    println!("SAVED_DIR::{}", cli.output_dir.display());
    Ok(())
}
