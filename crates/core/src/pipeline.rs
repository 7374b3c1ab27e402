use crate::chunking::{assign_document, clean_text_for_output};
use crate::error::{ConfigError, DocumentError};
use crate::gate::CorpusGate;
use crate::models::{
    Chunk, DocScore, ExtractedSection, InputRequest, PatternList, PerDocumentResult,
    PipelineOptions, ProcessedDocument, RankRequest, ResultMetadata, RunPartition,
    SkippedDocument, SubsectionAnalysis, Summary, SummaryMetadata,
};
use crate::preview::PreviewSampler;
use crate::ranker::{HybridRanker, FALLBACK_ANCHOR};
use crate::store::{ArtifactStore, SUMMARY_FILE};
use crate::structure::StructureExtractor;
use crate::traits::WordSource;
use chrono::Utc;
use regex::{Regex, RegexBuilder};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const INPUT_FILE: &str = "input.json";
pub const PDF_DIR: &str = "PDFs";

/// `input.json` plus the directory holding the PDFs.
#[derive(Debug, Clone)]
pub struct RunInput {
    pub request: InputRequest,
    pub pdf_dir: PathBuf,
}

/// Validates the input directory layout and parses `input.json`.
pub fn load_input(input_dir: &Path) -> Result<RunInput, ConfigError> {
    let input_path = input_dir.join(INPUT_FILE);
    let pdf_dir = input_dir.join(PDF_DIR);

    if !input_path.is_file() {
        return Err(ConfigError::MissingInput(input_dir.to_path_buf()));
    }
    if !pdf_dir.is_dir() {
        return Err(ConfigError::MissingPdfDir(input_dir.to_path_buf()));
    }

    let request: InputRequest = serde_json::from_str(&fs::read_to_string(&input_path)?)?;
    Ok(RunInput { request, pdf_dir })
}

/// PDF file names directly inside `folder`, sorted.
pub fn discover_pdf_files(folder: &Path) -> Vec<String> {
    let mut files: Vec<String> = WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
        })
        .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
        .collect();

    files.sort_unstable();
    files
}

/// Allow/deny filename patterns, matched case-insensitively anywhere in the name.
#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    allow: Vec<Regex>,
    deny: Vec<Regex>,
}

impl DocumentFilter {
    pub fn new(allow: &[String], deny: &[String]) -> Result<Self, ConfigError> {
        let compile = |patterns: &[String]| {
            patterns
                .iter()
                .map(|pattern| RegexBuilder::new(pattern).case_insensitive(true).build())
                .collect::<Result<Vec<_>, _>>()
        };

        Ok(Self {
            allow: compile(allow)?,
            deny: compile(deny)?,
        })
    }

    /// Deny wins over allow; an empty allow list admits everything.
    pub fn admits(&self, file_name: &str) -> bool {
        let allowed = self.allow.is_empty() || self.allow.iter().any(|re| re.is_match(file_name));
        let denied = self.deny.iter().any(|re| re.is_match(file_name));
        allowed && !denied
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub summary: Summary,
    pub summary_path: PathBuf,
}

/// Drives extraction, gating, ranking and persistence over one input directory.
pub struct Pipeline<S: WordSource> {
    source: S,
    extractor: StructureExtractor,
    ranker: HybridRanker,
    options: PipelineOptions,
}

impl<S: WordSource> Pipeline<S> {
    pub fn new(
        source: S,
        ranker: HybridRanker,
        options: PipelineOptions,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            source,
            extractor: StructureExtractor::new()?,
            ranker,
            options,
        })
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn run(&self, input_dir: &Path, output_dir: &Path) -> Result<RunSummary, ConfigError> {
        let started_at = Utc::now();
        let input = load_input(input_dir)?;
        let store = ArtifactStore::new(output_dir);
        store.prepare()?;

        let request = &input.request;
        let persona = request.persona();
        let task = request.task();
        let query = request.query();

        let filter = self.document_filter(request)?;
        let discovered = discover_pdf_files(&input.pdf_dir);
        let eligible: Vec<String> = discovered
            .iter()
            .filter(|name| filter.admits(name))
            .cloned()
            .collect();
        info!(
            discovered = discovered.len(),
            eligible = eligible.len(),
            pdf_dir = %input.pdf_dir.display(),
            "documents discovered"
        );

        let ordered = self.order_by_page_count(&input.pdf_dir, eligible);
        let anchor = HybridRanker::build_anchor(Some(persona.as_str()), Some(task.as_str()), Some(query.as_str()));
        let anchor = if anchor.is_empty() {
            FALLBACK_ANCHOR.to_string()
        } else {
            anchor
        };

        let sampler = PreviewSampler::new(
            self.extractor.junk_filter().clone(),
            self.options.preview_pages,
            self.options.preview_chars,
        );
        let previews: Vec<(String, String)> = ordered
            .iter()
            .map(|name| (name.clone(), sampler.sample(&self.source, &input.pdf_dir.join(name))))
            .collect();

        let gate = CorpusGate::new(self.ranker.index(), self.options.batch_size);
        let (doc_scores, selected) =
            match gate.select(&previews, &anchor, self.options.max_docs, self.options.doc_threshold) {
                Ok(outcome) => (outcome.scores, outcome.selected),
                Err(error) => {
                    warn!(error = %error, "document gating failed, keeping page-count order");
                    let cap = self.options.max_docs.unwrap_or(ordered.len());
                    (Vec::<DocScore>::new(), ordered.iter().take(cap).cloned().collect())
                }
            };

        // Cheapest documents first.
        let selected: Vec<String> = ordered
            .iter()
            .filter(|name| selected.contains(name))
            .cloned()
            .collect();
        info!(selected = ?selected, "documents selected for ranking");

        let rank_request = RankRequest {
            persona: Some(persona),
            task: Some(task),
            query: Some(query.clone()),
            top_k: self.options.top_k,
            max_per_doc: self.options.per_doc_k,
            min_cross_score: self.options.min_cross_score,
            min_final_score: self.options.min_final_score,
            batch_size: self.options.batch_size,
        };

        let mut partition = RunPartition::default();
        for name in &selected {
            let path = input.pdf_dir.join(name);
            match self.process_document(&path, name, &rank_request, &query, &store) {
                Ok(Some(output)) => {
                    info!(file = %name, output = %output, "document processed");
                    partition.processed.push(ProcessedDocument {
                        file: name.clone(),
                        output,
                    });
                }
                Ok(None) => {
                    warn!(file = %name, "document produced no qualifying sections");
                    partition.skipped.push(SkippedDocument {
                        file: name.clone(),
                        error: None,
                    });
                }
                Err(error) => {
                    warn!(file = %name, error = %error, "document skipped");
                    partition.skipped.push(SkippedDocument {
                        file: name.clone(),
                        error: Some(error.to_string()),
                    });
                }
            }
        }

        let summary = Summary {
            metadata: SummaryMetadata {
                input_documents: selected,
                query,
            },
            doc_scores,
            summary: partition,
        };
        let summary_path = store.write_json(SUMMARY_FILE, &summary)?;

        info!(
            processed = summary.summary.processed.len(),
            skipped = summary.summary.skipped.len(),
            elapsed_ms = (Utc::now() - started_at).num_milliseconds(),
            "run complete"
        );
        Ok(RunSummary {
            summary,
            summary_path,
        })
    }

    /// Ranks one document and writes its artifact. `Ok(None)` means the
    /// document yielded no chunk that survived ranking and length filtering.
    pub fn process_document(
        &self,
        path: &Path,
        file_name: &str,
        request: &RankRequest,
        query: &str,
        store: &ArtifactStore,
    ) -> Result<Option<String>, DocumentError> {
        let Some(result) = self.rank_document(path, file_name, request, query)? else {
            return Ok(None);
        };

        let output = ArtifactStore::document_artifact_name(file_name);
        store.write_json(&output, &result)?;
        Ok(Some(output))
    }

    /// Extraction, ranking and text refinement for one document, without persistence.
    pub fn rank_document(
        &self,
        path: &Path,
        file_name: &str,
        request: &RankRequest,
        query: &str,
    ) -> Result<Option<PerDocumentResult>, DocumentError> {
        let pages = self.source.extract_words(path, None)?;
        let structure = self
            .extractor
            .extract_with_limit(&pages, self.options.max_pages_per_doc);
        let mut chunks = structure.chunks;
        if chunks.is_empty() {
            debug!(file = %file_name, "no heading candidates");
            return Ok(None);
        }
        assign_document(&mut chunks, file_name);

        let ranked = self.ranker.rank(request, &chunks)?;
        let refined: Vec<(&Chunk, String)> = ranked
            .iter()
            .filter_map(|scored| self.refine(scored.chunk))
            .collect();
        if refined.is_empty() {
            return Ok(None);
        }

        Ok(Some(PerDocumentResult {
            metadata: ResultMetadata {
                source_file: file_name.to_string(),
                query: query.to_string(),
            },
            extracted_sections: refined
                .iter()
                .enumerate()
                .map(|(rank, (chunk, _))| ExtractedSection {
                    document: chunk.document.clone(),
                    section_title: chunk.title.clone(),
                    importance_rank: rank + 1,
                    page_number: chunk.page,
                })
                .collect(),
            subsection_analysis: refined
                .iter()
                .map(|(chunk, text)| SubsectionAnalysis {
                    document: chunk.document.clone(),
                    refined_text: text.clone(),
                    page_number: chunk.page,
                })
                .collect(),
        }))
    }

    /// Cleaned body text, or the cleaned title when the body is too short.
    fn refine<'c>(&self, chunk: &'c Chunk) -> Option<(&'c Chunk, String)> {
        let min_words = self.options.min_words;
        let body = clean_text_for_output(&chunk.text, self.options.refined_text_chars);
        if body.split_whitespace().count() >= min_words {
            return Some((chunk, body));
        }

        let title = clean_text_for_output(&chunk.title, self.options.refined_text_chars);
        (title.split_whitespace().count() >= min_words).then_some((chunk, title))
    }

    fn document_filter(&self, request: &InputRequest) -> Result<DocumentFilter, ConfigError> {
        let filters = request.filters.clone().unwrap_or_default();
        let allow = self
            .options
            .allow_docs
            .clone()
            .or_else(|| filters.allow_docs.map(PatternList::into_vec))
            .unwrap_or_default();
        let deny = self
            .options
            .deny_docs
            .clone()
            .or_else(|| filters.deny_docs.map(PatternList::into_vec))
            .unwrap_or_default();

        DocumentFilter::new(&allow, &deny)
    }

    /// Stable ascending page-count order; unreadable documents go last.
    fn order_by_page_count(&self, pdf_dir: &Path, files: Vec<String>) -> Vec<String> {
        let mut counted: Vec<(usize, String)> = files
            .into_iter()
            .map(|name| {
                let pages = self
                    .source
                    .page_count(&pdf_dir.join(&name))
                    .unwrap_or(usize::MAX);
                (pages, name)
            })
            .collect();
        counted.sort_by_key(|(pages, _)| *pages);
        counted.into_iter().map(|(_, name)| name).collect()
    }
}
