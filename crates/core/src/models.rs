use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A positioned word as produced by a [`crate::WordSource`].
///
/// `top` and `bottom` grow downward from the top edge of the page.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub left: f32,
    pub top: f32,
    pub bottom: f32,
    pub size: f32,
    pub font_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct PageWords {
    /// Zero-based page index.
    pub index: u32,
    pub words: Vec<Word>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub text: String,
    pub page: u32,
    pub top: f32,
    pub bottom: f32,
    pub font_size: f32,
    pub is_bold: bool,
    pub word_count: usize,
    pub gap_before: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocStats {
    pub most_common_font_size: f32,
}

impl Default for DocStats {
    fn default() -> Self {
        Self {
            most_common_font_size: 12.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadingCandidate {
    /// Index into the document's line sequence.
    pub line: usize,
    pub score: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HeadingLevel {
    H1,
    H2,
    H3,
    H4,
}

impl HeadingLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            HeadingLevel::H1 => "H1",
            HeadingLevel::H2 => "H2",
            HeadingLevel::H3 => "H3",
            HeadingLevel::H4 => "H4",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineEntry {
    #[serde(
        serialize_with = "serialize_level",
        deserialize_with = "deserialize_level"
    )]
    pub level: Option<HeadingLevel>,
    pub text: String,
    pub page: u32,
    #[serde(skip)]
    pub line: usize,
}

fn serialize_level<S: Serializer>(
    level: &Option<HeadingLevel>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(level.map(HeadingLevel::as_str).unwrap_or(""))
}

fn deserialize_level<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<HeadingLevel>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(match raw.as_str() {
        "H1" => Some(HeadingLevel::H1),
        "H2" => Some(HeadingLevel::H2),
        "H3" => Some(HeadingLevel::H3),
        "H4" => Some(HeadingLevel::H4),
        _ => None,
    })
}

/// A heading plus the body text that follows it, within one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: String,
    pub document: String,
    pub title: String,
    pub text: String,
    pub page: u32,
}

impl Chunk {
    /// Body text, or the heading when the body is empty.
    pub fn display_text(&self) -> &str {
        let body = self.text.trim();
        if body.is_empty() {
            self.title.as_str()
        } else {
            body
        }
    }
}

/// Ranking signals computed for one chunk. The chunk itself is never mutated.
#[derive(Debug, Clone, Copy)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    pub lex_cov_pre: f32,
    pub similarity: f32,
    pub cross_prob: f32,
    pub sim_norm: f32,
    pub lex_cov: f32,
    pub final_score: f32,
}

impl<'a> ScoredChunk<'a> {
    pub fn new(chunk: &'a Chunk, lex_cov_pre: f32) -> Self {
        Self {
            chunk,
            lex_cov_pre,
            similarity: 0.0,
            cross_prob: 0.0,
            sim_norm: 0.0,
            lex_cov: 0.0,
            final_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocScore {
    pub file: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub source_file: String,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedSection {
    pub document: String,
    pub section_title: String,
    pub importance_rank: usize,
    pub page_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubsectionAnalysis {
    pub document: String,
    pub refined_text: String,
    pub page_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerDocumentResult {
    pub metadata: ResultMetadata,
    pub extracted_sections: Vec<ExtractedSection>,
    pub subsection_analysis: Vec<SubsectionAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetadata {
    pub input_documents: Vec<String>,
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedDocument {
    pub file: String,
    pub output: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RunPartition {
    pub processed: Vec<ProcessedDocument>,
    pub skipped: Vec<SkippedDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub metadata: SummaryMetadata,
    pub doc_scores: Vec<DocScore>,
    pub summary: RunPartition,
}

/// Weights of the hybrid score: `alpha * cross_prob + beta * sim_norm + gamma * lex_cov`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionWeights {
    pub alpha: f32,
    pub beta: f32,
    pub gamma: f32,
}

impl FusionWeights {
    pub const SHORT_ANCHOR: FusionWeights = FusionWeights {
        alpha: 1.2,
        beta: 0.45,
        gamma: 0.15,
    };

    pub fn fuse(&self, cross_prob: f32, sim_norm: f32, lex_cov: f32) -> f32 {
        self.alpha * cross_prob + self.beta * sim_norm + self.gamma * lex_cov
    }
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 0.35,
            gamma: 0.25,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RankerConfig {
    /// Weights used when the anchor has at least `long_anchor_tokens` meaningful tokens.
    pub weights: FusionWeights,
    pub short_anchor_weights: FusionWeights,
    pub cross_top_m: usize,
    pub shortlist_multiplier: usize,
    pub long_anchor_tokens: usize,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            weights: FusionWeights::default(),
            short_anchor_weights: FusionWeights::SHORT_ANCHOR,
            cross_top_m: 48,
            shortlist_multiplier: 4,
            long_anchor_tokens: 8,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RankRequest {
    pub persona: Option<String>,
    pub task: Option<String>,
    pub query: Option<String>,
    pub top_k: usize,
    pub max_per_doc: usize,
    pub min_cross_score: Option<f32>,
    pub min_final_score: Option<f32>,
    pub batch_size: usize,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub top_k: usize,
    pub per_doc_k: usize,
    pub min_cross_score: Option<f32>,
    pub min_final_score: Option<f32>,
    pub min_words: usize,
    pub max_docs: Option<usize>,
    pub doc_threshold: Option<f32>,
    /// Overrides `filters.allow_docs` from input.json when set.
    pub allow_docs: Option<Vec<String>>,
    pub deny_docs: Option<Vec<String>>,
    pub preview_pages: usize,
    pub preview_chars: usize,
    pub max_pages_per_doc: Option<usize>,
    pub batch_size: usize,
    pub refined_text_chars: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            per_doc_k: 2,
            min_cross_score: None,
            min_final_score: None,
            min_words: 8,
            max_docs: Some(3),
            doc_threshold: None,
            allow_docs: None,
            deny_docs: None,
            preview_pages: 2,
            preview_chars: 2_000,
            max_pages_per_doc: None,
            batch_size: 128,
            refined_text_chars: 1_500,
        }
    }
}

/// The `input.json` request document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InputRequest {
    #[serde(default)]
    pub persona: Option<Persona>,
    #[serde(default)]
    pub job_to_be_done: Option<JobToBeDone>,
    #[serde(default)]
    pub query: Option<QuerySelection>,
    #[serde(default)]
    pub filters: Option<DocumentFilters>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Persona {
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobToBeDone {
    #[serde(default)]
    pub task: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuerySelection {
    #[serde(default)]
    pub selected_text: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFilters {
    #[serde(default)]
    pub allow_docs: Option<PatternList>,
    #[serde(default)]
    pub deny_docs: Option<PatternList>,
}

/// Filter patterns may be written as one string or a list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PatternList {
    One(String),
    Many(Vec<String>),
}

impl PatternList {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            PatternList::One(pattern) => vec![pattern],
            PatternList::Many(patterns) => patterns,
        }
    }
}

impl InputRequest {
    pub fn persona(&self) -> String {
        self.persona
            .as_ref()
            .and_then(|persona| persona.role.clone())
            .unwrap_or_else(|| "user".to_string())
    }

    pub fn task(&self) -> String {
        self.job_to_be_done
            .as_ref()
            .and_then(|job| job.task.clone())
            .unwrap_or_else(|| "summarize".to_string())
    }

    /// The selected text with internal whitespace collapsed, or "" when absent.
    pub fn query(&self) -> String {
        self.query
            .as_ref()
            .and_then(|query| query.selected_text.as_deref())
            .map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
            .unwrap_or_default()
    }
}
