//! Three-stage relevance funnel: lexical preselection, bi-encoder shortlist,
//! cross-encoder rescoring. The expensive pairwise stage only ever sees the
//! bounded shortlist.

use crate::embeddings::{dot, sigmoid, EmbeddingIndex};
use crate::error::ModelError;
use crate::lexical::{coverage, token_set, tokens};
use crate::models::{Chunk, FusionWeights, RankRequest, RankerConfig, ScoredChunk};
use std::collections::{HashMap, HashSet};
use tracing::debug;

pub const FALLBACK_ANCHOR: &str = "related sections";
const LONG_ANCHOR_MIN_COVERAGE: f32 = 0.03;
const SHORT_ANCHOR_MIN_COVERAGE: f32 = 0.01;
const SHORT_ANCHOR_CROSS_TOP_M: usize = 64;

pub struct HybridRanker {
    index: EmbeddingIndex,
    config: RankerConfig,
}

impl HybridRanker {
    pub fn new(index: EmbeddingIndex, config: RankerConfig) -> Self {
        Self { index, config }
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// The literal query if present, else `persona | task`, else "".
    pub fn build_anchor(persona: Option<&str>, task: Option<&str>, query: Option<&str>) -> String {
        if let Some(query) = query.map(str::trim).filter(|query| !query.is_empty()) {
            return query.to_string();
        }

        [persona, task]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" | ")
    }

    pub fn rank<'a>(
        &self,
        request: &RankRequest,
        chunks: &'a [Chunk],
    ) -> Result<Vec<ScoredChunk<'a>>, ModelError> {
        if chunks.is_empty() || request.top_k == 0 {
            return Ok(Vec::new());
        }

        let anchor = Self::build_anchor(
            request.persona.as_deref(),
            request.task.as_deref(),
            request.query.as_deref(),
        );
        let anchor = if anchor.is_empty() {
            FALLBACK_ANCHOR.to_string()
        } else {
            anchor
        };

        // Repeated terms count toward anchor length.
        let long_anchor = tokens(&anchor).len() >= self.config.long_anchor_tokens;
        let anchor_tokens = token_set(&anchor);
        let min_coverage = if long_anchor {
            LONG_ANCHOR_MIN_COVERAGE
        } else {
            SHORT_ANCHOR_MIN_COVERAGE
        };
        let cross_top_m = if long_anchor {
            self.config.cross_top_m
        } else {
            self.config.cross_top_m.max(SHORT_ANCHOR_CROSS_TOP_M)
        };
        let weights = if long_anchor {
            self.config.weights
        } else {
            self.config.short_anchor_weights
        };

        let pool_cap = 200usize.max(request.top_k.saturating_mul(50));
        let mut pool = preselect(&anchor_tokens, chunks, pool_cap, min_coverage);

        let texts: Vec<&str> = pool.iter().map(|scored| scored.chunk.display_text()).collect();
        let batch_size = request.batch_size.max(1);
        let anchor_row = self
            .index
            .encode(&[anchor.as_str()], batch_size)?
            .into_iter()
            .next()
            .unwrap_or_default();
        let rows = self.index.encode(&texts, batch_size)?;
        for (scored, row) in pool.iter_mut().zip(&rows) {
            scored.similarity = dot(row, &anchor_row);
        }

        pool.sort_by(|left, right| right.similarity.total_cmp(&left.similarity));
        let shortlist_size =
            cross_top_m.max(request.top_k.saturating_mul(self.config.shortlist_multiplier));
        let mut shortlist = shortlist(pool, shortlist_size, request.max_per_doc);
        if shortlist.is_empty() {
            return Ok(Vec::new());
        }

        let pairs: Vec<(&str, &str)> = shortlist
            .iter()
            .map(|scored| (anchor.as_str(), scored.chunk.display_text()))
            .collect();
        let raw = self
            .index
            .cross_score(&pairs, 16usize.max(batch_size / 2))?;

        for (scored, logit) in shortlist.iter_mut().zip(raw) {
            apply_fusion(scored, logit, &anchor_tokens, &weights);
        }

        let shortlisted = shortlist.len();
        shortlist.retain(|scored| {
            request
                .min_cross_score
                .map_or(true, |min| scored.cross_prob >= min)
                && request
                    .min_final_score
                    .map_or(true, |min| scored.final_score >= min)
        });
        shortlist.sort_by(|left, right| right.final_score.total_cmp(&left.final_score));

        let ranked = cap_per_document(shortlist, request.top_k, request.max_per_doc);
        debug!(
            anchor = %anchor,
            anchor_tokens = anchor_tokens.len(),
            candidates = chunks.len(),
            shortlisted,
            returned = ranked.len(),
            "ranked chunks"
        );
        Ok(ranked)
    }
}

/// Keeps chunks whose text covers at least `min_coverage` of the anchor. Falls
/// back to titles at half the threshold, then to the unfiltered head of the list.
pub fn preselect<'a>(
    anchor_tokens: &HashSet<String>,
    chunks: &'a [Chunk],
    max_keep: usize,
    min_coverage: f32,
) -> Vec<ScoredChunk<'a>> {
    let mut kept: Vec<ScoredChunk<'a>> = chunks
        .iter()
        .filter_map(|chunk| {
            let score = coverage(anchor_tokens, chunk.display_text());
            (score >= min_coverage).then(|| ScoredChunk::new(chunk, score))
        })
        .collect();

    if kept.is_empty() {
        kept = chunks
            .iter()
            .filter_map(|chunk| {
                let score = coverage(anchor_tokens, &chunk.title);
                (score >= min_coverage * 0.5).then(|| ScoredChunk::new(chunk, score))
            })
            .collect();
    }

    if kept.is_empty() {
        return chunks
            .iter()
            .take(max_keep)
            .map(|chunk| ScoredChunk::new(chunk, 0.0))
            .collect();
    }

    kept.sort_by(|left, right| right.lex_cov_pre.total_cmp(&left.lex_cov_pre));
    kept.truncate(max_keep);
    kept
}

/// Walks similarity-sorted candidates under a per-document cap. A pool drawn
/// from a single document is capped only by the shortlist size.
fn shortlist<'a>(
    ranked_by_similarity: Vec<ScoredChunk<'a>>,
    max_shortlist: usize,
    max_per_doc: usize,
) -> Vec<ScoredChunk<'a>> {
    let documents: HashSet<&str> = ranked_by_similarity
        .iter()
        .map(|scored| scored.chunk.document.as_str())
        .collect();
    let per_doc_cap = if documents.len() == 1 {
        max_shortlist
    } else {
        3usize.max(max_per_doc.saturating_mul(3))
    };

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut shortlist = Vec::new();
    for scored in ranked_by_similarity {
        if shortlist.len() >= max_shortlist {
            break;
        }
        let count = counts.entry(scored.chunk.document.as_str()).or_insert(0);
        if *count < per_doc_cap {
            *count += 1;
            shortlist.push(scored);
        }
    }
    shortlist
}

/// Cross probability and coverage are taken over `display_text`, so a chunk
/// with an empty body is scored on its title.
fn apply_fusion(
    scored: &mut ScoredChunk<'_>,
    logit: f32,
    anchor_tokens: &HashSet<String>,
    weights: &FusionWeights,
) {
    scored.cross_prob = sigmoid(logit);
    scored.sim_norm = (scored.similarity + 1.0) * 0.5;
    scored.lex_cov = coverage(anchor_tokens, scored.chunk.display_text());
    scored.final_score = weights.fuse(scored.cross_prob, scored.sim_norm, scored.lex_cov);
}

fn cap_per_document<'a>(
    sorted: Vec<ScoredChunk<'a>>,
    top_k: usize,
    max_per_doc: usize,
) -> Vec<ScoredChunk<'a>> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut selected = Vec::new();
    for scored in sorted {
        if selected.len() >= top_k {
            break;
        }
        let count = counts.entry(scored.chunk.document.as_str()).or_insert(0);
        if *count < max_per_doc {
            *count += 1;
            selected.push(scored);
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{HashingEncoder, LexicalCrossScorer};

    fn chunk(document: &str, title: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: format!("{document}:{title}"),
            document: document.to_string(),
            title: title.to_string(),
            text: text.to_string(),
            page: 0,
        }
    }

    fn ranker() -> HybridRanker {
        let index = EmbeddingIndex::new(
            Box::new(HashingEncoder::default()),
            Box::new(LexicalCrossScorer::default()),
        );
        HybridRanker::new(index, RankerConfig::default())
    }

    fn request(query: &str, top_k: usize, max_per_doc: usize) -> RankRequest {
        RankRequest {
            query: Some(query.to_string()),
            top_k,
            max_per_doc,
            batch_size: 32,
            ..RankRequest::default()
        }
    }

    #[test]
    fn anchor_prefers_query_then_persona_task() {
        assert_eq!(
            HybridRanker::build_anchor(Some("analyst"), Some("compare"), Some("  revenue ")),
            "revenue"
        );
        assert_eq!(
            HybridRanker::build_anchor(Some("analyst"), Some("compare"), Some("   ")),
            "analyst | compare"
        );
        assert_eq!(
            HybridRanker::build_anchor(None, Some("compare"), None),
            "compare"
        );
        assert_eq!(HybridRanker::build_anchor(None, None, None), "");
    }

    #[test]
    fn revenue_scenario_ranks_highlights_first() -> Result<(), ModelError> {
        let chunks = vec![
            chunk(
                "A",
                "Financial Highlights",
                "Revenue grew 12% driven by new markets and pricing.",
            ),
            chunk(
                "A",
                "Legal Notices",
                "This report contains forward-looking statements...",
            ),
        ];

        let ranked = ranker().rank(&request("revenue growth drivers", 5, 2), &chunks)?;

        assert!(!ranked.is_empty());
        assert_eq!(ranked[0].chunk.title, "Financial Highlights");
        assert!(ranked[0].lex_cov > 0.0);
        if let Some(legal) = ranked.iter().find(|scored| scored.chunk.title == "Legal Notices") {
            assert!(legal.final_score < ranked[0].final_score);
        }
        Ok(())
    }

    #[test]
    fn preselection_falls_back_to_titles_then_everything() {
        let chunks = vec![
            chunk("A", "Revenue", "nothing relevant here"),
            chunk("A", "Other", "still nothing"),
        ];
        let anchor = token_set("revenue");

        let by_title = preselect(&anchor, &chunks[1..], 10, 0.01);
        assert_eq!(by_title.len(), 1);
        assert_eq!(by_title[0].lex_cov_pre, 0.0);

        let titled = vec![chunk("A", "Revenue", ""), chunk("A", "Other", "text")];
        let kept = preselect(&anchor, &titled, 10, 0.01);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].chunk.title, "Revenue");

        let none = preselect(&token_set("zebra"), &chunks, 1, 0.01);
        assert_eq!(none.len(), 1);
        assert_eq!(none[0].chunk.title, "Revenue");
    }

    #[test]
    fn output_respects_top_k_and_per_document_cap() -> Result<(), ModelError> {
        let mut chunks = Vec::new();
        for document in ["A", "B", "C"] {
            for section in 0..6 {
                chunks.push(chunk(
                    document,
                    &format!("Pump maintenance {section}"),
                    &format!("pump pressure maintenance schedule {document} {section}"),
                ));
            }
        }

        let ranked = ranker().rank(&request("pump pressure maintenance", 4, 1), &chunks)?;
        assert!(ranked.len() <= 4);
        assert_eq!(ranked.len(), 3);

        let mut per_doc: HashMap<&str, usize> = HashMap::new();
        for scored in &ranked {
            *per_doc.entry(scored.chunk.document.as_str()).or_insert(0) += 1;
        }
        assert!(per_doc.values().all(|count| *count <= 1));
        Ok(())
    }

    #[test]
    fn ranking_is_idempotent() -> Result<(), ModelError> {
        let chunks: Vec<Chunk> = (0..30)
            .map(|index| {
                chunk(
                    if index % 2 == 0 { "A" } else { "B" },
                    &format!("Section {index}"),
                    &format!("valve flow {index} pressure readings and calibration notes"),
                )
            })
            .collect();
        let ranker = ranker();
        let request = request("valve calibration", 5, 2);

        let first: Vec<String> = ranker
            .rank(&request, &chunks)?
            .iter()
            .map(|scored| scored.chunk.chunk_id.clone())
            .collect();
        let second: Vec<String> = ranker
            .rank(&request, &chunks)?
            .iter()
            .map(|scored| scored.chunk.chunk_id.clone())
            .collect();

        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
        Ok(())
    }

    #[test]
    fn final_score_stays_within_weight_sum() -> Result<(), ModelError> {
        let chunks = vec![
            chunk("A", "Revenue growth", "revenue growth drivers revenue growth drivers"),
            chunk("A", "Costs", "operating costs declined"),
        ];
        let ranked = ranker().rank(&request("revenue growth drivers", 5, 5), &chunks)?;
        let bound = FusionWeights::SHORT_ANCHOR;

        for scored in ranked {
            assert!(scored.final_score >= 0.0);
            assert!(scored.final_score <= bound.alpha + bound.beta + bound.gamma + 1e-5);
            assert!((0.0..=1.0).contains(&scored.cross_prob));
            assert!((0.0..=1.0).contains(&scored.lex_cov));
        }
        Ok(())
    }

    #[test]
    fn long_anchor_with_repeated_terms_uses_configured_weights() -> Result<(), ModelError> {
        let weights = FusionWeights {
            alpha: 0.5,
            beta: 0.2,
            gamma: 0.9,
        };
        let index = EmbeddingIndex::new(
            Box::new(HashingEncoder::default()),
            Box::new(LexicalCrossScorer::default()),
        );
        let ranker = HybridRanker::new(
            index,
            RankerConfig {
                weights,
                ..RankerConfig::default()
            },
        );
        let chunks = vec![
            chunk("A", "Revenue", "revenue growth drivers and margin outlook for the year"),
            chunk("A", "Costs", "operating costs declined across plants"),
        ];
        let query = "revenue growth revenue drivers revenue margin revenue outlook";
        assert_eq!(tokens(query).len(), 8);
        assert!(token_set(query).len() < 8);

        let ranked = ranker.rank(&request(query, 5, 5), &chunks)?;

        assert_eq!(ranked.len(), 1);
        let top = &ranked[0];
        assert_eq!(top.chunk.title, "Revenue");
        let expected = weights.fuse(top.cross_prob, top.sim_norm, top.lex_cov);
        assert!((top.final_score - expected).abs() < 1e-6);
        let short = FusionWeights::SHORT_ANCHOR.fuse(top.cross_prob, top.sim_norm, top.lex_cov);
        assert!((top.final_score - short).abs() > 1e-3);
        Ok(())
    }

    #[test]
    fn huge_top_k_does_not_overflow() -> Result<(), ModelError> {
        let chunks = vec![chunk("A", "Revenue", "revenue growth drivers")];
        let ranked = ranker().rank(&request("revenue", usize::MAX, 2), &chunks)?;
        assert_eq!(ranked.len(), 1);
        Ok(())
    }

    #[test]
    fn thresholds_filter_weak_chunks() -> Result<(), ModelError> {
        let chunks = vec![
            chunk("A", "Revenue", "revenue growth drivers explained"),
            chunk("A", "Costs", "costs and revenue"),
        ];
        let mut strict = request("revenue growth drivers", 5, 5);
        strict.min_cross_score = Some(0.9);

        let ranked = ranker().rank(&strict, &chunks)?;
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].chunk.title, "Revenue");
        Ok(())
    }

    #[test]
    fn single_document_pool_lifts_shortlist_cap() {
        let chunks: Vec<Chunk> = (0..20)
            .map(|index| chunk("A", &format!("s{index}"), "text"))
            .collect();
        let pool: Vec<ScoredChunk> = chunks.iter().map(|c| ScoredChunk::new(c, 0.0)).collect();
        assert_eq!(shortlist(pool, 12, 1).len(), 12);

        let mixed: Vec<Chunk> = (0..20)
            .map(|index| chunk(if index < 15 { "A" } else { "B" }, "s", "text"))
            .collect();
        let pool: Vec<ScoredChunk> = mixed.iter().map(|c| ScoredChunk::new(c, 0.0)).collect();
        let short = shortlist(pool, 12, 1);
        assert_eq!(short.len(), 6);
    }
}
