//! Heading recovery from font and spacing cues.
//!
//! Nothing here trusts embedded PDF bookmarks: headings are scored from the
//! line geometry, numbered headings are leveled by pattern, and everything else
//! is leveled by its font style relative to the other headings.

use crate::chunking::{build_chunks, clean_text_for_output};
use crate::layout::{doc_stats, group_lines, JunkFilter};
use crate::models::{Chunk, DocStats, HeadingCandidate, HeadingLevel, Line, OutlineEntry, PageWords};
use regex::Regex;

/// Candidates must score strictly above this to count as headings.
pub const HEADING_THRESHOLD: i32 = 25;
/// Title lines must start above this vertical position on the first page.
pub const TITLE_ZONE: f32 = 200.0;
/// Maximum distance between stacked title lines.
pub const TITLE_LINE_GAP: f32 = 25.0;

#[derive(Debug, Clone)]
pub struct DocumentStructure {
    pub title: String,
    pub outline: Vec<OutlineEntry>,
    /// Chunks carry an empty document identity until the caller assigns one.
    pub chunks: Vec<Chunk>,
    pub lines: Vec<Line>,
    pub stats: DocStats,
}

/// Ordered numbering-convention matchers; the first match decides the level.
#[derive(Debug, Clone)]
pub struct HeadingClassifier {
    matchers: Vec<(HeadingLevel, Regex)>,
}

impl HeadingClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns: [(HeadingLevel, &str); 9] = [
            (HeadingLevel::H4, r"^\d+\.\d+\.\d+\.\d+(\s|\.)"),
            (HeadingLevel::H4, r"^[a-z]\.[a-z]\.[a-z]\.[a-z](\s|\.)"),
            (HeadingLevel::H3, r"^\d+\.\d+\.\d+(\s|\.)"),
            (HeadingLevel::H3, r"^[a-z]\.[a-z]\.[a-z](\s|\.)"),
            (HeadingLevel::H2, r"^\d+\.\d+(\s|\.)"),
            (HeadingLevel::H2, r"^[A-Z]\.\d+(\s|\.)"),
            (HeadingLevel::H1, r"(?i)^(chapter|section|part)\s+[IVXLC\d]+"),
            (HeadingLevel::H1, r"^\d+\.\s"),
            (HeadingLevel::H1, r"^[A-Z]\.\s"),
        ];

        let matchers = patterns
            .into_iter()
            .map(|(level, pattern)| Regex::new(pattern).map(|regex| (level, regex)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { matchers })
    }

    pub fn classify(&self, text: &str) -> Option<HeadingLevel> {
        let trimmed = text.trim();
        self.matchers
            .iter()
            .find(|(_, regex)| regex.is_match(trimmed))
            .map(|(level, _)| *level)
    }
}

#[derive(Debug, Clone)]
pub struct StructureExtractor {
    junk: JunkFilter,
    classifier: HeadingClassifier,
}

impl StructureExtractor {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            junk: JunkFilter::new()?,
            classifier: HeadingClassifier::new()?,
        })
    }

    pub fn junk_filter(&self) -> &JunkFilter {
        &self.junk
    }

    pub fn extract(&self, pages: &[PageWords]) -> DocumentStructure {
        self.extract_with_limit(pages, None)
    }

    /// Like [`Self::extract`], but only lines on pages below `max_pages` are
    /// considered. Font statistics still cover the whole document.
    pub fn extract_with_limit(
        &self,
        pages: &[PageWords],
        max_pages: Option<usize>,
    ) -> DocumentStructure {
        let stats = doc_stats(pages);
        let mut lines = group_lines(pages);
        if let Some(limit) = max_pages {
            lines.retain(|line| (line.page as usize) < limit);
        }

        let candidates = self.score_headings(&lines, &stats);
        let (title, title_lines) = detect_title(&lines, &candidates);
        let title = if title.is_empty() {
            self.fallback_title(&lines)
        } else {
            title
        };

        let outline = self.build_outline(&lines, &candidates, &title_lines);
        let chunks = build_chunks("", &lines, &outline, &self.junk);

        DocumentStructure {
            title,
            outline,
            chunks,
            lines,
            stats,
        }
    }

    pub fn score_headings(&self, lines: &[Line], stats: &DocStats) -> Vec<HeadingCandidate> {
        let body = stats.most_common_font_size;

        lines
            .iter()
            .enumerate()
            .filter(|(_, line)| !self.junk.is_junk(&line.text))
            .filter_map(|(index, line)| {
                let score = heading_score(line, body);
                (score > HEADING_THRESHOLD).then_some(HeadingCandidate { line: index, score })
            })
            .collect()
    }

    fn fallback_title(&self, lines: &[Line]) -> String {
        lines
            .iter()
            .find(|line| !self.junk.is_junk(&line.text))
            .map(|line| clean_text_for_output(&line.text, 1_500))
            .unwrap_or_default()
    }

    fn build_outline(
        &self,
        lines: &[Line],
        candidates: &[HeadingCandidate],
        title_lines: &[usize],
    ) -> Vec<OutlineEntry> {
        let title_texts: Vec<&str> = title_lines
            .iter()
            .map(|index| lines[*index].text.as_str())
            .collect();

        let mut outline: Vec<OutlineEntry> = candidates
            .iter()
            .filter(|candidate| !title_texts.contains(&lines[candidate.line].text.as_str()))
            .map(|candidate| {
                let line = &lines[candidate.line];
                OutlineEntry {
                    level: self.classifier.classify(&line.text),
                    text: line.text.trim().to_string(),
                    page: line.page,
                    line: candidate.line,
                }
            })
            .collect();

        if outline.iter().any(|entry| entry.level.is_none()) {
            let styles = distinct_styles(lines, candidates);
            let h1_found = outline
                .iter()
                .any(|entry| entry.level == Some(HeadingLevel::H1));
            let levels = assign_style_levels(&styles, h1_found);

            for entry in outline.iter_mut().filter(|entry| entry.level.is_none()) {
                let style = Style::of(&lines[entry.line]);
                let level = levels
                    .iter()
                    .find(|(known, _)| *known == style)
                    .map_or(HeadingLevel::H3, |(_, level)| *level);
                entry.level = Some(level);
            }
        }

        outline.sort_by_key(|entry| (entry.page, entry.line));
        outline
    }
}

fn heading_score(line: &Line, body_size: f32) -> i32 {
    let mut score = 0;
    if line.font_size > body_size * 1.15 {
        score += 20;
    }
    if line.is_bold {
        score += 15;
    }
    if line.gap_before > line.font_size * 1.5 {
        score += 15;
    }
    if line.word_count <= 12 {
        score += 10;
    }
    if line.word_count > 20 {
        score -= 15;
    }
    score
}

/// Picks the best-scoring heading near the top of the first page and absorbs
/// the candidates stacked directly against it. Returns the joined title and
/// the absorbed line indices in top-to-bottom order.
fn detect_title(lines: &[Line], candidates: &[HeadingCandidate]) -> (String, Vec<usize>) {
    let mut zone: Vec<&HeadingCandidate> = candidates
        .iter()
        .filter(|candidate| {
            let line = &lines[candidate.line];
            line.page == 0 && line.top < TITLE_ZONE
        })
        .collect();
    zone.sort_by(|left, right| lines[left.line].top.total_cmp(&lines[right.line].top));

    let Some(seed) = zone
        .iter()
        .copied()
        .reduce(|best, next| if next.score > best.score { next } else { best })
    else {
        return (String::new(), Vec::new());
    };

    let mut absorbed = vec![seed.line];
    for candidate in &zone {
        if absorbed.contains(&candidate.line) {
            continue;
        }
        let last_bottom = absorbed
            .last()
            .map_or(0.0, |index| lines[*index].bottom);
        if (lines[candidate.line].top - last_bottom).abs() < TITLE_LINE_GAP {
            absorbed.push(candidate.line);
        }
    }

    absorbed.sort_by(|left, right| lines[*left].top.total_cmp(&lines[*right].top));
    let title = absorbed
        .iter()
        .map(|index| clean_text_for_output(&lines[*index].text, 1_500))
        .collect::<Vec<_>>()
        .join(" ");

    (title.trim().to_string(), absorbed)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Style {
    font_size: f32,
    bold: bool,
}

impl Style {
    fn of(line: &Line) -> Self {
        Self {
            font_size: line.font_size,
            bold: line.is_bold,
        }
    }
}

/// First pass: every distinct heading style, largest font first, bold before
/// regular at equal size.
fn distinct_styles(lines: &[Line], candidates: &[HeadingCandidate]) -> Vec<Style> {
    let mut styles: Vec<Style> = candidates
        .iter()
        .map(|candidate| Style::of(&lines[candidate.line]))
        .collect();
    styles.sort_by(|left, right| {
        right
            .font_size
            .total_cmp(&left.font_size)
            .then(right.bold.cmp(&left.bold))
    });
    styles.dedup();
    styles
}

/// Second pass: H1 for the largest style when no numbered H1 exists, then H2,
/// then H3 for everything smaller.
fn assign_style_levels(styles: &[Style], h1_found: bool) -> Vec<(Style, HeadingLevel)> {
    let ladder: &[HeadingLevel] = if h1_found {
        &[HeadingLevel::H2]
    } else {
        &[HeadingLevel::H1, HeadingLevel::H2]
    };

    styles
        .iter()
        .enumerate()
        .map(|(rank, style)| (*style, ladder.get(rank).copied().unwrap_or(HeadingLevel::H3)))
        .collect()
}
