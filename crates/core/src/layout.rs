use crate::models::{DocStats, Line, PageWords, Word};
use regex::Regex;
use std::collections::HashMap;

/// Words whose `top` differs from the line's first word by more than this start a new line.
pub const LINE_TOLERANCE: f32 = 2.0;

/// Groups each page's words into lines ordered by (top, left).
pub fn group_lines(pages: &[PageWords]) -> Vec<Line> {
    let mut lines = Vec::new();

    for page in pages {
        if page.words.is_empty() {
            continue;
        }

        let mut words: Vec<&Word> = page.words.iter().collect();
        words.sort_by(|left, right| {
            left.top
                .total_cmp(&right.top)
                .then(left.left.total_cmp(&right.left))
        });

        let mut current: Vec<&Word> = Vec::new();
        let mut current_top = words[0].top;
        let mut previous_bottom: Option<f32> = None;

        for word in words {
            if (word.top - current_top).abs() > LINE_TOLERANCE && !current.is_empty() {
                let line = build_line(&current, page.index, previous_bottom);
                previous_bottom = Some(line.bottom);
                lines.push(line);
                current.clear();
                current_top = word.top;
            }
            current.push(word);
        }

        if !current.is_empty() {
            lines.push(build_line(&current, page.index, previous_bottom));
        }
    }

    lines
}

fn build_line(words: &[&Word], page: u32, previous_bottom: Option<f32>) -> Line {
    let top = words[0].top;
    let mut ordered = words.to_vec();
    ordered.sort_by(|left, right| left.left.total_cmp(&right.left));

    let text = ordered
        .iter()
        .map(|word| word.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let bottom = words
        .iter()
        .map(|word| word.bottom)
        .fold(f32::MIN, f32::max);
    let font_size = words.iter().map(|word| word.size).sum::<f32>() / words.len() as f32;
    let is_bold = words
        .iter()
        .any(|word| word.font_name.to_lowercase().contains("bold"));

    Line {
        text,
        page,
        top,
        bottom,
        font_size,
        is_bold,
        word_count: words.len(),
        gap_before: previous_bottom.map_or(0.0, |previous| top - previous),
    }
}

/// Modal word size across the document; the first size seen wins ties.
pub fn doc_stats(pages: &[PageWords]) -> DocStats {
    let mut counts: HashMap<u32, (usize, usize)> = HashMap::new();
    let mut order = 0usize;

    for word in pages.iter().flat_map(|page| page.words.iter()) {
        let entry = counts.entry(word.size.to_bits()).or_insert((0, order));
        entry.0 += 1;
        order += 1;
    }

    counts
        .into_iter()
        .max_by(|(_, (left_count, left_seen)), (_, (right_count, right_seen))| {
            left_count
                .cmp(right_count)
                .then(right_seen.cmp(left_seen))
        })
        .map(|(bits, _)| DocStats {
            most_common_font_size: f32::from_bits(bits),
        })
        .unwrap_or_default()
}

/// Recognizes page furniture that never carries section content.
#[derive(Debug, Clone)]
pub struct JunkFilter {
    furniture: Regex,
}

impl JunkFilter {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            furniture: Regex::new(r"^(page\s*\d+|version\s*[\d.]+|\d+\s*of\s*\d+)")?,
        })
    }

    pub fn is_junk(&self, text: &str) -> bool {
        let lowered = text.trim().to_lowercase();

        self.furniture.is_match(&lowered)
            || (lowered.contains("...") && lowered.split_whitespace().count() > 3)
            || lowered.contains("copyright")
            || lowered.contains('©')
            || lowered.contains("all rights reserved")
            || (!lowered.is_empty() && lowered.chars().all(char::is_numeric))
    }
}
