use crate::chunking::clean_text_for_output;
use crate::layout::{group_lines, JunkFilter};
use crate::models::PageWords;
use crate::traits::WordSource;
use std::path::Path;
use tracing::debug;

/// Lines of at most this many words are treated as heading-like.
pub const HEADING_WORDS: usize = 12;
pub const MAX_PREVIEW_HEADINGS: usize = 40;

/// Cheap document excerpt used only for gating.
#[derive(Debug, Clone)]
pub struct PreviewSampler {
    junk: JunkFilter,
    pub max_pages: usize,
    pub max_chars: usize,
}

impl PreviewSampler {
    pub fn new(junk: JunkFilter, max_pages: usize, max_chars: usize) -> Self {
        Self {
            junk,
            max_pages,
            max_chars,
        }
    }

    /// Extracts and samples the first pages of `path`. Failures yield "".
    pub fn sample<S: WordSource + ?Sized>(&self, source: &S, path: &Path) -> String {
        match source.extract_words(path, Some(self.max_pages)) {
            Ok(pages) => self.preview_text(&pages),
            Err(error) => {
                debug!(path = %path.display(), error = %error, "preview extraction failed");
                String::new()
            }
        }
    }

    /// Heading-like lines first, then the full text, capped at `max_chars`.
    pub fn preview_text(&self, pages: &[PageWords]) -> String {
        let lines: Vec<String> = group_lines(pages)
            .into_iter()
            .filter(|line| (line.page as usize) < self.max_pages)
            .map(|line| line.text)
            .filter(|text| !self.junk.is_junk(text))
            .collect();

        let headings = lines
            .iter()
            .filter(|text| text.split_whitespace().count() <= HEADING_WORDS)
            .take(MAX_PREVIEW_HEADINGS);
        let blob = headings
            .chain(lines.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");

        clean_text_for_output(&blob, self.max_chars)
    }
}
