use std::collections::HashSet;

pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "to", "of", "and", "or", "for", "on", "in", "by", "with", "be", "is", "are",
    "was", "were", "it", "as", "at", "this", "that", "these", "those", "from", "into", "about",
    "over", "under", "than", "we", "you", "they", "he", "she", "i", "not", "but", "if", "then",
    "so", "can", "may", "might", "should", "would", "could", "will", "just", "also", "more",
    "most", "such", "any", "all", "each", "other",
];

/// Lower-cased alphanumeric runs longer than two characters, minus stop words.
pub fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
        .filter(|token| token.len() > 2 && !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

pub fn token_set(text: &str) -> HashSet<String> {
    tokens(text).into_iter().collect()
}

/// Fraction of the anchor's meaningful tokens that also occur in `text`.
pub fn lexical_coverage(anchor: &str, text: &str) -> f32 {
    coverage(&token_set(anchor), text)
}

/// [`lexical_coverage`] against a pre-tokenized anchor.
pub fn coverage(anchor_tokens: &HashSet<String>, text: &str) -> f32 {
    if anchor_tokens.is_empty() {
        return 0.0;
    }
    let text_tokens = token_set(text);
    if text_tokens.is_empty() {
        return 0.0;
    }

    let shared = anchor_tokens.intersection(&text_tokens).count();
    shared as f32 / anchor_tokens.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_drop_stop_words_and_short_runs() {
        assert_eq!(
            tokens("The revenue of Q1, and its growth-drivers!"),
            vec!["revenue", "its", "growth", "drivers"]
        );
    }

    #[test]
    fn coverage_is_zero_without_shared_tokens() {
        assert_eq!(
            lexical_coverage("revenue growth drivers", "forward looking statements"),
            0.0
        );
        assert_eq!(lexical_coverage("the of and", "the of and"), 0.0);
        assert_eq!(lexical_coverage("revenue", ""), 0.0);
    }

    #[test]
    fn coverage_is_one_only_when_every_anchor_token_appears() {
        assert_eq!(
            lexical_coverage("revenue growth", "Growth in revenue was strong"),
            1.0
        );
        let partial = lexical_coverage("revenue growth drivers", "Revenue grew 12% driven by pricing");
        assert!((partial - 1.0 / 3.0).abs() < 1e-6);
    }
}
