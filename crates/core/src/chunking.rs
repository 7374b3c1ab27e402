use crate::layout::JunkFilter;
use crate::models::{Chunk, Line, OutlineEntry};
use sha2::{Digest, Sha256};

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Collapses whitespace and caps the text at `max_chars` characters.
///
/// When the cap bites, the cut backs off to the last ". " if that sentence
/// boundary lies beyond the first 50 characters.
pub fn clean_text_for_output(text: &str, max_chars: usize) -> String {
    let normalized = normalize_whitespace(text);
    let Some((byte_limit, _)) = normalized.char_indices().nth(max_chars) else {
        return normalized;
    };

    let cut = &normalized[..byte_limit];
    match cut.rfind(". ") {
        Some(last_dot) if cut[..last_dot].chars().count() > 50 => cut[..=last_dot].to_string(),
        _ => cut.to_string(),
    }
}

/// Replaces every character outside `[0-9A-Za-z._-]` with `_`.
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// Builds one chunk per outline entry from the body lines that follow it.
///
/// `outline` must already be ordered by (page, line).
pub fn build_chunks(
    document: &str,
    lines: &[Line],
    outline: &[OutlineEntry],
    junk: &JunkFilter,
) -> Vec<Chunk> {
    let mut chunks = Vec::with_capacity(outline.len());

    for (position, heading) in outline.iter().enumerate() {
        let next = outline.get(position + 1);
        let end = next.map_or(lines.len(), |entry| entry.line.min(lines.len()));
        let start = (heading.line + 1).min(end);
        let boundary = next.and_then(|entry| lines.get(entry.line));

        let mut body = Vec::new();
        for line in &lines[start..end] {
            if let Some(boundary) = boundary {
                if line.page == boundary.page && line.top >= boundary.top {
                    break;
                }
            }
            if !junk.is_junk(&line.text) {
                body.push(line.text.as_str());
            }
        }

        let title = heading.text.trim().to_string();
        chunks.push(Chunk {
            chunk_id: make_chunk_id(document, heading.page, position, &title),
            document: document.to_string(),
            title,
            text: body.join("\n").trim().to_string(),
            page: heading.page,
        });
    }

    chunks
}

fn make_chunk_id(document: &str, page: u32, ordinal: usize, title: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    hasher.update(page.to_le_bytes());
    hasher.update((ordinal as u64).to_le_bytes());
    hasher.update(title.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Attaches the document identity to every chunk and refreshes its id.
pub fn assign_document(chunks: &mut [Chunk], document: &str) {
    for (index, chunk) in chunks.iter_mut().enumerate() {
        chunk.document = document.to_string();
        chunk.chunk_id = make_chunk_id(document, chunk.page, index, &chunk.title);
    }
}
