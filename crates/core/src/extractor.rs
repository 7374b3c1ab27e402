//! Word boxes from PDF content streams.
//!
//! The interpreter tracks the graphics and text matrices closely enough to
//! place each shown string on the page, and splits the strings into words.
//! Glyph widths are estimated from the font size since font metrics are not
//! needed for line grouping.

use crate::error::DocumentError;
use crate::models::{PageWords, Word};
use crate::traits::WordSource;
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use std::collections::HashMap;
use std::path::Path;

const DEFAULT_PAGE_HEIGHT: f32 = 792.0;
/// Estimated advance of one glyph, as a fraction of the font size.
const GLYPH_WIDTH: f32 = 0.5;

#[derive(Default)]
pub struct LopdfWordSource;

impl WordSource for LopdfWordSource {
    fn page_count(&self, path: &Path) -> Result<usize, DocumentError> {
        Ok(load(path)?.get_pages().len())
    }

    fn extract_words(
        &self,
        path: &Path,
        max_pages: Option<usize>,
    ) -> Result<Vec<PageWords>, DocumentError> {
        let document = load(path)?;
        let limit = max_pages.unwrap_or(usize::MAX);

        let mut pages = Vec::new();
        for (index, (_number, page_id)) in document.get_pages().into_iter().enumerate() {
            if index >= limit {
                break;
            }
            pages.push(PageWords {
                index: index as u32,
                words: page_words(&document, page_id)?,
            });
        }

        if pages.iter().all(|page| page.words.is_empty()) {
            return Err(DocumentError::NoText(path.display().to_string()));
        }

        Ok(pages)
    }
}

fn load(path: &Path) -> Result<Document, DocumentError> {
    Document::load(path).map_err(|error| DocumentError::PdfParse(error.to_string()))
}

fn page_words(document: &Document, page_id: ObjectId) -> Result<Vec<Word>, DocumentError> {
    let height = page_height(document, page_id);
    let fonts = page_fonts(document, page_id);
    let raw = document
        .get_page_content(page_id)
        .map_err(|error| DocumentError::PdfParse(error.to_string()))?;
    let content =
        Content::decode(&raw).map_err(|error| DocumentError::PdfParse(error.to_string()))?;

    let mut state = TextState::new(height, &fonts);
    for operation in &content.operations {
        state.apply(&operation.operator, &operation.operands);
    }
    Ok(state.finish())
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Object> {
    match object {
        Object::Reference(id) => document.get_object(*id).ok(),
        other => Some(other),
    }
}

fn resolve_dict<'a>(document: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match resolve(document, object)? {
        Object::Dictionary(dictionary) => Some(dictionary),
        _ => None,
    }
}

/// Looks up a page attribute, walking up the page tree for inherited values.
fn inherited<'a>(document: &'a Document, page_id: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut current = document.get_dictionary(page_id).ok()?;
    for _ in 0..32 {
        if let Ok(value) = current.get(key) {
            return resolve(document, value);
        }
        current = resolve_dict(document, current.get(b"Parent").ok()?)?;
    }
    None
}

fn number(object: &Object) -> Option<f32> {
    match object {
        Object::Integer(value) => Some(*value as f32),
        Object::Real(value) => Some(*value as f32),
        _ => None,
    }
}

fn page_height(document: &Document, page_id: ObjectId) -> f32 {
    let Some(Object::Array(bounds)) = inherited(document, page_id, b"MediaBox") else {
        return DEFAULT_PAGE_HEIGHT;
    };
    let values: Vec<f32> = bounds
        .iter()
        .filter_map(|value| resolve(document, value).and_then(number))
        .collect();
    match values.as_slice() {
        [_, y0, _, y1] if (y1 - y0).abs() > 0.0 => (y1 - y0).abs(),
        _ => DEFAULT_PAGE_HEIGHT,
    }
}

/// Resource name (e.g. `F1`) to the font's `BaseFont` name.
fn page_fonts(document: &Document, page_id: ObjectId) -> HashMap<Vec<u8>, String> {
    let mut fonts = HashMap::new();
    let Some(resources) =
        inherited(document, page_id, b"Resources").and_then(|value| resolve_dict(document, value))
    else {
        return fonts;
    };
    let Some(font_dict) = resources
        .get(b"Font")
        .ok()
        .and_then(|value| resolve_dict(document, value))
    else {
        return fonts;
    };

    for (name, value) in font_dict.iter() {
        let base_font = resolve_dict(document, value)
            .and_then(|font| font.get(b"BaseFont").ok())
            .and_then(|base| match base {
                Object::Name(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .unwrap_or_else(|| String::from_utf8_lossy(name).into_owned());
        fonts.insert(name.clone(), base_font);
    }
    fonts
}

/// Row-vector affine matrix `[a b c d e f]` as used by PDF.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Matrix([f32; 6]);

impl Matrix {
    const IDENTITY: Matrix = Matrix([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    fn translate(tx: f32, ty: f32) -> Self {
        Matrix([1.0, 0.0, 0.0, 1.0, tx, ty])
    }

    fn from_operands(operands: &[Object]) -> Option<Self> {
        let values: Vec<f32> = operands.iter().filter_map(number).collect();
        let values: [f32; 6] = values.try_into().ok()?;
        Some(Matrix(values))
    }

    /// `self × other`.
    fn then(&self, other: &Matrix) -> Matrix {
        let [a1, b1, c1, d1, e1, f1] = self.0;
        let [a2, b2, c2, d2, e2, f2] = other.0;
        Matrix([
            a1 * a2 + b1 * c2,
            a1 * b2 + b1 * d2,
            c1 * a2 + d1 * c2,
            c1 * b2 + d1 * d2,
            e1 * a2 + f1 * c2 + e2,
            e1 * b2 + f1 * d2 + f2,
        ])
    }

    fn vertical_scale(&self) -> f32 {
        let [_, _, c, d, _, _] = self.0;
        (c * c + d * d).sqrt()
    }

    fn horizontal_scale(&self) -> f32 {
        let [a, b, _, _, _, _] = self.0;
        (a * a + b * b).sqrt()
    }
}

#[derive(Debug, Clone)]
struct PendingWord {
    text: String,
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
    size: f32,
    font_name: String,
}

struct TextState<'a> {
    page_height: f32,
    fonts: &'a HashMap<Vec<u8>, String>,
    ctm: Matrix,
    saved: Vec<Matrix>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    font_name: String,
    font_size: f32,
    leading: f32,
    pending: Option<PendingWord>,
    words: Vec<Word>,
}

impl<'a> TextState<'a> {
    fn new(page_height: f32, fonts: &'a HashMap<Vec<u8>, String>) -> Self {
        Self {
            page_height,
            fonts,
            ctm: Matrix::IDENTITY,
            saved: Vec::new(),
            text_matrix: Matrix::IDENTITY,
            line_matrix: Matrix::IDENTITY,
            font_name: String::new(),
            font_size: 12.0,
            leading: 0.0,
            pending: None,
            words: Vec::new(),
        }
    }

    fn apply(&mut self, operator: &str, operands: &[Object]) {
        match operator {
            "q" => self.saved.push(self.ctm),
            "Q" => {
                if let Some(ctm) = self.saved.pop() {
                    self.ctm = ctm;
                }
            }
            "cm" => {
                if let Some(matrix) = Matrix::from_operands(operands) {
                    self.ctm = matrix.then(&self.ctm);
                }
            }
            "BT" => {
                self.text_matrix = Matrix::IDENTITY;
                self.line_matrix = Matrix::IDENTITY;
            }
            "ET" => self.flush(),
            "Tf" => {
                if let [Object::Name(name), size] = operands {
                    self.font_name = self
                        .fonts
                        .get(name)
                        .cloned()
                        .unwrap_or_else(|| String::from_utf8_lossy(name).into_owned());
                    self.font_size = number(size).unwrap_or(self.font_size);
                }
            }
            "TL" => {
                if let Some(leading) = operands.first().and_then(number) {
                    self.leading = leading;
                }
            }
            "Td" => self.move_line(operands, false),
            "TD" => self.move_line(operands, true),
            "Tm" => {
                if let Some(matrix) = Matrix::from_operands(operands) {
                    self.text_matrix = matrix;
                    self.line_matrix = matrix;
                }
            }
            "T*" => self.next_line(),
            "Tj" => {
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "'" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.first() {
                    self.show(bytes);
                }
            }
            "\"" => {
                self.next_line();
                if let Some(Object::String(bytes, _)) = operands.get(2) {
                    self.show(bytes);
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operands.first() {
                    for item in items {
                        match item {
                            Object::String(bytes, _) => self.show(bytes),
                            other => {
                                if let Some(adjustment) = number(other) {
                                    self.advance(-adjustment / 1000.0 * self.font_size);
                                }
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    fn move_line(&mut self, operands: &[Object], set_leading: bool) {
        if let [tx, ty] = operands {
            let (Some(tx), Some(ty)) = (number(tx), number(ty)) else {
                return;
            };
            if set_leading {
                self.leading = -ty;
            }
            self.line_matrix = Matrix::translate(tx, ty).then(&self.line_matrix);
            self.text_matrix = self.line_matrix;
        }
    }

    fn next_line(&mut self) {
        self.line_matrix = Matrix::translate(0.0, -self.leading).then(&self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn advance(&mut self, width: f32) {
        self.text_matrix = Matrix::translate(width, 0.0).then(&self.text_matrix);
    }

    fn show(&mut self, bytes: &[u8]) {
        let text = decode_pdf_string(bytes);
        let glyph_width = self.font_size * GLYPH_WIDTH;

        for ch in text.chars() {
            let rendering = self.text_matrix.then(&self.ctm);
            let size = self.font_size * rendering.vertical_scale();
            let width = glyph_width * rendering.horizontal_scale();
            let [_, _, _, _, x, y] = rendering.0;

            if ch.is_whitespace() || ch.is_control() {
                self.flush();
            } else {
                let top = self.page_height - y - size;
                let bottom = self.page_height - y;
                let continues = self.pending.as_ref().is_some_and(|pending| {
                    (pending.bottom - bottom).abs() <= size * 0.5
                        && (x - pending.right).abs() <= width * 0.5
                });
                if !continues {
                    self.flush();
                }
                let font_name = self.font_name.clone();
                let pending = self.pending.get_or_insert_with(|| PendingWord {
                    text: String::new(),
                    left: x,
                    right: x,
                    top,
                    bottom,
                    size,
                    font_name,
                });
                pending.text.push(ch);
                pending.right = x + width;
            }

            self.advance(glyph_width);
        }
    }

    fn flush(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.words.push(Word {
                text: pending.text,
                left: pending.left,
                top: pending.top,
                bottom: pending.bottom,
                size: pending.size,
                font_name: pending.font_name,
            });
        }
    }

    fn finish(mut self) -> Vec<Word> {
        self.flush();
        self.words
    }
}

/// UTF-16BE strings carry a byte-order mark; everything else is read as
/// single-byte text. `/ToUnicode` maps and CID fonts (`Identity-H`) are not
/// consulted, so text shown through two-byte glyph ids decodes as noise.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    bytes.iter().map(|byte| char::from(*byte)).collect()
}
