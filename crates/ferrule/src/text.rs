//! Positions, ranges and incremental edits over document text.
//!
//! LSP positions count characters in UTF-16 code units while Rust strings
//! are UTF-8, so every position is resolved to a byte offset through a
//! [`LineIndex`] before text is touched. Lines end at `\n`, `\r\n` or `\r`.

use lsp_types::{Position, Range, TextDocumentContentChangeEvent};
use thiserror::Error;

/// A single change to a document's text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextEdit {
    /// Replace the whole text.
    Full(String),
    /// Replace the text covered by `range`.
    Range {
        /// The replaced span.
        range: Range,
        /// The new text for the span.
        text: String,
    },
}

impl TextEdit {
    /// An edit replacing `range` with `text`.
    pub fn range(range: Range, text: impl Into<String>) -> Self {
        Self::Range {
            range,
            text: text.into(),
        }
    }
}

impl From<TextDocumentContentChangeEvent> for TextEdit {
    fn from(event: TextDocumentContentChangeEvent) -> Self {
        match event.range {
            Some(range) => Self::Range {
                range,
                text: event.text,
            },
            None => Self::Full(event.text),
        }
    }
}

/// Why an edit batch was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EditError {
    /// The range starts after it ends.
    #[error("range start is after range end")]
    InvalidRange(Range),
    /// Two ranges resolved against the same text overlap.
    #[error("edit ranges overlap")]
    Overlapping,
}

/// Byte offsets of line starts, for position conversion.
#[derive(Debug, Clone)]
pub struct LineIndex<'a> {
    text: &'a str,
    starts: Vec<usize>,
}

impl<'a> LineIndex<'a> {
    /// Index the lines of `text`.
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        let bytes = text.as_bytes();
        let mut starts = vec![0];
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'\n' => starts.push(i + 1),
                b'\r' => {
                    if bytes.get(i + 1) == Some(&b'\n') {
                        i += 1;
                    }
                    starts.push(i + 1);
                }
                _ => {}
            }
            i += 1;
        }
        Self { text, starts }
    }

    /// Number of lines; an empty text has one empty line.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Line content without its terminator.
    fn line(&self, line: usize) -> (usize, &'a str) {
        let start = self.starts[line];
        let end = self.starts.get(line + 1).copied().unwrap_or(self.text.len());
        let content = self.text[start..end].trim_end_matches(['\n', '\r']);
        (start, content)
    }

    /// Byte offset of `position`.
    ///
    /// A character past the end of its line clamps to the line end and a line
    /// past the end of the text clamps to the end of the text. A character
    /// that falls between the halves of a surrogate pair moves past the pair.
    #[must_use]
    pub fn offset(&self, position: Position) -> usize {
        let line = position.line as usize;
        if line >= self.starts.len() {
            return self.text.len();
        }

        let (start, content) = self.line(line);
        let wanted = position.character as usize;
        let mut units = 0;
        for (index, ch) in content.char_indices() {
            if units >= wanted {
                return start + index;
            }
            units += ch.len_utf16();
        }
        start + content.len()
    }

    /// Position of byte `offset`, clamped to the text and floored to a
    /// character boundary.
    #[must_use]
    pub fn position(&self, offset: usize) -> Position {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }

        let line = self.starts.partition_point(|&start| start <= offset) - 1;
        let (start, content) = self.line(line);
        let end = offset.min(start + content.len());
        let character = self.text[start..end].encode_utf16().count();
        Position::new(to_u32(line), to_u32(character))
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Byte offset of `position` in `text`. See [`LineIndex::offset`].
#[must_use]
pub fn offset_at(text: &str, position: Position) -> usize {
    LineIndex::new(text).offset(position)
}

/// Position of byte `offset` in `text`. See [`LineIndex::position`].
#[must_use]
pub fn position_at(text: &str, offset: usize) -> Position {
    LineIndex::new(text).position(offset)
}

/// Apply a batch of edits to `text` and return the new text.
///
/// The batch is split into segments at every [`TextEdit::Full`]. All ranges
/// in a segment refer to the text as it was when the segment started, must
/// not overlap (touching is fine, inserts at one point keep their order) and
/// are applied back to front. On error nothing is applied.
pub fn apply_edits(text: &str, edits: &[TextEdit]) -> Result<String, EditError> {
    let mut current = text.to_owned();
    let mut segment: Vec<(Range, &str)> = Vec::new();

    for edit in edits {
        match edit {
            TextEdit::Full(replacement) => {
                apply_segment(&current, &segment)?;
                segment.clear();
                current.clone_from(replacement);
            }
            TextEdit::Range { range, text } => segment.push((*range, text)),
        }
    }

    if segment.is_empty() {
        Ok(current)
    } else {
        apply_segment(&current, &segment)
    }
}

fn apply_segment(text: &str, edits: &[(Range, &str)]) -> Result<String, EditError> {
    let index = LineIndex::new(text);
    let mut resolved = Vec::with_capacity(edits.len());
    for (order, (range, new_text)) in edits.iter().enumerate() {
        let start = (range.start.line, range.start.character);
        let end = (range.end.line, range.end.character);
        if start > end {
            return Err(EditError::InvalidRange(*range));
        }
        resolved.push((index.offset(range.start), index.offset(range.end), order, *new_text));
    }

    resolved.sort_by_key(|&(start, end, order, _)| (start, end, order));
    if resolved.windows(2).any(|pair| pair[0].1 > pair[1].0) {
        return Err(EditError::Overlapping);
    }

    let mut updated = text.to_owned();
    for (start, end, _, new_text) in resolved.into_iter().rev() {
        updated.replace_range(start..end, new_text);
    }
    Ok(updated)
}
