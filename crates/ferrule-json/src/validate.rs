//! JSON syntax checking.
//!
//! [`check`] stops at the first syntax error and reports where it is, as a
//! character position with a 1-based line and column. The grammar is JSON
//! plus the `NaN`, `Infinity` and `-Infinity` constants.

use ferrule::text::position_at;
use lsp_types::{Diagnostic, DiagnosticSeverity, Position, Range};

/// Source attached to every diagnostic: the name editors already know the
/// JSON server by.
pub const DIAGNOSTIC_SOURCE: &str = "JsonLanguageServer";

/// Containers nested deeper than this are reported instead of parsed
pub const MAX_DEPTH: usize = 512;

/// The first syntax error in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Error message, for example `Expecting value`.
    pub message: &'static str,
    /// Byte offset of the offending character.
    pub offset: usize,
    /// 1-based line number; only `\n` ends a line.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
}

impl SyntaxError {
    /// A diagnostic covering the offending character.
    #[must_use]
    pub fn to_diagnostic(&self, text: &str) -> Diagnostic {
        let start = position_at(text, self.offset);
        let width = text[self.offset..]
            .chars()
            .next()
            .map_or(1, char::len_utf16);
        let end = Position::new(
            start.line,
            start.character + u32::try_from(width).unwrap_or(1),
        );

        Diagnostic {
            range: Range::new(start, end),
            severity: Some(DiagnosticSeverity::ERROR),
            source: Some(DIAGNOSTIC_SOURCE.to_string()),
            message: self.message.to_string(),
            ..Diagnostic::default()
        }
    }
}

impl std::fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: line {} column {}", self.message, self.line, self.column)
    }
}

impl std::error::Error for SyntaxError {}

/// Check that `text` is a single JSON document.
pub fn check(text: &str) -> Result<(), SyntaxError> {
    let mut scanner = Scanner::new(text);
    let start = scanner.skip_whitespace(0);
    let end = scanner.value(start)?;
    let end = scanner.skip_whitespace(end);
    if end != scanner.chars.len() {
        return Err(scanner.error("Extra data", end));
    }
    Ok(())
}

/// Diagnostics for `text`: empty when it is valid, otherwise one error.
#[must_use]
pub fn diagnostics(text: &str) -> Vec<Diagnostic> {
    match check(text) {
        Ok(()) => Vec::new(),
        Err(error) => vec![error.to_diagnostic(text)],
    }
}

struct Scanner<'a> {
    text: &'a str,
    /// `(byte offset, char)` pairs; indices into this are character positions
    chars: Vec<(usize, char)>,
    depth: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            chars: text.char_indices().collect(),
            depth: 0,
        }
    }

    fn at(&self, index: usize) -> Option<char> {
        self.chars.get(index).map(|&(_, c)| c)
    }

    fn is_digit(&self, index: usize) -> bool {
        self.at(index).is_some_and(|c| c.is_ascii_digit())
    }

    fn error(&self, message: &'static str, index: usize) -> SyntaxError {
        let offset = self
            .chars
            .get(index)
            .map_or(self.text.len(), |&(offset, _)| offset);
        let before = &self.chars[..index.min(self.chars.len())];
        let line = before.iter().filter(|&&(_, c)| c == '\n').count() + 1;
        let column = match before.iter().rposition(|&(_, c)| c == '\n') {
            Some(newline) => index - newline,
            None => index + 1,
        };
        SyntaxError {
            message,
            offset,
            line,
            column,
        }
    }

    fn skip_whitespace(&self, mut index: usize) -> usize {
        while matches!(self.at(index), Some(' ' | '\t' | '\n' | '\r')) {
            index += 1;
        }
        index
    }

    fn matches_word(&self, index: usize, word: &str) -> bool {
        word.chars()
            .enumerate()
            .all(|(i, expected)| self.at(index + i) == Some(expected))
    }

    /// Scan one value starting at `index` and return the index after it.
    fn value(&mut self, index: usize) -> Result<usize, SyntaxError> {
        match self.at(index) {
            Some('"') => self.string(index + 1),
            Some('{') => self.nested(index, Self::object),
            Some('[') => self.nested(index, Self::array),
            Some('n') if self.matches_word(index, "null") => Ok(index + 4),
            Some('t') if self.matches_word(index, "true") => Ok(index + 4),
            Some('f') if self.matches_word(index, "false") => Ok(index + 5),
            Some('N') if self.matches_word(index, "NaN") => Ok(index + 3),
            Some('I') if self.matches_word(index, "Infinity") => Ok(index + 8),
            Some('-') if self.matches_word(index, "-Infinity") => Ok(index + 9),
            _ => self
                .number(index)
                .ok_or_else(|| self.error("Expecting value", index)),
        }
    }

    fn nested(
        &mut self,
        index: usize,
        scan: fn(&mut Self, usize) -> Result<usize, SyntaxError>,
    ) -> Result<usize, SyntaxError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("Maximum nesting depth exceeded", index));
        }
        self.depth += 1;
        let end = scan(self, index + 1);
        self.depth -= 1;
        end
    }

    fn object(&mut self, index: usize) -> Result<usize, SyntaxError> {
        let mut i = self.skip_whitespace(index);
        if self.at(i) == Some('}') {
            return Ok(i + 1);
        }

        loop {
            if self.at(i) != Some('"') {
                return Err(self.error("Expecting property name enclosed in double quotes", i));
            }
            i = self.skip_whitespace(self.string(i + 1)?);
            if self.at(i) != Some(':') {
                return Err(self.error("Expecting ':' delimiter", i));
            }
            i = self.skip_whitespace(i + 1);
            let end = self.value(i)?;
            i = self.skip_whitespace(end);
            match self.at(i) {
                Some('}') => return Ok(i + 1),
                Some(',') => i = self.skip_whitespace(i + 1),
                _ => return Err(self.error("Expecting ',' delimiter", i)),
            }
        }
    }

    fn array(&mut self, index: usize) -> Result<usize, SyntaxError> {
        let mut i = self.skip_whitespace(index);
        if self.at(i) == Some(']') {
            return Ok(i + 1);
        }

        loop {
            let end = self.value(i)?;
            i = self.skip_whitespace(end);
            match self.at(i) {
                Some(']') => return Ok(i + 1),
                Some(',') => i = self.skip_whitespace(i + 1),
                _ => return Err(self.error("Expecting ',' delimiter", i)),
            }
        }
    }

    /// Scan a string body; `index` is just past the opening quote.
    fn string(&self, index: usize) -> Result<usize, SyntaxError> {
        let begin = index - 1;
        let mut i = index;
        loop {
            let Some(c) = self.at(i) else {
                return Err(self.error("Unterminated string starting at", begin));
            };
            match c {
                '"' => return Ok(i + 1),
                '\\' => i = self.escape(begin, i + 1)?,
                c if u32::from(c) <= 0x1f => {
                    return Err(self.error("Invalid control character at", i));
                }
                _ => i += 1,
            }
        }
    }

    /// Scan an escape; `index` is just past the backslash.
    fn escape(&self, begin: usize, index: usize) -> Result<usize, SyntaxError> {
        match self.at(index) {
            None => Err(self.error("Unterminated string starting at", begin)),
            Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't') => Ok(index + 1),
            Some('u') => {
                let digits = index + 1;
                let end = digits + 4;
                if end >= self.chars.len() {
                    return Err(self.error("Invalid \\uXXXX escape", index));
                }
                let unit = self
                    .hex(digits)
                    .ok_or_else(|| self.error("Invalid \\uXXXX escape", index))?;

                // a high surrogate may be followed by its low half
                if (0xd800..=0xdbff).contains(&unit)
                    && end + 6 < self.chars.len()
                    && self.at(end) == Some('\\')
                    && self.at(end + 1) == Some('u')
                {
                    let low = self
                        .hex(end + 2)
                        .ok_or_else(|| self.error("Invalid \\uXXXX escape", end + 1))?;
                    if (0xdc00..=0xdfff).contains(&low) {
                        return Ok(end + 6);
                    }
                }
                Ok(end)
            }
            Some(_) => Err(self.error("Invalid \\escape", index - 1)),
        }
    }

    fn hex(&self, index: usize) -> Option<u32> {
        (index..index + 4).try_fold(0, |unit, i| {
            self.at(i)
                .and_then(|c| c.to_digit(16))
                .map(|digit| unit * 16 + digit)
        })
    }

    fn number(&self, index: usize) -> Option<usize> {
        let mut i = index;
        if self.at(i) == Some('-') {
            i += 1;
        }
        match self.at(i) {
            Some('0') => i += 1,
            Some('1'..='9') => {
                i += 1;
                while self.is_digit(i) {
                    i += 1;
                }
            }
            _ => return None,
        }

        if self.at(i) == Some('.') && self.is_digit(i + 1) {
            i += 2;
            while self.is_digit(i) {
                i += 1;
            }
        }

        if matches!(self.at(i), Some('e' | 'E')) {
            let exponent = i;
            i += 1;
            if matches!(self.at(i), Some('+' | '-')) {
                i += 1;
            }
            let digits = i;
            while self.is_digit(i) {
                i += 1;
            }
            if i == digits {
                i = exponent;
            }
        }
        Some(i)
    }
}
