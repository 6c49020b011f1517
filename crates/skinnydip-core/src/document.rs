//! Document and line index
//!
//! The input G-code is held as one immutable string. Everything downstream
//! refers to it by byte offset or zero-based line number; the [`LineIndex`]
//! keeps the two numbering schemes consistent.

use std::ops::Range;

/// Line terminator used for generated lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineEnding {
    /// `\n`
    Lf,
    /// `\r\n`
    CrLf,
}

impl LineEnding {
    /// Detect from the first terminated line of `text`
    pub fn detect(text: &str) -> Self {
        match text.find('\n') {
            Some(pos) if pos > 0 && text.as_bytes()[pos - 1] == b'\r' => Self::CrLf,
            _ => Self::Lf,
        }
    }

    /// The terminator itself
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
        }
    }
}

/// Ascending list of line-start offsets
///
/// Line `n` spans `starts[n]..starts[n + 1]` (or to the end of the text for
/// the last line). A document without a trailing newline still has its last
/// line indexed; an empty document has no lines at all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineIndex {
    starts: Vec<usize>,
    text_len: usize,
}

impl LineIndex {
    /// Build the index for `text`
    pub fn build(text: &str) -> Self {
        let mut starts = Vec::with_capacity(text.len() / 24 + 1);
        if !text.is_empty() {
            starts.push(0);
            starts.extend(
                text.match_indices('\n')
                    .map(|(pos, _)| pos + 1)
                    .filter(|&start| start < text.len()),
            );
        }
        Self {
            starts,
            text_len: text.len(),
        }
    }

    /// Number of lines
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    /// True for an empty document
    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    /// Line-start offsets in ascending order
    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    /// Offset where line `line` starts
    ///
    /// `line == len()` yields the end-of-document anchor.
    pub fn line_start(&self, line: usize) -> Option<usize> {
        match line.cmp(&self.starts.len()) {
            std::cmp::Ordering::Less => Some(self.starts[line]),
            std::cmp::Ordering::Equal => Some(self.text_len),
            std::cmp::Ordering::Greater => None,
        }
    }

    /// Byte span of line `line`, terminator included
    pub fn span(&self, line: usize) -> Option<Range<usize>> {
        let start = *self.starts.get(line)?;
        let end = self.starts.get(line + 1).copied().unwrap_or(self.text_len);
        Some(start..end)
    }

    /// Line that starts exactly at `offset`
    ///
    /// The end-of-document offset maps to `len()`, the virtual slot after the
    /// last line.
    pub fn line_at(&self, offset: usize) -> Option<usize> {
        if offset == self.text_len {
            return Some(self.starts.len());
        }
        self.starts.binary_search(&offset).ok()
    }

    /// Line containing `offset`
    pub fn line_containing(&self, offset: usize) -> Option<usize> {
        if offset >= self.text_len {
            return None;
        }
        Some(self.starts.partition_point(|&start| start <= offset) - 1)
    }
}

/// A single line of the document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Line<'a> {
    /// Zero-based line number
    pub number: usize,
    /// Byte offset of the line start
    pub offset: usize,
    /// Line content without terminator
    pub content: &'a str,
    /// Line content including its terminator, exactly as in the input
    pub raw: &'a str,
}

/// Immutable G-code document
#[derive(Debug, Clone)]
pub struct Document<'a> {
    text: &'a str,
    index: LineIndex,
    ending: LineEnding,
}

impl<'a> Document<'a> {
    /// Wrap `text` and index its lines
    pub fn new(text: &'a str) -> Self {
        let index = LineIndex::build(text);
        tracing::debug!("Indexed {} lines ({} bytes)", index.len(), text.len());
        Self {
            text,
            index,
            ending: LineEnding::detect(text),
        }
    }

    /// The full text
    pub fn text(&self) -> &'a str {
        self.text
    }

    /// The line index
    pub fn line_index(&self) -> &LineIndex {
        &self.index
    }

    /// Number of lines
    pub fn line_count(&self) -> usize {
        self.index.len()
    }

    /// Dominant line ending
    pub fn line_ending(&self) -> LineEnding {
        self.ending
    }

    /// Line `number`, `None` past the end
    pub fn line(&self, number: usize) -> Option<Line<'a>> {
        let span = self.index.span(number)?;
        let raw = &self.text[span.clone()];
        let content = raw
            .strip_suffix('\n')
            .map(|s| s.strip_suffix('\r').unwrap_or(s))
            .unwrap_or(raw);
        Some(Line {
            number,
            offset: span.start,
            content,
            raw,
        })
    }

    /// All lines in order
    pub fn lines(&self) -> impl Iterator<Item = Line<'a>> + '_ {
        (0..self.index.len()).filter_map(move |n| self.line(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document() {
        let index = LineIndex::build("");
        assert!(index.is_empty());
        assert_eq!(index.line_at(0), Some(0));
        assert_eq!(index.line_containing(0), None);
    }

    #[test]
    fn test_line_starts_with_trailing_newline() {
        let index = LineIndex::build("G1 X1\nT0\n");
        assert_eq!(index.starts(), &[0, 6]);
        assert_eq!(index.line_at(6), Some(1));
        assert_eq!(index.line_at(9), Some(2));
        assert_eq!(index.line_at(3), None);
    }

    #[test]
    fn test_no_trailing_newline_and_empty_lines() {
        let text = "a\n\nb";
        let index = LineIndex::build(text);
        assert_eq!(index.starts(), &[0, 2, 3]);
        assert_eq!(index.span(1), Some(2..3));
        assert_eq!(index.span(2), Some(3..4));
        assert_eq!(index.line_containing(3), Some(2));
        assert_eq!(index.line_containing(1), Some(0));
    }

    #[test]
    fn test_offset_zero_is_line_zero() {
        let index = LineIndex::build("T0\nG1 E-1\n");
        assert_eq!(index.line_at(0), Some(0));
        assert_eq!(index.line_start(0), Some(0));
        assert_eq!(index.line_start(2), Some(11));
        assert_eq!(index.line_start(3), None);
    }

    #[test]
    fn test_document_lines_strip_terminators() {
        let doc = Document::new("T0\r\nG1 E-15 F1000\r\nM104 S200");
        assert_eq!(doc.line_ending(), LineEnding::CrLf);
        let lines: Vec<_> = doc.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].content, "T0");
        assert_eq!(lines[0].raw, "T0\r\n");
        assert_eq!(lines[1].offset, 4);
        assert_eq!(lines[2].content, "M104 S200");
        assert_eq!(lines[2].raw, "M104 S200");
    }

    #[test]
    fn test_line_and_offset_agree() {
        let doc = Document::new("one\ntwo\nthree\n");
        for line in doc.lines() {
            assert_eq!(doc.line_index().line_at(line.offset), Some(line.number));
            assert_eq!(&doc.text()[line.offset..line.offset + line.raw.len()], line.raw);
        }
    }
}
