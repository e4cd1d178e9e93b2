//! Offset bookkeeping shared by every linter.
//!
//! The scanners all work on byte offsets into the raw template text, but
//! reports need line/column numbers. `StringLines` keeps the line-start
//! table for that conversion. `ParseString` is the lightweight quoted-string
//! scanner the balanced-delimiter search relies on to skip over literals.

/// A utility struct to convert byte offsets to line and column numbers.
///
/// The AST parser and every regex scanner report byte offsets, but findings
/// are reported with 1-indexed line/column numbers which are more
/// human-readable.
#[derive(Debug, Clone)]
pub struct StringLines {
    /// Stores the byte index of the start of each line.
    line_starts: Vec<usize>,
    /// Total length of the scanned text in bytes.
    len: usize,
}

impl StringLines {
    /// Creates a new `StringLines` by scanning the source code for newlines.
    /// Uses byte iteration since '\n' is always a single byte in UTF-8.
    #[must_use]
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0];
        for (i, byte) in source.as_bytes().iter().enumerate() {
            if *byte == b'\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            line_starts,
            len: source.len(),
        }
    }

    /// Number of lines in the scanned text.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Converts a byte offset to a 1-indexed line number.
    #[must_use]
    pub fn index_to_line_number(&self, index: usize) -> usize {
        match self.line_starts.binary_search(&index) {
            Ok(line) => line + 1,
            Err(line) => line,
        }
    }

    /// Converts a byte offset to a 1-indexed column number on its line,
    /// counted in characters so multibyte text does not inflate columns.
    #[must_use]
    pub fn index_to_column_number(&self, source: &str, index: usize) -> usize {
        let line_start = self.index_to_line_start_index(index);
        source[line_start..index].chars().count() + 1
    }

    /// Returns the byte offset at which `index`'s line begins.
    #[must_use]
    pub fn index_to_line_start_index(&self, index: usize) -> usize {
        self.line_number_to_start_index(self.index_to_line_number(index))
    }

    /// Returns the byte offset at which the given 1-indexed line begins.
    #[must_use]
    pub fn line_number_to_start_index(&self, line_number: usize) -> usize {
        let idx = line_number.saturating_sub(1);
        self.line_starts.get(idx).copied().unwrap_or(self.len)
    }

    /// Returns the byte offset one past the end of the given 1-indexed line,
    /// excluding its trailing newline.
    #[must_use]
    pub fn line_number_to_end_index(&self, line_number: usize) -> usize {
        if line_number < self.line_count() {
            // The next line starts right after this line's newline.
            self.line_number_to_start_index(line_number + 1) - 1
        } else {
            self.len
        }
    }

    /// Extracts the text of the given 1-indexed line (without newline).
    #[must_use]
    pub fn line_number_to_line<'a>(&self, source: &'a str, line_number: usize) -> &'a str {
        let start = self.line_number_to_start_index(line_number);
        let end = self.line_number_to_end_index(line_number);
        &source[start..end]
    }
}

/// A quoted string literal located inside a scanned region.
///
/// Handles single-quoted, double-quoted and triple-quoted literals with
/// backslash escapes. `end_index` is `None` when the literal is
/// unterminated, i.e. the scan ran off the end of the template.
#[derive(Debug, Clone)]
pub struct ParseString {
    /// Offset of the opening quote.
    pub start_index: usize,
    /// Offset one past the closing quote run, or `None` if unterminated.
    pub end_index: Option<usize>,
    /// 1 for `'`/`"`, 3 for `'''`/`"""`.
    pub quote_length: usize,
}

impl ParseString {
    /// Finds the first quote character in `template[scan_start..scan_end]`
    /// and parses the literal it opens. The literal itself may extend past
    /// `scan_end`; only the opening quote is bounded by the scan window.
    #[must_use]
    pub fn find(template: &str, scan_start: usize, scan_end: usize) -> Option<Self> {
        let window = template.get(scan_start..scan_end)?;
        let rel = window.find(['\'', '"'])?;
        Some(Self::parse(template, scan_start + rel))
    }

    /// Parses the string literal whose opening quote sits at `start_index`.
    #[must_use]
    pub fn parse(template: &str, start_index: usize) -> Self {
        let bytes = template.as_bytes();
        let quote = bytes[start_index];
        let triple = template[start_index..].len() >= 3
            && bytes[start_index + 1] == quote
            && bytes[start_index + 2] == quote;
        let quote_length = if triple { 3 } else { 1 };
        let mut cursor = start_index + quote_length;
        let end_index = loop {
            if cursor >= template.len() {
                break None;
            }
            match bytes[cursor] {
                b'\\' => {
                    // Escape consumes the next byte, whatever it is.
                    cursor += 2;
                }
                b if b == quote => {
                    if quote_length == 1 {
                        break Some(cursor + 1);
                    }
                    if template.len() - cursor >= 3
                        && bytes[cursor + 1] == quote
                        && bytes[cursor + 2] == quote
                    {
                        break Some(cursor + 3);
                    }
                    cursor += 1;
                }
                _ => cursor += 1,
            }
        };
        Self {
            start_index,
            end_index,
            quote_length,
        }
    }

    /// The full literal including quotes, if terminated.
    #[must_use]
    pub fn string<'a>(&self, template: &'a str) -> Option<&'a str> {
        self.end_index.map(|end| &template[self.start_index..end])
    }

    /// The literal's inner text with quotes stripped, if terminated.
    #[must_use]
    pub fn string_inner<'a>(&self, template: &'a str) -> Option<&'a str> {
        self.end_index
            .map(|end| &template[self.start_index + self.quote_length..end - self.quote_length])
    }

    /// Whether `index` falls inside this literal (quotes included).
    #[must_use]
    pub fn contains_index(&self, index: usize) -> bool {
        match self.end_index {
            Some(end) => self.start_index <= index && index < end,
            None => self.start_index <= index,
        }
    }
}

/// A code fragment with the longest common leading whitespace stripped from
/// all non-blank lines, like Python's `textwrap.dedent`.
///
/// Keeps a per-line record of how many bytes were removed, so offsets into
/// the dedented text (where an embedded fragment actually parses) can be
/// mapped back to positions in the original template.
#[derive(Debug)]
pub struct Dedented {
    /// The fragment with the common margin removed.
    pub text: String,
    /// Start offset of each line of `text`.
    line_starts: Vec<usize>,
    /// Bytes stripped from the fragment up to and including each line's
    /// margin.
    removed_through_line: Vec<usize>,
}

impl Dedented {
    /// Computes the common margin of `fragment` and strips it. Blank lines
    /// lose their whole indent, as `textwrap.dedent` does.
    #[must_use]
    pub fn new(fragment: &str) -> Self {
        let mut margin: Option<&str> = None;
        for line in fragment.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let indent = &line[..line.len() - line.trim_start().len()];
            margin = Some(match margin {
                None => indent,
                Some(current) => {
                    let common = current
                        .as_bytes()
                        .iter()
                        .zip(indent.as_bytes())
                        .take_while(|(a, b)| a == b)
                        .count();
                    &current[..common]
                }
            });
        }
        let margin = margin.unwrap_or("");
        let mut text = String::with_capacity(fragment.len());
        let mut line_starts = Vec::new();
        let mut removed_through_line = Vec::new();
        let mut removed = 0;
        for (i, line) in fragment.split('\n').enumerate() {
            if i > 0 {
                text.push('\n');
            }
            line_starts.push(text.len());
            let kept = if line.trim().is_empty() {
                line.trim_start_matches([' ', '\t'])
            } else {
                line.strip_prefix(margin).unwrap_or(line)
            };
            removed += line.len() - kept.len();
            removed_through_line.push(removed);
            text.push_str(kept);
        }
        Self {
            text,
            line_starts,
            removed_through_line,
        }
    }

    /// Maps an offset in the dedented text back to the original fragment.
    #[must_use]
    pub fn source_offset(&self, offset: usize) -> usize {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };
        offset + self.removed_through_line[line]
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_line_and_column_lookup() {
        let source = "one\ntwo\nthree";
        let lines = StringLines::new(source);
        assert_eq!(lines.line_count(), 3);
        assert_eq!(lines.index_to_line_number(0), 1);
        assert_eq!(lines.index_to_line_number(4), 2);
        assert_eq!(lines.index_to_column_number(source, 4), 1);
        assert_eq!(lines.index_to_column_number(source, 6), 3);
        assert_eq!(lines.line_number_to_line(source, 2), "two");
        assert_eq!(lines.line_number_to_line(source, 3), "three");
    }

    #[test]
    fn test_parse_string_round_trip() {
        let template = r#"x = "hello \"there\"" + y"#;
        let parsed = ParseString::find(template, 0, template.len()).unwrap();
        let end = parsed.end_index.unwrap();
        assert_eq!(&template[parsed.start_index..end], r#""hello \"there\"""#);
        assert_eq!(parsed.string_inner(template).unwrap(), r#"hello \"there\""#);
        assert_eq!(parsed.quote_length, 1);
    }

    #[test]
    fn test_parse_string_triple_quoted() {
        let template = r#"a = '''multi 'line' text''' tail"#;
        let parsed = ParseString::find(template, 0, template.len()).unwrap();
        assert_eq!(parsed.quote_length, 3);
        assert_eq!(
            parsed.string(template).unwrap(),
            r"'''multi 'line' text'''"
        );
    }

    #[test]
    fn test_parse_string_unterminated() {
        let template = "x = 'oops";
        let parsed = ParseString::find(template, 0, template.len()).unwrap();
        assert_eq!(parsed.end_index, None);
        assert!(parsed.string(template).is_none());
    }

    #[test]
    fn test_column_counts_characters_not_bytes() {
        let source = "vär = x\n";
        let lines = StringLines::new(source);
        // Byte offset 4 is the space after the two-byte `ä`.
        assert_eq!(lines.index_to_column_number(source, 4), 4);
    }

    #[test]
    fn test_dedent_strips_common_margin() {
        let dedented = Dedented::new("    if True:\n        pass\n");
        assert_eq!(dedented.text, "if True:\n    pass\n");
    }

    #[test]
    fn test_dedent_offset_mapping() {
        let dedented = Dedented::new("    a = 1\n    b = 2\n");
        assert_eq!(dedented.text, "a = 1\nb = 2\n");
        assert_eq!(dedented.source_offset(0), 4);
        assert_eq!(dedented.source_offset(10), 18);
    }
}
