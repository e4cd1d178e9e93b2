//! Scanning primitives shared by every language-specific linter.
//!
//! The core piece is [`find_closing_char_index`]: a balanced-delimiter
//! search that skips string literals and comment-only lines, used by every
//! higher-level expression finder to resolve the extent of a call or a
//! `${...}` expression.

use crate::utils::{ParseString, StringLines};

/// A successfully balanced closing delimiter.
#[derive(Debug)]
pub struct ClosingMatch {
    /// Offset of the balancing `close_char`.
    pub close_char_index: usize,
    /// String literals skipped along the way, in order of appearance.
    pub strings: Vec<ParseString>,
}

/// Finds the index of the `close_char` balancing the `open_char` that
/// opened the scan at `start_index`.
///
/// String literals are parsed and skipped (an unterminated literal fails
/// the whole search). When `start_delim` is set, running into a fresh
/// occurrence of it before the next `open_char` fails the search: the
/// template is ambiguous and the caller reports it as unparseable.
/// `line_comment_delim` makes the scan skip comment-only lines.
///
/// Expressed as a cursor loop rather than recursion; every step strictly
/// advances the cursor, so the loop terminates.
#[must_use]
pub fn find_closing_char_index(
    start_delim: Option<&str>,
    open_char: char,
    close_char: char,
    template: &str,
    start_index: usize,
    line_comment_delim: Option<&str>,
) -> Option<ClosingMatch> {
    let mut cursor = start_index;
    let mut num_open_chars: usize = 0;
    let mut strings: Vec<ParseString> = Vec::new();

    loop {
        cursor = uncommented_start_index(template, cursor, line_comment_delim)?;

        let close_char_index = template[cursor..].find(close_char)? + cursor;
        let open_char_index = template[cursor..close_char_index]
            .find(open_char)
            .map(|i| i + cursor);
        let parse_string = ParseString::find(template, cursor, close_char_index);

        let mut min_index = close_char_index;
        if let Some(i) = open_char_index {
            min_index = min_index.min(i);
        }
        if let Some(ref s) = parse_string {
            min_index = min_index.min(s.start_index);
        }

        if let Some(s) = parse_string.filter(|s| s.start_index == min_index) {
            // A string literal starts before anything else. Skip it whole.
            let end = s.end_index?;
            strings.push(s);
            cursor = end;
        } else if open_char_index == Some(min_index) {
            if let Some(delim) = start_delim {
                // A fresh start delimiter before the nested open means the
                // template never closed the current expression.
                if template[cursor..min_index].contains(delim) {
                    return None;
                }
            }
            num_open_chars += 1;
            cursor = min_index + open_char.len_utf8();
        } else if num_open_chars == 0 {
            return Some(ClosingMatch {
                close_char_index,
                strings,
            });
        } else {
            // This close matched a nested open, not ours.
            num_open_chars -= 1;
            cursor = close_char_index + close_char.len_utf8();
        }
    }
}

/// Returns the first offset at or after `start_index` that is not on a
/// comment-only line, advancing whole lines at a time. `None` when only
/// commented lines remain. A linter with no comment token treats every
/// line as uncommented.
#[must_use]
pub fn uncommented_start_index(
    template: &str,
    start_index: usize,
    line_comment_delim: Option<&str>,
) -> Option<usize> {
    let Some(delim) = line_comment_delim else {
        return Some(start_index);
    };
    let lines = StringLines::new(template);
    let mut index = start_index;
    loop {
        if index >= template.len() {
            return None;
        }
        let line_number = lines.index_to_line_number(index);
        let line = lines.line_number_to_line(template, line_number);
        if !line.trim_start().starts_with(delim) {
            return Some(index);
        }
        // Step past this line's newline onto the next line.
        index = lines.line_number_to_end_index(line_number) + 1;
    }
}

/// Whether the line containing `index` is a comment line for `delim`.
#[must_use]
pub fn index_is_on_comment_line(template: &str, index: usize, delim: &str) -> bool {
    let lines = StringLines::new(template);
    let line_number = lines.index_to_line_number(index.min(template.len()));
    lines
        .line_number_to_line(template, line_number)
        .trim_start()
        .starts_with(delim)
}
