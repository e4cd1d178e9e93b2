//! A located code fragment inside a template.

use crate::utils::StringLines;

/// A span of template text a rule fired on, possibly wrapped in delimiters
/// (e.g. `${`/`}` for Mako expressions).
///
/// `end_index = None` means the fragment could not be resolved, typically
/// because its delimiters never balance. Such expressions still carry a
/// useful `start_index` for reporting.
#[derive(Debug, Clone)]
pub struct Expression {
    /// Offset of the first byte of the fragment (including `start_delim`).
    pub start_index: usize,
    /// Offset one past the last byte (including `end_delim`), or `None`
    /// when the fragment is unparseable.
    pub end_index: Option<usize>,
    /// Opening delimiter, empty when the fragment is bare text.
    pub start_delim: &'static str,
    /// Closing delimiter, empty when the fragment is bare text.
    pub end_delim: &'static str,
}

impl Expression {
    /// An expression with no recognized delimiters.
    #[must_use]
    pub fn new(start_index: usize, end_index: Option<usize>) -> Self {
        Self {
            start_index,
            end_index,
            start_delim: "",
            end_delim: "",
        }
    }

    /// An expression wrapped in known delimiters.
    #[must_use]
    pub fn with_delims(
        start_index: usize,
        end_index: Option<usize>,
        start_delim: &'static str,
        end_delim: &'static str,
    ) -> Self {
        Self {
            start_index,
            end_index,
            start_delim,
            end_delim,
        }
    }

    /// The covered substring, delimiters included.
    #[must_use]
    pub fn expression<'a>(&self, template: &'a str) -> Option<&'a str> {
        self.end_index.map(|end| &template[self.start_index..end])
    }

    /// The covered substring with delimiters stripped.
    #[must_use]
    pub fn expression_inner<'a>(&self, template: &'a str) -> Option<&'a str> {
        self.expression(template).map(|text| {
            let inner = text.strip_prefix(self.start_delim).unwrap_or(text);
            inner.strip_suffix(self.end_delim).unwrap_or(inner)
        })
    }

    /// 1-indexed `(line, column)` of the fragment's start.
    #[must_use]
    pub fn location(&self, template: &str, lines: &StringLines) -> (usize, usize) {
        (
            lines.index_to_line_number(self.start_index),
            lines.index_to_column_number(template, self.start_index),
        )
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_expression_inner_strips_delims() {
        let template = "a ${ msg | h } b";
        let expr = Expression::with_delims(2, Some(14), "${", "}");
        assert_eq!(expr.expression(template).unwrap(), "${ msg | h }");
        assert_eq!(expr.expression_inner(template).unwrap(), " msg | h ");
    }

    #[test]
    fn test_unparseable_expression_has_no_text() {
        let expr = Expression::with_delims(4, None, "${", "}");
        assert!(expr.expression("junk ${ oops").is_none());
    }
}
