//! Linter for Mako templates.
//!
//! A Mako template interleaves three languages: HTML markup, JavaScript
//! inside `<script>`-like regions, and Python inside `${...}` expressions
//! and `<% ... %>` blocks. This linter tracks the lexical context across
//! the whole template, validates that every expression's filter chain is
//! appropriate for its context, and delegates the embedded Python and
//! JavaScript to the sibling linters so the same rules apply as for
//! standalone files.

use crate::expression::Expression;
use crate::linters::base::{find_closing_char_index, index_is_on_comment_line};
use crate::linters::javascript::JavaScriptLinter;
use crate::linters::python::PythonLinter;
use crate::linters::{extension_is, is_in_templates_dir, Linter};
use crate::rules::{FileResults, Rule, RuleSet};
use crate::utils::{Dedented, ParseString, StringLines};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const LINE_COMMENT_DELIM: &str = "##";

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            #[allow(clippy::unwrap_used)]
            RE.get_or_init(|| Regex::new($pattern).unwrap())
        }
    };
}

cached_regex!(django_tag_re, r"(?s)\{%.*?%\}|\{\{.*?\}\}|\{#.*?#\}");
cached_regex!(page_tag_re, r"(?s)<%page\b.*?/>");
cached_regex!(
    page_expression_filter_re,
    r#"expression_filter\s*=\s*(?:"h"|'h')"#
);
cached_regex!(script_open_re, r"(?i)<script\b[^>]*>");
cached_regex!(script_close_re, r"(?i)</script\s*>");
cached_regex!(script_type_re, r#"type\s*=\s*["']([^"']*)["']"#);
cached_regex!(
    require_open_re,
    r#"<%static:(?:require_module(?:_async)?|webpack)[^>]*>"#
);
cached_regex!(
    require_close_re,
    r"</%static:(?:require_module(?:_async)?|webpack)\s*>"
);
cached_regex!(requirejs_block_open_re, r#"<%block\s+name=["']requirejs["'][^>]*>"#);
cached_regex!(block_close_re, r"</%block\s*>");
cached_regex!(filter_chain_re, r"^[\s\w.,]+$");

/// Media types that put a `<script>` body in JavaScript context.
const JAVASCRIPT_SCRIPT_TYPES: &[&str] = &[
    "text/javascript",
    "text/ecmascript",
    "application/ecmascript",
    "application/javascript",
];

/// Media types whose `<script>` body is an HTML template.
const HTML_SCRIPT_TYPES: &[&str] = &["text/template"];

/// Mako tags that open a named construct, not a raw python block.
const NAMED_MAKO_TAGS: &[&str] = &[
    "page", "include", "namespace", "inherit", "def", "block", "call", "doc", "text", "static",
];

/// Lexical context at a template offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Html,
    Javascript,
    Unknown,
}

/// One transition in the ordered context map covering the template.
#[derive(Debug)]
struct ContextMarker {
    index: usize,
    context: Context,
}

/// Linter for `.html`/`.xml` Mako templates under a templates directory.
#[derive(Debug)]
pub struct MakoTemplateLinter {
    javascript_linter: JavaScriptLinter,
    python_linter: PythonLinter,
    ruleset: RuleSet,
}

impl Default for MakoTemplateLinter {
    fn default() -> Self {
        Self::new(JavaScriptLinter::default(), PythonLinter::default())
    }
}

impl MakoTemplateLinter {
    /// Builds a Mako linter composing the given sibling linters; the rule
    /// set is the ordered union of all three.
    #[must_use]
    pub fn new(javascript_linter: JavaScriptLinter, python_linter: PythonLinter) -> Self {
        let ruleset = RuleSet::new(&[
            Rule::MakoMissingDefault,
            Rule::MakoMultiplePageTags,
            Rule::MakoUnparseableExpression,
            Rule::MakoUnknownContext,
            Rule::MakoInvalidHtmlFilter,
            Rule::MakoUnwantedHtmlFilter,
            Rule::MakoInvalidJsFilter,
            Rule::MakoJsMissingQuotes,
            Rule::MakoJsHtmlString,
            Rule::MakoHtmlEntities,
        ])
        .combine(javascript_linter.ruleset())
        .combine(python_linter.ruleset());
        Self {
            javascript_linter,
            python_linter,
            ruleset,
        }
    }

    /// Whether the contents carry Django template tags. Those never appear
    /// in the Mako dialect linted here, so such files belong to the Django
    /// linter.
    #[must_use]
    pub fn is_django_template(contents: &str) -> bool {
        django_tag_re().is_match(contents)
    }

    fn check_mako_file_is_safe(&self, contents: &str, results: &mut FileResults) {
        if Self::is_django_template(contents) {
            return;
        }
        let has_page_default = Self::check_page_default(contents, results);
        let markers = Self::build_context_markers(contents);
        self.check_javascript_regions(contents, &markers, results);
        for (expression, _strings) in Self::find_mako_expressions(contents) {
            if expression.end_index.is_none() {
                results.add_violation(Rule::MakoUnparseableExpression, expression);
                continue;
            }
            self.check_expression_and_filters(
                contents,
                &expression,
                Self::get_context(&markers, expression.start_index),
                has_page_default,
                results,
            );
        }
        self.check_python_blocks(contents, results);
    }

    /// Counts `<%page .../>` tags (ignoring commented ones) and decides
    /// whether the template opted into escape-by-default.
    ///
    /// Returns `false` both when the tag is genuinely missing and when
    /// multiple tags make the default ambiguous; expression-level rules
    /// that only make sense under a page default are gated on this.
    fn check_page_default(contents: &str, results: &mut FileResults) -> bool {
        let tags: Vec<regex::Match> = page_tag_re()
            .find_iter(contents)
            .filter(|m| !index_is_on_comment_line(contents, m.start(), LINE_COMMENT_DELIM))
            .collect();
        match tags.as_slice() {
            [] => {
                results.add_violation(Rule::MakoMissingDefault, Expression::new(0, Some(0)));
                false
            }
            [tag] => {
                if page_expression_filter_re().is_match(tag.as_str()) {
                    true
                } else {
                    results.add_violation(
                        Rule::MakoMissingDefault,
                        Expression::new(tag.start(), Some(tag.end())),
                    );
                    false
                }
            }
            [_, second, ..] => {
                results.add_violation(
                    Rule::MakoMultiplePageTags,
                    Expression::new(second.start(), Some(second.end())),
                );
                false
            }
        }
    }

    /// Builds the ordered context map from script-like tag boundaries.
    fn build_context_markers(contents: &str) -> Vec<ContextMarker> {
        let mut markers = vec![ContextMarker {
            index: 0,
            context: Context::Html,
        }];
        for open in script_open_re().find_iter(contents) {
            if open.as_str().ends_with("/>") {
                continue;
            }
            let context = match script_type_re()
                .captures(open.as_str())
                .map(|captures| captures[1].trim().to_lowercase())
            {
                None => Context::Javascript,
                Some(media_type) => {
                    if JAVASCRIPT_SCRIPT_TYPES.contains(&media_type.as_str()) {
                        Context::Javascript
                    } else if HTML_SCRIPT_TYPES.contains(&media_type.as_str()) {
                        Context::Html
                    } else {
                        Context::Unknown
                    }
                }
            };
            markers.push(ContextMarker {
                index: open.end(),
                context,
            });
        }
        for close in script_close_re().find_iter(contents) {
            markers.push(ContextMarker {
                index: close.start(),
                context: Context::Html,
            });
        }
        for open in require_open_re().find_iter(contents) {
            if open.as_str().ends_with("/>") {
                continue;
            }
            markers.push(ContextMarker {
                index: open.end(),
                context: Context::Javascript,
            });
        }
        for close in require_close_re().find_iter(contents) {
            markers.push(ContextMarker {
                index: close.start(),
                context: Context::Html,
            });
        }
        for open in requirejs_block_open_re().find_iter(contents) {
            markers.push(ContextMarker {
                index: open.end(),
                context: Context::Javascript,
            });
            if let Some(close) = block_close_re().find_at(contents, open.end()) {
                markers.push(ContextMarker {
                    index: close.start(),
                    context: Context::Html,
                });
            }
        }
        markers.sort_by_key(|marker| marker.index);
        markers
    }

    /// Context of an offset: the last marker at or before it.
    fn get_context(markers: &[ContextMarker], index: usize) -> Context {
        markers
            .iter()
            .rev()
            .find(|marker| marker.index <= index)
            .map_or(Context::Html, |marker| marker.context)
    }

    /// Runs the JavaScript linter over every contiguous JavaScript region,
    /// shifting the violations back into template offsets.
    fn check_javascript_regions(
        &self,
        contents: &str,
        markers: &[ContextMarker],
        results: &mut FileResults,
    ) {
        for (i, marker) in markers.iter().enumerate() {
            if marker.context != Context::Javascript {
                continue;
            }
            let region_end = markers
                .get(i + 1)
                .map_or(contents.len(), |next| next.index);
            if region_end <= marker.index {
                continue;
            }
            let mut scratch = FileResults::new(PathBuf::new());
            self.javascript_linter
                .check(&contents[marker.index..region_end], &mut scratch);
            results.shift_and_merge(marker.index, scratch);
        }
    }

    /// Locates every `${...}` expression, resolving the balanced close
    /// brace. Unbalanced expressions come back with `end_index = None`.
    fn find_mako_expressions(contents: &str) -> Vec<(Expression, Vec<ParseString>)> {
        let mut expressions = Vec::new();
        let mut cursor = 0;
        while let Some(rel) = contents[cursor..].find("${") {
            let start_index = cursor + rel;
            if index_is_on_comment_line(contents, start_index, LINE_COMMENT_DELIM) {
                cursor = start_index + 2;
                continue;
            }
            match find_closing_char_index(
                Some("${"),
                '{',
                '}',
                contents,
                start_index + 2,
                Some(LINE_COMMENT_DELIM),
            ) {
                Some(found) => {
                    let end = found.close_char_index + 1;
                    expressions.push((
                        Expression::with_delims(start_index, Some(end), "${", "}"),
                        found.strings,
                    ));
                    cursor = end;
                }
                None => {
                    expressions.push((
                        Expression::with_delims(start_index, None, "${", "}"),
                        Vec::new(),
                    ));
                    cursor = start_index + 2;
                }
            }
        }
        expressions
    }

    fn check_expression_and_filters(
        &self,
        contents: &str,
        expression: &Expression,
        context: Context,
        has_page_default: bool,
        results: &mut FileResults,
    ) {
        if context == Context::Unknown {
            results.add_violation(Rule::MakoUnknownContext, expression.clone());
            return;
        }
        let Some(inner) = expression.expression_inner(contents) else {
            return;
        };
        let (python_part, filters) = split_trailing_filters(inner);

        let python_offset = expression.start_index + expression.start_delim.len();
        let dedented = Dedented::new(python_part);
        let mut scratch = FileResults::new(PathBuf::new());
        self.python_linter.check_fragment(&dedented.text, 0, &mut scratch);
        self.python_linter.check_expression_html_strings(
            &dedented.text,
            0,
            has_page_default,
            &mut scratch,
        );
        results.merge_mapped(scratch, |offset| {
            python_offset + dedented.source_offset(offset)
        });

        let filters: Vec<&str> = filters.iter().map(String::as_str).collect();
        // `n, decode.utf8` bypasses escaping only to fix the encoding; it
        // is acceptable in any context.
        if filters == ["n", "decode.utf8"] {
            return;
        }
        match context {
            Context::Html => match filters.as_slice() {
                [] => {}
                ["h"] => {
                    if has_page_default {
                        // The page default already escapes; a second `h`
                        // double-escapes.
                        results.add_violation(Rule::MakoUnwantedHtmlFilter, expression.clone());
                    }
                }
                ["n", "strip_all_tags_but_br"] => {}
                _ => {
                    results.add_violation(Rule::MakoInvalidHtmlFilter, expression.clone());
                }
            },
            Context::Javascript => match filters.as_slice() {
                ["n", "dump_js_escaped_json"] => {}
                ["n", "js_escaped_string"] => {
                    self.check_js_string_quoting(contents, expression, results);
                }
                _ => {
                    results.add_violation(Rule::MakoInvalidJsFilter, expression.clone());
                }
            },
            Context::Unknown => {}
        }
    }

    /// `js_escaped_string` only yields a string *body*; the expression must
    /// be wrapped in quotes in the surrounding JavaScript source, and the
    /// wrapping string must not itself smuggle markup.
    fn check_js_string_quoting(
        &self,
        contents: &str,
        expression: &Expression,
        results: &mut FileResults,
    ) {
        match Self::containing_js_string(contents, expression) {
            None => {
                results.add_violation(Rule::MakoJsMissingQuotes, expression.clone());
            }
            Some(string_has_html) => {
                if string_has_html {
                    results.add_violation(Rule::MakoJsHtmlString, expression.clone());
                }
            }
        }
    }

    /// Scrubbed-line string scan: replaces the expression's bytes on its
    /// line with filler, then checks whether its position falls inside a
    /// quoted string. Returns `Some(string_contains_markup)` when quoted.
    fn containing_js_string(contents: &str, expression: &Expression) -> Option<bool> {
        let lines = StringLines::new(contents);
        let line_number = lines.index_to_line_number(expression.start_index);
        let line_start = lines.line_number_to_start_index(line_number);
        let line_end = lines.line_number_to_end_index(line_number);
        let line = &contents[line_start..line_end];

        let expr_start = expression.start_index - line_start;
        let expr_end = expression
            .end_index
            .map_or(line.len(), |end| (end - line_start).min(line.len()));
        let mut scrubbed = String::with_capacity(line.len());
        scrubbed.push_str(&line[..expr_start]);
        scrubbed.extend(std::iter::repeat_n('*', expr_end - expr_start));
        scrubbed.push_str(&line[expr_end..]);

        let mut scan_from = 0;
        while let Some(parsed) = ParseString::find(&scrubbed, scan_from, scrubbed.len()) {
            let Some(end) = parsed.end_index else {
                return None;
            };
            if parsed.contains_index(expr_start) {
                let inner = parsed.string_inner(&scrubbed).unwrap_or("");
                return Some(inner.contains('<') || inner.contains('>'));
            }
            scan_from = end;
        }
        None
    }

    /// Finds raw `<% ... %>` python blocks (module-level `<%! ... %>`
    /// included) and lints their bodies with the Python linter. Named tags
    /// like `<%def>` and `<%page>` are someone else's syntax.
    fn check_python_blocks(&self, contents: &str, results: &mut FileResults) {
        let mut cursor = 0;
        while let Some(rel) = contents[cursor..].find("<%") {
            let start_index = cursor + rel;
            cursor = start_index + 2;
            if index_is_on_comment_line(contents, start_index, LINE_COMMENT_DELIM) {
                continue;
            }
            let after = &contents[start_index + 2..];
            let body_lead = after.strip_prefix('!').unwrap_or(after);
            if Self::starts_with_named_tag(body_lead) || body_lead.starts_with(['%', '/']) {
                continue;
            }
            let Some(close_rel) = after.find("%>") else {
                continue;
            };
            let body_start = start_index + 2 + (after.len() - body_lead.len());
            let body_end = start_index + 2 + close_rel;
            if body_end <= body_start {
                continue;
            }
            let dedented = Dedented::new(&contents[body_start..body_end]);
            let mut scratch = FileResults::new(PathBuf::new());
            self.python_linter.check_fragment(&dedented.text, 0, &mut scratch);
            results.merge_mapped(scratch, |offset| body_start + dedented.source_offset(offset));
            cursor = body_end + 2;
        }
    }

    fn starts_with_named_tag(text: &str) -> bool {
        NAMED_MAKO_TAGS.iter().any(|tag| {
            text.strip_prefix(tag).is_some_and(|rest| {
                rest.starts_with(|c: char| c.is_whitespace() || c == '>' || c == '/' || c == ':')
            })
        })
    }
}

/// Splits a Mako expression body on its trailing filter chain: the text
/// after the last `|` is a filter list when it looks like one
/// (identifiers, dots, commas). Everything before is Python source.
fn split_trailing_filters(inner: &str) -> (&str, Vec<String>) {
    if let Some(pos) = inner.rfind('|') {
        let tail = &inner[pos + 1..];
        if filter_chain_re().is_match(tail) {
            let filters = tail
                .split(',')
                .map(|filter| filter.trim().to_owned())
                .filter(|filter| !filter.is_empty())
                .collect();
            return (&inner[..pos], filters);
        }
    }
    (inner, Vec::new())
}

impl Linter for MakoTemplateLinter {
    fn line_comment_delim(&self) -> Option<&'static str> {
        Some(LINE_COMMENT_DELIM)
    }

    fn ruleset(&self) -> &RuleSet {
        &self.ruleset
    }

    fn applies_to(&self, path: &Path) -> bool {
        (extension_is(path, "html") || extension_is(path, "xml")) && is_in_templates_dir(path)
    }

    fn process_file(&self, path: &Path, contents: &str) -> FileResults {
        let mut results = FileResults::new(path.to_path_buf());
        self.check_mako_file_is_safe(contents, &mut results);
        results.prepare_results(contents, self.line_comment_delim());
        results
    }
}
