//! Linter for Django templates.
//!
//! Django's `{% trans %}` output is not escaped, so the project convention
//! is to capture it (`as tmsg`) and emit it through `force_escape`, or
//! through the custom `{% interpolate_html %}` tag when the translated
//! string carries placeholders. Each located tag is wrapped in an
//! expression type that validates itself against the surrounding template
//! text.

use crate::expression::Expression;
use crate::linters::{extension_is, is_in_templates_dir, Linter};
use crate::rules::{FileResults, Rule, RuleSet};
use crate::utils::ParseString;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

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
cached_regex!(trans_tag_re, r"\{%\s*trans\s+(.*?)\s*%\}");
cached_regex!(blocktrans_open_re, r"\{%\s*blocktrans(?:\s+[^%]*?)?\s*%\}");
cached_regex!(endblocktrans_re, r"\{%\s*endblocktrans\s*%\}");
cached_regex!(interpolate_tag_re, r"\{%\s*interpolate_html\s+(.*?)\s*%\}");
cached_regex!(comment_open_re, r"\{%\s*comment\s*%\}");
cached_regex!(comment_close_re, r"\{%\s*endcomment\s*%\}");
cached_regex!(filter_tag_re, r"\{%\s*filter\s*(.*?)\s*%\}");
cached_regex!(endfilter_re, r"^\{%\s*endfilter\s*%\}");
cached_regex!(
    escaped_var_re,
    r"\{\{\s*([a-zA-Z_]\w*)\s*\|\s*([a-zA-Z_]\w*)\s*\}\}"
);
cached_regex!(as_variable_re, r"\bas\s+([a-zA-Z_]\w*)\s*$");
cached_regex!(placeholder_re, r"\{[a-zA-Z_]\w*\}");
cached_regex!(html_tag_re, r"<\s*/?[a-zA-Z]");
cached_regex!(
    kwarg_re,
    r#"([a-zA-Z_]\w*)=("[^"]*"|'[^']*'|[\w.]+)(\|[a-zA-Z_]\w*)?"#
);

/// The only filter accepted for escaping a captured translation.
const ESCAPE_FILTER: &str = "force_escape";

/// Linter for `.html`/`.xml` Django templates under a templates directory.
#[derive(Debug)]
pub struct DjangoTemplateLinter {
    ruleset: RuleSet,
}

impl Default for DjangoTemplateLinter {
    fn default() -> Self {
        Self {
            ruleset: RuleSet::new(&[
                Rule::DjangoTransMissingEscape,
                Rule::DjangoTransInvalidEscapeFilter,
                Rule::DjangoTransEscapeVariableMismatch,
                Rule::DjangoBlocktransMissingEscapeFilter,
                Rule::DjangoBlocktransParseError,
                Rule::DjangoBlocktransEscapeFilterParseError,
                Rule::DjangoHtmlInterpolationMissing,
                Rule::DjangoHtmlInterpolationMissingSafeFilter,
                Rule::DjangoHtmlInterpolationInvalidTag,
            ]),
        }
    }
}

impl DjangoTemplateLinter {
    /// Same tag sniff the Mako linter uses as a guard, inverted: only
    /// files carrying Django tags are processed here.
    #[must_use]
    pub fn is_django_template(contents: &str) -> bool {
        django_tag_re().is_match(contents)
    }

    fn check_django_file_is_safe(&self, contents: &str, results: &mut FileResults) {
        let comment_spans = Self::comment_spans(contents);
        for found in trans_tag_re().captures_iter(contents) {
            #[allow(clippy::unwrap_used)]
            let whole = found.get(0).unwrap();
            if Self::in_comment(&comment_spans, whole.start()) {
                continue;
            }
            TransExpression {
                tag: Expression::new(whole.start(), Some(whole.end())),
                arguments: &found[1],
            }
            .validate(contents, results);
        }
        for found in blocktrans_open_re().find_iter(contents) {
            if Self::in_comment(&comment_spans, found.start()) {
                continue;
            }
            BlockTransExpression {
                tag: Expression::new(found.start(), Some(found.end())),
            }
            .validate(contents, results);
        }
        for found in interpolate_tag_re().captures_iter(contents) {
            #[allow(clippy::unwrap_used)]
            let whole = found.get(0).unwrap();
            if Self::in_comment(&comment_spans, whole.start()) {
                continue;
            }
            HtmlInterpolateExpression {
                tag: Expression::new(whole.start(), Some(whole.end())),
                arguments: &found[1],
            }
            .validate(results);
        }
    }

    /// `{% comment %}` spans, with open/close tags paired positionally; an
    /// unclosed comment swallows the rest of the file.
    fn comment_spans(contents: &str) -> Vec<(usize, usize)> {
        let opens: Vec<usize> = comment_open_re()
            .find_iter(contents)
            .map(|m| m.start())
            .collect();
        let closes: Vec<usize> = comment_close_re()
            .find_iter(contents)
            .map(|m| m.end())
            .collect();
        opens
            .iter()
            .enumerate()
            .map(|(i, &open)| (open, closes.get(i).copied().unwrap_or(contents.len())))
            .collect()
    }

    fn in_comment(spans: &[(usize, usize)], index: usize) -> bool {
        spans.iter().any(|&(start, end)| start <= index && index < end)
    }
}

/// A located `{% trans ... %}` tag.
struct TransExpression<'a> {
    tag: Expression,
    arguments: &'a str,
}

impl TransExpression<'_> {
    /// The translated string must be captured (`as var`) and then emitted
    /// through `force_escape`, or through `{% interpolate_html %}` when it
    /// carries placeholders.
    fn validate(&self, contents: &str, results: &mut FileResults) {
        let Some(translated) = self.translated_string() else {
            // No string argument at all; the template engine will complain
            // long before we need to.
            return;
        };
        let Some(variable) = as_variable_re()
            .captures(self.arguments)
            .map(|captures| captures[1].to_owned())
        else {
            results.add_violation(Rule::DjangoTransMissingEscape, self.tag.clone());
            return;
        };
        let search_start = self.tag.end_index.unwrap_or(self.tag.start_index);
        if placeholder_re().is_match(&translated) {
            self.validate_interpolated(contents, search_start, &variable, results);
        } else {
            self.validate_escaped(contents, search_start, &variable, results);
        }
    }

    fn translated_string(&self) -> Option<String> {
        let parsed = ParseString::find(self.arguments, 0, self.arguments.len())?;
        parsed.string_inner(self.arguments).map(str::to_owned)
    }

    /// The first `{{ var|filter }}` in the rest of the file must reference
    /// the captured variable with the approved escape filter.
    fn validate_escaped(
        &self,
        contents: &str,
        search_start: usize,
        variable: &str,
        results: &mut FileResults,
    ) {
        let Some(captures) = escaped_var_re().captures_at(contents, search_start) else {
            results.add_violation(Rule::DjangoTransMissingEscape, self.tag.clone());
            return;
        };
        if &captures[1] != variable {
            results.add_violation(Rule::DjangoTransEscapeVariableMismatch, self.tag.clone());
        } else if &captures[2] != ESCAPE_FILTER {
            results.add_violation(Rule::DjangoTransInvalidEscapeFilter, self.tag.clone());
        }
    }

    /// A placeholder-carrying translation must instead be rendered through
    /// an `{% interpolate_html %}` tag referencing the same variable.
    fn validate_interpolated(
        &self,
        contents: &str,
        search_start: usize,
        variable: &str,
        results: &mut FileResults,
    ) {
        let references_variable = interpolate_tag_re()
            .captures_iter(&contents[search_start..])
            .any(|captures| {
                captures[1]
                    .split_whitespace()
                    .next()
                    .is_some_and(|first| first == variable)
            });
        if !references_variable {
            results.add_violation(Rule::DjangoHtmlInterpolationMissing, self.tag.clone());
        }
    }
}

/// A located `{% blocktrans %}` tag.
struct BlockTransExpression {
    tag: Expression,
}

impl BlockTransExpression {
    /// The whole block must be wrapped in
    /// `{% filter force_escape %}...{% endfilter %}`.
    fn validate(&self, contents: &str, results: &mut FileResults) {
        let open_end = self.tag.end_index.unwrap_or(self.tag.start_index);
        let Some(end_tag) = endblocktrans_re().find_at(contents, open_end) else {
            results.add_violation(Rule::DjangoBlocktransParseError, self.tag.clone());
            return;
        };
        if self.validate_filter_wrapper(contents, end_tag.end(), results) {
            self.validate_body(contents, open_end, end_tag, results);
        }
    }

    /// Returns whether the wrapper parsed cleanly enough to keep checking.
    fn validate_filter_wrapper(
        &self,
        contents: &str,
        end_tag_end: usize,
        results: &mut FileResults,
    ) -> bool {
        let before = contents[..self.tag.start_index].trim_end();
        let Some(tag_start) = before.rfind("{%") else {
            results.add_violation(Rule::DjangoBlocktransMissingEscapeFilter, self.tag.clone());
            return true;
        };
        let preceding_tag = &before[tag_start..];
        let Some(captures) = filter_tag_re()
            .captures(preceding_tag)
            .filter(|c| c.get(0).is_some_and(|m| m.as_str().len() == preceding_tag.len()))
        else {
            results.add_violation(Rule::DjangoBlocktransMissingEscapeFilter, self.tag.clone());
            return true;
        };
        let filter_list = captures[1].trim();
        if filter_list.is_empty() {
            results.add_violation(
                Rule::DjangoBlocktransEscapeFilterParseError,
                self.tag.clone(),
            );
            return false;
        }
        if filter_list != ESCAPE_FILTER {
            results.add_violation(Rule::DjangoBlocktransMissingEscapeFilter, self.tag.clone());
            return true;
        }
        if !endfilter_re().is_match(contents[end_tag_end..].trim_start()) {
            results.add_violation(Rule::DjangoBlocktransMissingEscapeFilter, self.tag.clone());
        }
        true
    }

    /// A body that mixes placeholders with markup needs the interpolation
    /// tag downstream, same as `trans`.
    fn validate_body(
        &self,
        contents: &str,
        body_start: usize,
        end_tag: regex::Match<'_>,
        results: &mut FileResults,
    ) {
        let body = &contents[body_start..end_tag.start()];
        if placeholder_re().is_match(body)
            && html_tag_re().is_match(body)
            && !interpolate_tag_re().is_match(&contents[end_tag.end()..])
        {
            results.add_violation(Rule::DjangoHtmlInterpolationMissing, self.tag.clone());
        }
    }
}

/// A located `{% interpolate_html ... %}` tag.
struct HtmlInterpolateExpression<'a> {
    tag: Expression,
    arguments: &'a str,
}

impl HtmlInterpolateExpression<'_> {
    /// The tag takes the captured translation variable followed by keyword
    /// arguments; every HTML-fragment argument must carry `|safe`.
    fn validate(&self, results: &mut FileResults) {
        let mut tokens = self.arguments.split_whitespace();
        let Some(first) = tokens.next() else {
            results.add_violation(Rule::DjangoHtmlInterpolationInvalidTag, self.tag.clone());
            return;
        };
        if first.contains('=') {
            // The translation variable has to come before the kwargs.
            results.add_violation(Rule::DjangoHtmlInterpolationInvalidTag, self.tag.clone());
            return;
        }
        let kwargs = &self.arguments[first.len()..];
        let mut matched_len = 0;
        for captures in kwarg_re().captures_iter(kwargs) {
            #[allow(clippy::unwrap_used)]
            let whole = captures.get(0).unwrap();
            matched_len += whole.as_str().len();
            let value = &captures[2];
            let has_safe = captures.get(3).is_some_and(|f| f.as_str() == "|safe");
            let quoted = value.starts_with(['\'', '"']);
            if quoted && value[1..value.len() - 1].contains('<') && !has_safe {
                results.add_violation(
                    Rule::DjangoHtmlInterpolationMissingSafeFilter,
                    self.tag.clone(),
                );
            }
        }
        // Anything left over besides whitespace is argument syntax the tag
        // will not accept.
        let non_ws: usize = kwargs.split_whitespace().map(str::len).sum();
        if matched_len < non_ws {
            results.add_violation(Rule::DjangoHtmlInterpolationInvalidTag, self.tag.clone());
        }
    }
}

impl Linter for DjangoTemplateLinter {
    fn line_comment_delim(&self) -> Option<&'static str> {
        Some("{#")
    }

    fn ruleset(&self) -> &RuleSet {
        &self.ruleset
    }

    fn applies_to(&self, path: &Path) -> bool {
        (extension_is(path, "html") || extension_is(path, "xml")) && is_in_templates_dir(path)
    }

    fn process_file(&self, path: &Path, contents: &str) -> FileResults {
        let mut results = FileResults::new(path.to_path_buf());
        if Self::is_django_template(contents) {
            self.check_django_file_is_safe(contents, &mut results);
        }
        results.prepare_results(contents, self.line_comment_delim());
        results
    }
}
