//! Linter for raw JavaScript sources.
//!
//! Flags jQuery DOM-insertion calls fed with markup that was not built
//! through `HtmlUtils`, HTML built by string concatenation, and the
//! deprecated global `escape()`. Composes the Underscore linter so that
//! templates embedded in `.js` files get both rule sets.

use crate::expression::Expression;
use crate::linters::base::find_closing_char_index;
use crate::linters::underscore::UnderscoreTemplateLinter;
use crate::linters::Linter;
use crate::rules::{FileResults, Rule, RuleSet};
use crate::utils::{ParseString, StringLines};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

const LINE_COMMENT_DELIM: &str = "//";

macro_rules! cached_regex {
    ($name:ident, $pattern:expr) => {
        fn $name() -> &'static Regex {
            static RE: OnceLock<Regex> = OnceLock::new();
            #[allow(clippy::unwrap_used)]
            RE.get_or_init(|| Regex::new($pattern).unwrap())
        }
    };
}

cached_regex!(
    append_prepend_re,
    r"([\w.$]*)\.(append|prepend)\(" // caller chain captured for HtmlUtils exclusion
);
cached_regex!(
    insertion_re,
    r"([\w.$]*)\.(unwrap|wrapAll|wrapInner|wrap|after|before|replaceAll|replaceWith)\("
);
cached_regex!(
    insert_into_target_re,
    r"([\w.$]*)\.(appendTo|prependTo|insertAfter|insertBefore)\("
);
cached_regex!(html_call_re, r"([\w.$]*)\.html\(");
cached_regex!(global_escape_re, r"(?:window\.)?escape\(");
cached_regex!(
    string_literal_re,
    r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'"#
);
cached_regex!(identifier_re, r"^[A-Za-z_$][\w$.]*$");
cached_regex!(
    html_utils_to_string_re,
    r"(?s)^(?:edx\.)?HtmlUtils\.\w[\w.]*\(.*\)\.toString\(\)$"
);

/// Linter for `.js` files (excluding minified bundles).
#[derive(Debug)]
pub struct JavaScriptLinter {
    ruleset: RuleSet,
    underscore_linter: UnderscoreTemplateLinter,
}

impl Default for JavaScriptLinter {
    fn default() -> Self {
        let underscore_linter = UnderscoreTemplateLinter::default();
        let ruleset = RuleSet::new(&[
            Rule::JavascriptJqueryAppend,
            Rule::JavascriptJqueryPrepend,
            Rule::JavascriptJqueryInsertion,
            Rule::JavascriptJqueryInsertIntoTarget,
            Rule::JavascriptJqueryHtml,
            Rule::JavascriptConcatHtml,
            Rule::JavascriptEscape,
        ])
        .combine(underscore_linter.ruleset());
        Self {
            ruleset,
            underscore_linter,
        }
    }
}

impl JavaScriptLinter {
    /// Runs every JavaScript check over `contents`, appending violations to
    /// `results`. Also the delegation entry point used by the Mako linter
    /// for `<script>` bodies.
    pub fn check(&self, contents: &str, results: &mut FileResults) {
        self.underscore_linter.check(contents, results);
        self.check_jquery_append_prepend(contents, results);
        self.check_jquery_insertion(contents, results);
        self.check_jquery_insert_into_target(contents, results);
        self.check_jquery_html(contents, results);
        self.check_global_escape(contents, results);
        self.check_concat_html(contents, results);
    }

    /// `.append(...)` / `.prepend(...)` with an argument that may carry
    /// unescaped markup.
    fn check_jquery_append_prepend(&self, contents: &str, results: &mut FileResults) {
        for captures in append_prepend_re().captures_iter(contents) {
            #[allow(clippy::unwrap_used)]
            let whole = captures.get(0).unwrap();
            let caller = &captures[1];
            if caller.ends_with("HtmlUtils") {
                continue;
            }
            let rule = if &captures[2] == "append" {
                Rule::JavascriptJqueryAppend
            } else {
                Rule::JavascriptJqueryPrepend
            };
            self.check_call_argument(
                contents,
                whole.start(),
                whole.end(),
                rule,
                Self::is_safe_html_append_argument,
                results,
            );
        }
    }

    /// `wrap`/`after`/`replaceWith`-family calls, same argument taxonomy.
    fn check_jquery_insertion(&self, contents: &str, results: &mut FileResults) {
        for captures in insertion_re().captures_iter(contents) {
            #[allow(clippy::unwrap_used)]
            let whole = captures.get(0).unwrap();
            if captures[1].ends_with("HtmlUtils") {
                continue;
            }
            self.check_call_argument(
                contents,
                whole.start(),
                whole.end(),
                Rule::JavascriptJqueryInsertion,
                Self::is_safe_html_append_argument,
                results,
            );
        }
    }

    /// `appendTo`-family calls move the *caller* into the target, so the
    /// caller expression is what must be a known element reference.
    fn check_jquery_insert_into_target(&self, contents: &str, results: &mut FileResults) {
        for captures in insert_into_target_re().captures_iter(contents) {
            #[allow(clippy::unwrap_used)]
            let whole = captures.get(0).unwrap();
            #[allow(clippy::unwrap_used)]
            let caller_end = captures.get(1).unwrap().end();
            let caller_start = Self::caller_chain_start(contents, caller_end);
            if Self::is_safe_caller(&contents[caller_start..caller_end]) {
                continue;
            }
            let close = find_closing_char_index(
                None,
                '(',
                ')',
                contents,
                whole.end(),
                Some(LINE_COMMENT_DELIM),
            );
            results.add_violation(
                Rule::JavascriptJqueryInsertIntoTarget,
                Expression::new(whole.start(), close.map(|c| c.close_char_index + 1)),
            );
        }
    }

    /// `.html(arg)` is only safe when it reads (empty arg) or is handed an
    /// `HtmlUtils` rendering.
    fn check_jquery_html(&self, contents: &str, results: &mut FileResults) {
        for captures in html_call_re().captures_iter(contents) {
            #[allow(clippy::unwrap_used)]
            let whole = captures.get(0).unwrap();
            if captures[1].ends_with("HtmlUtils") {
                continue;
            }
            self.check_call_argument(
                contents,
                whole.start(),
                whole.end(),
                Rule::JavascriptJqueryHtml,
                Self::is_safe_html_argument,
                results,
            );
        }
    }

    /// Resolves the call's balanced closing paren and validates the
    /// argument text with `is_safe`. An unresolvable call is reported as a
    /// violation with no end offset rather than silently skipped.
    fn check_call_argument(
        &self,
        contents: &str,
        call_start: usize,
        arg_start: usize,
        rule: Rule,
        is_safe: fn(&str) -> bool,
        results: &mut FileResults,
    ) {
        match find_closing_char_index(
            None,
            '(',
            ')',
            contents,
            arg_start,
            Some(LINE_COMMENT_DELIM),
        ) {
            Some(close) => {
                let argument = &contents[arg_start..close.close_char_index];
                if !is_safe(argument) {
                    results.add_violation(
                        rule,
                        Expression::new(call_start, Some(close.close_char_index + 1)),
                    );
                }
            }
            None => results.add_violation(rule, Expression::new(call_start, None)),
        }
    }

    /// Argument shapes accepted for append/prepend/insertion calls.
    fn is_safe_html_append_argument(argument: &str) -> bool {
        let argument = argument.trim();
        if argument.is_empty() {
            return true;
        }
        // A bare element-ish identifier: `fooEl`, `$element`.
        if identifier_re().is_match(argument)
            && (argument.ends_with("El") || argument.starts_with('$'))
        {
            return true;
        }
        if Self::is_plain_string_without_html(argument) {
            return true;
        }
        if Self::is_single_tag_jquery_constructor(argument) {
            return true;
        }
        // A backbone-ish element reference, as long as nothing is
        // concatenated onto it.
        if (argument.ends_with(".el") || argument.ends_with(".$el")) && !argument.contains('+') {
            return true;
        }
        html_utils_to_string_re().is_match(argument)
    }

    /// Argument shapes accepted for `.html()`: clearing calls and
    /// `HtmlUtils` renderings only.
    fn is_safe_html_argument(argument: &str) -> bool {
        let argument = argument.trim();
        argument.is_empty()
            || argument == "''"
            || argument == "\"\""
            || html_utils_to_string_re().is_match(argument)
    }

    /// The whole argument is one string literal containing no `<`.
    fn is_plain_string_without_html(argument: &str) -> bool {
        if !argument.starts_with(['\'', '"']) {
            return false;
        }
        let parsed = ParseString::parse(argument, 0);
        match parsed.end_index {
            Some(end) if end == argument.len() => parsed
                .string_inner(argument)
                .is_some_and(|inner| !inner.contains('<')),
            _ => false,
        }
    }

    /// `$("<tag/>")` building a single element from a one-tag string.
    fn is_single_tag_jquery_constructor(argument: &str) -> bool {
        let Some(inner) = argument
            .strip_prefix("$(")
            .and_then(|rest| rest.strip_suffix(')'))
        else {
            return false;
        };
        let Some(first_string) = ParseString::find(inner, 0, inner.len()) else {
            return false;
        };
        first_string.string_inner(inner).is_some_and(|text| {
            let text = text.trim();
            text.starts_with('<') && text.matches('<').count() == 1
        })
    }

    fn is_safe_caller(caller: &str) -> bool {
        caller.ends_with("El")
            || caller.starts_with('$')
            || caller == "el"
            || caller == "parentNode"
    }

    /// Start of the full caller expression ending at `end`. The regex
    /// capture only spans identifier chains, so callers rooted in a call
    /// such as `$('<div/>').addClass('x')` are recovered by walking back
    /// over each balanced `(...)` group to the start of the chain.
    fn caller_chain_start(contents: &str, end: usize) -> usize {
        let bytes = contents.as_bytes();
        let mut cursor = end;
        loop {
            while cursor > 0 && Self::is_caller_byte(bytes[cursor - 1]) {
                cursor -= 1;
            }
            if cursor == 0 || bytes[cursor - 1] != b')' {
                return cursor;
            }
            match Self::matching_open_paren(contents, cursor - 1) {
                Some(open) => cursor = open,
                None => return cursor,
            }
        }
    }

    fn is_caller_byte(byte: u8) -> bool {
        byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$' || byte == b'.'
    }

    /// Walks left from the `)` at `close` to its opening `(`, hopping over
    /// string literals so quoted parens do not count.
    fn matching_open_paren(contents: &str, close: usize) -> Option<usize> {
        let bytes = contents.as_bytes();
        let mut depth = 0usize;
        let mut i = close + 1;
        while i > 0 {
            i -= 1;
            match bytes[i] {
                b')' => depth += 1,
                b'(' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                quote @ (b'\'' | b'"') => {
                    i = Self::string_open_quote(bytes, i, quote)?;
                }
                _ => {}
            }
        }
        None
    }

    /// Position of the quote opening the literal that closes at `close`,
    /// skipping backslash-escaped quotes.
    fn string_open_quote(bytes: &[u8], close: usize, quote: u8) -> Option<usize> {
        let mut i = close;
        while i > 0 {
            i -= 1;
            if bytes[i] == quote {
                let escapes = bytes[..i].iter().rev().take_while(|b| **b == b'\\').count();
                if escapes % 2 == 0 {
                    return Some(i);
                }
            }
        }
        None
    }

    /// The global `escape()` (bare or `window.`-qualified) is not an HTML
    /// escaper; member calls like `_.escape(` are someone else's business.
    fn check_global_escape(&self, contents: &str, results: &mut FileResults) {
        for found in global_escape_re().find_iter(contents) {
            if Self::preceded_by_member_access(contents, found.start()) {
                continue;
            }
            results.add_violation(
                Rule::JavascriptEscape,
                Expression::new(found.start(), Some(found.end())),
            );
        }
    }

    fn preceded_by_member_access(contents: &str, index: usize) -> bool {
        contents[..index]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$' || c == '.')
    }

    /// String literals that look like markup (`"<div>"`, `"</span>"`) glued
    /// to other values with `+`. Matches on the same source line merge into
    /// one violation spanning the whole concatenation chain.
    fn check_concat_html(&self, contents: &str, results: &mut FileResults) {
        let lines = StringLines::new(contents);
        let mut merged: Vec<(usize, usize, usize)> = Vec::new(); // (line, start, end)
        for found in string_literal_re().find_iter(contents) {
            let literal = found.as_str();
            let inner = literal[1..literal.len() - 1].trim();
            let html_ish = inner.starts_with('<') || inner.ends_with('>');
            if !html_ish || !Self::is_concat_operand(contents, found.start(), found.end()) {
                continue;
            }
            let line = lines.index_to_line_number(found.start());
            match merged.last_mut() {
                Some((last_line, _, end)) if *last_line == line => *end = found.end(),
                _ => merged.push((line, found.start(), found.end())),
            }
        }
        for (_, start, end) in merged {
            results.add_violation(Rule::JavascriptConcatHtml, Expression::new(start, Some(end)));
        }
    }

    fn is_concat_operand(contents: &str, start: usize, end: usize) -> bool {
        let before = contents[..start].trim_end().chars().next_back();
        let after = contents[end..].trim_start().chars().next();
        before == Some('+') || after == Some('+')
    }
}

impl Linter for JavaScriptLinter {
    fn line_comment_delim(&self) -> Option<&'static str> {
        Some(LINE_COMMENT_DELIM)
    }

    fn ruleset(&self) -> &RuleSet {
        &self.ruleset
    }

    fn applies_to(&self, path: &Path) -> bool {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default();
        name.ends_with(".js") && !name.ends_with(".min.js")
    }

    fn process_file(&self, path: &Path, contents: &str) -> FileResults {
        let mut results = FileResults::new(path.to_path_buf());
        self.check(contents, &mut results);
        results.prepare_results(contents, self.line_comment_delim());
        results
    }
}
