//! Linter for Underscore.js templates.
//!
//! Underscore's `<%= ... %>` interpolation emits its value without HTML
//! escaping; `<%- ... %>` is the auto-escaping form. Any unescaped
//! interpolation is flagged unless the expression is a call known to
//! produce already-escaped output.

use crate::expression::Expression;
use crate::linters::{extension_is, Linter};
use crate::rules::{FileResults, Rule, RuleSet};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

static UNESCAPED_INTERPOLATION_RE: OnceLock<Regex> = OnceLock::new();

fn unescaped_interpolation_re() -> &'static Regex {
    UNESCAPED_INTERPOLATION_RE.get_or_init(|| {
        #[allow(clippy::unwrap_used)]
        Regex::new(r"(?s)<%=(.*?)%>").unwrap()
    })
}

/// Call prefixes whose output is known to be escaped/sanitized already.
const SAFE_CALL_PREFIXES: &[&str] = &["edx.HtmlUtils.", "HtmlUtils.", "_.escape("];

/// Linter for `.underscore` template files.
#[derive(Debug)]
pub struct UnderscoreTemplateLinter {
    ruleset: RuleSet,
}

impl Default for UnderscoreTemplateLinter {
    fn default() -> Self {
        Self {
            ruleset: RuleSet::new(&[Rule::UnderscoreNotEscaped]),
        }
    }
}

impl UnderscoreTemplateLinter {
    /// Scans `contents` for unescaped interpolations, appending violations
    /// to `results`. Shared by `.underscore` file processing and by the
    /// JavaScript linter for templates embedded in `.js` sources.
    pub fn check(&self, contents: &str, results: &mut FileResults) {
        for captures in unescaped_interpolation_re().captures_iter(contents) {
            #[allow(clippy::unwrap_used)]
            let whole = captures.get(0).unwrap();
            #[allow(clippy::unwrap_used)]
            let inner = captures.get(1).unwrap().as_str().trim();
            if !Self::is_safe_unescaped_expression(inner) {
                results.add_violation(
                    Rule::UnderscoreNotEscaped,
                    Expression::with_delims(whole.start(), Some(whole.end()), "<%=", "%>"),
                );
            }
        }
    }

    fn is_safe_unescaped_expression(expression: &str) -> bool {
        SAFE_CALL_PREFIXES
            .iter()
            .any(|prefix| expression.starts_with(prefix))
    }
}

impl Linter for UnderscoreTemplateLinter {
    fn line_comment_delim(&self) -> Option<&'static str> {
        Some("//")
    }

    fn ruleset(&self) -> &RuleSet {
        &self.ruleset
    }

    fn applies_to(&self, path: &Path) -> bool {
        extension_is(path, "underscore")
    }

    fn process_file(&self, path: &Path, contents: &str) -> FileResults {
        let mut results = FileResults::new(path.to_path_buf());
        self.check(contents, &mut results);
        results.prepare_results(contents, self.line_comment_delim());
        results
    }
}
