//! Rule taxonomy, violations and per-file result accumulation.
//!
//! Every detectable unsafe pattern across all five linters is a variant of
//! one flat [`Rule`] enum; per-linter [`RuleSet`]s are ordered slices of it,
//! combined via union when linters compose (the Mako linter's set contains
//! the JavaScript, Underscore and Python sets it delegates to).

use crate::expression::Expression;
use crate::utils::StringLines;
use serde::{Serialize, Serializer};
use std::path::PathBuf;

/// Marker recognized inside host-language comments to suppress findings.
pub const PRAGMA_MARKER: &str = "xss-lint: disable=";

/// One named category of unsafe pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Rule {
    MakoMissingDefault,
    MakoMultiplePageTags,
    MakoUnparseableExpression,
    MakoUnknownContext,
    MakoInvalidHtmlFilter,
    MakoUnwantedHtmlFilter,
    MakoInvalidJsFilter,
    MakoJsMissingQuotes,
    MakoJsHtmlString,
    MakoHtmlEntities,
    UnderscoreNotEscaped,
    JavascriptJqueryAppend,
    JavascriptJqueryPrepend,
    JavascriptJqueryInsertion,
    JavascriptJqueryInsertIntoTarget,
    JavascriptJqueryHtml,
    JavascriptConcatHtml,
    JavascriptEscape,
    PythonConcatHtml,
    PythonCustomEscape,
    PythonDeprecatedDisplayName,
    PythonInterpolateHtml,
    PythonParseError,
    PythonRequiresHtmlOrText,
    PythonCloseBeforeFormat,
    PythonWrapHtml,
    DjangoTransMissingEscape,
    DjangoTransInvalidEscapeFilter,
    DjangoTransEscapeVariableMismatch,
    DjangoBlocktransMissingEscapeFilter,
    DjangoBlocktransParseError,
    DjangoBlocktransEscapeFilterParseError,
    DjangoHtmlInterpolationMissing,
    DjangoHtmlInterpolationMissingSafeFilter,
    DjangoHtmlInterpolationInvalidTag,
}

impl Rule {
    /// Canonical rule id, as reported and as recognized by pragmas.
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::MakoMissingDefault => "mako-missing-default",
            Self::MakoMultiplePageTags => "mako-multiple-page-tags",
            Self::MakoUnparseableExpression => "mako-unparseable-expression",
            Self::MakoUnknownContext => "mako-unknown-context",
            Self::MakoInvalidHtmlFilter => "mako-invalid-html-filter",
            Self::MakoUnwantedHtmlFilter => "mako-unwanted-html-filter",
            Self::MakoInvalidJsFilter => "mako-invalid-js-filter",
            Self::MakoJsMissingQuotes => "mako-js-missing-quotes",
            Self::MakoJsHtmlString => "mako-js-html-string",
            Self::MakoHtmlEntities => "mako-html-entities",
            Self::UnderscoreNotEscaped => "underscore-not-escaped",
            Self::JavascriptJqueryAppend => "javascript-jquery-append",
            Self::JavascriptJqueryPrepend => "javascript-jquery-prepend",
            Self::JavascriptJqueryInsertion => "javascript-jquery-insertion",
            Self::JavascriptJqueryInsertIntoTarget => "javascript-jquery-insert-into-target",
            Self::JavascriptJqueryHtml => "javascript-jquery-html",
            Self::JavascriptConcatHtml => "javascript-concat-html",
            Self::JavascriptEscape => "javascript-escape",
            Self::PythonConcatHtml => "python-concat-html",
            Self::PythonCustomEscape => "python-custom-escape",
            Self::PythonDeprecatedDisplayName => "python-deprecated-display-name",
            Self::PythonInterpolateHtml => "python-interpolate-html",
            Self::PythonParseError => "python-parse-error",
            Self::PythonRequiresHtmlOrText => "python-requires-html-or-text",
            Self::PythonCloseBeforeFormat => "python-close-before-format",
            Self::PythonWrapHtml => "python-wrap-html",
            Self::DjangoTransMissingEscape => "django-trans-missing-escape",
            Self::DjangoTransInvalidEscapeFilter => "django-trans-invalid-escape-filter",
            Self::DjangoTransEscapeVariableMismatch => "django-trans-escape-variable-mismatch",
            Self::DjangoBlocktransMissingEscapeFilter => "django-blocktrans-missing-escape-filter",
            Self::DjangoBlocktransParseError => "django-blocktrans-parse-error",
            Self::DjangoBlocktransEscapeFilterParseError => {
                "django-blocktrans-escape-filter-parse-error"
            }
            Self::DjangoHtmlInterpolationMissing => "django-html-interpolation-missing",
            Self::DjangoHtmlInterpolationMissingSafeFilter => {
                "django-html-interpolation-missing-safe-filter"
            }
            Self::DjangoHtmlInterpolationInvalidTag => "django-html-interpolation-invalid-tag",
        }
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

/// An ordered, deduplicated registry of rules owned by a linter.
///
/// Built once at linter construction and treated as read-only thereafter.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// Builds a set from a linter's own rules, preserving order.
    #[must_use]
    pub fn new(rules: &[Rule]) -> Self {
        Self::default().combine(&Self {
            rules: rules.to_vec(),
        })
    }

    /// Ordered union of two sets: `self`'s rules first, then `other`'s rules
    /// not already present. Used when a linter composes sibling linters.
    #[must_use]
    pub fn combine(&self, other: &Self) -> Self {
        let mut rules = self.rules.clone();
        for rule in &other.rules {
            if !rules.contains(rule) {
                rules.push(*rule);
            }
        }
        Self { rules }
    }

    /// Whether the set contains `rule`.
    #[must_use]
    pub fn contains(&self, rule: Rule) -> bool {
        self.rules.contains(&rule)
    }

    /// The rules, in registration order.
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

/// One instance of a rule firing at a specific source location.
#[derive(Debug, Clone)]
pub struct RuleViolation {
    /// The rule that fired.
    pub rule: Rule,
    /// Where it fired.
    pub expression: Expression,
    /// Set during `prepare_results` when a suppression pragma covers it.
    pub is_disabled: bool,
    /// 1-indexed line, resolved during `prepare_results`.
    pub line: usize,
    /// 1-indexed column, resolved during `prepare_results`.
    pub column: usize,
}

impl RuleViolation {
    /// A violation pending location resolution.
    #[must_use]
    pub fn new(rule: Rule, expression: Expression) -> Self {
        Self {
            rule,
            expression,
            is_disabled: false,
            line: 0,
            column: 0,
        }
    }

    fn sort_key(&self) -> (usize, usize, &'static str) {
        (self.line, self.column, self.rule.id())
    }
}

/// Accumulates the violations found in one file.
#[derive(Debug, Clone)]
pub struct FileResults {
    /// Path of the scanned file (may be synthetic for embedded fragments).
    pub path: PathBuf,
    /// All violations, sorted by location after `prepare_results`.
    pub violations: Vec<RuleViolation>,
}

impl FileResults {
    /// An empty result set for `path`.
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            violations: Vec::new(),
        }
    }

    /// Records a violation. Location stays unresolved until
    /// `prepare_results`.
    pub fn add_violation(&mut self, rule: Rule, expression: Expression) {
        self.violations.push(RuleViolation::new(rule, expression));
    }

    /// Moves `other`'s violations into `self`, shifting every offset
    /// forward by `offset`. Used when a linter checked an embedded region
    /// (a `<script>` body, a Mako python block) extracted from the file.
    pub fn shift_and_merge(&mut self, offset: usize, other: Self) {
        for mut violation in other.violations {
            violation.expression.start_index += offset;
            if let Some(end) = violation.expression.end_index {
                violation.expression.end_index = Some(end + offset);
            }
            self.violations.push(violation);
        }
    }

    /// Like [`Self::shift_and_merge`], but for fragments whose text was
    /// rewritten before linting (dedented python): every offset is mapped
    /// individually back into this file's coordinates.
    pub fn merge_mapped(&mut self, other: Self, map: impl Fn(usize) -> usize) {
        for mut violation in other.violations {
            violation.expression.start_index = map(violation.expression.start_index);
            violation.expression.end_index = violation.expression.end_index.map(&map);
            self.violations.push(violation);
        }
    }

    /// Finalizes the result set: resolves line/column for every violation,
    /// applies suppression pragmas found in `source`, and sorts.
    ///
    /// Called exactly once per file, after all scanning is done.
    /// `line_comment_delim` is the host language's line-comment token; with
    /// `None`, pragma suppression is skipped entirely.
    pub fn prepare_results(&mut self, source: &str, line_comment_delim: Option<&str>) {
        let lines = StringLines::new(source);
        for violation in &mut self.violations {
            let start = violation.expression.start_index.min(source.len());
            violation.line = lines.index_to_line_number(start);
            violation.column = lines.index_to_column_number(source, start);
        }
        if let Some(delim) = line_comment_delim {
            self.check_violations_for_disabled(source, &lines, delim);
        }
        self.violations.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    }

    /// Count of violations not covered by a suppression pragma. This is the
    /// number a CI gate fails on; disabled violations still appear in the
    /// report with their flag set.
    #[must_use]
    pub fn enabled_violation_count(&self) -> usize {
        self.violations.iter().filter(|v| !v.is_disabled).count()
    }

    fn check_violations_for_disabled(&mut self, source: &str, lines: &StringLines, delim: &str) {
        for violation in &mut self.violations {
            if Self::is_violation_disabled(source, lines, violation, delim) {
                violation.is_disabled = true;
            }
        }
    }

    /// A pragma covers a violation when it appears on the violation's own
    /// line or the line immediately above. `mako-missing-default` is a
    /// whole-file rule, so any pragma line in the file suppresses it.
    fn is_violation_disabled(
        source: &str,
        lines: &StringLines,
        violation: &RuleViolation,
        delim: &str,
    ) -> bool {
        let rule_id = violation.rule.id();
        if violation.rule == Rule::MakoMissingDefault {
            return source
                .lines()
                .any(|line| pragma_rules_on_line(line, delim).contains(&rule_id));
        }
        let first_line = violation.line.saturating_sub(1).max(1);
        for line_number in first_line..=violation.line {
            let line = lines.line_number_to_line(source, line_number);
            if pragma_rules_on_line(line, delim).contains(&rule_id) {
                return true;
            }
        }
        false
    }
}

/// Extracts the rule ids listed in a `xss-lint: disable=` pragma on `line`,
/// if the pragma sits inside a comment opened by `delim`.
fn pragma_rules_on_line<'a>(line: &'a str, delim: &str) -> Vec<&'a str> {
    let Some(comment_start) = line.find(delim) else {
        return Vec::new();
    };
    let comment = &line[comment_start + delim.len()..];
    let Some(marker) = comment.find(PRAGMA_MARKER) else {
        return Vec::new();
    };
    let list = &comment[marker + PRAGMA_MARKER.len()..];
    let end = list
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == ',' || c == ' '))
        .unwrap_or(list.len());
    list[..end]
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .collect()
}
