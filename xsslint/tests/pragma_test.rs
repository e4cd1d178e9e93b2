//! Tests for `xss-lint: disable=` suppression pragmas.
#![allow(clippy::unwrap_used)]

use std::path::Path;
use xsslint::linters::{
    JavaScriptLinter, Linter, MakoTemplateLinter, PythonLinter, UnderscoreTemplateLinter,
};
use xsslint::rules::FileResults;

fn assert_single_disabled(results: &FileResults) {
    assert_eq!(results.violations.len(), 1, "violation must stay listed");
    assert!(results.violations[0].is_disabled);
    assert_eq!(results.enabled_violation_count(), 0);
}

#[test]
fn test_pragma_on_preceding_line_javascript() {
    let contents = "// xss-lint: disable=javascript-escape\nvar e = escape(name);\n";
    let results = JavaScriptLinter::default().process_file(Path::new("app.js"), contents);
    assert_single_disabled(&results);
}

#[test]
fn test_pragma_on_same_line_javascript() {
    let contents = "var e = escape(name); // xss-lint: disable=javascript-escape\n";
    let results = JavaScriptLinter::default().process_file(Path::new("app.js"), contents);
    assert_single_disabled(&results);
}

#[test]
fn test_pragma_with_wrong_rule_does_not_suppress() {
    let contents = "// xss-lint: disable=javascript-concat-html\nvar e = escape(name);\n";
    let results = JavaScriptLinter::default().process_file(Path::new("app.js"), contents);
    assert_eq!(results.enabled_violation_count(), 1);
}

#[test]
fn test_pragma_two_lines_above_does_not_suppress() {
    let contents = "// xss-lint: disable=javascript-escape\n\nvar e = escape(name);\n";
    let results = JavaScriptLinter::default().process_file(Path::new("app.js"), contents);
    assert_eq!(results.enabled_violation_count(), 1);
}

#[test]
fn test_pragma_rule_list() {
    let contents = concat!(
        "// xss-lint: disable=javascript-escape,javascript-concat-html\n",
        "var e = escape(name) + \"<br/>\" + tail;\n"
    );
    let results = JavaScriptLinter::default().process_file(Path::new("app.js"), contents);
    assert_eq!(results.violations.len(), 2);
    assert_eq!(results.enabled_violation_count(), 0);
}

#[test]
fn test_pragma_in_python_comment() {
    let contents = "msg = \"<p>\" + name  # xss-lint: disable=python-concat-html\n";
    let results = PythonLinter::default().process_file(Path::new("app.py"), contents);
    assert_single_disabled(&results);
}

#[test]
fn test_pragma_in_underscore_comment() {
    let contents = "// xss-lint: disable=underscore-not-escaped\n<%= user.name %>\n";
    let results =
        UnderscoreTemplateLinter::default().process_file(Path::new("tpl.underscore"), contents);
    assert_single_disabled(&results);
}

#[test]
fn test_mako_missing_default_is_file_scoped() {
    // The violation reports at the top of the file, but the pragma can sit
    // anywhere.
    let contents = "<div>${name}</div>\n\n\n## xss-lint: disable=mako-missing-default\n";
    let results = MakoTemplateLinter::default()
        .process_file(Path::new("lms/templates/index.html"), contents);
    assert_single_disabled(&results);
}

#[test]
fn test_mako_expression_pragma_is_line_scoped() {
    let contents = concat!(
        "<%page expression_filter=\"h\"/>\n",
        "## xss-lint: disable=mako-unwanted-html-filter\n",
        "${message | h}\n",
        "${message | h}\n"
    );
    let results = MakoTemplateLinter::default()
        .process_file(Path::new("lms/templates/index.html"), contents);
    assert_eq!(results.violations.len(), 2);
    assert!(results.violations[0].is_disabled);
    assert!(!results.violations[1].is_disabled);
    assert_eq!(results.enabled_violation_count(), 1);
}
