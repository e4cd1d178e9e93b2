//! Tests for the raw JavaScript linter.
#![allow(clippy::unwrap_used)]

use std::path::Path;
use xsslint::linters::{JavaScriptLinter, Linter};
use xsslint::rules::FileResults;

fn lint(contents: &str) -> FileResults {
    JavaScriptLinter::default().process_file(Path::new("app.js"), contents)
}

fn rule_ids(results: &FileResults) -> Vec<&'static str> {
    results.violations.iter().map(|v| v.rule.id()).collect()
}

#[test]
fn test_append_with_markup_string() {
    let results = lint(r#"test.append("<div/>");"#);
    assert_eq!(rule_ids(&results), vec!["javascript-jquery-append"]);
}

#[test]
fn test_append_with_element_reference_is_clean() {
    for contents in [
        "container.append(itemEl);",
        "container.append($placeholder);",
        "container.append(view.$el);",
        "container.append(view.el);",
        "container.append(view.render().el);",
        "container.append();",
        r#"container.append("plain words");"#,
        r#"container.append($("<div/>"));"#,
        "container.append(HtmlUtils.HTML(snippet).toString());",
        "container.append(edx.HtmlUtils.joinHtml(a, b).toString());",
    ] {
        let results = lint(contents);
        assert!(results.violations.is_empty(), "flagged: {contents}");
    }
}

#[test]
fn test_append_with_concatenated_element_is_flagged() {
    let results = lint("container.append(view.el + markup);");
    assert_eq!(rule_ids(&results), vec!["javascript-jquery-append"]);
}

#[test]
fn test_prepend_gets_its_own_rule() {
    let results = lint("container.prepend(userHtml);");
    assert_eq!(rule_ids(&results), vec!["javascript-jquery-prepend"]);
}

#[test]
fn test_htmlutils_append_is_skipped() {
    let results = lint("HtmlUtils.append(target, markup);");
    assert!(results.violations.is_empty());
}

#[test]
fn test_insertion_family() {
    let results = lint(r#"row.after("<tr/>" );"#);
    assert_eq!(rule_ids(&results), vec!["javascript-jquery-insertion"]);
    let results = lint("row.replaceWith(newHtml);");
    assert_eq!(rule_ids(&results), vec!["javascript-jquery-insertion"]);
    let results = lint("row.wrap(wrapperEl);");
    assert!(results.violations.is_empty());
}

#[test]
fn test_insert_into_target_checks_caller() {
    let results = lint("fragmentHtml.appendTo(document.body);");
    assert_eq!(
        rule_ids(&results),
        vec!["javascript-jquery-insert-into-target"]
    );
    let results = lint("messageEl.appendTo(parent);");
    assert!(results.violations.is_empty());
    let results = lint("$spinner.insertAfter(anchor);");
    assert!(results.violations.is_empty());
}

#[test]
fn test_insert_into_target_with_constructor_caller_is_clean() {
    let results = lint("$('<div/>').appendTo(target);");
    assert!(results.violations.is_empty());
    let results = lint(r#"$("<li/>").addClass("item").prependTo(list);"#);
    assert!(results.violations.is_empty());
    let results = lint("fragment().appendTo(target);");
    assert_eq!(
        rule_ids(&results),
        vec!["javascript-jquery-insert-into-target"]
    );
}

#[test]
fn test_html_call_argument_taxonomy() {
    let results = lint(r#"div.html("<p>" + message + "</p>");"#);
    // The argument is flagged by .html() and the literals by the
    // concatenation check.
    assert!(rule_ids(&results).contains(&"javascript-jquery-html"));
    assert!(rule_ids(&results).contains(&"javascript-concat-html"));

    let results = lint("div.html('');");
    assert!(results.violations.is_empty());
    let results = lint("div.html();");
    assert!(results.violations.is_empty());
    let results = lint("div.html(HtmlUtils.HTML(safe).toString());");
    assert!(results.violations.is_empty());
    // Unlike append, a plain string is not acceptable here.
    let results = lint(r#"div.html("plain words");"#);
    assert_eq!(rule_ids(&results), vec!["javascript-jquery-html"]);
}

#[test]
fn test_unclosed_call_still_reported() {
    let results = lint("div.html(broken;");
    assert_eq!(rule_ids(&results), vec!["javascript-jquery-html"]);
    assert!(results.violations[0].expression.end_index.is_none());
}

#[test]
fn test_global_escape() {
    let results = lint("var encoded = escape(name);");
    assert_eq!(rule_ids(&results), vec!["javascript-escape"]);
    let results = lint("var encoded = window.escape(name);");
    assert_eq!(rule_ids(&results), vec!["javascript-escape"]);
    let results = lint("var encoded = _.escape(name);");
    assert!(results.violations.is_empty());
    let results = lint("var encoded = customescape(name);");
    assert!(results.violations.is_empty());
}

#[test]
fn test_concat_html_merges_per_line() {
    let results = lint(r#"var x = "<div>" + content + "</div>";"#);
    assert_eq!(rule_ids(&results), vec!["javascript-concat-html"]);

    let contents = "var a = \"<div>\" + one;\nvar b = \"<span>\" + two;\n";
    let results = lint(contents);
    assert_eq!(results.violations.len(), 2);
    assert_eq!(results.violations[0].line, 1);
    assert_eq!(results.violations[1].line, 2);
}

#[test]
fn test_plain_string_concat_is_clean() {
    let results = lint(r#"var x = "hello " + name;"#);
    assert!(results.violations.is_empty());
}

#[test]
fn test_embedded_underscore_template() {
    let results = lint(r#"var tpl = "<h1><%= title %></h1>";"#);
    assert!(rule_ids(&results).contains(&"underscore-not-escaped"));
}

#[test]
fn test_applies_to_skips_minified() {
    let linter = JavaScriptLinter::default();
    assert!(linter.applies_to(Path::new("static/app.js")));
    assert!(!linter.applies_to(Path::new("static/app.min.js")));
    assert!(!linter.applies_to(Path::new("static/app.coffee")));
}
