//! Tests for the Django template linter.
#![allow(clippy::unwrap_used)]

use std::path::Path;
use xsslint::linters::{DjangoTemplateLinter, Linter};
use xsslint::rules::FileResults;

fn lint(contents: &str) -> FileResults {
    DjangoTemplateLinter::default().process_file(Path::new("lms/templates/index.html"), contents)
}

fn rule_ids(results: &FileResults) -> Vec<&'static str> {
    results.violations.iter().map(|v| v.rule.id()).collect()
}

#[test]
fn test_trans_captured_and_escaped_is_clean() {
    let results = lint(r#"{% trans "Welcome" as tmsg %}{{tmsg|force_escape}}"#);
    assert!(results.violations.is_empty());
}

#[test]
fn test_trans_without_capture() {
    let results = lint(r#"<h1>{% trans "Welcome" %}</h1>"#);
    assert_eq!(rule_ids(&results), vec!["django-trans-missing-escape"]);
}

#[test]
fn test_trans_captured_but_never_escaped() {
    let results = lint(r#"{% trans "Welcome" as tmsg %}<h1>title</h1>"#);
    assert_eq!(rule_ids(&results), vec!["django-trans-missing-escape"]);
}

#[test]
fn test_trans_escape_variable_mismatch() {
    let results = lint(r#"{% trans "Welcome" as tmsg %}{{msg|force_escape}}"#);
    assert_eq!(
        rule_ids(&results),
        vec!["django-trans-escape-variable-mismatch"]
    );
}

#[test]
fn test_trans_invalid_escape_filter() {
    let results = lint(r#"{% trans "Welcome" as tmsg %}{{tmsg|escape}}"#);
    assert_eq!(rule_ids(&results), vec!["django-trans-invalid-escape-filter"]);
}

#[test]
fn test_trans_with_placeholder_requires_interpolation() {
    let results = lint(r#"{% trans "Hello {name}" as tmsg %}{{tmsg|force_escape}}"#);
    assert_eq!(
        rule_ids(&results),
        vec!["django-html-interpolation-missing"]
    );

    let contents = concat!(
        r#"{% trans "Hello {name}" as tmsg %}"#,
        "\n",
        r"{% interpolate_html tmsg name=username %}",
        "\n"
    );
    let results = lint(contents);
    assert!(results.violations.is_empty());
}

#[test]
fn test_interpolation_tag_referencing_other_variable_does_not_count() {
    let contents = concat!(
        r#"{% trans "Hello {name}" as tmsg %}"#,
        "\n",
        r"{% interpolate_html othermsg name=username %}",
        "\n"
    );
    let results = lint(contents);
    assert_eq!(
        rule_ids(&results),
        vec!["django-html-interpolation-missing"]
    );
}

#[test]
fn test_interpolation_markup_kwargs_need_safe() {
    let results =
        lint(r"{% interpolate_html tmsg start_tag='<b>'|safe end_tag='</b>'|safe %}");
    assert!(results.violations.is_empty());

    let results = lint(r"{% interpolate_html tmsg start_tag='<b>' %}");
    assert_eq!(
        rule_ids(&results),
        vec!["django-html-interpolation-missing-safe-filter"]
    );
}

#[test]
fn test_interpolation_invalid_tag() {
    let results = lint(r"{% interpolate_html start_tag='<b>'|safe %}");
    assert_eq!(
        rule_ids(&results),
        vec!["django-html-interpolation-invalid-tag"]
    );

    let results = lint(r"{% interpolate_html tmsg start_tag=<b> %}");
    assert_eq!(
        rule_ids(&results),
        vec!["django-html-interpolation-invalid-tag"]
    );
}

#[test]
fn test_blocktrans_wrapped_in_force_escape_is_clean() {
    let contents = concat!(
        r"{% filter force_escape %}",
        r"{% blocktrans %}Hello {name}{% endblocktrans %}",
        r"{% endfilter %}"
    );
    let results = lint(contents);
    assert!(results.violations.is_empty());
}

#[test]
fn test_blocktrans_without_wrapper() {
    let results = lint(r"{% blocktrans %}Hello{% endblocktrans %}");
    assert_eq!(
        rule_ids(&results),
        vec!["django-blocktrans-missing-escape-filter"]
    );
}

#[test]
fn test_blocktrans_with_wrong_filter() {
    let contents = concat!(
        r"{% filter lower %}",
        r"{% blocktrans %}Hello{% endblocktrans %}",
        r"{% endfilter %}"
    );
    let results = lint(contents);
    assert_eq!(
        rule_ids(&results),
        vec!["django-blocktrans-missing-escape-filter"]
    );
}

#[test]
fn test_blocktrans_missing_endfilter() {
    let contents = concat!(
        r"{% filter force_escape %}",
        r"{% blocktrans %}Hello{% endblocktrans %}"
    );
    let results = lint(contents);
    assert_eq!(
        rule_ids(&results),
        vec!["django-blocktrans-missing-escape-filter"]
    );
}

#[test]
fn test_blocktrans_unterminated() {
    let results = lint(r"{% filter force_escape %}{% blocktrans %}Hello");
    assert_eq!(rule_ids(&results), vec!["django-blocktrans-parse-error"]);
}

#[test]
fn test_blocktrans_empty_filter_tag() {
    let contents = concat!(
        r"{% filter %}",
        r"{% blocktrans %}Hello{% endblocktrans %}",
        r"{% endfilter %}"
    );
    let results = lint(contents);
    assert_eq!(
        rule_ids(&results),
        vec!["django-blocktrans-escape-filter-parse-error"]
    );
}

#[test]
fn test_tags_inside_comments_are_ignored() {
    let contents = concat!(
        r"{% comment %}",
        "\n",
        r#"{% trans "Welcome" %}"#,
        "\n",
        r"{% blocktrans %}Hello{% endblocktrans %}",
        "\n",
        r"{% endcomment %}",
        "\n"
    );
    let results = lint(contents);
    assert!(results.violations.is_empty());
}

#[test]
fn test_unclosed_comment_swallows_rest_of_file() {
    let contents = concat!(r"{% comment %}", "\n", r#"{% trans "Welcome" %}"#, "\n");
    let results = lint(contents);
    assert!(results.violations.is_empty());
}

#[test]
fn test_file_without_django_tags_is_skipped() {
    let results = lint("<div>${name}</div>\n");
    assert!(results.violations.is_empty());
}

#[test]
fn test_applies_to_templates_dirs_only() {
    let linter = DjangoTemplateLinter::default();
    assert!(linter.applies_to(Path::new("lms/templates/index.html")));
    assert!(!linter.applies_to(Path::new("lms/static/index.html")));
}
