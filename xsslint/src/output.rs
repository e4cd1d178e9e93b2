//! Report rendering.
//!
//! Human output groups violations per file with `line:col` locations;
//! `--json` emits the same data as a machine-readable document.

use crate::rules::{FileResults, Rule};
use colored::Colorize;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct JsonViolation {
    rule: Rule,
    line: usize,
    column: usize,
    disabled: bool,
}

#[derive(Serialize)]
struct JsonFile {
    path: String,
    violations: Vec<JsonViolation>,
}

#[derive(Serialize)]
struct JsonReport {
    files: Vec<JsonFile>,
    total: usize,
    disabled: usize,
}

/// Counts across a whole scan.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScanSummary {
    /// Files carrying at least one violation.
    pub files_with_violations: usize,
    /// All violations, suppressed ones included.
    pub total_violations: usize,
    /// Violations covered by a suppression pragma.
    pub disabled_violations: usize,
}

impl ScanSummary {
    /// Tallies `all_results`.
    #[must_use]
    pub fn from_results(all_results: &[FileResults]) -> Self {
        let mut summary = Self::default();
        for results in all_results {
            if !results.violations.is_empty() {
                summary.files_with_violations += 1;
            }
            summary.total_violations += results.violations.len();
            summary.disabled_violations += results
                .violations
                .iter()
                .filter(|v| v.is_disabled)
                .count();
        }
        summary
    }

    /// Violations a CI gate should fail on.
    #[must_use]
    pub fn enabled_violations(&self) -> usize {
        self.total_violations - self.disabled_violations
    }
}

/// Prints the grouped human-readable report.
///
/// # Errors
///
/// Returns an error if writing to `writer` fails.
pub fn print_report(writer: &mut impl Write, all_results: &[FileResults]) -> std::io::Result<()> {
    let summary = ScanSummary::from_results(all_results);
    if summary.total_violations == 0 {
        writeln!(writer, "{}", "No XSS issues found.".green())?;
        return Ok(());
    }
    for results in all_results {
        if results.violations.is_empty() {
            continue;
        }
        writeln!(writer, "{}", results.path.display().to_string().cyan().bold())?;
        for violation in &results.violations {
            let location = format!("{}:{}", violation.line, violation.column);
            let rule_id = if violation.is_disabled {
                format!("{} {}", violation.rule.id().yellow(), "(disabled)".dimmed())
            } else {
                violation.rule.id().red().to_string()
            };
            writeln!(writer, "  {location:>10}  {rule_id}")?;
        }
        writeln!(writer)?;
    }
    writeln!(
        writer,
        "{} violation(s) in {} file(s), {} suppressed by pragma",
        summary.total_violations.to_string().bold(),
        summary.files_with_violations,
        summary.disabled_violations
    )?;
    Ok(())
}

/// Prints the report as JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn print_json_report(
    writer: &mut impl Write,
    all_results: &[FileResults],
) -> anyhow::Result<()> {
    let summary = ScanSummary::from_results(all_results);
    let report = JsonReport {
        files: all_results
            .iter()
            .filter(|results| !results.violations.is_empty())
            .map(|results| JsonFile {
                path: results.path.to_string_lossy().replace('\\', "/"),
                violations: results
                    .violations
                    .iter()
                    .map(|v| JsonViolation {
                        rule: v.rule,
                        line: v.line,
                        column: v.column,
                        disabled: v.is_disabled,
                    })
                    .collect(),
            })
            .collect(),
        total: summary.total_violations,
        disabled: summary.disabled_violations,
    };
    serde_json::to_writer_pretty(&mut *writer, &report)?;
    writeln!(writer)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::expression::Expression;
    use std::path::PathBuf;

    fn sample_results() -> Vec<FileResults> {
        let mut results = FileResults::new(PathBuf::from("lms/static/app.js"));
        results.add_violation(Rule::JavascriptEscape, Expression::new(0, Some(7)));
        results.prepare_results("escape(x);\n", Some("//"));
        vec![results]
    }

    #[test]
    fn test_summary_counts() {
        let summary = ScanSummary::from_results(&sample_results());
        assert_eq!(summary.files_with_violations, 1);
        assert_eq!(summary.total_violations, 1);
        assert_eq!(summary.enabled_violations(), 1);
    }

    #[test]
    fn test_report_mentions_rule_and_location() {
        let mut out = Vec::new();
        print_report(&mut out, &sample_results()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("lms/static/app.js"));
        assert!(text.contains("1:1"));
        assert!(text.contains("javascript-escape"));
    }

    #[test]
    fn test_json_report_shape() {
        let mut out = Vec::new();
        print_json_report(&mut out, &sample_results()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["total"], 1);
        assert_eq!(value["files"][0]["violations"][0]["rule"], "javascript-escape");
    }
}
