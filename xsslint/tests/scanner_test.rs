//! Tests for directory walking, dispatch and configuration.
#![allow(clippy::unwrap_used)]

use std::fs;
use std::path::Path;
use tempfile::TempDir;
use xsslint::config::XssLintConfig;
use xsslint::scanner::Scanner;

fn project_tempdir() -> TempDir {
    let mut target_dir = std::env::current_dir().unwrap();
    target_dir.push("target");
    target_dir.push("test-scanner-tmp");
    fs::create_dir_all(&target_dir).unwrap();
    tempfile::Builder::new()
        .prefix("scanner_test_")
        .tempdir_in(target_dir)
        .unwrap()
}

fn write(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

#[test]
fn test_collect_files_dispatch_and_skip_dirs() {
    let dir = project_tempdir();
    write(dir.path(), "lms/templates/index.html", "<div>${name}</div>\n");
    write(dir.path(), "static/app.js", "var e = escape(name);\n");
    write(dir.path(), "static/tpl.underscore", "<%= user.name %>\n");
    write(dir.path(), "lms/views.py", "msg = \"<p>\" + name\n");
    write(dir.path(), "lms/index.html", "not under templates\n");
    write(dir.path(), "node_modules/pkg/bad.js", "var e = escape(x);\n");
    write(dir.path(), "README.md", "prose\n");

    let scanner = Scanner::default();
    let skip = XssLintConfig::default().skip_matcher().unwrap();
    let files = scanner.collect_files(&[dir.path().to_path_buf()], &skip);

    let names: Vec<String> = files
        .iter()
        .map(|p| {
            p.strip_prefix(dir.path())
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/")
        })
        .collect();
    assert_eq!(
        names,
        vec![
            "lms/templates/index.html",
            "lms/views.py",
            "static/app.js",
            "static/tpl.underscore",
        ]
    );
}

#[test]
fn test_scan_reports_per_file_violations() {
    let dir = project_tempdir();
    write(dir.path(), "lms/templates/index.html", "<div>${name}</div>\n");
    write(dir.path(), "static/app.js", "var e = escape(name);\n");
    write(dir.path(), "static/clean.js", "var x = 1;\n");

    let scanner = Scanner::default();
    let skip = XssLintConfig::default().skip_matcher().unwrap();
    let all_results = scanner.scan(&[dir.path().to_path_buf()], &skip);

    // Clean files are dropped from the report.
    assert_eq!(all_results.len(), 2);
    let rules: Vec<&str> = all_results
        .iter()
        .flat_map(|r| r.violations.iter().map(|v| v.rule.id()))
        .collect();
    assert!(rules.contains(&"mako-missing-default"));
    assert!(rules.contains(&"javascript-escape"));
}

#[test]
fn test_explicit_file_argument_bypasses_walk() {
    let dir = project_tempdir();
    write(dir.path(), "node_modules/app.js", "var e = escape(name);\n");

    let scanner = Scanner::default();
    let skip = XssLintConfig::default().skip_matcher().unwrap();
    let file = dir.path().join("node_modules/app.js");
    let all_results = scanner.scan(&[file], &skip);
    assert_eq!(all_results.len(), 1);
}

#[test]
fn test_custom_skip_dirs() {
    let dir = project_tempdir();
    write(dir.path(), "generated/app.js", "var e = escape(name);\n");
    write(dir.path(), "src/app.js", "var e = escape(name);\n");

    let config = XssLintConfig {
        skip_dirs: vec!["generated".to_owned()],
    };
    let scanner = Scanner::default();
    let skip = config.skip_matcher().unwrap();
    let files = scanner.collect_files(&[dir.path().to_path_buf()], &skip);
    assert_eq!(files.len(), 1);
    assert!(files[0].ends_with("src/app.js"));
}

#[test]
fn test_overlapping_roots_lint_once() {
    let dir = project_tempdir();
    write(dir.path(), "static/app.js", "var e = escape(name);\n");

    let scanner = Scanner::default();
    let skip = XssLintConfig::default().skip_matcher().unwrap();
    let files = scanner.collect_files(
        &[
            dir.path().to_path_buf(),
            dir.path().join("static"),
        ],
        &skip,
    );
    assert_eq!(files.len(), 1);
}

#[test]
fn test_config_file_discovery() {
    let dir = project_tempdir();
    write(
        dir.path(),
        "xsslint.toml",
        "[xsslint]\nskip_dirs = [\"generated\"]\n",
    );
    write(dir.path(), "sub/deep/file.py", "x = 1\n");

    let config = XssLintConfig::load_from_path(&dir.path().join("sub/deep"));
    assert_eq!(config.skip_dirs, vec!["generated"]);

    let fallback = XssLintConfig::load_from_path(&dir.path().join("sub"));
    assert_eq!(fallback.skip_dirs, vec!["generated"]);
}

#[test]
fn test_malformed_config_does_not_fall_through_to_ancestors() {
    let dir = project_tempdir();
    write(
        dir.path(),
        "xsslint.toml",
        "[xsslint]\nskip_dirs = [\"outer\"]\n",
    );
    write(dir.path(), "inner/xsslint.toml", "[xsslint\nskip_dirs = ???\n");

    // The broken nearest config wins over the valid ancestor; the tool
    // reports it and runs with defaults instead of silently adopting
    // the outer settings.
    let config = XssLintConfig::load_from_path(&dir.path().join("inner"));
    assert_ne!(config.skip_dirs, vec!["outer".to_owned()]);
    assert!(config.skip_dirs.contains(&".git".to_owned()));
}
