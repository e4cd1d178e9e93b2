//! Directory walking and parallel dispatch across the template linters.

use crate::config::SkipMatcher;
use crate::linters::{
    DjangoTemplateLinter, JavaScriptLinter, Linter, MakoTemplateLinter, PythonLinter,
    UnderscoreTemplateLinter,
};
use crate::rules::FileResults;
use ignore::WalkBuilder;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Owns one instance of every linter and drives them over a file tree.
///
/// Linters are built once and shared immutably across worker threads; all
/// mutation happens in each file's own [`FileResults`].
#[derive(Debug, Default)]
pub struct Scanner {
    underscore: UnderscoreTemplateLinter,
    javascript: JavaScriptLinter,
    python: PythonLinter,
    mako: MakoTemplateLinter,
    django: DjangoTemplateLinter,
}

impl Scanner {
    fn linters(&self) -> [&(dyn Linter + Sync); 5] {
        [
            &self.underscore,
            &self.javascript,
            &self.python,
            &self.mako,
            &self.django,
        ]
    }

    /// Collects every lintable file under `roots`, pruning skipped
    /// directories before descent. Explicit file arguments are taken as-is.
    #[must_use]
    pub fn collect_files(&self, roots: &[PathBuf], skip: &SkipMatcher) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for root in roots {
            if root.is_file() {
                files.push(root.clone());
                continue;
            }
            let skip = skip.clone();
            let mut builder = WalkBuilder::new(root);
            builder
                .standard_filters(false)
                .filter_entry(move |entry| {
                    !entry.file_type().is_some_and(|t| t.is_dir()) || !skip.is_skipped(entry.path())
                });
            for entry in builder.build().flatten() {
                let path = entry.path();
                if entry.file_type().is_some_and(|t| t.is_file())
                    && self.linters().iter().any(|linter| linter.applies_to(path))
                {
                    files.push(path.to_path_buf());
                }
            }
        }
        // Overlapping roots would otherwise lint the same file twice.
        let mut seen = FxHashSet::default();
        files.retain(|path| seen.insert(path.clone()));
        files.sort();
        files
    }

    /// Lints every collected file in parallel. Files that cannot be read
    /// are reported to stderr and skipped rather than aborting the scan.
    #[must_use]
    pub fn scan(&self, roots: &[PathBuf], skip: &SkipMatcher) -> Vec<FileResults> {
        let files = self.collect_files(roots, skip);
        files
            .par_iter()
            .filter_map(|path| {
                let contents = match fs::read_to_string(path) {
                    Ok(contents) => contents,
                    Err(err) => {
                        eprintln!("xsslint: skipping {}: {err}", path.display());
                        return None;
                    }
                };
                Some(self.lint_file(path, &contents))
            })
            .filter(|results| !results.violations.is_empty())
            .collect()
    }

    /// Runs every applicable linter over one file and merges their findings.
    #[must_use]
    pub fn lint_file(&self, path: &Path, contents: &str) -> FileResults {
        let mut combined = FileResults::new(path.to_path_buf());
        for linter in self.linters() {
            if linter.applies_to(path) {
                let results = linter.process_file(path, contents);
                combined.violations.extend(results.violations);
            }
        }
        combined
            .violations
            .sort_by_key(|v| (v.line, v.column, v.rule.id()));
        combined
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::rules::Rule;

    #[test]
    fn test_lint_file_dispatches_by_path() {
        let scanner = Scanner::default();
        let results = scanner.lint_file(
            Path::new("static/foo.underscore"),
            "<div><%= user.name %></div>",
        );
        assert_eq!(results.violations.len(), 1);
        assert_eq!(results.violations[0].rule, Rule::UnderscoreNotEscaped);
    }

    #[test]
    fn test_lint_file_ignores_unmatched_extension() {
        let scanner = Scanner::default();
        let results = scanner.lint_file(Path::new("README.md"), "<%= anything %>");
        assert!(results.violations.is_empty());
    }
}
