//! The language-specific linters.
//!
//! Each linter is an independent scanner over un-parsed text (the Python
//! linter additionally parses a real AST). Linters compose by holding
//! references to sibling linters, never by inheritance: a Python block
//! inside a Mako template is checked with exactly the same rules as a
//! standalone `.py` file.

pub mod base;
pub mod django;
pub mod javascript;
pub mod mako;
pub mod python;
pub mod underscore;

use crate::rules::{FileResults, RuleSet};
use std::path::Path;

pub use django::DjangoTemplateLinter;
pub use javascript::JavaScriptLinter;
pub use mako::MakoTemplateLinter;
pub use python::PythonLinter;
pub use underscore::UnderscoreTemplateLinter;

/// Common surface every language linter exposes to the driver.
pub trait Linter {
    /// The host language's line-comment token, used for pragma suppression.
    fn line_comment_delim(&self) -> Option<&'static str>;

    /// The rules this linter (including composed sub-linters) can raise.
    fn ruleset(&self) -> &RuleSet;

    /// Whether this linter wants to lint the file at `path`, judged from
    /// the extension and directory heuristics alone.
    fn applies_to(&self, path: &Path) -> bool;

    /// Lints already-decoded file contents into a finalized result set.
    fn process_file(&self, path: &Path, contents: &str) -> FileResults;
}

/// Template linters only activate for files under a templates directory.
pub(crate) fn is_in_templates_dir(path: &Path) -> bool {
    let normalized = path.to_string_lossy().replace('\\', "/");
    match normalized.rsplit_once('/') {
        Some((dir, _file)) => dir.contains("/templates/") || dir.ends_with("templates"),
        None => false,
    }
}

pub(crate) fn extension_is(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}
