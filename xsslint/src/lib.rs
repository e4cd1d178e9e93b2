//! Static analysis for cross-site-scripting patterns in template-heavy
//! codebases.
//!
//! Five linters cover the template and source languages of a Django/Mako
//! web project: Mako templates, Django templates, Underscore.js templates,
//! raw JavaScript and raw Python. Each reports rule violations with
//! line/column locations, honoring `xss-lint: disable=` suppression
//! pragmas written in the host language's comments.

pub mod config;
pub mod expression;
pub mod linters;
pub mod output;
pub mod rules;
pub mod scanner;
pub mod utils;
