//! Configuration loading.
//!
//! Settings live in an `xsslint.toml` found by walking up from the scan
//! root, so running the tool anywhere inside a project picks up the
//! project's file. An explicit `--config` path bypasses the walk.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the configuration file searched for in ancestor directories.
pub const CONFIG_FILENAME: &str = "xsslint.toml";

/// Directories never worth descending into.
fn default_skip_dirs() -> Vec<String> {
    [
        ".git",
        ".tox",
        "node_modules",
        "vendor",
        "test_root",
        "reports",
        "spec",
        "common/static/bundles",
    ]
    .iter()
    .map(|&s| s.to_owned())
    .collect()
}

#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    xsslint: XssLintConfig,
}

/// The `[xsslint]` table of `xsslint.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct XssLintConfig {
    /// Directory names, path fragments or glob patterns to prune while
    /// walking.
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,
}

impl Default for XssLintConfig {
    fn default() -> Self {
        Self {
            skip_dirs: default_skip_dirs(),
        }
    }
}

impl XssLintConfig {
    /// Loads the nearest `xsslint.toml` at or above `path`, falling back to
    /// defaults when none exists. A found but unreadable or malformed file
    /// is reported on stderr and stops the walk, so a typo in the project
    /// config cannot silently hand control to an ancestor's settings.
    #[must_use]
    pub fn load_from_path(path: &Path) -> Self {
        let mut current = path.to_path_buf();
        if current.is_file() {
            current.pop();
        }
        loop {
            let config_toml = current.join(CONFIG_FILENAME);
            if config_toml.exists() {
                match Self::load_file(&config_toml) {
                    Ok(config) => return config,
                    Err(err) => {
                        eprintln!("xsslint: {err:#}; falling back to defaults");
                        return Self::default();
                    }
                }
            }
            if !current.pop() {
                break;
            }
        }
        Self::default()
    }

    /// Loads an explicitly named config file. Unlike the ancestor walk,
    /// a missing or malformed file here is the user's problem to hear about.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: ConfigFile = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config.xsslint)
    }

    /// Compiles the skip list into a matcher usable during the walk.
    ///
    /// # Errors
    ///
    /// Returns an error if a skip entry is an invalid glob pattern.
    pub fn skip_matcher(&self) -> Result<SkipMatcher> {
        let mut fragments = Vec::new();
        let mut globs = GlobSetBuilder::new();
        for entry in &self.skip_dirs {
            if entry.contains(['*', '?', '[', '{']) {
                globs.add(
                    Glob::new(entry)
                        .with_context(|| format!("invalid skip_dirs pattern `{entry}`"))?,
                );
            } else {
                fragments.push(entry.replace('\\', "/"));
            }
        }
        Ok(SkipMatcher {
            fragments,
            globs: globs.build()?,
        })
    }
}

/// Decides which directories the walker prunes.
///
/// Plain entries match as path fragments (`node_modules` skips every
/// directory of that name anywhere; `common/static/bundles` only that
/// subtree); entries with glob metacharacters match as globs.
#[derive(Debug, Clone)]
pub struct SkipMatcher {
    fragments: Vec<String>,
    globs: GlobSet,
}

impl SkipMatcher {
    /// Whether the directory at `path` should be pruned.
    #[must_use]
    pub fn is_skipped(&self, path: &Path) -> bool {
        let normalized = path.to_string_lossy().replace('\\', "/");
        self.fragments.iter().any(|fragment| {
            normalized.ends_with(&format!("/{fragment}"))
                || normalized.contains(&format!("/{fragment}/"))
                || normalized == *fragment
        }) || self.globs.is_match(path)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_defaults_prune_common_noise() {
        let matcher = XssLintConfig::default().skip_matcher().unwrap();
        assert!(matcher.is_skipped(Path::new("frontend/node_modules")));
        assert!(matcher.is_skipped(Path::new("a/node_modules/pkg")));
        assert!(!matcher.is_skipped(Path::new("lms/templates")));
    }

    #[test]
    fn test_fragment_must_match_whole_components() {
        let config = XssLintConfig {
            skip_dirs: vec!["spec".to_owned()],
        };
        let matcher = config.skip_matcher().unwrap();
        assert!(matcher.is_skipped(Path::new("js/spec")));
        assert!(!matcher.is_skipped(Path::new("js/inspection")));
    }

    #[test]
    fn test_glob_entries() {
        let config = XssLintConfig {
            skip_dirs: vec!["**/build-*".to_owned()],
        };
        let matcher = config.skip_matcher().unwrap();
        assert!(matcher.is_skipped(Path::new("out/build-debug")));
        assert!(!matcher.is_skipped(Path::new("out/build")));
    }

    #[test]
    fn test_toml_parsing() {
        let config: ConfigFile =
            toml::from_str("[xsslint]\nskip_dirs = [\"generated\"]\n").unwrap();
        assert_eq!(config.xsslint.skip_dirs, vec!["generated"]);
        let empty: ConfigFile = toml::from_str("").unwrap();
        assert!(!empty.xsslint.skip_dirs.is_empty());
    }
}
