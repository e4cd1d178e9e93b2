//! Binary entry point for the XSS linter.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

use xsslint::config::XssLintConfig;
use xsslint::output::{print_json_report, print_report, ScanSummary};
use xsslint::scanner::Scanner;

/// Command line interface configuration using `clap`.
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "xsslint - XSS static analysis for Mako, Django and Underscore templates, JavaScript and Python"
)]
struct Cli {
    /// Paths to scan (files or directories).
    /// When no paths are provided, defaults to the current directory.
    #[arg(default_value = ".")]
    paths: Vec<PathBuf>,

    /// Output raw JSON.
    #[arg(long)]
    json: bool,

    /// Additional directory names or globs to skip while walking.
    #[arg(long = "skip-dir")]
    skip_dirs: Vec<String>,

    /// Explicit configuration file (defaults to the nearest `xsslint.toml`
    /// at or above the first scan path).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    match run() {
        Ok(exit) => exit,
        Err(err) => {
            eprintln!("xsslint: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => XssLintConfig::load_file(path)?,
        None => {
            let first = cli
                .paths
                .first()
                .cloned()
                .unwrap_or_else(|| PathBuf::from("."));
            XssLintConfig::load_from_path(&first)
        }
    };
    config.skip_dirs.extend(cli.skip_dirs.iter().cloned());
    let skip = config.skip_matcher()?;

    let scanner = Scanner::default();
    let all_results = scanner.scan(&cli.paths, &skip);

    let stdout = std::io::stdout();
    let mut writer = stdout.lock();
    if cli.json {
        print_json_report(&mut writer, &all_results)?;
    } else {
        print_report(&mut writer, &all_results)?;
    }

    let summary = ScanSummary::from_results(&all_results);
    if summary.enabled_violations() > 0 {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
