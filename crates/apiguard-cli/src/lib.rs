//! apiguard-cli: command-line harness for apiguard suites
//!
//! Suites are Rust code, so the runnable entry point is a library call: a
//! harness binary registers its suites and hands them to [`run_harness`],
//! which parses the usual flags, loads the config, runs everything against
//! the real HTTP transport, prints a report and returns the exit code.
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = SuiteRegistry::new();
//!     users::register(&mut registry).expect("suites register");
//!     std::process::exit(apiguard_cli::run_harness(registry).await);
//! }
//! ```

pub mod gate;
pub mod git;
pub mod logging;

pub use gate::{Breach, GateOutcome, ThresholdGate};
pub use logging::init_logging;

use anyhow::{Context, Result};
use apiguard_http::{HttpClient, HttpClientConfig};
use apiguard_qc::{ReportFormat, Reporter, RunConfig, RunResults, SuiteRegistry, TestRunner};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Config files looked up in the working directory, in order
pub const CONFIG_FILES: &[&str] = &[
    "apiguard.config.yaml",
    "apiguard.config.yml",
    "apiguard.config.json",
    "apiguard.config.toml",
];

/// Flags understood by a suite harness
#[derive(Parser, Debug, Clone)]
#[command(name = "apiguard", about = "Run apiguard API test suites", long_about = None)]
pub struct RunArgs {
    /// Config file (default: apiguard.config.{yaml,yml,json,toml} in the working directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Stop on first failure
    #[arg(long)]
    pub bail: bool,

    /// Only run tests with this tag (repeatable)
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Filter tests by name (case-insensitive)
    #[arg(short = 'k', long)]
    pub pattern: Option<String>,

    /// Base URL for relative request paths (overrides the config)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Write the JSON results to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Report printed to stdout: console, json, markdown or junit
    #[arg(long, default_value = "console")]
    pub format: ReportFormat,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// First known config file in `dir`
pub fn discover_config(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

/// Load the explicit config, else a discovered one, else defaults
pub fn load_config(explicit: Option<&Path>, dir: &Path) -> Result<RunConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => discover_config(dir),
    };
    match path {
        Some(path) => {
            info!(path = %path.display(), "loading config");
            RunConfig::from_path(&path)
                .with_context(|| format!("Failed to load config {}", path.display()))
        }
        None => {
            info!("no config file found; using defaults");
            Ok(RunConfig::default())
        }
    }
}

/// Read a results file written with `--output`
pub fn read_results(path: &Path) -> Result<RunResults> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a results file", path.display()))
}

/// Parse the process arguments, run `registry` and return the exit code
pub async fn run_harness(registry: SuiteRegistry) -> i32 {
    let args = RunArgs::parse();
    init_logging(&args.log_level);
    match execute(args, &registry).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{:#}", e), "run aborted");
            eprintln!("Error: {:#}", e);
            1
        }
    }
}

/// Run `registry` with already-parsed arguments and return the exit code
pub async fn execute(args: RunArgs, registry: &SuiteRegistry) -> Result<i32> {
    let cwd = std::env::current_dir().context("Failed to read working directory")?;
    let mut config = load_config(args.config.as_deref(), &cwd)?;
    if args.bail {
        config.bail = true;
    }
    if let Some(base_url) = args.base_url.clone() {
        config.base_url = Some(base_url);
    }

    let client = HttpClient::new(HttpClientConfig::new().timeout_ms(config.timeout))
        .context("Failed to build HTTP client")?;
    let mut runner = TestRunner::from_run_config(&config, Arc::new(client))?;
    runner.config_mut().tags = args.tags.clone();
    runner.config_mut().name_pattern = args.pattern.clone();
    if let Some(git) = git::git_info(&cwd) {
        runner.collector().set_git_info(git);
    }

    let results = runner.run(registry).await;

    println!("{}", Reporter::new(args.format).generate(&results));

    if let Some(output) = &args.output {
        let json = serde_json::to_string_pretty(&results)?;
        std::fs::write(output, json)
            .with_context(|| format!("Failed to write {}", output.display()))?;
        info!(path = %output.display(), "results written");
    }

    let outcome = ThresholdGate::new(config.thresholds.clone()).evaluate(&results);
    for breach in &outcome.breaches {
        warn!(%breach, "threshold exceeded");
    }
    Ok(outcome.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_order() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(discover_config(dir.path()), None);

        std::fs::write(dir.path().join("apiguard.config.toml"), "timeout = 500\n").unwrap();
        std::fs::write(dir.path().join("apiguard.config.yaml"), "timeout: 700\n").unwrap();
        assert_eq!(
            discover_config(dir.path()),
            Some(dir.path().join("apiguard.config.yaml"))
        );

        let config = load_config(None, dir.path()).unwrap();
        assert_eq!(config.timeout, 700);

        let explicit = dir.path().join("apiguard.config.toml");
        let config = load_config(Some(&explicit), dir.path()).unwrap();
        assert_eq!(config.timeout, 500);
    }

    #[test]
    fn test_defaults_without_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(None, dir.path()).unwrap();
        assert_eq!(config, RunConfig::default());
    }

    #[test]
    fn test_bad_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apiguard.config.json");
        std::fs::write(&path, "{ \"timeout\": 0 }").unwrap();
        let err = load_config(None, dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("timeout must be greater than 0"));
    }

    #[test]
    fn test_flag_parsing() {
        let args = RunArgs::try_parse_from([
            "apiguard", "--bail", "--tag", "smoke", "--tag", "users", "-k", "create", "--format",
            "junit",
        ])
        .unwrap();
        assert!(args.bail);
        assert_eq!(args.tags, vec!["smoke", "users"]);
        assert_eq!(args.pattern.as_deref(), Some("create"));
        assert_eq!(args.format, ReportFormat::JUnit);
        assert_eq!(args.log_level, "info");
    }
}
