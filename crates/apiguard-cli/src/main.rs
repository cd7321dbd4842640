//! apiguard CLI
//!
//! Usage:
//!   apiguard check-config [--config FILE]      Validate config and load every rule/check
//!   apiguard rules                             List built-in rules and checks
//!   apiguard report <results.json> [--format]  Render a saved results file
//!   apiguard gate <results.json> [--config]    Apply thresholds; exit 1 on breach
//!
//! Suites themselves run from a harness binary via `apiguard_cli::run_harness`.

use anyhow::Result;
use apiguard_cli::{init_logging, load_config, read_results, ThresholdGate};
use apiguard_qc::{
    check_registry, rule_registry, GovernanceEngine, ReportFormat, Reporter, SecurityScanner,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "apiguard")]
#[command(about = "API test orchestration with governance and security gates", long_about = None)]
#[command(version)]
struct Cli {
    /// Log level when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a config file and instantiate every configured rule and check
    CheckConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// List the built-in governance rules and security checks
    Rules,
    /// Render a results file written with --output
    Report {
        results: PathBuf,

        #[arg(long, default_value = "console")]
        format: ReportFormat,
    },
    /// Apply the configured thresholds to a results file
    Gate {
        results: PathBuf,

        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);
    let cwd = std::env::current_dir()?;

    match cli.command {
        Commands::CheckConfig { config } => {
            let config = load_config(config.as_deref(), &cwd)?;
            let governance = GovernanceEngine::from_config(&config.governance, rule_registry())?;
            let security = SecurityScanner::from_config(&config.security, check_registry())?;
            println!("Config OK");
            println!("  timeout: {}ms, retries: {}, bail: {}", config.timeout, config.retries, config.bail);
            println!("  governance rules: {}", list(governance.rule_names()));
            println!("  security checks:  {}", list(security.check_names()));
        }
        Commands::Rules => {
            println!("Governance rules:");
            for name in rule_registry().names() {
                println!("  {}", name);
            }
            println!("Security checks:");
            for name in check_registry().names() {
                println!("  {}", name);
            }
        }
        Commands::Report { results, format } => {
            let results = read_results(&results)?;
            println!("{}", Reporter::new(format).generate(&results));
        }
        Commands::Gate { results, config } => {
            let results = read_results(&results)?;
            let config = load_config(config.as_deref(), &cwd)?;
            let outcome = ThresholdGate::new(config.thresholds).evaluate(&results);

            println!(
                "{} failed test(s), {} hook error(s), {} threshold breach(es)",
                outcome.failed_tests,
                outcome.hook_errors,
                outcome.breaches.len()
            );
            for breach in &outcome.breaches {
                println!("  - {}", breach);
            }
            if !outcome.passed() {
                std::process::exit(outcome.exit_code());
            }
            println!("Gate passed");
        }
    }

    Ok(())
}

fn list(names: Vec<&str>) -> String {
    if names.is_empty() {
        "(none)".to_string()
    } else {
        names.join(", ")
    }
}
