use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use svrun_runner::{RunReport, Runner};
use svrun_sim::SimulatorKind;
use tracing::info;

/// svrun - SystemVerilog testbench runner
///
/// Drives external simulators (Verilator, VCS) against the tests declared
/// in a configuration file and reports pass/fail per test.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, default_value = "tests/svrun.toml")]
    config: PathBuf,

    /// Run one test by name, even if it is disabled
    #[arg(long, conflicts_with = "all")]
    test: Option<String>,

    /// Run all enabled tests
    #[arg(long)]
    all: bool,

    /// List available tests and exit
    #[arg(long)]
    list: bool,

    /// Remove build and waveform artifacts before running
    #[arg(long)]
    clean: bool,

    /// Only remove artifacts, then exit
    #[arg(long)]
    clean_only: bool,

    /// Open GTKWave on the waveform after a passing simulation
    #[arg(long)]
    view: bool,

    /// Simulator override for every selected test
    #[arg(long)]
    simulator: Option<SimulatorKind>,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let config = svrun_config::from_path(&cli.config)
        .with_context(|| format!("failed to load config {}", cli.config.display()))?;
    info!(config = %cli.config.display(), tests = config.tests.len(), "configuration loaded");

    if cli.list {
        list_tests(&config);
        return Ok(());
    }

    let project_root = std::env::current_dir().context("cannot determine project root")?;
    let mut runner = Runner::new(project_root, config, cli.simulator);

    if cli.clean || cli.clean_only {
        println!("🧹 Cleaning simulation artifacts...");
        match &cli.test {
            Some(name) => runner.clean_one(name)?,
            None => runner.clean_all(),
        }
        if cli.clean_only {
            return Ok(());
        }
    }

    // --all and the bare default both run every enabled test
    let report = match &cli.test {
        Some(name) => runner.run_one(name, cli.view).await?,
        None => {
            if !cli.all {
                info!("no selection given; running all enabled tests");
            }
            runner.run_all(cli.view).await
        }
    };

    if report.results.is_empty() {
        println!("No enabled tests found in config; use --list to see available tests");
        std::process::exit(1);
    }

    print!("{}", report.render());
    finish(&report)
}

fn list_tests(config: &svrun_config::ProjectConfig) {
    println!("\nAvailable tests:");
    println!("{}", "-".repeat(60));
    for test in &config.tests {
        let status = if test.enabled { '✓' } else { '✗' };
        let description = test.description.as_deref().unwrap_or("No description");
        println!("  {status} {:<20} - {description}", test.name);
    }
    println!();
}

fn finish(report: &RunReport) -> Result<()> {
    if report.all_passed() {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
