//! # compliance-search CLI entry point
//!
//! Loads a scenario file and runs the producer compliance search, writing
//! results as JSON.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use compliance_search_core_rs::models::option::ConsumerResponse;
use compliance_search_core_rs::{CompositeVehicleCache, Scenario, ScenarioConfig};

/// Producer compliance search runner
#[derive(Parser, Debug)]
#[command(name = "compliance-search", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Scenario JSON file
    #[arg(long, global = true, default_value = "scenario.json")]
    scenario: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Search one manufacturer and year.
    Search(SearchArgs),

    /// Search and finalize consecutive years.
    Run(RunArgs),

    /// Validate the scenario and print its search settings fingerprint.
    Check,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Compliance id (manufacturer)
    #[arg(long)]
    compliance_id: String,

    /// Calendar year to search
    #[arg(long)]
    year: i32,

    /// Consumer response JSON file; shares are inherited from it
    #[arg(long)]
    consumer_response: Option<PathBuf>,

    /// Producer–consumer iteration number recorded in diagnostics
    #[arg(long, default_value_t = 0)]
    iteration: usize,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Compliance id (manufacturer)
    #[arg(long)]
    compliance_id: String,

    /// First calendar year
    #[arg(long)]
    start_year: i32,

    /// Last calendar year (inclusive)
    #[arg(long)]
    end_year: i32,

    #[command(flatten)]
    output: OutputArgs,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Write the result here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Write diagnostics events here as JSON lines
    #[arg(long)]
    diagnostics: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let scenario = load_scenario(&cli.scenario)?;

    match &cli.command {
        Commands::Search(args) => run_search(&scenario, args),
        Commands::Run(args) => run_years(&scenario, args),
        Commands::Check => {
            let fingerprint = scenario.config().search.fingerprint()?;
            println!("{fingerprint}");
            Ok(())
        }
    }
}

fn load_scenario(path: &Path) -> Result<Scenario> {
    let config = ScenarioConfig::load(path)
        .with_context(|| format!("loading scenario {}", path.display()))?;
    tracing::debug!(scenario = %path.display(), "scenario loaded");
    Ok(config.compile()?)
}

fn run_search(scenario: &Scenario, args: &SearchArgs) -> Result<()> {
    let response: Option<ConsumerResponse> = match &args.consumer_response {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading consumer response {}", path.display()))?;
            Some(serde_json::from_str(&text)?)
        }
        None => None,
    };

    let mut cache = CompositeVehicleCache::new();
    let mut log = scenario.search()?.new_log()?;
    let outcome = scenario.search_year(
        &mut cache,
        &mut log,
        &args.compliance_id,
        args.year,
        response.as_ref(),
        args.iteration,
    )?;

    write_json(&args.output.output, &serde_json::to_string_pretty(&outcome)?)?;
    if let Some(path) = &args.output.diagnostics {
        std::fs::write(path, log.to_json_lines()?)
            .with_context(|| format!("writing diagnostics {}", path.display()))?;
    }
    Ok(())
}

fn run_years(scenario: &Scenario, args: &RunArgs) -> Result<()> {
    if args.end_year < args.start_year {
        bail!(
            "end year {} is before start year {}",
            args.end_year,
            args.start_year
        );
    }

    let run = scenario.run_analysis(&args.compliance_id, args.start_year..=args.end_year)?;
    for year in &run.years {
        tracing::info!(
            calendar_year = year.calendar_year,
            compliance_ratio = year.outcome.selected_decision.strategic_compliance_ratio,
            converged = year.outcome.converged,
            "year complete"
        );
    }

    write_json(&args.output.output, &serde_json::to_string_pretty(&run.years)?)?;
    if let Some(path) = &args.output.diagnostics {
        std::fs::write(path, run.log.to_json_lines()?)
            .with_context(|| format!("writing diagnostics {}", path.display()))?;
    }
    Ok(())
}

fn write_json(output: &Option<PathBuf>, json: &str) -> Result<()> {
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("writing {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parse_search() {
        let cli = Cli::try_parse_from([
            "compliance-search",
            "--scenario",
            "s.json",
            "search",
            "--compliance-id",
            "OEM_A",
            "--year",
            "2021",
        ])
        .unwrap();
        assert_eq!(cli.scenario, PathBuf::from("s.json"));
        match cli.command {
            Commands::Search(args) => {
                assert_eq!(args.compliance_id, "OEM_A");
                assert_eq!(args.year, 2021);
                assert_eq!(args.iteration, 0);
                assert!(args.consumer_response.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn cli_parse_run_with_verbosity() {
        let cli = Cli::try_parse_from([
            "compliance-search",
            "-vv",
            "run",
            "--compliance-id",
            "OEM_A",
            "--start-year",
            "2021",
            "--end-year",
            "2023",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Run(_)));
    }
}
