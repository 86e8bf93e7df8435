//! CLI binary for the co-infection classification stage

use clap::Parser;
use env_logger::Env;
use minvar_rs::{
    filter::AnalysisResult,
    report::run_report,
    utils::{validate_file_readable, Timer},
    MinvarError, MinvarResult, PopulationPolicy, ReportConfig,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "coinfection_report")]
#[command(about = "Comparative co-infection analysis between samples")]
#[command(long_about = "
Reads the JSON document produced by minor_vars, counts minority mutations
per sample and classifies as co-infection candidates the samples whose
count exceeds mean + N standard deviations (or a hard cutoff).

For every candidate, a CSV table cross-references each of its minority
mutations against all other samples' calls at that position. A
distribution.tsv file with the per-sample counts is written alongside.
")]
struct Args {
    /// JSON file created by minor_vars
    #[arg(long, value_name = "FILE")]
    data: PathBuf,

    /// Output directory for the candidate tables
    #[arg(long, value_name = "DIR", default_value = "./results")]
    out_dir: PathBuf,

    /// Candidates exceed the mean by this many standard deviations.
    /// Ignored when --min-lowfreq is set
    #[arg(long, default_value_t = 2.0)]
    deviation_lowfreq: f64,

    /// Hard minority-variant count used as the cutoff instead of the
    /// statistical one. Useful on known sample sets, or when all samples
    /// are expected to be candidates
    #[arg(long)]
    min_lowfreq: Option<u32>,

    /// Count samples without minority mutations as zero-count members of
    /// the cutoff population instead of omitting them
    #[arg(long)]
    include_zero_counts: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

fn run() -> MinvarResult<()> {
    let args = Args::parse();

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_timestamp_secs()
        .init();

    validate_file_readable(&args.data)?;

    let config = ReportConfig {
        deviation_lowfreq: args.deviation_lowfreq,
        min_lowfreq: args.min_lowfreq,
        population: if args.include_zero_counts {
            PopulationPolicy::IncludeZeroCounts
        } else {
            PopulationPolicy::ObservedOnly
        },
    };
    config.validate()?;

    let _timer = Timer::new("Co-infection classification");
    let result = AnalysisResult::load(&args.data)?;
    let report = run_report(&result, &config, &args.out_dir)?;

    println!(
        "Report complete: {} candidate(s) were processed",
        report.candidates.len()
    );
    for candidate in &report.candidates {
        println!("  {} ({} minority mutations)", candidate, report.counts[candidate]);
    }

    Ok(())
}

/// Handle application errors and provide user-friendly messages
fn handle_error(error: MinvarError) -> ! {
    match error {
        MinvarError::FileNotFound(path) => {
            eprintln!("Error: File not found: {}", path);
            eprintln!("Run minor_vars first to produce the analysis document.");
        }
        MinvarError::Json(ref e) => {
            eprintln!("Error: Could not read the analysis document: {}", e);
            eprintln!("Please check that the file was produced by minor_vars.");
        }
        MinvarError::Csv(ref e) => {
            eprintln!("Error: Could not write a candidate table: {}", e);
        }
        MinvarError::InvalidConfig(msg) => {
            eprintln!("Error: Invalid configuration: {}", msg);
        }
        MinvarError::InvalidRecord(msg) => {
            eprintln!("Error: Inconsistent analysis data: {}", msg);
        }
        MinvarError::MissingFormatField(field) => {
            eprintln!("Error: Mandatory FORMAT field '{}' is missing.", field);
        }
        MinvarError::Io(ref e) => {
            eprintln!("Error: I/O error: {}", e);
            eprintln!("Please check file permissions and disk space.");
        }
    }
    std::process::exit(1);
}

fn main() {
    if let Err(e) = run() {
        handle_error(e);
    }
}
