//! Combined CLI binary - minority-variant filtering and co-infection
//! classification in one step

use clap::Parser;
use env_logger::Env;
use minvar_rs::{
    filter::run_filter,
    report::run_report,
    utils::{validate_file_readable, Timer},
    FilterConfig, MinvarError, MinvarResult, PopulationPolicy, ReportConfig,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "minvar")]
#[command(about = "Minority-variant analysis and co-infection candidate detection")]
#[command(long_about = "
Runs the complete analysis in a single invocation:
1. Streams the multi-sample VCF and detects minority variants
   (frequency and depth thresholds, coverage filter)
2. Counts minority mutations per sample and computes the outlier cutoff
3. Writes one CSV table per co-infection candidate plus the per-sample
   count distribution

The intermediate analysis document is kept in memory; pass --data-out to
also persist it for later coinfection_report runs.

For separate filtering and classification passes, use the individual
tools: minor_vars and coinfection_report.
")]
struct Args {
    /// Path to the multi-sample VCF (GT, AD and DP fields are mandatory)
    #[arg(long, value_name = "FILE")]
    vcf: PathBuf,

    /// Output directory for the candidate tables
    #[arg(long, value_name = "DIR", default_value = "./results")]
    out_dir: PathBuf,

    /// Also write the intermediate analysis document to this path
    #[arg(long, value_name = "FILE")]
    data_out: Option<PathBuf>,

    /// Minimum allele read depth
    #[arg(long, default_value_t = 10)]
    min_allele_depth: u32,

    /// Minimum fraction of called (non-N) samples per position, 0.0-1.0
    #[arg(long, default_value_t = 0.8)]
    min_coverage: f64,

    /// Minimum minority variant frequency, 0.0-1.0
    #[arg(long, default_value_t = 0.2)]
    min_freq: f64,

    /// Candidates exceed the mean by this many standard deviations.
    /// Ignored when --min-lowfreq is set
    #[arg(long, default_value_t = 2.0)]
    deviation_lowfreq: f64,

    /// Hard minority-variant count used as the cutoff instead of the
    /// statistical one
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

    log::info!("Starting combined minority-variant analysis");
    log::info!("Input VCF: {:?}", args.vcf);
    log::info!("Output directory: {:?}", args.out_dir);

    validate_file_readable(&args.vcf)?;

    let filter_config = FilterConfig {
        min_allele_depth: args.min_allele_depth,
        min_coverage: args.min_coverage,
        min_freq: args.min_freq,
    };
    filter_config.validate()?;

    let report_config = ReportConfig {
        deviation_lowfreq: args.deviation_lowfreq,
        min_lowfreq: args.min_lowfreq,
        population: if args.include_zero_counts {
            PopulationPolicy::IncludeZeroCounts
        } else {
            PopulationPolicy::ObservedOnly
        },
    };
    report_config.validate()?;

    let result = {
        let _timer = Timer::new("Minority-variant filtering");
        run_filter(&args.vcf, &filter_config)?
    };

    if let Some(data_out) = &args.data_out {
        result.save(data_out)?;
        log::info!("analysis data written to {:?}", data_out);
    }

    let report = {
        let _timer = Timer::new("Co-infection classification");
        run_report(&result, &report_config, &args.out_dir)?
    };

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
            eprintln!("Please check that the file exists and is readable.");
        }
        MinvarError::MissingFormatField(field) => {
            eprintln!("Error: Mandatory FORMAT field '{}' is missing.", field);
            eprintln!("The input VCF must annotate every sample with GT, AD and DP.");
        }
        MinvarError::InvalidRecord(msg) => {
            eprintln!("Error: Invalid variant record: {}", msg);
            eprintln!("Please check that your VCF file is properly formatted.");
        }
        MinvarError::InvalidConfig(msg) => {
            eprintln!("Error: Invalid configuration: {}", msg);
            eprintln!("Please check the threshold parameters.");
        }
        MinvarError::Json(ref e) => {
            eprintln!("Error: Could not write the analysis document: {}", e);
        }
        MinvarError::Csv(ref e) => {
            eprintln!("Error: Could not write a candidate table: {}", e);
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
