//! CLI binary for the minority-variant filter stage

use clap::Parser;
use env_logger::Env;
use minvar_rs::{
    filter::run_filter,
    utils::{validate_file_readable, Timer},
    FilterConfig, MinvarError, MinvarResult,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "minor_vars")]
#[command(about = "Minority-variant detection over a multi-sample VCF")]
#[command(long_about = "
Streams a multi-sample VCF (plain or gzip-compressed) and detects
low-frequency (minority) variants: positions where a sample's heterozygous
call carries a second allele whose frequency and read depth pass the
configured thresholds.

The GT, AD and DP FORMAT fields are mandatory per sample; their absence is
a fatal error. Positions with too many no-call samples are excluded by the
coverage filter.

The output is a JSON document consumed by coinfection_report. It records,
per minority mutation, the samples carrying it, plus the per-position call
data, the calls discarded for insufficient depth, the excluded positions
and the observed frequency distributions.
")]
struct Args {
    /// Path to the multi-sample VCF (GT, AD and DP fields are mandatory)
    #[arg(long, value_name = "FILE")]
    vcf: PathBuf,

    /// Path of the output JSON document
    #[arg(long, value_name = "FILE", default_value = "results/data.json")]
    out: PathBuf,

    /// Minimum allele read depth
    #[arg(long, default_value_t = 10)]
    min_allele_depth: u32,

    /// Minimum fraction of called (non-N) samples per position, 0.0-1.0
    #[arg(long, default_value_t = 0.8)]
    min_coverage: f64,

    /// Minimum minority variant frequency, 0.0-1.0
    #[arg(long, default_value_t = 0.2)]
    min_freq: f64,

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

    validate_file_readable(&args.vcf)?;

    let config = FilterConfig {
        min_allele_depth: args.min_allele_depth,
        min_coverage: args.min_coverage,
        min_freq: args.min_freq,
    };
    config.validate()?;

    let _timer = Timer::new("Minority-variant filtering");
    let result = run_filter(&args.vcf, &config)?;

    result.save(&args.out)?;
    log::info!("analysis data written to {:?}", args.out);
    log::info!(
        "retained positions: {}, minority mutations: {}, excluded positions: {}",
        result.entries_data.len(),
        result.variant_samples.len(),
        result.excluded_positions.len()
    );

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
        }
        MinvarError::Json(ref e) => {
            eprintln!("Error: Could not write the analysis document: {}", e);
        }
        MinvarError::Csv(ref e) => {
            eprintln!("Error: Data processing error: {}", e);
            eprintln!("This is unexpected in the filter stage. Please report this issue.");
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
